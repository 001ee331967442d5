//! Tasks: the unit of work inside a workflow step
//!
//! A task is either human-performed or machine-automated. The two variants
//! share an id/name/status base shape but diverge completely in how they
//! complete: a human task suspends the run until an external signal arrives,
//! an automated task is dispatched to a registered action handler with
//! retry/timeout policy.
//!
//! The sum type is internally tagged (`"type": "human" | "automated"`) so
//! the serialized form keeps the discriminant the rest of the platform
//! already speaks.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{WorkflowError, WorkflowResult};

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a task
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Status and priority ──────────────────────────────────────────────

/// Task status: `pending → in_progress → {completed | failed}`.
///
/// A failed automated task is retried back through `in_progress` up to its
/// `retry_count` before `failed` becomes terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Priority of a human task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

// ── Human task kinds ─────────────────────────────────────────────────

/// What a person is asked to do
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanTaskType {
    /// Approve a document
    ApproveDocument,
    /// Review and provide feedback
    ReviewDocument,
    /// Sign a document
    SignDocument,
    /// Verify document contents
    VerifyDocument,
    /// Input additional data
    InputData,
    /// Validate existing data
    ValidateData,
    /// Resolve reported issues
    ResolveIssue,
    /// Perform quality check
    QualityCheck,
    /// Final approval step
    FinalApproval,
    /// Acknowledge receipt or changes
    Acknowledge,
    /// Schedule a meeting
    ScheduleMeeting,
    /// Custom human task
    CustomTask,
}

impl HumanTaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApproveDocument => "approve_document",
            Self::ReviewDocument => "review_document",
            Self::SignDocument => "sign_document",
            Self::VerifyDocument => "verify_document",
            Self::InputData => "input_data",
            Self::ValidateData => "validate_data",
            Self::ResolveIssue => "resolve_issue",
            Self::QualityCheck => "quality_check",
            Self::FinalApproval => "final_approval",
            Self::Acknowledge => "acknowledge",
            Self::ScheduleMeeting => "schedule_meeting",
            Self::CustomTask => "custom_task",
        }
    }

    /// Human-readable name, as shown in task pickers
    pub fn label(&self) -> &'static str {
        match self {
            Self::ApproveDocument => "Approve Document",
            Self::ReviewDocument => "Review Document",
            Self::SignDocument => "Sign Document",
            Self::VerifyDocument => "Verify Document",
            Self::InputData => "Input Data",
            Self::ValidateData => "Validate Data",
            Self::ResolveIssue => "Resolve Issue",
            Self::QualityCheck => "Quality Check",
            Self::FinalApproval => "Final Approval",
            Self::Acknowledge => "Acknowledge",
            Self::ScheduleMeeting => "Schedule Meeting",
            Self::CustomTask => "Custom Task",
        }
    }
}

impl std::fmt::Display for HumanTaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Automated task kinds ─────────────────────────────────────────────

/// The four families of automated task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Document,
    Notification,
    Data,
    Integration,
}

impl TaskCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Document => "Document",
            Self::Notification => "Notification",
            Self::Data => "Data",
            Self::Integration => "Integration",
        }
    }
}

/// What an action handler is asked to do.
///
/// These are the keys of the action handler registry: the engine never
/// performs the side effect itself, it dispatches to whatever handler is
/// registered under the task type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomatedTaskType {
    // Document
    UpdateStatus,
    MoveDocument,
    CopyDocument,
    ConvertFormat,
    ArchiveDocument,
    GenerateDocument,
    MergeDocuments,
    // Notification
    SendEmail,
    SendReminder,
    NotifySlack,
    NotifyGoogle,
    NotifyTeams,
    // Data
    UpdateMetadata,
    ExtractData,
    ValidateData,
    SyncData,
    AssignData,
    // Integration
    ApiCall,
    UpdateSystem,
    TriggerWebhook,
    CustomAutomation,
}

impl AutomatedTaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdateStatus => "update_status",
            Self::MoveDocument => "move_document",
            Self::CopyDocument => "copy_document",
            Self::ConvertFormat => "convert_format",
            Self::ArchiveDocument => "archive_document",
            Self::GenerateDocument => "generate_document",
            Self::MergeDocuments => "merge_documents",
            Self::SendEmail => "send_email",
            Self::SendReminder => "send_reminder",
            Self::NotifySlack => "notify_slack",
            Self::NotifyGoogle => "notify_google",
            Self::NotifyTeams => "notify_teams",
            Self::UpdateMetadata => "update_metadata",
            Self::ExtractData => "extract_data",
            Self::ValidateData => "validate_data",
            Self::SyncData => "sync_data",
            Self::AssignData => "assign_data",
            Self::ApiCall => "api_call",
            Self::UpdateSystem => "update_system",
            Self::TriggerWebhook => "trigger_webhook",
            Self::CustomAutomation => "custom_automation",
        }
    }

    /// Human-readable name, as shown in task pickers
    pub fn label(&self) -> &'static str {
        match self {
            Self::UpdateStatus => "Update Status",
            Self::MoveDocument => "Move Document",
            Self::CopyDocument => "Copy Document",
            Self::ConvertFormat => "Convert Format",
            Self::ArchiveDocument => "Archive Document",
            Self::GenerateDocument => "Generate Document",
            Self::MergeDocuments => "Merge Documents",
            Self::SendEmail => "Send Email",
            Self::SendReminder => "Send Reminder",
            Self::NotifySlack => "Notify Slack",
            Self::NotifyGoogle => "Notify Google",
            Self::NotifyTeams => "Notify Teams",
            Self::UpdateMetadata => "Update Metadata",
            Self::ExtractData => "Extract Data",
            Self::ValidateData => "Validate Data",
            Self::SyncData => "Sync Data",
            Self::AssignData => "Assign Data",
            Self::ApiCall => "API Call",
            Self::UpdateSystem => "Update System",
            Self::TriggerWebhook => "Trigger Webhook",
            Self::CustomAutomation => "Custom Automation",
        }
    }

    /// The family this task type belongs to
    pub fn category(&self) -> TaskCategory {
        match self {
            Self::UpdateStatus
            | Self::MoveDocument
            | Self::CopyDocument
            | Self::ConvertFormat
            | Self::ArchiveDocument
            | Self::GenerateDocument
            | Self::MergeDocuments => TaskCategory::Document,
            Self::SendEmail
            | Self::SendReminder
            | Self::NotifySlack
            | Self::NotifyGoogle
            | Self::NotifyTeams => TaskCategory::Notification,
            Self::UpdateMetadata
            | Self::ExtractData
            | Self::ValidateData
            | Self::SyncData
            | Self::AssignData => TaskCategory::Data,
            Self::ApiCall | Self::UpdateSystem | Self::TriggerWebhook | Self::CustomAutomation => {
                TaskCategory::Integration
            }
        }
    }
}

impl std::fmt::Display for AutomatedTaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Task configuration ───────────────────────────────────────────────

/// Configuration passed to an automated task's action handler.
///
/// At rest this is an opaque JSON object, the escape hatch that keeps
/// truly dynamic integrations expressible. Handlers that know their shape
/// use [`TaskConfig::parse`] to get a typed view (see [`EmailConfig`],
/// [`ApiCallConfig`], [`WebhookConfig`], [`StatusUpdateConfig`]).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskConfig(pub serde_json::Map<String, Value>);

impl TaskConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deserialize the whole config into a typed view
    pub fn parse<T: DeserializeOwned>(&self) -> WorkflowResult<T> {
        serde_json::from_value(Value::Object(self.0.clone())).map_err(WorkflowError::from)
    }
}

/// Typed view of a `send_email` / `send_reminder` config
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub to: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Typed view of an `api_call` config
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiCallConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// Typed view of a `trigger_webhook` config
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Typed view of an `update_status` config
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdateConfig {
    pub status: String,
}

// ── The task sum type ────────────────────────────────────────────────

/// A unit of work: human-performed or machine-automated
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    Human(HumanTask),
    Automated(AutomatedTask),
}

impl Task {
    pub fn id(&self) -> &TaskId {
        match self {
            Self::Human(t) => &t.id,
            Self::Automated(t) => &t.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Human(t) => &t.name,
            Self::Automated(t) => &t.name,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Human(t) => t.description.as_deref(),
            Self::Automated(t) => t.description.as_deref(),
        }
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Human(t) => t.status,
            Self::Automated(t) => t.status,
        }
    }

    pub fn is_human(&self) -> bool {
        matches!(self, Self::Human(_))
    }

    pub fn is_automated(&self) -> bool {
        matches!(self, Self::Automated(_))
    }
}

/// Work that must be completed by a person.
///
/// The engine cannot infer completion; it suspends the run until an
/// external complete/fail signal arrives for the owning step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HumanTask {
    pub id: TaskId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    pub task_type: HumanTaskType,
    /// Who the work is assigned to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Past this instant the step is flagged overdue (never auto-completed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl HumanTask {
    pub fn new(name: impl Into<String>, task_type: HumanTaskType) -> Self {
        Self {
            id: TaskId::generate(),
            name: name.into(),
            description: None,
            status: TaskStatus::Pending,
            task_type,
            assignee: None,
            due_date: None,
            priority: None,
            instructions: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

impl From<HumanTask> for Task {
    fn from(task: HumanTask) -> Self {
        Task::Human(task)
    }
}

/// Work dispatched to a registered action handler
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AutomatedTask {
    pub id: TaskId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    pub task_type: AutomatedTaskType,
    /// Handler-specific configuration
    #[serde(default, skip_serializing_if = "TaskConfig::is_empty")]
    pub config: TaskConfig,
    /// Additional attempts after the first failure. Always finite.
    #[serde(default)]
    pub retry_count: u32,
    /// Per-attempt timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl AutomatedTask {
    pub fn new(name: impl Into<String>, task_type: AutomatedTaskType) -> Self {
        Self {
            id: TaskId::generate(),
            name: name.into(),
            description: None,
            status: TaskStatus::Pending,
            task_type,
            config: TaskConfig::new(),
            retry_count: 0,
            timeout_ms: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

impl From<AutomatedTask> for Task {
    fn from(task: AutomatedTask) -> Self {
        Task::Automated(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_tagging() {
        let task: Task = HumanTask::new("Review contract", HumanTaskType::ReviewDocument)
            .with_assignee("legal-team")
            .into();

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "human");
        assert_eq!(json["task_type"], "review_document");
        assert_eq!(json["assignee"], "legal-team");

        let back: Task = serde_json::from_value(json).unwrap();
        assert!(back.is_human());
        assert_eq!(back.name(), "Review contract");
    }

    #[test]
    fn test_automated_task_defaults() {
        let task = AutomatedTask::new("Notify", AutomatedTaskType::SendEmail);
        assert_eq!(task.retry_count, 0);
        assert!(task.timeout_ms.is_none());
        assert!(task.config.is_empty());
        assert_eq!(task.status, TaskStatus::Pending);

        let json = serde_json::to_value(Task::Automated(task)).unwrap();
        assert_eq!(json["type"], "automated");
        assert_eq!(json["task_type"], "send_email");
        // Empty config is omitted from the wire form
        assert!(json.get("config").is_none());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            AutomatedTaskType::ArchiveDocument.category(),
            TaskCategory::Document
        );
        assert_eq!(
            AutomatedTaskType::NotifyTeams.category(),
            TaskCategory::Notification
        );
        assert_eq!(
            AutomatedTaskType::AssignData.category(),
            TaskCategory::Data
        );
        assert_eq!(
            AutomatedTaskType::TriggerWebhook.category(),
            TaskCategory::Integration
        );
    }

    #[test]
    fn test_config_typed_view() {
        let config = TaskConfig::new()
            .with("to", "reviewer@example.com")
            .with("subject", "Document ready");

        let email: EmailConfig = config.parse().unwrap();
        assert_eq!(email.to, "reviewer@example.com");
        assert_eq!(email.subject, "Document ready");
        assert!(email.template.is_none());

        // Missing required field is a serialization error
        let bad = TaskConfig::new().with("to", "someone@example.com");
        assert!(matches!(
            bad.parse::<EmailConfig>(),
            Err(WorkflowError::Serialization(_))
        ));
    }

    #[test]
    fn test_status_machine() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_type_strings() {
        assert_eq!(HumanTaskType::FinalApproval.as_str(), "final_approval");
        assert_eq!(HumanTaskType::FinalApproval.label(), "Final Approval");
        assert_eq!(AutomatedTaskType::ApiCall.as_str(), "api_call");
        assert_eq!(AutomatedTaskType::ApiCall.label(), "API Call");

        // serde names agree with as_str
        let json = serde_json::to_value(AutomatedTaskType::NotifySlack).unwrap();
        assert_eq!(json, AutomatedTaskType::NotifySlack.as_str());
    }
}
