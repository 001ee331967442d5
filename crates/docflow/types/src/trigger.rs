//! Triggers: what starts a workflow
//!
//! Exactly one trigger per workflow, immutable once attached. The engine
//! does not watch for trigger events itself; an outer event source matches
//! platform events against trigger types and calls the run controller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Identifier ───────────────────────────────────────────────────────

/// Unique identifier for a workflow trigger
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerId(pub String);

impl TriggerId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Trigger kinds ────────────────────────────────────────────────────

/// The platform events a workflow can react to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    DocumentCreated,
    DocumentUpdated,
    StatusChanged,
    CommentAdded,
    ApprovalCompleted,
    Scheduled,
    ManualTrigger,
    DocumentShared,
    TagAdded,
    VersionCreated,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentCreated => "document_created",
            Self::DocumentUpdated => "document_updated",
            Self::StatusChanged => "status_changed",
            Self::CommentAdded => "comment_added",
            Self::ApprovalCompleted => "approval_completed",
            Self::Scheduled => "scheduled",
            Self::ManualTrigger => "manual_trigger",
            Self::DocumentShared => "document_shared",
            Self::TagAdded => "tag_added",
            Self::VersionCreated => "version_created",
        }
    }

    /// Human-readable name, as shown in trigger pickers
    pub fn label(&self) -> &'static str {
        match self {
            Self::DocumentCreated => "Document Created",
            Self::DocumentUpdated => "Document Updated",
            Self::StatusChanged => "Status Changed",
            Self::CommentAdded => "Comment Added",
            Self::ApprovalCompleted => "Approval Completed",
            Self::Scheduled => "Scheduled",
            Self::ManualTrigger => "Manual Trigger",
            Self::DocumentShared => "Document Shared",
            Self::TagAdded => "Tag Added",
            Self::VersionCreated => "Version Created",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::DocumentCreated => "Trigger when a new document is created",
            Self::DocumentUpdated => "Trigger when a document is modified",
            Self::StatusChanged => "Trigger when a document status changes",
            Self::CommentAdded => "Trigger when a comment is added to a document",
            Self::ApprovalCompleted => "Trigger when a document approval process is completed",
            Self::Scheduled => "Trigger at a specific scheduled time",
            Self::ManualTrigger => "Trigger manually by a user action",
            Self::DocumentShared => "Trigger when a document is shared",
            Self::TagAdded => "Trigger when a tag is added to a document",
            Self::VersionCreated => "Trigger when a new version of a document is created",
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Trigger ──────────────────────────────────────────────────────────

/// The event that starts a workflow
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub id: TriggerId,
    pub trigger_type: TriggerType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Trigger-specific settings (schedule expressions, status filters, …)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub config: serde_json::Map<String, Value>,
}

impl WorkflowTrigger {
    /// Create a trigger named after its type's label
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            id: TriggerId::generate(),
            trigger_type,
            name: trigger_type.label().to_string(),
            description: None,
            config: serde_json::Map::new(),
        }
    }

    pub fn named(trigger_type: TriggerType, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new(trigger_type)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_defaults_to_label() {
        let trigger = WorkflowTrigger::new(TriggerType::DocumentCreated);
        assert_eq!(trigger.name, "Document Created");
        assert!(trigger.config.is_empty());
    }

    #[test]
    fn test_named_trigger_with_config() {
        let trigger = WorkflowTrigger::named(TriggerType::Scheduled, "Nightly archive sweep")
            .with_description("Runs every night at 02:00")
            .with_config("cron", "0 2 * * *");

        assert_eq!(trigger.trigger_type, TriggerType::Scheduled);
        assert_eq!(trigger.name, "Nightly archive sweep");
        assert_eq!(trigger.config.get("cron").unwrap(), "0 2 * * *");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_value(TriggerType::VersionCreated).unwrap();
        assert_eq!(json, "version_created");
        assert_eq!(TriggerType::VersionCreated.as_str(), "version_created");
    }
}
