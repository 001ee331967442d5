#![deny(unsafe_code)]
//! Document review cycle demo.
//!
//! Runs a self-contained demonstration of:
//! 1. Building and validating a review workflow
//! 2. Registering automated action handlers
//! 3. A run whose review step loops through rejection and approval
//! 4. The run log and archived record the run leaves behind
//!
//! No external services required. The "reviewer" is a spawned task that
//! signals the waiting human step the way a task inbox would.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use docflow_engine::{ActionRegistry, RunController, SignalHub, TaskDispatcher};
use docflow_types::{
    AutomatedTask, AutomatedTaskType, ConditionOperator, HumanTask, HumanTaskType, LogLevel,
    RunId, StepId, TaskConfig, TaskPriority, TriggerType, Workflow, WorkflowRule, WorkflowStep,
    WorkflowTrigger,
};
use serde_json::{json, Value};

// ── Formatting helpers ──────────────────────────────────────────────────

const BANNER: &str = r#"
 ╔══════════════════════════════════════════════════════════════╗
 ║             Docflow  --  Document Review Cycle               ║
 ║                                                              ║
 ║   Rule-gated steps, human signals, and a run log you can     ║
 ║   read back after the fact.                                  ║
 ╚══════════════════════════════════════════════════════════════╝
"#;

fn section(title: &str) {
    let rule = "─".repeat(50_usize.saturating_sub(title.len()));
    println!();
    println!(" {}", format!("── {} {}", title, rule).bold().cyan());
}

fn ok(msg: &str) {
    println!("   {}  {}", "[OK]".green(), msg);
}

fn info(msg: &str) {
    println!("   {}  {}", "[--]".dimmed(), msg);
}

fn level_tag(level: LogLevel) -> colored::ColoredString {
    match level {
        LogLevel::Success => "success".green(),
        LogLevel::Warning => "warning".yellow(),
        LogLevel::Error => "error  ".red(),
        LogLevel::Info => "info   ".dimmed(),
    }
}

// ── Main ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    println!("{}", BANNER);

    if let Err(e) = run_demo().await {
        eprintln!();
        eprintln!("   {}  Demo failed: {}", "[FATAL]".red().bold(), e);
        std::process::exit(1);
    }

    println!();
    println!("{}", "  Demo complete.".bold());
    println!();
}

async fn run_demo() -> anyhow::Result<()> {
    // ── Phase A: Workflow definition ────────────────────────────────
    section("Phase A: Define the review workflow");

    let workflow = build_workflow();
    workflow.validate()?;
    ok(&format!(
        "Workflow '{}' validated  steps={}",
        workflow.name,
        workflow.steps.len()
    ));
    for step in &workflow.steps {
        let kind = if step.task.is_human() { "human " } else { "auto  " };
        info(&format!("{}  {}  {}", kind, step.id, step.task.name()));
    }

    // ── Phase B: Action handlers ────────────────────────────────────
    section("Phase B: Register action handlers");

    let mut registry = ActionRegistry::new();
    registry.register_fn(AutomatedTaskType::ExtractData, |_config, context| async move {
        let title = context["document"]["title"]
            .as_str()
            .unwrap_or("untitled")
            .to_string();
        Ok(json!({"extracted_title": title, "word_count": 2180}))
    });
    registry.register_fn(AutomatedTaskType::AssignData, |_config, _context| async move {
        Ok(json!({"reviewer": "rivka"}))
    });
    registry.register_fn(AutomatedTaskType::UpdateStatus, |config, _context| async move {
        let status = config.get("status").cloned().unwrap_or(Value::Null);
        Ok(json!({"status": status}))
    });
    registry.register_fn(AutomatedTaskType::SendEmail, |_config, context| async move {
        Ok(json!({"author_notified": true, "notified_about": context["status"].clone()}))
    });
    ok(&format!("{} handlers registered", registry.len()));

    let dispatcher = TaskDispatcher::new(Arc::new(registry), Arc::new(SignalHub::new()));
    let controller = Arc::new(RunController::new(Arc::new(dispatcher)));

    // ── Phase C: Run the cycle ──────────────────────────────────────
    section("Phase C: Run the cycle  (reject once, then approve)");

    let workflow_id = controller.register_workflow(workflow).await?;
    let run_id = controller
        .start(
            &workflow_id,
            json!({"document": {"title": "Vendor contract v4", "status": "draft"}}),
        )
        .await?;
    info(&format!("Run {} started", run_id));

    let reviewer = spawn_reviewer(Arc::clone(&controller), run_id.clone());
    let state = controller.wait(&run_id).await?;
    reviewer.await?;
    ok(&format!("Run settled: {}", state));

    // ── Phase D: The run log ────────────────────────────────────────
    section("Phase D: Run log");

    let record = controller.archive_run(&run_id).await?;
    for entry in &record.log {
        println!("   {:>2}  {}  {}", entry.sequence, level_tag(entry.level), entry.message);
    }

    // ── Phase E: Archived summary ───────────────────────────────────
    section("Phase E: Archived summary");

    info(&format!("Final state      : {}", record.final_state));
    info(&format!("Steps succeeded  : {}", record.steps_succeeded()));
    info(&format!("Steps skipped    : {}", record.steps_skipped()));
    info(&format!(
        "Review iterations: {}",
        record
            .outcome_for(&StepId::new("review"))
            .map(|o| o.iterations)
            .unwrap_or(0)
    ));
    if let Some(ms) = record.duration_ms {
        info(&format!("Duration         : {}ms", ms));
    }
    info(&format!("Final status     : {}", record.context["status"]));

    Ok(())
}

// ── Pieces ──────────────────────────────────────────────────────────────

/// Extract, assign, loop review until approved, then publish and notify
fn build_workflow() -> Workflow {
    Workflow::new(
        "Contract review cycle",
        WorkflowTrigger::named(TriggerType::DocumentCreated, "New contract uploaded"),
    )
    .with_description("Extract metadata, loop review until approved, then publish and notify")
    .with_step(WorkflowStep::new(
        "extract",
        AutomatedTask::new("Extract contract metadata", AutomatedTaskType::ExtractData),
    ))
    .with_step(WorkflowStep::new(
        "assign",
        AutomatedTask::new("Assign a reviewer", AutomatedTaskType::AssignData),
    ))
    .with_step(
        WorkflowStep::new(
            "review",
            HumanTask::new("Review the contract", HumanTaskType::ReviewDocument)
                .with_assignee("rivka")
                .with_due_date(chrono::Utc::now() + chrono::Duration::days(2))
                .with_priority(TaskPriority::High)
                .with_instructions("Check clauses 4 and 7 against the template"),
        )
        .with_rule(WorkflowRule::do_while("approved != true", 3)),
    )
    .with_step(
        WorkflowStep::new(
            "publish",
            AutomatedTask::new("Mark contract published", AutomatedTaskType::UpdateStatus)
                .with_config(TaskConfig::new().with("status", "published")),
        )
        .with_rule(WorkflowRule::condition(
            "approved",
            ConditionOperator::Equals,
            true,
        )),
    )
    .with_step(WorkflowStep::new(
        "notify",
        AutomatedTask::new("Notify the author", AutomatedTaskType::SendEmail),
    ))
}

/// Plays the human: rejects the first revision, approves the second
fn spawn_reviewer(
    controller: Arc<RunController>,
    run_id: RunId,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let review = StepId::new("review");
        let verdicts = [
            ("tighten the liability clause", false),
            ("looks good now", true),
        ];
        for (comment, approved) in verdicts {
            while !controller.signals().is_waiting(&run_id, &review) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let signal = json!({"approved": approved, "review_comment": comment});
            if let Err(error) = controller.complete_step(&run_id, &review, signal).await {
                eprintln!("   [!!]  reviewer signal failed: {}", error);
                return;
            }
            let verdict = if approved {
                "approved".green()
            } else {
                "rejected".yellow()
            };
            println!(
                "   {}  reviewer {} the document  ({})",
                "[>>]".blue(),
                verdict,
                comment
            );
        }
    })
}
