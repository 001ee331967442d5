//! Completion signals for human tasks
//!
//! A human task suspends its step until somebody outside the engine acts.
//! The hub pairs every waiting step with a oneshot channel: the dispatcher
//! holds the receiver, the outside world resolves it through
//! [`SignalHub::deliver`]. Each waiting step accepts exactly one signal;
//! a second delivery finds nothing and fails with `NoPendingSignal`.

use std::collections::HashMap;
use std::sync::Mutex;

use docflow_types::{RunId, StepId, WorkflowError, WorkflowResult};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

/// External resolution of a waiting human task
#[derive(Clone, Debug)]
pub enum TaskSignal {
    /// The person finished the task; a JSON object output merges into the
    /// run context
    Completed { output: Value },
    /// The person rejected or abandoned the task
    Failed { error: String },
}

impl TaskSignal {
    pub fn completed(output: Value) -> Self {
        Self::Completed { output }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }
}

/// Pairs waiting human-task steps with their completion channels
#[derive(Default)]
pub struct SignalHub {
    waiting: Mutex<HashMap<(RunId, StepId), oneshot::Sender<TaskSignal>>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self {
            waiting: Mutex::new(HashMap::new()),
        }
    }

    /// Register a waiting step and hand back the receiver the dispatcher
    /// awaits. A stale sender for the same step is replaced.
    pub fn subscribe(&self, run: RunId, step: StepId) -> oneshot::Receiver<TaskSignal> {
        let (sender, receiver) = oneshot::channel();
        self.waiting.lock().unwrap().insert((run, step), sender);
        receiver
    }

    /// Deliver a signal to a waiting step.
    ///
    /// Fails with [`WorkflowError::NoPendingSignal`] when no step is
    /// waiting, including when the same signal is sent twice or the run
    /// was cancelled in between.
    pub fn deliver(&self, run: &RunId, step: &StepId, signal: TaskSignal) -> WorkflowResult<()> {
        let sender = self
            .waiting
            .lock()
            .unwrap()
            .remove(&(run.clone(), step.clone()))
            .ok_or_else(|| WorkflowError::NoPendingSignal {
                run: run.clone(),
                step: step.clone(),
            })?;
        debug!(run = %run, step = %step, "Delivering task signal");
        sender.send(signal).map_err(|_| WorkflowError::NoPendingSignal {
            run: run.clone(),
            step: step.clone(),
        })
    }

    /// Drop every waiting sender belonging to a run. Their receivers see
    /// a closed channel and stop waiting.
    pub fn drop_run(&self, run: &RunId) {
        let mut waiting = self.waiting.lock().unwrap();
        waiting.retain(|(r, _), _| r != run);
    }

    /// Forget one waiting step without signalling it
    pub fn unsubscribe(&self, run: &RunId, step: &StepId) {
        self.waiting
            .lock()
            .unwrap()
            .remove(&(run.clone(), step.clone()));
    }

    /// Steps of a run currently waiting on a signal
    pub fn waiting_steps(&self, run: &RunId) -> Vec<StepId> {
        self.waiting
            .lock()
            .unwrap()
            .keys()
            .filter(|(r, _)| r == run)
            .map(|(_, step)| step.clone())
            .collect()
    }

    pub fn is_waiting(&self, run: &RunId, step: &StepId) -> bool {
        self.waiting
            .lock()
            .unwrap()
            .contains_key(&(run.clone(), step.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_deliver_resolves_subscriber() {
        let hub = SignalHub::new();
        let run = RunId::generate();
        let step = StepId::new("approve");

        let receiver = hub.subscribe(run.clone(), step.clone());
        assert!(hub.is_waiting(&run, &step));

        hub.deliver(&run, &step, TaskSignal::completed(json!({"approved": true})))
            .unwrap();
        assert!(!hub.is_waiting(&run, &step));

        match receiver.await.unwrap() {
            TaskSignal::Completed { output } => assert_eq!(output["approved"], true),
            other => panic!("unexpected signal: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_second_delivery_rejected() {
        let hub = SignalHub::new();
        let run = RunId::generate();
        let step = StepId::new("approve");

        let _receiver = hub.subscribe(run.clone(), step.clone());
        hub.deliver(&run, &step, TaskSignal::completed(json!({})))
            .unwrap();

        let result = hub.deliver(&run, &step, TaskSignal::completed(json!({})));
        assert!(matches!(
            result,
            Err(WorkflowError::NoPendingSignal { .. })
        ));
    }

    #[tokio::test]
    async fn test_deliver_without_subscriber_rejected() {
        let hub = SignalHub::new();
        let result = hub.deliver(
            &RunId::generate(),
            &StepId::new("ghost"),
            TaskSignal::failed("nope"),
        );
        assert!(matches!(
            result,
            Err(WorkflowError::NoPendingSignal { .. })
        ));
    }

    #[tokio::test]
    async fn test_drop_run_closes_channels() {
        let hub = SignalHub::new();
        let run = RunId::generate();
        let other_run = RunId::generate();

        let receiver = hub.subscribe(run.clone(), StepId::new("a"));
        let _other = hub.subscribe(other_run.clone(), StepId::new("a"));
        assert_eq!(hub.waiting_steps(&run).len(), 1);

        hub.drop_run(&run);
        assert!(hub.waiting_steps(&run).is_empty());
        assert_eq!(hub.waiting_steps(&other_run).len(), 1);

        // The waiting receiver wakes with a closed channel
        assert!(receiver.await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_receiver_makes_delivery_fail() {
        let hub = SignalHub::new();
        let run = RunId::generate();
        let step = StepId::new("approve");

        let receiver = hub.subscribe(run.clone(), step.clone());
        drop(receiver);

        let result = hub.deliver(&run, &step, TaskSignal::completed(json!({})));
        assert!(matches!(
            result,
            Err(WorkflowError::NoPendingSignal { .. })
        ));
    }
}
