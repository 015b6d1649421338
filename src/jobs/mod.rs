//! Scheduling jobs: one per trigger action.
//!
//! Every job is a single sequential pass over the store. Nothing is kept in
//! memory between invocations; overlapping runs are safe because inserts are
//! deduplicated and status updates only apply to rows that are still pending.

pub mod alerts;
pub mod calendar;
pub mod dedup;
pub mod digest;
pub mod dispatcher;
pub mod gate;
pub mod maintenance;
pub mod recurrence;
pub mod runner;

use serde::{Deserialize, Serialize};

pub use dedup::{DedupGuard, EnqueueOutcome};
pub use digest::DigestScheduler;
pub use dispatcher::Dispatcher;
pub use gate::{DeliveryMode, GateDecision, NotificationRequest};
pub use recurrence::RecurrenceExpander;
pub use runner::{Action, JobRunner, TriggerRequest};

/// Counters reported by every invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Rows inserted, messages sent, or records pruned.
    pub processed: u32,
    /// Send failures and store failures.
    pub errors: u32,
    /// Dedup hits, cancellations and ineligible subscribers.
    pub skipped: u32,
    pub elapsed_ms: u64,
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::channels::{OutboundChannel, SendOutcome};

    /// Records every send; fails the first `failures` of them.
    #[derive(Default)]
    pub struct ScriptedChannel {
        failures: AtomicUsize,
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedChannel {
        pub fn failing(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn attempts(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl OutboundChannel for ScriptedChannel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, phone: &str, text: &str) -> SendOutcome {
            self.sent
                .lock()
                .unwrap()
                .push((phone.to_string(), text.to_string()));
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return SendOutcome::failed("gateway timeout");
            }
            SendOutcome::delivered()
        }
    }
}
