//! Dry-run channel: logs instead of sending.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::channels::{OutboundChannel, SendOutcome};

/// A message the dry-run channel accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedSend {
    pub phone: String,
    pub text: String,
}

/// Accepts every send, logs it, and keeps a copy in memory.
#[derive(Default)]
pub struct DryRunChannel {
    sent: Mutex<Vec<LoggedSend>>,
}

impl DryRunChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything accepted so far, oldest first.
    pub fn sent(&self) -> Vec<LoggedSend> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl OutboundChannel for DryRunChannel {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn send(&self, phone: &str, text: &str) -> SendOutcome {
        tracing::info!(phone, chars = text.chars().count(), "[dry-run] outbound message");
        tracing::debug!("[dry-run] {text}");
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(LoggedSend {
                phone: phone.to_string(),
                text: text.to_string(),
            });
        }
        SendOutcome::delivered()
    }
}
