//! Outbound channel abstraction.
//!
//! The core only ever pushes text to a phone number. Failures are reported in
//! the returned [`SendOutcome`] and treated as transient by the callers.

pub mod dry_run;
pub mod gateway;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::GatewayConfig;
use crate::error::ChannelError;

pub use dry_run::DryRunChannel;
pub use gateway::GatewayChannel;

/// Result of one outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn delivered() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

impl From<Result<(), ChannelError>> for SendOutcome {
    fn from(result: Result<(), ChannelError>) -> Self {
        match result {
            Ok(()) => Self::delivered(),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

/// Something that can deliver a text message to a phone number.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    /// Channel name for logs.
    fn name(&self) -> &str;

    /// Deliver `text` to `phone`. Never panics; errors come back in the outcome.
    async fn send(&self, phone: &str, text: &str) -> SendOutcome;
}

/// Build the outbound channel from config: the HTTP gateway when configured,
/// otherwise a dry-run channel that only logs.
pub fn from_config(gateway: Option<GatewayConfig>) -> Result<Arc<dyn OutboundChannel>, ChannelError> {
    match gateway {
        Some(config) => {
            tracing::info!(url = %config.url, "Using HTTP messaging gateway");
            Ok(Arc::new(GatewayChannel::new(config)?))
        }
        None => {
            tracing::warn!("NOTIFY_GATEWAY_URL not set, outbound messages will only be logged");
            Ok(Arc::new(DryRunChannel::new()))
        }
    }
}
