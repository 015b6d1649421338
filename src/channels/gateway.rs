//! HTTP messaging gateway channel.
//!
//! Posts `{"number": ..., "text": ...}` with a bearer token to a configurable
//! endpoint. Each message is exactly one request: the gateway owns any
//! splitting, so a failed send never leaves part of a message delivered.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use secrecy::ExposeSecret;

use crate::channels::{OutboundChannel, SendOutcome};
use crate::config::GatewayConfig;
use crate::error::ChannelError;

static NON_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D+").unwrap());
static GROUP_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9-]+@g\.us$").unwrap());

/// Outbound channel backed by an HTTP messaging gateway.
pub struct GatewayChannel {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl GatewayChannel {
    pub fn new(config: GatewayConfig) -> Result<Self, ChannelError> {
        reqwest::Url::parse(&config.url)
            .map_err(|e| ChannelError::Http(format!("Invalid gateway URL {}: {e}", config.url)))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChannelError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    async fn send_message(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        let number = normalize_recipient(recipient)?;
        let body = serde_json::json!({
            "number": number,
            "text": text,
        });

        let mut request = self.client.post(&self.config.url).json(&body);
        let token = self.config.token.expose_secret();
        if !token.is_empty() {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.map_err(|e| ChannelError::SendFailed {
            name: "gateway".into(),
            reason: e.to_string(),
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ChannelError::RateLimited {
                name: "gateway".into(),
            });
        }
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "gateway".into(),
                reason: format!("HTTP {status}: {err}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl OutboundChannel for GatewayChannel {
    fn name(&self) -> &str {
        "gateway"
    }

    async fn send(&self, phone: &str, text: &str) -> SendOutcome {
        let result = self.send_message(phone, text).await;
        if let Err(ref e) = result {
            tracing::warn!(error = %e, "Gateway send failed");
        }
        result.into()
    }
}

/// Group ids (`<digits>@g.us`) pass through unchanged; anything else is a
/// phone number reduced to its digits.
pub fn normalize_recipient(recipient: &str) -> Result<String, ChannelError> {
    let recipient = recipient.trim();
    if GROUP_ID.is_match(recipient) {
        return Ok(recipient.to_string());
    }
    normalize_phone(recipient)
}

/// Strip everything but digits. Fewer than 8 digits is not a phone number.
pub fn normalize_phone(phone: &str) -> Result<String, ChannelError> {
    let digits = NON_DIGITS.replace_all(phone, "").into_owned();
    if digits.len() < 8 {
        return Err(ChannelError::InvalidRecipient(phone.to_string()));
    }
    Ok(digits)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use secrecy::SecretString;

    use super::*;

    fn channel(url: &str) -> GatewayChannel {
        GatewayChannel::new(GatewayConfig {
            url: url.into(),
            token: SecretString::from("secret".to_string()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    type Received = Arc<Mutex<Vec<serde_json::Value>>>;

    async fn accept_once(
        State(received): State<Received>,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        let mut received = received.lock().unwrap();
        received.push(body);
        if received.len() == 1 {
            StatusCode::OK
        } else {
            StatusCode::BAD_GATEWAY
        }
    }

    /// Local gateway that accepts the first request and answers 502 after.
    async fn flaky_gateway() -> (String, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route("/send", post(accept_once))
            .with_state(Arc::clone(&received));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/send"), received)
    }

    #[test]
    fn gateway_channel_name() {
        assert_eq!(channel("http://localhost:1/send").name(), "gateway");
    }

    #[test]
    fn normalize_strips_formatting() {
        assert_eq!(normalize_phone("+55 (11) 99999-0000").unwrap(), "5511999990000");
        assert!(matches!(
            normalize_phone("12-34"),
            Err(ChannelError::InvalidRecipient(_))
        ));
    }

    #[test]
    fn group_ids_pass_through() {
        assert_eq!(
            normalize_recipient(" 120363041234567890@g.us ").unwrap(),
            "120363041234567890@g.us"
        );
        assert_eq!(
            normalize_recipient("+55 11 99999-0000").unwrap(),
            "5511999990000"
        );
    }

    #[tokio::test]
    async fn invalid_phone_fails_without_network() {
        let outcome = channel("http://localhost:1/send").send("n/a", "hi").await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("Invalid recipient"));
    }

    #[tokio::test]
    async fn unreachable_gateway_is_a_failed_outcome() {
        let outcome = channel("http://127.0.0.1:1/send")
            .send("5511999990000", "hi")
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn long_message_is_a_single_request() {
        let (url, received) = flaky_gateway().await;
        let gateway = channel(&url);
        let text = "a".repeat(5001);

        let outcome = gateway.send("5511999990000", &text).await;
        assert!(outcome.success);
        {
            let received = received.lock().unwrap();
            assert_eq!(received.len(), 1);
            assert_eq!(received[0]["text"].as_str().unwrap().len(), 5001);
            assert_eq!(received[0]["number"], "5511999990000");
        }

        // A rejected request delivers nothing and reports failure.
        let outcome = gateway.send("5511999990000", &text).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("502"));
        assert_eq!(received.lock().unwrap().len(), 2);
    }
}
