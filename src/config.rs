//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Path to the libSQL database file.
    pub db_path: PathBuf,
    /// Business timezone as a fixed offset from UTC, in minutes.
    pub utc_offset_minutes: i32,
    /// Maximum queued messages handled per `send-reminders` invocation.
    pub batch_size: usize,
    /// Courtesy delay between sequential outbound sends.
    pub send_delay: Duration,
    /// Window within which a configured time-of-day counts as "now".
    pub schedule_tolerance: Duration,
    /// How often the external trigger fires.
    pub invocation_interval: Duration,
    /// `max_retries` given to messages this core enqueues.
    pub default_max_retries: u32,
    /// Terminal rows and audit records older than this are pruned.
    pub retention_days: u32,
    /// Port for the HTTP trigger server.
    pub http_port: u16,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/notify-core.db"),
            utc_offset_minutes: -180,
            batch_size: 50,
            send_delay: Duration::from_millis(1500),
            schedule_tolerance: Duration::from_secs(300),
            invocation_interval: Duration::from_secs(300),
            default_max_retries: 3,
            retention_days: 30,
            http_port: 8080,
        }
    }
}

impl SchedulerConfig {
    /// Build from `NOTIFY_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            db_path: std::env::var("NOTIFY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            utc_offset_minutes: env_parse("NOTIFY_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes)?,
            batch_size: env_parse("NOTIFY_BATCH_SIZE", defaults.batch_size)?,
            send_delay: Duration::from_millis(env_parse(
                "NOTIFY_SEND_DELAY_MS",
                defaults.send_delay.as_millis() as u64,
            )?),
            schedule_tolerance: Duration::from_secs(
                env_parse(
                    "NOTIFY_SCHEDULE_TOLERANCE_MIN",
                    defaults.schedule_tolerance.as_secs() / 60,
                )? * 60,
            ),
            invocation_interval: Duration::from_secs(
                env_parse(
                    "NOTIFY_INTERVAL_MIN",
                    defaults.invocation_interval.as_secs() / 60,
                )? * 60,
            ),
            default_max_retries: env_parse("NOTIFY_MAX_RETRIES", defaults.default_max_retries)?,
            retention_days: env_parse("NOTIFY_RETENTION_DAYS", defaults.retention_days)?,
            http_port: env_parse("NOTIFY_HTTP_PORT", defaults.http_port)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the jobs cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-14 * 60..=14 * 60).contains(&self.utc_offset_minutes) {
            return Err(ConfigError::InvalidValue {
                key: "NOTIFY_UTC_OFFSET_MINUTES".into(),
                message: format!("{} is outside ±14h", self.utc_offset_minutes),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "NOTIFY_BATCH_SIZE".into(),
                message: "must be at least 1".into(),
            });
        }
        // Digests have no queue row; a wider window lets one schedule match twice.
        if self.schedule_tolerance > self.invocation_interval {
            tracing::warn!(
                tolerance_secs = self.schedule_tolerance.as_secs(),
                interval_secs = self.invocation_interval.as_secs(),
                "Schedule tolerance is wider than the invocation interval"
            );
        }
        Ok(())
    }
}

/// Outbound messaging gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Endpoint that accepts `{"number": ..., "text": ...}`.
    pub url: String,
    pub token: SecretString,
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Returns `None` when `NOTIFY_GATEWAY_URL` is unset.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("NOTIFY_GATEWAY_URL").ok()?;
        let token = std::env::var("NOTIFY_GATEWAY_TOKEN").unwrap_or_default();
        let timeout_secs: u64 = std::env::var("NOTIFY_GATEWAY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(15);

        Some(Self {
            url,
            token: SecretString::from(token),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
