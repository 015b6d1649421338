//! Trigger surface: maps an action discriminator to a job run.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::RunResult;
use super::alerts::RealtimeAlertJob;
use super::calendar::CalendarReminderJob;
use super::dedup::DedupGuard;
use super::digest::DigestScheduler;
use super::dispatcher::Dispatcher;
use super::maintenance;
use super::recurrence::RecurrenceExpander;
use crate::channels::{self, OutboundChannel};
use crate::config::{GatewayConfig, SchedulerConfig};
use crate::error::{Error, TriggerError};
use crate::model::DigestKind;
use crate::store::{Database, LibSqlBackend};
use crate::time::BusinessClock;

/// One scheduling action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    SendReminders,
    DailyDigest,
    WeeklySummary,
    MonthlySummary,
    CalendarReminders,
    RealtimeAlerts,
    MemoryMaintenance,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::SendReminders,
        Action::DailyDigest,
        Action::WeeklySummary,
        Action::MonthlySummary,
        Action::CalendarReminders,
        Action::RealtimeAlerts,
        Action::MemoryMaintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::SendReminders => "send-reminders",
            Action::DailyDigest => "daily-digest",
            Action::WeeklySummary => "weekly-summary",
            Action::MonthlySummary => "monthly-summary",
            Action::CalendarReminders => "calendar-reminders",
            Action::RealtimeAlerts => "realtime-alerts",
            Action::MemoryMaintenance => "memory-maintenance",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = TriggerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s.trim())
            .ok_or_else(|| TriggerError::UnknownAction(s.to_string()))
    }
}

/// Trigger payload: `{"action": "<discriminator>"}`.
#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub action: String,
}

impl TriggerRequest {
    /// Parse a raw JSON body into an action.
    pub fn parse(body: &[u8]) -> Result<Action, TriggerError> {
        let request: TriggerRequest = serde_json::from_slice(body)
            .map_err(|e| TriggerError::MalformedPayload(e.to_string()))?;
        request.action.parse()
    }
}

/// Builds and runs jobs against injected store and channel.
#[derive(Clone)]
pub struct JobRunner {
    db: Arc<dyn Database>,
    channel: Arc<dyn OutboundChannel>,
    config: SchedulerConfig,
}

impl JobRunner {
    pub fn new(
        db: Arc<dyn Database>,
        channel: Arc<dyn OutboundChannel>,
        config: SchedulerConfig,
    ) -> Self {
        Self { db, channel, config }
    }

    /// Validate `config`, open the local store and build the outbound channel.
    pub async fn open(
        config: SchedulerConfig,
        gateway: Option<GatewayConfig>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let db = LibSqlBackend::new_local(&config.db_path)
            .await?
            .with_default_offset(config.utc_offset_minutes);
        let channel = channels::from_config(gateway)?;
        Ok(Self::new(Arc::new(db), channel, config))
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }

    pub async fn run(&self, action: Action) -> Result<RunResult, Error> {
        self.run_at(action, Utc::now()).await
    }

    /// Run `action` as if the current instant were `now`.
    pub async fn run_at(&self, action: Action, now: DateTime<Utc>) -> Result<RunResult, Error> {
        let started = Instant::now();
        tracing::info!(action = %action, "Invocation started");

        let dedup = DedupGuard::new(Arc::clone(&self.db));
        let mut result = match action {
            Action::SendReminders => {
                Dispatcher::new(
                    Arc::clone(&self.db),
                    Arc::clone(&self.channel),
                    RecurrenceExpander::new(dedup),
                    BusinessClock::from_offset_minutes(self.config.utc_offset_minutes),
                    self.config.batch_size,
                    self.config.send_delay,
                )
                .run(now)
                .await?
            }
            Action::DailyDigest => self.digest(DigestKind::Daily, now).await?,
            Action::WeeklySummary => self.digest(DigestKind::Weekly, now).await?,
            Action::MonthlySummary => self.digest(DigestKind::Monthly, now).await?,
            Action::CalendarReminders => {
                CalendarReminderJob::new(
                    Arc::clone(&self.db),
                    dedup,
                    self.config.default_max_retries,
                )
                .run(now)
                .await?
            }
            Action::RealtimeAlerts => {
                RealtimeAlertJob::new(
                    Arc::clone(&self.db),
                    dedup,
                    self.config.default_max_retries,
                )
                .run(now)
                .await?
            }
            Action::MemoryMaintenance => {
                maintenance::prune(&self.db, self.config.retention_days, now).await
            }
        };

        result.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            action = %action,
            processed = result.processed,
            errors = result.errors,
            skipped = result.skipped,
            elapsed_ms = result.elapsed_ms,
            "Invocation finished"
        );
        Ok(result)
    }

    async fn digest(&self, kind: DigestKind, now: DateTime<Utc>) -> Result<RunResult, Error> {
        Ok(DigestScheduler::new(
            Arc::clone(&self.db),
            Arc::clone(&self.channel),
            self.config.schedule_tolerance,
            self.config.send_delay,
        )
        .run(kind, now)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;

    use super::*;

    #[tokio::test]
    async fn open_builds_runner_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = SchedulerConfig {
            db_path: dir.path().join("data").join("notify.db"),
            send_delay: Duration::ZERO,
            ..Default::default()
        };
        let runner = JobRunner::open(config, None).await.unwrap();
        assert_eq!(runner.channel_name(), "dry-run");
        let result = runner.run(Action::SendReminders).await.unwrap();
        assert_eq!((result.processed, result.errors), (0, 0));
    }

    #[tokio::test]
    async fn open_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = SchedulerConfig {
            db_path: dir.path().join("notify.db"),
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            JobRunner::open(config, None).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn open_rejects_bad_gateway_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = SchedulerConfig {
            db_path: dir.path().join("notify.db"),
            ..Default::default()
        };
        let gateway = GatewayConfig {
            url: "not a url".into(),
            token: SecretString::from(String::new()),
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(
            JobRunner::open(config, Some(gateway)).await,
            Err(Error::Channel(_))
        ));
    }

    #[test]
    fn action_roundtrip() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn unknown_action_rejected() {
        assert!(matches!(
            "send-everything".parse::<Action>(),
            Err(TriggerError::UnknownAction(a)) if a == "send-everything"
        ));
    }

    #[test]
    fn trigger_payload_parsing() {
        assert_eq!(
            TriggerRequest::parse(br#"{"action": "daily-digest"}"#).unwrap(),
            Action::DailyDigest
        );
        assert!(matches!(
            TriggerRequest::parse(b"{not json"),
            Err(TriggerError::MalformedPayload(_))
        ));
        assert!(matches!(
            TriggerRequest::parse(br#"{"kind": "daily-digest"}"#),
            Err(TriggerError::MalformedPayload(_))
        ));
        assert!(matches!(
            TriggerRequest::parse(br#"{"action": "nope"}"#),
            Err(TriggerError::UnknownAction(_))
        ));
    }

    #[test]
    fn result_serializes_all_counters() {
        let json = serde_json::to_value(RunResult {
            processed: 2,
            errors: 1,
            skipped: 0,
            elapsed_ms: 12,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"processed": 2, "errors": 1, "skipped": 0, "elapsed_ms": 12})
        );
    }
}
