use anyhow::Context;
use notify_core::config::{GatewayConfig, SchedulerConfig};
use notify_core::jobs::{Action, JobRunner};
use notify_core::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; NOTIFY_LOG_DIR switches to a daily rolling file.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _log_guard = match std::env::var("NOTIFY_LOG_DIR") {
        Ok(dir) => {
            let file_appender = tracing_appender::rolling::daily(&dir, "notify-core.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
            None
        }
    };

    let config = SchedulerConfig::from_env().context("Invalid configuration")?;

    // One-shot mode: `notify-core <action>` runs a single invocation and exits.
    let action = match std::env::args().nth(1) {
        Some(arg) => match arg.parse::<Action>() {
            Ok(action) => Some(action),
            Err(e) => {
                eprintln!("Error: {e}");
                let known: Vec<&str> = Action::ALL.iter().map(Action::as_str).collect();
                eprintln!("  actions: {}", known.join(", "));
                std::process::exit(2);
            }
        },
        None => None,
    };

    let runner = JobRunner::open(config, GatewayConfig::from_env())
        .await
        .context("Failed to start")?;

    if let Some(action) = action {
        let result = runner.run(action).await?;
        println!("{}", serde_json::to_string(&result)?);
        return Ok(());
    }

    eprintln!("🔔 Notify Core v{}", env!("CARGO_PKG_VERSION"));
    let config = runner.config().clone();
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Channel: {}", runner.channel_name());
    eprintln!("   UTC offset: {} min", config.utc_offset_minutes);
    eprintln!("   Trigger: POST http://0.0.0.0:{}/trigger", config.http_port);
    eprintln!("   Health: GET http://0.0.0.0:{}/health\n", config.http_port);

    server::serve(AppState { runner }, config.http_port).await?;
    Ok(())
}
