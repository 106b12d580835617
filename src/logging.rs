//! Tracing setup for embedders that do not install their own subscriber:
//! a human-readable console layer plus a JSON file per process so
//! allocation runs can be replayed after the fact.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the global subscriber. Console output is ANSI-formatted; the
/// JSON file lands under `log/` as `<env>.<pid>.<timestamp>.log`.
/// Idempotent, and a no-op when another subscriber is already installed.
pub fn init_structured_logging() {
    install(Path::new("log"));
}

fn install(log_dir: &Path) {
    INSTALLED.get_or_init(|| {
        let environment = runtime_environment();

        if !log_dir.exists() {
            if let Err(error) = fs::create_dir_all(log_dir) {
                eprintln!("cannot create log directory {}: {error}", log_dir.display());
                return;
            }
        }

        let pid = process::id();
        let filename = format!(
            "{environment}.{pid}.{}.log",
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let file_path: PathBuf = log_dir.join(&filename);

        let appender = tracing_appender::rolling::never(log_dir, filename);
        let (file_writer, guard) = tracing_appender::non_blocking(appender);

        let console = fmt::layer()
            .with_target(true)
            .with_ansi(true)
            .with_filter(env_filter(&environment));
        let json_file = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_ansi(false)
            .json()
            .with_filter(env_filter(&environment));

        if tracing_subscriber::registry()
            .with(console)
            .with(json_file)
            .try_init()
            .is_err()
        {
            // An embedder-installed subscriber stays in charge.
            return;
        }

        tracing::info!(
            pid,
            environment = %environment,
            log_file = %file_path.display(),
            "structured logging initialized"
        );

        // The worker guard must outlive the process for the file layer to
        // keep flushing.
        std::mem::forget(guard);
    });
}

/// `RUST_LOG` wins; otherwise the environment picks the default level.
fn env_filter(environment: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(environment)))
}

fn runtime_environment() -> String {
    std::env::var("LEADFLOW_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn default_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}
