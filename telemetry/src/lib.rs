use thiserror::Error;
use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{self, InitError},
};
use tracing_log::{log_tracer::SetLoggerError, LogTracer};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEV_ENV_NAME: &str = "dev";
const PROD_ENV_NAME: &str = "prod";
const LOG_DIR: &str = "logs";
const MAX_LOG_FILES: usize = 5;

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to build rolling file appender: {0}")]
    InitAppender(#[from] InitError),

    #[error("failed to init log tracer: {0}")]
    InitLogTracer(#[from] SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),
}

/// Keep this alive for the lifetime of the process; dropping it flushes any
/// buffered log lines.
#[must_use]
pub enum LogFlusher {
    Flusher(WorkerGuard),
    NullFlusher,
}

/// Initializes tracing for a binary. Dev environments log to stderr; prod
/// environments write daily-rotated files under `logs/`. The filter comes
/// from `RUST_LOG` and defaults to `info`.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    // capture `log`-crate records from dependencies as tracing events
    LogTracer::init()?;

    let is_prod =
        std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEV_ENV_NAME.into()) == PROD_ENV_NAME;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    if is_prod {
        let file_appender = rolling::Builder::new()
            .filename_prefix(app_name)
            .filename_suffix("log")
            .rotation(rolling::Rotation::DAILY)
            .max_log_files(MAX_LOG_FILES)
            .build(LOG_DIR)?;
        let (file_appender, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_target(false)
            .with_writer(file_appender)
            .finish();
        set_global_default(subscriber)?;

        Ok(LogFlusher::Flusher(guard))
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();
        set_global_default(subscriber)?;

        Ok(LogFlusher::NullFlusher)
    }
}
