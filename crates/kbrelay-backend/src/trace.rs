use time::format_description::well_known;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use kbrelay_core::types::conf::BackendConf;

/// The returned guard flushes the log file on drop; hold it until exit.
pub fn init_backend_tracing(config: &BackendConf) -> Result<WorkerGuard, anyhow::Error> {
  let offset = UtcOffset::from_hms(config.utc_offset_hours, 0, 0)?;

  let timer = tracing_subscriber::fmt::time::OffsetTime::new(offset, well_known::Rfc3339);

  let file_appender =
    tracing_appender::rolling::daily(&config.log_file_path, &config.log_file_name);
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::registry()
    .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_timer(timer.clone())
        .with_ansi(false),
    )
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_timer(timer),
    )
    .try_init()?;

  Ok(guard)
}
