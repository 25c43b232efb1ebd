use crate::routines::settings::Settings;
use anyhow::Result;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Setup logging for the library
///
/// This function sets up logging with the `tracing` crate, formatted by
/// `tracing-subscriber`.
///
/// The log level is defined in the [Settings], and defaults to `INFO`.
///
/// If a log file is specified in the settings, messages are additionally
/// written there.
///
/// Calling this more than once is harmless; only the first call installs
/// the subscriber.
pub fn setup_log(settings: &Settings) -> Result<()> {
    let log_level = settings.log.level.to_lowercase();

    let env_filter = EnvFilter::new(&log_level);

    let subscriber = Registry::default().with(env_filter);

    // Define a layer for the log file
    let file_layer = match &settings.log.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_timer(CompactTimestamp),
            )
        }
        None => None,
    };

    // Define layer for stdout
    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(false)
        .with_timer(CompactTimestamp);

    if subscriber
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .is_ok()
    {
        tracing::debug!("Logging is configured with level: {}", log_level);
    }
    Ok(())
}

#[derive(Clone)]
struct CompactTimestamp;

impl FormatTime for CompactTimestamp {
    fn format_time(
        &self,
        w: &mut tracing_subscriber::fmt::format::Writer<'_>,
    ) -> Result<(), std::fmt::Error> {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S"))
    }
}
