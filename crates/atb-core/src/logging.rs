use std::{fs, path::Path};

use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{errors::Error, Result};

/// File name prefix of the daily rolling log files (`bot.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "bot";

/// Initialize logging/tracing for the bot.
///
/// Writes to stdout and to a daily rolling file under `log_dir`. `RUST_LOG`
/// overrides `level`. Keep the returned guard alive for the life of the
/// process or buffered file output is lost.
pub fn init(service_name: &str, level: &str, log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(service_name, level))
            .map_err(|e| Error::Config(format!("invalid LOG_LEVEL {level:?}: {e}")))?,
    };

    let appender = rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(file_writer),
        )
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))?;

    Ok(guard)
}

fn default_directives(service_name: &str, level: &str) -> String {
    let level = level.trim().to_lowercase();
    format!("warn,atb={level},atb_core={level},atb_telegram={level},atb_services={level},atb_storage={level},{service_name}={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_parse_for_common_levels() {
        for level in ["debug", "INFO", " warn ", "error"] {
            let d = default_directives("atb", level);
            assert!(EnvFilter::try_new(&d).is_ok(), "{d}");
        }
    }
}
