use std::sync::Arc;

use atb_core::config::{Config, BOT_NAME, BOT_VERSION};

#[tokio::main]
async fn main() -> Result<(), atb_core::Error> {
    let cfg = Config::load()?;
    // Dropping the guard flushes the file writer, so it lives until exit.
    let _log_guard = atb_core::logging::init("atb", &cfg.log_level, &cfg.log_dir)?;
    tracing::info!("{BOT_NAME} v{BOT_VERSION} starting");

    atb_telegram::router::run_polling(Arc::new(cfg))
        .await
        .map_err(|e| atb_core::Error::External(format!("telegram bot failed: {e:#}")))?;

    // A requested restart also ends here; the supervisor starts a fresh process.
    tracing::info!("shutdown complete");
    Ok(())
}
