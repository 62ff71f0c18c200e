use std::{
    convert::Infallible,
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio::{sync::Semaphore, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use atb_core::{
    config::{Config, BOT_NAME, BOT_VERSION},
    domain::{ChatId, MessageId, MessageRef, UserId},
    formatting::escape_html,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    moderation::WarningTracker,
    security::AccessPolicy,
};
use atb_services::{Downloader, Translator, WeatherClient};
use atb_storage::Store;

use crate::handlers::{self, Cooldowns, COMMANDS};
use crate::{user_id_of, TelegramMessenger, TelegramRoles};

const WARNING_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Restart markers older than this are discarded without editing.
const RESTART_MARKER_MAX_AGE_MS: u64 = 30_000;

/// Who the bot is, resolved once via `getMe`.
#[derive(Clone, Debug)]
pub struct BotIdentity {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
}

pub struct AppState {
    pub cfg: Arc<Config>,
    pub me: BotIdentity,
    /// Direct Bot API access (moderation calls, lookups).
    pub telegram: TelegramMessenger,
    pub messenger: Arc<dyn MessagingPort>,
    /// Spaced sender for fan-out traffic.
    pub broadcaster: Arc<dyn MessagingPort>,
    pub roles: TelegramRoles,
    pub policy: AccessPolicy,
    pub warnings: WarningTracker,
    pub cooldowns: Cooldowns,
    pub store: Store,
    /// Bounds concurrent downloads/uploads to `MAX_WORKERS`.
    pub transfers: Semaphore,
    pub weather: Option<WeatherClient>,
    pub translator: Translator,
    pub downloader: Downloader,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Written before a requested restart so the next process can edit the
/// "Restarting..." reply. `timestamp` is Unix milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartMarker {
    pub chat_id: i64,
    pub message_id: i32,
    pub timestamp: u64,
}

impl RestartMarker {
    pub fn new(msg: MessageRef) -> Self {
        Self {
            chat_id: msg.chat_id.0,
            message_id: msg.message_id.0,
            timestamp: now_ms(),
        }
    }

    pub fn message(&self) -> MessageRef {
        MessageRef {
            chat_id: ChatId(self.chat_id),
            message_id: MessageId(self.message_id),
        }
    }

    pub fn is_fresh(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp) < RESTART_MARKER_MAX_AGE_MS
    }

    pub async fn write(&self, path: &Path) -> atb_core::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec(self)?).await?;
        Ok(())
    }

    /// Read and delete the marker. A malformed file is deleted too.
    pub async fn take(path: &Path) -> Option<Self> {
        let raw = tokio::fs::read_to_string(path).await.ok()?;
        let _ = tokio::fs::remove_file(path).await;
        match serde_json::from_str(&raw) {
            Ok(marker) => Some(marker),
            Err(e) => {
                tracing::warn!("ignoring malformed restart marker: {e}");
                None
            }
        }
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let mut bot = Bot::new(cfg.bot_token.clone());
    if let Some(url) = &cfg.bot_api_url {
        let url = reqwest::Url::parse(url).context("invalid BOT_API_URL")?;
        tracing::info!("using Bot API server {url}");
        bot = bot.set_api_url(url);
    }

    let me = bot.get_me().await.context("getMe failed, check BOT_TOKEN")?;
    let identity = BotIdentity {
        id: user_id_of(&me.user),
        username: me.username().to_string(),
        first_name: me.user.first_name.clone(),
    };
    tracing::info!("{BOT_NAME} v{BOT_VERSION} started as @{}", identity.username);
    tracing::info!(
        prefix = %cfg.command_prefix,
        sudo_users = cfg.sudo_users.len(),
        "access configured"
    );

    if cfg.enable_database && cfg.database_url.is_none() {
        tracing::warn!("ENABLE_DATABASE is set but DATABASE_URL is empty; running without a database");
    }
    let store = match Store::connect(cfg.database()).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("database unavailable, continuing without it: {e}");
            Store::Disabled
        }
    };

    let weather = cfg
        .weather_api_key
        .as_deref()
        .map(WeatherClient::new)
        .transpose()?;
    let translator = Translator::new(cfg.deepl_api_key.clone())?;
    let downloader = Downloader::new(cfg.download_dir.clone(), cfg.download_api_url.clone())?;
    tracing::info!(
        translate = translator.backend_name(),
        youtube = downloader.backend_name(),
        weather = weather.is_some(),
        "services ready"
    );

    let telegram = TelegramMessenger::new(bot.clone(), cfg.flood_wait_threshold);
    let messenger: Arc<dyn MessagingPort> = Arc::new(telegram.clone());
    let broadcaster: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        messenger.clone(),
        ThrottleConfig::default(),
    ));

    finish_pending_restart(messenger.as_ref(), &cfg.restart_file).await;

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        me: identity,
        roles: TelegramRoles::new(telegram.clone()),
        telegram,
        messenger,
        broadcaster,
        policy: AccessPolicy::from_config(&cfg),
        warnings: WarningTracker::from_config(&cfg),
        cooldowns: Cooldowns::from_registry(COMMANDS),
        store,
        transfers: Semaphore::new(cfg.max_workers),
        weather,
        translator,
        downloader,
        started_at: Instant::now(),
        shutdown: CancellationToken::new(),
    });

    tokio::spawn(send_startup_notice(state.clone()));
    let sweeper = spawn_warning_sweeper(state.clone());

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::callback::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state.clone()])
        .distribution_function(concurrent_updates)
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build();

    // A restart request cancels the token; stop polling once in-flight
    // handlers have finished.
    let stop = dispatcher.shutdown_token();
    let token = state.shutdown.clone();
    let watcher = tokio::spawn(async move {
        token.cancelled().await;
        match stop.shutdown() {
            Ok(done) => done.await,
            Err(e) => tracing::debug!("dispatcher already stopped: {e}"),
        }
    });

    dispatcher.dispatch().await;

    state.shutdown.cancel();
    for (task, handle) in [("shutdown watcher", watcher), ("warning sweeper", sweeper)] {
        if let Err(e) = handle.await {
            tracing::warn!("{task} task failed: {e}");
        }
    }
    state.store.close().await;
    tracing::info!("dispatcher stopped");

    Ok(())
}

/// No distribution key: every update runs in its own task instead of queueing
/// behind earlier updates from the same chat. Shared per-user state carries
/// its own locks.
fn concurrent_updates(_: &Update) -> Option<Infallible> {
    None
}

async fn finish_pending_restart(messenger: &dyn MessagingPort, path: &Path) {
    let Some(marker) = RestartMarker::take(path).await else {
        return;
    };
    if !marker.is_fresh(now_ms()) {
        tracing::debug!("restart marker expired");
        return;
    }
    if let Err(e) = messenger
        .edit_html(marker.message(), "✅ <b>Bot restarted</b>")
        .await
    {
        tracing::warn!("failed to update restart message: {e}");
    }
}

async fn send_startup_notice(state: Arc<AppState>) {
    tokio::time::sleep(Duration::from_secs(2)).await;

    let target = state
        .cfg
        .log_channel
        .unwrap_or(ChatId(state.cfg.owner_id.0));
    let html = format!(
        "🚀 <b>{}</b> started\n\n\
🤖 <b>Bot:</b> @{}\n\
📦 <b>Version:</b> <code>{BOT_VERSION}</code>\n\
🔧 <b>Prefix:</b> <code>{}</code>\n\
🗄️ <b>Database:</b> {}",
        escape_html(BOT_NAME),
        escape_html(&state.me.username),
        escape_html(&state.cfg.command_prefix),
        state.store.backend_name(),
    );
    if let Err(e) = state.messenger.send_html(target, &html).await {
        tracing::warn!(chat_id = target.0, "startup notice failed: {e}");
    }
}

fn spawn_warning_sweeper(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(WARNING_SWEEP_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = tick.tick() => {
                    let evicted = state.warnings.sweep_at(Instant::now()).await;
                    if evicted > 0 {
                        tracing::debug!(evicted, remaining = state.warnings.tracked(), "warning records swept");
                    }
                }
            }
        }
    })
}
