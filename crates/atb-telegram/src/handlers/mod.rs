//! Command registry and dispatch.
//!
//! Every command is declared once in [`COMMANDS`] with its access checks and
//! cooldown; [`handle_message`] parses the text, runs it through the
//! [`Pipeline`] and routes to the handler function. Handlers return `atb_core::Result` and never reply
//! with their own error banner: the wrapper does that uniformly.

use std::{
    collections::HashMap,
    future::{Future, IntoFuture},
    sync::Arc,
    time::Duration,
};

use teloxide::{
    prelude::*,
    types::{Message, User},
    RequestError,
};

use atb_core::{
    config::{BOT_NAME, BOT_VERSION},
    domain::{ChatKind, Invocation, MessageRef},
    errors::Error,
    formatting::{escape_html, mention_html},
    messaging::port::MessagingPort,
    security::{cooldown_message, AccessCheck, AccessPolicy, CommandCooldown, Gate, RoleLookup},
    utils::parse_command,
    Result,
};
use atb_storage::Store;

use crate::{message_ref, router::AppState, user_id_of};

pub mod admin;
pub mod basic;
pub mod callback;
pub mod media;
pub mod owner;
pub mod utility;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Basic,
    Utility,
    Media,
    Group,
    Owner,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Basic,
        Category::Utility,
        Category::Media,
        Category::Group,
        Category::Owner,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Category::Basic => "📌 Basic Commands",
            Category::Utility => "🔧 Utility Commands",
            Category::Media => "📥 Media Commands",
            Category::Group => "👥 Group Commands",
            Category::Owner => "👤 Owner Commands",
        }
    }
}

#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub category: Category,
    /// Argument synopsis, shown after the command name.
    pub usage: &'static str,
    pub desc: &'static str,
    pub checks: &'static [AccessCheck],
    /// Per-user cooldown; 0 disables it.
    pub cooldown_secs: u64,
}

impl CommandSpec {
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }

    pub fn synopsis(&self, prefix: &str) -> String {
        if self.usage.is_empty() {
            format!("{prefix}{}", self.name)
        } else {
            format!("{prefix}{} {}", self.name, self.usage)
        }
    }
}

const OPEN: &[AccessCheck] = &[];
const GROUP: &[AccessCheck] = &[AccessCheck::GroupOnly];
const GROUP_ADMIN: &[AccessCheck] = &[AccessCheck::GroupOnly, AccessCheck::AdminOnly];
const OWNER: &[AccessCheck] = &[AccessCheck::OwnerOnly];

const fn cmd(
    name: &'static str,
    aliases: &'static [&'static str],
    category: Category,
    usage: &'static str,
    desc: &'static str,
    checks: &'static [AccessCheck],
    cooldown_secs: u64,
) -> CommandSpec {
    CommandSpec {
        name,
        aliases,
        category,
        usage,
        desc,
        checks,
        cooldown_secs,
    }
}

pub const COMMANDS: &[CommandSpec] = &[
    // Basic
    cmd("help", &["start", "commands"], Category::Basic, "", "Show this help message", OPEN, 0),
    cmd("ping", &[], Category::Basic, "", "Check bot response time", OPEN, 0),
    cmd("alive", &[], Category::Basic, "", "Check if the bot is alive", OPEN, 0),
    cmd("stats", &[], Category::Basic, "", "Show bot statistics", OPEN, 0),
    cmd("id", &[], Category::Basic, "", "Get user/chat IDs", OPEN, 0),
    cmd("info", &[], Category::Basic, "[reply|user_id]", "User information", OPEN, 0),
    cmd("inline", &[], Category::Basic, "", "Inline keyboard demo", OPEN, 0),
    // Utility
    cmd("calc", &[], Category::Utility, "<expression>", "Calculate a math expression", OPEN, 3),
    cmd("weather", &[], Category::Utility, "<city>", "Current weather for a city", OPEN, 5),
    cmd("translate", &["tr"], Category::Utility, "<text|reply>", "Translate text to English", OPEN, 3),
    cmd("echo", &[], Category::Utility, "<text>", "Repeat the text", OPEN, 0),
    cmd("reverse", &[], Category::Utility, "<text>", "Reverse the text", OPEN, 0),
    cmd("uppercase", &[], Category::Utility, "<text|reply>", "Convert text to uppercase", OPEN, 0),
    cmd("lowercase", &[], Category::Utility, "<text|reply>", "Convert text to lowercase", OPEN, 0),
    // Media
    cmd("download", &[], Category::Media, "<url>", "Download a file from a direct URL", OPEN, 10),
    cmd("yt", &["youtube"], Category::Media, "<youtube_url>", "Download a YouTube video", OPEN, 10),
    cmd("ytaudio", &["yta"], Category::Media, "<youtube_url>", "Download YouTube audio", OPEN, 10),
    // Group
    cmd("chatinfo", &[], Category::Group, "", "Chat information", GROUP, 0),
    cmd("admins", &[], Category::Group, "", "List group administrators", GROUP, 0),
    cmd("report", &[], Category::Group, "[reason] (reply)", "Report a message to admins", GROUP, 0),
    cmd("ban", &[], Category::Group, "<reply|user_id> [reason]", "Ban a user", GROUP_ADMIN, 0),
    cmd("unban", &[], Category::Group, "<reply|user_id>", "Unban a user", GROUP_ADMIN, 0),
    cmd("tban", &[], Category::Group, "<reply|user_id> <time> [reason]", "Temporarily ban (5m, 2h, 1d, 1w)", GROUP_ADMIN, 0),
    cmd("kick", &[], Category::Group, "<reply|user_id> [reason]", "Kick a user", GROUP_ADMIN, 0),
    cmd("mute", &[], Category::Group, "<reply|user_id> [reason]", "Mute a user", GROUP_ADMIN, 0),
    cmd("unmute", &[], Category::Group, "<reply|user_id>", "Unmute a user", GROUP_ADMIN, 0),
    cmd("tmute", &[], Category::Group, "<reply|user_id> <time> [reason]", "Temporarily mute", GROUP_ADMIN, 0),
    cmd("promote", &[], Category::Group, "<reply|user_id> [title]", "Promote with basic rights", GROUP_ADMIN, 0),
    cmd("fullpromote", &[], Category::Group, "<reply|user_id> [title]", "Promote with all rights", GROUP_ADMIN, 0),
    cmd("demote", &[], Category::Group, "<reply|user_id>", "Remove admin rights", GROUP_ADMIN, 0),
    cmd("warn", &[], Category::Group, "<reply|user_id> [reason]", "Warn a user (3 = ban)", GROUP_ADMIN, 0),
    cmd("warnings", &[], Category::Group, "[reply|user_id]", "Show warnings", GROUP, 0),
    cmd("resetwarns", &[], Category::Group, "<reply|user_id>", "Reset warnings", GROUP_ADMIN, 0),
    cmd("pin", &[], Category::Group, "[silent] (reply)", "Pin the replied message", GROUP_ADMIN, 0),
    cmd("unpin", &[], Category::Group, "[reply]", "Unpin the replied or latest message", GROUP_ADMIN, 0),
    cmd("unpinall", &[], Category::Group, "", "Unpin all messages", GROUP_ADMIN, 0),
    cmd("purge", &[], Category::Group, "(reply)", "Delete messages from the replied one", GROUP_ADMIN, 0),
    cmd("del", &[], Category::Group, "(reply)", "Delete the replied message", GROUP_ADMIN, 0),
    cmd("lock", &[], Category::Group, "", "Only admins can send messages", GROUP_ADMIN, 0),
    cmd("unlock", &[], Category::Group, "", "Everyone can send messages", GROUP_ADMIN, 0),
    // Owner
    cmd("restart", &[], Category::Owner, "", "Restart the bot", OWNER, 0),
    cmd("shell", &["sh"], Category::Owner, "<command>", "Execute a shell command", OWNER, 0),
    cmd("logs", &[], Category::Owner, "[lines]", "Show recent log lines", OWNER, 0),
    cmd("broadcast", &[], Category::Owner, "<text|reply>", "Send to every known user", OWNER, 0),
    cmd("eval", &[], Category::Owner, "<expression>", "Parse and evaluate an expression", OWNER, 0),
    cmd("stats_db", &[], Category::Owner, "", "Database statistics", OWNER, 0),
];

pub fn find_command(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.matches(name))
}

/// Help text grouped by category. Owner commands are listed only for the owner.
pub fn help_text(prefix: &str, include_owner: bool) -> String {
    let mut out = format!("🤖 <b>{} - Commands</b>\n", escape_html(BOT_NAME));
    for category in Category::ALL {
        if category == Category::Owner && !include_owner {
            continue;
        }
        out.push_str(&format!("\n<b>{}</b>\n", category.title()));
        for spec in COMMANDS.iter().filter(|c| c.category == category) {
            out.push_str(&format!(
                "• <code>{}</code> - {}\n",
                escape_html(&spec.synopsis(prefix)),
                escape_html(spec.desc)
            ));
        }
    }
    out.push_str(&format!(
        "\nℹ️ <b>Version:</b> <code>{BOT_VERSION}</code>\n<b>Prefix:</b> <code>{}</code> (or <code>/</code>)",
        escape_html(prefix)
    ));
    out
}

/// One cooldown map per rate-limited command, keyed by canonical name.
#[derive(Debug, Default)]
pub struct Cooldowns {
    by_command: HashMap<&'static str, CommandCooldown>,
}

impl Cooldowns {
    pub fn from_registry(specs: &[CommandSpec]) -> Self {
        let by_command = specs
            .iter()
            .filter(|s| s.cooldown_secs > 0)
            .map(|s| (s.name, CommandCooldown::new(Duration::from_secs(s.cooldown_secs))))
            .collect();
        Self { by_command }
    }

    pub fn get(&self, name: &str) -> Option<&CommandCooldown> {
        self.by_command.get(name)
    }
}

/// Everything a command handler needs about one invocation.
pub struct Ctx<'a> {
    pub bot: Bot,
    pub msg: &'a Message,
    pub from: &'a User,
    pub state: &'a AppState,
    pub spec: &'static CommandSpec,
    pub args: String,
    pub inv: Invocation,
}

impl Ctx<'_> {
    pub fn origin(&self) -> MessageRef {
        message_ref(self.msg)
    }

    pub fn chat(&self) -> teloxide::types::ChatId {
        self.msg.chat.id
    }

    pub fn prefix(&self) -> &str {
        &self.state.cfg.command_prefix
    }

    pub fn replied(&self) -> Option<&Message> {
        self.msg.reply_to_message()
    }

    pub fn caller_mention(&self) -> String {
        mention_html(user_id_of(self.from), &self.from.full_name())
    }

    pub async fn reply(&self, html: &str) -> Result<MessageRef> {
        self.state.messenger.reply_html(self.origin(), html).await
    }

    pub async fn edit(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.state.messenger.edit_html(msg, html).await
    }

    /// Bot API call with the flood-wait retry policy.
    pub async fn call<T, Fut>(&self, op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        self.state.telegram.call(op).await
    }

    pub fn usage_error(&self, msg: impl Into<String>) -> Error {
        Error::InvalidArgument(msg.into())
    }
}

pub fn chat_kind(chat: &teloxide::types::Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Group
    }
}

/// The stages every command passes through before its handler: access
/// checks, per-user cooldown and usage statistics.
///
/// Holds no per-chat state, so invocations in the same chat run side by side.
pub struct Pipeline<'a> {
    pub messenger: &'a dyn MessagingPort,
    pub policy: &'a AccessPolicy,
    pub roles: &'a dyn RoleLookup,
    pub cooldowns: &'a Cooldowns,
    pub store: &'a Store,
}

impl<'a> Pipeline<'a> {
    pub fn from_state(state: &'a AppState) -> Self {
        Self {
            messenger: state.messenger.as_ref(),
            policy: &state.policy,
            roles: &state.roles,
            cooldowns: &state.cooldowns,
            store: &state.store,
        }
    }

    /// Run `body` for one invocation. Rejections and cooldowns are answered
    /// here as replies to `origin`; the body's own error is returned.
    pub async fn run<F, Fut>(
        &self,
        spec: &'static CommandSpec,
        inv: &Invocation,
        origin: MessageRef,
        body: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let outcome = Gate::new(spec.checks)
            .run(self.policy, inv, self.roles, move || async move {
                if let Some(cooldown) = self.cooldowns.get(spec.name) {
                    if let Err(remaining) = cooldown.allow(inv.user_id) {
                        self.messenger
                            .reply_html(origin, &cooldown_message(remaining))
                            .await?;
                        return Ok(());
                    }
                }

                tracing::info!(
                    command = spec.name,
                    user_id = inv.user_id.0,
                    chat_id = inv.chat_id.0,
                    "command"
                );
                self.record_usage(spec).await;
                body().await
            })
            .await;

        match outcome {
            Ok(result) => result,
            Err(rejection) => {
                tracing::debug!(
                    command = spec.name,
                    user_id = inv.user_id.0,
                    ?rejection,
                    "command rejected"
                );
                if let Err(e) = self.messenger.reply_html(origin, rejection.message()).await {
                    tracing::warn!("failed to send rejection: {e}");
                }
                Ok(())
            }
        }
    }

    async fn record_usage(&self, spec: &CommandSpec) {
        let per_command = format!("cmd:{}", spec.name);
        for stat in ["commands_total", per_command.as_str()] {
            if let Err(e) = self.store.increment_stat(stat, 1).await {
                tracing::debug!("stat update failed: {e}");
                return;
            }
        }
    }
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(parsed) = parse_command(text, &state.cfg.command_prefix, Some(&state.me.username))
    else {
        return Ok(());
    };
    let Some(spec) = find_command(&parsed.name) else {
        tracing::trace!(command = %parsed.name, "unknown command");
        return Ok(());
    };

    let inv = Invocation {
        user_id: user_id_of(from),
        chat_id: atb_core::domain::ChatId(msg.chat.id.0),
        chat_kind: chat_kind(&msg.chat),
    };

    if let Err(e) = state
        .store
        .add_user(inv.user_id, from.username.as_deref(), Some(&from.first_name))
        .await
    {
        tracing::debug!(user_id = inv.user_id.0, "failed to record user: {e}");
    }

    let ctx = Ctx {
        bot,
        msg: &msg,
        from,
        state: &state,
        spec,
        args: parsed.args,
        inv,
    };

    let result = Pipeline::from_state(&state)
        .run(spec, &inv, ctx.origin(), || route(&ctx))
        .await;
    if let Err(e) = result {
        report_error(&ctx, e).await;
    }

    Ok(())
}

async fn route(ctx: &Ctx<'_>) -> Result<()> {
    match ctx.spec.name {
        "help" => basic::help(ctx).await,
        "ping" => basic::ping(ctx).await,
        "alive" => basic::alive(ctx).await,
        "stats" => basic::stats(ctx).await,
        "id" => basic::id(ctx).await,
        "info" => basic::info(ctx).await,
        "inline" => basic::inline(ctx).await,

        "calc" => utility::calc(ctx).await,
        "weather" => utility::weather(ctx).await,
        "translate" => utility::translate(ctx).await,
        "echo" => utility::echo(ctx).await,
        "reverse" => utility::reverse(ctx).await,
        "uppercase" => utility::uppercase(ctx).await,
        "lowercase" => utility::lowercase(ctx).await,

        "download" => media::download(ctx).await,
        "yt" => media::youtube_video(ctx).await,
        "ytaudio" => media::youtube_audio(ctx).await,

        "chatinfo" => admin::chat_info(ctx).await,
        "admins" => admin::list_admins(ctx).await,
        "report" => admin::report(ctx).await,
        "ban" => admin::ban(ctx).await,
        "unban" => admin::unban(ctx).await,
        "tban" => admin::temp_ban(ctx).await,
        "kick" => admin::kick(ctx).await,
        "mute" => admin::mute(ctx).await,
        "unmute" => admin::unmute(ctx).await,
        "tmute" => admin::temp_mute(ctx).await,
        "promote" => admin::promote(ctx, admin::AdminRights::BASIC).await,
        "fullpromote" => admin::promote(ctx, admin::AdminRights::FULL).await,
        "demote" => admin::demote(ctx).await,
        "warn" => admin::warn(ctx).await,
        "warnings" => admin::warnings(ctx).await,
        "resetwarns" => admin::reset_warnings(ctx).await,
        "pin" => admin::pin(ctx).await,
        "unpin" => admin::unpin(ctx).await,
        "unpinall" => admin::unpin_all(ctx).await,
        "purge" => admin::purge(ctx).await,
        "del" => admin::delete(ctx).await,
        "lock" => admin::lock(ctx).await,
        "unlock" => admin::unlock(ctx).await,

        "restart" => owner::restart(ctx).await,
        "shell" => owner::shell(ctx).await,
        "logs" => owner::logs(ctx).await,
        "broadcast" => owner::broadcast(ctx).await,
        "eval" => owner::eval(ctx).await,
        "stats_db" => owner::stats_db(ctx).await,

        other => {
            tracing::warn!("no handler registered for {other}");
            Ok(())
        }
    }
}

/// Reply text for a handler error and whether it is an unexpected failure.
pub fn error_reply(err: &Error, prefix: &str, spec: &CommandSpec) -> (String, bool) {
    let text = escape_html(&err.to_string());
    match err {
        Error::Permission(_) => (format!("❌ {text}"), false),
        e if e.is_usage() => (
            format!(
                "❌ {text}\n\n<b>Usage:</b> <code>{}</code>",
                escape_html(&spec.synopsis(prefix))
            ),
            false,
        ),
        _ => (
            format!("❌ An error occurred: {text}\n\nThis error has been logged."),
            true,
        ),
    }
}

async fn report_error(ctx: &Ctx<'_>, err: Error) {
    let (html, unexpected) = error_reply(&err, ctx.prefix(), ctx.spec);

    if unexpected {
        tracing::error!(
            command = ctx.spec.name,
            user_id = ctx.inv.user_id.0,
            chat_id = ctx.inv.chat_id.0,
            "command failed: {err}"
        );
    } else {
        tracing::debug!(command = ctx.spec.name, "command refused: {err}");
    }

    if let Err(e) = ctx.reply(&html).await {
        tracing::warn!("failed to send error reply: {e}");
    }

    if !unexpected {
        return;
    }
    if let Some(channel) = ctx.state.cfg.log_channel {
        let notice = format!(
            "⚠️ <b>Error in</b> <code>{}</code>\n\n\
👤 <b>User:</b> {} (<code>{}</code>)\n\
💬 <b>Chat:</b> <code>{}</code>\n\n\
<pre>{}</pre>",
            escape_html(ctx.spec.name),
            ctx.caller_mention(),
            ctx.inv.user_id.0,
            ctx.inv.chat_id.0,
            escape_html(&err.to_string()),
        );
        if let Err(e) = ctx.state.messenger.send_html(channel, &notice).await {
            tracing::warn!("failed to post to log channel: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex as StdMutex,
        },
    };

    use atb_core::{
        domain::{ChatId, MemberRole, MessageId, UserId},
        messaging::types::{ChatAction, OutgoingFile},
    };

    use super::*;

    #[derive(Default)]
    struct RecordingPort {
        replies: StdMutex<Vec<(MessageRef, String)>>,
    }

    impl RecordingPort {
        fn replies(&self) -> Vec<String> {
            self.replies
                .lock()
                .unwrap()
                .iter()
                .map(|(_, html)| html.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl MessagingPort for RecordingPort {
        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
            let to = MessageRef {
                chat_id,
                message_id: MessageId(0),
            };
            self.reply_html(to, html).await
        }

        async fn reply_html(&self, to: MessageRef, html: &str) -> Result<MessageRef> {
            let mut replies = self.replies.lock().unwrap();
            replies.push((to, html.to_string()));
            Ok(MessageRef {
                chat_id: to.chat_id,
                message_id: MessageId(1000 + replies.len() as i32),
            })
        }

        async fn edit_html(&self, _msg: MessageRef, _html: &str) -> Result<()> {
            Ok(())
        }

        async fn delete_message(&self, _msg: MessageRef) -> Result<()> {
            Ok(())
        }

        async fn forward_message(&self, _to: ChatId, msg: MessageRef) -> Result<MessageRef> {
            Ok(msg)
        }

        async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
            Ok(())
        }

        async fn send_file(&self, to: MessageRef, _file: OutgoingFile) -> Result<MessageRef> {
            Ok(to)
        }
    }

    struct FixedRole(MemberRole);

    #[async_trait::async_trait]
    impl RoleLookup for FixedRole {
        async fn member_role(&self, _chat_id: ChatId, _user_id: UserId) -> Result<MemberRole> {
            Ok(self.0)
        }
    }

    struct Fixture {
        port: RecordingPort,
        policy: AccessPolicy,
        roles: FixedRole,
        cooldowns: Cooldowns,
        store: Store,
    }

    impl Fixture {
        fn new(store: Store) -> Self {
            Self {
                port: RecordingPort::default(),
                policy: AccessPolicy::new(UserId(1), Vec::new()),
                roles: FixedRole(MemberRole::Member),
                cooldowns: Cooldowns::from_registry(COMMANDS),
                store,
            }
        }

        fn pipeline(&self) -> Pipeline<'_> {
            Pipeline {
                messenger: &self.port,
                policy: &self.policy,
                roles: &self.roles,
                cooldowns: &self.cooldowns,
                store: &self.store,
            }
        }
    }

    fn invocation(user: i64, chat_kind: ChatKind) -> Invocation {
        Invocation {
            user_id: UserId(user),
            chat_id: ChatId(-100),
            chat_kind,
        }
    }

    fn origin(id: i32) -> MessageRef {
        MessageRef {
            chat_id: ChatId(-100),
            message_id: MessageId(id),
        }
    }

    fn spec(name: &str) -> &'static CommandSpec {
        find_command(name).unwrap()
    }

    #[test]
    fn registry_names_and_aliases_are_unique() {
        let mut seen = HashSet::new();
        for spec in COMMANDS {
            assert!(seen.insert(spec.name), "duplicate {}", spec.name);
            for alias in spec.aliases {
                assert!(seen.insert(*alias), "duplicate alias {alias}");
            }
        }
    }

    #[test]
    fn aliases_resolve_to_canonical_command() {
        assert_eq!(find_command("tr").map(|c| c.name), Some("translate"));
        assert_eq!(find_command("youtube").map(|c| c.name), Some("yt"));
        assert_eq!(find_command("yta").map(|c| c.name), Some("ytaudio"));
        assert_eq!(find_command("start").map(|c| c.name), Some("help"));
        assert!(find_command("nope").is_none());
    }

    #[test]
    fn checks_and_cooldowns_match_the_command_table() {
        let ban = find_command("ban").unwrap();
        assert_eq!(ban.checks, &[AccessCheck::GroupOnly, AccessCheck::AdminOnly]);
        assert_eq!(find_command("warnings").unwrap().checks, &[AccessCheck::GroupOnly]);
        assert_eq!(find_command("shell").unwrap().checks, &[AccessCheck::OwnerOnly]);
        // One info command serves private chats and groups alike.
        assert!(find_command("info").unwrap().checks.is_empty());
        assert!(find_command("inline").unwrap().checks.is_empty());

        let cooldowns = Cooldowns::from_registry(COMMANDS);
        let window = |name: &str| cooldowns.get(name).map(|c| c.window().as_secs());
        assert_eq!(window("calc"), Some(3));
        assert_eq!(window("translate"), Some(3));
        assert_eq!(window("weather"), Some(5));
        assert_eq!(window("download"), Some(10));
        assert_eq!(window("yt"), Some(10));
        assert_eq!(window("ytaudio"), Some(10));
        assert_eq!(window("ping"), None);
    }

    #[test]
    fn help_hides_owner_section_from_others() {
        let public = help_text(".", false);
        assert!(public.contains("<code>.ban &lt;reply|user_id&gt; [reason]</code>"));
        assert!(!public.contains(".shell"));

        let owner = help_text("!", true);
        assert!(owner.contains("<code>!shell &lt;command&gt;</code>"));
        assert!(owner.contains("👤 Owner Commands"));
    }

    #[test]
    fn error_replies_by_kind() {
        let spec = find_command("tban").unwrap();

        let (html, unexpected) =
            error_reply(&Error::Permission("Bad Request: not enough rights".into()), ".", spec);
        assert_eq!(html, "❌ Bad Request: not enough rights");
        assert!(!unexpected);

        let (html, unexpected) =
            error_reply(&Error::InvalidArgument("invalid duration 'x'".into()), ".", spec);
        assert!(html.starts_with("❌ invalid duration 'x'"));
        assert!(html.contains("<code>.tban &lt;reply|user_id&gt; &lt;time&gt; [reason]</code>"));
        assert!(!unexpected);

        let (html, unexpected) = error_reply(&Error::External("timeout".into()), ".", spec);
        assert_eq!(
            html,
            "❌ An error occurred: timeout\n\nThis error has been logged."
        );
        assert!(unexpected);
    }

    #[tokio::test]
    async fn rejected_command_replies_and_skips_handler() {
        let f = Fixture::new(Store::Disabled);
        let ran = &AtomicUsize::new(0);

        let r = f
            .pipeline()
            .run(spec("ban"), &invocation(50, ChatKind::Group), origin(1), move || async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(r.is_ok());

        f.pipeline()
            .run(spec("ban"), &invocation(50, ChatKind::Private), origin(2), move || async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(
            f.port.replies(),
            vec![
                "❌ This command is only available to group administrators.".to_string(),
                "❌ This command can only be used in groups.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn cooldown_answers_repeat_calls_per_user() {
        let f = Fixture::new(Store::Disabled);
        let p = f.pipeline();
        let calls = &AtomicUsize::new(0);

        for (user, id) in [(7, 1), (7, 2), (8, 3)] {
            p.run(spec("calc"), &invocation(user, ChatKind::Private), origin(id), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            f.port.replies(),
            vec!["⏳ Please wait 3 seconds before using this command again.".to_string()]
        );
    }

    #[tokio::test]
    async fn executed_commands_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.db");
        let store = Store::connect(Some(path.to_str().unwrap())).await.unwrap();
        let f = Fixture::new(store);
        let p = f.pipeline();

        p.run(spec("ping"), &invocation(7, ChatKind::Private), origin(1), || async { Ok(()) })
            .await
            .unwrap();
        p.run(spec("ping"), &invocation(8, ChatKind::Group), origin(2), || async { Ok(()) })
            .await
            .unwrap();
        // Rejected before the handler, so not counted.
        p.run(spec("ban"), &invocation(7, ChatKind::Private), origin(3), || async { Ok(()) })
            .await
            .unwrap();

        assert_eq!(f.store.get_stat("commands_total").await.unwrap(), 2);
        assert_eq!(f.store.get_stat("cmd:ping").await.unwrap(), 2);
        assert_eq!(f.store.get_stat("cmd:ban").await.unwrap(), 0);
        f.store.close().await;
    }

    #[tokio::test]
    async fn handler_error_is_returned_for_reporting() {
        let f = Fixture::new(Store::Disabled);
        // The owner bypasses the admin lookup.
        let err = f
            .pipeline()
            .run(spec("tban"), &invocation(1, ChatKind::Supergroup), origin(1), || async {
                Err(Error::InvalidArgument("invalid duration 'x'".into()))
            })
            .await
            .unwrap_err();

        assert!(err.is_usage());
        assert!(f.port.replies().is_empty());
    }

    #[tokio::test]
    async fn slow_command_does_not_hold_up_the_chat() {
        let f = Fixture::new(Store::Disabled);
        let p = f.pipeline();
        let inv = invocation(7, ChatKind::Group);
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        let slow = p.run(spec("ping"), &inv, origin(1), move || async move {
            let _ = released.await;
            Ok(())
        });
        tokio::pin!(slow);

        let port = &f.port;
        let fast = p.run(spec("id"), &inv, origin(2), move || async move {
            port.reply_html(origin(2), "fast").await.map(|_| ())
        });

        tokio::select! {
            biased;
            _ = &mut slow => panic!("slow command finished before it was released"),
            r = fast => r.unwrap(),
        }
        assert_eq!(f.port.replies(), vec!["fast".to_string()]);

        release.send(()).unwrap();
        slow.await.unwrap();
    }
}
