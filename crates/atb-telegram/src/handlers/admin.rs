//! Group administration: moderation actions, warnings, pins, purge, locks
//! and chat/admin listings.

use std::time::Duration;

use chrono::{DateTime, Utc};
use teloxide::{
    payloads::PromoteChatMemberSetters,
    prelude::*,
    types::{ChatMemberKind, ChatPermissions, MessageEntityKind, User},
};

use atb_core::{
    domain::UserId,
    errors::Error,
    formatting::{escape_html, mention_html},
    moderation::WarnOutcome,
    security::RoleLookup,
    utils::{parse_duration, split_first_arg},
    Result,
};

use super::Ctx;
use crate::{custom_title, member_role, tg_user, user_id_of};

const NO_REASON: &str = "No reason provided";
const COULD_NOT_FIND: &str =
    "Could not find user\n💡 Tip: Reply to the user's message instead of using a username";

/// Telegram's limit for administrator custom titles.
const MAX_TITLE_CHARS: usize = 16;

const PURGE_CHUNK: usize = 100;
const PURGE_MAX: i32 = 1000;
const PURGE_NOTICE_TTL: Duration = Duration::from_secs(3);

// ============== Target Resolution ==============

/// The user a moderation command acts on, plus the arguments left over
/// after the user reference.
#[derive(Clone, Debug)]
pub(crate) struct Target {
    pub user: User,
    pub rest: String,
}

impl Target {
    pub fn id(&self) -> UserId {
        user_id_of(&self.user)
    }

    pub fn mention(&self) -> String {
        mention(&self.user)
    }
}

fn mention(user: &User) -> String {
    mention_html(user_id_of(user), &user.full_name())
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum UserRef<'a> {
    Id(i64),
    Username(&'a str),
}

fn parse_user_ref(token: &str) -> Option<UserRef<'_>> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if let Ok(id) = token.parse::<i64>() {
        return (id > 0).then_some(UserRef::Id(id));
    }
    let name = token.trim_start_matches('@');
    (!name.is_empty()).then_some(UserRef::Username(name))
}

/// Byte index of a UTF-16 code unit offset (entity offsets are UTF-16).
fn utf16_to_byte(text: &str, utf16_pos: usize) -> Option<usize> {
    let mut units = 0usize;
    for (idx, ch) in text.char_indices() {
        if units == utf16_pos {
            return Some(idx);
        }
        units += ch.len_utf16();
        if units > utf16_pos {
            return None;
        }
    }
    (units == utf16_pos).then_some(text.len())
}

/// First text-mention entity and the byte offset right after it.
fn text_mention(msg: &Message) -> Option<(User, usize)> {
    let text = msg.text()?;
    msg.entities()?.iter().find_map(|e| match &e.kind {
        MessageEntityKind::TextMention { user } => {
            Some((user.clone(), utf16_to_byte(text, e.offset + e.length)?))
        }
        _ => None,
    })
}

/// Replied-to sender, else a text mention, else a numeric id looked up in
/// the current chat. When the target came from a reply the whole argument
/// string is left over.
pub(crate) async fn resolve_target(ctx: &Ctx<'_>) -> Result<Target> {
    if let Some(user) = ctx.replied().and_then(|m| m.from()) {
        return Ok(Target {
            user: user.clone(),
            rest: ctx.args.trim().to_string(),
        });
    }

    if let Some((user, end)) = text_mention(ctx.msg) {
        let text = ctx.msg.text().unwrap_or_default();
        return Ok(Target {
            user,
            rest: text.get(end..).unwrap_or_default().trim().to_string(),
        });
    }

    let (token, rest) = split_first_arg(&ctx.args);
    match parse_user_ref(token) {
        None => Err(ctx.usage_error("Reply to a user or provide a user ID")),
        Some(UserRef::Username(name)) => {
            tracing::debug!(username = name, "username targets cannot be resolved");
            Err(Error::NotFound(COULD_NOT_FIND.to_string()))
        }
        Some(UserRef::Id(id)) => {
            let bot = ctx.bot.clone();
            let chat = ctx.chat();
            let member = ctx
                .call(|| bot.get_chat_member(chat, tg_user(UserId(id))))
                .await
                .map_err(|e| {
                    tracing::debug!(user_id = id, "target lookup failed: {e}");
                    Error::NotFound(COULD_NOT_FIND.to_string())
                })?;
            Ok(Target {
                user: member.user,
                rest: rest.to_string(),
            })
        }
    }
}

/// Refuse actions against the bot itself, the owner/sudo set and chat admins.
async fn ensure_moderatable(ctx: &Ctx<'_>, target: &Target, action: &str) -> Result<()> {
    let id = target.id();
    if id == ctx.state.me.id {
        return Err(Error::Permission(format!("I can't {action} myself")));
    }
    if ctx.state.policy.is_sudo(id) {
        return Err(Error::Permission(format!("Cannot {action} the bot owner or sudo users")));
    }
    match ctx.state.roles.member_role(ctx.inv.chat_id, id).await {
        Ok(role) if role.is_admin() => {
            Err(Error::Permission(format!("Cannot {action} administrators")))
        }
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::debug!(user_id = id.0, "role lookup failed, letting the API decide: {e}");
            Ok(())
        }
    }
}

// ============== Formatting ==============

fn reason_or_default(rest: &str) -> String {
    let rest = rest.trim();
    if rest.is_empty() {
        NO_REASON.to_string()
    } else {
        escape_html(rest)
    }
}

/// Standard moderation reply: header, target, extra lines, acting admin.
fn card(header: &str, user_id: UserId, user_mention: &str, extra: &[String], by: &str) -> String {
    let mut out = format!(
        "{header}\n👤 User: {user_mention}\n🆔 ID: <code>{}</code>\n",
        user_id.0
    );
    for line in extra {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&format!("👮 By: {by}"));
    out
}

fn target_card(ctx: &Ctx<'_>, header: &str, target: &Target, extra: &[String]) -> String {
    card(header, target.id(), &target.mention(), extra, &ctx.caller_mention())
}

fn until(d: Duration) -> Result<DateTime<Utc>> {
    let d = chrono::Duration::from_std(d)
        .map_err(|_| Error::InvalidArgument("duration out of range".to_string()))?;
    Ok(Utc::now() + d)
}

/// Split `<time> [reason]` and parse the time.
fn timed_args(rest: &str) -> Result<(String, Duration, String)> {
    let (raw, reason) = split_first_arg(rest);
    if raw.is_empty() {
        return Err(Error::InvalidArgument(
            "Missing duration (e.g. 5m, 2h, 1d)".to_string(),
        ));
    }
    Ok((raw.to_string(), parse_duration(raw)?, reason.to_string()))
}

/// Regular member permissions: send anything, no chat management.
fn member_permissions() -> ChatPermissions {
    let mut p = ChatPermissions::all();
    p.remove(
        ChatPermissions::CHANGE_INFO | ChatPermissions::INVITE_USERS | ChatPermissions::PIN_MESSAGES,
    );
    p
}

/// Chat defaults after `unlock`: members may also invite.
fn unlocked_permissions() -> ChatPermissions {
    member_permissions() | ChatPermissions::INVITE_USERS
}

// ============== Ban / Kick / Mute ==============

pub async fn ban(ctx: &Ctx<'_>) -> Result<()> {
    let target = resolve_target(ctx).await?;
    ensure_moderatable(ctx, &target, "ban").await?;

    let (bot, chat, user) = (ctx.bot.clone(), ctx.chat(), tg_user(target.id()));
    ctx.call(|| bot.ban_chat_member(chat, user)).await?;

    let reason = reason_or_default(&target.rest);
    ctx.reply(&target_card(
        ctx,
        "🚫 <b>User Banned</b>",
        &target,
        &[format!("📝 Reason: {reason}")],
    ))
    .await?;
    Ok(())
}

pub async fn unban(ctx: &Ctx<'_>) -> Result<()> {
    let target = resolve_target(ctx).await?;

    let (bot, chat, user) = (ctx.bot.clone(), ctx.chat(), tg_user(target.id()));
    ctx.call(|| bot.unban_chat_member(chat, user).only_if_banned(true))
        .await?;

    ctx.reply(&target_card(ctx, "✅ <b>User Unbanned</b>", &target, &[]))
        .await?;
    Ok(())
}

pub async fn temp_ban(ctx: &Ctx<'_>) -> Result<()> {
    let target = resolve_target(ctx).await?;
    let (raw, duration, reason) = timed_args(&target.rest)?;
    ensure_moderatable(ctx, &target, "ban").await?;

    let until = until(duration)?;
    let (bot, chat, user) = (ctx.bot.clone(), ctx.chat(), tg_user(target.id()));
    ctx.call(|| bot.ban_chat_member(chat, user).until_date(until))
        .await?;

    ctx.reply(&target_card(
        ctx,
        "⏰ <b>User Temporarily Banned</b>",
        &target,
        &[
            format!("⏱️ Duration: {}", escape_html(&raw)),
            format!("📝 Reason: {}", reason_or_default(&reason)),
        ],
    ))
    .await?;
    Ok(())
}

pub async fn kick(ctx: &Ctx<'_>) -> Result<()> {
    let target = resolve_target(ctx).await?;
    ensure_moderatable(ctx, &target, "kick").await?;

    let (bot, chat, user) = (ctx.bot.clone(), ctx.chat(), tg_user(target.id()));
    ctx.call(|| bot.ban_chat_member(chat, user)).await?;
    ctx.call(|| bot.unban_chat_member(chat, user).only_if_banned(true))
        .await?;

    let reason = reason_or_default(&target.rest);
    ctx.reply(&target_card(
        ctx,
        "👢 <b>User Kicked</b>",
        &target,
        &[format!("📝 Reason: {reason}")],
    ))
    .await?;
    Ok(())
}

pub async fn mute(ctx: &Ctx<'_>) -> Result<()> {
    let target = resolve_target(ctx).await?;
    ensure_moderatable(ctx, &target, "mute").await?;

    let (bot, chat, user) = (ctx.bot.clone(), ctx.chat(), tg_user(target.id()));
    ctx.call(|| bot.restrict_chat_member(chat, user, ChatPermissions::empty()))
        .await?;

    let reason = reason_or_default(&target.rest);
    ctx.reply(&target_card(
        ctx,
        "🔇 <b>User Muted</b>",
        &target,
        &[format!("📝 Reason: {reason}")],
    ))
    .await?;
    Ok(())
}

pub async fn unmute(ctx: &Ctx<'_>) -> Result<()> {
    let target = resolve_target(ctx).await?;

    let (bot, chat, user) = (ctx.bot.clone(), ctx.chat(), tg_user(target.id()));
    ctx.call(|| bot.restrict_chat_member(chat, user, member_permissions()))
        .await?;

    ctx.reply(&target_card(ctx, "🔊 <b>User Unmuted</b>", &target, &[]))
        .await?;
    Ok(())
}

pub async fn temp_mute(ctx: &Ctx<'_>) -> Result<()> {
    let target = resolve_target(ctx).await?;
    let (raw, duration, reason) = timed_args(&target.rest)?;
    ensure_moderatable(ctx, &target, "mute").await?;

    let until = until(duration)?;
    let (bot, chat, user) = (ctx.bot.clone(), ctx.chat(), tg_user(target.id()));
    ctx.call(|| {
        bot.restrict_chat_member(chat, user, ChatPermissions::empty())
            .until_date(until)
    })
    .await?;

    ctx.reply(&target_card(
        ctx,
        "⏰ <b>User Temporarily Muted</b>",
        &target,
        &[
            format!("⏱️ Duration: {}", escape_html(&raw)),
            format!("📝 Reason: {}", reason_or_default(&reason)),
        ],
    ))
    .await?;
    Ok(())
}

// ============== Promote / Demote ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdminRights {
    pub manage_chat: bool,
    pub delete_messages: bool,
    pub manage_video_chats: bool,
    pub restrict_members: bool,
    pub promote_members: bool,
    pub change_info: bool,
    pub invite_users: bool,
    pub pin_messages: bool,
}

impl AdminRights {
    /// Everything except adding new admins.
    pub const BASIC: Self = Self {
        manage_chat: true,
        delete_messages: true,
        manage_video_chats: true,
        restrict_members: true,
        promote_members: false,
        change_info: true,
        invite_users: true,
        pin_messages: true,
    };

    pub const FULL: Self = Self {
        promote_members: true,
        ..Self::BASIC
    };

    pub const NONE: Self = Self {
        manage_chat: false,
        delete_messages: false,
        manage_video_chats: false,
        restrict_members: false,
        promote_members: false,
        change_info: false,
        invite_users: false,
        pin_messages: false,
    };

    fn apply<R: PromoteChatMemberSetters>(self, req: R) -> R {
        req.can_manage_chat(self.manage_chat)
            .can_delete_messages(self.delete_messages)
            .can_manage_video_chats(self.manage_video_chats)
            .can_restrict_members(self.restrict_members)
            .can_promote_members(self.promote_members)
            .can_change_info(self.change_info)
            .can_invite_users(self.invite_users)
            .can_pin_messages(self.pin_messages)
    }
}

fn admin_title(rest: &str) -> String {
    let rest = rest.trim();
    if rest.is_empty() {
        return "Admin".to_string();
    }
    rest.chars().take(MAX_TITLE_CHARS).collect()
}

pub async fn promote(ctx: &Ctx<'_>, rights: AdminRights) -> Result<()> {
    let target = resolve_target(ctx).await?;
    if target.id() == ctx.state.me.id {
        return Err(Error::Permission("I can't promote myself".to_string()));
    }
    let title = admin_title(&target.rest);

    let (bot, chat, user) = (ctx.bot.clone(), ctx.chat(), tg_user(target.id()));
    ctx.call(|| rights.apply(bot.promote_chat_member(chat, user)))
        .await?;

    // Custom titles only exist in supergroups.
    if let Err(e) = ctx
        .call(|| bot.set_chat_administrator_custom_title(chat, user, title.clone()))
        .await
    {
        tracing::debug!("custom title not set: {e}");
    }

    let (header, note) = if rights.promote_members {
        (
            "⬆️ <b>User Fully Promoted</b>",
            "✅ Has all admin rights, including adding admins",
        )
    } else {
        ("⬆️ <b>User Promoted</b>", "✅ Now has admin privileges")
    };
    ctx.reply(&target_card(
        ctx,
        header,
        &target,
        &[format!("🏷️ Title: {}", escape_html(&title)), note.to_string()],
    ))
    .await?;
    Ok(())
}

pub async fn demote(ctx: &Ctx<'_>) -> Result<()> {
    let target = resolve_target(ctx).await?;
    if target.id() == ctx.state.me.id {
        return Err(Error::Permission("I can't demote myself".to_string()));
    }

    let (bot, chat, user) = (ctx.bot.clone(), ctx.chat(), tg_user(target.id()));
    ctx.call(|| AdminRights::NONE.apply(bot.promote_chat_member(chat, user)))
        .await?;

    ctx.reply(&target_card(
        ctx,
        "⬇️ <b>User Demoted</b>",
        &target,
        &[
            "❌ Admin privileges removed".to_string(),
            "✅ User is now a regular member".to_string(),
        ],
    ))
    .await?;
    Ok(())
}

// ============== Warnings ==============

pub async fn warn(ctx: &Ctx<'_>) -> Result<()> {
    let target = resolve_target(ctx).await?;
    ensure_moderatable(ctx, &target, "warn").await?;

    let reason = reason_or_default(&target.rest);
    let warnings = &ctx.state.warnings;
    let limit = warnings.limit();

    let telegram = ctx.state.telegram.clone();
    let (bot, chat, user) = (ctx.bot.clone(), ctx.chat(), tg_user(target.id()));
    let outcome = warnings
        .warn(ctx.inv.chat_id, target.id(), move || async move {
            telegram
                .call(|| bot.ban_chat_member(chat, user))
                .await
                .map(|_| ())
        })
        .await;

    let html = match outcome {
        WarnOutcome::Warned { count } => target_card(
            ctx,
            "⚠️ <b>User Warned</b>",
            &target,
            &[
                format!("📊 Warnings: {count}/{limit}"),
                format!("📝 Reason: {reason}"),
            ],
        ),
        WarnOutcome::Banned => target_card(
            ctx,
            "🚫 <b>User Auto-Banned</b>",
            &target,
            &[
                format!("⚠️ Reached {limit} warnings"),
                format!("📝 Last reason: {reason}"),
            ],
        ),
        WarnOutcome::BanFailed { count, error } => format!(
            "❌ Failed to ban user: {}\n⚠️ Warnings: {count}/{limit}. The next warning retries the ban.",
            escape_html(&error.to_string())
        ),
    };
    ctx.reply(&html).await?;
    Ok(())
}

pub async fn warnings(ctx: &Ctx<'_>) -> Result<()> {
    let target = if ctx.replied().is_some() || !ctx.args.trim().is_empty() {
        resolve_target(ctx).await?
    } else {
        Target {
            user: ctx.from.clone(),
            rest: String::new(),
        }
    };

    let count = ctx.state.warnings.check(ctx.inv.chat_id, target.id());
    ctx.reply(&format!(
        "📊 <b>Warning Status</b>\n👤 User: {}\n🆔 ID: <code>{}</code>\n⚠️ Warnings: {count}/{}",
        target.mention(),
        target.id().0,
        ctx.state.warnings.limit()
    ))
    .await?;
    Ok(())
}

pub async fn reset_warnings(ctx: &Ctx<'_>) -> Result<()> {
    let target = resolve_target(ctx).await?;
    let previous = ctx.state.warnings.reset(ctx.inv.chat_id, target.id()).await;

    if previous == 0 {
        ctx.reply("✅ User has no warnings").await?;
    } else {
        ctx.reply(&target_card(
            ctx,
            "✅ <b>Warnings Reset</b>",
            &target,
            &[format!("📊 Cleared: {previous}")],
        ))
        .await?;
    }
    Ok(())
}

// ============== Pins ==============

pub async fn pin(ctx: &Ctx<'_>) -> Result<()> {
    let replied = ctx
        .replied()
        .ok_or_else(|| ctx.usage_error("Reply to a message to pin it"))?;
    let silent = ctx.args.to_lowercase().contains("silent");

    let (bot, chat, id) = (ctx.bot.clone(), ctx.chat(), replied.id);
    ctx.call(|| bot.pin_chat_message(chat, id).disable_notification(silent))
        .await?;

    ctx.reply("📌 <b>Message Pinned</b>").await?;
    Ok(())
}

pub async fn unpin(ctx: &Ctx<'_>) -> Result<()> {
    let (bot, chat) = (ctx.bot.clone(), ctx.chat());
    match ctx.replied().map(|m| m.id) {
        Some(id) => {
            ctx.call(|| bot.unpin_chat_message(chat).message_id(id))
                .await?
        }
        None => ctx.call(|| bot.unpin_chat_message(chat)).await?,
    };

    ctx.reply("📍 <b>Message Unpinned</b>").await?;
    Ok(())
}

pub async fn unpin_all(ctx: &Ctx<'_>) -> Result<()> {
    let (bot, chat) = (ctx.bot.clone(), ctx.chat());
    ctx.call(|| bot.unpin_all_chat_messages(chat)).await?;

    ctx.reply("📍 <b>All Messages Unpinned</b>").await?;
    Ok(())
}

// ============== Deletion ==============

/// Message ids from `start` to `end` inclusive.
fn purge_range(start: i32, end: i32) -> Result<Vec<i32>> {
    if start > end {
        return Err(Error::InvalidArgument(
            "Reply to an earlier message to purge from there".to_string(),
        ));
    }
    if end - start >= PURGE_MAX {
        return Err(Error::InvalidArgument(format!(
            "Can purge at most {PURGE_MAX} messages at once"
        )));
    }
    Ok((start..=end).collect())
}

pub async fn purge(ctx: &Ctx<'_>) -> Result<()> {
    let replied = ctx
        .replied()
        .ok_or_else(|| ctx.usage_error("Reply to a message to purge from there"))?;
    let ids = purge_range(replied.id.0, ctx.msg.id.0)?;

    let (bot, chat) = (ctx.bot.clone(), ctx.chat());
    let mut deleted = 0usize;
    let mut first_error: Option<Error> = None;

    for (i, chunk) in ids.chunks(PURGE_CHUNK).enumerate() {
        if i > 0 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        for id in chunk {
            let id = teloxide::types::MessageId(*id);
            match ctx.call(|| bot.delete_message(chat, id)).await {
                Ok(_) => deleted += 1,
                Err(e) => {
                    tracing::debug!(message_id = id.0, "purge delete failed: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }
    }

    if deleted == 0 {
        if let Some(e) = first_error {
            return Err(e);
        }
    }
    tracing::info!(chat_id = ctx.inv.chat_id.0, deleted, "purged messages");

    // The command itself is gone, so this is a plain send rather than a reply.
    let notice = ctx
        .state
        .messenger
        .send_html(ctx.inv.chat_id, &format!("🗑️ <b>Purged {deleted} messages</b>"))
        .await?;
    let messenger = ctx.state.messenger.clone();
    tokio::spawn(async move {
        tokio::time::sleep(PURGE_NOTICE_TTL).await;
        if let Err(e) = messenger.delete_message(notice).await {
            tracing::debug!("purge notice cleanup failed: {e}");
        }
    });
    Ok(())
}

pub async fn delete(ctx: &Ctx<'_>) -> Result<()> {
    let replied = ctx
        .replied()
        .ok_or_else(|| ctx.usage_error("Reply to a message to delete it"))?;

    let (bot, chat) = (ctx.bot.clone(), ctx.chat());
    let (target_id, own_id) = (replied.id, ctx.msg.id);
    ctx.call(|| bot.delete_message(chat, target_id)).await?;
    if let Err(e) = ctx.call(|| bot.delete_message(chat, own_id)).await {
        tracing::debug!("could not delete the command message: {e}");
    }
    Ok(())
}

// ============== Locks ==============

pub async fn lock(ctx: &Ctx<'_>) -> Result<()> {
    let (bot, chat) = (ctx.bot.clone(), ctx.chat());
    ctx.call(|| bot.set_chat_permissions(chat, ChatPermissions::empty()))
        .await?;

    ctx.reply(&format!(
        "🔒 <b>Chat Locked</b>\nOnly admins can send messages now\n👮 By: {}",
        ctx.caller_mention()
    ))
    .await?;
    Ok(())
}

pub async fn unlock(ctx: &Ctx<'_>) -> Result<()> {
    let (bot, chat) = (ctx.bot.clone(), ctx.chat());
    ctx.call(|| bot.set_chat_permissions(chat, unlocked_permissions()))
        .await?;

    ctx.reply(&format!(
        "🔓 <b>Chat Unlocked</b>\nEveryone can send messages now\n👮 By: {}",
        ctx.caller_mention()
    ))
    .await?;
    Ok(())
}

// ============== Info ==============

pub async fn chat_info(ctx: &Ctx<'_>) -> Result<()> {
    let (bot, chat_id) = (ctx.bot.clone(), ctx.chat());
    let chat = ctx.call(|| bot.get_chat(chat_id)).await?;
    let members = ctx.call(|| bot.get_chat_member_count(chat_id)).await?;

    let mut text = format!(
        "📋 <b>Chat Information</b>\n\n💬 Name: {}\n🆔 ID: <code>{}</code>\n",
        escape_html(chat.title().unwrap_or("Unknown")),
        chat.id.0
    );
    if let Some(username) = chat.username() {
        text.push_str(&format!("📱 Username: @{}\n", escape_html(username)));
    }
    text.push_str(&format!(
        "👥 Members: {members}\n📝 Type: {}\n",
        super::chat_kind(&chat).label()
    ));
    if let Some(description) = chat.description() {
        text.push_str(&format!("\n📄 Description:\n{}", escape_html(description)));
    }

    ctx.reply(&text).await?;
    Ok(())
}

pub async fn list_admins(ctx: &Ctx<'_>) -> Result<()> {
    let (bot, chat) = (ctx.bot.clone(), ctx.chat());
    let mut admins = ctx.call(|| bot.get_chat_administrators(chat)).await?;
    admins.sort_by_key(|m| !matches!(m.kind, ChatMemberKind::Owner(_)));

    let lines: Vec<String> = admins
        .iter()
        .map(|m| {
            let status = match m.kind {
                ChatMemberKind::Owner(_) => "👑 Owner",
                _ => "👮 Admin",
            };
            let title = custom_title(&m.kind)
                .map(|t| format!(" ({})", escape_html(t)))
                .unwrap_or_default();
            format!("{status} {}{title}", mention(&m.user))
        })
        .collect();

    ctx.reply(&format!(
        "👥 <b>Group Administrators</b>\n\n{}\n\n📊 Total: {}",
        lines.join("\n"),
        lines.len()
    ))
    .await?;
    Ok(())
}

pub async fn report(ctx: &Ctx<'_>) -> Result<()> {
    let replied = ctx
        .replied()
        .ok_or_else(|| ctx.usage_error("Reply to a message to report it"))?;
    let reported = replied
        .from()
        .ok_or_else(|| ctx.usage_error("Cannot report this message"))?;

    let (bot, chat) = (ctx.bot.clone(), ctx.chat());
    let admins = ctx.call(|| bot.get_chat_administrators(chat)).await?;
    let mentions: Vec<String> = admins
        .iter()
        .filter(|m| !m.user.is_bot && member_role(&m.kind).is_admin())
        .take(5)
        .map(|m| mention(&m.user))
        .collect();
    if mentions.is_empty() {
        return Err(Error::NotFound("No admins found to notify".to_string()));
    }

    ctx.reply(&format!(
        "🚨 <b>Message Reported to Admins</b>\n\n\
👤 Reported User: {}\n\
📝 Reason: {}\n\
👮 Reported By: {}\n\n{}",
        mention(reported),
        reason_or_default(&ctx.args),
        ctx.caller_mention(),
        mentions.join(" ")
    ))
    .await?;
    Ok(())
}
