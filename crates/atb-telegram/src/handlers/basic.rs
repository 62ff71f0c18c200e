use std::time::Instant;

use teloxide::{prelude::*, types::ParseMode};

use atb_core::{
    config::{BOT_VERSION, WARN_LIMIT},
    formatting::{escape_html, mention_html, readable_bytes, readable_time},
    sysstat::SystemStats,
    Result,
};

use super::{admin, callback, help_text, Ctx};
use crate::{custom_title, member_role, tg_user, user_id_of};

fn yes_no(v: bool) -> &'static str {
    if v {
        "✅ Yes"
    } else {
        "❌ No"
    }
}

pub async fn help(ctx: &Ctx<'_>) -> Result<()> {
    let include_owner = ctx.state.policy.is_owner(ctx.inv.user_id);
    ctx.reply(&help_text(ctx.prefix(), include_owner)).await?;
    Ok(())
}

/// Replies with the inline keyboard demo; presses land in `callback`.
pub async fn inline(ctx: &Ctx<'_>) -> Result<()> {
    let keyboard = callback::demo_keyboard(&ctx.state.me.username)?;
    let bot = ctx.bot.clone();
    let chat = ctx.chat();
    let reply_to = ctx.msg.id;
    ctx.call(|| {
        bot.send_message(chat, "<b>Inline Buttons Demo</b>")
            .parse_mode(ParseMode::Html)
            .reply_to_message_id(reply_to)
            .reply_markup(keyboard.clone())
    })
    .await?;
    Ok(())
}

pub async fn ping(ctx: &Ctx<'_>) -> Result<()> {
    let started = Instant::now();
    let sent = ctx.reply("🏓 <b>Pinging...</b>").await?;
    let ms = started.elapsed().as_secs_f64() * 1000.0;

    ctx.edit(
        sent,
        &format!(
            "🏓 <b>Pong!</b>\n\
⚡ <b>Response Time:</b> <code>{ms:.2}ms</code>\n\
⏱️ <b>Uptime:</b> <code>{}</code>",
            readable_time(ctx.state.uptime())
        ),
    )
    .await
}

pub async fn alive(ctx: &Ctx<'_>) -> Result<()> {
    let me = &ctx.state.me;
    ctx.reply(&format!(
        "✅ <b>Bot is Alive!</b>\n\n\
🤖 <b>Bot Name:</b> {}\n\
👤 <b>Username:</b> @{}\n\
🆔 <b>Bot ID:</b> <code>{}</code>\n\
📦 <b>Version:</b> <code>{BOT_VERSION}</code>\n\
⏱️ <b>Uptime:</b> <code>{}</code>\n\
🔧 <b>Prefix:</b> <code>{}</code>\n\
🦀 <b>Framework:</b> teloxide",
        escape_html(&me.first_name),
        escape_html(&me.username),
        me.id.0,
        readable_time(ctx.state.uptime()),
        escape_html(ctx.prefix()),
    ))
    .await?;
    Ok(())
}

pub async fn stats(ctx: &Ctx<'_>) -> Result<()> {
    let state = ctx.state;
    let sys = SystemStats::collect();
    let users = state.store.user_count().await.unwrap_or_else(|e| {
        tracing::warn!("user count failed: {e}");
        0
    });

    let memory = match (sys.mem_total_bytes, sys.mem_available_bytes) {
        (Some(total), Some(avail)) => format!(
            "<code>{} / {}</code> ({:.1}%)",
            readable_bytes(total.saturating_sub(avail)),
            readable_bytes(total),
            sys.mem_used_percent().unwrap_or(0.0)
        ),
        _ => "n/a".to_string(),
    };
    let load = sys
        .load_avg
        .map(|(a, b, c)| format!("<code>{a:.2} {b:.2} {c:.2}</code>"))
        .unwrap_or_else(|| "n/a".to_string());
    let rss = sys
        .process_rss_bytes
        .map(readable_bytes)
        .unwrap_or_else(|| "n/a".to_string());
    let cpus = sys
        .cpu_count
        .map(|n| n.to_string())
        .unwrap_or_else(|| "n/a".to_string());

    let db_status = if state.store.is_connected() {
        "✅ Connected"
    } else {
        "❌ Disconnected"
    };
    let enabled = |v: bool| if v { "✅ Enabled" } else { "❌ Disabled" };

    ctx.reply(&format!(
        "📊 <b>Bot Statistics</b>\n\n\
<b>Bot Info:</b>\n\
• Name: {}\n\
• Username: @{}\n\
• ID: <code>{}</code>\n\
• Uptime: <code>{}</code>\n\n\
<b>System Stats:</b>\n\
• CPUs: <code>{cpus}</code>\n\
• Load: {load}\n\
• RAM: {memory}\n\
• Process RSS: <code>{rss}</code>\n\n\
<b>Database:</b>\n\
• Status: {db_status}\n\
• Users: <code>{users}</code>\n\n\
<b>Configuration:</b>\n\
• Database: {}\n\
• Weather: {}\n\
• Translation: {}\n\
• Owner: <code>{}</code>\n\
• Sudo Users: <code>{}</code>",
        escape_html(&state.me.first_name),
        escape_html(&state.me.username),
        state.me.id.0,
        readable_time(state.uptime()),
        enabled(state.cfg.enable_database),
        enabled(state.weather.is_some()),
        state.translator.backend_name(),
        state.cfg.owner_id.0,
        state.cfg.sudo_users.len(),
    ))
    .await?;
    Ok(())
}

pub async fn id(ctx: &Ctx<'_>) -> Result<()> {
    let mut text = format!(
        "🆔 <b>IDs</b>\n\n\
<b>Your ID:</b> <code>{}</code>\n\
<b>Chat ID:</b> <code>{}</code>\n",
        ctx.inv.user_id.0, ctx.inv.chat_id.0
    );
    if let Some(replied) = ctx.replied() {
        if let Some(user) = replied.from() {
            text.push_str(&format!(
                "<b>Replied User ID:</b> <code>{}</code>\n",
                user.id.0
            ));
        }
        if let Some(fwd) = replied.forward_from_user() {
            text.push_str(&format!(
                "<b>Forwarded From ID:</b> <code>{}</code>\n",
                fwd.id.0
            ));
        }
        if let Some(chat) = replied.forward_from_chat() {
            text.push_str(&format!(
                "<b>Forwarded From Chat:</b> <code>{}</code>\n",
                chat.id.0
            ));
        }
    }
    ctx.reply(&text).await?;
    Ok(())
}

/// User details for the replied user, an explicit target, or the caller.
/// In groups this adds membership status, custom title and warnings.
pub async fn info(ctx: &Ctx<'_>) -> Result<()> {
    let user = if ctx.replied().is_some() || !ctx.args.trim().is_empty() {
        admin::resolve_target(ctx).await?.user
    } else {
        ctx.from.clone()
    };
    let user_id = user_id_of(&user);

    let mut text = format!(
        "👤 <b>User Information</b>\n\n\
<b>Name:</b> {}\n\
<b>User ID:</b> <code>{}</code>\n",
        mention_html(user_id, &user.full_name()),
        user_id.0
    );
    if let Some(username) = &user.username {
        text.push_str(&format!("<b>Username:</b> @{}\n", escape_html(username)));
    }
    text.push_str(&format!("<b>Is Bot:</b> {}\n", yes_no(user.is_bot)));
    text.push_str(&format!("<b>Premium:</b> {}\n", yes_no(user.is_premium)));

    if !ctx.inv.chat_kind.is_private() {
        let bot = ctx.bot.clone();
        let chat = ctx.chat();
        match ctx.call(|| bot.get_chat_member(chat, tg_user(user_id))).await {
            Ok(member) => {
                let role = member_role(&member.kind);
                text.push_str(&format!("<b>Status:</b> {} {}\n", role.emoji(), role.label()));
                if let Some(title) = custom_title(&member.kind) {
                    text.push_str(&format!("<b>Title:</b> {}\n", escape_html(title)));
                }
            }
            Err(e) => tracing::debug!("member lookup failed: {e}"),
        }

        let warnings = ctx.state.warnings.check(ctx.inv.chat_id, user_id);
        if warnings > 0 {
            text.push_str(&format!("<b>Warnings:</b> {warnings}/{WARN_LIMIT}\n"));
        }

        text.push_str(&format!(
            "\n💬 <b>Chat:</b> {} (<code>{}</code>, {})",
            escape_html(ctx.msg.chat.title().unwrap_or("Unknown")),
            ctx.inv.chat_id.0,
            ctx.inv.chat_kind.label()
        ));
    }

    ctx.reply(&text).await?;
    Ok(())
}
