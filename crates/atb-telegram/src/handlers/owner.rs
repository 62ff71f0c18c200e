use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use atb_core::{
    calc,
    domain::ChatId,
    errors::Error,
    formatting::{escape_html, pre, progress_bar, truncate_chars},
    logging::LOG_FILE_PREFIX,
    messaging::{
        broadcast::{broadcast as fan_out, BroadcastPayload, BroadcastProgress},
        types::{FileKind, OutgoingFile},
    },
    Result,
};

use super::Ctx;
use crate::{message_ref, router::RestartMarker};

const SHELL_TIMEOUT: Duration = Duration::from_secs(120);
const SHELL_STDOUT_CHARS: usize = 3000;
const SHELL_STDERR_CHARS: usize = 1000;

/// Telegram's message length limit.
const MESSAGE_MAX_CHARS: usize = 4096;

const LOG_LINES_DEFAULT: usize = 50;
const LOG_LINES_MAX: usize = 200;
const LOG_INLINE_MAX_CHARS: usize = 4000;

pub async fn restart(ctx: &Ctx<'_>) -> Result<()> {
    let sent = ctx.reply("🔄 <b>Restarting bot...</b>").await?;
    if let Err(e) = RestartMarker::new(sent)
        .write(&ctx.state.cfg.restart_file)
        .await
    {
        tracing::warn!("failed to write restart marker: {e}");
    }
    tracing::info!(user_id = ctx.inv.user_id.0, "restart requested");
    ctx.state.shutdown.cancel();
    Ok(())
}

/// Write `content` next to the downloads, upload it as a document, delete it.
async fn send_text_document(ctx: &Ctx<'_>, name: &str, content: &str, caption: &str) -> Result<()> {
    let dir = &ctx.state.cfg.download_dir;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}-{name}", chrono::Utc::now().timestamp_millis()));
    tokio::fs::write(&path, content).await?;

    let file = OutgoingFile::new(&path, FileKind::Document)
        .with_caption(caption)
        .with_file_name(name);
    let sent = ctx.state.messenger.send_file(ctx.origin(), file).await;
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::debug!(path = %path.display(), "cleanup failed: {e}");
    }
    sent.map(|_| ())
}

// ============== Shell ==============

fn format_shell_result(command: &str, code: Option<i32>, stdout: &str, stderr: &str) -> String {
    let code = code.map_or_else(|| "killed".to_string(), |c| c.to_string());
    let mut out = format!(
        "🖥️ <b>Shell Command</b>\n\n<b>Command:</b> <code>{}</code>\n<b>Return Code:</b> <code>{code}</code>\n\n",
        escape_html(command)
    );
    let stdout = stdout.trim_end();
    let stderr = stderr.trim_end();
    if stdout.is_empty() && stderr.is_empty() {
        out.push_str("✅ Command executed (no output)");
        return out;
    }
    if !stdout.is_empty() {
        out.push_str(&format!(
            "<b>Output:</b>\n{}",
            pre(&truncate_chars(stdout, SHELL_STDOUT_CHARS))
        ));
    }
    if !stderr.is_empty() {
        if !stdout.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&format!(
            "<b>Error:</b>\n{}",
            pre(&truncate_chars(stderr, SHELL_STDERR_CHARS))
        ));
    }
    out
}

pub async fn shell(ctx: &Ctx<'_>) -> Result<()> {
    let command = ctx.args.trim();
    if command.is_empty() {
        return Err(ctx.usage_error("Please provide a command"));
    }
    let status = ctx
        .reply(&format!("🖥️ <b>Executing:</b>\n<code>{}</code>", escape_html(command)))
        .await?;
    tracing::info!(user_id = ctx.inv.user_id.0, command, "shell");

    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = match tokio::time::timeout(SHELL_TIMEOUT, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => {
            ctx.edit(
                status,
                &format!(
                    "❌ <b>Error:</b> command timed out after {}s",
                    SHELL_TIMEOUT.as_secs()
                ),
            )
            .await?;
            return Ok(());
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let html = format_shell_result(command, output.status.code(), &stdout, &stderr);

    if html.chars().count() <= MESSAGE_MAX_CHARS {
        return ctx.edit(status, &html).await;
    }
    let text = format!("$ {command}\n\n{stdout}\n{stderr}");
    send_text_document(ctx, "output.txt", &text, "🖥️ <b>Shell Output</b>").await?;
    if let Err(e) = ctx.state.messenger.delete_message(status).await {
        tracing::debug!("status cleanup failed: {e}");
    }
    Ok(())
}

// ============== Logs ==============

fn log_line_count(args: &str) -> Result<usize> {
    let args = args.trim();
    if args.is_empty() {
        return Ok(LOG_LINES_DEFAULT);
    }
    let n: usize = args
        .parse()
        .map_err(|_| Error::InvalidArgument("Line count must be a number".to_string()))?;
    Ok(n.clamp(1, LOG_LINES_MAX))
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

/// Newest `bot.*` file in `dir`. Daily suffixes sort chronologically.
async fn newest_log_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut newest: Option<(String, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(LOG_FILE_PREFIX) || !entry.file_type().await?.is_file() {
            continue;
        }
        if newest.as_ref().map_or(true, |(best, _)| name > *best) {
            newest = Some((name, entry.path()));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

pub async fn logs(ctx: &Ctx<'_>) -> Result<()> {
    let lines = log_line_count(&ctx.args)?;
    let Some(path) = newest_log_file(&ctx.state.cfg.log_dir).await? else {
        ctx.reply("❌ No log files found").await?;
        return Ok(());
    };

    let raw = tokio::fs::read(&path).await?;
    let tail = last_lines(&String::from_utf8_lossy(&raw), lines);
    if tail.trim().is_empty() {
        ctx.reply("❌ Log file is empty").await?;
        return Ok(());
    }

    let header = format!("📋 <b>Bot Logs</b> (Last {lines} lines)");
    if tail.chars().count() > LOG_INLINE_MAX_CHARS {
        return send_text_document(ctx, "logs.txt", &tail, &header).await;
    }
    ctx.reply(&format!("{header}\n\n{}", pre(&tail))).await?;
    Ok(())
}

// ============== Broadcast ==============

fn progress_html(p: BroadcastProgress) -> String {
    format!(
        "📢 <b>Broadcasting...</b>\n\n{}\n\n✅ Success: {}\n❌ Failed: {}\n📊 Progress: {}/{}",
        progress_bar(p.done as u64, p.total as u64, 10),
        p.sent,
        p.failed,
        p.done,
        p.total
    )
}

fn summary_html(p: BroadcastProgress) -> String {
    format!(
        "📢 <b>Broadcast Complete</b>\n\n✅ <b>Success:</b> {}\n❌ <b>Failed:</b> {}\n📊 <b>Total:</b> {}",
        p.sent, p.failed, p.total
    )
}

pub async fn broadcast(ctx: &Ctx<'_>) -> Result<()> {
    if !ctx.state.store.is_connected() {
        ctx.reply("❌ Database is not connected. Cannot broadcast.")
            .await?;
        return Ok(());
    }

    let payload = match ctx.replied() {
        Some(replied) => BroadcastPayload::Forward(message_ref(replied)),
        None if !ctx.args.trim().is_empty() => BroadcastPayload::Html(escape_html(ctx.args.trim())),
        None => return Err(ctx.usage_error("Provide a message or reply to one")),
    };

    let recipients: Vec<ChatId> = ctx
        .state
        .store
        .all_user_ids()
        .await?
        .into_iter()
        .map(|u| ChatId(u.0))
        .collect();
    if recipients.is_empty() {
        ctx.reply("❌ No users found in database").await?;
        return Ok(());
    }

    let status = ctx
        .reply(&format!(
            "📢 <b>Broadcasting to {} users...</b>",
            recipients.len()
        ))
        .await?;
    tracing::info!(recipients = recipients.len(), "broadcast started");

    let messenger = &ctx.state.messenger;
    let result = fan_out(
        ctx.state.broadcaster.as_ref(),
        &recipients,
        &payload,
        move |p| {
            let html = progress_html(p);
            async move {
                if let Err(e) = messenger.edit_html(status, &html).await {
                    tracing::debug!("broadcast progress edit failed: {e}");
                }
            }
        },
    )
    .await;

    tracing::info!(sent = result.sent, failed = result.failed, "broadcast finished");
    ctx.edit(status, &summary_html(result)).await
}

// ============== Eval ==============

fn eval_html(input: &str) -> String {
    let head = format!("🧮 <b>Eval</b>\n\n<b>Input:</b>\n{}\n\n", pre(input));
    let evaluated = calc::parse(input).and_then(|expr| {
        let value = expr.eval()?;
        if !value.is_finite() {
            return Err(Error::InvalidArgument(
                "result is not a finite number".to_string(),
            ));
        }
        Ok((expr, value))
    });
    match evaluated {
        Ok((expr, value)) => format!(
            "{head}<b>Parsed:</b>\n{}\n\n<b>Result:</b>\n{}",
            pre(&expr.to_string()),
            pre(&calc::format_number(value))
        ),
        Err(e) => format!("{head}<b>Error:</b>\n{}", pre(&e.to_string())),
    }
}

pub async fn eval(ctx: &Ctx<'_>) -> Result<()> {
    let input = ctx.args.trim();
    if input.is_empty() {
        return Err(ctx.usage_error("Please provide an expression"));
    }
    ctx.reply(&eval_html(input)).await?;
    Ok(())
}

// ============== Database ==============

pub async fn stats_db(ctx: &Ctx<'_>) -> Result<()> {
    let store = &ctx.state.store;
    if !store.is_connected() {
        ctx.reply("❌ Database is not connected").await?;
        return Ok(());
    }

    let users = store.user_count().await?;
    let collections = store.collection_counts().await?;

    let mut text = format!(
        "🗄️ <b>Database Statistics</b>\n\n\
<b>Backend:</b> {}\n\
<b>Users:</b> {users}\n\
<b>Collections:</b> {}\n\n",
        store.backend_name(),
        collections.len()
    );
    for (name, count) in &collections {
        text.push_str(&format!("• {}: {count} documents\n", escape_html(name)));
    }
    ctx.reply(&text).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        PathBuf::from(format!("/tmp/{prefix}-{}-{ts}", std::process::id()))
    }

    #[test]
    fn shell_result_sections() {
        let html = format_shell_result("echo <hi>", Some(0), "<hi>\n", "");
        assert!(html.contains("<b>Command:</b> <code>echo &lt;hi&gt;</code>"));
        assert!(html.contains("<b>Return Code:</b> <code>0</code>"));
        assert!(html.ends_with("<b>Output:</b>\n<pre>&lt;hi&gt;</pre>"));

        let html = format_shell_result("false", Some(1), "", "boom");
        assert!(html.ends_with("<b>Error:</b>\n<pre>boom</pre>"));

        let html = format_shell_result("true", None, "  \n", "");
        assert!(html.contains("<code>killed</code>"));
        assert!(html.ends_with("✅ Command executed (no output)"));
    }

    #[test]
    fn shell_output_is_capped() {
        let big = "a".repeat(10_000);
        let html = format_shell_result("yes", Some(0), &big, &big);
        assert!(html.chars().count() < SHELL_STDOUT_CHARS + SHELL_STDERR_CHARS + 400);
    }

    #[test]
    fn log_line_counts() {
        assert_eq!(log_line_count("").unwrap(), LOG_LINES_DEFAULT);
        assert_eq!(log_line_count("10").unwrap(), 10);
        assert_eq!(log_line_count("5000").unwrap(), LOG_LINES_MAX);
        assert_eq!(log_line_count("0").unwrap(), 1);
        assert!(log_line_count("many").unwrap_err().is_usage());
    }

    #[test]
    fn tail_of_log_text() {
        assert_eq!(last_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(last_lines("a\nb", 10), "a\nb");
        assert_eq!(last_lines("", 5), "");
    }

    #[tokio::test]
    async fn newest_log_file_by_daily_suffix() {
        let dir = tmp_dir("atb-logs");
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["bot.2026-01-02", "bot.2026-01-10", "other.log"] {
            std::fs::write(dir.join(name), "x").unwrap();
        }

        let newest = newest_log_file(&dir).await.unwrap().unwrap();
        assert_eq!(newest.file_name().unwrap(), "bot.2026-01-10");

        let missing = dir.join("nope");
        assert!(newest_log_file(&missing).await.unwrap().is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn broadcast_status_texts() {
        let p = BroadcastProgress {
            done: 10,
            total: 40,
            sent: 9,
            failed: 1,
        };
        let html = progress_html(p);
        assert!(html.contains("[███░░░░░░░] 25.0%"));
        assert!(html.ends_with("📊 Progress: 10/40"));
        assert!(summary_html(p).contains("📊 <b>Total:</b> 40"));
    }

    #[test]
    fn eval_shows_parse_and_value() {
        let html = eval_html("2 + 3 * 4");
        assert!(html.contains("<b>Parsed:</b>"));
        assert!(html.ends_with("<pre>14</pre>"));

        let html = eval_html("1 / 0");
        assert!(html.contains("<b>Error:</b>\n<pre>division by zero</pre>"));

        let html = eval_html("2 +");
        assert!(html.contains("<b>Error:</b>"));
    }
}
