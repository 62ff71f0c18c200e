//! Download commands. Fetch into the download directory, upload as a reply,
//! delete the local file. Progress lives in one status message.

use std::future::Future;

use atb_core::{
    errors::Error,
    formatting::{escape_html, readable_bytes, truncate_chars},
    messaging::types::{FileKind, OutgoingFile},
    utils::{is_url, is_youtube_url},
    Result,
};
use atb_services::{DownloadedFile, MediaKind};

use super::Ctx;

const CAPTION_TITLE_CHARS: usize = 200;

fn document_caption(file: &DownloadedFile) -> String {
    format!(
        "📄 <b>File:</b> {}\n📦 <b>Size:</b> {}",
        escape_html(&truncate_chars(&file.display_name, CAPTION_TITLE_CHARS)),
        readable_bytes(file.size)
    )
}

fn media_caption(kind: MediaKind, file: &DownloadedFile) -> String {
    let icon = match kind {
        MediaKind::Video => "📹",
        MediaKind::Audio => "🎵",
    };
    format!(
        "{icon} <b>{}</b>\n📦 <b>Size:</b> {}",
        escape_html(&truncate_chars(&file.display_name, CAPTION_TITLE_CHARS)),
        readable_bytes(file.size)
    )
}

pub async fn download(ctx: &Ctx<'_>) -> Result<()> {
    let url = ctx.args.trim();
    if !is_url(url) {
        return Err(ctx.usage_error("Please provide a valid URL"));
    }
    let downloader = &ctx.state.downloader;
    transfer(
        ctx,
        "⏬ <b>Downloading file...</b>",
        FileKind::Document,
        downloader.fetch_url(url),
        document_caption,
    )
    .await
}

pub async fn youtube_video(ctx: &Ctx<'_>) -> Result<()> {
    youtube(ctx, MediaKind::Video).await
}

pub async fn youtube_audio(ctx: &Ctx<'_>) -> Result<()> {
    youtube(ctx, MediaKind::Audio).await
}

async fn youtube(ctx: &Ctx<'_>, kind: MediaKind) -> Result<()> {
    let url = ctx.args.trim();
    if !is_youtube_url(url) {
        return Err(ctx.usage_error("Please provide a valid YouTube URL"));
    }
    let (status, file_kind) = match kind {
        MediaKind::Video => ("⏬ <b>Downloading video...</b>", FileKind::Video),
        MediaKind::Audio => ("⏬ <b>Downloading audio...</b>", FileKind::Audio),
    };
    let downloader = &ctx.state.downloader;
    transfer(
        ctx,
        status,
        file_kind,
        downloader.youtube(url, kind),
        |file| media_caption(kind, file),
    )
    .await
}

/// Holds a transfer slot for the whole download and upload. Failures end up
/// in the status message, so the command itself always succeeds.
async fn transfer<F>(
    ctx: &Ctx<'_>,
    status_html: &str,
    kind: FileKind,
    fetch: F,
    caption: impl Fn(&DownloadedFile) -> String,
) -> Result<()>
where
    F: Future<Output = Result<DownloadedFile>>,
{
    let status = ctx.reply(status_html).await?;
    let _permit = ctx
        .state
        .transfers
        .acquire()
        .await
        .map_err(|_| Error::External("transfer pool closed".to_string()))?;

    match deliver(ctx, status, kind, fetch, caption).await {
        Ok(()) => {
            if let Err(e) = ctx.state.messenger.delete_message(status).await {
                tracing::debug!("status cleanup failed: {e}");
            }
        }
        Err(e) => {
            tracing::warn!(command = ctx.spec.name, user_id = ctx.inv.user_id.0, "transfer failed: {e}");
            ctx.edit(status, &format!("❌ <b>Error:</b> {}", escape_html(&e.to_string())))
                .await?;
        }
    }
    Ok(())
}

async fn deliver<F>(
    ctx: &Ctx<'_>,
    status: atb_core::domain::MessageRef,
    kind: FileKind,
    fetch: F,
    caption: impl Fn(&DownloadedFile) -> String,
) -> Result<()>
where
    F: Future<Output = Result<DownloadedFile>>,
{
    let file = fetch.await?;
    tracing::info!(
        path = %file.path.display(),
        size = file.size,
        "downloaded, uploading"
    );

    let messenger = &ctx.state.messenger;
    if let Err(e) = ctx.edit(status, "⏫ <b>Uploading...</b>").await {
        tracing::debug!("status edit failed: {e}");
    }
    if let Err(e) = messenger
        .send_chat_action(ctx.inv.chat_id, kind.chat_action())
        .await
    {
        tracing::debug!("chat action failed: {e}");
    }

    let mut outgoing = OutgoingFile::new(&file.path, kind).with_caption(caption(&file));
    if kind != FileKind::Video {
        outgoing = outgoing.with_file_name(file.display_name.clone());
    }
    let sent = messenger.send_file(ctx.origin(), outgoing).await;
    file.remove().await;
    sent.map(|_| ())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn file(name: &str, size: u64) -> DownloadedFile {
        DownloadedFile {
            path: PathBuf::from("/tmp/x"),
            display_name: name.to_string(),
            size,
        }
    }

    #[test]
    fn document_caption_shows_name_and_size() {
        let c = document_caption(&file("report <final>.pdf", 2048));
        assert_eq!(c, "📄 <b>File:</b> report &lt;final&gt;.pdf\n📦 <b>Size:</b> 2.00 KB");
    }

    #[test]
    fn media_captions_by_kind() {
        assert!(media_caption(MediaKind::Video, &file("Clip", 1)).starts_with("📹 <b>Clip</b>"));
        assert!(media_caption(MediaKind::Audio, &file("Song", 1)).starts_with("🎵 <b>Song</b>"));

        let long = "x".repeat(500);
        let c = media_caption(MediaKind::Video, &file(&long, 1));
        assert!(c.chars().count() < 300);
    }
}
