//! File fetching for the download commands.
//!
//! Direct URLs are streamed to disk with a size cap. YouTube media goes
//! through the download microservice when one is configured, otherwise
//! through a local `yt-dlp` process.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{fs, io::AsyncWriteExt, process::Command};

use atb_core::{
    errors::Error,
    formatting::readable_bytes,
    utils::{clean_filename, filename_from_url},
    Result,
};

/// Bot API upload limit.
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

const YTDLP_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    fn label(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DownloadedFile {
    pub path: PathBuf,
    /// Name to show the user (original file name or media title).
    pub display_name: String,
    pub size: u64,
}

impl DownloadedFile {
    pub async fn remove(&self) {
        if let Err(e) = fs::remove_file(&self.path).await {
            tracing::debug!(path = %self.path.display(), "cleanup failed: {e}");
        }
    }
}

/// A download in progress. Removed from disk on drop unless [`keep`] is
/// called, so every early return leaves nothing behind.
///
/// [`keep`]: PartialFile::keep
struct PartialFile {
    path: Option<PathBuf>,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or(Path::new(""))
    }

    fn keep(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!(path = %path.display(), "partial download cleanup failed: {e}");
            }
        }
    }
}

#[derive(Serialize)]
struct ServiceRequest<'a> {
    url: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ServiceResponse {
    status: String,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Downloader {
    dir: PathBuf,
    api_url: Option<String>,
    max_bytes: u64,
    http: reqwest::Client,
    service_http: reqwest::Client,
}

impl Downloader {
    pub fn new(dir: impl Into<PathBuf>, api_url: Option<String>) -> Result<Self> {
        Ok(Self {
            dir: dir.into(),
            api_url,
            max_bytes: MAX_UPLOAD_BYTES,
            http: crate::http_client(Duration::from_secs(300))?,
            service_http: crate::http_client(YTDLP_TIMEOUT)?,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        if self.api_url.is_some() {
            "download service"
        } else {
            "yt-dlp"
        }
    }

    /// Stream a direct URL into the download directory.
    pub async fn fetch_url(&self, url: &str) -> Result<DownloadedFile> {
        fs::create_dir_all(&self.dir).await?;

        let mut resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::External(format!("download request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::External(format!(
                "Failed to download file (HTTP {})",
                status.as_u16()
            )));
        }
        if let Some(len) = resp.content_length() {
            self.check_size(len)?;
        }

        let display_name = filename_from_url(url);
        let partial = PartialFile::new(self.unique_path(&display_name));
        let mut file = fs::File::create(partial.path()).await?;
        let mut size: u64 = 0;

        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| Error::External(format!("download stream error: {e}")))?
        {
            size += chunk.len() as u64;
            self.check_size(size)?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        Ok(DownloadedFile {
            path: partial.keep(),
            display_name,
            size,
        })
    }

    pub async fn youtube(&self, url: &str, kind: MediaKind) -> Result<DownloadedFile> {
        fs::create_dir_all(&self.dir).await?;
        let downloaded = match &self.api_url {
            Some(api) => self.via_service(api, url, kind).await?,
            None => self.via_ytdlp(url, kind).await?,
        };

        if let Err(e) = self.check_size(downloaded.size) {
            downloaded.remove().await;
            return Err(e);
        }
        Ok(downloaded)
    }

    async fn via_service(&self, api: &str, url: &str, kind: MediaKind) -> Result<DownloadedFile> {
        let resp = self
            .service_http
            .post(format!("{api}/download"))
            .json(&ServiceRequest {
                url,
                format: kind.label(),
            })
            .send()
            .await
            .map_err(|e| Error::External(format!("download service error: {e}")))?;

        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("download service read error: {e}")))?;
        let (path, title) = parse_service_response(&body)?;

        let meta = fs::metadata(&path)
            .await
            .map_err(|_| Error::External("Download failed".to_string()))?;
        let display_name = title.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("media")
                .to_string()
        });

        Ok(DownloadedFile {
            path,
            display_name,
            size: meta.len(),
        })
    }

    async fn via_ytdlp(&self, url: &str, kind: MediaKind) -> Result<DownloadedFile> {
        let template = self.dir.join("%(title).80B [%(id)s].%(ext)s");
        let limit = format!("{}M", self.max_bytes / (1024 * 1024));

        let mut cmd = Command::new("yt-dlp");
        cmd.arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--no-simulate")
            .arg("--max-filesize")
            .arg(&limit)
            .arg("--print")
            .arg("title")
            .arg("--print")
            .arg("after_move:filepath")
            .arg("-o")
            .arg(&template);
        match kind {
            MediaKind::Video => {
                cmd.arg("-f")
                    .arg(format!("best[filesize<{limit}]/best"))
                    .arg("--merge-output-format")
                    .arg("mp4");
            }
            MediaKind::Audio => {
                cmd.arg("-f")
                    .arg("bestaudio/best")
                    .arg("-x")
                    .arg("--audio-format")
                    .arg("mp3")
                    .arg("--audio-quality")
                    .arg("192K");
            }
        }
        cmd.arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(YTDLP_TIMEOUT, cmd.output())
            .await
            .map_err(|_| Error::External("yt-dlp timed out".to_string()))?
            .map_err(|e| Error::External(format!("failed to run yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last = stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(Error::External(format!("yt-dlp failed: {last}")));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (title, path) = parse_ytdlp_output(&stdout)
            .ok_or_else(|| Error::External("File too large or download failed".to_string()))?;
        let meta = fs::metadata(&path).await?;

        Ok(DownloadedFile {
            path,
            display_name: title,
            size: meta.len(),
        })
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_bytes {
            return Err(Error::InvalidArgument(format!(
                "File too large! ({}). Maximum file size: {}",
                readable_bytes(size),
                readable_bytes(self.max_bytes)
            )));
        }
        Ok(())
    }

    fn unique_path(&self, name: &str) -> PathBuf {
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        self.dir.join(format!("{stamp}-{}", clean_filename(name)))
    }
}

fn parse_service_response(body: &str) -> Result<(PathBuf, Option<String>)> {
    let r: ServiceResponse = serde_json::from_str(body)
        .map_err(|e| Error::External(format!("download service json error: {e}")))?;
    if r.status != "ok" {
        let reason = r.error.unwrap_or_else(|| r.status.clone());
        return Err(Error::External(format!("Download failed: {reason}")));
    }
    let path = r
        .file
        .filter(|f| !f.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| Error::External("Download failed".to_string()))?;
    Ok((path, r.title))
}

/// stdout is `<title>\n<final path>`; the path line is missing when
/// `--max-filesize` skipped the download.
fn parse_ytdlp_output(stdout: &str) -> Option<(String, PathBuf)> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() < 2 {
        return None;
    }
    let path = PathBuf::from(lines[lines.len() - 1]);
    let title = lines[..lines.len() - 1].join(" ");
    Some((title, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"))
    }

    #[test]
    fn service_response_ok_and_errors() {
        let (p, title) =
            parse_service_response(r#"{"status":"ok","file":"/srv/dl/song.mp3"}"#).unwrap();
        assert_eq!(p, PathBuf::from("/srv/dl/song.mp3"));
        assert!(title.is_none());

        let err = parse_service_response(r#"{"status":"error","error":"private video"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("private video"));

        assert!(parse_service_response(r#"{"status":"ok"}"#).is_err());
        assert!(parse_service_response("<html>").is_err());
    }

    #[test]
    fn ytdlp_output_parsing() {
        let (title, path) =
            parse_ytdlp_output("Never Gonna Give You Up\n/tmp/dl/Never [dQw4].mp4\n").unwrap();
        assert_eq!(title, "Never Gonna Give You Up");
        assert_eq!(path, PathBuf::from("/tmp/dl/Never [dQw4].mp4"));

        assert!(parse_ytdlp_output("Only a title\n").is_none());
        assert!(parse_ytdlp_output("").is_none());
    }

    #[test]
    fn size_cap_is_a_usage_error() {
        let d = Downloader::new(tmp_dir("atb-dl"), None)
            .unwrap()
            .with_max_bytes(1024);
        assert!(d.check_size(1024).is_ok());
        let err = d.check_size(2048).unwrap_err();
        assert!(err.is_usage());
        assert!(err.to_string().contains("File too large"));
    }

    #[tokio::test]
    async fn service_backend_checks_file_exists() {
        let dir = tmp_dir("atb-dl-svc");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("clip.mp4");
        std::fs::write(&file, vec![0u8; 10]).unwrap();

        let d = Downloader::new(&dir, Some("http://127.0.0.1:9".into())).unwrap();
        assert_eq!(d.backend_name(), "download service");

        let (path, title) = parse_service_response(&format!(
            r#"{{"status":"ok","file":"{}","title":"Clip"}}"#,
            file.display()
        ))
        .unwrap();
        assert_eq!(title.as_deref(), Some("Clip"));
        let meta = fs::metadata(&path).await.unwrap();
        assert_eq!(meta.len(), 10);
    }

    #[tokio::test]
    async fn partial_file_is_removed_unless_kept() {
        let dir = tmp_dir("atb-dl-partial");
        std::fs::create_dir_all(&dir).unwrap();

        let failed = PartialFile::new(dir.join("failed.bin"));
        let mut file = fs::File::create(failed.path()).await.unwrap();
        file.write_all(b"half").await.unwrap();
        drop(file);
        assert!(dir.join("failed.bin").exists());
        drop(failed);
        assert!(!dir.join("failed.bin").exists());

        let done = PartialFile::new(dir.join("done.bin"));
        fs::write(done.path(), b"all").await.unwrap();
        assert_eq!(done.keep(), dir.join("done.bin"));
        assert!(dir.join("done.bin").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
