//! HTTP adapters for the external services behind the utility commands.

use std::time::Duration;

use atb_core::{errors::Error, Result};

pub mod downloader;
pub mod translate;
pub mod weather;

pub use downloader::{DownloadedFile, Downloader, MediaKind};
pub use translate::{Translation, Translator};
pub use weather::{WeatherClient, WeatherReport};

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("atb/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::External(format!("http client build error: {e}")))
}

/// First `max` chars of a response body, for error messages.
pub(crate) fn snippet(body: &str, max: usize) -> String {
    body.chars().take(max).collect()
}
