use std::{sync::OnceLock, time::Duration};

use chrono::Utc;
use regex::Regex;

use crate::{errors::Error, Result};

// ============== Timestamp Helpers ==============

pub fn unix_timestamp() -> i64 {
    Utc::now().timestamp()
}

// ============== Command Parsing ==============

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lower-cased command name without prefix or `@bot` suffix.
    pub name: String,
    /// Everything after the first whitespace, trimmed.
    pub args: String,
}

/// Parse `<prefix>cmd args` or `/cmd@bot args`.
///
/// Returns `None` for plain text and for commands addressed to another bot.
pub fn parse_command(text: &str, prefix: &str, bot_username: Option<&str>) -> Option<ParsedCommand> {
    let text = text.trim();
    let body = if !prefix.is_empty() && text.starts_with(prefix) {
        &text[prefix.len()..]
    } else {
        text.strip_prefix('/')?
    };

    let mut parts = body.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let args = parts.next().unwrap_or("").trim().to_string();

    let mut head = first.splitn(2, '@');
    let name = head.next().unwrap_or("").to_lowercase();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }

    if let (Some(target), Some(me)) = (head.next(), bot_username) {
        if !target.eq_ignore_ascii_case(me.trim_start_matches('@')) {
            return None;
        }
    }

    Some(ParsedCommand { name, args })
}

/// Split off the first whitespace-separated token.
pub fn split_first_arg(args: &str) -> (&str, &str) {
    let args = args.trim();
    match args.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (args, ""),
    }
}

// ============== Durations ==============

/// Telegram treats restrictions longer than this as permanent.
pub const MAX_RESTRICTION: Duration = Duration::from_secs(366 * 24 * 3600);

/// Parse `45s`, `5m`, `2h`, `1d`, `1w`.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim().to_lowercase();
    let invalid = || {
        Error::InvalidArgument(format!(
            "Invalid time format: {raw:?}. Use e.g. 45s, 5m, 2h, 1d, 1w"
        ))
    };

    let unit = raw.chars().last().ok_or_else(invalid)?;
    let multiplier: u64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        'w' => 604_800,
        _ => return Err(invalid()),
    };
    let amount: u64 = raw[..raw.len() - 1].parse().map_err(|_| invalid())?;
    if amount == 0 {
        return Err(invalid());
    }

    let secs = amount.checked_mul(multiplier).ok_or_else(invalid)?;
    let d = Duration::from_secs(secs);
    if d > MAX_RESTRICTION {
        return Err(Error::InvalidArgument(
            "Duration too long (max 366 days)".to_string(),
        ));
    }
    Ok(d)
}

// ============== URLs and Files ==============

pub fn is_url(text: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(text.trim()))
}

pub fn is_youtube_url(text: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(https?://)?(www\.|m\.|music\.)?(youtube\.com/(watch\?v=|shorts/|embed/|live/)|youtu\.be/)[\w-]{6,}",
        )
        .ok()
    })
    .as_ref()
    .is_some_and(|re| re.is_match(text.trim()))
}

/// Strip path separators and characters filesystems dislike; never empty.
pub fn clean_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();
    let cleaned: String = cleaned.chars().take(200).collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Last path segment of a URL, without query or fragment.
pub fn filename_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let path = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
    let segment = path
        .split_once('/')
        .map(|(_, p)| p.rsplit('/').next().unwrap_or(""))
        .unwrap_or("");
    clean_filename(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_and_slash_commands() {
        let c = parse_command(".ban 123 spam", ".", Some("mybot")).unwrap();
        assert_eq!(c.name, "ban");
        assert_eq!(c.args, "123 spam");

        let c = parse_command("/PING@MyBot", ".", Some("mybot")).unwrap();
        assert_eq!(c.name, "ping");
        assert_eq!(c.args, "");

        let c = parse_command("!calc 2+2", "!", None).unwrap();
        assert_eq!(c.name, "calc");
        assert_eq!(c.args, "2+2");
    }

    #[test]
    fn ignores_plain_text_and_other_bots() {
        assert!(parse_command("hello", ".", None).is_none());
        assert!(parse_command("...", ".", None).is_none());
        assert!(parse_command(". ban", ".", None).is_none());
        assert!(parse_command("/ban@otherbot 1", ".", Some("mybot")).is_none());
    }

    #[test]
    fn splits_first_argument() {
        assert_eq!(split_first_arg("  123   being rude "), ("123", "being rude"));
        assert_eq!(split_first_arg("123"), ("123", ""));
        assert_eq!(split_first_arg(""), ("", ""));
    }

    #[test]
    fn duration_units() {
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2H").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("1w").unwrap(), Duration::from_secs(604_800));
    }

    #[test]
    fn bad_durations_are_rejected() {
        for bad in ["", "5", "m", "0m", "5y", "-5m", "1.5h", "99999999999999999999w"] {
            let err = parse_duration(bad).unwrap_err();
            assert!(err.is_usage(), "{bad}");
        }
        assert!(parse_duration("400d").is_err());
    }

    #[test]
    fn url_detection() {
        assert!(is_url("https://example.com/file.zip"));
        assert!(!is_url("example.com"));
        assert!(is_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(is_youtube_url("youtube.com/shorts/abcdefg"));
        assert!(!is_youtube_url("https://vimeo.com/123"));
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(clean_filename("a/b:c?.mp4"), "a_b_c_.mp4");
        assert_eq!(clean_filename(" .. "), "file");
        assert_eq!(filename_from_url("https://x.org/dir/report.pdf?x=1"), "report.pdf");
        assert_eq!(filename_from_url("https://x.org/"), "file");
        assert_eq!(filename_from_url("https://x.org"), "file");
    }
}
