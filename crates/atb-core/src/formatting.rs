//! Formatting utilities (Telegram HTML, durations, sizes, progress bars).

use std::time::Duration;

use crate::domain::UserId;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn code(text: &str) -> String {
    format!("<code>{}</code>", escape_html(text))
}

pub fn pre(text: &str) -> String {
    format!("<pre>{}</pre>", escape_html(text))
}

/// Inline mention that works without a username.
pub fn mention_html(user_id: UserId, name: &str) -> String {
    let name = if name.trim().is_empty() { "User" } else { name };
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        user_id.0,
        escape_html(name)
    )
}

/// `1w 2d`-style rendering, most significant two units only.
pub fn readable_time(d: Duration) -> String {
    const UNITS: [(&str, u64); 5] = [
        ("w", 7 * 24 * 3600),
        ("d", 24 * 3600),
        ("h", 3600),
        ("m", 60),
        ("s", 1),
    ];

    let mut secs = d.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }

    let mut parts = Vec::new();
    for (suffix, size) in UNITS {
        let n = secs / size;
        if n > 0 {
            parts.push(format!("{n}{suffix}"));
            secs %= size;
        }
        if parts.len() == 2 {
            break;
        }
    }
    parts.join(" ")
}

pub fn readable_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

/// `[████░░░░░░] 40.0%`
pub fn progress_bar(done: u64, total: u64, width: usize) -> String {
    let ratio = if total == 0 {
        0.0
    } else {
        (done as f64 / total as f64).clamp(0.0, 1.0)
    };
    let filled = (ratio * width as f64).round() as usize;
    format!(
        "[{}{}] {:.1}%",
        "█".repeat(filled),
        "░".repeat(width.saturating_sub(filled)),
        ratio * 100.0
    )
}

/// Cut to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
