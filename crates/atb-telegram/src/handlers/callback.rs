//! Inline keyboard demo and its button callbacks.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup},
};

use atb_core::{errors::Error, Result};

use crate::router::AppState;

const DEMO_PREFIX: &str = "inline:";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ButtonStyle {
    Primary,
    Success,
    Danger,
}

impl ButtonStyle {
    const ALL: [ButtonStyle; 3] = [ButtonStyle::Primary, ButtonStyle::Success, ButtonStyle::Danger];

    fn label(self) -> &'static str {
        match self {
            ButtonStyle::Primary => "💙 Primary",
            ButtonStyle::Success => "💚 Success",
            ButtonStyle::Danger => "❤️ Danger",
        }
    }

    fn key(self) -> &'static str {
        match self {
            ButtonStyle::Primary => "primary",
            ButtonStyle::Success => "success",
            ButtonStyle::Danger => "danger",
        }
    }

    fn data(self) -> String {
        format!("{DEMO_PREFIX}{}", self.key())
    }

    fn from_data(data: &str) -> Option<Self> {
        let key = data.strip_prefix(DEMO_PREFIX)?;
        Self::ALL.into_iter().find(|s| s.key() == key)
    }
}

/// One callback button per style plus a link back to the bot.
pub fn demo_keyboard(bot_username: &str) -> Result<InlineKeyboardMarkup> {
    let link = reqwest::Url::parse(&format!("https://t.me/{bot_username}"))
        .map_err(|e| Error::External(format!("invalid bot link: {e}")))?;

    let mut rows: Vec<Vec<InlineKeyboardButton>> = ButtonStyle::ALL
        .into_iter()
        .map(|s| vec![InlineKeyboardButton::callback(s.label(), s.data())])
        .collect();
    rows.push(vec![InlineKeyboardButton::url("🔗 Open bot", link)]);
    Ok(InlineKeyboardMarkup::new(rows))
}

/// Toast text for a pressed button; `None` for data this bot did not issue.
fn callback_answer(data: &str) -> Option<String> {
    ButtonStyle::from_data(data).map(|s| format!("{} button pressed", s.label()))
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let data = q.data.as_deref().unwrap_or_default();
    let answer = callback_answer(data);
    tracing::debug!(user_id = q.from.id.0, data, known = answer.is_some(), "callback");

    // Always answered, so the client stops its spinner.
    let res = state
        .telegram
        .call(|| {
            let req = bot.answer_callback_query(q.id.clone());
            match &answer {
                Some(text) => req.text(text.clone()),
                None => req,
            }
        })
        .await;
    if let Err(e) = res {
        tracing::warn!("failed to answer callback: {e}");
    }
    Ok(())
}
