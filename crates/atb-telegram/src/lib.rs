//! Telegram adapter (teloxide).
//!
//! Implements the `atb-core` messaging and role-lookup ports over the Bot API
//! and hosts the dispatcher plus every command handler.

use std::time::Duration;

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ChatMemberKind, InputFile, ParseMode},
    RequestError,
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use atb_core::{
    domain::{ChatId, MemberRole, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{ChatAction, FileKind, OutgoingFile},
    },
    security::RoleLookup,
    Result,
};

pub(crate) fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
    teloxide::types::ChatId(chat_id.0)
}

pub(crate) fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
    teloxide::types::MessageId(message_id.0)
}

pub(crate) fn tg_user(user_id: UserId) -> teloxide::types::UserId {
    teloxide::types::UserId(user_id.0 as u64)
}

pub(crate) fn user_id_of(user: &teloxide::types::User) -> UserId {
    UserId(user.id.0 as i64)
}

pub(crate) fn message_ref(msg: &Message) -> MessageRef {
    MessageRef {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
    }
}

/// Map a Bot API failure onto the core error taxonomy.
pub fn map_request_error(e: RequestError) -> Error {
    match e {
        RequestError::Api(api) => classify_api_error(&api.to_string()),
        RequestError::RetryAfter(d) => Error::External(format!(
            "Telegram flood limit hit, retry after {}s",
            d.as_secs()
        )),
        other => Error::External(format!("telegram error: {other}")),
    }
}

/// API error texts are stable across Bot API versions; classify on them.
fn classify_api_error(text: &str) -> Error {
    let lower = text.to_lowercase();
    const PERMISSION: &[&str] = &[
        "not enough rights",
        "chat_admin_required",
        "user is an administrator",
        "can't remove chat owner",
        "can't demote chat creator",
        "can't restrict self",
        "method is available only for supergroups",
        "have no rights",
        "bot was kicked",
        "need administrator rights",
    ];
    const NOT_FOUND: &[&str] = &[
        "user not found",
        "chat not found",
        "participant_id_invalid",
        "message to delete not found",
        "message to pin not found",
        "message to unpin not found",
        "message to forward not found",
        "message to edit not found",
        "member not found",
    ];

    if PERMISSION.iter().any(|p| lower.contains(p)) {
        Error::Permission(text.to_string())
    } else if NOT_FOUND.iter().any(|p| lower.contains(p)) {
        Error::NotFound(text.to_string())
    } else {
        Error::External(text.to_string())
    }
}

fn is_not_modified(e: &RequestError) -> bool {
    matches!(e, RequestError::Api(api) if api.to_string().to_lowercase().contains("message is not modified"))
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    flood_wait_threshold: Duration,
}

impl TelegramMessenger {
    pub fn new(bot: Bot, flood_wait_threshold: Duration) -> Self {
        Self {
            bot,
            flood_wait_threshold,
        }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// Run a Bot API call, sleeping through one flood wait no longer than
    /// the configured threshold.
    pub async fn call<T, Fut>(&self, op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        self.with_retry(op).await.map_err(map_request_error)
    }

    async fn with_retry<T, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> std::result::Result<T, RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(d))
                    if attempts < MAX_RETRIES && d <= self.flood_wait_threshold =>
                {
                    attempts += 1;
                    tracing::warn!("flood wait {}s, retrying once", d.as_secs());
                    sleep(d).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn input_file(file: &OutgoingFile) -> InputFile {
        let name = file.file_name.clone().or_else(|| {
            file.path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
        });
        let input = InputFile::file(file.path.clone());
        match name {
            Some(n) => input.file_name(n),
            None => input,
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .call(|| {
                self.bot
                    .send_message(tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true)
            })
            .await?;
        Ok(message_ref(&msg))
    }

    async fn reply_html(&self, to: MessageRef, html: &str) -> Result<MessageRef> {
        let msg = self
            .call(|| {
                self.bot
                    .send_message(tg_chat(to.chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true)
                    .reply_to_message_id(tg_msg_id(to.message_id))
                    .allow_sending_without_reply(true)
            })
            .await?;
        Ok(message_ref(&msg))
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        let res = self
            .with_retry(|| {
                self.bot
                    .edit_message_text(
                        tg_chat(msg.chat_id),
                        tg_msg_id(msg.message_id),
                        html.to_string(),
                    )
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true)
            })
            .await;
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(map_request_error(e)),
        }
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.call(|| {
            self.bot
                .delete_message(tg_chat(msg.chat_id), tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn forward_message(&self, to: ChatId, msg: MessageRef) -> Result<MessageRef> {
        let sent = self
            .call(|| {
                self.bot.forward_message(
                    tg_chat(to),
                    tg_chat(msg.chat_id),
                    tg_msg_id(msg.message_id),
                )
            })
            .await?;
        Ok(message_ref(&sent))
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
            ChatAction::UploadDocument => teloxide::types::ChatAction::UploadDocument,
            ChatAction::UploadVideo => teloxide::types::ChatAction::UploadVideo,
            ChatAction::UploadAudio => teloxide::types::ChatAction::UploadVoice,
        };
        self.call(|| self.bot.send_chat_action(tg_chat(chat_id), tg_action))
            .await?;
        Ok(())
    }

    async fn send_file(&self, to: MessageRef, file: OutgoingFile) -> Result<MessageRef> {
        let chat = tg_chat(to.chat_id);
        let reply_to = tg_msg_id(to.message_id);
        let caption = file.caption.clone().unwrap_or_default();

        let sent = match file.kind {
            FileKind::Document => {
                self.call(|| {
                    self.bot
                        .send_document(chat, Self::input_file(&file))
                        .caption(caption.clone())
                        .parse_mode(ParseMode::Html)
                        .reply_to_message_id(reply_to)
                        .allow_sending_without_reply(true)
                })
                .await?
            }
            FileKind::Video => {
                self.call(|| {
                    self.bot
                        .send_video(chat, Self::input_file(&file))
                        .caption(caption.clone())
                        .parse_mode(ParseMode::Html)
                        .supports_streaming(true)
                        .reply_to_message_id(reply_to)
                        .allow_sending_without_reply(true)
                })
                .await?
            }
            FileKind::Audio => {
                let title = file.file_name.clone().unwrap_or_default();
                self.call(|| {
                    self.bot
                        .send_audio(chat, Self::input_file(&file))
                        .caption(caption.clone())
                        .parse_mode(ParseMode::Html)
                        .title(title.clone())
                        .reply_to_message_id(reply_to)
                        .allow_sending_without_reply(true)
                })
                .await?
            }
        };
        Ok(message_ref(&sent))
    }
}

pub(crate) fn member_role(kind: &ChatMemberKind) -> MemberRole {
    match kind {
        ChatMemberKind::Owner(_) => MemberRole::Creator,
        ChatMemberKind::Administrator(_) => MemberRole::Administrator,
        ChatMemberKind::Member => MemberRole::Member,
        ChatMemberKind::Restricted(_) => MemberRole::Restricted,
        ChatMemberKind::Left => MemberRole::Left,
        ChatMemberKind::Banned(_) => MemberRole::Banned,
    }
}

pub(crate) fn custom_title(kind: &ChatMemberKind) -> Option<&str> {
    match kind {
        ChatMemberKind::Owner(o) => o.custom_title.as_deref(),
        ChatMemberKind::Administrator(a) => a.custom_title.as_deref(),
        _ => None,
    }
}

/// Live membership lookup through `getChatMember`.
#[derive(Clone)]
pub struct TelegramRoles {
    messenger: TelegramMessenger,
}

impl TelegramRoles {
    pub fn new(messenger: TelegramMessenger) -> Self {
        Self { messenger }
    }
}

#[async_trait]
impl RoleLookup for TelegramRoles {
    async fn member_role(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberRole> {
        let bot = self.messenger.bot();
        let member = self
            .messenger
            .call(|| bot.get_chat_member(tg_chat(chat_id), tg_user(user_id)))
            .await?;
        Ok(member_role(&member.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_permission_errors() {
        let e = classify_api_error("Bad Request: not enough rights to restrict/unrestrict chat member");
        assert!(matches!(e, Error::Permission(_)));

        let e = classify_api_error("Bad Request: user is an administrator of the chat");
        assert!(matches!(e, Error::Permission(_)));
    }

    #[test]
    fn classifies_lookup_errors() {
        assert!(matches!(
            classify_api_error("Bad Request: user not found"),
            Error::NotFound(_)
        ));
        assert!(matches!(
            classify_api_error("Bad Request: message to delete not found"),
            Error::NotFound(_)
        ));
        assert!(classify_api_error("Bad Request: PARTICIPANT_ID_INVALID").is_usage());
    }

    #[test]
    fn other_api_errors_are_external_and_verbatim() {
        let e = classify_api_error("Bad Request: message text is empty");
        assert!(matches!(e, Error::External(_)));
        assert_eq!(e.to_string(), "Bad Request: message text is empty");
    }

    #[test]
    fn flood_wait_is_external() {
        let e = map_request_error(RequestError::RetryAfter(Duration::from_secs(42)));
        assert!(matches!(e, Error::External(ref m) if m.contains("42s")));
    }

    #[test]
    fn member_kinds_map_to_roles() {
        assert_eq!(member_role(&ChatMemberKind::Member), MemberRole::Member);
        assert_eq!(member_role(&ChatMemberKind::Left), MemberRole::Left);
        assert!(custom_title(&ChatMemberKind::Member).is_none());
    }
}
