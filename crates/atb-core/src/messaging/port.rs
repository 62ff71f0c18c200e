use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{ChatAction, OutgoingFile},
    Result,
};

/// Outbound messaging port.
///
/// All text is Telegram HTML; callers escape user-provided content.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;
    async fn reply_html(&self, to: MessageRef, html: &str) -> Result<MessageRef>;
    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    /// Copy `msg` into `to`, keeping the "forwarded from" header.
    async fn forward_message(&self, to: ChatId, msg: MessageRef) -> Result<MessageRef>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;

    /// Upload a local file as a reply to `to`.
    async fn send_file(&self, to: MessageRef, file: OutgoingFile) -> Result<MessageRef>;
}
