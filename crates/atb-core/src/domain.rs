/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Kind of conversation a command was sent in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn is_private(self) -> bool {
        matches!(self, ChatKind::Private)
    }

    pub fn label(self) -> &'static str {
        match self {
            ChatKind::Private => "private",
            ChatKind::Group => "group",
            ChatKind::Supergroup => "supergroup",
            ChatKind::Channel => "channel",
        }
    }
}

/// Membership role of a user inside a chat, as reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberRole {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberRole {
    pub fn is_admin(self) -> bool {
        matches!(self, MemberRole::Creator | MemberRole::Administrator)
    }

    pub fn label(self) -> &'static str {
        match self {
            MemberRole::Creator => "Creator",
            MemberRole::Administrator => "Administrator",
            MemberRole::Member => "Member",
            MemberRole::Restricted => "Restricted",
            MemberRole::Left => "Left",
            MemberRole::Banned => "Kicked",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            MemberRole::Creator => "👑",
            MemberRole::Administrator => "👮",
            MemberRole::Member => "👤",
            MemberRole::Restricted => "🚫",
            MemberRole::Left => "🚶",
            MemberRole::Banned => "⛔",
        }
    }
}

/// Who invoked a command and where.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
}
