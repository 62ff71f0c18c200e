/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so every handler
/// failure surfaces the same way: a human-readable chat reply.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Platform refused the action (missing admin rights, target is an admin).
    #[error("{0}")]
    Permission(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    External(String),
}

impl Error {
    /// Errors the user can fix by changing the command arguments.
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::InvalidArgument(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
