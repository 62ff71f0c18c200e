use std::path::PathBuf;

/// Outgoing "chat action" (typing indicator, upload progress).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
    UploadDocument,
    UploadVideo,
    UploadAudio,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Document,
    Video,
    Audio,
}

impl FileKind {
    pub fn chat_action(self) -> ChatAction {
        match self {
            FileKind::Document => ChatAction::UploadDocument,
            FileKind::Video => ChatAction::UploadVideo,
            FileKind::Audio => ChatAction::UploadAudio,
        }
    }
}

/// A local file to upload.
#[derive(Clone, Debug)]
pub struct OutgoingFile {
    pub path: PathBuf,
    pub kind: FileKind,
    /// HTML caption, already escaped.
    pub caption: Option<String>,
    /// Display name; defaults to the path's file name.
    pub file_name: Option<String>,
}

impl OutgoingFile {
    pub fn new(path: impl Into<PathBuf>, kind: FileKind) -> Self {
        Self {
            path: path.into(),
            kind,
            caption: None,
            file_name: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}
