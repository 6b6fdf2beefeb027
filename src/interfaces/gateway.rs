use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
    UploadPhoto,
    UploadVideo,
}

impl ChatAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Typing => "typing",
            Self::UploadPhoto => "upload_photo",
            Self::UploadVideo => "upload_video",
        }
    }
}

/// One button of an inline keyboard menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardButton {
    pub label: String,
    pub data: String,
}

impl KeyboardButton {
    #[must_use]
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// The only seam through which the relay talks to the messaging
/// frontend. Transport failures surface as [`RelayError::Delivery`] (or
/// [`RelayError::Fetch`] for downloads) so callers can decide whether to
/// echo them back to the requesting chat or just log them.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), RelayError>;

    async fn send_photo(&self, chat_id: i64, path: &Path, caption: &str)
    -> Result<(), RelayError>;

    async fn send_video(&self, chat_id: i64, path: &Path, caption: &str)
    -> Result<(), RelayError>;

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<(), RelayError>;

    async fn answer_callback(&self, query_id: &str, text: Option<&str>)
    -> Result<(), RelayError>;

    async fn send_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        rows: &[Vec<KeyboardButton>],
    ) -> Result<(), RelayError>;

    /// Downloads an attachment (voice note) into a temp file owned by
    /// the caller.
    async fn fetch_file(&self, file_id: &str) -> Result<PathBuf, RelayError>;
}
