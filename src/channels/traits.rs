//! Channel Trait Definitions
//!
//! Outbound interface the dispatcher talks to. Telegram implements it in
//! [`crate::telegram`]; tests substitute a recorder.

use async_trait::async_trait;

/// Error types for channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Edit failed: {0}")]
    EditFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Media upload failed: {0}")]
    MediaUploadFailed(String),
}

/// Button for inline keyboards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseButton {
    pub text: String,
    pub callback_data: Option<String>,
    pub url: Option<String>,
}

impl ResponseButton {
    pub fn callback(text: &str, data: &str) -> Self {
        Self {
            text: text.to_string(),
            callback_data: Some(data.to_string()),
            url: None,
        }
    }

    pub fn link(text: &str, url: &str) -> Self {
        Self {
            text: text.to_string(),
            callback_data: None,
            url: Some(url.to_string()),
        }
    }
}

/// File contents handed to the transport for upload
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Outbound chat operations. Message ids are the transport's own.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Send plain text, returning the new message id
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i32, ChannelError>;

    /// Send text with inline buttons, returning the new message id
    async fn send_buttons(
        &self,
        chat_id: i64,
        text: &str,
        buttons: Vec<Vec<ResponseButton>>,
    ) -> Result<i32, ChannelError>;

    /// Replace the text (and drop the buttons) of an earlier message
    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str) -> Result<(), ChannelError>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), ChannelError>;

    async fn send_document(
        &self,
        chat_id: i64,
        file: OutgoingFile,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;

    async fn send_photo(
        &self,
        chat_id: i64,
        file: OutgoingFile,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;

    async fn send_voice(
        &self,
        chat_id: i64,
        file: OutgoingFile,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;
}
