use std::path::PathBuf;

use async_trait::async_trait;

use crate::{
    domain::{ChatRef, DocumentAttribute, Media, Message, MessageId, MessageRef, TextEntity},
    Result,
};

/// Capabilities of a chat client implementation.
#[derive(Clone, Copy, Debug)]
pub struct ClientCapabilities {
    /// Whether `fetch_history` can page through past messages.
    pub supports_history: bool,
    /// Largest file the client can download, if it is limited.
    pub max_download_bytes: Option<u64>,
}

/// One page request. Results are ascending by id, strictly after `after`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryQuery {
    pub after: MessageId,
    pub limit: usize,
}

/// How a re-uploaded file is presented in the target chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadKind {
    Photo,
    Document,
}

/// A local file to upload with the metadata of the message it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    pub path: PathBuf,
    pub kind: UploadKind,
    pub mime_type: Option<String>,
    pub attributes: Vec<DocumentAttribute>,
    /// Send as a generic file even when the client could render it inline.
    pub force_document: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attachment {
    /// Attach the original remote media object without downloading it.
    Remote(Media),
    Local(Upload),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub entities: Vec<TextEntity>,
    pub attachment: Option<Attachment>,
}

impl OutgoingMessage {
    /// Same text and formatting as `message`, with the given attachment.
    pub fn from_message(message: &Message, attachment: Option<Attachment>) -> Self {
        Self {
            text: message.text_or_empty().to_string(),
            entities: message.entities.clone(),
            attachment,
        }
    }
}

pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// Hexagonal port for the messaging platform client.
///
/// Implementations report a refused transfer-by-reference as
/// `Error::Restricted` so callers can fall back without treating it as a fault.
#[async_trait]
pub trait ChatClient: Send + Sync {
    fn capabilities(&self) -> ClientCapabilities;

    async fn fetch_history(&self, chat: &ChatRef, query: HistoryQuery) -> Result<Vec<Message>>;

    async fn forward(
        &self,
        target: &ChatRef,
        source: &ChatRef,
        ids: &[MessageId],
        drop_author: bool,
    ) -> Result<()>;

    async fn send(&self, target: &ChatRef, msg: OutgoingMessage) -> Result<MessageRef>;

    /// Download the media bytes. `progress(done, total)` may be called any number of times.
    async fn download(&self, media: &Media, progress: &ProgressFn) -> Result<Vec<u8>>;
}
