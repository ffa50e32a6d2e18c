use std::{fmt, str::FromStr};

use crate::errors::Error;

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric, increasing per chat).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub i32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// A chat as an operator names it: numeric id or public handle.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatRef {
    Id(ChatId),
    /// Public handle without the leading `@`.
    Username(String),
}

impl FromStr for ChatRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Config("empty chat identifier".to_string()));
        }
        if let Ok(id) = s.parse::<i64>() {
            return Ok(ChatRef::Id(ChatId(id)));
        }

        let handle = s.strip_prefix('@').unwrap_or(s);
        let valid = !handle.is_empty()
            && handle
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(Error::Config(format!("invalid chat identifier: {s}")));
        }
        Ok(ChatRef::Username(handle.to_string()))
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRef::Id(id) => write!(f, "{}", id.0),
            ChatRef::Username(name) => write!(f, "@{name}"),
        }
    }
}

/// Origin chat of a fetched message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatInfo {
    pub id: ChatId,
    pub username: Option<String>,
}

impl ChatInfo {
    pub fn chat_ref(&self) -> ChatRef {
        ChatRef::Id(self.id)
    }
}

/// Formatting entity over the message text (offsets in UTF-16 code units).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextEntity {
    pub offset: usize,
    pub length: usize,
    pub kind: EntityKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Spoiler,
    Code,
    Pre { language: Option<String> },
    TextLink { url: String },
    CustomEmoji { id: String },
    /// Entities the platform derives from the text itself (mentions, urls...).
    Derived,
}

/// Remote file handle, reusable for sends without transferring bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub size: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Photo {
    pub file: RemoteFile,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentAttribute {
    Filename(String),
    Video {
        duration_secs: u32,
        width: u32,
        height: u32,
    },
    Audio {
        duration_secs: u32,
        title: Option<String>,
        performer: Option<String>,
        voice: bool,
    },
    Animated,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub file: RemoteFile,
    pub mime_type: Option<String>,
    pub attributes: Vec<DocumentAttribute>,
}

impl Document {
    pub fn file_name(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            DocumentAttribute::Filename(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Videos and images keep their native presentation when re-uploaded.
    pub fn has_native_presentation(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|m| m.starts_with("video/") || m.starts_with("image/"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Media {
    Photo(Photo),
    Document(Document),
}

impl Media {
    pub fn remote_file(&self) -> &RemoteFile {
        match self {
            Media::Photo(p) => &p.file,
            Media::Document(d) => &d.file,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Media::Photo(_) => "photo",
            Media::Document(_) => "document",
        }
    }
}

/// A message fetched from history or received live. Immutable once fetched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub chat: ChatInfo,
    pub text: Option<String>,
    pub entities: Vec<TextEntity>,
    pub media: Option<Media>,
    /// The source forbids forwarding/saving this message.
    pub protected: bool,
    /// The message was itself forwarded from elsewhere.
    pub forwarded: bool,
    /// Joins, pins, title changes and other actions. Never relayed.
    pub service: bool,
}

impl Message {
    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn has_text(&self) -> bool {
        !self.text_or_empty().trim().is_empty()
    }
}
