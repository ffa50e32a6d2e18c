//! Mapping between teloxide types and the core domain.

use teloxide::types::{
    self as tg, FileMeta, MessageCommon, MessageEntity, MessageEntityKind, MessageKind, Recipient,
};

use relay_core::{
    domain::{
        ChatId, ChatInfo, ChatRef, Document, DocumentAttribute, EntityKind, Media, Message,
        MessageId, Photo, RemoteFile, TextEntity,
    },
    ports::{Upload, UploadKind},
};

pub fn recipient(chat: &ChatRef) -> Recipient {
    match chat {
        ChatRef::Id(id) => Recipient::Id(tg::ChatId(id.0)),
        ChatRef::Username(name) => Recipient::ChannelUsername(format!("@{name}")),
    }
}

fn common(msg: &tg::Message) -> Option<&MessageCommon> {
    match &msg.kind {
        MessageKind::Common(c) => Some(c),
        _ => None,
    }
}

pub fn message_from_tg(msg: &tg::Message) -> Message {
    let common = common(msg);
    let (text, entities) = match msg.text() {
        Some(text) => (Some(text), msg.entities()),
        None => (msg.caption(), msg.caption_entities()),
    };

    Message {
        id: MessageId(msg.id.0),
        chat: ChatInfo {
            id: ChatId(msg.chat.id.0),
            username: msg.chat.username().map(str::to_string),
        },
        text: text.map(str::to_string),
        entities: entities.map(entities_from_tg).unwrap_or_default(),
        media: media_from_tg(msg),
        protected: common.is_some_and(|c| c.has_protected_content),
        forwarded: common.is_some_and(|c| c.forward.is_some()),
        service: common.is_none(),
    }
}

fn remote(meta: &FileMeta) -> RemoteFile {
    RemoteFile {
        id: meta.id.clone(),
        size: (meta.size > 0).then_some(meta.size as u64),
    }
}

fn document(
    meta: &FileMeta,
    mime_type: Option<String>,
    file_name: Option<&String>,
    mut attributes: Vec<DocumentAttribute>,
) -> Media {
    if let Some(name) = file_name {
        attributes.insert(0, DocumentAttribute::Filename(name.clone()));
    }
    Media::Document(Document {
        file: remote(meta),
        mime_type,
        attributes,
    })
}

/// Photo (largest size) or one of the document-like media kinds.
pub fn media_from_tg(msg: &tg::Message) -> Option<Media> {
    if let Some(sizes) = msg.photo() {
        let best = sizes.iter().max_by_key(|p| u64::from(p.width) * u64::from(p.height))?;
        return Some(Media::Photo(Photo {
            file: remote(&best.file),
            width: best.width,
            height: best.height,
        }));
    }

    if let Some(v) = msg.video() {
        return Some(document(
            &v.file,
            Some(
                v.mime_type
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "video/mp4".to_string()),
            ),
            v.file_name.as_ref(),
            vec![DocumentAttribute::Video {
                duration_secs: v.duration,
                width: v.width,
                height: v.height,
            }],
        ));
    }

    if let Some(a) = msg.animation() {
        return Some(document(
            &a.file,
            a.mime_type.as_ref().map(|m| m.to_string()),
            a.file_name.as_ref(),
            vec![
                DocumentAttribute::Video {
                    duration_secs: a.duration,
                    width: a.width,
                    height: a.height,
                },
                DocumentAttribute::Animated,
            ],
        ));
    }

    if let Some(a) = msg.audio() {
        return Some(document(
            &a.file,
            a.mime_type.as_ref().map(|m| m.to_string()),
            a.file_name.as_ref(),
            vec![DocumentAttribute::Audio {
                duration_secs: a.duration,
                title: a.title.clone(),
                performer: a.performer.clone(),
                voice: false,
            }],
        ));
    }

    if let Some(v) = msg.voice() {
        return Some(document(
            &v.file,
            Some(
                v.mime_type
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "audio/ogg".to_string()),
            ),
            None,
            vec![DocumentAttribute::Audio {
                duration_secs: v.duration,
                title: None,
                performer: None,
                voice: true,
            }],
        ));
    }

    if let Some(d) = msg.document() {
        return Some(document(
            &d.file,
            d.mime_type.as_ref().map(|m| m.to_string()),
            d.file_name.as_ref(),
            vec![],
        ));
    }

    None
}

pub fn entities_from_tg(entities: &[MessageEntity]) -> Vec<TextEntity> {
    entities
        .iter()
        .map(|e| TextEntity {
            offset: e.offset,
            length: e.length,
            kind: match &e.kind {
                MessageEntityKind::Bold => EntityKind::Bold,
                MessageEntityKind::Italic => EntityKind::Italic,
                MessageEntityKind::Underline => EntityKind::Underline,
                MessageEntityKind::Strikethrough => EntityKind::Strikethrough,
                MessageEntityKind::Spoiler => EntityKind::Spoiler,
                MessageEntityKind::Code => EntityKind::Code,
                MessageEntityKind::Pre { language } => EntityKind::Pre {
                    language: language.clone(),
                },
                MessageEntityKind::TextLink { url } => EntityKind::TextLink {
                    url: url.to_string(),
                },
                MessageEntityKind::CustomEmoji { custom_emoji_id } => EntityKind::CustomEmoji {
                    id: custom_emoji_id.clone(),
                },
                _ => EntityKind::Derived,
            },
        })
        .collect()
}

/// Derived entities are dropped; Telegram recomputes them from the text.
pub fn entities_to_tg(entities: &[TextEntity]) -> Vec<MessageEntity> {
    entities
        .iter()
        .filter_map(|e| {
            let kind = match &e.kind {
                EntityKind::Bold => MessageEntityKind::Bold,
                EntityKind::Italic => MessageEntityKind::Italic,
                EntityKind::Underline => MessageEntityKind::Underline,
                EntityKind::Strikethrough => MessageEntityKind::Strikethrough,
                EntityKind::Spoiler => MessageEntityKind::Spoiler,
                EntityKind::Code => MessageEntityKind::Code,
                EntityKind::Pre { language } => MessageEntityKind::Pre {
                    language: language.clone(),
                },
                EntityKind::TextLink { url } => MessageEntityKind::TextLink {
                    url: url::Url::parse(url).ok()?,
                },
                EntityKind::CustomEmoji { id } => MessageEntityKind::CustomEmoji {
                    custom_emoji_id: id.clone(),
                },
                EntityKind::Derived => return None,
            };
            Some(MessageEntity {
                kind,
                offset: e.offset,
                length: e.length,
            })
        })
        .collect()
}

/// Which Bot API send method carries a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Presentation {
    Photo,
    Video {
        duration: u32,
        width: u32,
        height: u32,
    },
    Animation,
    Audio {
        duration: u32,
        title: Option<String>,
        performer: Option<String>,
    },
    Voice {
        duration: u32,
    },
    Document,
}

/// Presentation for resending a remote file by id; must match how it was sent originally.
pub fn remote_presentation(media: &Media) -> Presentation {
    match media {
        Media::Photo(_) => Presentation::Photo,
        Media::Document(d) => from_attributes(&d.attributes).unwrap_or(Presentation::Document),
    }
}

pub fn upload_presentation(upload: &Upload) -> Presentation {
    if upload.force_document {
        return Presentation::Document;
    }
    if upload.kind == UploadKind::Photo {
        return Presentation::Photo;
    }
    if let Some(p) = from_attributes(&upload.attributes) {
        return p;
    }
    match upload.mime_type.as_deref() {
        Some("image/gif") => Presentation::Animation,
        Some(m) if m.starts_with("image/") => Presentation::Photo,
        Some(m) if m.starts_with("video/") => Presentation::Video {
            duration: 0,
            width: 0,
            height: 0,
        },
        _ => Presentation::Document,
    }
}

fn from_attributes(attributes: &[DocumentAttribute]) -> Option<Presentation> {
    if attributes.contains(&DocumentAttribute::Animated) {
        return Some(Presentation::Animation);
    }
    attributes.iter().find_map(|a| match a {
        DocumentAttribute::Video {
            duration_secs,
            width,
            height,
        } => Some(Presentation::Video {
            duration: *duration_secs,
            width: *width,
            height: *height,
        }),
        DocumentAttribute::Audio {
            duration_secs,
            voice: true,
            ..
        } => Some(Presentation::Voice {
            duration: *duration_secs,
        }),
        DocumentAttribute::Audio {
            duration_secs,
            title,
            performer,
            voice: false,
        } => Some(Presentation::Audio {
            duration: *duration_secs,
            title: title.clone(),
            performer: performer.clone(),
        }),
        _ => None,
    })
}
