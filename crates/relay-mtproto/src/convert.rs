//! Mapping between grammers types and the relay domain.

use std::time::Duration;

use grammers_client::types::{Attribute, Chat, Media as TgMedia, Message as TgMessage};
use grammers_session::{PackedChat, PackedType};
use grammers_tl_types as tl;

use relay_core::domain::{
    ChatId, ChatInfo, Document, DocumentAttribute, EntityKind, Media, Message, MessageId, Photo,
    RemoteFile, TextEntity,
};

/// Telegram serves at most this many messages per request.
const MAX_IDS_PER_REQUEST: usize = 100;

/// Bot-API style id: users positive, basic groups negated, channels `-100` prefixed.
pub fn marked_id(chat: &PackedChat) -> i64 {
    mark(chat.ty, chat.id)
}

fn mark(ty: PackedType, id: i64) -> i64 {
    match ty {
        PackedType::User | PackedType::Bot => id,
        PackedType::Chat => -id,
        _ => -1_000_000_000_000 - id,
    }
}

/// Channels and groups are listed by `relay chats`; private dialogs are not.
pub fn is_group_or_channel(chat: &Chat) -> bool {
    matches!(chat, Chat::Group(_) | Chat::Channel(_))
}

/// Key under which a fetched message's media object is kept until the next page.
pub fn media_key(chat_id: i64, message_id: i32) -> String {
    format!("{chat_id}/{message_id}")
}

/// Ids `after+1 ..= min(after+limit, newest)`, or `None` once `after` reached `newest`.
pub fn id_window(after: i32, limit: usize, newest: i32) -> Option<Vec<i32>> {
    if after >= newest {
        return None;
    }
    let limit = limit.clamp(1, MAX_IDS_PER_REQUEST) as i64;
    let last = (after as i64 + limit).min(newest as i64) as i32;
    Some((after + 1..=last).collect())
}

/// Domain view of `msg`, plus the grammers media object when the domain one is relayable.
pub fn message_from_tg(msg: &TgMessage) -> (Message, Option<TgMedia>) {
    let chat = msg.chat();
    let chat_id = marked_id(&chat.pack());
    let raw = msg.media();
    let media = raw
        .as_ref()
        .and_then(|m| media_from_tg(media_key(chat_id, msg.id()), m));
    let keep = media.is_some();

    let text = msg.text();
    let message = Message {
        id: MessageId(msg.id()),
        chat: ChatInfo {
            id: ChatId(chat_id),
            username: chat.username().map(str::to_string),
        },
        text: (!text.is_empty()).then(|| text.to_string()),
        entities: msg
            .fmt_entities()
            .map(|e| entities_from_tl(e))
            .unwrap_or_default(),
        media,
        // History runs try every strategy anyway; the flag only drives live filtering.
        protected: false,
        forwarded: msg.forward_header().is_some(),
        service: msg.action().is_some(),
    };
    (message, raw.filter(|_| keep))
}

fn media_from_tg(key: String, media: &TgMedia) -> Option<Media> {
    match media {
        TgMedia::Photo(_) => Some(Media::Photo(Photo {
            file: RemoteFile { id: key, size: None },
            width: 0,
            height: 0,
        })),
        TgMedia::Document(doc) => {
            let mime_type = doc.mime_type().map(str::to_string);
            let mut attributes = Vec::new();
            if !doc.name().is_empty() {
                attributes.push(DocumentAttribute::Filename(doc.name().to_string()));
            }

            let duration_secs = doc.duration().unwrap_or(0.0).max(0.0) as u32;
            let family = mime_type.as_deref().unwrap_or("");
            if family.starts_with("video/") {
                if let Some((w, h)) = doc.resolution() {
                    attributes.push(DocumentAttribute::Video {
                        duration_secs,
                        width: w.max(0) as u32,
                        height: h.max(0) as u32,
                    });
                }
            } else if family.starts_with("audio/") {
                attributes.push(DocumentAttribute::Audio {
                    duration_secs,
                    title: doc.audio_title(),
                    performer: doc.performer(),
                    voice: family == "audio/ogg",
                });
            }

            Some(Media::Document(Document {
                file: RemoteFile {
                    id: key,
                    size: u64::try_from(doc.size()).ok().filter(|s| *s > 0),
                },
                mime_type,
                attributes,
            }))
        }
        _ => None,
    }
}

pub fn entities_from_tl(entities: &[tl::enums::MessageEntity]) -> Vec<TextEntity> {
    use tl::enums::MessageEntity as E;

    entities
        .iter()
        .filter_map(|e| {
            let (offset, length, kind) = match e {
                E::Bold(b) => (b.offset, b.length, EntityKind::Bold),
                E::Italic(i) => (i.offset, i.length, EntityKind::Italic),
                E::Underline(u) => (u.offset, u.length, EntityKind::Underline),
                E::Strike(s) => (s.offset, s.length, EntityKind::Strikethrough),
                E::Spoiler(s) => (s.offset, s.length, EntityKind::Spoiler),
                E::Code(c) => (c.offset, c.length, EntityKind::Code),
                E::Pre(p) => (
                    p.offset,
                    p.length,
                    EntityKind::Pre {
                        language: (!p.language.is_empty()).then(|| p.language.clone()),
                    },
                ),
                E::TextUrl(t) => (
                    t.offset,
                    t.length,
                    EntityKind::TextLink { url: t.url.clone() },
                ),
                E::CustomEmoji(c) => (
                    c.offset,
                    c.length,
                    EntityKind::CustomEmoji {
                        id: c.document_id.to_string(),
                    },
                ),
                // Mentions, urls, hashtags and the like are re-derived from the text.
                _ => return None,
            };
            Some(TextEntity {
                offset: offset.max(0) as usize,
                length: length.max(0) as usize,
                kind,
            })
        })
        .collect()
}

pub fn entities_to_tl(entities: &[TextEntity]) -> Vec<tl::enums::MessageEntity> {
    entities
        .iter()
        .filter_map(|e| {
            let offset = e.offset as i32;
            let length = e.length as i32;
            Some(match &e.kind {
                EntityKind::Bold => tl::types::MessageEntityBold { offset, length }.into(),
                EntityKind::Italic => tl::types::MessageEntityItalic { offset, length }.into(),
                EntityKind::Underline => {
                    tl::types::MessageEntityUnderline { offset, length }.into()
                }
                EntityKind::Strikethrough => {
                    tl::types::MessageEntityStrike { offset, length }.into()
                }
                EntityKind::Spoiler => tl::types::MessageEntitySpoiler { offset, length }.into(),
                EntityKind::Code => tl::types::MessageEntityCode { offset, length }.into(),
                EntityKind::Pre { language } => tl::types::MessageEntityPre {
                    offset,
                    length,
                    language: language.clone().unwrap_or_default(),
                }
                .into(),
                EntityKind::TextLink { url } => tl::types::MessageEntityTextUrl {
                    offset,
                    length,
                    url: url.clone(),
                }
                .into(),
                EntityKind::CustomEmoji { id } => tl::types::MessageEntityCustomEmoji {
                    offset,
                    length,
                    document_id: id.parse().ok()?,
                }
                .into(),
                EntityKind::Derived => return None,
            })
        })
        .collect()
}

/// Presentation attributes for an uploaded document. File names travel with the upload itself.
pub fn attributes_to_tg(attributes: &[DocumentAttribute]) -> Vec<Attribute> {
    attributes
        .iter()
        .filter_map(|a| match a {
            DocumentAttribute::Video {
                duration_secs,
                width,
                height,
            } => Some(Attribute::Video {
                round_message: false,
                supports_streaming: true,
                duration: Duration::from_secs(u64::from(*duration_secs)),
                w: *width as i32,
                h: *height as i32,
            }),
            DocumentAttribute::Audio {
                duration_secs,
                voice: true,
                ..
            } => Some(Attribute::Voice {
                duration: Duration::from_secs(u64::from(*duration_secs)),
                waveform: None,
            }),
            DocumentAttribute::Audio {
                duration_secs,
                title,
                performer,
                voice: false,
            } => Some(Attribute::Audio {
                duration: Duration::from_secs(u64::from(*duration_secs)),
                title: title.clone(),
                performer: performer.clone(),
            }),
            DocumentAttribute::Filename(_) | DocumentAttribute::Animated => None,
        })
        .collect()
}
