//! Telegram adapter (teloxide).
//!
//! This crate implements the `relay-core` ChatClient over Telegram Bot API.

use async_trait::async_trait;
use futures::StreamExt;

use teloxide::{
    net::Download,
    prelude::*,
    types::{InputFile, MessageEntity, Recipient},
    ApiError, RequestError,
};

use tokio::time::sleep;

pub mod convert;
pub mod handlers;
pub mod router;

#[cfg(test)]
pub(crate) mod test_support;

use relay_core::{
    domain::{ChatId, ChatRef, Media, Message as CoreMessage, MessageId, MessageRef},
    errors::Error,
    ports::{Attachment, ChatClient, ClientCapabilities, HistoryQuery, OutgoingMessage, ProgressFn},
    restriction, Result,
};

use convert::Presentation;

/// Bot API refuses downloads above this size.
const BOT_API_DOWNLOAD_LIMIT: u64 = 20 * 1024 * 1024;

const REFUSALS: [&str; 3] = ["can't be forwarded", "can't be copied", "protected content"];

fn is_refusal(text: &str) -> bool {
    let text = text.to_lowercase();
    REFUSALS.iter().any(|r| text.contains(r))
}

#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(Bot::new(token))
    }

    fn map_err(e: RequestError) -> Error {
        match &e {
            // teloxide has no dedicated variant for these refusals.
            RequestError::Api(ApiError::Unknown(text)) if is_refusal(text) => {
                Error::Restricted(e.to_string())
            }
            _ => restriction::classify(format!("telegram error: {e}")),
        }
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    async fn send_file(
        &self,
        to: Recipient,
        file: InputFile,
        presentation: Presentation,
        caption: &str,
        entities: Vec<MessageEntity>,
    ) -> Result<Message> {
        let caption = caption.to_string();
        let has_caption = !caption.trim().is_empty();

        // Every send method has its own request type but the same caption setters.
        macro_rules! captioned {
            ($req:expr) => {{
                let req = $req;
                if has_caption {
                    req.caption(caption.clone())
                        .caption_entities(entities.clone())
                } else {
                    req
                }
            }};
        }

        match presentation {
            Presentation::Photo => {
                self.with_retry(|| captioned!(self.bot.send_photo(to.clone(), file.clone())))
                    .await
            }
            Presentation::Video {
                duration,
                width,
                height,
            } => {
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_video(to.clone(), file.clone())
                        .supports_streaming(true);
                    if duration > 0 {
                        req = req.duration(duration).width(width).height(height);
                    }
                    captioned!(req)
                })
                .await
            }
            Presentation::Animation => {
                self.with_retry(|| captioned!(self.bot.send_animation(to.clone(), file.clone())))
                    .await
            }
            Presentation::Audio {
                duration,
                title,
                performer,
            } => {
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_audio(to.clone(), file.clone())
                        .duration(duration);
                    if let Some(t) = &title {
                        req = req.title(t.clone());
                    }
                    if let Some(p) = &performer {
                        req = req.performer(p.clone());
                    }
                    captioned!(req)
                })
                .await
            }
            Presentation::Voice { duration } => {
                self.with_retry(|| {
                    captioned!(self
                        .bot
                        .send_voice(to.clone(), file.clone())
                        .duration(duration))
                })
                .await
            }
            Presentation::Document => {
                self.with_retry(|| {
                    captioned!(self
                        .bot
                        .send_document(to.clone(), file.clone())
                        .disable_content_type_detection(true))
                })
                .await
            }
        }
    }
}

#[async_trait]
impl ChatClient for TelegramClient {
    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            supports_history: false,
            max_download_bytes: Some(BOT_API_DOWNLOAD_LIMIT),
        }
    }

    async fn fetch_history(&self, _chat: &ChatRef, _query: HistoryQuery) -> Result<Vec<CoreMessage>> {
        Err(Error::Unsupported(
            "Bot API cannot page chat history".to_string(),
        ))
    }

    async fn forward(
        &self,
        target: &ChatRef,
        source: &ChatRef,
        ids: &[MessageId],
        drop_author: bool,
    ) -> Result<()> {
        let to = convert::recipient(target);
        let from = convert::recipient(source);

        for id in ids {
            let message_id = teloxide::types::MessageId(id.0);
            if drop_author {
                self.with_retry(|| self.bot.copy_message(to.clone(), from.clone(), message_id))
                    .await?;
            } else {
                self.with_retry(|| {
                    self.bot
                        .forward_message(to.clone(), from.clone(), message_id)
                })
                .await?;
            }
        }
        Ok(())
    }

    async fn send(&self, target: &ChatRef, msg: OutgoingMessage) -> Result<MessageRef> {
        let to = convert::recipient(target);
        let entities = convert::entities_to_tg(&msg.entities);

        let sent = match &msg.attachment {
            None => {
                if msg.text.trim().is_empty() {
                    return Err(Error::Unsupported("nothing to send".to_string()));
                }
                self.with_retry(|| {
                    self.bot
                        .send_message(to.clone(), msg.text.clone())
                        .entities(entities.clone())
                })
                .await?
            }
            Some(Attachment::Remote(media)) => {
                let file = InputFile::file_id(media.remote_file().id.clone());
                let presentation = convert::remote_presentation(media);
                self.send_file(to, file, presentation, &msg.text, entities)
                    .await?
            }
            Some(Attachment::Local(upload)) => {
                let mut file = InputFile::file(upload.path.clone());
                let name = upload.attributes.iter().find_map(|a| match a {
                    relay_core::domain::DocumentAttribute::Filename(n) => Some(n.clone()),
                    _ => None,
                });
                if let Some(name) = name {
                    file = file.file_name(name);
                }
                let presentation = convert::upload_presentation(upload);
                self.send_file(to, file, presentation, &msg.text, entities)
                    .await?
            }
        };

        Ok(MessageRef {
            chat_id: ChatId(sent.chat.id.0),
            message_id: MessageId(sent.id.0),
        })
    }

    async fn download(&self, media: &Media, progress: &ProgressFn) -> Result<Vec<u8>> {
        let remote = media.remote_file();
        let file = self
            .with_retry(|| self.bot.get_file(remote.id.clone()))
            .await?;
        let total = remote.size.unwrap_or(file.meta.size as u64);

        let mut buf = Vec::with_capacity(total as usize);
        let mut stream = self.bot.download_file_stream(&file.path);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::External(format!("download failed: {e}")))?;
            buf.extend_from_slice(&chunk);
            progress(buf.len() as u64, total);
        }
        Ok(buf)
    }
}
