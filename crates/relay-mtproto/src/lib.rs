//! Telegram user-account adapter (MTProto, grammers).
//!
//! Bots cannot read chat history, so history runs and the chat listing go
//! through a logged-in user account instead.

use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use grammers_client::{
    types::{Downloadable, Media as TgMedia},
    Client, InputMessage, InvocationError,
};
use grammers_session::PackedChat;
use tokio::{fs::File, sync::Mutex};
use tracing::{debug, info};

use relay_core::{
    config::Config,
    domain::{ChatId, ChatRef, Media, Message as CoreMessage, MessageId, MessageRef, RemoteFile},
    errors::Error,
    live::normalize_id,
    ports::{
        Attachment, ChatClient, ClientCapabilities, HistoryQuery, OutgoingMessage, ProgressFn,
        Upload, UploadKind,
    },
    restriction, Result,
};

pub mod convert;
pub mod session;

/// A group or channel the account is a member of.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEntry {
    pub id: i64,
    pub title: String,
    pub username: Option<String>,
}

pub struct MtprotoClient {
    client: Client,
    peers: Mutex<HashMap<ChatRef, PackedChat>>,
    /// Media of the last fetched page, by `RemoteFile::id`.
    media: Mutex<HashMap<String, TgMedia>>,
}

impl MtprotoClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            peers: Mutex::new(HashMap::new()),
            media: Mutex::new(HashMap::new()),
        }
    }

    /// Connect (and sign in if needed) with the user-account settings of `cfg`.
    pub async fn connect(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(session::connect(cfg).await?))
    }

    /// Groups and channels in the account's dialog list.
    pub async fn list_chats(&self) -> Result<Vec<ChatEntry>> {
        let mut chats = Vec::new();
        let mut dialogs = self.client.iter_dialogs();
        while let Some(dialog) = dialogs.next().await.map_err(map_err)? {
            let chat = dialog.chat();
            if !convert::is_group_or_channel(chat) {
                continue;
            }
            let packed = chat.pack();
            let id = convert::marked_id(&packed);
            self.peers
                .lock()
                .await
                .insert(ChatRef::Id(ChatId(id)), packed);
            chats.push(ChatEntry {
                id,
                title: chat.name().to_string(),
                username: chat.username().map(str::to_string),
            });
        }
        Ok(chats)
    }

    async fn resolve(&self, chat: &ChatRef) -> Result<PackedChat> {
        if let Some(packed) = self.peers.lock().await.get(chat) {
            return Ok(packed.clone());
        }

        let packed = match chat {
            ChatRef::Username(name) => self
                .client
                .resolve_username(name)
                .await
                .map_err(map_err)?
                .map(|c| c.pack()),
            ChatRef::Id(id) => self.find_dialog(*id).await?,
        };
        let packed = packed.ok_or_else(|| {
            Error::Config(format!("chat {chat} is unknown to this account (join it first)"))
        })?;

        debug!(%chat, "resolved chat");
        self.peers.lock().await.insert(chat.clone(), packed.clone());
        Ok(packed)
    }

    /// Ids without an access hash can only be found in the dialog list.
    async fn find_dialog(&self, id: ChatId) -> Result<Option<PackedChat>> {
        let wanted = normalize_id(id.0);
        let mut dialogs = self.client.iter_dialogs();
        while let Some(dialog) = dialogs.next().await.map_err(map_err)? {
            let packed = dialog.chat().pack();
            if normalize_id(convert::marked_id(&packed)) == wanted {
                return Ok(Some(packed));
            }
        }
        Ok(None)
    }

    async fn newest_id(&self, chat: &PackedChat) -> Result<Option<i32>> {
        let newest = self
            .client
            .iter_messages(chat.clone())
            .limit(1)
            .next()
            .await
            .map_err(map_err)?;
        Ok(newest.map(|m| m.id()))
    }

    async fn cached_media(&self, file: &RemoteFile) -> Result<TgMedia> {
        self.media
            .lock()
            .await
            .get(&file.id)
            .cloned()
            .ok_or_else(|| {
                Error::External(format!("media {} is not from the current page", file.id))
            })
    }

    /// Re-send `ids` from `source` as new messages, without the forward header.
    async fn copy_messages(
        &self,
        target: &PackedChat,
        source: &PackedChat,
        ids: &[i32],
    ) -> Result<()> {
        let found = self
            .client
            .get_messages_by_id(source.clone(), ids)
            .await
            .map_err(map_err)?;
        for message in found.into_iter().flatten() {
            let mut input = InputMessage::text(message.text())
                .fmt_entities(message.fmt_entities().cloned().unwrap_or_default());
            if let Some(media) = message.media() {
                input = input.copy_media(&media);
            }
            self.client
                .send_message(target.clone(), input)
                .await
                .map_err(map_err)?;
        }
        Ok(())
    }

    async fn upload(&self, upload: &Upload, caption: InputMessage) -> Result<InputMessage> {
        let mut file = File::open(&upload.path).await?;
        let size = file.metadata().await?.len() as usize;
        let name = upload_name(upload);
        let uploaded = self.client.upload_stream(&mut file, size, name).await?;

        Ok(match upload.kind {
            UploadKind::Photo => caption.photo(uploaded),
            UploadKind::Document if upload.force_document => {
                let input = caption.file(uploaded);
                match upload.mime_type.as_deref() {
                    Some(mime) => input.mime_type(mime),
                    None => input,
                }
            }
            UploadKind::Document => {
                let mut input = caption.document(uploaded);
                if let Some(mime) = upload.mime_type.as_deref() {
                    input = input.mime_type(mime);
                }
                for attribute in convert::attributes_to_tg(&upload.attributes) {
                    input = input.attribute(attribute);
                }
                input
            }
        })
    }
}

/// Original file name when known, else the scratch file's.
fn upload_name(upload: &Upload) -> String {
    upload
        .attributes
        .iter()
        .find_map(|a| match a {
            relay_core::domain::DocumentAttribute::Filename(n) => Some(n.clone()),
            _ => None,
        })
        .or_else(|| {
            upload
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| file_stem_fallback(&upload.path))
}

fn file_stem_fallback(path: &Path) -> String {
    match path.extension() {
        Some(ext) => format!("file.{}", ext.to_string_lossy()),
        None => "file".to_string(),
    }
}

fn map_err(e: InvocationError) -> Error {
    match &e {
        InvocationError::Rpc(rpc) => rpc_error(&rpc.name, &e.to_string()),
        _ => Error::External(format!("mtproto error: {e}")),
    }
}

fn rpc_error(name: &str, text: &str) -> Error {
    if name == "CHAT_FORWARDS_RESTRICTED" {
        return Error::Restricted(text.to_string());
    }
    restriction::classify(format!("mtproto error: {text}"))
}

#[async_trait]
impl ChatClient for MtprotoClient {
    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            supports_history: true,
            max_download_bytes: None,
        }
    }

    async fn fetch_history(&self, chat: &ChatRef, query: HistoryQuery) -> Result<Vec<CoreMessage>> {
        let packed = self.resolve(chat).await?;
        let Some(newest) = self.newest_id(&packed).await? else {
            return Ok(Vec::new());
        };

        let mut after = query.after.0;
        let mut page = Vec::new();
        let mut media = HashMap::new();
        while let Some(ids) = convert::id_window(after, query.limit, newest) {
            let found = self
                .client
                .get_messages_by_id(packed.clone(), &ids)
                .await
                .map_err(map_err)?;
            for raw in found.into_iter().flatten() {
                let (message, raw_media) = convert::message_from_tg(&raw);
                if let (Some(m), Some(raw_media)) = (&message.media, raw_media) {
                    media.insert(m.remote_file().id.clone(), raw_media);
                }
                page.push(message);
            }
            if !page.is_empty() {
                break;
            }
            // A fully deleted id range; keep going towards the newest message.
            debug!(%chat, from = ids[0], to = after + ids.len() as i32, "empty id window");
            after += ids.len() as i32;
        }

        page.sort_by_key(|m| m.id);
        *self.media.lock().await = media;
        info!(%chat, after = %query.after, fetched = page.len(), newest, "fetched history page");
        Ok(page)
    }

    async fn forward(
        &self,
        target: &ChatRef,
        source: &ChatRef,
        ids: &[MessageId],
        drop_author: bool,
    ) -> Result<()> {
        let to = self.resolve(target).await?;
        let from = self.resolve(source).await?;
        let ids: Vec<i32> = ids.iter().map(|id| id.0).collect();

        if drop_author {
            return self.copy_messages(&to, &from, &ids).await;
        }

        let sent = self
            .client
            .forward_messages(to, &ids, from)
            .await
            .map_err(map_err)?;
        if sent.iter().all(Option::is_none) {
            return Err(Error::External("nothing was forwarded".to_string()));
        }
        Ok(())
    }

    async fn send(&self, target: &ChatRef, msg: OutgoingMessage) -> Result<MessageRef> {
        let to = self.resolve(target).await?;
        let caption =
            InputMessage::text(&msg.text).fmt_entities(convert::entities_to_tl(&msg.entities));

        let input = match &msg.attachment {
            None => {
                if msg.text.trim().is_empty() {
                    return Err(Error::Unsupported("nothing to send".to_string()));
                }
                caption
            }
            Some(Attachment::Remote(media)) => {
                let raw = self.cached_media(media.remote_file()).await?;
                caption.copy_media(&raw)
            }
            Some(Attachment::Local(upload)) => self.upload(upload, caption).await?,
        };

        let sent = self
            .client
            .send_message(to.clone(), input)
            .await
            .map_err(map_err)?;
        Ok(MessageRef {
            chat_id: ChatId(convert::marked_id(&to)),
            message_id: MessageId(sent.id()),
        })
    }

    async fn download(&self, media: &Media, progress: &ProgressFn) -> Result<Vec<u8>> {
        let raw = self.cached_media(media.remote_file()).await?;
        let total = media.remote_file().size.unwrap_or(0);

        let mut buf = Vec::with_capacity(total as usize);
        let mut chunks = self.client.iter_download(&Downloadable::Media(raw));
        while let Some(chunk) = chunks.next().await.map_err(map_err)? {
            buf.extend_from_slice(&chunk);
            let done = buf.len() as u64;
            progress(done, total.max(done));
        }
        Ok(buf)
    }
}
