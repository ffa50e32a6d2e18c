//! In-memory `ChatClient` used by the pipeline tests.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{
        ChatId, ChatInfo, ChatRef, Document, DocumentAttribute, Media, Message, MessageId,
        MessageRef, Photo, RemoteFile,
    },
    errors::Error,
    ports::{Attachment, ChatClient, ClientCapabilities, HistoryQuery, OutgoingMessage, ProgressFn},
    Result,
};

pub const SOURCE: i64 = -1001000;
pub const TARGET: i64 = -1002000;

pub fn source() -> ChatRef {
    ChatRef::Id(ChatId(SOURCE))
}

pub fn target() -> ChatRef {
    ChatRef::Id(ChatId(TARGET))
}

pub fn remote_file(name: &str) -> RemoteFile {
    RemoteFile {
        id: format!("file-{name}"),
        size: Some(1024),
    }
}

pub fn text_message(id: i32) -> Message {
    Message {
        id: MessageId(id),
        chat: ChatInfo {
            id: ChatId(SOURCE),
            username: Some("source_channel".to_string()),
        },
        text: Some(format!("message {id}")),
        entities: vec![],
        media: None,
        protected: false,
        forwarded: false,
        service: false,
    }
}

pub fn photo_message(id: i32) -> Message {
    Message {
        media: Some(Media::Photo(Photo {
            file: remote_file(&id.to_string()),
            width: 800,
            height: 600,
        })),
        ..text_message(id)
    }
}

pub fn media_message(id: i32, mime: &str) -> Message {
    Message {
        media: Some(Media::Document(Document {
            file: remote_file(&id.to_string()),
            mime_type: Some(mime.to_string()),
            attributes: vec![DocumentAttribute::Filename(format!("file{id}.bin"))],
        })),
        ..text_message(id)
    }
}

pub fn service_message(id: i32) -> Message {
    Message {
        text: None,
        service: true,
        ..text_message(id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    Ok,
    Restricted,
    Fail,
}

impl Behavior {
    fn apply(self) -> Result<()> {
        match self {
            Behavior::Ok => Ok(()),
            Behavior::Restricted => Err(Error::Restricted("CHAT_FORWARDS_RESTRICTED".to_string())),
            Behavior::Fail => Err(Error::External("connection reset".to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Forward(MessageId),
    SendText(String),
    SendRemote(String),
    SendLocal {
        path: PathBuf,
        existed: bool,
        force_document: bool,
    },
}

struct Behaviors {
    forward: Behavior,
    copy: Behavior,
    upload: Behavior,
}

/// What the client could observe when asked to forward a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardSnapshot {
    pub id: MessageId,
    /// Contents of the watched offset file, 0 when missing.
    pub offset_on_disk: i32,
    /// Entries in the watched scratch directory.
    pub scratch_files: usize,
    /// Downloads that had returned.
    pub downloads_done: usize,
}

pub struct FakeClient {
    history: Vec<Message>,
    supports_history: bool,
    behaviors: Mutex<Behaviors>,
    calls: Mutex<Vec<Call>>,
    fetches: Mutex<Vec<MessageId>>,
    downloads: AtomicUsize,
    downloads_done: AtomicUsize,
    downloads_in_flight: AtomicUsize,
    peak_downloads: AtomicUsize,
    fail_downloads: AtomicBool,
    download_delay: Mutex<Duration>,
    next_id: AtomicUsize,
    offset_file: Mutex<Option<PathBuf>>,
    scratch_dir: Mutex<Option<PathBuf>>,
    snapshots: Mutex<Vec<ForwardSnapshot>>,
}

impl FakeClient {
    pub fn new(history: Vec<Message>) -> Self {
        Self {
            history,
            supports_history: true,
            behaviors: Mutex::new(Behaviors {
                forward: Behavior::Ok,
                copy: Behavior::Ok,
                upload: Behavior::Ok,
            }),
            calls: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
            downloads: AtomicUsize::new(0),
            downloads_done: AtomicUsize::new(0),
            downloads_in_flight: AtomicUsize::new(0),
            peak_downloads: AtomicUsize::new(0),
            fail_downloads: AtomicBool::new(false),
            download_delay: Mutex::new(Duration::from_millis(0)),
            next_id: AtomicUsize::new(1),
            offset_file: Mutex::new(None),
            scratch_dir: Mutex::new(None),
            snapshots: Mutex::new(Vec::new()),
        }
    }

    /// Read this offset file into every `ForwardSnapshot`.
    pub fn watch_offsets(&self, path: impl Into<PathBuf>) {
        *self.offset_file.lock().unwrap() = Some(path.into());
    }

    /// Count this directory's files into every `ForwardSnapshot`.
    pub fn watch_scratch(&self, dir: impl Into<PathBuf>) {
        *self.scratch_dir.lock().unwrap() = Some(dir.into());
    }

    /// One entry per `forward` call, in call order.
    pub fn snapshots(&self) -> Vec<ForwardSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn without_history(mut self) -> Self {
        self.supports_history = false;
        self
    }

    pub fn set_forward(&self, b: Behavior) {
        self.behaviors.lock().unwrap().forward = b;
    }

    pub fn set_copy(&self, b: Behavior) {
        self.behaviors.lock().unwrap().copy = b;
    }

    pub fn set_upload(&self, b: Behavior) {
        self.behaviors.lock().unwrap().upload = b;
    }

    pub fn fail_downloads(&self) {
        self.fail_downloads.store(true, Ordering::SeqCst);
    }

    pub fn set_download_delay(&self, d: Duration) {
        *self.download_delay.lock().unwrap() = d;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<MessageId> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn peak_concurrent_downloads(&self) -> usize {
        self.peak_downloads.load(Ordering::SeqCst)
    }

    fn snapshot(&self, id: MessageId) -> ForwardSnapshot {
        let offset_on_disk = self
            .offset_file
            .lock()
            .unwrap()
            .as_deref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| s.trim().parse::<i32>().ok())
            .unwrap_or(0);
        let scratch_files = self
            .scratch_dir
            .lock()
            .unwrap()
            .as_deref()
            .map(count_files)
            .unwrap_or(0);
        ForwardSnapshot {
            id,
            offset_on_disk,
            scratch_files,
            downloads_done: self.downloads_done.load(Ordering::SeqCst),
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn sent(&self, target: &ChatRef) -> MessageRef {
        let chat_id = match target {
            ChatRef::Id(id) => *id,
            ChatRef::Username(_) => ChatId(TARGET),
        };
        MessageRef {
            chat_id,
            message_id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) as i32),
        }
    }
}

#[async_trait]
impl ChatClient for FakeClient {
    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            supports_history: self.supports_history,
            max_download_bytes: None,
        }
    }

    async fn fetch_history(&self, _chat: &ChatRef, query: HistoryQuery) -> Result<Vec<Message>> {
        self.fetches.lock().unwrap().push(query.after);
        let mut page: Vec<Message> = self
            .history
            .iter()
            .filter(|m| m.id > query.after)
            .cloned()
            .collect();
        page.sort_by_key(|m| m.id);
        page.truncate(query.limit);
        Ok(page)
    }

    async fn forward(
        &self,
        _target: &ChatRef,
        _source: &ChatRef,
        ids: &[MessageId],
        _drop_author: bool,
    ) -> Result<()> {
        let id = ids.first().copied().unwrap_or_default();
        self.record(Call::Forward(id));
        let snapshot = self.snapshot(id);
        self.snapshots.lock().unwrap().push(snapshot);
        let b = self.behaviors.lock().unwrap().forward;
        b.apply()
    }

    async fn send(&self, target: &ChatRef, msg: OutgoingMessage) -> Result<MessageRef> {
        let b = match &msg.attachment {
            None => {
                self.record(Call::SendText(msg.text.clone()));
                self.behaviors.lock().unwrap().copy
            }
            Some(Attachment::Remote(media)) => {
                self.record(Call::SendRemote(media.remote_file().id.clone()));
                self.behaviors.lock().unwrap().copy
            }
            Some(Attachment::Local(upload)) => {
                self.record(Call::SendLocal {
                    path: upload.path.clone(),
                    existed: upload.path.exists(),
                    force_document: upload.force_document,
                });
                self.behaviors.lock().unwrap().upload
            }
        };
        b.apply()?;
        Ok(self.sent(target))
    }

    async fn download(&self, media: &Media, progress: &ProgressFn) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let now = self.downloads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_downloads.fetch_max(now, Ordering::SeqCst);

        let delay = *self.download_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.downloads_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.downloads_done.fetch_add(1, Ordering::SeqCst);

        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(Error::External("download interrupted".to_string()));
        }

        let name = media
            .remote_file()
            .id
            .strip_prefix("file-")
            .unwrap_or("x")
            .to_string();
        let bytes = format!("bytes-{name}").into_bytes();
        progress(bytes.len() as u64 / 2, bytes.len() as u64);
        progress(bytes.len() as u64, bytes.len() as u64);
        Ok(bytes)
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
