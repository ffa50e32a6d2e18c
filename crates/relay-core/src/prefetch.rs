use std::{collections::HashMap, sync::Arc};

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::{
    domain::{Message, MessageId},
    media::{MediaArtifact, MediaFetcher},
};

/// Registry of background downloads running ahead of the processing cursor.
///
/// Every entry is consumed exactly once: by `take` when its message becomes
/// current, or by `discard` when a zero-copy strategy made the download
/// unnecessary. There is no abort; a superseded download is awaited and its
/// file deleted. If the window is dropped with entries left, the detached
/// tasks still drop (and so delete) their artifacts when they finish.
pub struct PrefetchWindow {
    fetcher: Arc<MediaFetcher>,
    inflight: HashMap<MessageId, JoinHandle<Option<MediaArtifact>>>,
    started: usize,
}

impl PrefetchWindow {
    pub fn new(fetcher: Arc<MediaFetcher>) -> Self {
        Self {
            fetcher,
            inflight: HashMap::new(),
            started: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.inflight.contains_key(&id)
    }

    /// Number of downloads started over the window's lifetime.
    pub fn started(&self) -> usize {
        self.started
    }

    /// Start a background download for `message` unless one is already registered.
    ///
    /// Returns `true` when a new task was spawned. Messages without media are ignored.
    pub fn ensure(&mut self, message: &Message) -> bool {
        if !message.has_media() || self.inflight.contains_key(&message.id) {
            return false;
        }

        info!(message_id = %message.id, "starting background download");
        let fetcher = Arc::clone(&self.fetcher);
        let msg = message.clone();
        let handle = tokio::spawn(async move { fetcher.fetch(&msg).await });

        self.inflight.insert(message.id, handle);
        self.started += 1;
        true
    }

    /// Ensure downloads for the current message and the `window_size` after it.
    pub fn fill<'a>(&mut self, upcoming: impl IntoIterator<Item = &'a Message>, window_size: usize) {
        for message in upcoming.into_iter().take(window_size + 1) {
            self.ensure(message);
        }
    }

    /// Wait for the registered download of `id`, unregister it, and hand over its file.
    pub async fn take(&mut self, id: MessageId) -> Option<MediaArtifact> {
        let handle = self.inflight.remove(&id)?;
        match handle.await {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(message_id = %id, error = %e, "background download task failed");
                None
            }
        }
    }

    /// Consume the entry for `id` and delete whatever it produced.
    pub async fn discard(&mut self, id: MessageId) -> bool {
        let Some(artifact) = self.take(id).await else {
            return false;
        };
        artifact.delete();
        info!(message_id = %id, "discarded unused download");
        true
    }

    /// Discard every remaining entry.
    pub async fn drain(&mut self) {
        let mut ids: Vec<MessageId> = self.inflight.keys().copied().collect();
        ids.sort();
        for id in ids {
            self.discard(id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{photo_message, text_message, FakeClient};

    fn window(client: Arc<FakeClient>, dir: &std::path::Path) -> PrefetchWindow {
        PrefetchWindow::new(Arc::new(MediaFetcher::new(client, dir)))
    }

    #[tokio::test]
    async fn ensure_is_idempotent_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeClient::new(vec![]));
        let mut w = window(client.clone(), dir.path());

        let msg = photo_message(5);
        assert!(w.ensure(&msg));
        assert!(!w.ensure(&msg));
        assert!(!w.ensure(&msg));
        assert_eq!(w.len(), 1);

        let artifact = w.take(msg.id).await.unwrap();
        assert!(artifact.path().exists());
        assert_eq!(client.download_count(), 1);
        assert!(w.is_empty());
        assert!(w.take(msg.id).await.is_none());
    }

    #[tokio::test]
    async fn text_messages_are_never_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeClient::new(vec![]));
        let mut w = window(client.clone(), dir.path());

        assert!(!w.ensure(&text_message(1)));
        assert!(w.is_empty());
        assert_eq!(w.started(), 0);
    }

    #[tokio::test]
    async fn discard_awaits_and_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeClient::new(vec![]));
        client.set_download_delay(Duration::from_millis(30));
        let mut w = window(client.clone(), dir.path());

        let msg = photo_message(9);
        w.ensure(&msg);
        assert!(w.discard(msg.id).await);
        assert!(!w.contains(msg.id));
        assert_eq!(client.download_count(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn fill_covers_current_plus_window() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeClient::new(vec![]));
        client.set_download_delay(Duration::from_millis(50));
        let mut w = window(client.clone(), dir.path());

        let msgs: Vec<_> = (1..=10).map(photo_message).collect();
        w.fill(&msgs[2..], 3);
        assert_eq!(w.len(), 4);
        for id in 3..=6 {
            assert!(w.contains(MessageId(id)));
        }
        assert!(!w.contains(MessageId(7)));

        w.drain().await;
        assert!(w.is_empty());
        assert!(client.peak_concurrent_downloads() > 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
