use std::{fmt, path::Path, sync::Arc};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    domain::{ChatRef, Media, Message},
    errors::Error,
    media::MediaFetcher,
    ports::{Attachment, ChatClient, OutgoingMessage, Upload, UploadKind},
    prefetch::PrefetchWindow,
};

/// Transfer strategies in the order they are attempted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    NativeForward,
    ZeroCopy,
    Reupload,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::NativeForward => "native-forward",
            Strategy::ZeroCopy => "zero-copy",
            Strategy::Reupload => "reupload",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferOutcome {
    Forwarded,
    Copied,
    Reuploaded,
    Failed,
}

impl TransferOutcome {
    pub fn is_success(self) -> bool {
        !matches!(self, TransferOutcome::Failed)
    }

    pub fn describe(self) -> &'static str {
        match self {
            TransferOutcome::Forwarded => "forwarded",
            TransferOutcome::Copied => "forwarded via copy",
            TransferOutcome::Reuploaded => "forwarded via download/upload",
            TransferOutcome::Failed => "failed",
        }
    }
}

/// Tries native forward, then zero-copy send, then download + re-upload.
///
/// No strategy error aborts a message early; only after the last applicable
/// strategy failed is the message reported as `Failed`.
pub struct StrategySelector {
    client: Arc<dyn ChatClient>,
    fetcher: Arc<MediaFetcher>,
    drop_author: bool,
}

impl StrategySelector {
    pub fn new(client: Arc<dyn ChatClient>, fetcher: Arc<MediaFetcher>, drop_author: bool) -> Self {
        Self {
            client,
            fetcher,
            drop_author,
        }
    }

    pub fn fetcher(&self) -> &Arc<MediaFetcher> {
        &self.fetcher
    }

    /// Relay one message. `window` holds prefetched downloads (history mode only).
    pub async fn attempt(
        &self,
        message: &Message,
        source: &ChatRef,
        target: &ChatRef,
        mut window: Option<&mut PrefetchWindow>,
    ) -> TransferOutcome {
        info!(message_id = %message.id, "processing message");

        match self
            .client
            .forward(target, source, &[message.id], self.drop_author)
            .await
        {
            Ok(()) => {
                release_prefetch(message, window).await;
                info!(message_id = %message.id, "forwarded natively");
                return TransferOutcome::Forwarded;
            }
            Err(e) => report_failure(message, Strategy::NativeForward, &e),
        }

        if message.has_text() || message.has_media() {
            let attachment = message.media.clone().map(Attachment::Remote);
            let out = OutgoingMessage::from_message(message, attachment);
            match self.client.send(target, out).await {
                Ok(_) => {
                    release_prefetch(message, window).await;
                    info!(message_id = %message.id, "forwarded via zero-copy");
                    return TransferOutcome::Copied;
                }
                Err(e) => report_failure(message, Strategy::ZeroCopy, &e),
            }
        }

        let Some(media) = message.media.as_ref() else {
            warn!(message_id = %message.id, "no strategy left for message without media");
            return TransferOutcome::Failed;
        };

        let prefetched = match window.as_deref_mut() {
            Some(w) if w.contains(message.id) => Some(w.take(message.id).await),
            _ => None,
        };
        let artifact = match prefetched {
            Some(result) => result,
            None => {
                info!(message_id = %message.id, "downloading media (synchronous fallback)");
                self.fetcher.fetch(message).await
            }
        };
        let Some(artifact) = artifact else {
            error!(message_id = %message.id, "failed to download media");
            return TransferOutcome::Failed;
        };

        let upload = upload_for(media, artifact.path());
        let out = OutgoingMessage::from_message(message, Some(Attachment::Local(upload)));
        let result = self.client.send(target, out).await;
        artifact.delete();

        match result {
            Ok(sent) => {
                info!(
                    message_id = %message.id,
                    sent_id = %sent.message_id,
                    "forwarded via download/upload"
                );
                TransferOutcome::Reuploaded
            }
            Err(e) => {
                report_failure(message, Strategy::Reupload, &e);
                warn!(message_id = %message.id, "all strategies failed");
                TransferOutcome::Failed
            }
        }
    }
}

/// A zero-copy strategy made the prefetched download unnecessary.
async fn release_prefetch(message: &Message, window: Option<&mut PrefetchWindow>) {
    if let Some(w) = window {
        w.discard(message.id).await;
    }
}

fn report_failure(message: &Message, strategy: Strategy, err: &Error) {
    if err.is_restricted() {
        debug!(message_id = %message.id, %strategy, error = %err, "restricted, falling back");
        return;
    }
    error!(message_id = %message.id, %strategy, error = %err, "strategy failed");
}

/// Upload request carrying over the original media's presentation and attributes.
pub fn upload_for(media: &Media, path: &Path) -> Upload {
    match media {
        Media::Photo(_) => Upload {
            path: path.to_path_buf(),
            kind: UploadKind::Photo,
            mime_type: Some("image/jpeg".to_string()),
            attributes: vec![],
            force_document: false,
        },
        Media::Document(doc) => Upload {
            path: path.to_path_buf(),
            kind: UploadKind::Document,
            mime_type: doc.mime_type.clone(),
            attributes: doc.attributes.clone(),
            force_document: !doc.has_native_presentation(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tracing_subscriber::prelude::*;

    use super::*;
    use crate::domain::MessageId;
    use crate::testing::{
        media_message, photo_message, source, target, text_message, Behavior, Call, FakeClient,
    };

    struct Fixture {
        client: Arc<FakeClient>,
        selector: StrategySelector,
        dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeClient::new(vec![]));
        let fetcher = Arc::new(MediaFetcher::new(client.clone(), dir.path()));
        let selector = StrategySelector::new(client.clone(), fetcher, false);
        Fixture {
            client,
            selector,
            dir,
        }
    }

    struct ErrorCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for ErrorCounter {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn native_forward_success_stops_the_chain() {
        let f = fixture();
        let outcome = f
            .selector
            .attempt(&photo_message(1), &source(), &target(), None)
            .await;

        assert_eq!(outcome, TransferOutcome::Forwarded);
        assert_eq!(f.client.calls(), vec![Call::Forward(MessageId(1))]);
        assert_eq!(f.client.download_count(), 0);
    }

    #[tokio::test]
    async fn zero_copy_runs_after_restricted_forward() {
        let f = fixture();
        f.client.set_forward(Behavior::Restricted);

        let outcome = f
            .selector
            .attempt(&photo_message(2), &source(), &target(), None)
            .await;

        assert_eq!(outcome, TransferOutcome::Copied);
        assert_eq!(
            f.client.calls(),
            vec![
                Call::Forward(MessageId(2)),
                Call::SendRemote("file-2".to_string())
            ]
        );
        assert_eq!(f.client.download_count(), 0);
    }

    #[tokio::test]
    async fn restricted_media_falls_back_to_reupload_and_cleans_up() {
        let f = fixture();
        f.client.set_forward(Behavior::Restricted);
        f.client.set_copy(Behavior::Restricted);

        let outcome = f
            .selector
            .attempt(&media_message(3, "application/pdf"), &source(), &target(), None)
            .await;

        assert_eq!(outcome, TransferOutcome::Reuploaded);
        let calls = f.client.calls();
        assert_eq!(calls.len(), 3);
        match &calls[2] {
            Call::SendLocal {
                existed,
                force_document,
                ..
            } => {
                assert!(*existed, "artifact must exist while uploading");
                assert!(*force_document, "pdf is sent as a generic document");
            }
            other => panic!("expected a local upload, got {other:?}"),
        }
        assert_eq!(std::fs::read_dir(f.dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn video_keeps_native_presentation() {
        let f = fixture();
        f.client.set_forward(Behavior::Restricted);
        f.client.set_copy(Behavior::Restricted);

        f.selector
            .attempt(&media_message(4, "video/mp4"), &source(), &target(), None)
            .await;

        assert!(f.client.calls().iter().any(|c| matches!(
            c,
            Call::SendLocal {
                force_document: false,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn upload_failure_still_deletes_artifact() {
        let f = fixture();
        f.client.set_forward(Behavior::Restricted);
        f.client.set_copy(Behavior::Restricted);
        f.client.set_upload(Behavior::Fail);

        let outcome = f
            .selector
            .attempt(&photo_message(5), &source(), &target(), None)
            .await;

        assert_eq!(outcome, TransferOutcome::Failed);
        assert_eq!(f.client.download_count(), 1);
        assert_eq!(std::fs::read_dir(f.dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn text_without_media_fails_after_two_strategies() {
        let f = fixture();
        f.client.set_forward(Behavior::Fail);
        f.client.set_copy(Behavior::Fail);

        let outcome = f
            .selector
            .attempt(&text_message(6), &source(), &target(), None)
            .await;

        assert_eq!(outcome, TransferOutcome::Failed);
        assert_eq!(f.client.calls().len(), 2);
        assert_eq!(f.client.download_count(), 0);
    }

    #[tokio::test]
    async fn prefetched_artifact_is_used_instead_of_downloading_again() {
        let f = fixture();
        f.client.set_forward(Behavior::Restricted);
        f.client.set_copy(Behavior::Restricted);

        let msg = photo_message(8);
        let mut window = PrefetchWindow::new(f.selector.fetcher().clone());
        window.ensure(&msg);

        let outcome = f
            .selector
            .attempt(&msg, &source(), &target(), Some(&mut window))
            .await;

        assert_eq!(outcome, TransferOutcome::Reuploaded);
        assert_eq!(f.client.download_count(), 1);
        assert!(window.is_empty());
    }

    #[tokio::test]
    async fn failed_prefetch_is_not_retried_synchronously() {
        let f = fixture();
        f.client.set_forward(Behavior::Restricted);
        f.client.set_copy(Behavior::Restricted);
        f.client.fail_downloads();

        let msg = photo_message(10);
        let mut window = PrefetchWindow::new(f.selector.fetcher().clone());
        window.ensure(&msg);

        let outcome = f
            .selector
            .attempt(&msg, &source(), &target(), Some(&mut window))
            .await;

        assert_eq!(outcome, TransferOutcome::Failed);
        assert_eq!(f.client.download_count(), 1);
    }

    #[tokio::test]
    async fn only_unexpected_failures_log_errors() {
        let errors = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorCounter(errors.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let f = fixture();
        f.client.set_forward(Behavior::Restricted);
        f.client.set_copy(Behavior::Restricted);
        let outcome = f
            .selector
            .attempt(&photo_message(11), &source(), &target(), None)
            .await;
        assert_eq!(outcome, TransferOutcome::Reuploaded);
        assert_eq!(errors.load(Ordering::SeqCst), 0);

        f.client.set_forward(Behavior::Fail);
        f.selector
            .attempt(&photo_message(12), &source(), &target(), None)
            .await;
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
