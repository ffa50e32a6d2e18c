use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use tracing::{debug, error, info, warn};

use crate::{
    domain::{Media, Message},
    ports::ChatClient,
};

static ARTIFACT_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// A downloaded media file in the scratch directory.
///
/// The file is removed by `delete()` or, failing that, when the value is dropped,
/// so no code path can leave it behind.
#[derive(Debug)]
pub struct MediaArtifact {
    path: Option<PathBuf>,
}

impl MediaArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    pub fn delete(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "deleted temporary file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to delete temporary file"),
        }
    }
}

impl Drop for MediaArtifact {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Downloads message media into the scratch directory.
pub struct MediaFetcher {
    client: Arc<dyn ChatClient>,
    dir: PathBuf,
}

impl MediaFetcher {
    pub fn new(client: Arc<dyn ChatClient>, dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dir: dir.into(),
        }
    }

    /// Download `message`'s media. Failures are logged and reported as `None`.
    pub async fn fetch(&self, message: &Message) -> Option<MediaArtifact> {
        let Some(media) = message.media.as_ref() else {
            warn!(message_id = %message.id, "message has no media to download");
            return None;
        };

        let limit = self.client.capabilities().max_download_bytes;
        if let (Some(limit), Some(size)) = (limit, media.remote_file().size) {
            if size > limit {
                error!(
                    message_id = %message.id,
                    size,
                    limit,
                    "media exceeds the client's download limit"
                );
                return None;
            }
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            error!(dir = %self.dir.display(), error = %e, "cannot create downloads directory");
            return None;
        }

        info!(message_id = %message.id, kind = media.kind_label(), "downloading media");

        let message_id = message.id.0;
        let last_decile = AtomicU64::new(0);
        let progress = move |done: u64, total: u64| {
            if total == 0 {
                return;
            }
            let decile = done.saturating_mul(10) / total;
            if decile > last_decile.swap(decile, Ordering::Relaxed) {
                debug!(message_id, done, total, "download progress {}%", decile * 10);
            }
        };

        let bytes = match self.client.download(media, &progress).await {
            Ok(b) if !b.is_empty() => b,
            Ok(_) => {
                error!(message_id = %message.id, "media download returned no data");
                return None;
            }
            Err(e) => {
                error!(message_id = %message.id, error = %e, "media download failed");
                return None;
            }
        };

        let artifact = MediaArtifact::new(self.dir.join(artifact_file_name(media)));
        if let Err(e) = tokio::fs::write(artifact.path(), &bytes).await {
            error!(
                message_id = %message.id,
                path = %artifact.path().display(),
                error = %e,
                "failed to write downloaded media"
            );
            return None;
        }

        info!(
            message_id = %message.id,
            path = %artifact.path().display(),
            bytes = bytes.len(),
            "media saved"
        );
        Some(artifact)
    }
}

/// Collision-free scratch file name: `media_<millis>_<counter><ext>`.
pub fn artifact_file_name(media: &Media) -> String {
    let ts = chrono::Utc::now().timestamp_millis();
    let n = ARTIFACT_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("media_{ts}_{n}{}", extension_for(media))
}

pub fn extension_for(media: &Media) -> String {
    let doc = match media {
        Media::Photo(_) => return ".jpg".to_string(),
        Media::Document(doc) => doc,
    };

    let by_mime = match doc.mime_type.as_deref() {
        Some("video/mp4") => Some(".mp4"),
        Some("image/jpeg") => Some(".jpg"),
        Some("image/png") => Some(".png"),
        Some("audio/ogg") => Some(".ogg"),
        Some("audio/mpeg") => Some(".mp3"),
        _ => None,
    };
    if let Some(ext) = by_mime {
        return ext.to_string();
    }

    doc.file_name()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_else(|| ".dat".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Document, DocumentAttribute};
    use crate::testing::{media_message, photo_message, FakeClient};

    fn doc(mime: Option<&str>, name: Option<&str>) -> Media {
        Media::Document(Document {
            file: crate::testing::remote_file("d"),
            mime_type: mime.map(|s| s.to_string()),
            attributes: name
                .map(|n| vec![DocumentAttribute::Filename(n.to_string())])
                .unwrap_or_default(),
        })
    }

    #[test]
    fn extension_prefers_mime_then_file_name() {
        assert_eq!(extension_for(&doc(Some("video/mp4"), Some("x.mkv"))), ".mp4");
        assert_eq!(extension_for(&doc(Some("application/pdf"), Some("Report.PDF"))), ".pdf");
        assert_eq!(extension_for(&doc(Some("application/zip"), None)), ".dat");
        assert_eq!(extension_for(&doc(None, Some("weird.ext!"))), ".dat");
    }

    #[test]
    fn file_names_are_unique() {
        let m = doc(Some("image/png"), None);
        let a = artifact_file_name(&m);
        let b = artifact_file_name(&m);
        assert_ne!(a, b);
        assert!(a.starts_with("media_") && a.ends_with(".png"));
    }

    #[test]
    fn dropping_an_artifact_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"x").unwrap();

        let artifact = MediaArtifact::new(&path);
        drop(artifact);
        assert!(!path.exists());

        std::fs::write(&path, b"y").unwrap();
        MediaArtifact::new(&path).delete();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn fetch_writes_bytes_into_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeClient::new(vec![]));
        let fetcher = MediaFetcher::new(client.clone(), dir.path().join("downloads"));

        let artifact = fetcher.fetch(&photo_message(7)).await.unwrap();
        assert!(artifact.path().starts_with(dir.path().join("downloads")));
        assert_eq!(std::fs::read(artifact.path()).unwrap(), b"bytes-7".to_vec());
        assert_eq!(client.download_count(), 1);

        let path = artifact.path().to_path_buf();
        artifact.delete();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn fetch_reports_failures_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeClient::new(vec![]));
        client.fail_downloads();
        let fetcher = MediaFetcher::new(client.clone(), dir.path());

        assert!(fetcher.fetch(&media_message(3, "video/mp4")).await.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
