use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::{domain::MessageId, Result};

/// Persists the id of the last fully processed message so a run can resume.
///
/// The file holds one decimal number and is replaced wholesale on every save.
#[derive(Clone, Debug)]
pub struct OffsetStore {
    path: PathBuf,
}

impl OffsetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last saved offset, or 0 when nothing was saved (or the file is unreadable).
    pub fn load(&self) -> MessageId {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return MessageId(0);
        };
        match raw.trim().parse::<i32>() {
            Ok(id) if id >= 0 => MessageId(id),
            _ => {
                warn!(path = %self.path.display(), "ignoring unparsable offset file");
                MessageId(0)
            }
        }
    }

    /// Overwrite the stored offset. Written to a sibling file then renamed into place.
    pub fn save(&self, id: MessageId) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, id.0.to_string())?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
