/// Core error type for the relay.
///
/// Adapter crates map their client errors into this type so the pipeline can
/// tell an expected forwarding restriction apart from everything else.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The platform refused to transfer the content by reference.
    #[error("forwarding restricted: {0}")]
    Restricted(String),

    #[error("unsupported by client: {0}")]
    Unsupported(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn is_restricted(&self) -> bool {
        matches!(self, Error::Restricted(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
