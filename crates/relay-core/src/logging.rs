use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize logging for the relay.
///
/// `RUST_LOG` wins when set; otherwise `level` applies to the relay crates and
/// everything else stays at `warn`.
pub fn init(service_name: &str, level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let service = service_name.replace('-', "_");
        EnvFilter::new(format!(
            "warn,relay={level},relay_core={level},relay_telegram={level},{service}={level}"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::Config(format!("logging init failed: {e}")))
}
