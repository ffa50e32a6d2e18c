use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    domain::{ChatRef, Message},
    errors::Error,
    strategy::TransferOutcome,
    Result,
};

const AUDIT_MAX_TEXT: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    History,
    Live,
    Manual,
}

/// One relayed (or abandoned) message.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub mode: RunMode,
    pub message_id: i32,
    pub source: String,
    pub target: String,
    pub outcome: TransferOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl AuditEvent {
    pub fn transfer(
        mode: RunMode,
        message: &Message,
        source: &ChatRef,
        target: &ChatRef,
        outcome: TransferOutcome,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            mode,
            message_id: message.id.0,
            source: source.to_string(),
            target: target.to_string(),
            outcome,
            media: message.media.as_ref().map(|m| m.kind_label()),
            text: message.text.clone().filter(|t| !t.trim().is_empty()),
        }
    }
}

/// Append-only record of transfer outcomes, JSON lines or plain text blocks.
#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        if let Some(s) = &event.text {
            event.text = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            match v {
                serde_json::Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}
