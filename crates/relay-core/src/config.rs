use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::{domain::ChatRef, errors::Error, Result};

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram bot (live mode)
    pub telegram_bot_token: Option<String>,
    /// User ids allowed to issue commands.
    pub operators: Vec<i64>,

    // Telegram user account (history and chats modes)
    pub api_id: Option<i32>,
    pub api_hash: Option<String>,
    pub phone_number: Option<String>,
    /// Base64 session exported by a previous login; wins over `session_file`.
    pub session_string: Option<String>,
    pub session_file: PathBuf,

    // Relay endpoints
    pub source_chat: Option<ChatRef>,
    pub target_chat: Option<ChatRef>,

    // Pipeline
    pub window_size: usize,
    pub page_size: usize,
    pub media_only: bool,
    pub drop_author: bool,

    // Files
    pub offset_file: PathBuf,
    pub downloads_dir: PathBuf,

    // Logging / audit
    pub log_level: String,
    pub audit_log_path: Option<PathBuf>,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").and_then(non_empty);
        let operators = parse_csv_i64(env_str("TELEGRAM_ALLOWED_USERS"));

        let api_id = match env_str("API_ID").and_then(non_empty) {
            Some(v) => Some(
                v.trim()
                    .parse::<i32>()
                    .map_err(|_| Error::Config(format!("API_ID must be a number, got '{v}'")))?,
            ),
            None => None,
        };
        let api_hash = env_str("API_HASH").and_then(non_empty);
        let phone_number = env_str("PHONE_NUMBER").and_then(non_empty);
        let session_string = env_str("SESSION_STRING").and_then(non_empty);
        let session_file =
            env_path("SESSION_FILE").unwrap_or_else(|| PathBuf::from("relay.session"));

        let source_chat = parse_chat(env_str("SOURCE_CHAT_ID"), "SOURCE_CHAT_ID")?;
        let target_chat = parse_chat(env_str("TARGET_CHAT_ID"), "TARGET_CHAT_ID")?;

        let window_size = env_usize("CONCURRENT_DOWNLOADS").unwrap_or(5);
        // Telegram serves at most 100 messages per history page.
        let page_size = env_usize("HISTORY_PAGE_SIZE").unwrap_or(20).clamp(1, 100);
        let media_only = env_bool("MEDIA_ONLY").unwrap_or(true);
        let drop_author = env_bool("DROP_AUTHOR").unwrap_or(false);

        let offset_file = env_path("OFFSET_FILE").unwrap_or_else(|| PathBuf::from("offset.txt"));
        let downloads_dir =
            env_path("DOWNLOADS_DIR").unwrap_or_else(|| PathBuf::from("downloads"));

        let log_level = env_str("LOG_LEVEL")
            .and_then(non_empty)
            .unwrap_or_else(|| "info".to_string());
        let audit_log_path = env_path("AUDIT_LOG_PATH");
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            operators,
            api_id,
            api_hash,
            phone_number,
            session_string,
            session_file,
            source_chat,
            target_chat,
            window_size,
            page_size,
            media_only,
            drop_author,
            offset_file,
            downloads_dir,
            log_level,
            audit_log_path,
            audit_log_json,
        })
    }

    /// Bot token for live mode.
    pub fn bot_token(&self) -> Result<&str> {
        self.telegram_bot_token.as_deref().ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })
    }

    /// `API_ID` and `API_HASH` for the user-account client.
    pub fn user_credentials(&self) -> Result<(i32, &str)> {
        match (self.api_id, self.api_hash.as_deref()) {
            (Some(id), Some(hash)) => Ok((id, hash)),
            _ => Err(Error::Config(
                "API_ID and API_HASH are required for the user-account client".to_string(),
            )),
        }
    }

    /// Source and target for a history run; both are required.
    pub fn history_chats(&self) -> Result<(ChatRef, ChatRef)> {
        match (&self.source_chat, &self.target_chat) {
            (Some(s), Some(t)) => Ok((s.clone(), t.clone())),
            _ => Err(Error::Config(
                "SOURCE_CHAT_ID and TARGET_CHAT_ID are required for history mode".to_string(),
            )),
        }
    }

    pub fn is_operator(&self, user_id: i64) -> bool {
        self.operators.contains(&user_id)
    }
}

impl Config {
    /// Defaults with every optional setting unset. For tests across the workspace.
    #[doc(hidden)]
    pub fn for_tests() -> Self {
        Self {
            telegram_bot_token: None,
            operators: Vec::new(),
            api_id: None,
            api_hash: None,
            phone_number: None,
            session_string: None,
            session_file: PathBuf::from("relay.session"),
            source_chat: None,
            target_chat: None,
            window_size: 5,
            page_size: 20,
            media_only: true,
            drop_author: false,
            offset_file: PathBuf::from("offset.txt"),
            downloads_dir: PathBuf::from("downloads"),
            log_level: "info".to_string(),
            audit_log_path: None,
            audit_log_json: false,
        }
    }
}

fn parse_chat(v: Option<String>, key: &str) -> Result<Option<ChatRef>> {
    let Some(v) = v.and_then(non_empty) else {
        return Ok(None);
    };
    v.parse::<ChatRef>()
        .map(Some)
        .map_err(|e| Error::Config(format!("{key}: {e}")))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
