//! Operator commands and their reply texts (Telegram HTML).

use crate::{
    context::{OutcomeCounts, RelayContext},
    domain::ChatRef,
    strategy::TransferOutcome,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    SetChat(String),
    Status,
    Forward,
    Unknown(String),
}

impl Command {
    /// `None` when `text` is not a command at all.
    pub fn parse(text: &str) -> Option<Self> {
        if !text.trim_start().starts_with('/') {
            return None;
        }
        let (cmd, arg) = parse_command(text);
        Some(match cmd.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "setchat" => Command::SetChat(arg),
            "status" => Command::Status,
            "forward" => Command::Forward,
            _ => Command::Unknown(cmd),
        })
    }
}

/// Split `/cmd@botname arg...` into a lowercase command name and the rest.
pub fn parse_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn help_text() -> String {
    "🤖 <b>Restricted Content Relay</b>\n\n\
<b>📋 Commands:</b>\n\
/start - Show this help message\n\
/setchat &lt;chat&gt; - Set the target chat (id or @handle)\n\
/status - Show relay settings and counters\n\
/forward - Relay the replied-to message to the target\n\n\
<b>💡 Tips:</b>\n\
• The bot must be an admin in the target chat\n\
• Protected or forwarded messages sent here are relayed automatically"
        .to_string()
}

pub fn unknown_text(cmd: &str) -> String {
    format!(
        "❓ Unknown command: <code>/{}</code>\nUse /help for the list.",
        escape_html(cmd)
    )
}

/// Everything `/status` reports.
#[derive(Clone, Debug)]
pub struct StatusView<'a> {
    pub source: Option<&'a ChatRef>,
    pub target: Option<&'a ChatRef>,
    pub window_size: usize,
    pub media_only: bool,
    pub log_level: &'a str,
    pub counts: OutcomeCounts,
}

pub fn status_text(view: &StatusView<'_>) -> String {
    let chat = |c: Option<&ChatRef>, unset: &str| match c {
        Some(c) => format!("<code>{}</code>", escape_html(&c.to_string())),
        None => unset.to_string(),
    };

    let mut lines = vec!["📊 <b>Relay Status</b>\n".to_string()];
    lines.push(format!(
        "Source: {}",
        chat(view.source, "any (protected/forwarded only)")
    ));
    lines.push(format!("Target: {}", chat(view.target, "not set")));
    lines.push(format!("Prefetch window: {}", view.window_size));
    lines.push(format!(
        "Media only: {}",
        if view.media_only { "yes" } else { "no" }
    ));
    lines.push(format!("Log level: {}", escape_html(view.log_level)));
    lines.push(String::new());
    lines.push(format!(
        "Relayed: {} (forwarded {}, copied {}, re-uploaded {})",
        view.counts.succeeded(),
        view.counts.forwarded,
        view.counts.copied,
        view.counts.reuploaded
    ));
    lines.push(format!("Failed: {}", view.counts.failed));
    lines.join("\n")
}

/// Validate `/setchat`'s argument and store it as the new target.
pub async fn apply_setchat(ctx: &RelayContext, arg: &str) -> String {
    if arg.trim().is_empty() {
        return "❌ Usage: /setchat &lt;chat id or @handle&gt;".to_string();
    }
    match arg.parse::<ChatRef>() {
        Ok(chat) => {
            let shown = escape_html(&chat.to_string());
            ctx.set_target(chat).await;
            format!("✅ Target chat set to <code>{shown}</code>")
        }
        Err(_) => format!(
            "❌ Invalid chat: <code>{}</code>\nUse a numeric id or a public @handle.",
            escape_html(arg.trim())
        ),
    }
}

pub fn forward_reply(outcome: TransferOutcome) -> String {
    if outcome.is_success() {
        format!("✅ Message {}.", outcome.describe())
    } else {
        "❌ Could not relay this message. Check the logs for details.".to_string()
    }
}

pub const FORWARD_USAGE: &str = "↩️ Reply to a message with /forward to relay it.";
pub const NO_MEDIA: &str = "❌ The replied message does not contain media.";
pub const NO_TARGET: &str = "⚠️ No target chat set. Use /setchat first.";
pub const UNAUTHORIZED: &str = "Unauthorized. Contact the bot owner for access.";
