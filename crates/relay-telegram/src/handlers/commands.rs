use std::sync::Arc;

use teloxide::{prelude::*, types::ParseMode};
use tracing::{info, warn};

use relay_core::{
    audit::RunMode,
    commands::{
        apply_setchat, forward_reply, help_text, status_text, unknown_text, Command, StatusView,
        FORWARD_USAGE, NO_MEDIA, NO_TARGET, UNAUTHORIZED,
    },
    domain::Message as CoreMessage,
};

use crate::{convert, router::AppState};

async fn send_html(bot: &Bot, chat_id: ChatId, html: &str) {
    if let Err(e) = bot
        .send_message(chat_id, html.to_string())
        .parse_mode(ParseMode::Html)
        .await
    {
        warn!(chat_id = chat_id.0, error = %e, "failed to send reply");
    }
}

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let replied = msg.reply_to_message().map(convert::message_from_tg);
    if let Some(reply) = command_reply(&state, user.id.0 as i64, text, replied).await {
        send_html(&bot, msg.chat.id, &reply).await;
    }
    Ok(())
}

/// Reply text for `text` sent by `user_id`. `None` when `text` is not a command.
pub(crate) async fn command_reply(
    state: &AppState,
    user_id: i64,
    text: &str,
    replied: Option<CoreMessage>,
) -> Option<String> {
    let cmd = Command::parse(text)?;
    if !state.cfg.is_operator(user_id) {
        warn!(user_id, "command from unauthorized user");
        return Some(UNAUTHORIZED.to_string());
    }
    info!(user_id, command = ?cmd, "operator command");

    let reply = match cmd {
        Command::Start | Command::Help => help_text(),
        Command::SetChat(arg) => apply_setchat(state.context(), &arg).await,
        Command::Status => {
            let target = state.context().target().await;
            let counts = state.context().counts().await;
            status_text(&StatusView {
                source: state.live.source(),
                target: target.as_ref(),
                window_size: state.cfg.window_size,
                media_only: state.cfg.media_only,
                log_level: &state.cfg.log_level,
                counts,
            })
        }
        Command::Forward => forward_replied(replied, state).await,
        Command::Unknown(name) => unknown_text(&name),
    };
    Some(reply)
}

async fn forward_replied(replied: Option<CoreMessage>, state: &AppState) -> String {
    let Some(message) = replied else {
        return FORWARD_USAGE.to_string();
    };
    let Some(target) = state.context().target().await else {
        return NO_TARGET.to_string();
    };
    if !message.has_media() {
        return NO_MEDIA.to_string();
    }

    let outcome = state.live.relay(&message, &target, RunMode::Manual).await;
    forward_reply(outcome)
}
