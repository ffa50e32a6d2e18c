//! Telegram update handlers.
//!
//! Commands from operators (or sent in a private chat) go to `commands`;
//! everything else is offered to the live router, which decides whether it is
//! relayed.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::debug;

use crate::{convert, router::AppState};

mod commands;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let is_private = msg.chat.is_private();
    let is_operator = msg
        .from()
        .is_some_and(|u| state.cfg.is_operator(u.id.0 as i64));

    if routes_to_commands(msg.text(), is_private, is_operator) {
        return commands::handle_command(bot, msg, state).await;
    }

    // Private chats only accept content from operators.
    if is_private && !is_operator {
        debug!(chat_id = msg.chat.id.0, "ignoring private message from non-operator");
        return Ok(());
    }

    relay(&msg, &state).await;
    Ok(())
}

/// Slash text is a command when an operator sent it or it arrived in a private
/// chat. In groups a non-operator's `/...` is ordinary content.
fn routes_to_commands(text: Option<&str>, is_private: bool, is_operator: bool) -> bool {
    text.is_some_and(|t| t.trim_start().starts_with('/')) && (is_private || is_operator)
}

pub async fn handle_channel_post(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    relay(&msg, &state).await;
    Ok(())
}

async fn relay(msg: &Message, state: &AppState) {
    let message = convert::message_from_tg(msg);
    if let Some(outcome) = state.live.handle(&message).await {
        debug!(message_id = %message.id, outcome = outcome.describe(), "live message handled");
    }
}
