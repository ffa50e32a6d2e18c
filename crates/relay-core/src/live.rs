use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::{
    audit::{AuditEvent, AuditLogger, RunMode},
    context::RelayContext,
    domain::{ChatInfo, ChatRef, Message},
    pipeline::Eligibility,
    strategy::{StrategySelector, TransferOutcome},
};

/// Matches incoming chats against the configured source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatFilter {
    chat: ChatRef,
}

impl ChatFilter {
    pub fn new(chat: ChatRef) -> Self {
        Self { chat }
    }

    pub fn chat(&self) -> &ChatRef {
        &self.chat
    }

    /// Raw id, id without the `-100` broadcast prefix and sign, or public handle.
    pub fn matches(&self, chat: &ChatInfo) -> bool {
        match &self.chat {
            ChatRef::Id(id) => {
                id.0 == chat.id.0 || normalize_id(id.0) == normalize_id(chat.id.0)
            }
            ChatRef::Username(name) => chat
                .username
                .as_deref()
                .is_some_and(|u| u.eq_ignore_ascii_case(name)),
        }
    }
}

pub fn normalize_id(id: i64) -> String {
    let s = id.to_string();
    let s = s.strip_prefix("-100").unwrap_or(&s);
    s.strip_prefix('-').unwrap_or(s).to_string()
}

/// Relays live messages with the same strategy order as history mode.
///
/// No prefetch window and no offset: each message is handled once, as it arrives.
pub struct LiveRouter {
    selector: Arc<StrategySelector>,
    source: Option<ChatFilter>,
    eligibility: Eligibility,
    context: Arc<RelayContext>,
    audit: Option<AuditLogger>,
}

impl LiveRouter {
    pub fn new(
        selector: Arc<StrategySelector>,
        source: Option<ChatRef>,
        media_only: bool,
        context: Arc<RelayContext>,
    ) -> Self {
        Self {
            selector,
            source: source.map(ChatFilter::new),
            eligibility: Eligibility { media_only },
            context,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Option<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn source(&self) -> Option<&ChatRef> {
        self.source.as_ref().map(ChatFilter::chat)
    }

    pub fn context(&self) -> &Arc<RelayContext> {
        &self.context
    }

    /// Whether `message` should be relayed at all.
    pub fn wants(&self, message: &Message) -> bool {
        if !self.eligibility.accepts(message) {
            return false;
        }
        match &self.source {
            Some(filter) => filter.matches(&message.chat),
            None => message.protected || message.forwarded,
        }
    }

    /// `None` when the message was ignored.
    pub async fn handle(&self, message: &Message) -> Option<TransferOutcome> {
        if !self.wants(message) {
            debug!(message_id = %message.id, chat_id = message.chat.id.0, "ignoring live message");
            return None;
        }

        let Some(target) = self.context.target().await else {
            warn!(message_id = %message.id, "no target chat set, skipping live message");
            return None;
        };

        Some(self.relay(message, &target, RunMode::Live).await)
    }

    /// Relay one message to `target` regardless of filters (used by `/forward`).
    pub async fn relay(&self, message: &Message, target: &ChatRef, mode: RunMode) -> TransferOutcome {
        let source = message.chat.chat_ref();
        let outcome = self.selector.attempt(message, &source, target, None).await;
        self.context.record(outcome).await;

        if let Some(log) = &self.audit {
            let event = AuditEvent::transfer(mode, message, &source, target, outcome);
            if let Err(e) = log.write(event) {
                error!(error = %e, path = %log.path().display(), "audit write failed");
            }
        }
        outcome
    }
}
