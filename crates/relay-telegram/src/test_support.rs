//! Shared fixtures for the handler and router tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use relay_core::{
    config::Config,
    domain::{ChatId, ChatRef, Media, Message, MessageId, MessageRef},
    errors::Error,
    ports::{ChatClient, ClientCapabilities, HistoryQuery, OutgoingMessage, ProgressFn},
    Result,
};

use crate::router::{build_state, AppState};

pub const OPERATOR: i64 = 42;

/// Accepts every forward and remembers which messages it saw.
#[derive(Default)]
pub struct RecordingClient {
    forwarded: Mutex<Vec<MessageId>>,
}

impl RecordingClient {
    pub fn forwarded(&self) -> Vec<MessageId> {
        self.forwarded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for RecordingClient {
    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            supports_history: false,
            max_download_bytes: None,
        }
    }

    async fn fetch_history(&self, _chat: &ChatRef, _query: HistoryQuery) -> Result<Vec<Message>> {
        Err(Error::Unsupported("no history".to_string()))
    }

    async fn forward(
        &self,
        _target: &ChatRef,
        _source: &ChatRef,
        ids: &[MessageId],
        _drop_author: bool,
    ) -> Result<()> {
        self.forwarded.lock().unwrap().extend_from_slice(ids);
        Ok(())
    }

    async fn send(&self, _target: &ChatRef, _msg: OutgoingMessage) -> Result<MessageRef> {
        Ok(MessageRef {
            chat_id: ChatId(0),
            message_id: MessageId(1),
        })
    }

    async fn download(&self, _media: &Media, _progress: &ProgressFn) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

pub fn config(target: Option<&str>) -> Config {
    Config {
        operators: vec![OPERATOR],
        target_chat: target.map(|t| t.parse().unwrap()),
        ..Config::for_tests()
    }
}

pub fn state(target: Option<&str>) -> (AppState, Arc<RecordingClient>) {
    state_with(config(target))
}

pub fn state_with(cfg: Config) -> (AppState, Arc<RecordingClient>) {
    let client = Arc::new(RecordingClient::default());
    let state = build_state(Arc::new(cfg), client.clone());
    (state, client)
}
