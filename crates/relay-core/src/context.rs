use tokio::sync::{Mutex, RwLock};

use crate::{domain::ChatRef, strategy::TransferOutcome};

/// Per-outcome tallies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub forwarded: u64,
    pub copied: u64,
    pub reuploaded: u64,
    pub failed: u64,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: TransferOutcome) {
        match outcome {
            TransferOutcome::Forwarded => self.forwarded += 1,
            TransferOutcome::Copied => self.copied += 1,
            TransferOutcome::Reuploaded => self.reuploaded += 1,
            TransferOutcome::Failed => self.failed += 1,
        }
    }

    pub fn succeeded(&self) -> u64 {
        self.forwarded + self.copied + self.reuploaded
    }

    pub fn total(&self) -> u64 {
        self.succeeded() + self.failed
    }
}

/// Mutable session state shared by the live router and the command handlers.
///
/// The target chat can be changed at runtime with `/setchat`; it starts from configuration.
#[derive(Debug, Default)]
pub struct RelayContext {
    target: RwLock<Option<ChatRef>>,
    counts: Mutex<OutcomeCounts>,
}

impl RelayContext {
    pub fn new(target: Option<ChatRef>) -> Self {
        Self {
            target: RwLock::new(target),
            counts: Mutex::new(OutcomeCounts::default()),
        }
    }

    pub async fn target(&self) -> Option<ChatRef> {
        self.target.read().await.clone()
    }

    pub async fn set_target(&self, target: ChatRef) {
        *self.target.write().await = Some(target);
    }

    pub async fn record(&self, outcome: TransferOutcome) {
        self.counts.lock().await.record(outcome);
    }

    pub async fn counts(&self) -> OutcomeCounts {
        *self.counts.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatId;

    #[tokio::test]
    async fn target_can_be_replaced() {
        let ctx = RelayContext::new(None);
        assert!(ctx.target().await.is_none());

        ctx.set_target(ChatRef::Id(ChatId(-100123))).await;
        assert_eq!(ctx.target().await, Some(ChatRef::Id(ChatId(-100123))));
    }

    #[tokio::test]
    async fn counts_track_outcomes() {
        let ctx = RelayContext::default();
        ctx.record(TransferOutcome::Forwarded).await;
        ctx.record(TransferOutcome::Reuploaded).await;
        ctx.record(TransferOutcome::Failed).await;

        let c = ctx.counts().await;
        assert_eq!(c.succeeded(), 2);
        assert_eq!(c.failed, 1);
        assert_eq!(c.total(), 3);
    }
}
