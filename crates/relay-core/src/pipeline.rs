use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    audit::{AuditEvent, AuditLogger, RunMode},
    context::OutcomeCounts,
    domain::{ChatRef, Message, MessageId},
    errors::Error,
    offset::OffsetStore,
    ports::{ChatClient, HistoryQuery},
    prefetch::PrefetchWindow,
    strategy::{StrategySelector, TransferOutcome},
    Result,
};

/// Which messages a run relays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Eligibility {
    pub media_only: bool,
}

impl Eligibility {
    pub fn accepts(&self, message: &Message) -> bool {
        !message.service && (!self.media_only || message.has_media())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryOptions {
    /// Downloads kept running ahead of the current message.
    pub window_size: usize,
    pub page_size: usize,
    pub media_only: bool,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            window_size: 5,
            page_size: 20,
            media_only: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub counts: OutcomeCounts,
    pub pages: u64,
    pub downloads_started: usize,
    pub last_offset: MessageId,
    pub cancelled: bool,
}

/// Sequential, resumable replay of a chat's history into a target chat.
pub struct HistoryRelay {
    client: Arc<dyn ChatClient>,
    selector: Arc<StrategySelector>,
    offsets: OffsetStore,
    options: HistoryOptions,
    audit: Option<AuditLogger>,
}

impl HistoryRelay {
    pub fn new(
        client: Arc<dyn ChatClient>,
        selector: Arc<StrategySelector>,
        offsets: OffsetStore,
        options: HistoryOptions,
    ) -> Self {
        Self {
            client,
            selector,
            offsets,
            options,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Option<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub async fn run(&self, source: &ChatRef, target: &ChatRef) -> Result<RunSummary> {
        self.run_until(source, target, &CancellationToken::new())
            .await
    }

    /// Like `run`, but stops between messages once `cancel` fires.
    pub async fn run_until(
        &self,
        source: &ChatRef,
        target: &ChatRef,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        if !self.client.capabilities().supports_history {
            return Err(Error::Config(
                "the configured client cannot page chat history".to_string(),
            ));
        }

        let eligibility = Eligibility {
            media_only: self.options.media_only,
        };
        let page_size = self.options.page_size.max(1);
        let window_size = self.options.window_size;

        let mut last = self.offsets.load();
        let mut summary = RunSummary::default();
        let mut window = PrefetchWindow::new(Arc::clone(self.selector.fetcher()));

        info!(
            %source,
            %target,
            resume_after = %last,
            window_size,
            page_size,
            media_only = self.options.media_only,
            "starting history relay"
        );

        loop {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let page = self
                .client
                .fetch_history(
                    source,
                    HistoryQuery {
                        after: last,
                        limit: page_size,
                    },
                )
                .await?;

            let Some(page_last) = page.last().map(|m| m.id) else {
                info!("no more new messages to fetch");
                break;
            };
            if page_last <= last {
                warn!(%page_last, %last, "history page did not move past the offset, stopping");
                break;
            }
            summary.pages += 1;

            let eligible: Vec<&Message> = page.iter().filter(|m| eligibility.accepts(m)).collect();
            if eligible.is_empty() {
                info!(skipped = page.len(), %page_last, "no eligible messages in batch");
            }

            for (i, message) in eligible.iter().enumerate() {
                if cancel.is_cancelled() {
                    summary.cancelled = true;
                    break;
                }

                window.fill(eligible[i..].iter().copied(), window_size);
                let outcome = self
                    .selector
                    .attempt(message, source, target, Some(&mut window))
                    .await;

                summary.counts.record(outcome);
                self.audit(message, source, target, outcome);

                last = message.id;
                self.offsets.save(last)?;
            }

            window.drain().await;
            if summary.cancelled {
                break;
            }

            // Trailing filtered messages are never fetched again.
            if page_last > last {
                last = page_last;
                self.offsets.save(last)?;
            }

            info!(
                batch = summary.pages,
                processed = summary.counts.total(),
                last_id = %last,
                "processed batch"
            );
        }

        window.drain().await;
        summary.last_offset = last;
        summary.downloads_started = window.started();

        info!(
            forwarded = summary.counts.forwarded,
            copied = summary.counts.copied,
            reuploaded = summary.counts.reuploaded,
            failed = summary.counts.failed,
            downloads = summary.downloads_started,
            last_offset = %summary.last_offset,
            cancelled = summary.cancelled,
            "history relay finished"
        );
        Ok(summary)
    }

    fn audit(&self, message: &Message, source: &ChatRef, target: &ChatRef, outcome: TransferOutcome) {
        let Some(log) = &self.audit else {
            return;
        };
        let event = AuditEvent::transfer(RunMode::History, message, source, target, outcome);
        if let Err(e) = log.write(event) {
            error!(error = %e, path = %log.path().display(), "audit write failed");
        }
    }
}
