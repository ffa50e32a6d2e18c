use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use relay_core::{
    audit::AuditLogger, config::Config, context::RelayContext, live::LiveRouter,
    media::MediaFetcher, ports::ChatClient, strategy::StrategySelector,
};

use crate::handlers;
use crate::TelegramClient;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub live: Arc<LiveRouter>,
}

impl AppState {
    pub fn context(&self) -> &Arc<RelayContext> {
        self.live.context()
    }
}

/// Wire the live router over a Telegram client.
pub fn build_state(cfg: Arc<Config>, client: Arc<dyn ChatClient>) -> AppState {
    let fetcher = Arc::new(MediaFetcher::new(
        Arc::clone(&client),
        cfg.downloads_dir.clone(),
    ));
    let selector = Arc::new(StrategySelector::new(client, fetcher, cfg.drop_author));
    let context = Arc::new(RelayContext::new(cfg.target_chat.clone()));
    let audit = cfg
        .audit_log_path
        .clone()
        .map(|path| AuditLogger::new(path, cfg.audit_log_json));

    let live = LiveRouter::new(selector, cfg.source_chat.clone(), cfg.media_only, context)
        .with_audit(audit);

    AppState {
        cfg,
        live: Arc::new(live),
    }
}

pub async fn run_live(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token()?);

    match bot.get_me().await {
        Ok(me) => info!(bot = %me.username(), "relay bot started"),
        Err(e) => warn!(error = %e, "could not fetch bot identity"),
    }
    info!(
        source = %cfg.source_chat.as_ref().map(|c| c.to_string()).unwrap_or_else(|| "any".to_string()),
        target = %cfg.target_chat.as_ref().map(|c| c.to_string()).unwrap_or_else(|| "unset".to_string()),
        operators = cfg.operators.len(),
        media_only = cfg.media_only,
        "live relay configured"
    );
    if cfg.operators.is_empty() {
        warn!("TELEGRAM_ALLOWED_USERS is empty; commands are disabled");
    }

    let client: Arc<dyn ChatClient> = Arc::new(TelegramClient::new(bot.clone()));
    let state = Arc::new(build_state(cfg, client));

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_channel_post().endpoint(handlers::handle_channel_post));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("live relay stopped");
    Ok(())
}
