use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use relay_core::{
    audit::AuditLogger,
    config::Config,
    media::MediaFetcher,
    offset::OffsetStore,
    pipeline::{HistoryOptions, HistoryRelay},
    ports::ChatClient,
    strategy::StrategySelector,
};
use relay_mtproto::{ChatEntry, MtprotoClient};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Live,
    History,
    Chats,
}

fn parse_mode(arg: Option<&str>) -> Result<Mode, relay_core::Error> {
    match arg.map(str::to_lowercase).as_deref() {
        None | Some("live") => Ok(Mode::Live),
        Some("history") => Ok(Mode::History),
        Some("chats") => Ok(Mode::Chats),
        Some(other) => Err(relay_core::Error::Config(format!(
            "unknown mode '{other}' (expected 'live', 'history' or 'chats')"
        ))),
    }
}

#[tokio::main]
async fn main() -> Result<(), relay_core::Error> {
    let cfg = Arc::new(Config::load()?);
    relay_core::logging::init("relay", &cfg.log_level)?;

    let arg = std::env::args().nth(1);
    match parse_mode(arg.as_deref())? {
        Mode::Live => relay_telegram::router::run_live(cfg)
            .await
            .map_err(|e| relay_core::Error::External(format!("telegram bot failed: {e}"))),
        Mode::History => run_history(cfg).await,
        Mode::Chats => list_chats(&cfg).await,
    }
}

async fn user_client(cfg: &Config) -> Result<MtprotoClient, relay_core::Error> {
    MtprotoClient::connect(cfg)
        .await
        .map_err(|e| relay_core::Error::External(format!("telegram login failed: {e:#}")))
}

async fn run_history(cfg: Arc<Config>) -> Result<(), relay_core::Error> {
    let (source, target) = cfg.history_chats()?;

    let client: Arc<dyn ChatClient> = Arc::new(user_client(&cfg).await?);
    let fetcher = Arc::new(MediaFetcher::new(
        Arc::clone(&client),
        cfg.downloads_dir.clone(),
    ));
    let selector = Arc::new(StrategySelector::new(
        Arc::clone(&client),
        fetcher,
        cfg.drop_author,
    ));
    let relay = HistoryRelay::new(
        client,
        selector,
        OffsetStore::new(cfg.offset_file.clone()),
        HistoryOptions {
            window_size: cfg.window_size,
            page_size: cfg.page_size,
            media_only: cfg.media_only,
        },
    )
    .with_audit(
        cfg.audit_log_path
            .clone()
            .map(|path| AuditLogger::new(path, cfg.audit_log_json)),
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing the current message");
                cancel.cancel();
            }
        });
    }

    let summary = relay.run_until(&source, &target, &cancel).await?;
    info!(
        relayed = summary.counts.succeeded(),
        failed = summary.counts.failed,
        last_offset = %summary.last_offset,
        "history mode done"
    );
    Ok(())
}

/// Print the groups and channels the account can relay from.
async fn list_chats(cfg: &Config) -> Result<(), relay_core::Error> {
    let client = user_client(cfg).await?;
    let chats = client.list_chats().await?;
    info!(count = chats.len(), "fetched dialogs");
    for chat in &chats {
        println!("{}", chat_listing(chat));
    }
    Ok(())
}

fn chat_listing(chat: &ChatEntry) -> String {
    let mut out = format!("Name: {}\nID: {}", chat.title, chat.id);
    if let Some(username) = &chat.username {
        out.push_str(&format!("\nHandle: @{username}"));
    }
    out.push_str("\n---");
    out
}
