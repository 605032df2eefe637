//! `likebot run`: wire the plugin to OneBot and serve until interrupted.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use likebot_config::ConfigStore;
use likebot_llm::{ReplyComposer, ReplyStyles, provider_from_config};
use likebot_onebot::{OneBotPlatform, spawn_event_loop};
use likebot_plugin::{LikePlatform, LikePlugin};
use likebot_storage::SubscriptionLedger;

const INBOUND_BUFFER: usize = 256;

pub async fn run_bot(store: Arc<ConfigStore>) -> anyhow::Result<()> {
    let config = store.read();

    let ledger = Arc::new(SubscriptionLedger::from_config(store.clone()));
    let platform: Arc<dyn LikePlatform> = Arc::new(OneBotPlatform::from_config(&config.onebot));

    let provider = provider_from_config(&config.llm);
    match &provider {
        Some(p) => info!(provider = p.id(), model = %config.llm.model, "LLM replies enabled"),
        None => info!("No LLM API key configured, using fixed replies"),
    }
    let replies = ReplyComposer::new(
        provider,
        config.persona_prompt.clone(),
        ReplyStyles::from_config(&config),
    );

    let plugin = Arc::new(LikePlugin::new(
        config.clone(),
        platform,
        ledger.clone(),
        replies,
    ));
    plugin.start()?;
    info!(
        subscribers = ledger.len(),
        jobs = ?plugin.scheduled_jobs(),
        "likebot started"
    );

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
    let events = spawn_event_loop(&config.onebot, tx, cancel.clone());
    let worker = tokio::spawn(plugin.clone().run(rx, cancel.clone()));

    shutdown_signal().await;

    cancel.cancel();
    plugin.terminate();
    if let Err(e) = events.await {
        warn!("Event loop task failed: {e}");
    }
    if let Err(e) = worker.await {
        warn!("Message worker task failed: {e}");
    }
    info!("likebot stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
