//! The long-running bot: Socket Mode listener and job dispatcher.

use std::sync::Arc;

use linkcast::automation::WebDriverSession;
use linkcast::chat::slack::{SlackClient, SocketModeListener};
use linkcast::chat::{Ingestor, SlackNotifier, WorkspaceRegistry};
use linkcast::pipeline::{Pipeline, PipelineConfig};
use linkcast::storage;
use linkcast::worker::Dispatcher;
use linkcast::LinkcastError;
use log::{error, info, warn};
use tokio::sync::{broadcast, watch};

use crate::state::AppState;

pub async fn run(state: &AppState) -> Result<(), LinkcastError> {
    info!("Starting linkcast-bot v{}", env!("CARGO_PKG_VERSION"));
    let config = &state.config;

    let registry = Arc::new(WorkspaceRegistry::load_from_env(&config.slack, &state.db).await?);
    info!("Serving {} workspace(s)", registry.len());

    let storage = storage::from_config(&config.storage)?;
    let notifier = Arc::new(SlackNotifier::new(Arc::clone(&registry)));
    let pipeline = Pipeline::new(
        state.store.clone(),
        storage,
        notifier,
        PipelineConfig::from_config(config),
    );
    let session = WebDriverSession::new(config.automation.clone())?;
    let mut dispatcher = Dispatcher::new(
        state.store.clone(),
        pipeline,
        Box::new(session),
        config.dispatcher.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if let Some(mut events) = state.store.subscribe() {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => info!(
                        "Job {} {} {}% {}",
                        event.job_id,
                        event.status,
                        event.progress,
                        event.current_step.as_deref().unwrap_or("")
                    ),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Progress log skipped {} events", n)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    let listener = match registry.app_token() {
        Some(app_token) => {
            let client = SlackClient::new(&config.slack.api_base_url, app_token.clone())?;
            let ingestor = Ingestor::new(state.store.clone());
            let listener = SocketModeListener::new(client, Arc::clone(&registry), ingestor);
            let rx = shutdown_rx.clone();
            Some(tokio::spawn(async move { listener.run(rx).await }))
        }
        None => {
            warn!("No app token configured; only manually queued jobs will be processed");
            None
        }
    };

    let dispatcher_rx = shutdown_rx.clone();
    let dispatcher_task = tokio::spawn(async move { dispatcher.run(dispatcher_rx).await });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested, finishing the current job");
    let _ = shutdown_tx.send(true);

    if let Some(listener) = listener {
        if let Err(e) = listener.await {
            error!("Listener task failed: {}", e);
        }
    }
    if let Err(e) = dispatcher_task.await {
        error!("Dispatcher task failed: {}", e);
    }

    info!("linkcast-bot stopped");
    Ok(())
}
