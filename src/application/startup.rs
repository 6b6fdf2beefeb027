use std::{future::Future, sync::Arc};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    application::{
        config::{Args, RuntimeConfig},
        snapshots::SnapshotScheduler,
        state::SharedState,
    },
    domain::error::RelayError,
    interfaces::{
        chat::ChatSessions,
        gateway::Gateway,
        media::MediaTransformer,
        telegram::{TelegramGateway, UpdatePoller},
        watcher,
    },
};

pub async fn run(args: Args) -> Result<(), RelayError> {
    let config = RuntimeConfig::load(&args).map_err(RelayError::Config)?;
    init_logging(&config.log_filter, config.json_logs)?;
    run_configured(config, shutdown_signal()).await
}

pub async fn run_configured(
    config: RuntimeConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), RelayError> {
    let state = SharedState::new(config).await?;
    info!(
        "starting homerelay watching {} with {} camera(s)",
        state.config().image_folder.display(),
        state.cameras().all().len()
    );

    let gateway: Arc<dyn Gateway> = Arc::new(TelegramGateway::new(
        state.http().clone(),
        state.config().api_base_url.clone(),
        state.config().bot_token.clone(),
    ));
    let transformer = Arc::new(MediaTransformer::from_config(state.config()));
    let scheduler = Arc::new(SnapshotScheduler::new(
        gateway.clone(),
        state.http().clone(),
        state.cameras().clone(),
    ));
    let sessions = Arc::new(ChatSessions::new(
        state.clone(),
        gateway.clone(),
        scheduler.clone(),
        transformer.clone(),
    ));

    let cancel = CancellationToken::new();
    let watcher_task = watcher::spawn(state.clone(), gateway, transformer, cancel.clone())?;

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let poller = UpdatePoller::new(
        state.http().clone(),
        state.config().api_base_url.clone(),
        state.config().bot_token.clone(),
        event_tx,
    );
    let poller_task = tokio::spawn(poller.run(cancel.clone()));

    let dispatch_sessions = sessions.clone();
    let dispatch_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            dispatch_sessions.dispatch(event).await;
        }
    });

    shutdown.await;
    info!("shutdown signal received");

    cancel.cancel();
    if let Err(error) = poller_task.await {
        warn!("update poller ended abnormally: {error}");
    }
    if let Err(error) = dispatch_task.await {
        warn!("event dispatch ended abnormally: {error}");
    }
    if let Err(error) = watcher_task.await {
        warn!("watch dispatcher ended abnormally: {error}");
    }

    sessions.close_all().await;
    scheduler.shutdown().await;

    Ok(())
}

fn init_logging(filter: &str, json_logs: bool) -> Result<(), RelayError> {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(env_filter).with_target(false);

    if json_logs {
        builder.json().try_init().map_err(|error| {
            RelayError::Config(format!("failed to initialize logger: {error}"))
        })?;
    } else {
        builder.compact().try_init().map_err(|error| {
            RelayError::Config(format!("failed to initialize logger: {error}"))
        })?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
