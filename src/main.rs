use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_relay::clock::{Clock, SystemClock};
use live_relay::commands::{CommandExecutor, parse_public_key};
use live_relay::config::Config;
use live_relay::gateways::{DiscordClient, LiveGateways, TwitchClient, XClient};
use live_relay::ledger::Ledgers;
use live_relay::notify::Dispatcher;
use live_relay::server::{AppState, build_router};
use live_relay::store::{FileStore, KvStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "live_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store: Arc<dyn KvStore> = Arc::new(
        FileStore::open_with_clock(&config.store_path, clock.clone())
            .with_context(|| format!("opening store at {}", config.store_path.display()))?,
    );
    let ledgers = Ledgers::new(store.clone(), clock.clone());

    let provider = Arc::new(TwitchClient::new(config.twitch(), clock.clone())?);
    let messaging = Arc::new(DiscordClient::new(config.discord())?);
    let social = match config.x() {
        Some(x) => Some(Arc::new(XClient::new(x)?)),
        None => {
            warn!("X credentials incomplete, cross-posting disabled");
            None
        }
    };
    let dispatcher_config = config.dispatcher();
    if let Some(cross) = &dispatcher_config.cross_post {
        info!(target_broadcaster = %cross.target, "Cross-posting enabled");
    }

    let dispatcher = Dispatcher::<LiveGateways>::new(
        ledgers.clone(),
        provider.clone(),
        messaging,
        social,
        dispatcher_config,
        clock,
    );
    let commands = CommandExecutor::new(ledgers, provider);
    let interaction_key =
        parse_public_key(&config.discord_public_key).context("parsing DISCORD_PUBLIC_KEY")?;

    let app = build_router(AppState::new(
        dispatcher,
        commands,
        store,
        interaction_key,
        config.admin_token.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!("listening on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received, shutting down");
}
