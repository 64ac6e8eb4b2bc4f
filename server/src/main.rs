use clap::Parser;
use log::{error, info, warn};
use server::actions::{InteractProcessor, MoveProcessor};
use server::auth::StaticTokens;
use server::clock::{ClockScheduler, WorldHooks};
use server::config::ServerConfig;
use server::hub::Hub;
use server::memory::InMemoryWorld;
use server::network::NetworkServer;
use server::world::WorldStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Command line arguments; anything given here overrides the config file
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long)]
    host: Option<String>,
    /// Server port to listen on
    #[clap(short, long)]
    port: Option<u16>,
    /// Path to a TOML config file
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Real seconds between world clock ticks
    #[clap(short, long)]
    tick_seconds: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = ServerConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(seconds) = args.tick_seconds {
        config.clock.tick_interval_ms = seconds.saturating_mul(1000);
    }
    config.validate()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    // World and economy
    let world = Arc::new(match &config.clock.snapshot_path {
        Some(path) => InMemoryWorld::with_snapshot(path),
        None => InMemoryWorld::new(),
    });
    world.seed_village()?;
    let clock = world.clock()?;
    info!(
        "World time: year {} {} day {} {:02}:{:02}",
        clock.year, clock.season, clock.day, clock.hour, clock.minute
    );

    let tokens = StaticTokens::new(config.auth.tokens.clone());
    if tokens.is_empty() {
        warn!("No connection tokens configured; every connection will be rejected");
    }

    // Hub and gameplay processors
    let (hub, handle, queues) =
        Hub::with_capacity(config.connection.event_queue, config.connection.hub_queue);
    let hub_task = hub.spawn();

    tokio::spawn(MoveProcessor::new(world.clone(), handle.clone()).run(queues.moves));
    tokio::spawn(
        InteractProcessor::new(world.clone(), world.clone(), handle.clone())
            .run(queues.interactions),
    );

    // World clock
    let hooks = Arc::new(WorldHooks::new(world.clone(), handle.clone()));
    let mut scheduler = ClockScheduler::new(
        world.clone(),
        handle.clone(),
        hooks,
        config.clock.tick_interval(),
        config.clock.increment_minutes,
    )
    .start();

    // Network
    let server = NetworkServer::bind(
        &config.bind_addr(),
        handle.clone(),
        world.clone(),
        Arc::new(tokens),
        &config,
    )
    .await?;
    let shutdown = CancellationToken::new();
    let listener = tokio::spawn(server.run(shutdown.clone()));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
    }

    shutdown.cancel();
    scheduler.stop().await;
    handle.shutdown();

    if let Err(e) = listener.await {
        error!("Listener task panicked: {}", e);
    }
    if let Err(e) = hub_task.await {
        error!("Hub task panicked: {}", e);
    }

    Ok(())
}
