use clap::Parser;
use client::{ClientError, ValleyClient};
use log::{info, warn};
use shared::{ClientCommand, Direction, ServerEvent};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8000")]
    server: String,

    /// Connection token
    #[arg(short = 't', long)]
    token: String,

    /// Number of laps around the square
    #[arg(short = 'l', long, default_value = "1")]
    laps: u32,

    /// Side length of the square in tiles
    #[arg(long, default_value = "3")]
    side: i32,
}

/// Walks a square starting at the map origin
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let wait = Duration::from_secs(5);

    let mut client = ValleyClient::connect(&args.server, &args.token).await?;

    client.ping().await?;
    client
        .wait_for(|e| matches!(e, ServerEvent::Pong { .. }), wait)
        .await?;
    info!("Server answered ping");

    client
        .send(ClientCommand::Chat(serde_json::json!({ "text": "bot online" })))
        .await?;

    // Walk from the map origin so the square is known to be in bounds
    let (mut x, mut y) = (0, 0);
    if !step(&mut client, x, y, Direction::Down, wait).await? {
        warn!("Could not reach the map origin, giving up");
        return Ok(());
    }

    let legs = [
        (1, 0, Direction::Right),
        (0, 1, Direction::Down),
        (-1, 0, Direction::Left),
        (0, -1, Direction::Up),
    ];

    for lap in 0..args.laps {
        for (dx, dy, direction) in legs {
            for _ in 0..args.side {
                if !step(&mut client, x + dx, y + dy, direction, wait).await? {
                    break;
                }
                x += dx;
                y += dy;
            }
        }
        info!("Lap {} done at ({}, {})", lap + 1, x, y);
    }

    client.close().await?;
    Ok(())
}

/// Moves one tile and reports whether the server accepted it
async fn step(
    client: &mut ValleyClient,
    x: i32,
    y: i32,
    direction: Direction,
    wait: Duration,
) -> Result<bool, ClientError> {
    client.move_to(x, y, direction).await?;

    // Other players' updates on the same map are skipped
    let event = client
        .wait_for(
            |e| match e {
                ServerEvent::PlayerPositionUpdate { pos_x, pos_y, .. } => {
                    *pos_x == x && *pos_y == y
                }
                ServerEvent::MovementError { .. } => true,
                _ => false,
            },
            wait,
        )
        .await?;

    match event {
        ServerEvent::MovementError { error } => {
            warn!("Move to ({}, {}) rejected: {}", x, y, error);
            Ok(false)
        }
        _ => Ok(true),
    }
}
