//! # Valley Client Library
//!
//! A headless client for the valley real-time server. It speaks the same JSON
//! envelope protocol as the game clients and is used by the integration tests
//! and the `valley-bot` load/smoke binary.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - Websocket connection with the bearer token in the query string
//! - Typed sends for `ping`, `player_move` and `player_interact`
//! - Typed receives of [`shared::ServerEvent`], skipping control frames
//! - Waiting for a specific event with an overall deadline
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::ValleyClient;
//! use shared::{Direction, ServerEvent};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = ValleyClient::connect("127.0.0.1:8000", "secret-a").await?;
//!
//!     client.ping().await?;
//!     client
//!         .wait_for(|e| matches!(e, ServerEvent::Pong { .. }), Duration::from_secs(5))
//!         .await?;
//!
//!     client.move_to(21, 15, Direction::Right).await?;
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

pub mod network;

pub use network::{ClientError, ValleyClient};
