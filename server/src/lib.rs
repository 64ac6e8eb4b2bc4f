//! # Valley Real-Time Server Library
//!
//! This library provides the real-time layer of the valley game backend. It
//! keeps track of who is online, which map each player is looking at, and
//! pushes movement, world-object and world-time changes to every client that
//! needs to see them.
//!
//! ## Core Responsibilities
//!
//! ### Connection Lifecycle
//! Every websocket client is authenticated during the upgrade and then
//! represented by a [`connection::Connection`]. The hub registers it, replaces
//! any older connection of the same player, and removes it exactly once when
//! either of its pumps fails.
//!
//! ### Fan-Out
//! Events are serialized once and copied into each recipient's bounded
//! outbound queue. A recipient whose queue is full is considered unresponsive
//! and is dropped instead of slowing everyone else down.
//!
//! ### World Time
//! The clock scheduler advances world time on a fixed real-time interval,
//! persists it, and broadcasts a `time_update` on every tick. Day, season and
//! hour boundaries run hooks that move NPCs and grow planted objects.
//!
//! ### Gameplay Actions
//! Moves and interactions are queued by the connections and applied by two
//! processors against the world store. Results go back to the acting player,
//! state changes go to everyone on the same map.
//!
//! ## Architecture Design
//!
//! ### Actor-Style Hub
//! Presence and map membership are owned by a single task. All other tasks
//! talk to it through [`hub::HubHandle`], which never blocks. This removes any
//! locking around the membership tables and gives a total order to
//! register/unregister/broadcast.
//!
//! ### Two Pumps Per Connection
//! Reading and writing run as separate tasks tied together by one
//! cancellation token. The write pump also sends keepalive pings; the read
//! pump closes the connection if nothing arrives within the pong deadline.
//!
//! ### Narrow Collaborators
//! Persistence, accounts and the economy live elsewhere. The core only needs
//! the [`world::WorldStore`], [`world::Economy`] and [`auth::Authenticator`]
//! traits; [`memory::InMemoryWorld`] implements the first two for the
//! standalone binary and the tests.
//!
//! ## Module Organization
//!
//! - `connection`: per-client handle, read pump and write pump
//! - `presence`: player to connection directory
//! - `map_groups`: per-map membership for scoped broadcasts
//! - `hub`: the dispatcher loop and its handle
//! - `clock`: world clock scheduler and its hooks
//! - `actions`: move and interact processors
//! - `world`, `memory`: collaborator contracts and the in-process store
//! - `auth`, `config`, `error`, `network`: the surrounding plumbing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::auth::StaticTokens;
//! use server::config::ServerConfig;
//! use server::hub::Hub;
//! use server::memory::InMemoryWorld;
//! use server::network::NetworkServer;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let world = Arc::new(InMemoryWorld::new());
//!     world.seed_village()?;
//!
//!     let (hub, handle, _queues) = Hub::new(config.connection.event_queue);
//!     hub.spawn();
//!
//!     let server = NetworkServer::bind(
//!         &config.bind_addr(),
//!         handle,
//!         world,
//!         Arc::new(StaticTokens::default()),
//!         &config,
//!     )
//!     .await?;
//!     server.run(CancellationToken::new()).await;
//!
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod auth;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod hub;
pub mod map_groups;
pub mod memory;
pub mod network;
pub mod presence;
pub mod world;
