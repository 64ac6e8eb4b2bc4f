//! Listener and websocket handshake
//!
//! Every accepted TCP stream gets its own task. The bearer token is read from
//! the `token` query parameter during the upgrade; an absent or invalid token
//! fails the handshake with `401` and the player is never registered.

use crate::auth::{token_from_query, Authenticator};
use crate::config::{ConnectionConfig, ServerConfig};
use crate::connection::{serve, Connection};
use crate::error::StoreError;
use crate::hub::HubHandle;
use crate::world::{PlayerPosition, WorldStore};
use log::{debug, error, info, warn};
use shared::{Direction, PlayerId};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;

/// Everything a session task needs, shared across all of them
struct SessionContext {
    hub: HubHandle,
    world: Arc<dyn WorldStore>,
    auth: Arc<dyn Authenticator>,
    settings: ConnectionConfig,
    spawn_map: String,
    next_id: AtomicU64,
}

pub struct NetworkServer {
    listener: TcpListener,
    context: Arc<SessionContext>,
}

impl NetworkServer {
    pub async fn bind(
        addr: &str,
        hub: HubHandle,
        world: Arc<dyn WorldStore>,
        auth: Arc<dyn Authenticator>,
        config: &ServerConfig,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            context: Arc::new(SessionContext {
                hub,
                world,
                auth,
                settings: config.connection.clone(),
                spawn_map: config.spawn_map.clone(),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let context = Arc::clone(&self.context);
                        tokio::spawn(handle_socket(stream, peer, context));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }
        info!("Listener stopped");
    }
}

fn unauthorized() -> ErrorResponse {
    let mut response = ErrorResponse::new(None);
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
}

async fn handle_socket(stream: TcpStream, peer: SocketAddr, context: Arc<SessionContext>) {
    let mut authenticated: Option<PlayerId> = None;

    let check_token = |request: &Request, response: Response| {
        let token = token_from_query(request.uri().query()).unwrap_or_default();
        match context.auth.validate_connection_token(&token) {
            Ok(player_id) => {
                authenticated = Some(player_id);
                Ok(response)
            }
            Err(e) => {
                warn!("Rejected connection from {}: {}", peer, e);
                Err(unauthorized())
            }
        }
    };

    let ws_config = WebSocketConfig {
        max_message_size: Some(context.settings.max_message_size),
        max_frame_size: Some(context.settings.max_message_size),
        ..Default::default()
    };

    let mut ws = match tokio_tungstenite::accept_hdr_async_with_config(
        stream,
        check_token,
        Some(ws_config),
    )
    .await
    {
        Ok(ws) => ws,
        Err(e) => {
            debug!("Handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let Some(player_id) = authenticated else {
        return;
    };

    let position = match ensure_position(&context, player_id) {
        Ok(position) => position,
        Err(e) => {
            warn!("No usable position for {}: {}", player_id, e);
            let _ = ws.close(None).await;
            return;
        }
    };

    let id = context.next_id.fetch_add(1, Ordering::Relaxed);
    let (connection, outbound) = Connection::new(id, player_id, context.settings.outbound_queue);
    info!("Player {} connected from {} as connection {}", player_id, peer, id);

    context.hub.register(connection.clone());
    context.hub.join_map(player_id, position.map_id);

    serve(
        ws,
        connection,
        outbound,
        context.hub.clone(),
        context.settings.clone(),
    )
    .await;
}

/// Returns the stored position, placing first-time players in the middle of
/// the spawn map
fn ensure_position(
    context: &SessionContext,
    player_id: PlayerId,
) -> Result<PlayerPosition, StoreError> {
    match context.world.player_position(player_id) {
        Ok(position) => Ok(position),
        Err(StoreError::PositionNotFound(_)) => {
            let map = context.world.map_by_name(&context.spawn_map)?;
            let (pos_x, pos_y) = map.center();
            let position = PlayerPosition {
                player_id,
                map_id: map.id,
                pos_x,
                pos_y,
                direction: Direction::Down,
            };
            context.world.set_player_position(&position)?;
            info!("Spawned {} on {} at ({}, {})", player_id, map.name, pos_x, pos_y);
            Ok(position)
        }
        Err(e) => Err(e),
    }
}
