//! Websocket session with the real-time server

use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use shared::{ClientCommand, Direction, InteractPayload, MovePayload, ProtocolError, ServerEvent};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("connection closed by server")]
    Closed,
    #[error("timed out waiting for the server")]
    Timeout,
}

pub struct ValleyClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ValleyClient {
    /// Connects to `server` (`host:port`) and authenticates with `token`
    pub async fn connect(server: &str, token: &str) -> Result<Self, ClientError> {
        let url = format!("ws://{}/ws?token={}", server, token);
        let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
        info!("Connected to {}", server);
        Ok(Self { ws })
    }

    pub async fn send(&mut self, command: ClientCommand) -> Result<(), ClientError> {
        let text = command.encode()?;
        self.send_raw(text).await
    }

    /// Sends a text frame exactly as given
    pub async fn send_raw(&mut self, text: impl Into<String>) -> Result<(), ClientError> {
        self.ws.send(Message::Text(text.into())).await?;
        Ok(())
    }

    pub async fn ping(&mut self) -> Result<(), ClientError> {
        self.send(ClientCommand::Ping).await
    }

    pub async fn move_to(
        &mut self,
        pos_x: i32,
        pos_y: i32,
        direction: Direction,
    ) -> Result<(), ClientError> {
        self.send(ClientCommand::Move(MovePayload {
            pos_x,
            pos_y,
            direction,
        }))
        .await
    }

    pub async fn interact(&mut self, target_x: i32, target_y: i32) -> Result<(), ClientError> {
        self.send(ClientCommand::Interact(InteractPayload { target_x, target_y }))
            .await
    }

    /// Next application event; control frames are handled transparently
    pub async fn next_event(&mut self) -> Result<ServerEvent, ClientError> {
        loop {
            let message = match self.ws.next().await {
                Some(message) => message?,
                None => return Err(ClientError::Closed),
            };

            match message {
                Message::Text(text) => return Ok(ServerEvent::decode(&text)?),
                Message::Close(_) => return Err(ClientError::Closed),
                other => debug!("Skipping {:?} frame", other),
            }
        }
    }

    pub async fn next_event_timeout(&mut self, wait: Duration) -> Result<ServerEvent, ClientError> {
        tokio::time::timeout(wait, self.next_event())
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    /// Skips events until one matches, giving up after `wait` in total
    pub async fn wait_for<F>(
        &mut self,
        mut matches: F,
        wait: Duration,
    ) -> Result<ServerEvent, ClientError>
    where
        F: FnMut(&ServerEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let event = tokio::time::timeout_at(deadline, self.next_event())
                .await
                .map_err(|_| ClientError::Timeout)??;
            if matches(&event) {
                return Ok(event);
            }
            debug!("Skipping {} event", event.kind());
        }
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.ws.close(None).await?;
        Ok(())
    }
}
