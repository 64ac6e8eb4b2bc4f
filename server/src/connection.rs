//! One live client link: a bounded outbound queue plus a read and a write pump
//!
//! The hub only ever sees the [`Connection`] handle. The socket itself is
//! owned by the two pumps spawned from [`serve`], which share a cancellation
//! token so that whichever side fails first stops the other.

use crate::config::ConnectionConfig;
use crate::hub::{HubHandle, InteractEvent, MoveEvent};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::{ClientCommand, PlayerId, ServerEvent};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

pub type ConnectionId = u64;

/// A serialized outbound event, shared between every recipient of a broadcast
pub type Frame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    Full,
    Closed,
}

impl fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnqueueError::Full => write!(f, "outbound queue full"),
            EnqueueError::Closed => write!(f, "connection closed"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    id: ConnectionId,
    player_id: PlayerId,
    outbound: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    torn_down: AtomicBool,
}

/// Cheap, cloneable handle to a client link
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Creates the handle and the receiving end of its outbound queue
    pub fn new(
        id: ConnectionId,
        player_id: PlayerId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let connection = Self {
            inner: Arc::new(Inner {
                id,
                player_id,
                outbound,
                cancel: CancellationToken::new(),
                torn_down: AtomicBool::new(false),
            }),
        };
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn player_id(&self) -> PlayerId {
        self.inner.player_id
    }

    pub fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.id == other.inner.id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Signals both pumps to stop; the socket is closed by the write pump
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// True for the first caller only
    fn begin_teardown(&self) -> bool {
        !self.inner.torn_down.swap(true, Ordering::AcqRel)
    }

    /// Queues a frame without waiting
    pub fn try_enqueue(&self, frame: Frame) -> Result<(), EnqueueError> {
        if self.is_closed() {
            return Err(EnqueueError::Closed);
        }
        self.inner.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Queues an event for this connection only. A saturated queue marks the
    /// client as unresponsive and hands it to the hub for removal.
    pub fn send_event(&self, event: &ServerEvent, hub: &HubHandle) -> bool {
        let frame: Frame = match event.encode() {
            Ok(text) => Arc::from(text),
            Err(e) => {
                warn!("Failed to serialize {} event: {}", event.kind(), e);
                return false;
            }
        };

        match self.try_enqueue(frame) {
            Ok(()) => true,
            Err(EnqueueError::Full) => {
                warn!(
                    "Outbound queue full for {}, dropping connection {}",
                    self.player_id(),
                    self.id()
                );
                teardown(self, hub);
                false
            }
            Err(EnqueueError::Closed) => false,
        }
    }
}

/// Stops the pumps and unregisters from the hub, at most once per connection
pub fn teardown(connection: &Connection, hub: &HubHandle) {
    if connection.begin_teardown() {
        connection.close();
        hub.unregister(connection.clone());
    }
}

/// Drives an upgraded socket until either side gives up
///
/// The connection should already be registered with the hub. Returns once
/// both pumps have stopped and the hub has been told to unregister.
pub async fn serve<S>(
    ws: WebSocketStream<S>,
    connection: Connection,
    outbound: mpsc::Receiver<Frame>,
    hub: HubHandle,
    settings: ConnectionConfig,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();

    let writer = tokio::spawn(write_pump(
        sink,
        outbound,
        connection.clone(),
        hub.clone(),
        settings.clone(),
    ));

    read_pump(stream, &connection, &hub, &settings).await;
    teardown(&connection, &hub);

    if let Err(e) = writer.await {
        warn!("Write pump for connection {} failed: {}", connection.id(), e);
    }
    debug!("Connection {} finished", connection.id());
}

async fn write_pump<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbound: mpsc::Receiver<Frame>,
    connection: Connection,
    hub: HubHandle,
    settings: ConnectionConfig,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let cancel = connection.cancel_token();
    let write_wait = settings.write_wait();
    let period = settings.ping_period();
    let mut ping = interval_at(Instant::now() + period, period);

    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => Message::Text(frame.to_string()),
                None => break,
            },
            _ = ping.tick() => Message::Ping(Vec::new()),
        };

        match timeout(write_wait, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("Write to connection {} failed: {}", connection.id(), e);
                break;
            }
            Err(_) => {
                warn!(
                    "Write to connection {} timed out after {:?}",
                    connection.id(),
                    write_wait
                );
                break;
            }
        }
    }

    outbound.close();
    let _ = timeout(write_wait, sink.close()).await;
    teardown(&connection, &hub);
}

async fn read_pump<S>(
    mut stream: SplitStream<WebSocketStream<S>>,
    connection: &Connection,
    hub: &HubHandle,
    settings: &ConnectionConfig,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let cancel = connection.cancel_token();
    let pong_wait = settings.pong_wait();

    loop {
        // Every inbound frame, pongs included, pushes the read deadline out
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = timeout(pong_wait, stream.next()) => next,
        };

        let message = match next {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                debug!("Read from connection {} failed: {}", connection.id(), e);
                break;
            }
            Ok(None) => break,
            Err(_) => {
                info!(
                    "No traffic from {} within {:?}, closing",
                    connection.player_id(),
                    pong_wait
                );
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("Non UTF-8 frame from {}", connection.player_id());
                    break;
                }
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };

        match ClientCommand::decode(&text) {
            Ok(command) => handle_command(command, connection, hub),
            Err(e) => {
                warn!("Malformed message from {}: {}", connection.player_id(), e);
                break;
            }
        }
    }
}

fn handle_command(command: ClientCommand, connection: &Connection, hub: &HubHandle) {
    let player_id = connection.player_id();

    match command {
        ClientCommand::Ping => {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            connection.send_event(&ServerEvent::Pong { timestamp }, hub);
        }
        ClientCommand::Move(payload) => hub.submit_move(MoveEvent {
            player_id,
            pos_x: payload.pos_x,
            pos_y: payload.pos_y,
            direction: payload.direction,
        }),
        ClientCommand::Interact(payload) => hub.submit_interact(InteractEvent {
            player_id,
            target_x: payload.target_x,
            target_y: payload.target_y,
        }),
        ClientCommand::Chat(data) => {
            info!("Chat from {}: {}", player_id, data);
        }
        ClientCommand::QuestUpdate(data) => {
            info!("Quest update from {}: {}", player_id, data);
        }
        ClientCommand::Unknown(kind) => {
            warn!("Unknown message type {:?} from {}", kind, player_id);
        }
    }
}
