//! Central dispatcher for the real-time layer
//!
//! The hub is an actor: a single task owns the presence directory and the map
//! groups and applies every register/unregister/broadcast request in arrival
//! order. Everything else talks to it through a cloneable [`HubHandle`] whose
//! methods never block, regardless of how slow any recipient is.
//!
//! Connection lifecycle as seen by the hub:
//!
//! ```text
//! Connecting --register--> Registered --unregister/saturation--> Unregistering --> Closed
//! ```
//!
//! Delivery is at-most-once per attempt. A recipient whose outbound queue is
//! full is treated as unresponsive and torn down on the spot.
//!
//! The inbox is split in two. Lifecycle commands (register, unregister,
//! shutdown) travel on an unbounded channel that grows only with the number
//! of sockets and are always handled first. Sends, map membership changes and
//! queries share a bounded channel; when it is full, sends and membership
//! changes are dropped and logged, while queries wait for room.

use crate::connection::{Connection, EnqueueError, Frame};
use crate::map_groups::MapGroups;
use crate::presence::PresenceDirectory;
use log::{debug, error, info, warn};
use shared::{Direction, MapId, PlayerId, ServerEvent};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A player's intent to step onto a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveEvent {
    pub player_id: PlayerId,
    pub pos_x: i32,
    pub pos_y: i32,
    pub direction: Direction,
}

/// A player's intent to use whatever occupies a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractEvent {
    pub player_id: PlayerId,
    pub target_x: i32,
    pub target_y: i32,
}

/// Consume-only side of the gameplay event queues
#[derive(Debug)]
pub struct ActionQueues {
    pub moves: mpsc::Receiver<MoveEvent>,
    pub interactions: mpsc::Receiver<InteractEvent>,
}

/// Default capacity of the hub's bounded inbox
pub const DEFAULT_INBOX_CAPACITY: usize = 4096;

#[derive(Debug)]
enum Lifecycle {
    Register(Connection),
    Unregister(Connection),
    Shutdown,
}

#[derive(Debug)]
enum HubCommand {
    SendToPlayer { player_id: PlayerId, frame: Frame },
    SendToAll { frame: Frame },
    BroadcastToMap { map_id: MapId, frame: Frame },
    JoinMap { player_id: PlayerId, map_id: MapId },
    LeaveMap { player_id: PlayerId, map_id: MapId },
    OnlinePlayers(oneshot::Sender<Vec<PlayerId>>),
    IsOnline(PlayerId, oneshot::Sender<bool>),
    MapMembers(MapId, oneshot::Sender<Option<Vec<PlayerId>>>),
}

impl HubCommand {
    fn name(&self) -> &'static str {
        match self {
            HubCommand::SendToPlayer { .. } => "send_to_player",
            HubCommand::SendToAll { .. } => "send_to_all",
            HubCommand::BroadcastToMap { .. } => "broadcast_to_map",
            HubCommand::JoinMap { .. } => "join_map",
            HubCommand::LeaveMap { .. } => "leave_map",
            HubCommand::OnlinePlayers(_) => "online_players",
            HubCommand::IsOnline(..) => "is_online",
            HubCommand::MapMembers(..) => "map_members",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HubHandle {
    lifecycle: mpsc::UnboundedSender<Lifecycle>,
    commands: mpsc::Sender<HubCommand>,
    moves: mpsc::Sender<MoveEvent>,
    interactions: mpsc::Sender<InteractEvent>,
}

impl HubHandle {
    pub fn register(&self, connection: Connection) {
        self.lifecycle_command(Lifecycle::Register(connection));
    }

    /// Safe to call any number of times from any failure path
    pub fn unregister(&self, connection: Connection) {
        self.lifecycle_command(Lifecycle::Unregister(connection));
    }

    /// Silently dropped if the player is not connected
    pub fn send_to_player(&self, player_id: PlayerId, event: &ServerEvent) {
        if let Some(frame) = encode(event) {
            self.submit(HubCommand::SendToPlayer { player_id, frame });
        }
    }

    pub fn send_to_all(&self, event: &ServerEvent) {
        if let Some(frame) = encode(event) {
            self.submit(HubCommand::SendToAll { frame });
        }
    }

    pub fn broadcast_to_map(&self, map_id: MapId, event: &ServerEvent) {
        if let Some(frame) = encode(event) {
            self.submit(HubCommand::BroadcastToMap { map_id, frame });
        }
    }

    /// Puts the player's live connection on `map_id`, leaving its previous map
    pub fn join_map(&self, player_id: PlayerId, map_id: MapId) {
        self.submit(HubCommand::JoinMap { player_id, map_id });
    }

    pub fn leave_map(&self, player_id: PlayerId, map_id: MapId) {
        self.submit(HubCommand::LeaveMap { player_id, map_id });
    }

    /// Queues a move for the move processor; dropped if the queue is full
    pub fn submit_move(&self, event: MoveEvent) {
        match self.moves.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Player move queue is full, dropping move from {}", event.player_id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Move processor is gone, dropping move");
            }
        }
    }

    /// Queues an interaction for the interact processor; dropped if the queue is full
    pub fn submit_interact(&self, event: InteractEvent) {
        match self.interactions.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    "Player interact queue is full, dropping interaction from {}",
                    event.player_id
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Interact processor is gone, dropping interaction");
            }
        }
    }

    pub async fn online_players(&self) -> Vec<PlayerId> {
        let (tx, rx) = oneshot::channel();
        self.query(HubCommand::OnlinePlayers(tx)).await;
        rx.await.unwrap_or_default()
    }

    pub async fn is_online(&self, player_id: PlayerId) -> bool {
        let (tx, rx) = oneshot::channel();
        self.query(HubCommand::IsOnline(player_id, tx)).await;
        rx.await.unwrap_or(false)
    }

    /// Players currently in a map group, `None` if the group does not exist
    pub async fn map_members(&self, map_id: MapId) -> Option<Vec<PlayerId>> {
        let (tx, rx) = oneshot::channel();
        self.query(HubCommand::MapMembers(map_id, tx)).await;
        rx.await.ok().flatten()
    }

    /// Closes every connection and stops the hub loop
    pub fn shutdown(&self) {
        self.lifecycle_command(Lifecycle::Shutdown);
    }

    fn lifecycle_command(&self, command: Lifecycle) {
        if self.lifecycle.send(command).is_err() {
            debug!("Hub is stopped, dropping lifecycle command");
        }
    }

    fn submit(&self, command: HubCommand) {
        match self.commands.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                warn!("Hub inbox is full, dropping {}", command.name());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Hub is stopped, dropping command");
            }
        }
    }

    async fn query(&self, command: HubCommand) {
        if self.commands.send(command).await.is_err() {
            debug!("Hub is stopped, dropping query");
        }
    }
}

fn encode(event: &ServerEvent) -> Option<Frame> {
    match event.encode() {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            error!("Failed to serialize {} event: {}", event.kind(), e);
            None
        }
    }
}

pub struct Hub {
    presence: PresenceDirectory,
    groups: MapGroups,
    lifecycle: mpsc::UnboundedReceiver<Lifecycle>,
    commands: mpsc::Receiver<HubCommand>,
    /// Status changes waiting to be fanned out once the current command is done
    pending_status: VecDeque<(PlayerId, bool)>,
}

impl Hub {
    /// Builds the hub together with its handle and the gameplay queues,
    /// each bounded at `event_capacity`
    pub fn new(event_capacity: usize) -> (Self, HubHandle, ActionQueues) {
        Self::with_capacity(event_capacity, DEFAULT_INBOX_CAPACITY)
    }

    pub fn with_capacity(
        event_capacity: usize,
        inbox_capacity: usize,
    ) -> (Self, HubHandle, ActionQueues) {
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(inbox_capacity);
        let (move_tx, move_rx) = mpsc::channel(event_capacity);
        let (interact_tx, interact_rx) = mpsc::channel(event_capacity);

        let hub = Self {
            presence: PresenceDirectory::new(),
            groups: MapGroups::new(),
            lifecycle: lifecycle_rx,
            commands: command_rx,
            pending_status: VecDeque::new(),
        };

        let handle = HubHandle {
            lifecycle: lifecycle_tx,
            commands: command_tx,
            moves: move_tx,
            interactions: interact_tx,
        };

        let queues = ActionQueues {
            moves: move_rx,
            interactions: interact_rx,
        };

        (hub, handle, queues)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until shut down or until every handle is dropped
    pub async fn run(mut self) {
        info!("Hub started");

        loop {
            tokio::select! {
                biased;
                Some(event) = self.lifecycle.recv() => {
                    if !self.handle_lifecycle(event) {
                        break;
                    }
                }
                Some(command) = self.commands.recv() => self.handle_command(command),
                else => break,
            }
            self.flush_status();
        }

        for connection in self.presence.drain() {
            self.groups.leave_current(connection.id());
            connection.close();
        }

        info!("Hub stopped");
    }

    fn handle_lifecycle(&mut self, event: Lifecycle) -> bool {
        match event {
            Lifecycle::Register(connection) => self.register(connection),
            Lifecycle::Unregister(connection) => self.unregister(&connection),
            Lifecycle::Shutdown => {
                info!("Hub shutting down with {} connections", self.presence.len());
                return false;
            }
        }
        true
    }

    fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::SendToPlayer { player_id, frame } => {
                if let Some(connection) = self.presence.get(&player_id).cloned() {
                    self.deliver(&connection, frame);
                }
            }
            HubCommand::SendToAll { frame } => {
                let targets: Vec<Connection> = self.presence.connections().cloned().collect();
                self.fan_out(targets, frame);
            }
            HubCommand::BroadcastToMap { map_id, frame } => {
                let targets: Vec<Connection> = self.groups.members(map_id).cloned().collect();
                self.fan_out(targets, frame);
            }
            HubCommand::JoinMap { player_id, map_id } => {
                if let Some(connection) = self.presence.get(&player_id).cloned() {
                    if let Some(previous) = self.groups.join(&connection, map_id) {
                        debug!("Player {} moved from map {} to {}", player_id, previous, map_id);
                    }
                }
            }
            HubCommand::LeaveMap { player_id, map_id } => {
                if let Some(connection) = self.presence.get(&player_id) {
                    self.groups.leave(connection.id(), map_id);
                }
            }
            HubCommand::OnlinePlayers(reply) => {
                let _ = reply.send(self.presence.players());
            }
            HubCommand::IsOnline(player_id, reply) => {
                let _ = reply.send(self.presence.contains(&player_id));
            }
            HubCommand::MapMembers(map_id, reply) => {
                let members = self
                    .groups
                    .contains_group(map_id)
                    .then(|| self.groups.members(map_id).map(|c| c.player_id()).collect());
                let _ = reply.send(members);
            }
        }
    }

    fn register(&mut self, connection: Connection) {
        if connection.is_closed() {
            debug!("Ignoring registration of closed connection {}", connection.id());
            return;
        }

        let player_id = connection.player_id();
        if let Some(previous) = self.presence.insert(connection.clone()) {
            info!(
                "Player {} reconnected, closing connection {}",
                player_id,
                previous.id()
            );
            self.groups.leave_current(previous.id());
            previous.close();
        }

        info!("Client connected: {} (connection {})", player_id, connection.id());
        self.pending_status.push_back((player_id, true));
    }

    fn unregister(&mut self, connection: &Connection) {
        self.groups.leave_current(connection.id());
        connection.close();

        if self.presence.remove(connection) {
            info!("Client disconnected: {}", connection.player_id());
            self.pending_status.push_back((connection.player_id(), false));
        }
    }

    fn fan_out(&mut self, targets: Vec<Connection>, frame: Frame) {
        for connection in targets {
            self.deliver(&connection, Arc::clone(&frame));
        }
    }

    fn deliver(&mut self, connection: &Connection, frame: Frame) {
        match connection.try_enqueue(frame) {
            Ok(()) => {}
            Err(EnqueueError::Full) => {
                warn!(
                    "Outbound queue full for {}, dropping connection {}",
                    connection.player_id(),
                    connection.id()
                );
                self.unregister(connection);
            }
            Err(EnqueueError::Closed) => self.unregister(connection),
        }
    }

    /// Tells everyone else about presence changes; saturation found while
    /// doing so only queues further changes, so this never recurses
    fn flush_status(&mut self) {
        while let Some((player_id, is_online)) = self.pending_status.pop_front() {
            let Some(frame) = encode(&ServerEvent::UserStatus {
                user_id: player_id,
                is_online,
            }) else {
                continue;
            };

            let targets: Vec<Connection> = self
                .presence
                .connections()
                .filter(|c| c.player_id() != player_id)
                .cloned()
                .collect();
            self.fan_out(targets, frame);
        }
    }
}
