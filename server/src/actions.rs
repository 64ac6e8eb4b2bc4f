//! Gameplay action processors
//!
//! Each processor drains one of the hub's event queues for the lifetime of
//! the process. Rule violations never escape a processor: they become a
//! scoped error event for the originating player.

use crate::error::ActionError;
use crate::hub::{HubHandle, InteractEvent, MoveEvent};
use crate::world::{Economy, ObjectCategory, PlayerPosition, WorldObject, WorldStore};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use shared::{InteractionOutcome, MapId, PlayerId, ServerEvent};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Chebyshev radius within which a player can use an object
pub const INTERACTION_RANGE: i32 = 1;

const TREE_HP: u32 = 3;
const ROCK_HP: u32 = 2;
const TREE_EXPERIENCE: u32 = 5;
const ROCK_EXPERIENCE: u32 = 8;
const CHEST_COINS: u32 = 25;
const CHEST_LOOT: [&str; 3] = ["Debug Tool", "Refactor Kit", "Unit Test Template"];
const SERVER_OPTIONS: [&str; 3] = ["Deploy", "Monitor", "Scale"];

pub fn within_reach(from: (i32, i32), to: (i32, i32)) -> bool {
    let dx = (from.0 - to.0).abs();
    let dy = (from.1 - to.1).abs();
    dx.max(dy) <= INTERACTION_RANGE
}

pub struct MoveProcessor {
    world: Arc<dyn WorldStore>,
    hub: HubHandle,
}

impl MoveProcessor {
    pub fn new(world: Arc<dyn WorldStore>, hub: HubHandle) -> Self {
        Self { world, hub }
    }

    /// Validates the step against the player's current map and stores it
    pub fn apply(&self, event: &MoveEvent) -> Result<PlayerPosition, ActionError> {
        let current = self.world.player_position(event.player_id)?;
        let map = self.world.map_by_id(current.map_id)?;

        if !map.contains(event.pos_x, event.pos_y) {
            return Err(ActionError::OutOfBounds);
        }

        let blocked = self
            .world
            .objects_at(map.id, event.pos_x, event.pos_y)?
            .iter()
            .any(|object| object.is_active && object.kind.blocks_movement());
        if blocked {
            return Err(ActionError::Blocked);
        }

        let position = PlayerPosition {
            player_id: event.player_id,
            map_id: map.id,
            pos_x: event.pos_x,
            pos_y: event.pos_y,
            direction: event.direction,
        };
        self.world.set_player_position(&position)?;
        Ok(position)
    }

    pub fn process(&self, event: MoveEvent) {
        match self.apply(&event) {
            Ok(position) => {
                self.hub.join_map(position.player_id, position.map_id);
                self.hub.broadcast_to_map(
                    position.map_id,
                    &ServerEvent::PlayerPositionUpdate {
                        user_id: position.player_id,
                        map_id: position.map_id,
                        pos_x: position.pos_x,
                        pos_y: position.pos_y,
                        direction: position.direction,
                    },
                );
            }
            Err(e) => {
                debug!("Move by {} rejected: {}", event.player_id, e);
                self.hub.send_to_player(
                    event.player_id,
                    &ServerEvent::MovementError {
                        error: e.client_message(),
                    },
                );
            }
        }
    }

    pub async fn run(self, mut moves: mpsc::Receiver<MoveEvent>) {
        info!("Move processor started");
        while let Some(event) = moves.recv().await {
            self.process(event);
        }
        info!("Move processor stopped");
    }
}

/// A resolved interaction, ready to be reported and broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub map_id: MapId,
    pub object: WorldObject,
    pub outcome: InteractionOutcome,
}

#[derive(Debug, Clone, PartialEq)]
enum Reward {
    Item(&'static str, u32),
    Wallet { coins: u32, experience: u32 },
}

pub struct InteractProcessor {
    world: Arc<dyn WorldStore>,
    economy: Arc<dyn Economy>,
    hub: HubHandle,
}

impl InteractProcessor {
    pub fn new(world: Arc<dyn WorldStore>, economy: Arc<dyn Economy>, hub: HubHandle) -> Self {
        Self {
            world,
            economy,
            hub,
        }
    }

    pub fn apply(&self, event: &InteractEvent) -> Result<Interaction, ActionError> {
        let position = self.world.player_position(event.player_id)?;
        if !within_reach(
            (position.pos_x, position.pos_y),
            (event.target_x, event.target_y),
        ) {
            return Err(ActionError::TooFar);
        }

        let mut object = self
            .world
            .objects_at(position.map_id, event.target_x, event.target_y)?
            .into_iter()
            .find(|object| object.is_active)
            .ok_or(ActionError::NothingToInteract)?;

        let category = object.kind.category().ok_or(ActionError::NotInteractable)?;
        let (outcome, rewards) = resolve(category, &mut object);

        self.world.update_object(&object)?;
        self.grant(event.player_id, &rewards);

        Ok(Interaction {
            map_id: position.map_id,
            object,
            outcome,
        })
    }

    fn grant(&self, player: PlayerId, rewards: &[Reward]) {
        for reward in rewards {
            let granted = match reward {
                Reward::Item(item, quantity) => self.economy.grant_item(player, item, *quantity),
                Reward::Wallet { coins, experience } => self
                    .economy
                    .grant_currency_and_experience(player, *coins, *experience),
            };
            if let Err(e) = granted {
                warn!("Failed to grant {:?} to {}: {}", reward, player, e);
            }
        }
    }

    pub fn process(&self, event: InteractEvent) {
        match self.apply(&event) {
            Ok(interaction) => {
                self.hub.send_to_player(
                    event.player_id,
                    &ServerEvent::InteractionResult {
                        success: true,
                        result: Some(interaction.outcome),
                        error: None,
                    },
                );
                self.hub.broadcast_to_map(
                    interaction.map_id,
                    &ServerEvent::WorldObjectUpdate {
                        object_id: interaction.object.id,
                        pos_x: interaction.object.pos_x,
                        pos_y: interaction.object.pos_y,
                        state: interaction.object.state,
                    },
                );
            }
            Err(e) => {
                debug!("Interaction by {} rejected: {}", event.player_id, e);
                self.hub.send_to_player(
                    event.player_id,
                    &ServerEvent::InteractionResult {
                        success: false,
                        result: None,
                        error: Some(e.client_message()),
                    },
                );
            }
        }
    }

    pub async fn run(self, mut interactions: mpsc::Receiver<InteractEvent>) {
        info!("Interact processor started");
        while let Some(event) = interactions.recv().await {
            self.process(event);
        }
        info!("Interact processor stopped");
    }
}

fn resolve(category: ObjectCategory, object: &mut WorldObject) -> (InteractionOutcome, Vec<Reward>) {
    match category {
        ObjectCategory::Harvestable => {
            let hp = strike(object, TREE_HP);
            if hp == 0 {
                (
                    InteractionOutcome::TreeChopped {
                        items_gained: vec!["Code Snippet x2".to_string()],
                    },
                    vec![
                        Reward::Item("Code Snippet", 2),
                        Reward::Wallet {
                            coins: 0,
                            experience: TREE_EXPERIENCE,
                        },
                    ],
                )
            } else {
                (InteractionOutcome::TreeDamaged { remaining_hp: hp }, Vec::new())
            }
        }
        ObjectCategory::Minable => {
            let hp = strike(object, ROCK_HP);
            if hp == 0 {
                (
                    InteractionOutcome::RockMined {
                        items_gained: vec!["Raw Data x1".to_string()],
                    },
                    vec![
                        Reward::Item("Raw Data", 1),
                        Reward::Wallet {
                            coins: 0,
                            experience: ROCK_EXPERIENCE,
                        },
                    ],
                )
            } else {
                (InteractionOutcome::RockDamaged { remaining_hp: hp }, Vec::new())
            }
        }
        ObjectCategory::Container => {
            if object.state.is_looted {
                return (
                    InteractionOutcome::ChestEmpty {
                        message: "This chest has already been looted".to_string(),
                    },
                    Vec::new(),
                );
            }

            object.state.is_looted = true;
            let item = CHEST_LOOT
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(CHEST_LOOT[0]);
            (
                InteractionOutcome::ChestOpened {
                    items_gained: vec![format!("{} x1", item)],
                    coins_earned: CHEST_COINS,
                },
                vec![
                    Reward::Item(item, 1),
                    Reward::Wallet {
                        coins: CHEST_COINS,
                        experience: 0,
                    },
                ],
            )
        }
        ObjectCategory::Terminal => (
            InteractionOutcome::ServerAccessed {
                message: "Connected to server. You can now deploy your code!".to_string(),
                options: SERVER_OPTIONS.iter().map(|o| o.to_string()).collect(),
            },
            Vec::new(),
        ),
    }
}

/// Takes one hit point off, deactivating the object when it runs out
fn strike(object: &mut WorldObject, full_hp: u32) -> u32 {
    let hp = object.state.hp.unwrap_or(full_hp).saturating_sub(1);
    object.state.hp = Some(hp);
    if hp == 0 {
        object.is_active = false;
    }
    hp
}
