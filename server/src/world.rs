//! World records and the collaborator contracts the real-time core consumes
//!
//! Persistence lives outside this crate. The core only needs a handful of
//! synchronous lookups and updates, each assumed to complete or fail
//! atomically; a failure simply rejects the action that needed it.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use shared::{Direction, GameClock, MapId, NpcId, ObjectId, ObjectState, PlayerId};

/// Growth stages a growing object passes through before it is ripe
pub const MAX_GROWTH_STAGE: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameMap {
    pub id: MapId,
    pub name: String,
    pub width: i32,
    pub height: i32,
}

impl GameMap {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.width && y >= 0 && y < self.height
    }

    pub fn center(&self) -> (i32, i32) {
        (self.width / 2, self.height / 2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerPosition {
    pub player_id: PlayerId,
    pub map_id: MapId,
    pub pos_x: i32,
    pub pos_y: i32,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Tree,
    Rock,
    Chest,
    Server,
    Workstation,
    CodeBlock,
    BugHive,
}

/// How an interaction with an object is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectCategory {
    Harvestable,
    Minable,
    Container,
    Terminal,
}

impl ObjectKind {
    pub fn category(self) -> Option<ObjectCategory> {
        match self {
            ObjectKind::Tree => Some(ObjectCategory::Harvestable),
            ObjectKind::Rock => Some(ObjectCategory::Minable),
            ObjectKind::Chest => Some(ObjectCategory::Container),
            ObjectKind::Server => Some(ObjectCategory::Terminal),
            ObjectKind::Workstation | ObjectKind::CodeBlock | ObjectKind::BugHive => None,
        }
    }

    pub fn blocks_movement(self) -> bool {
        matches!(self, ObjectKind::Tree | ObjectKind::Rock)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldObject {
    pub id: ObjectId,
    pub map_id: MapId,
    pub kind: ObjectKind,
    pub pos_x: i32,
    pub pos_y: i32,
    pub state: ObjectState,
    pub is_active: bool,
}

impl WorldObject {
    pub fn new(map_id: MapId, kind: ObjectKind, pos_x: i32, pos_y: i32) -> Self {
        Self {
            id: ObjectId::new_v4(),
            map_id,
            kind,
            pos_x,
            pos_y,
            state: ObjectState::default(),
            is_active: true,
        }
    }

    pub fn is_growing(&self) -> bool {
        self.is_active
            && self
                .state
                .growth_stage
                .map_or(false, |stage| stage < MAX_GROWTH_STAGE)
    }
}

/// Where an NPC should stand from a given in-game hour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpcSchedule {
    pub npc_id: NpcId,
    pub hour: u8,
    pub map_id: MapId,
    pub pos_x: i32,
    pub pos_y: i32,
    pub direction: Direction,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpcPosition {
    pub npc_id: NpcId,
    pub map_id: MapId,
    pub pos_x: i32,
    pub pos_y: i32,
    pub direction: Direction,
}

pub trait WorldStore: Send + Sync {
    fn player_position(&self, player: PlayerId) -> Result<PlayerPosition, StoreError>;

    fn set_player_position(&self, position: &PlayerPosition) -> Result<(), StoreError>;

    fn map_by_id(&self, id: MapId) -> Result<GameMap, StoreError>;

    fn map_by_name(&self, name: &str) -> Result<GameMap, StoreError>;

    /// Active and inactive objects occupying a tile
    fn objects_at(&self, map: MapId, x: i32, y: i32) -> Result<Vec<WorldObject>, StoreError>;

    fn update_object(&self, object: &WorldObject) -> Result<(), StoreError>;

    fn growing_objects(&self) -> Result<Vec<WorldObject>, StoreError>;

    fn npc_schedules_at(&self, hour: u8) -> Result<Vec<NpcSchedule>, StoreError>;

    fn set_npc_position(&self, position: &NpcPosition) -> Result<(), StoreError>;

    /// Current clock, created with default values if none exists yet
    fn clock(&self) -> Result<GameClock, StoreError>;

    fn set_clock(&self, clock: &GameClock) -> Result<(), StoreError>;
}

/// Reward side of interactions; idempotency is the implementor's concern
pub trait Economy: Send + Sync {
    fn grant_item(&self, player: PlayerId, item: &str, quantity: u32) -> Result<(), StoreError>;

    fn grant_currency_and_experience(
        &self,
        player: PlayerId,
        coins: u32,
        experience: u32,
    ) -> Result<(), StoreError>;
}
