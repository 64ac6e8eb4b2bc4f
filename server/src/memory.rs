//! In-process world and economy store
//!
//! Backs the standalone binary and the tests. Everything lives behind one
//! mutex; the clock can additionally be persisted to a bincode snapshot file
//! so world time survives restarts.

use crate::error::StoreError;
use crate::world::{
    Economy, GameMap, NpcPosition, NpcSchedule, ObjectKind, PlayerPosition, WorldObject,
    WorldStore,
};
use log::{debug, info};
use shared::{Direction, GameClock, MapId, NpcId, ObjectId, PlayerId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    maps: HashMap<MapId, GameMap>,
    positions: HashMap<PlayerId, PlayerPosition>,
    objects: HashMap<ObjectId, WorldObject>,
    schedules: Vec<NpcSchedule>,
    npcs: HashMap<NpcId, NpcPosition>,
    clock: Option<GameClock>,
    inventories: HashMap<PlayerId, HashMap<String, u32>>,
    wallets: HashMap<PlayerId, Wallet>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Wallet {
    pub coins: u32,
    pub experience: u32,
}

#[derive(Debug, Default)]
pub struct InMemoryWorld {
    tables: Mutex<Tables>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        Self {
            tables: Mutex::default(),
            snapshot_path: Some(path.into()),
        }
    }

    /// A small starter world: the village with a few resources and an NPC,
    /// plus an empty mine
    pub fn seed_village(&self) -> Result<(MapId, MapId), StoreError> {
        let village = self.add_map("village", 40, 30)?;
        let mine = self.add_map("code_mine", 20, 20)?;

        self.add_object(WorldObject::new(village, ObjectKind::Tree, 10, 10))?;
        self.add_object(WorldObject::new(village, ObjectKind::Tree, 11, 10))?;
        self.add_object(WorldObject::new(village, ObjectKind::Rock, 15, 12))?;
        self.add_object(WorldObject::new(village, ObjectKind::Chest, 20, 5))?;
        self.add_object(WorldObject::new(village, ObjectKind::Server, 25, 8))?;
        self.add_object(WorldObject::new(village, ObjectKind::Workstation, 26, 8))?;

        let mut sprout = WorldObject::new(village, ObjectKind::CodeBlock, 5, 5);
        sprout.state.growth_stage = Some(1);
        self.add_object(sprout)?;

        self.add_object(WorldObject::new(mine, ObjectKind::Rock, 3, 3))?;
        self.add_object(WorldObject::new(mine, ObjectKind::Rock, 4, 3))?;

        let mayor = NpcId::new_v4();
        self.add_schedule(NpcSchedule {
            npc_id: mayor,
            hour: 8,
            map_id: village,
            pos_x: 12,
            pos_y: 14,
            direction: Direction::Down,
            action: "work".to_string(),
        })?;
        self.add_schedule(NpcSchedule {
            npc_id: mayor,
            hour: 18,
            map_id: village,
            pos_x: 3,
            pos_y: 3,
            direction: Direction::Left,
            action: "rest".to_string(),
        })?;

        info!("Seeded village world");
        Ok((village, mine))
    }

    pub fn add_map(&self, name: &str, width: i32, height: i32) -> Result<MapId, StoreError> {
        let map = GameMap {
            id: MapId::new_v4(),
            name: name.to_string(),
            width,
            height,
        };
        let id = map.id;
        self.tables()?.maps.insert(id, map);
        Ok(id)
    }

    pub fn add_object(&self, object: WorldObject) -> Result<ObjectId, StoreError> {
        let id = object.id;
        self.tables()?.objects.insert(id, object);
        Ok(id)
    }

    pub fn add_schedule(&self, schedule: NpcSchedule) -> Result<(), StoreError> {
        self.tables()?.schedules.push(schedule);
        Ok(())
    }

    pub fn object(&self, id: ObjectId) -> Result<WorldObject, StoreError> {
        self.tables()?
            .objects
            .get(&id)
            .cloned()
            .ok_or(StoreError::ObjectNotFound)
    }

    pub fn npc_position(&self, id: NpcId) -> Result<Option<NpcPosition>, StoreError> {
        Ok(self.tables()?.npcs.get(&id).cloned())
    }

    pub fn inventory(&self, player: PlayerId) -> Result<HashMap<String, u32>, StoreError> {
        Ok(self
            .tables()?
            .inventories
            .get(&player)
            .cloned()
            .unwrap_or_default())
    }

    pub fn wallet(&self, player: PlayerId) -> Result<Wallet, StoreError> {
        Ok(self
            .tables()?
            .wallets
            .get(&player)
            .copied()
            .unwrap_or_default())
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn load_snapshot(path: &Path) -> Result<Option<GameClock>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        let clock: GameClock = bincode::deserialize(&bytes)?;
        if !clock.is_valid() {
            return Err(StoreError::InvalidClock(clock));
        }
        Ok(Some(clock))
    }

    fn write_snapshot(&self, clock: &GameClock) -> Result<(), StoreError> {
        if let Some(path) = &self.snapshot_path {
            let bytes = bincode::serialize(clock)?;
            fs::write(path, bytes)?;
            debug!("Persisted clock snapshot to {}", path.display());
        }
        Ok(())
    }
}

impl WorldStore for InMemoryWorld {
    fn player_position(&self, player: PlayerId) -> Result<PlayerPosition, StoreError> {
        self.tables()?
            .positions
            .get(&player)
            .cloned()
            .ok_or(StoreError::PositionNotFound(player))
    }

    fn set_player_position(&self, position: &PlayerPosition) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if !tables.maps.contains_key(&position.map_id) {
            return Err(StoreError::MapNotFound);
        }
        tables.positions.insert(position.player_id, position.clone());
        Ok(())
    }

    fn map_by_id(&self, id: MapId) -> Result<GameMap, StoreError> {
        self.tables()?
            .maps
            .get(&id)
            .cloned()
            .ok_or(StoreError::MapNotFound)
    }

    fn map_by_name(&self, name: &str) -> Result<GameMap, StoreError> {
        self.tables()?
            .maps
            .values()
            .find(|map| map.name == name)
            .cloned()
            .ok_or(StoreError::MapNotFound)
    }

    fn objects_at(&self, map: MapId, x: i32, y: i32) -> Result<Vec<WorldObject>, StoreError> {
        Ok(self
            .tables()?
            .objects
            .values()
            .filter(|o| o.map_id == map && o.pos_x == x && o.pos_y == y)
            .cloned()
            .collect())
    }

    fn update_object(&self, object: &WorldObject) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        match tables.objects.get_mut(&object.id) {
            Some(stored) => {
                *stored = object.clone();
                Ok(())
            }
            None => Err(StoreError::ObjectNotFound),
        }
    }

    fn growing_objects(&self) -> Result<Vec<WorldObject>, StoreError> {
        Ok(self
            .tables()?
            .objects
            .values()
            .filter(|o| o.is_growing())
            .cloned()
            .collect())
    }

    fn npc_schedules_at(&self, hour: u8) -> Result<Vec<NpcSchedule>, StoreError> {
        Ok(self
            .tables()?
            .schedules
            .iter()
            .filter(|s| s.hour == hour)
            .cloned()
            .collect())
    }

    fn set_npc_position(&self, position: &NpcPosition) -> Result<(), StoreError> {
        self.tables()?
            .npcs
            .insert(position.npc_id, position.clone());
        Ok(())
    }

    fn clock(&self) -> Result<GameClock, StoreError> {
        let mut tables = self.tables()?;
        if let Some(clock) = &tables.clock {
            return Ok(clock.clone());
        }

        let clock = match &self.snapshot_path {
            Some(path) => Self::load_snapshot(path)?.unwrap_or_default(),
            None => GameClock::default(),
        };
        tables.clock = Some(clock.clone());
        drop(tables);

        self.write_snapshot(&clock)?;
        Ok(clock)
    }

    fn set_clock(&self, clock: &GameClock) -> Result<(), StoreError> {
        self.write_snapshot(clock)?;
        self.tables()?.clock = Some(clock.clone());
        Ok(())
    }
}

impl Economy for InMemoryWorld {
    fn grant_item(&self, player: PlayerId, item: &str, quantity: u32) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        *tables
            .inventories
            .entry(player)
            .or_default()
            .entry(item.to_string())
            .or_insert(0) += quantity;
        Ok(())
    }

    fn grant_currency_and_experience(
        &self,
        player: PlayerId,
        coins: u32,
        experience: u32,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let wallet = tables.wallets.entry(player).or_default();
        wallet.coins = wallet.coins.saturating_add(coins);
        wallet.experience = wallet.experience.saturating_add(experience);
        Ok(())
    }
}
