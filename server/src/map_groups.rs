//! Per-map broadcast membership
//!
//! A connection views exactly one map at a time. `join` therefore leaves the
//! previous group first, so broadcasts never leak across maps after a map
//! change. Empty groups are deleted immediately.

use crate::connection::{Connection, ConnectionId};
use shared::MapId;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MapGroups {
    groups: HashMap<MapId, HashMap<ConnectionId, Connection>>,
    membership: HashMap<ConnectionId, MapId>,
}

impl MapGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the connection to `map`, returning the map it was moved off, if any
    pub fn join(&mut self, connection: &Connection, map: MapId) -> Option<MapId> {
        let previous = match self.membership.get(&connection.id()) {
            Some(current) if *current == map => return None,
            Some(current) => Some(*current),
            None => None,
        };

        if let Some(previous) = previous {
            self.leave(connection.id(), previous);
        }

        self.groups
            .entry(map)
            .or_default()
            .insert(connection.id(), connection.clone());
        self.membership.insert(connection.id(), map);

        previous
    }

    /// Removes the connection from `map`; a no-op if it is not a member there
    pub fn leave(&mut self, connection: ConnectionId, map: MapId) -> bool {
        let Some(members) = self.groups.get_mut(&map) else {
            return false;
        };

        let removed = members.remove(&connection).is_some();
        if members.is_empty() {
            self.groups.remove(&map);
        }

        if removed && self.membership.get(&connection) == Some(&map) {
            self.membership.remove(&connection);
        }

        removed
    }

    /// Removes the connection from whatever map it is on
    pub fn leave_current(&mut self, connection: ConnectionId) -> Option<MapId> {
        let map = *self.membership.get(&connection)?;
        self.leave(connection, map);
        Some(map)
    }

    pub fn map_of(&self, connection: ConnectionId) -> Option<MapId> {
        self.membership.get(&connection).copied()
    }

    pub fn members(&self, map: MapId) -> impl Iterator<Item = &Connection> {
        self.groups.get(&map).into_iter().flat_map(|members| members.values())
    }

    pub fn contains_group(&self, map: MapId) -> bool {
        self.groups.contains_key(&map)
    }

    pub fn member_count(&self, map: MapId) -> usize {
        self.groups.get(&map).map_or(0, |members| members.len())
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}
