//! Who is online: player identity to live connection

use crate::connection::Connection;
use shared::PlayerId;
use std::collections::HashMap;

/// At most one live connection per player
///
/// Owned by the hub loop; nothing else mutates it.
#[derive(Debug, Default)]
pub struct PresenceDirectory {
    entries: HashMap<PlayerId, Connection>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `connection` as the player's live link, returning the one it
    /// replaced if the player was already connected
    pub fn insert(&mut self, connection: Connection) -> Option<Connection> {
        self.entries.insert(connection.player_id(), connection)
    }

    /// Removes the entry only if it still belongs to this exact connection,
    /// so a late teardown of a replaced connection cannot evict its successor
    pub fn remove(&mut self, connection: &Connection) -> bool {
        match self.entries.get(&connection.player_id()) {
            Some(current) if current.same_as(connection) => {
                self.entries.remove(&connection.player_id());
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, player: &PlayerId) -> Option<&Connection> {
        self.entries.get(player)
    }

    pub fn contains(&self, player: &PlayerId) -> bool {
        self.entries.contains_key(player)
    }

    pub fn players(&self) -> Vec<PlayerId> {
        self.entries.keys().copied().collect()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.entries.values()
    }

    pub fn drain(&mut self) -> Vec<Connection> {
        self.entries.drain().map(|(_, connection)| connection).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut presence = PresenceDirectory::new();
        let player = PlayerId::new_v4();
        let (connection, _rx) = Connection::new(1, player, 4);

        assert!(presence.insert(connection).is_none());
        assert!(presence.contains(&player));
        assert_eq!(presence.get(&player).map(|c| c.id()), Some(1));
        assert_eq!(presence.players(), vec![player]);
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn test_reconnect_replaces_entry() {
        let mut presence = PresenceDirectory::new();
        let player = PlayerId::new_v4();
        let (first, _rx1) = Connection::new(1, player, 4);
        let (second, _rx2) = Connection::new(2, player, 4);

        presence.insert(first.clone());
        let replaced = presence.insert(second.clone()).unwrap();

        assert_eq!(replaced.id(), 1);
        assert_eq!(presence.len(), 1);
        assert_eq!(presence.get(&player).map(|c| c.id()), Some(2));

        // The stale connection's teardown must not evict its successor
        assert!(!presence.remove(&first));
        assert!(presence.contains(&player));

        assert!(presence.remove(&second));
        assert!(presence.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut presence = PresenceDirectory::new();
        let (connection, _rx) = Connection::new(7, PlayerId::new_v4(), 4);

        presence.insert(connection.clone());
        assert!(presence.remove(&connection));
        assert!(!presence.remove(&connection));
    }
}
