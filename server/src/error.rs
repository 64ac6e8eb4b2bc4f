use shared::PlayerId;
use std::path::PathBuf;

/// Failures reported by the world/economy collaborators
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("player position not found")]
    PositionNotFound(PlayerId),
    #[error("map not found")]
    MapNotFound,
    #[error("world object not found")]
    ObjectNotFound,
    #[error("clock snapshot could not be encoded: {0}")]
    Snapshot(#[from] bincode::Error),
    #[error("clock snapshot holds an impossible time: {0:?}")]
    InvalidClock(shared::GameClock),
    #[error("clock snapshot i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing connection token")]
    MissingToken,
    #[error("invalid connection token")]
    InvalidToken,
}

/// Gameplay rule violations, reported back to the originating player only
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("position out of bounds")]
    OutOfBounds,
    #[error("position blocked by object")]
    Blocked,
    #[error("target too far away")]
    TooFar,
    #[error("no interactable object found")]
    NothingToInteract,
    #[error("object not interactable")]
    NotInteractable,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ActionError {
    /// Text safe to show a player; collaborator internals stay in the logs
    pub fn client_message(&self) -> String {
        match self {
            ActionError::Store(StoreError::PositionNotFound(_) | StoreError::MapNotFound) => {
                self.to_string()
            }
            ActionError::Store(_) => "action rejected".to_string(),
            _ => self.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_client_message_hides_internals() {
        let err = ActionError::Store(StoreError::Unavailable("mutex poisoned".to_string()));
        assert_eq!(err.client_message(), "action rejected");

        let err = ActionError::Store(StoreError::PositionNotFound(Uuid::new_v4()));
        assert_eq!(err.client_message(), "player position not found");

        assert_eq!(ActionError::TooFar.client_message(), "target too far away");
    }
}
