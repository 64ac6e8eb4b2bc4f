//! Connection token validation
//!
//! Token issuance belongs to the account service; the real-time layer only
//! checks the bearer token a client presents as the `token` query parameter
//! when upgrading.

use crate::error::AuthError;
use shared::PlayerId;
use std::collections::HashMap;

pub trait Authenticator: Send + Sync {
    fn validate_connection_token(&self, token: &str) -> Result<PlayerId, AuthError>;
}

/// Fixed token table, typically loaded from the `[auth.tokens]` config section
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, PlayerId>,
}

impl StaticTokens {
    pub fn new(tokens: HashMap<String, PlayerId>) -> Self {
        Self { tokens }
    }

    pub fn insert(&mut self, token: impl Into<String>, player: PlayerId) {
        self.tokens.insert(token.into(), player);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for StaticTokens {
    fn validate_connection_token(&self, token: &str) -> Result<PlayerId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.tokens
            .get(token)
            .copied()
            .ok_or(AuthError::InvalidToken)
    }
}

/// Pulls the `token` parameter out of a request query string
pub fn token_from_query(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "token")
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
