use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::product::ProductId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One transcript entry. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommended_ids: Vec<ProductId>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            recommended_ids: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, recommended_ids: Vec<ProductId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            recommended_ids,
        }
    }
}

/// Weather and location conditioning the next recommendation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingContext {
    pub weather: String,
    pub location: String,
}

impl ShoppingContext {
    pub fn new(weather: impl Into<String>, location: impl Into<String>) -> Self {
        Self { weather: weather.into(), location: location.into() }
    }
}

impl Default for ShoppingContext {
    fn default() -> Self {
        Self::new("temps normal", "votre région")
    }
}
