use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::game::Color;

pub const MIN_SEARCH_TIME_MS: u64 = 100;
pub const MAX_SEARCH_TIME_MS: u64 = 10_000;
pub const MAX_SKILL_LEVEL: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum PlayerKind {
    Human = 1,
    Computer = 2,
}

/// A seat at the board. The id is stable for the lifetime of the game;
/// reconfiguration may change kind, level, and search time but never the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub color: Color,
    #[serde(rename = "type")]
    pub kind: PlayerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(rename = "searchTime", skip_serializing_if = "Option::is_none")]
    pub search_time_ms: Option<u64>,
}

/// Player description as it arrives in create/configure requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PlayerSpec {
    #[serde(rename = "type")]
    pub kind: PlayerKind,
    #[serde(default)]
    pub level: Option<u8>,
    #[serde(rename = "searchTime", default)]
    pub search_time_ms: Option<u64>,
}

impl PlayerSpec {
    /// Request-level validation: level in range, search time not above the
    /// cap. Values below the minimum are clamped later, not rejected.
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(level) = self.level
            && level > MAX_SKILL_LEVEL
        {
            return Err(AppError::InvalidRequest(format!(
                "level must be between 0 and {MAX_SKILL_LEVEL}"
            )));
        }
        if let Some(ms) = self.search_time_ms
            && ms > MAX_SEARCH_TIME_MS
        {
            return Err(AppError::InvalidRequest(format!(
                "searchTime must be at most {MAX_SEARCH_TIME_MS}ms"
            )));
        }
        Ok(())
    }

    /// Build the seat. Human seats take the authenticated user's id when
    /// one is present; everything else gets a fresh opaque id from the
    /// injected generator.
    pub fn into_player(
        self,
        color: Color,
        user_id: Option<&str>,
        new_id: &dyn Fn() -> Uuid,
    ) -> Player {
        let id = match (self.kind, user_id) {
            (PlayerKind::Human, Some(uid)) => uid.to_string(),
            _ => new_id().to_string(),
        };
        Player {
            id,
            color,
            kind: self.kind,
            level: self.level.filter(|_| self.kind == PlayerKind::Computer),
            search_time_ms: self
                .search_time_ms
                .filter(|_| self.kind == PlayerKind::Computer)
                .map(|ms| ms.max(MIN_SEARCH_TIME_MS)),
        }
    }

    /// Apply a reconfiguration to an existing seat, preserving its id.
    pub fn apply_to(self, player: &mut Player) {
        player.kind = self.kind;
        player.level = self.level.filter(|_| self.kind == PlayerKind::Computer);
        player.search_time_ms = self
            .search_time_ms
            .filter(|_| self.kind == PlayerKind::Computer)
            .map(|ms| ms.max(MIN_SEARCH_TIME_MS));
    }
}
