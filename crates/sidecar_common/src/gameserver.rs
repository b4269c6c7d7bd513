//! Typed view of the GameServer custom resource.
//!
//! Decoding tolerates missing keys; unknown keys are ignored.

use serde::{Deserialize, Serialize};

pub const CRD_GROUP: &str = "mps.playfab.com";
pub const CRD_VERSION: &str = "v1alpha1";
pub const GAMESERVERS: &str = "gameservers";
pub const GAMESERVER_DETAILS: &str = "gameserverdetails";

/// Orchestrator state values the sidecar cares about.
pub const STATE_STANDING_BY: &str = "StandingBy";
pub const STATE_ACTIVE: &str = "Active";

/// Shown in logs in place of a health value that was never sent.
pub const HEALTH_NOT_SENT: &str = "N/A";

/// `.status` of a GameServer as written by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameServerStatus {
    pub state: String,
    pub health: String,
    pub session_cookie: Option<String>,
    /// The operator's CRD spells this `sessionID`.
    #[serde(alias = "sessionID")]
    pub session_id: Option<String>,
    pub initial_players: Option<Vec<String>>,
}

/// Envelope returned by the status subresource GET.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GameServerObject {
    #[serde(default)]
    pub status: Option<GameServerStatus>,
}

impl GameServerObject {
    pub fn into_status(self) -> GameServerStatus {
        self.status.unwrap_or_default()
    }
}

/// Merge-patch body for the status subresource. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl StatusPatch {
    pub fn health(health: &str) -> Self {
        Self {
            health: Some(health.to_string()),
            ..Default::default()
        }
    }

    pub fn state(state: &str) -> Self {
        Self {
            state: Some(state.to_string()),
            ..Default::default()
        }
    }

    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({ "status": self })
    }
}

/// Merge-patch body for the GameServerDetail spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPlayersPatch {
    pub connected_players_count: usize,
    pub connected_players: Vec<String>,
}

impl ConnectedPlayersPatch {
    pub fn new(players: Vec<String>) -> Self {
        Self {
            connected_players_count: players.len(),
            connected_players: players,
        }
    }

    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({ "spec": self })
    }
}
