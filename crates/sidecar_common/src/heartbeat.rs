//! Heartbeat wire protocol spoken between the game process and the sidecar.
//!
//! Request field names are PascalCase (as the game SDKs send them); the
//! response uses camelCase.

use crate::error::{Result, SidecarError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Lifecycle phase self-reported by the game process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameState {
    Invalid,
    Initializing,
    StandingBy,
    Active,
    Terminating,
    Terminated,
    /// Older SDKs spell this `Quarentined`.
    #[serde(alias = "Quarentined")]
    Quarantined,
}

impl GameState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameState::Invalid => "Invalid",
            GameState::Initializing => "Initializing",
            GameState::StandingBy => "StandingBy",
            GameState::Active => "Active",
            GameState::Terminating => "Terminating",
            GameState::Terminated => "Terminated",
            GameState::Quarantined => "Quarantined",
        }
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instruction returned to the game process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameOperation {
    Invalid,
    Continue,
    Active,
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectedPlayer {
    pub player_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeartbeatRequest {
    pub current_game_state: GameState,
    pub current_game_health: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub current_players: Vec<ConnectedPlayer>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<ConnectedPlayer>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ConnectedPlayer>>::deserialize(deserializer)?.unwrap_or_default())
}

impl HeartbeatRequest {
    /// Decode and validate a raw heartbeat body.
    ///
    /// Any decoding problem (null body, unknown phase, missing field) is a
    /// `Validation` error so the caller can answer 400.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let parsed: Option<HeartbeatRequest> = serde_json::from_slice(body)
            .map_err(|e| SidecarError::Validation(format!("cannot deserialize json: {}", e)))?;
        let request = parsed
            .ok_or_else(|| SidecarError::Validation("request body cannot be null".to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        if self.current_game_health.is_empty() {
            return Err(SidecarError::Validation(
                "CurrentGameHealth cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn player_ids(&self) -> Vec<String> {
        self.current_players
            .iter()
            .map(|p| p.player_id.clone())
            .collect()
    }
}

/// Allocation-time data handed to the game process.
///
/// Only fields present on the cluster resource are set; nothing is defaulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_players: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl SessionConfig {
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none()
            && self.session_cookie.is_none()
            && self.initial_players.is_none()
            && self.metadata.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub session_config: SessionConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_scheduled_maintenance_utc: Option<DateTime<Utc>>,
    pub operation: GameOperation,
}

impl HeartbeatResponse {
    pub fn new(operation: GameOperation, session_config: SessionConfig) -> Self {
        Self {
            session_config,
            next_scheduled_maintenance_utc: None,
            operation,
        }
    }

    /// Response used when the cluster status could not be read.
    pub fn keep_running() -> Self {
        Self::new(GameOperation::Continue, SessionConfig::default())
    }
}
