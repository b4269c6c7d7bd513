//! Turns the orchestrator's view of the GameServer into an instruction and
//! session config for the game process.

use sidecar_common::{GameOperation, GameServerStatus, SessionConfig, STATE_ACTIVE};
use tracing::warn;
use uuid::Uuid;

/// Only an allocated (`Active`) server is told to go active. Every other
/// state, including an empty one while the pod is starting, keeps the game
/// running; termination is carried out by the orchestrator deleting the pod.
pub fn decide(observed_state: &str) -> GameOperation {
    match observed_state {
        STATE_ACTIVE => GameOperation::Active,
        _ => GameOperation::Continue,
    }
}

/// Copy whatever allocation data the status carries. Empty values count as
/// absent.
pub fn session_config(status: &GameServerStatus) -> SessionConfig {
    let session_id = status
        .session_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .and_then(|id| match Uuid::parse_str(id) {
            Ok(uuid) => Some(uuid),
            Err(e) => {
                warn!("Ignoring sessionId {:?} that is not a UUID: {}", id, e);
                None
            }
        });

    SessionConfig {
        session_id,
        session_cookie: status
            .session_cookie
            .clone()
            .filter(|cookie| !cookie.is_empty()),
        initial_players: status.initial_players.clone(),
        metadata: Default::default(),
    }
}
