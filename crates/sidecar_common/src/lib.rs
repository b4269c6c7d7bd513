//! Shared types for the game server sidecar: the heartbeat wire protocol,
//! the GameServer resource view, and the error type.

pub mod error;
pub mod gameserver;
pub mod heartbeat;

pub use error::{Result, SidecarError};
pub use gameserver::{
    ConnectedPlayersPatch, GameServerObject, GameServerStatus, StatusPatch, HEALTH_NOT_SENT,
    STATE_ACTIVE, STATE_STANDING_BY,
};
pub use heartbeat::{
    ConnectedPlayer, GameOperation, GameState, HeartbeatRequest, HeartbeatResponse, SessionConfig,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
