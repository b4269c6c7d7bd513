//! Heartbeat cycle: push what changed, read back what the orchestrator
//! decided, answer the game process.

use crate::cluster::ClusterResourceClient;
use crate::config::{GameServerIdentity, SidecarConfig};
use crate::decider;
use crate::latch::{HealthSynchronizer, PhaseGate, PlayerSynchronizer};
use crate::metrics::SidecarMetrics;
use sidecar_common::{HeartbeatRequest, HeartbeatResponse, Result};
use std::sync::Arc;
use tracing::{debug, error, info_span, warn, Instrument};

pub struct HeartbeatService {
    identity: GameServerIdentity,
    client: Arc<dyn ClusterResourceClient>,
    health: HealthSynchronizer,
    phase: PhaseGate,
    players: PlayerSynchronizer,
    metrics: SidecarMetrics,
    log_every_heartbeat: bool,
}

impl HeartbeatService {
    pub fn new(
        identity: GameServerIdentity,
        client: Arc<dyn ClusterResourceClient>,
        config: &SidecarConfig,
        metrics: SidecarMetrics,
    ) -> Self {
        let name = identity.name.clone();
        Self {
            health: HealthSynchronizer::new(client.clone(), &name, metrics.clone()),
            phase: PhaseGate::new(client.clone(), &name, metrics.clone()),
            players: PlayerSynchronizer::new(
                client.clone(),
                &name,
                config.sync_connected_players,
                metrics.clone(),
            ),
            identity,
            client,
            metrics,
            log_every_heartbeat: config.log_every_heartbeat,
        }
    }

    pub fn identity(&self) -> &GameServerIdentity {
        &self.identity
    }

    /// Decode a raw body and run the heartbeat cycle.
    pub async fn handle_raw(&self, session_host_id: &str, body: &[u8]) -> Result<HeartbeatResponse> {
        let request = match HeartbeatRequest::from_slice(body) {
            Ok(request) => request,
            Err(e) => {
                warn!(session_host_id, "Rejecting heartbeat: {}", e);
                self.metrics.record_heartbeat("invalid");
                return Err(e);
            }
        };
        self.process_heartbeat(session_host_id, request).await
    }

    pub async fn process_heartbeat(
        &self,
        session_host_id: &str,
        request: HeartbeatRequest,
    ) -> Result<HeartbeatResponse> {
        if let Err(e) = request.validate() {
            self.metrics.record_heartbeat("invalid");
            return Err(e);
        }

        let span = info_span!(
            "heartbeat",
            game_server = %self.identity.name,
            namespace = %self.identity.namespace,
            session_host_id = %session_host_id
        );

        let result = self.run_cycle(request).instrument(span).await;
        if let Err(e) = &result {
            error!(session_host_id, "Heartbeat failed: {}", e);
            self.metrics.record_heartbeat("error");
        }
        result
    }

    async fn run_cycle(&self, request: HeartbeatRequest) -> Result<HeartbeatResponse> {
        if self.log_every_heartbeat {
            debug!("Heartbeat received: {:?}", request);
        }

        // Order matters: both deltas are flushed before the read below.
        tolerate("health update", self.health.sync_health(&request.current_game_health).await)?;
        tolerate(
            "state update",
            self.phase
                .maybe_advance_to_standing_by(request.current_game_state)
                .await,
        )?;
        tolerate(
            "connected players update",
            self.players
                .sync_players(request.current_game_state, request.player_ids())
                .await,
        )?;

        let status = match self.client.read_status(&self.identity.name).await {
            Ok(status) => {
                self.metrics.record_read(true);
                status
            }
            Err(e) if e.is_transient() => {
                self.metrics.record_read(false);
                self.metrics.record_heartbeat("degraded");
                warn!("Cannot read GameServer status, telling game to continue: {}", e);
                return Ok(HeartbeatResponse::keep_running());
            }
            Err(e) => {
                self.metrics.record_read(false);
                return Err(e);
            }
        };

        let operation = decider::decide(&status.state);
        let session_config = decider::session_config(&status);
        self.metrics.record_heartbeat("ok");
        Ok(HeartbeatResponse::new(operation, session_config))
    }
}

/// Transient patch failures are retried by the next heartbeat; anything else
/// ends this one.
fn tolerate(step: &str, result: Result<bool>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_transient() => {
            warn!("{} failed, will retry on next heartbeat: {}", step, e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}
