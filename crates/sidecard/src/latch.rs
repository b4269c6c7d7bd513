//! Change-driven writers for the GameServer resource.
//!
//! Each writer owns one piece of "what the cluster was last told" and holds
//! its mutex across compare, patch and commit. The remembered value only
//! moves after the cluster accepted the patch, so a failed write is simply
//! repeated by the next heartbeat.

use crate::cluster::ClusterResourceClient;
use crate::metrics::SidecarMetrics;
use sidecar_common::{
    ConnectedPlayersPatch, GameState, Result, StatusPatch, HEALTH_NOT_SENT, STATE_STANDING_BY,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

// ============================================================================
// Health
// ============================================================================

/// Patches `status.health` whenever the reported health changes.
pub struct HealthSynchronizer {
    client: Arc<dyn ClusterResourceClient>,
    name: String,
    /// `None` until the first health patch is accepted.
    last_sent: Mutex<Option<String>>,
    metrics: SidecarMetrics,
}

impl HealthSynchronizer {
    pub fn new(client: Arc<dyn ClusterResourceClient>, name: &str, metrics: SidecarMetrics) -> Self {
        Self {
            client,
            name: name.to_string(),
            last_sent: Mutex::new(None),
            metrics,
        }
    }

    /// Returns `true` when a patch was issued and accepted.
    pub async fn sync_health(&self, current_health: &str) -> Result<bool> {
        let mut last_sent = self.last_sent.lock().await;
        if last_sent.as_deref() == Some(current_health) {
            return Ok(false);
        }

        info!(
            "Health is different than before, updating. Old health {}, new health {}",
            last_sent.as_deref().unwrap_or(HEALTH_NOT_SENT),
            current_health
        );
        let result = self
            .client
            .patch_status(&self.name, &StatusPatch::health(current_health))
            .await;
        self.metrics.record_patch("health", result.is_ok());
        result?;

        *last_sent = Some(current_health.to_string());
        Ok(true)
    }

    pub async fn last_sent_health(&self) -> Option<String> {
        self.last_sent.lock().await.clone()
    }
}

// ============================================================================
// Phase gate
// ============================================================================

/// One-way latch moving the cluster state to `StandingBy` the first time the
/// game reports it is ready for players. The orchestrator owns every other
/// state transition.
pub struct PhaseGate {
    client: Arc<dyn ClusterResourceClient>,
    name: String,
    fired: Mutex<bool>,
    metrics: SidecarMetrics,
}

impl PhaseGate {
    pub fn new(client: Arc<dyn ClusterResourceClient>, name: &str, metrics: SidecarMetrics) -> Self {
        Self {
            client,
            name: name.to_string(),
            fired: Mutex::new(false),
            metrics,
        }
    }

    /// Returns `true` on the single call that advanced the state.
    pub async fn maybe_advance_to_standing_by(&self, reported: GameState) -> Result<bool> {
        if reported != GameState::StandingBy {
            return Ok(false);
        }

        let mut fired = self.fired.lock().await;
        if *fired {
            return Ok(false);
        }

        info!("Game reported StandingBy, transitioning GameServer state to StandingBy");
        let result = self
            .client
            .patch_status(&self.name, &StatusPatch::state(STATE_STANDING_BY))
            .await;
        self.metrics.record_patch("state", result.is_ok());
        result?;

        *fired = true;
        Ok(true)
    }

    pub async fn has_fired(&self) -> bool {
        *self.fired.lock().await
    }
}

// ============================================================================
// Connected players
// ============================================================================

/// Mirrors the connected player list into the GameServerDetail while the game
/// is active. Disabled unless configured.
pub struct PlayerSynchronizer {
    client: Arc<dyn ClusterResourceClient>,
    name: String,
    enabled: bool,
    last_count: Mutex<usize>,
    metrics: SidecarMetrics,
}

impl PlayerSynchronizer {
    pub fn new(
        client: Arc<dyn ClusterResourceClient>,
        name: &str,
        enabled: bool,
        metrics: SidecarMetrics,
    ) -> Self {
        Self {
            client,
            name: name.to_string(),
            enabled,
            last_count: Mutex::new(0),
            metrics,
        }
    }

    pub async fn sync_players(&self, reported: GameState, player_ids: Vec<String>) -> Result<bool> {
        if !self.enabled || reported != GameState::Active {
            return Ok(false);
        }

        let mut last_count = self.last_count.lock().await;
        if *last_count == player_ids.len() {
            return Ok(false);
        }

        info!(
            "Connected players count is different than before, updating. Old count {}, new count {}",
            *last_count,
            player_ids.len()
        );
        let patch = ConnectedPlayersPatch::new(player_ids);
        let result = self.client.patch_connected_players(&self.name, &patch).await;
        self.metrics.record_patch("players", result.is_ok());
        result?;

        *last_count = patch.connected_players_count;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::FakeClusterClient;
    use sidecar_common::SidecarError;

    fn fake() -> (Arc<FakeClusterClient>, SidecarMetrics) {
        (
            Arc::new(FakeClusterClient::new()),
            SidecarMetrics::new().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_health_patched_only_on_change() {
        let (client, metrics) = fake();
        let sync = HealthSynchronizer::new(client.clone(), "gs", metrics);

        assert!(sync.sync_health("Healthy").await.unwrap());
        assert!(!sync.sync_health("Healthy").await.unwrap());
        assert!(!sync.sync_health("Healthy").await.unwrap());
        assert!(sync.sync_health("Unhealthy").await.unwrap());

        let patches = client.status_patches();
        assert_eq!(
            patches,
            vec![StatusPatch::health("Healthy"), StatusPatch::health("Unhealthy")]
        );
        assert_eq!(sync.last_sent_health().await.as_deref(), Some("Unhealthy"));
    }

    #[tokio::test]
    async fn test_health_not_committed_on_failure() {
        let (client, metrics) = fake();
        let sync = HealthSynchronizer::new(client.clone(), "gs", metrics);

        client.fail_next_patches(1);
        let err = sync.sync_health("Healthy").await.unwrap_err();
        assert!(matches!(err, SidecarError::Transport(_)));
        assert_eq!(sync.last_sent_health().await, None);

        // Same value is retried on the next tick
        assert!(sync.sync_health("Healthy").await.unwrap());
        assert_eq!(client.status_patches().len(), 2);
        assert_eq!(client.status().health, "Healthy");
    }

    #[tokio::test]
    async fn test_first_health_always_sent_even_if_it_reads_na() {
        let (client, metrics) = fake();
        let sync = HealthSynchronizer::new(client.clone(), "gs", metrics);

        assert!(sync.sync_health(HEALTH_NOT_SENT).await.unwrap());
        assert!(!sync.sync_health(HEALTH_NOT_SENT).await.unwrap());
        assert_eq!(client.status_patches(), vec![StatusPatch::health("N/A")]);
        assert_eq!(sync.last_sent_health().await.as_deref(), Some("N/A"));
    }

    #[tokio::test]
    async fn test_phase_gate_fires_once() {
        let (client, metrics) = fake();
        let gate = PhaseGate::new(client.clone(), "gs", metrics);

        assert!(!gate.maybe_advance_to_standing_by(GameState::Initializing).await.unwrap());
        assert!(gate.maybe_advance_to_standing_by(GameState::StandingBy).await.unwrap());
        for _ in 0..5 {
            assert!(!gate.maybe_advance_to_standing_by(GameState::StandingBy).await.unwrap());
        }
        assert!(!gate.maybe_advance_to_standing_by(GameState::Active).await.unwrap());

        assert_eq!(client.status_patches(), vec![StatusPatch::state("StandingBy")]);
        assert!(gate.has_fired().await);
    }

    #[tokio::test]
    async fn test_phase_gate_retries_after_failure() {
        let (client, metrics) = fake();
        let gate = PhaseGate::new(client.clone(), "gs", metrics);

        client.fail_next_patches(1);
        assert!(gate.maybe_advance_to_standing_by(GameState::StandingBy).await.is_err());
        assert!(!gate.has_fired().await);

        assert!(gate.maybe_advance_to_standing_by(GameState::StandingBy).await.unwrap());
        assert_eq!(client.status().state, "StandingBy");
    }

    #[tokio::test]
    async fn test_players_synced_only_when_enabled_and_active() {
        let (client, metrics) = fake();
        let disabled = PlayerSynchronizer::new(client.clone(), "gs", false, metrics.clone());
        assert!(!disabled
            .sync_players(GameState::Active, vec!["p1".into()])
            .await
            .unwrap());

        let players = PlayerSynchronizer::new(client.clone(), "gs", true, metrics);
        assert!(!players
            .sync_players(GameState::StandingBy, vec!["p1".into()])
            .await
            .unwrap());
        assert!(players
            .sync_players(GameState::Active, vec!["p1".into()])
            .await
            .unwrap());
        assert!(!players
            .sync_players(GameState::Active, vec!["p2".into()])
            .await
            .unwrap());
        assert!(players
            .sync_players(GameState::Active, vec![])
            .await
            .unwrap());

        assert_eq!(
            client.player_patches(),
            vec![
                ConnectedPlayersPatch::new(vec!["p1".into()]),
                ConnectedPlayersPatch::new(vec![]),
            ]
        );
    }
}
