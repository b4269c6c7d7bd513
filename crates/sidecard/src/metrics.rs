//! Prometheus metrics for the heartbeat bridge.

use prometheus::{
    register_int_counter_vec_with_registry, Encoder, IntCounterVec, Registry, TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct SidecarMetrics {
    /// Heartbeats by result: ok, invalid, degraded, error
    pub heartbeats_total: IntCounterVec,
    /// Cluster patches by field (health, state, players) and outcome
    pub status_patches_total: IntCounterVec,
    /// Cluster status reads by outcome
    pub status_reads_total: IntCounterVec,

    registry: Arc<Registry>,
}

impl SidecarMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let heartbeats_total = register_int_counter_vec_with_registry!(
            "sidecar_heartbeats_total",
            "Heartbeats handled, by result",
            &["result"],
            registry
        )?;

        let status_patches_total = register_int_counter_vec_with_registry!(
            "sidecar_status_patches_total",
            "GameServer patches issued, by field and outcome",
            &["field", "outcome"],
            registry
        )?;

        let status_reads_total = register_int_counter_vec_with_registry!(
            "sidecar_status_reads_total",
            "GameServer status reads, by outcome",
            &["outcome"],
            registry
        )?;

        Ok(Self {
            heartbeats_total,
            status_patches_total,
            status_reads_total,
            registry: Arc::new(registry),
        })
    }

    pub fn record_heartbeat(&self, result: &str) {
        self.heartbeats_total.with_label_values(&[result]).inc();
    }

    pub fn record_patch(&self, field: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.status_patches_total
            .with_label_values(&[field, outcome])
            .inc();
    }

    pub fn record_read(&self, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.status_reads_total.with_label_values(&[outcome]).inc();
    }

    /// Text exposition format
    pub fn export(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
