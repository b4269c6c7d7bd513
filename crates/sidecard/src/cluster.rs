//! Access to the GameServer custom resource.
//!
//! Production code uses `KubeClusterClient`, which speaks the Kubernetes REST
//! API directly. Test code uses `FakeClusterClient`, an in-memory resource
//! that records every call and can be told to fail.
//!
//! Neither implementation retries. A failed patch is re-attempted by the next
//! heartbeat because the caller's latch was never committed.

use crate::config::{GameServerIdentity, SidecarConfig};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, StatusCode};
use sidecar_common::gameserver::{CRD_GROUP, CRD_VERSION, GAMESERVERS, GAMESERVER_DETAILS};
use sidecar_common::{
    ConnectedPlayersPatch, GameServerObject, GameServerStatus, Result, SidecarError, StatusPatch,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const MERGE_PATCH: &str = "application/merge-patch+json";

// ============================================================================
// Cluster Client Trait
// ============================================================================

#[async_trait]
pub trait ClusterResourceClient: Send + Sync {
    /// Latest known `.status` of the named GameServer.
    async fn read_status(&self, name: &str) -> Result<GameServerStatus>;

    /// Merge-patch the named GameServer's status subresource. Fields not set
    /// in `patch` are left untouched. Safe to repeat.
    async fn patch_status(&self, name: &str, patch: &StatusPatch) -> Result<()>;

    /// Merge-patch the connected player list on the GameServerDetail of the
    /// same name.
    async fn patch_connected_players(
        &self,
        name: &str,
        patch: &ConnectedPlayersPatch,
    ) -> Result<()>;
}

// ============================================================================
// Kubernetes REST client (Production)
// ============================================================================

pub struct KubeClusterClient {
    http: reqwest::Client,
    base_url: String,
    namespace: String,
    token_path: Option<PathBuf>,
}

impl KubeClusterClient {
    /// Build from sidecar config: an explicit `api_server` wins over the
    /// in-cluster service account.
    pub fn from_config(config: &SidecarConfig, identity: &GameServerIdentity) -> Result<Self> {
        match &config.api_server {
            Some(url) => {
                Self::with_api_server(url, &identity.namespace, config.request_timeout())
            }
            None => Self::in_cluster(&identity.namespace, config.request_timeout()),
        }
    }

    /// Unauthenticated client against an explicit API server URL.
    pub fn with_api_server(url: &str, namespace: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SidecarError::Config(format!("cannot build http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: url.trim_end_matches('/').to_string(),
            namespace: namespace.to_string(),
            token_path: None,
        })
    }

    /// Client using the pod's service account token and cluster CA.
    pub fn in_cluster(namespace: &str, timeout: Duration) -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| SidecarError::Config("KUBERNETES_SERVICE_HOST not defined".into()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT")
            .map_err(|_| SidecarError::Config("KUBERNETES_SERVICE_PORT not defined".into()))?;

        let sa_dir = PathBuf::from(SERVICE_ACCOUNT_DIR);
        let ca_pem = std::fs::read(sa_dir.join("ca.crt"))
            .map_err(|e| SidecarError::Config(format!("cannot read cluster CA: {}", e)))?;
        let ca = Certificate::from_pem(&ca_pem)
            .map_err(|e| SidecarError::Config(format!("invalid cluster CA: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .add_root_certificate(ca)
            .build()
            .map_err(|e| SidecarError::Config(format!("cannot build http client: {}", e)))?;

        // IPv6 service hosts need brackets
        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host
        };

        Ok(Self {
            http,
            base_url: format!("https://{}:{}", host, port),
            namespace: namespace.to_string(),
            token_path: Some(sa_dir.join("token")),
        })
    }

    fn resource_url(&self, plural: &str, name: &str, subresource: Option<&str>) -> String {
        let mut url = format!(
            "{}/apis/{}/{}/namespaces/{}/{}/{}",
            self.base_url, CRD_GROUP, CRD_VERSION, self.namespace, plural, name
        );
        if let Some(sub) = subresource {
            url.push('/');
            url.push_str(sub);
        }
        url
    }

    /// The kubelet rotates projected tokens, so the file is read per call.
    async fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        match &self.token_path {
            Some(path) => {
                let token = tokio::fs::read_to_string(path).await.map_err(|e| {
                    SidecarError::Transport(format!("cannot read service account token: {}", e))
                })?;
                Ok(request.bearer_auth(token.trim()))
            }
            None => Ok(request),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, name: &str) -> Result<reqwest::Response> {
        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response.status(), name)?;
        Ok(response)
    }

    async fn merge_patch(&self, url: String, name: &str, body: serde_json::Value) -> Result<()> {
        debug!("PATCH {} {}", url, body);
        let request = self
            .http
            .patch(&url)
            .header(CONTENT_TYPE, MERGE_PATCH)
            .body(serde_json::to_vec(&body)?);
        self.send(request, name).await?;
        Ok(())
    }
}

fn transport_error(e: reqwest::Error) -> SidecarError {
    if e.is_timeout() {
        SidecarError::Transport(format!("cluster API call timed out: {}", e))
    } else {
        SidecarError::Transport(e.to_string())
    }
}

/// Map an API server response code onto the sidecar error taxonomy.
///
/// Client errors are permanent except for timeouts and throttling.
pub fn check_status(status: StatusCode, name: &str) -> Result<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::NOT_FOUND => Err(SidecarError::NotFound(name.to_string())),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => Err(
            SidecarError::Transport(format!("API server answered {} for {}", status, name)),
        ),
        s if s.is_client_error() => Err(SidecarError::Rejected(format!(
            "API server answered {} for {}",
            status, name
        ))),
        _ => Err(SidecarError::Transport(format!(
            "API server answered {} for {}",
            status, name
        ))),
    }
}

#[async_trait]
impl ClusterResourceClient for KubeClusterClient {
    async fn read_status(&self, name: &str) -> Result<GameServerStatus> {
        let url = self.resource_url(GAMESERVERS, name, Some("status"));
        let response = self.send(self.http.get(&url), name).await?;
        let object: GameServerObject = response
            .json()
            .await
            .map_err(|e| SidecarError::Transport(format!("invalid GameServer document: {}", e)))?;
        Ok(object.into_status())
    }

    async fn patch_status(&self, name: &str, patch: &StatusPatch) -> Result<()> {
        let url = self.resource_url(GAMESERVERS, name, Some("status"));
        self.merge_patch(url, name, patch.to_body()).await
    }

    async fn patch_connected_players(
        &self,
        name: &str,
        patch: &ConnectedPlayersPatch,
    ) -> Result<()> {
        let url = self.resource_url(GAMESERVER_DETAILS, name, None);
        self.merge_patch(url, name, patch.to_body()).await
    }
}

// ============================================================================
// Fake Cluster Client (Testing)
// ============================================================================

/// A call observed by `FakeClusterClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    ReadStatus,
    PatchStatus(StatusPatch),
    PatchConnectedPlayers(ConnectedPlayersPatch),
}

/// In-memory GameServer with merge semantics for patches.
#[derive(Default)]
pub struct FakeClusterClient {
    status: Mutex<GameServerStatus>,
    calls: Mutex<Vec<ClusterCall>>,
    failing_patches: AtomicUsize,
    rejecting_patches: AtomicBool,
    failing_reads: AtomicBool,
    missing: AtomicBool,
    patch_delay: Mutex<Option<Duration>>,
}

impl FakeClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: GameServerStatus) -> Self {
        let fake = Self::default();
        fake.set_status(status);
        fake
    }

    /// Orchestrator-side write, not recorded as a call.
    pub fn set_status(&self, status: GameServerStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn status(&self) -> GameServerStatus {
        self.status.lock().unwrap().clone()
    }

    /// Fail the next `n` patch calls with a transport error.
    pub fn fail_next_patches(&self, n: usize) {
        self.failing_patches.store(n, Ordering::SeqCst);
    }

    /// Refuse every patch the way the API server refuses an invalid value.
    pub fn reject_patches(&self, rejecting: bool) {
        self.rejecting_patches.store(rejecting, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    /// Behave as if the GameServer had been deleted.
    pub fn set_missing(&self, missing: bool) {
        self.missing.store(missing, Ordering::SeqCst);
    }

    /// Hold every patch for `delay` before applying it.
    pub fn set_patch_delay(&self, delay: Duration) {
        *self.patch_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn status_patches(&self) -> Vec<StatusPatch> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ClusterCall::PatchStatus(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn player_patches(&self) -> Vec<ConnectedPlayersPatch> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ClusterCall::PatchConnectedPlayers(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn read_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ClusterCall::ReadStatus))
            .count()
    }

    fn record(&self, call: ClusterCall) {
        self.calls.lock().unwrap().push(call);
    }

    async fn before_patch(&self, name: &str) -> Result<()> {
        let delay = *self.patch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.missing.load(Ordering::SeqCst) {
            return Err(SidecarError::NotFound(name.to_string()));
        }
        if self.rejecting_patches.load(Ordering::SeqCst) {
            return Err(SidecarError::Rejected("injected patch rejection".to_string()));
        }
        let failed = self
            .failing_patches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(SidecarError::Transport("injected patch failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterResourceClient for FakeClusterClient {
    async fn read_status(&self, name: &str) -> Result<GameServerStatus> {
        self.record(ClusterCall::ReadStatus);
        if self.missing.load(Ordering::SeqCst) {
            return Err(SidecarError::NotFound(name.to_string()));
        }
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(SidecarError::Transport("injected read failure".to_string()));
        }
        Ok(self.status())
    }

    async fn patch_status(&self, name: &str, patch: &StatusPatch) -> Result<()> {
        self.record(ClusterCall::PatchStatus(patch.clone()));
        self.before_patch(name).await?;
        let mut status = self.status.lock().unwrap();
        if let Some(health) = &patch.health {
            status.health = health.clone();
        }
        if let Some(state) = &patch.state {
            status.state = state.clone();
        }
        Ok(())
    }

    async fn patch_connected_players(
        &self,
        name: &str,
        patch: &ConnectedPlayersPatch,
    ) -> Result<()> {
        self.record(ClusterCall::PatchConnectedPlayers(patch.clone()));
        self.before_patch(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_urls() {
        let client =
            KubeClusterClient::with_api_server("http://127.0.0.1:8001/", "games", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            client.resource_url(GAMESERVERS, "gs-1", Some("status")),
            "http://127.0.0.1:8001/apis/mps.playfab.com/v1alpha1/namespaces/games/gameservers/gs-1/status"
        );
        assert_eq!(
            client.resource_url(GAMESERVER_DETAILS, "gs-1", None),
            "http://127.0.0.1:8001/apis/mps.playfab.com/v1alpha1/namespaces/games/gameserverdetails/gs-1"
        );
    }

    #[test]
    fn test_status_code_mapping() {
        assert!(check_status(StatusCode::OK, "gs").is_ok());
        assert!(matches!(
            check_status(StatusCode::NOT_FOUND, "gs"),
            Err(SidecarError::NotFound(_))
        ));
        assert!(matches!(
            check_status(StatusCode::UNPROCESSABLE_ENTITY, "gs"),
            Err(SidecarError::Rejected(_))
        ));
        assert!(matches!(
            check_status(StatusCode::FORBIDDEN, "gs"),
            Err(SidecarError::Rejected(_))
        ));
        assert!(matches!(
            check_status(StatusCode::TOO_MANY_REQUESTS, "gs"),
            Err(SidecarError::Transport(_))
        ));
        assert!(matches!(
            check_status(StatusCode::REQUEST_TIMEOUT, "gs"),
            Err(SidecarError::Transport(_))
        ));
        assert!(matches!(
            check_status(StatusCode::SERVICE_UNAVAILABLE, "gs"),
            Err(SidecarError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_fake_patch_merges_fields() {
        let fake = FakeClusterClient::with_status(GameServerStatus {
            state: "Initializing".into(),
            session_cookie: Some("c".into()),
            ..Default::default()
        });
        fake.patch_status("gs", &StatusPatch::health("Healthy"))
            .await
            .unwrap();
        let status = fake.read_status("gs").await.unwrap();
        assert_eq!(status.health, "Healthy");
        assert_eq!(status.state, "Initializing");
        assert_eq!(status.session_cookie.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_fake_failure_injection() {
        let fake = FakeClusterClient::new();
        fake.fail_next_patches(1);
        assert!(fake
            .patch_status("gs", &StatusPatch::health("Healthy"))
            .await
            .is_err());
        assert!(fake
            .patch_status("gs", &StatusPatch::health("Healthy"))
            .await
            .is_ok());
        assert_eq!(fake.status_patches().len(), 2);
    }
}
