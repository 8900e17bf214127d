//! Machine provisioning on top of the Fly.io Machines API, with a local
//! record of ownership kept in a [`MachineRecordStore`].
//!
//! The local record is deliberately not authoritative: the provider may
//! destroy or change machines out-of-band, and [`LifecycleController::audit`]
//! exists to surface that drift rather than hide it.

pub mod config;
pub mod lifecycle;
pub mod provisioner;
pub mod regions;
pub mod types;

use std::sync::Arc;

use fleet_db::MachineRecordStore;

pub use config::{FlyConfig, RetryPolicy};
pub use lifecycle::LifecycleController;
pub use provisioner::Provisioner;
pub use regions::RegionCatalog;
pub use types::{AuditReport, MachineSpec, ReconcileReport};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("fly api error: {0}")]
    Fly(#[from] fly_api::Error),

    #[error(
        "HTTP {} - {}",
        .status.as_u16(),
        .status.canonical_reason().unwrap_or("Unknown")
    )]
    RetriesExhausted {
        attempts: u32,
        status: reqwest::StatusCode,
    },

    #[error(
        "HTTP {} - {} (no fallback region available)",
        .status.as_u16(),
        .status.canonical_reason().unwrap_or("Unknown")
    )]
    NoFallbackRegion { status: reqwest::StatusCode },

    #[error("record store error: {0}")]
    Store(#[from] fleet_db::Error),

    #[error("missing env var: {0}")]
    MissingEnv(String),
}

impl Error {
    /// Last HTTP status reported by the provider, if the failure came from one.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::Fly(e) => e.status(),
            Self::RetriesExhausted { status, .. } | Self::NoFallbackRegion { status } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// One app's provisioning components, sharing a single API client,
/// region catalog and record store.
pub struct Fleet {
    config: FlyConfig,
    regions: Arc<RegionCatalog>,
    provisioner: Provisioner,
    lifecycle: LifecycleController,
}

impl Fleet {
    pub fn new(config: FlyConfig, retry: RetryPolicy, store: Arc<dyn MachineRecordStore>) -> Self {
        let client = config.client();
        let regions = Arc::new(RegionCatalog::new(client.clone()));
        let provisioner = Provisioner::new(client.clone(), regions.clone(), store.clone(), retry);
        let lifecycle = LifecycleController::new(client, store);

        Self {
            config,
            regions,
            provisioner,
            lifecycle,
        }
    }

    /// Build from environment variables with the default retry policy.
    pub fn from_env(store: Arc<dyn MachineRecordStore>) -> Result<Self> {
        let config = FlyConfig::from_env()?;
        tracing::info!(app = %config.app_name, "fly: configured machines client");
        Ok(Self::new(config, RetryPolicy::default(), store))
    }

    pub fn app(&self) -> &str {
        &self.config.app_name
    }

    pub fn image_ref(&self) -> Option<&str> {
        self.config.image_ref.as_deref()
    }

    pub fn regions(&self) -> &RegionCatalog {
        &self.regions
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use fleet_db::{MachineRecord, NewMachineRecord, RecordFilter, RecordState};
    use wiremock::MockServer;

    pub fn client(server: &MockServer) -> fly_api::FlyClient {
        fly_api::FlyClient::with_base_url("test-token", "test-app", server.uri())
    }

    pub fn regions_body(entries: &[(&str, bool, i64)]) -> serde_json::Value {
        let regions: Vec<_> = entries
            .iter()
            .map(|(code, paid, capacity)| {
                serde_json::json!({"code": code, "requires_paid_plan": paid, "capacity": capacity})
            })
            .collect();
        serde_json::json!({ "Regions": regions })
    }

    pub fn machine_body(id: &str, region: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": format!("machine-{id}"),
            "state": "started",
            "region": region,
            "private_ip": format!("fdaa:0:1::{id}"),
            "created_at": "2024-05-01T12:00:00Z"
        })
    }

    /// Store whose every call fails, as if the database were unreachable.
    pub struct UnavailableStore;

    fn unavailable() -> fleet_db::Error {
        fleet_db::Error::Database(sqlx::Error::PoolTimedOut)
    }

    #[async_trait]
    impl fleet_db::MachineRecordStore for UnavailableStore {
        async fn create(&self, _: &NewMachineRecord) -> fleet_db::Result<MachineRecord> {
            Err(unavailable())
        }

        async fn update_state(&self, _: &RecordFilter, _: RecordState) -> fleet_db::Result<u64> {
            Err(unavailable())
        }

        async fn find_many(&self, _: &RecordFilter) -> fleet_db::Result<Vec<MachineRecord>> {
            Err(unavailable())
        }

        async fn find_first(&self, _: &RecordFilter) -> fleet_db::Result<Option<MachineRecord>> {
            Err(unavailable())
        }

        async fn find_address(&self, _: &RecordFilter) -> fleet_db::Result<Option<String>> {
            Err(unavailable())
        }
    }
}
