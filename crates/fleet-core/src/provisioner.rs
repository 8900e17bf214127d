use std::sync::Arc;

use chrono::Utc;
use fleet_db::{MachineRecordStore, NewMachineRecord};
use tracing::{error, info, warn};

use crate::config::RetryPolicy;
use crate::regions::RegionCatalog;
use crate::types::MachineSpec;
use crate::{Error, Result};

/// Creates machines, falling back to random regions when the provider
/// rejects a request, and records each created machine against its owner.
pub struct Provisioner {
    client: fly_api::FlyClient,
    regions: Arc<RegionCatalog>,
    store: Arc<dyn MachineRecordStore>,
    retry: RetryPolicy,
}

impl Provisioner {
    pub fn new(
        client: fly_api::FlyClient,
        regions: Arc<RegionCatalog>,
        store: Arc<dyn MachineRecordStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            regions,
            store,
            retry,
        }
    }

    /// Create a machine and record it under `owner_token`.
    ///
    /// Only non-success HTTP responses are retried. Each retry waits the
    /// fixed backoff and replaces the region with a random fallback, which
    /// may be the region that just failed. If the record write fails the
    /// machine still exists remotely; the error is returned as-is.
    pub async fn create(&self, spec: &MachineSpec, owner_token: &str) -> Result<fly_api::Machine> {
        let mut region = spec.region.clone();
        let mut attempt: u32 = 0;

        let machine = loop {
            let err = match self.client.create_machine(&spec.to_request(&region)).await {
                Ok(machine) => break machine,
                Err(e) => e,
            };

            let fly_api::Error::Api { status, .. } = err else {
                error!(name = %spec.name, %region, attempt, error = %err, "fly: machine create request failed");
                return Err(err.into());
            };

            if attempt >= self.retry.max_retries {
                error!(name = %spec.name, %region, attempt, error = %err, "fly: machine create failed, retries exhausted");
                return Err(Error::RetriesExhausted {
                    attempts: attempt + 1,
                    status,
                });
            }

            warn!(name = %spec.name, %region, attempt, error = %err, "fly: machine create failed, retrying in fallback region");
            tokio::time::sleep(self.retry.backoff).await;

            let Some(fallback) = self.regions.choose().await else {
                error!(name = %spec.name, %status, "fly: machine create failed, no region to fall back to");
                return Err(Error::NoFallbackRegion { status });
            };
            region = fallback;
            attempt += 1;
        };

        let record = NewMachineRecord {
            owner_token: owner_token.to_string(),
            machine_id: machine.id.clone(),
            address: machine.private_ip.clone().unwrap_or_default(),
            created_at: machine.created_at.unwrap_or_else(Utc::now),
        };
        if let Err(e) = self.store.create(&record).await {
            error!(machine_id = %machine.id, error = %e, "machine created remotely but record write failed");
            return Err(e.into());
        }

        info!(machine_id = %machine.id, region = %machine.region, attempts = attempt + 1, "fly: machine created");
        Ok(machine)
    }
}
