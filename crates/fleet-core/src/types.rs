use std::collections::HashMap;

use fly_api::{GuestConfig, MachineMount, MachineService};

/// What the caller wants created. `region` is only a first choice: retries
/// replace it with a fallback region.
#[derive(Debug, Clone, Default)]
pub struct MachineSpec {
    pub name: String,
    pub region: String,
    pub image: String,
    pub env: HashMap<String, String>,
    pub services: Vec<MachineService>,
    pub mounts: Vec<MachineMount>,
    pub guest: Option<GuestConfig>,
}

impl MachineSpec {
    pub(crate) fn to_request(&self, region: &str) -> fly_api::CreateMachineRequest {
        fly_api::CreateMachineRequest {
            name: self.name.clone(),
            region: region.to_string(),
            config: fly_api::MachineConfig {
                image: self.image.clone(),
                env: (!self.env.is_empty()).then(|| self.env.clone()),
                services: (!self.services.is_empty()).then(|| self.services.clone()),
                mounts: (!self.mounts.is_empty()).then(|| self.mounts.clone()),
                guest: self.guest.clone(),
            },
        }
    }
}

/// Outcome of re-driving interrupted destroys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Machines confirmed gone remotely whose records are now `deleted`.
    pub finalized: Vec<String>,
    /// Machines whose remote deletion still fails; left `pending_delete`.
    pub failed: Vec<String>,
}

/// Read-only comparison of local records against the provider.
#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    /// Active records checked against the provider.
    pub checked: usize,
    /// Active records whose machine the provider no longer knows.
    pub orphaned_records: Vec<fleet_db::MachineRecord>,
    /// Remote machines with no local record at all.
    pub untracked_machines: Vec<fly_api::Machine>,
    /// Active records whose status could not be fetched.
    pub unreachable: Vec<String>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_records.is_empty()
            && self.untracked_machines.is_empty()
            && self.unreachable.is_empty()
    }
}
