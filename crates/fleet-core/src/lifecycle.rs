use std::collections::HashSet;
use std::sync::Arc;

use fleet_db::{MachineRecord, MachineRecordStore, RecordFilter, RecordState};
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::types::{AuditReport, ReconcileReport};

/// Destroys machines and answers status queries.
///
/// Destruction is a local-first saga: records move to `pending_delete`
/// before the provider is asked to delete anything, and only reach
/// `deleted` once it has. A crash or provider failure in between leaves
/// `pending_delete` records for [`reconcile_pending_deletes`] to finish.
///
/// [`reconcile_pending_deletes`]: LifecycleController::reconcile_pending_deletes
pub struct LifecycleController {
    client: fly_api::FlyClient,
    store: Arc<dyn MachineRecordStore>,
}

impl LifecycleController {
    pub fn new(client: fly_api::FlyClient, store: Arc<dyn MachineRecordStore>) -> Self {
        Self { client, store }
    }

    /// Tombstone the active records for `machine_id`, then force-delete the machine.
    ///
    /// If the tombstone write fails no remote call is made. If the remote
    /// delete fails the records stay `pending_delete` and the error is returned.
    /// A machine whose records are all `deleted` is already destroyed and
    /// is left alone; a `pending_delete` one is re-driven.
    pub async fn destroy(&self, machine_id: &str) -> Result<()> {
        let marked = self
            .store
            .update_state(&RecordFilter::active(machine_id), RecordState::PendingDelete)
            .await
            .inspect_err(|e| error!(machine_id, error = %e, "soft delete failed, machine left running"))?;
        if marked == 0 && self.already_destroyed(machine_id).await? {
            debug!(machine_id, "machine already destroyed");
            return Ok(());
        }

        self.delete_remote(machine_id).await?;
        self.finalize(machine_id).await?;

        info!(machine_id, "fly: machine destroyed");
        Ok(())
    }

    /// Local view of live machines. May include machines the provider has
    /// since removed out-of-band.
    pub async fn list_active(&self) -> Result<Vec<MachineRecord>> {
        Ok(self
            .store
            .find_many(&RecordFilter::in_state(RecordState::Active))
            .await?)
    }

    pub async fn get_record(&self, machine_id: &str) -> Result<Option<MachineRecord>> {
        Ok(self.store.find_first(&RecordFilter::active(machine_id)).await?)
    }

    pub async fn get_address(&self, machine_id: &str) -> Result<Option<String>> {
        Ok(self.store.find_address(&RecordFilter::active(machine_id)).await?)
    }

    /// Live status straight from the provider, ignoring local records.
    /// `None` means the provider answered 404.
    pub async fn get_remote_status(&self, machine_id: &str) -> Result<Option<fly_api::Machine>> {
        let machine = self
            .client
            .get_machine(machine_id)
            .await
            .inspect_err(|e| error!(machine_id, error = %e, "fly: machine status request failed"))?;
        Ok(machine)
    }

    /// Retry the remote half of every interrupted destroy.
    ///
    /// A 404 from the provider means the machine is already gone and the
    /// record is finalized. Other failures are reported, not returned.
    pub async fn reconcile_pending_deletes(&self) -> Result<ReconcileReport> {
        let pending = self
            .store
            .find_many(&RecordFilter::in_state(RecordState::PendingDelete))
            .await?;

        let mut seen = HashSet::new();
        let mut report = ReconcileReport::default();
        for record in pending {
            if !seen.insert(record.machine_id.clone()) {
                continue;
            }
            let machine_id = record.machine_id;

            match self.client.delete_machine(&machine_id, true).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(%machine_id, "machine already gone remotely");
                }
                Err(e) => {
                    warn!(%machine_id, error = %e, "reconcile: remote delete still failing");
                    report.failed.push(machine_id);
                    continue;
                }
            }

            match self.finalize(&machine_id).await {
                Ok(()) => report.finalized.push(machine_id),
                Err(e) => {
                    warn!(%machine_id, error = %e, "reconcile: could not finalize record");
                    report.failed.push(machine_id);
                }
            }
        }

        if !report.finalized.is_empty() || !report.failed.is_empty() {
            info!(
                finalized = report.finalized.len(),
                failed = report.failed.len(),
                "reconciled pending deletes"
            );
        }
        Ok(report)
    }

    /// Compare active records against the provider without changing either.
    ///
    /// Orphaned records and untracked machines are reported for an operator
    /// to act on; nothing here repairs them.
    pub async fn audit(&self) -> Result<AuditReport> {
        let mut report = AuditReport::default();

        for record in self.list_active().await? {
            report.checked += 1;
            match self.client.get_machine(&record.machine_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    warn!(machine_id = %record.machine_id, "audit: active record has no remote machine");
                    report.orphaned_records.push(record);
                }
                Err(e) => {
                    warn!(machine_id = %record.machine_id, error = %e, "audit: status check failed");
                    report.unreachable.push(record.machine_id);
                }
            }
        }

        let known: HashSet<String> = self
            .store
            .find_many(&RecordFilter::default())
            .await?
            .into_iter()
            .map(|r| r.machine_id)
            .collect();
        let remote = self
            .client
            .list_machines()
            .await
            .inspect_err(|e| error!(error = %e, "fly: list machines failed"))?;
        for machine in remote {
            if !known.contains(&machine.id) {
                warn!(machine_id = %machine.id, region = %machine.region, "audit: remote machine has no local record");
                report.untracked_machines.push(machine);
            }
        }

        Ok(report)
    }

    /// True when records exist for `machine_id` and every one is `deleted`.
    async fn already_destroyed(&self, machine_id: &str) -> Result<bool> {
        let records = self
            .store
            .find_many(&RecordFilter::machine(machine_id))
            .await
            .inspect_err(|e| error!(machine_id, error = %e, "record lookup failed, machine left running"))?;
        if records.is_empty() {
            debug!(machine_id, "no local record for machine being destroyed");
            return Ok(false);
        }
        Ok(records.iter().all(|r| r.state == RecordState::Deleted))
    }

    async fn delete_remote(&self, machine_id: &str) -> Result<()> {
        self.client
            .delete_machine(machine_id, true)
            .await
            .inspect_err(|e| {
                error!(machine_id, error = %e, "fly: remote delete failed, record left pending_delete")
            })?;
        Ok(())
    }

    async fn finalize(&self, machine_id: &str) -> Result<()> {
        let filter = RecordFilter::machine(machine_id).with_state(RecordState::PendingDelete);
        self.store
            .update_state(&filter, RecordState::Deleted)
            .await
            .inspect_err(|e| error!(machine_id, error = %e, "remote machine deleted but record not finalized"))?;
        Ok(())
    }
}
