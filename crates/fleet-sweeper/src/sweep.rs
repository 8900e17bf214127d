use std::sync::Arc;
use std::time::Duration;

use fleet_core::Fleet;

/// Spawn the background reconciliation task.
pub fn spawn_sweeper(fleet: Arc<Fleet>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            sweep(&fleet).await;
        }
    })
}

/// One pass: finish interrupted destroys, then report drift.
pub async fn sweep(fleet: &Fleet) {
    let lifecycle = fleet.lifecycle();

    match lifecycle.reconcile_pending_deletes().await {
        Ok(report) if !report.failed.is_empty() => {
            tracing::warn!(failed = ?report.failed, "pending deletes still outstanding");
        }
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "pending delete reconciliation failed"),
    }

    match lifecycle.audit().await {
        Ok(report) if report.is_consistent() => {
            tracing::info!(checked = report.checked, "audit: records match provider");
        }
        Ok(report) => {
            let orphaned: Vec<_> = report.orphaned_records.iter().map(|r| &r.machine_id).collect();
            let untracked: Vec<_> = report.untracked_machines.iter().map(|m| &m.id).collect();
            tracing::warn!(
                checked = report.checked,
                ?orphaned,
                ?untracked,
                unreachable = ?report.unreachable,
                "audit: records diverge from provider"
            );
        }
        Err(e) => tracing::error!(error = %e, "audit failed"),
    }
}
