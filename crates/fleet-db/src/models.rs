use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ── RecordState ─────────────────────────────────────────────────────

/// Lifecycle of a local record.
///
/// `PendingDelete` is written before the remote machine is destroyed and
/// only advances to `Deleted` once the provider confirms. Both count as
/// tombstoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "machine_record_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Active,
    PendingDelete,
    Deleted,
}

impl RecordState {
    pub fn is_tombstoned(self) -> bool {
        !matches!(self, Self::Active)
    }
}

// ── MachineRecord ───────────────────────────────────────────────────

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MachineRecord {
    pub id: Uuid,
    pub owner_token: String,
    pub machine_id: String,
    /// Private address cached at creation; empty when the provider gave none.
    pub address: String,
    pub state: RecordState,
    pub created_at: DateTime<Utc>,
}

impl MachineRecord {
    pub fn is_tombstoned(&self) -> bool {
        self.state.is_tombstoned()
    }
}

#[derive(Debug, Clone)]
pub struct NewMachineRecord {
    pub owner_token: String,
    pub machine_id: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

// ── RecordFilter ────────────────────────────────────────────────────

/// Conjunction of optional equality predicates. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub machine_id: Option<String>,
    pub state: Option<RecordState>,
}

impl RecordFilter {
    pub fn machine(machine_id: impl Into<String>) -> Self {
        Self {
            machine_id: Some(machine_id.into()),
            state: None,
        }
    }

    pub fn in_state(state: RecordState) -> Self {
        Self {
            machine_id: None,
            state: Some(state),
        }
    }

    /// Live records for `machine_id`.
    pub fn active(machine_id: impl Into<String>) -> Self {
        Self::machine(machine_id).with_state(RecordState::Active)
    }

    pub fn with_state(mut self, state: RecordState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn matches(&self, record: &MachineRecord) -> bool {
        self.machine_id
            .as_deref()
            .is_none_or(|id| id == record.machine_id)
            && self.state.is_none_or(|s| s == record.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(machine_id: &str, state: RecordState) -> MachineRecord {
        MachineRecord {
            id: Uuid::new_v4(),
            owner_token: "owner".into(),
            machine_id: machine_id.into(),
            address: String::new(),
            state,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = RecordFilter::default();
        assert!(filter.matches(&record("a", RecordState::Active)));
        assert!(filter.matches(&record("b", RecordState::Deleted)));
    }

    #[test]
    fn active_filter_excludes_tombstones() {
        let filter = RecordFilter::active("a");
        assert!(filter.matches(&record("a", RecordState::Active)));
        assert!(!filter.matches(&record("a", RecordState::PendingDelete)));
        assert!(!filter.matches(&record("b", RecordState::Active)));
    }

    #[test]
    fn pending_delete_counts_as_tombstoned() {
        assert!(!RecordState::Active.is_tombstoned());
        assert!(RecordState::PendingDelete.is_tombstoned());
        assert!(RecordState::Deleted.is_tombstoned());
    }
}
