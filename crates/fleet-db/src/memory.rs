use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{MachineRecord, NewMachineRecord, RecordFilter, RecordState};
use crate::{Error, MachineRecordStore, Result};

/// In-process [`MachineRecordStore`], for tests and single-process embedding.
#[derive(Default)]
pub struct MemoryMachineStore {
    records: Mutex<Vec<MachineRecord>>,
}

impl MemoryMachineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record ever written, tombstones included.
    pub fn snapshot(&self) -> Vec<MachineRecord> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MachineRecord>> {
        // A panic while holding the lock cannot leave a half-written record.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MachineRecordStore for MemoryMachineStore {
    async fn create(&self, record: &NewMachineRecord) -> Result<MachineRecord> {
        let mut records = self.lock();
        if records.iter().any(|r| r.machine_id == record.machine_id) {
            return Err(Error::Conflict(record.machine_id.clone()));
        }
        let created = MachineRecord {
            id: Uuid::new_v4(),
            owner_token: record.owner_token.clone(),
            machine_id: record.machine_id.clone(),
            address: record.address.clone(),
            state: RecordState::Active,
            created_at: record.created_at,
        };
        records.push(created.clone());
        Ok(created)
    }

    async fn update_state(&self, filter: &RecordFilter, state: RecordState) -> Result<u64> {
        let mut touched = 0;
        for record in self.lock().iter_mut().filter(|r| filter.matches(r)) {
            record.state = state;
            touched += 1;
        }
        Ok(touched)
    }

    async fn find_many(&self, filter: &RecordFilter) -> Result<Vec<MachineRecord>> {
        let mut found: Vec<_> = self.lock().iter().filter(|r| filter.matches(r)).cloned().collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    async fn find_first(&self, filter: &RecordFilter) -> Result<Option<MachineRecord>> {
        Ok(self.find_many(filter).await?.into_iter().next())
    }

    async fn find_address(&self, filter: &RecordFilter) -> Result<Option<String>> {
        Ok(self.find_first(filter).await?.map(|r| r.address))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn new_record(machine_id: &str) -> NewMachineRecord {
        NewMachineRecord {
            owner_token: "tok".into(),
            machine_id: machine_id.into(),
            address: format!("fdaa::{machine_id}"),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_starts_active() {
        let store = MemoryMachineStore::new();
        let record = store.create(&new_record("m1")).await.unwrap();
        assert_eq!(record.state, RecordState::Active);
        assert_eq!(record.machine_id, "m1");
    }

    #[tokio::test]
    async fn machine_ids_are_never_reused() {
        let store = MemoryMachineStore::new();
        store.create(&new_record("m1")).await.unwrap();
        store
            .update_state(&RecordFilter::machine("m1"), RecordState::Deleted)
            .await
            .unwrap();

        let err = store.create(&new_record("m1")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(id) if id == "m1"));
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn update_state_reports_rows_touched() {
        let store = MemoryMachineStore::new();
        store.create(&new_record("m1")).await.unwrap();
        store.create(&new_record("m2")).await.unwrap();

        let touched = store
            .update_state(&RecordFilter::machine("m1"), RecordState::PendingDelete)
            .await
            .unwrap();
        assert_eq!(touched, 1);

        let touched = store
            .update_state(&RecordFilter::machine("missing"), RecordState::Deleted)
            .await
            .unwrap();
        assert_eq!(touched, 0);
    }

    #[tokio::test]
    async fn lookups_skip_tombstones() {
        let store = MemoryMachineStore::new();
        store.create(&new_record("m1")).await.unwrap();
        store
            .update_state(&RecordFilter::machine("m1"), RecordState::PendingDelete)
            .await
            .unwrap();

        assert!(store.find_first(&RecordFilter::active("m1")).await.unwrap().is_none());
        assert!(store.find_address(&RecordFilter::active("m1")).await.unwrap().is_none());
        assert!(store.find_first(&RecordFilter::machine("m1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn find_many_orders_by_creation_time() {
        let store = MemoryMachineStore::new();
        let mut later = new_record("later");
        later.created_at = Utc::now() + Duration::minutes(5);
        store.create(&later).await.unwrap();
        store.create(&new_record("earlier")).await.unwrap();

        let ids: Vec<_> = store
            .find_many(&RecordFilter::in_state(RecordState::Active))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.machine_id)
            .collect();
        assert_eq!(ids, ["earlier", "later"]);
    }

    #[tokio::test]
    async fn find_address_projects_cached_address() {
        let store = MemoryMachineStore::new();
        store.create(&new_record("m1")).await.unwrap();
        let address = store.find_address(&RecordFilter::active("m1")).await.unwrap();
        assert_eq!(address.as_deref(), Some("fdaa::m1"));
    }
}
