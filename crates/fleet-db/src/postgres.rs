use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::{MachineRecord, NewMachineRecord, RecordFilter, RecordState};
use crate::{Error, MachineRecordStore, Result};

// NULL parameters disable their predicate, so one statement serves every filter.
const FILTER: &str = "($1::text IS NULL OR machine_id = $1) AND ($2::machine_record_state IS NULL OR state = $2)";

/// [`MachineRecordStore`] backed by the `machine_records` table.
#[derive(Clone)]
pub struct PgMachineStore {
    pool: PgPool,
}

impl PgMachineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MachineRecordStore for PgMachineStore {
    async fn create(&self, record: &NewMachineRecord) -> Result<MachineRecord> {
        sqlx::query_as(
            r#"INSERT INTO machine_records (owner_token, machine_id, address, created_at)
               VALUES ($1, $2, $3, $4)
               RETURNING *"#,
        )
        .bind(&record.owner_token)
        .bind(&record.machine_id)
        .bind(&record.address)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Error::Conflict(record.machine_id.clone())
            }
            e => Error::Database(e),
        })
    }

    async fn update_state(&self, filter: &RecordFilter, state: RecordState) -> Result<u64> {
        let result = sqlx::query(&format!("UPDATE machine_records SET state = $3 WHERE {FILTER}"))
            .bind(filter.machine_id.as_deref())
            .bind(filter.state)
            .bind(state)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_many(&self, filter: &RecordFilter) -> Result<Vec<MachineRecord>> {
        let records = sqlx::query_as(&format!(
            "SELECT * FROM machine_records WHERE {FILTER} ORDER BY created_at"
        ))
        .bind(filter.machine_id.as_deref())
        .bind(filter.state)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn find_first(&self, filter: &RecordFilter) -> Result<Option<MachineRecord>> {
        let record = sqlx::query_as(&format!(
            "SELECT * FROM machine_records WHERE {FILTER} ORDER BY created_at LIMIT 1"
        ))
        .bind(filter.machine_id.as_deref())
        .bind(filter.state)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_address(&self, filter: &RecordFilter) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT address FROM machine_records WHERE {FILTER} ORDER BY created_at LIMIT 1"
        ))
        .bind(filter.machine_id.as_deref())
        .bind(filter.state)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(address,)| address))
    }
}
