//! Local record of provisioned machines and who owns them.
//!
//! Records are append-only: rows are never physically removed, only
//! tombstoned through [`RecordState`].

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use memory::MemoryMachineStore;
pub use models::{MachineRecord, NewMachineRecord, RecordFilter, RecordState};
pub use postgres::PgMachineStore;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("machine id already recorded: {0}")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Durable mapping from machine id to ownership metadata.
///
/// Implementations only need the four shapes below (plus a plain
/// `find_first`); no transactions or locking are assumed.
#[async_trait]
pub trait MachineRecordStore: Send + Sync + 'static {
    /// Insert one record. A machine id that was ever recorded is rejected.
    async fn create(&self, record: &NewMachineRecord) -> Result<MachineRecord>;

    /// Move every record matching `filter` to `state`, returning the number touched.
    async fn update_state(&self, filter: &RecordFilter, state: RecordState) -> Result<u64>;

    /// All matching records, oldest first.
    async fn find_many(&self, filter: &RecordFilter) -> Result<Vec<MachineRecord>>;

    async fn find_first(&self, filter: &RecordFilter) -> Result<Option<MachineRecord>>;

    /// Address of the first matching record, without loading the rest of the row.
    async fn find_address(&self, filter: &RecordFilter) -> Result<Option<String>>;
}

/// Create a connection pool to PostgreSQL.
pub async fn create_pool(database_url: &str) -> std::result::Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
