mod assignments;
mod chunks;
mod documents;
mod plan;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::StoreError;

pub use assignments::AssignmentCount;
pub use chunks::{ChunkRecord, EmbeddedChunk, StoredChunk};
pub use documents::{DocumentRecord, ModuleOverview};
pub use plan::{LessonPlan, PlanSubtopic, PlanTopic, PlanUnit};

#[derive(Debug, Clone)]
pub struct CourseStore {
    pool: SqlitePool,
}

impl CourseStore {
    /// Open (or create) the `SQLite` database and run migrations.
    ///
    /// Enables foreign key constraints at connection level so that
    /// `ON DELETE CASCADE` rules (plan rebuilds, document re-ingestion)
    /// are enforced.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        sqlx::migrate!("../../migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Expose the underlying pool for ad-hoc queries in callers and tests.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
