//! libSQL job journal (local file).
//!
//! The [`JobStore`] records every launched job and, once its background
//! pipeline ends, the [`CompletionRecord`]. This is what makes completion
//! records retrievable after the launching caller has gone away, and what
//! lets unfinished jobs be re-attached after a restart.

mod migrations;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use crawlrelay_shared::{CompletionRecord, Job, JobStatus, RelayError, Result};
use libsql::{Connection, Database, params};

/// Handle wrapping the job journal database.
pub struct JobStore {
    // Owns the file handle `conn` was opened from.
    _db: Database,
    conn: Connection,
}

const JOB_COLUMNS: &str =
    "id, kind, source_url, target_uri, status, params_json, created_at, completion_json";

impl JobStore {
    /// Open or create a journal at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RelayError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        let store = Self { _db: db, conn };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    RelayError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Job operations
    // -----------------------------------------------------------------------

    /// Record a freshly launched job.
    pub async fn insert_job(&self, job: &Job) -> Result<()> {
        let params_json = serde_json::to_string(&job.params)
            .map_err(|e| RelayError::Storage(format!("encode params: {e}")))?;
        let created_at = job.created_at.to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO jobs (id, kind, source_url, target_uri, status, params_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    job.id.as_str(),
                    job.kind.as_str(),
                    job.source_url.as_str(),
                    job.target_uri.as_str(),
                    job.status.as_str(),
                    params_json,
                    created_at.as_str(),
                    created_at.as_str(),
                ],
            )
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Update the observed status of a job that has not finished yet.
    pub async fn update_status(&self, id: &str, status: JobStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE jobs SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND completion_json IS NULL",
                params![status.as_str(), now.as_str(), id],
            )
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Take the completion lease on an unfinished job until `until`.
    ///
    /// Succeeds only when nobody holds the lease or the holder's lease has
    /// expired; a second claim by the same owner also fails. Returns `false`
    /// when the job is unknown, finished, or leased to someone else.
    pub async fn claim_job(&self, id: &str, owner: &str, until: DateTime<Utc>) -> Result<bool> {
        let now = timestamp(Utc::now());
        let changed = self
            .conn
            .execute(
                "UPDATE jobs SET lease_owner = ?1, lease_expires_at = ?2, updated_at = ?3
                 WHERE id = ?4 AND completion_json IS NULL
                   AND (lease_owner IS NULL OR lease_expires_at IS NULL OR lease_expires_at < ?3)",
                params![owner, timestamp(until), now.as_str(), id],
            )
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Give up `owner`'s lease so another relay may resume the job at once.
    pub async fn release_job(&self, id: &str, owner: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE jobs SET lease_owner = NULL, lease_expires_at = NULL
                 WHERE id = ?1 AND lease_owner = ?2",
                params![id, owner],
            )
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Store the final record. Returns `false` if the job is unknown or
    /// already has one.
    pub async fn finish_job(&self, record: &CompletionRecord) -> Result<bool> {
        let completion_json = serde_json::to_string(record)
            .map_err(|e| RelayError::Storage(format!("encode completion: {e}")))?;
        let now = Utc::now().to_rfc3339();

        let changed = self
            .conn
            .execute(
                "UPDATE jobs SET status = ?1, completion_json = ?2, updated_at = ?3
                 WHERE id = ?4 AND completion_json IS NULL",
                params![
                    record.status().as_str(),
                    completion_json,
                    now.as_str(),
                    record.id()
                ],
            )
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Get a job by id.
    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id])
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(RelayError::Storage(e.to_string())),
        }
    }

    /// Get the completion record of a finished job.
    ///
    /// `Ok(None)` means the job is known but still in flight; an unknown id is
    /// [`RelayError::NotFound`].
    pub async fn get_completion(&self, id: &str) -> Result<Option<CompletionRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT completion_json FROM jobs WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => match row.get::<String>(0).ok() {
                Some(json) => serde_json::from_str(&json)
                    .map(Some)
                    .map_err(|e| RelayError::Storage(format!("decode completion for {id}: {e}"))),
                None => Ok(None),
            },
            Ok(None) => Err(RelayError::NotFound(id.to_string())),
            Err(e) => Err(RelayError::Storage(e.to_string())),
        }
    }

    /// All jobs, newest first.
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC");
        self.collect_jobs(&sql).await
    }

    /// Jobs whose pipeline has not produced a completion record, oldest first.
    pub async fn list_unfinished(&self) -> Result<Vec<Job>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE completion_json IS NULL ORDER BY created_at"
        );
        self.collect_jobs(&sql).await
    }

    async fn collect_jobs(&self, sql: &str) -> Result<Vec<Job>> {
        let mut rows = self
            .conn
            .query(sql, params![])
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_job(&row) {
                Ok(job) => results.push(job),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable journal row"),
            }
        }
        Ok(results)
    }
}

/// Fixed-width UTC timestamps, so the lease columns compare as text.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Convert a database row (selected with [`JOB_COLUMNS`]) to a [`Job`].
fn row_to_job(row: &libsql::Row) -> Result<Job> {
    let text = |idx: i32| -> Result<String> {
        row.get::<String>(idx)
            .map_err(|e| RelayError::Storage(e.to_string()))
    };

    let params_json = text(5)?;
    let created_at = text(6)?;

    Ok(Job {
        id: text(0)?,
        kind: text(1)?.parse()?,
        source_url: text(2)?,
        target_uri: text(3)?.parse()?,
        status: text(4)?.parse()?,
        params: serde_json::from_str(&params_json)
            .map_err(|e| RelayError::Storage(format!("decode params: {e}")))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RelayError::Storage(format!("invalid date: {e}")))?,
    })
}
