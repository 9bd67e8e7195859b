use crate::models::backup_run::{BackupRun, WalkReport};
use crate::models::error::{BackupError, Result};
use crate::models::history::{BackupHistoryEntry, BackupStatus};
use chrono::{DateTime, Utc};
use log::{debug, info};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

type DbPool = Pool<SqliteConnectionManager>;

/// How a finished run is written back to its history row.
#[derive(Debug, Clone, Copy)]
pub struct RunOutcome<'a> {
    pub status: BackupStatus,
    pub completed_at: DateTime<Utc>,
    pub report: Option<&'a WalkReport>,
    pub tree_digest: Option<&'a str>,
    pub error: Option<&'a str>,
}

/// Run history backed by a pooled SQLite database.
#[derive(Clone)]
pub struct HistoryStore {
    pool: DbPool,
}

impl HistoryStore {
    pub fn open(db_file: &str) -> Result<Self> {
        if db_file.is_empty() {
            return Err(BackupError::DatabaseConnection {
                path: db_file.to_string(),
                reason: "Database file path cannot be empty. Provide a valid path or use ':memory:' for in-memory database.".to_string(),
            });
        }

        info!("Initializing database connection pool: {}", db_file);

        let is_in_memory = db_file == ":memory:" || db_file.starts_with("file::memory:");
        let use_wal = !is_in_memory;

        let manager = SqliteConnectionManager::file(db_file).with_init(move |conn| {
            let mut pragmas = String::from(
                "PRAGMA busy_timeout = 5000;
                 PRAGMA synchronous = NORMAL;",
            );

            if use_wal {
                pragmas.push_str(" PRAGMA journal_mode = WAL;");
            }

            conn.execute_batch(&pragmas)
        });

        // Every in-memory connection is its own database, so keep exactly one.
        let pool_size = if is_in_memory { 1 } else { 4 };
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| BackupError::DatabaseConnection {
                path: db_file.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Database pool created with {} connections", pool_size);

        let store = Self { pool };
        store.setup_database()?;
        Ok(store)
    }

    fn get_connection(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| BackupError::DatabaseConnection {
            path: "pool".to_string(),
            reason: e.to_string(),
        })
    }

    fn setup_database(&self) -> Result<()> {
        let setup_queries = "BEGIN;
        PRAGMA ENCODING = 'UTF-8';

        CREATE TABLE IF NOT EXISTS Backup_Runs(
            ID               TEXT    not null
                constraint Backup_Runs_ID_pk
                    primary key,
            Root_Folder_ID   TEXT    not null,
            Destination      TEXT    not null,
            Started_At       TEXT    not null,
            Completed_At     TEXT,
            Status           TEXT    not null,
            Files_Downloaded integer not null default 0,
            Bytes_Downloaded integer not null default 0,
            Skipped          integer not null default 0,
            Tree_Digest      TEXT,
            Error            TEXT,
            constraint Backup_Runs_Status_Check
                check (Status IN ('running', 'completed', 'failed', 'stopped')));

        CREATE INDEX IF NOT EXISTS Backup_Runs_Started_At_index
                on Backup_Runs (Started_At DESC);

        COMMIT;";

        let conn = self.get_connection()?;
        conn.execute_batch(setup_queries)
            .map_err(|cause| BackupError::DatabaseQuery {
                operation: "create tables".to_string(),
                cause,
            })?;
        debug!("Database schema initialized");
        Ok(())
    }

    pub fn insert_run_started(&self, run: &BackupRun) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO Backup_Runs (ID, Root_Folder_ID, Destination, Started_At, Status)
                VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.id,
                run.root_folder_id,
                run.destination_root.to_string_lossy().to_string(),
                run.started_at.to_rfc3339(),
                BackupStatus::Running.as_str(),
            ],
        )
        .map_err(|cause| BackupError::DatabaseInsert {
            table: "Backup_Runs".to_string(),
            id: run.id.clone(),
            cause,
        })?;
        Ok(())
    }

    pub fn complete_run(&self, run_id: &str, outcome: &RunOutcome) -> Result<()> {
        let (files, bytes, skipped) = outcome
            .report
            .map(|r| (r.files_downloaded, r.bytes_downloaded, r.skipped.len() as u64))
            .unwrap_or_default();

        let conn = self.get_connection()?;
        let updated = conn
            .execute(
                "UPDATE Backup_Runs
                    SET Completed_At=?2, Status=?3, Files_Downloaded=?4,
                        Bytes_Downloaded=?5, Skipped=?6, Tree_Digest=?7, Error=?8
                    WHERE ID=?1",
                params![
                    run_id,
                    outcome.completed_at.to_rfc3339(),
                    outcome.status.as_str(),
                    files as i64,
                    bytes as i64,
                    skipped as i64,
                    outcome.tree_digest,
                    outcome.error,
                ],
            )
            .map_err(|cause| BackupError::DatabaseUpdate {
                table: "Backup_Runs".to_string(),
                id: run_id.to_string(),
                cause,
            })?;

        if updated == 0 {
            return Err(BackupError::NotFound {
                id: run_id.to_string(),
            });
        }
        Ok(())
    }

    /// Most recent runs first.
    pub fn select_recent_runs(&self, limit: u32) -> Result<Vec<BackupHistoryEntry>> {
        let conn = self.get_connection()?;
        let query_error = |cause: rusqlite::Error| BackupError::DatabaseQuery {
            operation: "select recent runs".to_string(),
            cause,
        };

        let mut query = conn
            .prepare(
                "SELECT ID, Root_Folder_ID, Destination, Started_At, Completed_At, Status,
                        Files_Downloaded, Bytes_Downloaded, Skipped, Tree_Digest, Error
                    FROM Backup_Runs
                    ORDER BY Started_At DESC, rowid DESC
                    LIMIT ?1",
            )
            .map_err(query_error)?;

        let rows = query
            .query_map([limit], |row| {
                let status: String = row.get(5)?;
                Ok(BackupHistoryEntry {
                    id: row.get(0)?,
                    root_folder_id: row.get(1)?,
                    destination: row.get(2)?,
                    started_at: row.get(3)?,
                    completed_at: row.get(4)?,
                    status: BackupStatus::parse(&status).unwrap_or(BackupStatus::Failed),
                    files_downloaded: row.get::<_, i64>(6)? as u64,
                    bytes_downloaded: row.get::<_, i64>(7)? as u64,
                    skipped: row.get::<_, i64>(8)? as u64,
                    tree_digest: row.get(9)?,
                    error: row.get(10)?,
                })
            })
            .map_err(query_error)?;

        let entries = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_error)?;
        Ok(entries)
    }

    pub fn delete_all_runs(&self) -> Result<usize> {
        let conn = self.get_connection()?;
        let deleted = conn
            .execute("DELETE FROM Backup_Runs", [])
            .map_err(|cause| BackupError::DatabaseQuery {
                operation: "delete runs".to_string(),
                cause,
            })?;
        info!("Deleted {} backup history entries", deleted);
        Ok(deleted)
    }
}
