//! Resumable upload checkpoints
//!
//! Adapters record how far a chunked transfer got so a retry, or a later
//! call with resume enabled, continues from the acknowledged offset instead
//! of sending the whole file again.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::error::{CheckpointError, Result};
use crate::types::PlatformId;

/// Progress of one resumable transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeState {
    /// Platform-issued URI identifying the upload session
    pub session_uri: String,
    /// Bytes acknowledged by the platform
    pub offset: u64,
    pub total: u64,
}

impl ResumeState {
    pub fn new(session_uri: impl Into<String>, offset: u64, total: u64) -> Self {
        Self {
            session_uri: session_uri.into(),
            offset,
            total,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.offset >= self.total
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.offset)
    }
}

/// Storage for resume state keyed by platform and content fingerprint
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, platform: PlatformId, fingerprint: &str) -> Result<Option<ResumeState>>;

    async fn save(&self, platform: PlatformId, fingerprint: &str, state: &ResumeState)
        -> Result<()>;

    async fn clear(&self, platform: PlatformId, fingerprint: &str) -> Result<()>;
}

/// Process-local checkpoint store
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<HashMap<(PlatformId, String), ResumeState>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, platform: PlatformId, fingerprint: &str) -> Result<Option<ResumeState>> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(&(platform, fingerprint.to_string())).cloned())
    }

    async fn save(
        &self,
        platform: PlatformId,
        fingerprint: &str,
        state: &ResumeState,
    ) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert((platform, fingerprint.to_string()), state.clone());
        Ok(())
    }

    async fn clear(&self, platform: PlatformId, fingerprint: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(&(platform, fingerprint.to_string()));
        Ok(())
    }
}

/// SQLite-backed checkpoint store surviving process restarts
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Open (creating if needed) the checkpoint database at `db_path`
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(CheckpointError::IoError)?;
        }

        // mode=rwc creates the file on first use
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(CheckpointError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(CheckpointError::MigrationError)?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, platform: PlatformId, fingerprint: &str) -> Result<Option<ResumeState>> {
        use sqlx::Row;

        let row = sqlx::query(
            r#"
            SELECT session_uri, byte_offset, total_bytes
            FROM upload_checkpoints WHERE platform = ? AND fingerprint = ?
            "#,
        )
        .bind(platform.as_str())
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(CheckpointError::SqlxError)?;

        Ok(row.map(|r| ResumeState {
            session_uri: r.get("session_uri"),
            offset: r.get::<i64, _>("byte_offset") as u64,
            total: r.get::<i64, _>("total_bytes") as u64,
        }))
    }

    async fn save(
        &self,
        platform: PlatformId,
        fingerprint: &str,
        state: &ResumeState,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_checkpoints
                (platform, fingerprint, session_uri, byte_offset, total_bytes, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (platform, fingerprint) DO UPDATE SET
                session_uri = excluded.session_uri,
                byte_offset = excluded.byte_offset,
                total_bytes = excluded.total_bytes,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(platform.as_str())
        .bind(fingerprint)
        .bind(&state.session_uri)
        .bind(state.offset as i64)
        .bind(state.total as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(CheckpointError::SqlxError)?;

        Ok(())
    }

    async fn clear(&self, platform: PlatformId, fingerprint: &str) -> Result<()> {
        sqlx::query("DELETE FROM upload_checkpoints WHERE platform = ? AND fingerprint = ?")
            .bind(platform.as_str())
            .bind(fingerprint)
            .execute(&self.pool)
            .await
            .map_err(CheckpointError::SqlxError)?;

        Ok(())
    }
}
