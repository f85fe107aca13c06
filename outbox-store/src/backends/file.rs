//! File-backed store backend.
//!
//! One `{id}.bin` bincode row per record, where `{id}` is the record's
//! ULID. IDs are lexicographically sortable by creation time, so a plain
//! directory scan already yields creation order.
//!
//! All writes go to a `.tmp_` file first and are renamed into place, so a
//! crash mid-write never leaves a half-row where `list` can see it.
//! Deletion renames to a `.deleted` suffix before removing; orphans from
//! either phase are swept on `init`.
//!
//! Claims and updates are serialized behind one async mutex, which makes
//! the read-check-write of `claim_sending` atomic for every process sharing
//! this store instance. Multi-process deployments want a backend with real
//! transactional updates; this one is for single-process daemons and small
//! installations.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::{fs, sync::Mutex};
use tracing::debug;

use crate::{
    crypto::Cryptor,
    error::{Result, StoreError},
    record::Email,
    row::EmailRow,
    store::Store,
    types::EmailId,
};

/// File-per-record store implementation.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    cryptor: Option<Cryptor>,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store rooted at `path`.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidPath`] if the path is relative,
    /// contains `..`, or points into a system directory.
    pub fn new(path: impl Into<PathBuf>, cryptor: Option<Cryptor>) -> Result<Self> {
        let path = path.into();
        validate_path(&path)?;

        Ok(Self {
            path,
            cryptor,
            write_lock: Mutex::new(()),
        })
    }

    /// Prepare the store directory: create it if missing, verify it is a
    /// directory, and sweep temp/deleted orphans left by earlier crashes.
    ///
    /// Call once at startup so permission problems fail fast.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or read.
    pub fn init(&self) -> Result<()> {
        if !self.path.try_exists()? {
            debug!(path = %self.path.display(), "store directory missing, creating");
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(StoreError::InvalidPath(format!(
                "{} exists but is not a directory",
                self.path.display()
            )));
        }

        let mut swept = 0usize;
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(".tmp_") || name.ends_with(".deleted") {
                std::fs::remove_file(entry.path())?;
                swept += 1;
            }
        }
        if swept > 0 {
            debug!(swept, "swept orphaned files from store directory");
        }

        Ok(())
    }

    fn row_path(&self, id: &EmailId) -> PathBuf {
        self.path.join(format!("{id}.bin"))
    }

    /// Write a row via temp file + atomic rename.
    async fn write_row(&self, row: &EmailRow) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(row, bincode::config::standard())?;

        let final_path = self.row_path(&row.id);
        let temp_path = self.path.join(format!(".tmp_{}.bin", row.id));

        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, &final_path).await?;

        Ok(())
    }

    async fn read_row(&self, id: &EmailId) -> Result<EmailRow> {
        let bytes = match fs::read(self.row_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*id));
            }
            Err(e) => return Err(e.into()),
        };

        let (row, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;

        Ok(row)
    }

    /// All record ids currently in the store, in creation order.
    async fn list_ids(&self) -> Result<Vec<EmailId>> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if !name.starts_with(".tmp_")
                && let Some(id) = EmailId::from_filename(&name)
            {
                ids.push(id);
            }
        }

        ids.sort();

        Ok(ids)
    }

    /// Read every row, skipping records that vanish mid-scan.
    async fn read_all(&self) -> Result<Vec<EmailRow>> {
        let mut rows = Vec::new();
        for id in self.list_ids().await? {
            match self.read_row(&id).await {
                Ok(row) => rows.push(row),
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(rows)
    }

    /// Two-phase delete: rename to `.deleted`, then remove. A crash in
    /// between leaves only an orphan that `init` sweeps.
    async fn remove_row(&self, id: &EmailId) -> Result<()> {
        let final_path = self.row_path(id);
        let deleted_path = self.path.join(format!("{id}.bin.deleted"));

        fs::rename(&final_path, &deleted_path).await?;
        fs::remove_file(&deleted_path).await?;

        Ok(())
    }
}

/// Reject store paths that could escape or damage the system.
fn validate_path(path: &Path) -> Result<()> {
    for component in path.components() {
        if component == std::path::Component::ParentDir {
            return Err(StoreError::InvalidPath(format!(
                "store path cannot contain '..' components: {}",
                path.display()
            )));
        }
    }

    if !path.is_absolute() {
        return Err(StoreError::InvalidPath(format!(
            "store path must be absolute: {}",
            path.display()
        )));
    }

    let sensitive_prefixes = [
        "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
    ];
    for prefix in &sensitive_prefixes {
        if path.starts_with(prefix) {
            return Err(StoreError::InvalidPath(format!(
                "store path cannot be in system directory {prefix}: {}",
                path.display()
            )));
        }
    }

    Ok(())
}

#[async_trait]
impl Store for FileStore {
    async fn insert(&self, email: Email) -> Result<Email> {
        let row = EmailRow::encode(&email, self.cryptor.as_ref())?;
        self.write_row(&row).await?;

        debug!(id = %row.id, "persisted record");

        Ok(row.decode(self.cryptor.as_ref()))
    }

    async fn get(&self, id: &EmailId) -> Result<Email> {
        let row = self.read_row(id).await?;

        Ok(row.decode(self.cryptor.as_ref()))
    }

    async fn select_queue(&self, max_attempts: u32, limit: usize) -> Result<Vec<Email>> {
        let now = Utc::now();
        let mut eligible: Vec<EmailRow> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|row| row.is_eligible(max_attempts, now))
            .collect();

        eligible.sort_by_key(|row| (row.created_at, row.id));
        eligible.truncate(limit);

        Ok(eligible
            .iter()
            .map(|row| row.decode(self.cryptor.as_ref()))
            .collect())
    }

    async fn select_failed(&self, id: Option<EmailId>) -> Result<Vec<Email>> {
        let mut failed: Vec<EmailRow> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|row| {
                row.failed
                    && row.sent_at.is_none()
                    && row.deleted_at.is_none()
                    && id.is_none_or(|id| row.id == id)
            })
            .collect();

        failed.sort_by_key(|row| (row.created_at, row.id));

        Ok(failed
            .iter()
            .map(|row| row.decode(self.cryptor.as_ref()))
            .collect())
    }

    async fn claim_sending(&self, id: &EmailId) -> Result<Option<Email>> {
        let _guard = self.write_lock.lock().await;

        let mut row = match self.read_row(id).await {
            Ok(row) => row,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        if row.sending || row.sent_at.is_some() {
            return Ok(None);
        }

        row.sending = true;
        row.attempts += 1;
        row.updated_at = Utc::now();
        self.write_row(&row).await?;

        Ok(Some(row.decode(self.cryptor.as_ref())))
    }

    async fn mark_sent(&self, id: &EmailId) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut row = self.read_row(id).await?;
        let now = Utc::now();
        row.sending = false;
        row.sent_at = Some(now);
        row.failed = false;
        row.error = None;
        row.updated_at = now;

        self.write_row(&row).await
    }

    async fn record_failure(&self, id: &EmailId, error: &str, exhausted: bool) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut row = self.read_row(id).await?;
        row.sending = false;
        row.error = Some(error.to_string());
        if exhausted {
            row.failed = true;
        }
        row.updated_at = Utc::now();

        self.write_row(&row).await
    }

    async fn soft_delete(&self, id: &EmailId) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut row = self.read_row(id).await?;
        let now = Utc::now();
        row.deleted_at = Some(now);
        row.updated_at = now;

        self.write_row(&row).await
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let mut pruned = 0;
        for row in self.read_all().await? {
            let terminal = row.sent_at.is_some() || row.failed || row.deleted_at.is_some();
            if terminal && row.created_at < older_than {
                self.remove_row(&row.id).await?;
                pruned += 1;
            }
        }

        if pruned > 0 {
            debug!(pruned, "pruned terminal records");
        }

        Ok(pruned)
    }

    async fn release_stale(&self, stuck_for: Duration) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let cutoff = Utc::now() - stuck_for;
        let mut released = 0;

        for mut row in self.read_all().await? {
            if row.sending && row.sent_at.is_none() && row.updated_at < cutoff {
                row.sending = false;
                row.updated_at = Utc::now();
                self.write_row(&row).await?;
                released += 1;
            }
        }

        Ok(released)
    }
}
