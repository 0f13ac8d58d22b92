//! Submission registry and persistence.
//!
//! Keeps every hash the gateway obtained together with its last known status,
//! so timed-out or half-finished payments can be reconciled later.
//!
//! The registry is bounded: past `max_records`, settled records (validated
//! first, then failed or rejected) are evicted oldest first. Pending and
//! timed-out records are never evicted. With a persistence path, every change
//! is written through to disk.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ledger::TxHash;
use crate::observability::metrics;

/// Last known state of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Validated,
    Failed,
    Rejected,
    TimedOut,
}

/// One submitted transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub hash: TxHash,
    /// Transaction type, e.g. `Payment`.
    pub kind: String,
    pub account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// `value currency`, e.g. `500 VIP`.
    pub amount: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_result: Option<String>,
    /// Seconds since epoch.
    pub submitted_at: u64,
    pub updated_at: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Default bound on stored records.
pub const DEFAULT_MAX_RECORDS: usize = 10_000;

/// Thread-safe registry of submissions, optionally backed by a JSON file.
#[derive(Clone)]
pub struct SubmissionRegistry {
    inner: Arc<DashMap<TxHash, SubmissionRecord>>,
    persistence_path: Option<String>,
    max_records: usize,
}

impl Default for SubmissionRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SubmissionRegistry {
    pub fn new(persistence_path: Option<String>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
            max_records: DEFAULT_MAX_RECORDS,
        }
    }

    /// Bound the number of stored records.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records.max(1);
        self.evict_settled();
        self
    }

    /// Load from `path` if it exists; later saves go to the same file.
    pub fn load_from_file(path: &str) -> std::io::Result<Self> {
        let registry = Self::new(Some(path.to_string()));
        if Path::new(path).exists() {
            let reader = BufReader::new(File::open(path)?);
            let map: HashMap<TxHash, SubmissionRecord> = serde_json::from_reader(reader)?;
            for (hash, record) in map {
                registry.inner.insert(hash, record);
            }
            metrics::record_registry_size(registry.inner.len());
            tracing::info!(records = registry.inner.len(), path, "Loaded submission registry");
        }
        Ok(registry)
    }

    /// Write all records to the persistence file, if one is configured.
    pub fn save_to_file(&self) -> std::io::Result<()> {
        if let Some(path) = &self.persistence_path {
            let records = self.write_file(path)?;
            tracing::info!(records, path = %path, "Saved submission registry");
        }
        Ok(())
    }

    /// Replace the file through a temporary sibling so a crash mid-write
    /// leaves the previous copy intact.
    fn write_file(&self, path: &str) -> std::io::Result<usize> {
        let map: HashMap<TxHash, SubmissionRecord> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        let tmp = format!("{}.tmp", path);
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &map)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(map.len())
    }

    /// Write-through after a change. Failures are logged, not returned: the
    /// in-memory registry stays authoritative.
    fn persist(&self) {
        if let Some(path) = &self.persistence_path {
            match self.write_file(path) {
                Ok(records) => tracing::debug!(records, path = %path, "Persisted submission registry"),
                Err(e) => tracing::warn!(error = %e, path = %path, "Failed to persist submission registry"),
            }
        }
    }

    /// Record a freshly obtained hash.
    pub fn record(&self, record: SubmissionRecord) {
        self.inner.insert(record.hash.clone(), record);
        self.evict_settled();
        metrics::record_registry_size(self.inner.len());
        self.persist();
    }

    /// Update the status of a known hash. Unknown hashes are ignored.
    pub fn update_status(&self, hash: &TxHash, status: RecordStatus, engine_result: Option<String>) {
        let updated = match self.inner.get_mut(hash) {
            Some(mut entry) => {
                entry.status = status;
                if engine_result.is_some() {
                    entry.engine_result = engine_result;
                }
                entry.updated_at = now_secs();
                true
            }
            None => false,
        };
        if updated {
            self.persist();
        }
    }

    /// Drop settled records beyond the bound, validated before failed, oldest
    /// first.
    fn evict_settled(&self) {
        let excess = self.inner.len().saturating_sub(self.max_records);
        if excess == 0 {
            return;
        }

        let mut candidates: Vec<(u8, u64, TxHash)> = self
            .inner
            .iter()
            .filter_map(|r| {
                let rank = match r.value().status {
                    RecordStatus::Validated => 0,
                    RecordStatus::Failed | RecordStatus::Rejected => 1,
                    RecordStatus::Pending | RecordStatus::TimedOut => return None,
                };
                Some((rank, r.value().submitted_at, r.key().clone()))
            })
            .collect();
        candidates.sort_by_key(|(rank, submitted_at, _)| (*rank, *submitted_at));

        let mut evicted = 0;
        for (_, _, hash) in candidates.into_iter().take(excess) {
            if self.inner.remove(&hash).is_some() {
                evicted += 1;
            }
        }
        if evicted < excess {
            tracing::warn!(
                records = self.inner.len(),
                max_records = self.max_records,
                "Registry over its bound with unresolved records"
            );
        }
        tracing::debug!(evicted, "Evicted settled registry records");
    }

    pub fn get(&self, hash: &TxHash) -> Option<SubmissionRecord> {
        self.inner.get(hash).map(|r| r.value().clone())
    }

    /// Most recent records first.
    pub fn recent(&self, limit: usize) -> Vec<SubmissionRecord> {
        let mut records: Vec<SubmissionRecord> = self.inner.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then_with(|| a.hash.as_str().cmp(b.hash.as_str())));
        records.truncate(limit);
        records
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }

    /// Counts of (pending, timed out) records, the ones that still need attention.
    pub fn unresolved(&self) -> (usize, usize) {
        let mut pending = 0;
        let mut timed_out = 0;
        for r in self.inner.iter() {
            match r.value().status {
                RecordStatus::Pending => pending += 1,
                RecordStatus::TimedOut => timed_out += 1,
                _ => {}
            }
        }
        (pending, timed_out)
    }
}

impl SubmissionRecord {
    pub fn new(hash: TxHash, kind: &str, account: String, destination: Option<String>, amount: String) -> Self {
        let now = now_secs();
        Self {
            hash,
            kind: kind.to_string(),
            account,
            destination,
            amount,
            status: RecordStatus::Pending,
            engine_result: None,
            submitted_at: now,
            updated_at: now,
        }
    }
}
