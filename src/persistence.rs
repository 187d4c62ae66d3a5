//! Persistence of analysis records.
//!
//! Exported records carry the key, the result's serialized state, and the
//! captured faults as kind + message. Backtraces never leave the process.
//! Imported records behave exactly like cache hits: nothing is recomputed and
//! nothing is checked against the current project.
//!
//! Snapshot files wrap the record sequence in a small envelope and are
//! written atomically (temporary file + rename).

use crate::cache::AnalysisCache;
use crate::key::CacheKey;
use crate::ledger::{CapturedError, ErrorLedger};
use crate::record::AnalysisRecord;
use crate::registry::AnalysisRegistry;
use crate::session::Session;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Portable form of one [`AnalysisRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub key: CacheKey,
    pub result_state: serde_json::Value,
    #[serde(default)]
    pub errors: Vec<CapturedError>,
    #[serde(default)]
    pub named_errors: BTreeMap<String, CapturedError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub records: Vec<PersistedRecord>,
}

impl CacheSnapshot {
    pub fn new(records: Vec<PersistedRecord>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            created_at: Utc::now(),
            records,
        }
    }
}

pub fn export_record(record: &AnalysisRecord) -> Result<PersistedRecord> {
    let result_state = record
        .result()
        .export_state()
        .with_context(|| format!("Failed to export state of {}", record.key()))?;
    Ok(PersistedRecord {
        key: record.key().clone(),
        result_state,
        errors: record.errors().to_vec(),
        named_errors: record.named_errors().clone(),
    })
}

/// Export every cached record, ordered by key.
pub fn export(cache: &AnalysisCache) -> Result<Vec<PersistedRecord>> {
    cache.records().iter().map(|r| export_record(r)).collect()
}

/// Rebuild one record through its registered runnable.
pub fn import_record(registry: &AnalysisRegistry, persisted: PersistedRecord) -> Result<AnalysisRecord> {
    let descriptor = registry
        .lookup(&persisted.key.name)
        .with_context(|| format!("Cannot import {}", persisted.key))?;
    let result = descriptor
        .runnable()
        .restore(persisted.result_state)
        .with_context(|| format!("Failed to restore state of {}", persisted.key))?;

    let mut ledger = ErrorLedger::from_parts(persisted.errors, persisted.named_errors);
    ledger.strip_backtraces();
    Ok(AnalysisRecord::new(persisted.key, result, ledger, false))
}

/// Build a fresh cache from exported records. Later duplicates of a key are
/// ignored.
pub fn import(registry: &AnalysisRegistry, records: Vec<PersistedRecord>) -> Result<AnalysisCache> {
    let cache = AnalysisCache::new();
    for persisted in records {
        let record = import_record(registry, persisted)?;
        if !cache.insert_if_absent(record) {
            debug!("Skipping duplicate record in import");
        }
    }
    Ok(cache)
}

pub fn write_snapshot(path: &Path, snapshot: &CacheSnapshot, pretty: bool) -> Result<()> {
    let data = if pretty {
        serde_json::to_vec_pretty(snapshot)
    } else {
        serde_json::to_vec(snapshot)
    }
    .context("Failed to serialize cache snapshot")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create snapshot directory {}", parent.display()))?;
    }

    let temp_path = temp_path_for(path);
    fs::write(&temp_path, &data)
        .with_context(|| format!("Failed to write temporary snapshot {}", temp_path.display()))?;
    fs::rename(&temp_path, path).with_context(|| {
        // best effort; the rename error is what matters
        let _ = fs::remove_file(&temp_path);
        format!(
            "Failed to rename snapshot {} -> {}",
            temp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}

pub fn read_snapshot(path: &Path) -> Result<CacheSnapshot> {
    let data =
        fs::read(path).with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let snapshot: CacheSnapshot = serde_json::from_slice(&data)
        .with_context(|| format!("Invalid snapshot {}", path.display()))?;
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        bail!(
            "Unsupported snapshot format version {} in {} (expected {})",
            snapshot.format_version,
            path.display(),
            SNAPSHOT_FORMAT_VERSION
        );
    }
    Ok(snapshot)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

impl Session {
    pub fn export_records(&self) -> Result<Vec<PersistedRecord>> {
        export(self.cache())
    }

    /// Merge records into this session's cache. Keys that are already cached
    /// or being computed keep their live record. Returns how many were added.
    pub fn import_records(&self, records: Vec<PersistedRecord>) -> Result<usize> {
        let mut inserted = 0;
        for persisted in records {
            let record = import_record(self.registry(), persisted)?;
            if self.cache().insert_if_absent(record) {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = CacheSnapshot::new(self.export_records()?);
        write_snapshot(path, &snapshot, self.config().pretty_snapshots)?;
        info!(
            records = snapshot.records.len(),
            path = %path.display(),
            "Saved analysis snapshot"
        );
        Ok(())
    }

    pub fn load_snapshot(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let snapshot = read_snapshot(path)?;
        let total = snapshot.records.len();
        let inserted = self.import_records(snapshot.records)?;
        info!(
            inserted,
            total,
            path = %path.display(),
            "Loaded analysis snapshot"
        );
        Ok(inserted)
    }

    /// Save to the configured `cache_file`. Returns `false` if none is set.
    pub fn persist(&self) -> Result<bool> {
        match self.config().cache_file.as_deref() {
            Some(path) => self.save_snapshot(path).map(|()| true),
            None => Ok(false),
        }
    }

    /// Load from the configured `cache_file` if it exists. Returns the number
    /// of records added.
    pub fn restore(&self) -> Result<usize> {
        match self.config().cache_file.as_deref() {
            Some(path) if path.exists() => self.load_snapshot(path),
            _ => Ok(0),
        }
    }
}
