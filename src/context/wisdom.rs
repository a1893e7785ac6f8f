//! Persistent plan records.
//!
//! A planner (an FFT back end, a tiling heuristic) that spends time finding a
//! good plan for a problem can record the result under a string key, and any
//! later process on the same machine can reuse it. Several processes may
//! share one cache file: imports hold a shared advisory lock, exports an
//! exclusive one, and an export merges whatever is already in the file so no
//! process discards another's records.

use crate::config::PlanRigor;
use crate::error::{Result, VoxflowError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Cache file format version
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// One recorded plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    /// Opaque plan description, interpreted by whoever recorded it
    pub plan: String,
    pub rigor: PlanRigor,
    pub recorded_at: DateTime<Utc>,
}

impl PlanRecord {
    pub fn new(plan: impl Into<String>, rigor: PlanRigor) -> Self {
        Self {
            plan: plan.into(),
            rigor,
            recorded_at: Utc::now(),
        }
    }

    /// Whether `self` should replace `other` for the same key: stronger
    /// rigor first, then the more recent record.
    pub fn supersedes(&self, other: &PlanRecord) -> bool {
        (self.rigor, self.recorded_at) > (other.rigor, other.recorded_at)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    plans: BTreeMap<String, PlanRecord>,
}

/// In-memory plan records keyed by problem description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanCache {
    plans: BTreeMap<String, PlanRecord>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// The record for `key` if it was made with at least `rigor`.
    pub fn lookup(&self, key: &str, rigor: PlanRigor) -> Option<&PlanRecord> {
        self.plans.get(key).filter(|record| record.rigor >= rigor)
    }

    /// Records a plan made now; returns whether it was kept.
    pub fn record(&mut self, key: impl Into<String>, plan: impl Into<String>, rigor: PlanRigor) -> bool {
        self.insert(key.into(), PlanRecord::new(plan, rigor))
    }

    /// Keeps `record` unless the existing record for `key` supersedes it.
    pub fn insert(&mut self, key: String, record: PlanRecord) -> bool {
        match self.plans.get(&key) {
            Some(existing) if !record.supersedes(existing) => false,
            _ => {
                self.plans.insert(key, record);
                true
            }
        }
    }

    /// Merges every record of `other`; returns how many were taken.
    pub fn merge(&mut self, other: PlanCache) -> usize {
        let mut taken = 0;
        for (key, record) in other.plans {
            if self.insert(key, record) {
                taken += 1;
            }
        }
        taken
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PlanRecord)> {
        self.plans.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn parse(content: &str, path: &Path) -> Result<PlanCache> {
        if content.trim().is_empty() {
            return Ok(PlanCache::new());
        }
        let file: CacheFile = serde_json::from_str(content).map_err(|e| {
            VoxflowError::PlanCache(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        if file.version != CACHE_FORMAT_VERSION {
            return Err(VoxflowError::PlanCache(format!(
                "{} has format version {}, expected {}",
                path.display(),
                file.version,
                CACHE_FORMAT_VERSION
            )));
        }
        Ok(PlanCache { plans: file.plans })
    }

    /// Merges the records stored at `path`; a missing file holds none.
    ///
    /// Returns how many records were taken.
    pub fn import(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        file.lock_shared()?;
        let mut content = String::new();
        let read = file.read_to_string(&mut content);
        file.unlock()?;
        read?;

        let stored = Self::parse(&content, path)?;
        let taken = self.merge(stored);
        tracing::debug!("Imported {} plan(s) from {}", taken, path.display());
        Ok(taken)
    }

    /// Writes these records merged with what `path` already holds.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.lock()?;
        let written = Self::merge_into_locked(&mut file, self, path);
        file.unlock()?;
        let count = written?;

        tracing::debug!("Exported {} plan(s) to {}", count, path.display());
        Ok(())
    }

    fn merge_into_locked(file: &mut File, ours: &PlanCache, path: &Path) -> Result<usize> {
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        let mut merged = match Self::parse(&content, path) {
            Ok(existing) => existing,
            Err(e) => {
                tracing::warn!("Overwriting unreadable plan cache: {}", e);
                PlanCache::new()
            }
        };
        merged.merge(ours.clone());
        let count = merged.len();

        let serialized = serde_json::to_string_pretty(&CacheFile {
            version: CACHE_FORMAT_VERSION,
            plans: merged.plans,
        })?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        Ok(count)
    }
}
