//! Settings groups of the engine configuration
//!
//! # Main Types
//!
//! - [`ExecutionSettings`] - Threading, splitting, abort polling and memory policy
//! - [`WisdomSettings`] - Whether and where plan records are cached
//! - [`PlanRigor`] - How hard a planner searches before recording a plan
//!
//! Every field has a serde default, so a configuration file only needs to
//! name what it changes.

use crate::config::{default_number_of_threads, APP_ID};
use crate::region::SplitStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Name of the cache directory under the platform cache directory
pub const CACHE_DIR_NAME: &str = APP_ID;

// ==================== Execution Settings ====================

/// How pipelines execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Work items per node generation
    pub number_of_threads: usize,

    /// How output regions are cut into work items
    pub split_strategy: SplitStrategy,

    /// Scan lines a worker processes between abort checks
    pub abort_check_rows: u64,

    /// Drop a stale node's old buffer before its inputs update
    pub release_data_before_update: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            number_of_threads: default_number_of_threads(),
            split_strategy: SplitStrategy::default(),
            abort_check_rows: 1,
            release_data_before_update: true,
        }
    }
}

impl ExecutionSettings {
    /// Settings running every generation on the calling thread
    pub fn single_threaded() -> Self {
        Self {
            number_of_threads: 1,
            ..Self::default()
        }
    }

    /// Builder-style thread count
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.number_of_threads = threads;
        self
    }

    /// Builder-style split strategy
    pub fn with_split_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.split_strategy = strategy;
        self
    }
}

// ==================== Plan Rigor ====================

/// Planner effort, weakest first
///
/// A record made with a stronger rigor is preferred over a weaker one for the
/// same key, whatever their ages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PlanRigor {
    /// Pick a plan heuristically without measuring
    #[default]
    Estimate,
    /// Measure a few candidate plans
    Measure,
    /// Measure a wider set of candidates
    Patient,
    /// Measure every candidate
    Exhaustive,
}

impl PlanRigor {
    pub const ALL: [PlanRigor; 4] = [
        PlanRigor::Estimate,
        PlanRigor::Measure,
        PlanRigor::Patient,
        PlanRigor::Exhaustive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanRigor::Estimate => "estimate",
            PlanRigor::Measure => "measure",
            PlanRigor::Patient => "patient",
            PlanRigor::Exhaustive => "exhaustive",
        }
    }
}

impl fmt::Display for PlanRigor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlanRigor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        PlanRigor::ALL
            .into_iter()
            .find(|rigor| rigor.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown plan rigor '{}'", s))
    }
}

// ==================== Wisdom Settings ====================

/// Plan cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WisdomSettings {
    /// Import the cache at startup and export it at shutdown
    pub use_cache: bool,

    /// Directory holding the hardware-named cache file
    /// (default: the platform cache directory)
    pub cache_base: Option<PathBuf>,

    /// Explicit cache file, overriding `cache_base`
    pub cache_file: Option<PathBuf>,

    /// Rigor new plans are recorded with
    pub plan_rigor: PlanRigor,
}

impl WisdomSettings {
    /// Cache file name derived from the machine, so a shared cache directory
    /// never mixes plans measured on different hardware
    pub fn hardware_file_name() -> String {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        format!(
            "plans-{}-{}-{}cpu.json",
            std::env::consts::OS,
            std::env::consts::ARCH,
            cpus
        )
    }

    /// Directory the hardware-named file lives in
    pub fn resolve_cache_base(&self) -> Option<PathBuf> {
        self.cache_base
            .clone()
            .or_else(|| dirs_next::cache_dir().map(|p| p.join(CACHE_DIR_NAME)))
    }

    /// The file the cache is imported from and exported to
    pub fn resolve_cache_path(&self) -> Option<PathBuf> {
        if let Some(file) = &self.cache_file {
            return Some(file.clone());
        }
        self.resolve_cache_base()
            .map(|base| base.join(Self::hardware_file_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_rigor_parse() {
        assert_eq!("MEASURE".parse::<PlanRigor>(), Ok(PlanRigor::Measure));
        assert_eq!(" patient ".parse::<PlanRigor>(), Ok(PlanRigor::Patient));
        assert!("thorough".parse::<PlanRigor>().is_err());
        assert!(PlanRigor::Exhaustive > PlanRigor::Estimate);
    }

    #[test]
    fn test_manual_cache_file_wins() {
        let settings = WisdomSettings {
            cache_base: Some(PathBuf::from("/tmp/base")),
            cache_file: Some(PathBuf::from("/tmp/manual.json")),
            ..Default::default()
        };
        assert_eq!(
            settings.resolve_cache_path(),
            Some(PathBuf::from("/tmp/manual.json"))
        );
    }

    #[test]
    fn test_hardware_named_file_under_base() {
        let settings = WisdomSettings {
            cache_base: Some(PathBuf::from("/tmp/base")),
            ..Default::default()
        };
        let path = settings.resolve_cache_path().unwrap();
        assert!(path.starts_with("/tmp/base"));
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some(WisdomSettings::hardware_file_name().as_str())
        );
    }

    #[test]
    fn test_execution_builders() {
        let settings = ExecutionSettings::single_threaded()
            .with_split_strategy(SplitStrategy::LargestAxis);
        assert_eq!(settings.number_of_threads, 1);
        assert_eq!(settings.split_strategy, SplitStrategy::LargestAxis);
        assert!(settings.release_data_before_update);
    }
}
