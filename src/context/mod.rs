//! Engine context
//!
//! [`EngineContext`] is built once at startup from an [`EngineConfig`] and
//! owns what every pipeline of the process shares: the worker pool and the
//! plan cache. Pipelines created through it inherit its execution settings.
//!
//! # Example
//!
//! ```ignore
//! use voxflow::config::EngineConfig;
//! use voxflow::context::EngineContext;
//!
//! let context = EngineContext::init(EngineConfig::load_or_default())?;
//! let mut pipeline = context.pipeline::<f32, 3>();
//! // ... build and update ...
//! context.shutdown()?;
//! ```

pub mod wisdom;

pub use wisdom::{PlanCache, PlanRecord, CACHE_FORMAT_VERSION};

use crate::config::EngineConfig;
use crate::error::{Result, ResultExt, VoxflowError};
use crate::image::Pixel;
use crate::pipeline::{Pipeline, WorkerPool};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Process-wide engine state
pub struct EngineContext {
    config: EngineConfig,
    pool: Arc<WorkerPool>,
    plans: RwLock<PlanCache>,
    cache_path: Option<PathBuf>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("threads", &self.config.execution.number_of_threads)
            .field("cache_path", &self.cache_path)
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish()
    }
}

impl EngineContext {
    /// Validates `config`, acquires the worker pool and imports the plan
    /// cache if enabled.
    ///
    /// An unreadable cache is logged and startup continues with an empty one.
    pub fn init(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let pool = WorkerPool::global_with(config.execution.number_of_threads);

        let cache_path = if config.wisdom.use_cache {
            let path = config.wisdom.resolve_cache_path();
            if path.is_none() {
                tracing::warn!("Plan cache enabled but no cache location could be determined");
            }
            path
        } else {
            None
        };

        let mut plans = PlanCache::new();
        if let Some(path) = &cache_path {
            match plans.import(path) {
                Ok(count) => {
                    tracing::debug!("Plan cache {}: {} record(s)", path.display(), count)
                }
                Err(e) => tracing::warn!("Ignoring plan cache {}: {}", path.display(), e),
            }
        }

        tracing::info!(
            "Engine started: {} thread(s), {} worker(s), plan cache {}",
            config.execution.number_of_threads,
            pool.threads(),
            if cache_path.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            config,
            pool,
            plans: RwLock::new(plans),
            cache_path,
            shut_down: AtomicBool::new(false),
        })
    }

    /// [`init`](Self::init) with the configuration file and environment
    pub fn from_default_config() -> Result<Self> {
        Self::init(EngineConfig::load_or_default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> Arc<WorkerPool> {
        Arc::clone(&self.pool)
    }

    /// File the plan cache is exported to, if caching is on
    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    /// A new, empty pipeline running on this context's pool
    pub fn pipeline<P: Pixel, const D: usize>(&self) -> Pipeline<P, D> {
        Pipeline::with_settings(self.config.execution.clone(), self.pool())
    }

    // ==================== Plan Cache ====================

    fn plans(&self) -> Result<RwLockReadGuard<'_, PlanCache>> {
        self.plans.read().map_err(|_| poisoned())
    }

    fn plans_mut(&self) -> Result<RwLockWriteGuard<'_, PlanCache>> {
        self.plans.write().map_err(|_| poisoned())
    }

    /// The plan recorded for `key` with at least the configured rigor
    pub fn lookup_plan(&self, key: &str) -> Result<Option<PlanRecord>> {
        let plans = self.plans()?;
        Ok(plans.lookup(key, self.config.wisdom.plan_rigor).cloned())
    }

    /// Records `plan` for `key` with the configured rigor
    ///
    /// Returns whether it replaced what was there.
    pub fn record_plan(&self, key: impl Into<String>, plan: impl Into<String>) -> Result<bool> {
        let mut plans = self.plans_mut()?;
        Ok(plans.record(key, plan, self.config.wisdom.plan_rigor))
    }

    pub fn plan_count(&self) -> Result<usize> {
        Ok(self.plans()?.len())
    }

    /// Writes the plan cache back; later calls do nothing.
    pub fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(path) = &self.cache_path {
            let mut plans = self.plans_mut()?;
            if let Err(e) = plans.import(path) {
                tracing::warn!("Re-reading plan cache failed: {}", e);
            }
            plans
                .export(path)
                .with_context(|| format!("Failed to export plan cache to {}", path.display()))?;
            tracing::debug!("Plan cache written to {}", path.display());
        }

        tracing::info!("Engine shut down");
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

fn poisoned() -> VoxflowError {
    VoxflowError::PlanCache("plan cache lock poisoned".to_string())
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("Engine shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanRigor;

    fn cached_config(path: &Path, rigor: PlanRigor) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.execution.number_of_threads = 2;
        config.wisdom.use_cache = true;
        config.wisdom.cache_file = Some(path.to_path_buf());
        config.wisdom.plan_rigor = rigor;
        config
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.execution.number_of_threads = 0;
        assert!(matches!(
            EngineContext::init(config),
            Err(VoxflowError::Config(_))
        ));
    }

    #[test]
    fn test_plans_survive_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plans.json");

        let context = EngineContext::init(cached_config(&path, PlanRigor::Measure)).unwrap();
        assert_eq!(context.cache_path(), Some(path.as_path()));
        assert!(context.record_plan("fft-64", "radix-2").unwrap());
        context.shutdown().unwrap();
        context.shutdown().unwrap();
        assert!(context.is_shut_down());

        let reopened = EngineContext::init(cached_config(&path, PlanRigor::Estimate)).unwrap();
        assert_eq!(reopened.lookup_plan("fft-64").unwrap().unwrap().plan, "radix-2");

        let strict = EngineContext::init(cached_config(&path, PlanRigor::Patient)).unwrap();
        assert!(strict.lookup_plan("fft-64").unwrap().is_none());
    }

    #[test]
    fn test_cache_off_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plans.json");
        let mut config = cached_config(&path, PlanRigor::Estimate);
        config.wisdom.use_cache = false;

        let context = EngineContext::init(config).unwrap();
        context.record_plan("k", "v").unwrap();
        drop(context);
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_cache_does_not_block_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plans.json");
        std::fs::write(&path, "garbage").unwrap();

        let context = EngineContext::init(cached_config(&path, PlanRigor::Estimate)).unwrap();
        assert_eq!(context.plan_count().unwrap(), 0);
    }

    #[test]
    fn test_poisoned_cache_lock_is_an_error() {
        let context = EngineContext::init(EngineConfig::default()).unwrap();
        context.record_plan("fft-8", "radix-2").unwrap();

        std::thread::scope(|s| {
            let writer = s.spawn(|| {
                let _plans = context.plans.write().unwrap();
                panic!("writer died holding the plan cache");
            });
            assert!(writer.join().is_err());
        });

        assert!(matches!(
            context.lookup_plan("fft-8"),
            Err(VoxflowError::PlanCache(_))
        ));
        assert!(context.plan_count().is_err());
        assert!(context.record_plan("fft-16", "radix-4").is_err());
    }

    #[test]
    fn test_pipeline_inherits_settings() {
        let context = EngineContext::init(EngineConfig {
            execution: crate::config::ExecutionSettings::default().with_threads(3),
            ..Default::default()
        })
        .unwrap();
        let pipeline = context.pipeline::<u8, 2>();
        assert_eq!(pipeline.settings().number_of_threads, 3);
    }
}
