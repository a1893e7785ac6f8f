//! Process-wide modification clock.
//!
//! Staleness in the pipeline is decided by comparing [`ModifiedTime`] values,
//! never by comparing data. Every call to [`TimeStamp::modified`] draws a new
//! value from a single atomic counter, so two stamps taken anywhere in the
//! process are strictly ordered.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static GLOBAL_CLOCK: AtomicU64 = AtomicU64::new(0);

/// A point on the process-wide modification clock. Zero means "never".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ModifiedTime(u64);

impl ModifiedTime {
    pub const ZERO: ModifiedTime = ModifiedTime(0);

    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }

    /// Latest value handed out so far, without advancing the clock.
    pub fn current() -> Self {
        Self(GLOBAL_CLOCK.load(Ordering::Acquire))
    }
}

impl fmt::Debug for ModifiedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModifiedTime({})", self.0)
    }
}

impl fmt::Display for ModifiedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Records when something last changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeStamp {
    time: ModifiedTime,
}

impl TimeStamp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to a fresh, strictly newer time.
    pub fn modified(&mut self) {
        self.time = ModifiedTime(GLOBAL_CLOCK.fetch_add(1, Ordering::AcqRel) + 1);
    }

    #[inline]
    pub fn time(&self) -> ModifiedTime {
        self.time
    }

    /// Forget the recorded time so anything compared against it looks newer.
    pub(crate) fn reset(&mut self) {
        self.time = ModifiedTime::ZERO;
    }
}
