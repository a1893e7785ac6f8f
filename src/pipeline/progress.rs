//! Progress aggregation and cooperative cancellation.

use crate::pipeline::event::{EventBus, PipelineEvent};
use crate::pipeline::id::NodeId;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Cross-thread handle onto one process object's abort flag and progress.
///
/// Cloning is cheap; every clone observes the same node. A caller wanting a
/// timeout keeps a clone on a timer thread and calls
/// [`abort_generate_data`](Self::abort_generate_data).
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    abort: Arc<AtomicBool>,
    progress: Arc<AtomicU32>,
    generating: Arc<AtomicBool>,
}

impl ProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running generation to stop at its next poll.
    pub fn abort_generate_data(&self) {
        self.abort.store(true, Ordering::Release);
    }

    pub fn is_abort_requested(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    /// Progress of the current (or last) generation in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        f32::from_bits(self.progress.load(Ordering::Acquire))
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::Acquire)
    }

    pub(crate) fn set_progress(&self, fraction: f32) {
        self.progress.store(fraction.to_bits(), Ordering::Release);
    }

    /// A new generation clears the abort flag and the progress.
    pub(crate) fn begin(&self) {
        self.abort.store(false, Ordering::Release);
        self.set_progress(0.0);
        self.generating.store(true, Ordering::Release);
    }

    pub(crate) fn finish(&self) {
        self.generating.store(false, Ordering::Release);
    }
}

/// Shared state of one node's generation, read and written by every worker.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    node: NodeId,
    total: u64,
    completed: AtomicU64,
    reported_percent: AtomicU32,
    halted: AtomicBool,
    control: ProcessControl,
    events: Arc<EventBus>,
}

impl ProgressTracker {
    pub(crate) fn new(node: NodeId, total: u64, control: ProcessControl, events: Arc<EventBus>) -> Self {
        Self {
            node,
            total,
            completed: AtomicU64::new(0),
            reported_percent: AtomicU32::new(0),
            halted: AtomicBool::new(false),
            control,
            events,
        }
    }

    pub(crate) fn node(&self) -> NodeId {
        self.node
    }

    /// Counts `pixels` towards the generation total; publishes at whole percents.
    pub(crate) fn complete(&self, pixels: u64) {
        if self.total == 0 || pixels == 0 {
            return;
        }
        let done = self.completed.fetch_add(pixels, Ordering::AcqRel) + pixels;
        let percent = (done.min(self.total) * 100 / self.total) as u32;
        if percent > self.reported_percent.fetch_max(percent, Ordering::AcqRel) {
            self.publish(percent);
        }
    }

    fn publish(&self, percent: u32) {
        let fraction = percent as f32 / 100.0;
        self.control.set_progress(fraction);
        self.events.emit(PipelineEvent::Progress {
            node: self.node,
            fraction,
        });
    }

    /// Reports completion if the workers did not already reach 100%.
    pub(crate) fn finish(&self) {
        if self.reported_percent.fetch_max(100, Ordering::AcqRel) < 100 {
            self.publish(100);
        }
    }

    pub(crate) fn abort_requested(&self) -> bool {
        self.control.is_abort_requested()
    }

    /// Tells the remaining work items of this call to stop.
    pub(crate) fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    pub(crate) fn halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
struct Member {
    node: NodeId,
    weight: f32,
    progress: f32,
}

/// Combines the progress of several nodes of a mini-pipeline into one figure.
///
/// Each registered node contributes `progress * weight`. When a node starts
/// again (for example the next piece of a streamed update) its finished
/// contribution is folded into a base, so the total never moves backwards.
#[derive(Debug, Clone, Default)]
pub struct ProgressAccumulator {
    members: Vec<Member>,
    base: f32,
    accumulated: f32,
}

impl ProgressAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, node: NodeId, weight: f32) {
        self.members.push(Member {
            node,
            weight,
            progress: 0.0,
        });
    }

    pub fn accumulated(&self) -> f32 {
        self.accumulated
    }

    pub fn reset(&mut self) {
        self.base = 0.0;
        self.accumulated = 0.0;
        for member in &mut self.members {
            member.progress = 0.0;
        }
    }

    /// Feed one event; returns the new total when the event concerned a member.
    pub fn observe(&mut self, event: &PipelineEvent) -> Option<f32> {
        let member = self.members.iter_mut().find(|m| m.node == event.node())?;
        match event {
            PipelineEvent::Progress { fraction, .. } => member.progress = *fraction,
            PipelineEvent::Start { .. } => {
                self.base += member.progress * member.weight;
                member.progress = 0.0;
            }
            PipelineEvent::End { .. } | PipelineEvent::Abort { .. } => return None,
        }
        let running: f32 = self.members.iter().map(|m| m.progress * m.weight).sum();
        self.accumulated = (self.base + running).min(1.0);
        Some(self.accumulated)
    }
}
