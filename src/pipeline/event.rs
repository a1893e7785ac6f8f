//! Notifications emitted while a pipeline updates.
//!
//! Observers call [`Pipeline::subscribe`](crate::pipeline::Pipeline::subscribe)
//! and drain the returned channel from any thread. Channels are unbounded, so
//! a slow observer never stalls a worker.

use crate::pipeline::id::NodeId;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Mutex;

/// Messages sent from the executor and its workers to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A node began generating its output.
    Start { node: NodeId },

    /// Fraction of the current generation completed, in `[0, 1]`.
    Progress { node: NodeId, fraction: f32 },

    /// A node finished generating successfully.
    End { node: NodeId },

    /// A node stopped because its abort flag was observed.
    Abort { node: NodeId },
}

impl PipelineEvent {
    pub fn node(&self) -> NodeId {
        match self {
            PipelineEvent::Start { node }
            | PipelineEvent::Progress { node, .. }
            | PipelineEvent::End { node }
            | PipelineEvent::Abort { node } => *node,
        }
    }
}

/// Fan-out of [`PipelineEvent`]s to every live subscriber.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<PipelineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        let (tx, rx) = unbounded();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Delivers `event` to all subscribers, forgetting those whose receiver was dropped.
    pub fn emit(&self, event: PipelineEvent) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}
