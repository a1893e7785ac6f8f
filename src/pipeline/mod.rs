//! Demand-driven image pipeline.
//!
//! Process objects (filters) and standalone images live in one
//! [`Pipeline`] arena. An update walks upstream from the node it is called
//! on, agrees on metadata, pushes requested regions towards the sources and
//! then generates only the stale nodes, each one split into work items on the
//! shared worker pool.
//!
//! # Architecture
//!
//! ```text
//! [ImageSource] ──► [MeanFilter] ──► [ExtractRegionFilter] ──► caller
//!       ▲                 ▲                    ▲
//!       └──── requested regions flow upstream ─┘
//! ```
//!
//! # Design
//!
//! - **Arena graph**: nodes are addressed by [`NodeId`]; a consumer holds
//!   only the id of its producer, never the producer's image.
//! - **Timestamps, not diffs**: one process-wide clock decides staleness.
//! - **Join semantics**: every parallel section blocks until all of its work
//!   items have returned, so an update never leaves a worker running.
//! - **Explicit results**: each work item returns a `Result`; the first
//!   captured error wins.

pub mod error;
pub mod event;
pub mod executor;
pub mod filter;
pub mod filters;
pub mod id;
pub mod progress;
pub mod streaming;
pub mod threader;
pub mod time_stamp;

pub use error::{PipelineError, PipelineResult};
pub use event::{EventBus, PipelineEvent};
pub use executor::{NodeState, Pipeline};
pub use filter::{primary_input, Filter, Generation, RegionPolicy};
pub use id::NodeId;
pub use progress::{ProcessControl, ProgressAccumulator};
pub use streaming::StreamPiece;
pub use threader::{ExecContext, OutputChunk, WorkerContext, WorkerPool};
pub use time_stamp::{ModifiedTime, TimeStamp};
