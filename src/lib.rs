//! # voxflow: demand-driven N-dimensional image pipelines
//!
//! Filters are connected into a graph and nothing runs until the caller asks
//! a node for its output. The engine then negotiates metadata, pushes the
//! requested region upstream (enlarged or cropped by each filter), and
//! regenerates only what is stale, splitting every generation across a shared
//! worker pool.
//!
//! ## Architecture
//!
//! - **Region**: N-D index/size/region algebra and region splitting
//! - **Image**: the data object with largest possible, buffered and requested regions
//! - **Pipeline**: arena graph, three-pass update protocol, threaded execution,
//!   streaming, events and cooperative abort
//! - **Context**: explicit startup/shutdown point owning the worker pool and
//!   the persistent plan cache
//!
//! ## Configuration
//!
//! Engine settings are read from `voxflow.toml` in the platform config
//! directory and can be overridden through `VOXFLOW_*` environment variables:
//!
//! - **Linux**: `~/.config/voxflow/`
//! - **macOS**: `~/Library/Application Support/voxflow/`
//! - **Windows**: `%APPDATA%\voxflow\`
//!
//! ## Example
//!
//! ```ignore
//! use voxflow::{
//!     config::EngineConfig,
//!     context::EngineContext,
//!     pipeline::filters::{ImageSource, MeanFilter},
//!     region::{Region, Size},
//! };
//!
//! fn main() -> voxflow::Result<()> {
//!     let context = EngineContext::init(EngineConfig::load_or_default())?;
//!     let mut pipeline = context.pipeline::<f32, 2>();
//!
//!     let full = Region::from_size(Size([512, 512]));
//!     let source = pipeline.add_filter(ImageSource::new(full, |idx| idx.0[0] as f32));
//!     let mean = pipeline.add_filter(MeanFilter::new(Size([2, 2])));
//!     pipeline.connect(source, mean)?;
//!
//!     pipeline.update(mean)?;
//!     println!("{}", pipeline.output(mean)?.buffered_region());
//!
//!     context.shutdown()
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod image;
pub mod pipeline;
pub mod region;

// Re-export commonly used types
pub use config::{EngineConfig, ExecutionSettings};
pub use context::EngineContext;
pub use error::{Result, ResultExt, VoxflowError};
pub use image::{Image, ImageInfo, Pixel};
pub use pipeline::{Filter, NodeId, Pipeline, PipelineError, PipelineEvent, ProcessControl};
pub use region::{Index, Region, Size, SplitStrategy};
