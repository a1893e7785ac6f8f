//! Reference filters.
//!
//! Small, complete implementations of the filter contract: a source, a
//! point-wise functor, a neighbourhood filter, reductions and region remaps,
//! plus a pass-through monitor for verifying what the pipeline asked for.

pub mod extract;
pub mod mean;
pub mod monitor;
pub mod projection;
pub mod shrink;
pub mod source;
pub mod statistics;
pub mod unary;

pub use extract::ExtractRegionFilter;
pub use mean::MeanFilter;
pub use monitor::PipelineMonitor;
pub use projection::{ProjectionFilter, ProjectionOperation};
pub use shrink::ShrinkFilter;
pub use source::ImageSource;
pub use statistics::{Statistics, StatisticsFilter};
pub use unary::{CopyFilter, UnaryFunctorFilter};

use crate::image::{Image, Pixel};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::threader::{OutputChunk, WorkerContext};
use crate::region::Region;

/// The scan line `row` of `input`, or a region error when it is not buffered.
pub(crate) fn input_row<'a, P: Pixel, const D: usize>(
    input: &'a Image<P, D>,
    row: &Region<D>,
) -> PipelineResult<&'a [P]> {
    input.row(row).ok_or_else(|| PipelineError::RegionOutOfBounds {
        requested: row.to_string(),
        largest: input.buffered_region().to_string(),
    })
}

/// Copies `input` into `chunk` scan line by scan line.
pub(crate) fn copy_rows<P: Pixel, const D: usize>(
    input: &Image<P, D>,
    chunk: &mut OutputChunk<'_, P, D>,
    worker: &WorkerContext<'_>,
) -> PipelineResult<()> {
    for row in chunk.region().rows() {
        let src = input_row(input, &row)?;
        chunk.row_mut(&row)?.copy_from_slice(src);
        worker.complete_row(src.len() as u64)?;
    }
    Ok(())
}
