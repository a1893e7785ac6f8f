//! The contract every process object implements.
//!
//! A filter answers three questions for the executor:
//!
//! 1. What will my output look like? ([`Filter::generate_output_information`])
//! 2. What do I need from each input to produce a given output region?
//!    ([`Filter::input_requested_region`], usually via [`Filter::input_region_policy`])
//! 3. Produce the data, either as the split triad
//!    `before_threaded_generate_data` / `threaded_generate_data` /
//!    `after_threaded_generate_data`, or as a single `generate_data` call.
//!
//! Filters never see the graph. Parameters live in the filter itself; the
//! pipeline bumps the node's modification time whenever they are changed
//! through [`Pipeline::configure`](crate::pipeline::Pipeline::configure).

use crate::image::{Image, ImageInfo, Pixel};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::threader::{ExecContext, OutputChunk, WorkerContext};
use crate::region::{Region, Size};
use std::any::Any;

/// How a filter's input request derives from its output request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionPolicy<const D: usize> {
    /// The same region (point-wise filters).
    Identity,
    /// The output request grown by a radius (neighbourhood filters).
    Padded(Size<D>),
    /// The whole largest possible region of the input.
    Whole,
}

impl<const D: usize> RegionPolicy<D> {
    /// The region this policy asks of an input whose largest region is `input_largest`.
    ///
    /// The result is not cropped; the executor crops every request to the
    /// input's largest possible region.
    pub fn apply(&self, output_requested: &Region<D>, input_largest: &Region<D>) -> Region<D> {
        match self {
            RegionPolicy::Identity => *output_requested,
            RegionPolicy::Padded(radius) => output_requested.pad_by_radius(radius),
            RegionPolicy::Whole => *input_largest,
        }
    }
}

/// Which generation entry point the executor calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Generation {
    /// `before_threaded_generate_data`, then `threaded_generate_data` once per
    /// disjoint output chunk, then `after_threaded_generate_data`.
    #[default]
    Threaded,
    /// A single `generate_data` call that drives the [`ExecContext`] itself.
    Whole,
}

/// First input, or a configuration error.
pub fn primary_input<'a, P: Pixel, const D: usize>(
    inputs: &[&'a Image<P, D>],
) -> PipelineResult<&'a Image<P, D>> {
    inputs
        .first()
        .copied()
        .ok_or_else(|| PipelineError::InvalidParameter("filter has no input".to_string()))
}

/// A process object: one node's worth of algorithm.
///
/// Inputs arrive in index order, skipping unconnected optional slots.
pub trait Filter<P: Pixel, const D: usize>: Any + Send + Sync {
    fn name(&self) -> &str;

    /// Leading inputs that must be connected before an update.
    fn number_of_required_inputs(&self) -> usize {
        1
    }

    fn generation(&self) -> Generation {
        Generation::Threaded
    }

    /// Output metadata from input metadata. The default copies the first input.
    fn generate_output_information(&self, inputs: &[&ImageInfo<D>]) -> PipelineResult<ImageInfo<D>> {
        inputs.first().map(|info| (*info).clone()).ok_or_else(|| {
            PipelineError::InvalidParameter(format!(
                "{} has no input to take output information from",
                self.name()
            ))
        })
    }

    /// Grow the output request when the filter must produce more than asked.
    fn enlarge_output_requested_region(&self, requested: &Region<D>, _largest: &Region<D>) -> Region<D> {
        *requested
    }

    fn input_region_policy(&self, _input: usize) -> RegionPolicy<D> {
        RegionPolicy::Identity
    }

    /// Region required from input `input` to produce `output_requested`.
    fn input_requested_region(
        &self,
        output_requested: &Region<D>,
        input: usize,
        input_info: &ImageInfo<D>,
    ) -> PipelineResult<Region<D>> {
        Ok(self
            .input_region_policy(input)
            .apply(output_requested, &input_info.largest_possible_region))
    }

    fn before_threaded_generate_data(
        &mut self,
        _inputs: &[&Image<P, D>],
        _output: &Image<P, D>,
    ) -> PipelineResult<()> {
        Ok(())
    }

    /// Fill `chunk`; called concurrently for disjoint chunks.
    fn threaded_generate_data(
        &self,
        _inputs: &[&Image<P, D>],
        _chunk: &mut OutputChunk<'_, P, D>,
        _worker: &WorkerContext<'_>,
    ) -> PipelineResult<()> {
        Err(PipelineError::Filter(format!(
            "{} does not implement threaded generation",
            self.name()
        )))
    }

    fn after_threaded_generate_data(
        &mut self,
        _inputs: &[&Image<P, D>],
        _output: &mut Image<P, D>,
    ) -> PipelineResult<()> {
        Ok(())
    }

    /// Single-call generation, used when [`Filter::generation`] is [`Generation::Whole`].
    fn generate_data(
        &mut self,
        _inputs: &[&Image<P, D>],
        _output: &mut Image<P, D>,
        _exec: &ExecContext<'_>,
    ) -> PipelineResult<()> {
        Err(PipelineError::Filter(format!(
            "{} does not implement whole-region generation",
            self.name()
        )))
    }
}
