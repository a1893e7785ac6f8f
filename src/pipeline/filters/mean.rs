use crate::image::{Image, Pixel};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::filter::{primary_input, Filter, RegionPolicy};
use crate::pipeline::filters::input_row;
use crate::pipeline::threader::{OutputChunk, WorkerContext};
use crate::region::{Region, Size};

/// Box mean over a neighbourhood of `radius` cells per axis.
///
/// The input request is the output request padded by the radius (cropped to
/// the input by the pipeline). Near the border only in-bounds neighbours are
/// averaged.
#[derive(Debug, Clone)]
pub struct MeanFilter<const D: usize> {
    radius: Size<D>,
}

impl<const D: usize> MeanFilter<D> {
    pub fn new(radius: Size<D>) -> Self {
        Self { radius }
    }

    pub fn radius(&self) -> Size<D> {
        self.radius
    }

    pub fn set_radius(&mut self, radius: Size<D>) {
        self.radius = radius;
    }
}

impl<P: Pixel, const D: usize> Filter<P, D> for MeanFilter<D> {
    fn name(&self) -> &str {
        "mean"
    }

    fn input_region_policy(&self, _input: usize) -> RegionPolicy<D> {
        RegionPolicy::Padded(self.radius)
    }

    fn threaded_generate_data(
        &self,
        inputs: &[&Image<P, D>],
        chunk: &mut OutputChunk<'_, P, D>,
        worker: &WorkerContext<'_>,
    ) -> PipelineResult<()> {
        let input = primary_input(inputs)?;
        let available = input.largest_possible_region();

        for row in chunk.region().rows() {
            let dst = chunk.row_mut(&row)?;
            let mut center = row.index();
            let start = center.0[0];
            for (k, px) in dst.iter_mut().enumerate() {
                center.0[0] = start + k as i64;
                let neighbourhood = Region::new(center, Size::filled(1))
                    .pad_by_radius(&self.radius)
                    .intersect(&available);
                if neighbourhood.is_empty() {
                    return Err(PipelineError::RegionOutOfBounds {
                        requested: center.to_string(),
                        largest: available.to_string(),
                    });
                }
                let mut sum = 0.0;
                for line in neighbourhood.rows() {
                    sum += input_row(input, &line)?
                        .iter()
                        .map(|v| v.to_f64())
                        .sum::<f64>();
                }
                *px = P::from_f64(sum / neighbourhood.number_of_pixels() as f64);
            }
            worker.complete_row(dst.len() as u64)?;
        }
        Ok(())
    }
}
