use crate::image::{Image, ImageInfo, Pixel};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::filter::{primary_input, Filter};
use crate::pipeline::threader::{OutputChunk, WorkerContext};
use crate::region::{Index, Region, Size};

/// Keeps every `factor`-th cell per axis.
///
/// Output index `o` samples input index `o * factor`. The output covers
/// every multiple of the factor inside the input, its spacing grows by the
/// factor and its origin is unchanged, so physical positions are preserved.
#[derive(Debug, Clone)]
pub struct ShrinkFilter<const D: usize> {
    factors: [u64; D],
}

fn ceil_div(a: i64, b: i64) -> i64 {
    -((-a).div_euclid(b))
}

impl<const D: usize> ShrinkFilter<D> {
    pub fn new(factors: [u64; D]) -> Self {
        Self { factors }
    }

    /// The same factor on every axis.
    pub fn uniform(factor: u64) -> Self {
        Self::new([factor; D])
    }

    pub fn factors(&self) -> [u64; D] {
        self.factors
    }

    pub fn set_factors(&mut self, factors: [u64; D]) {
        self.factors = factors;
    }

    fn check_factors(&self) -> PipelineResult<()> {
        if self.factors.contains(&0) {
            return Err(PipelineError::InvalidParameter(format!(
                "shrink factors must be positive, got {:?}",
                self.factors
            )));
        }
        Ok(())
    }

    fn input_index(&self, output: &Index<D>) -> Index<D> {
        let mut index = *output;
        for (component, &factor) in index.0.iter_mut().zip(&self.factors) {
            *component *= factor as i64;
        }
        index
    }
}

impl<P: Pixel, const D: usize> Filter<P, D> for ShrinkFilter<D> {
    fn name(&self) -> &str {
        "shrink"
    }

    fn generate_output_information(&self, inputs: &[&ImageInfo<D>]) -> PipelineResult<ImageInfo<D>> {
        self.check_factors()?;
        let input = inputs
            .first()
            .ok_or_else(|| PipelineError::InvalidParameter("shrink has no input".to_string()))?;
        let largest = input.largest_possible_region;

        let mut index = Index::zero();
        let mut size = Size::default();
        for axis in 0..D {
            let factor = self.factors[axis] as i64;
            let first = largest.index().0[axis];
            let last = largest.upper_bound(axis) - 1;
            let lo = ceil_div(first, factor);
            let hi = last.div_euclid(factor);
            if hi < lo {
                return Err(PipelineError::InvalidParameter(format!(
                    "shrink factor {} exceeds the extent of axis {} of {}",
                    factor, axis, largest
                )));
            }
            index.0[axis] = lo;
            size.0[axis] = (hi - lo + 1) as u64;
        }

        let mut info = (*input).clone();
        info.largest_possible_region = Region::new(index, size);
        for (spacing, &factor) in info.spacing.iter_mut().zip(&self.factors) {
            *spacing *= factor as f64;
        }
        Ok(info)
    }

    fn input_requested_region(
        &self,
        output_requested: &Region<D>,
        _input: usize,
        _input_info: &ImageInfo<D>,
    ) -> PipelineResult<Region<D>> {
        self.check_factors()?;
        if output_requested.is_empty() {
            return Ok(*output_requested);
        }
        let start = self.input_index(&output_requested.index());
        let mut size = Size::default();
        for axis in 0..D {
            size.0[axis] = (output_requested.size().0[axis] - 1) * self.factors[axis] + 1;
        }
        Ok(Region::new(start, size))
    }

    fn threaded_generate_data(
        &self,
        inputs: &[&Image<P, D>],
        chunk: &mut OutputChunk<'_, P, D>,
        worker: &WorkerContext<'_>,
    ) -> PipelineResult<()> {
        let input = primary_input(inputs)?;
        for row in chunk.region().rows() {
            let dst = chunk.row_mut(&row)?;
            let mut cell = row.index();
            let first = cell.0[0];
            for (k, px) in dst.iter_mut().enumerate() {
                cell.0[0] = first + k as i64;
                let source = self.input_index(&cell);
                *px = input
                    .get(&source)
                    .ok_or_else(|| PipelineError::RegionOutOfBounds {
                        requested: source.to_string(),
                        largest: input.buffered_region().to_string(),
                    })?;
            }
            worker.complete_row(dst.len() as u64)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::filters::ImageSource;
    use crate::pipeline::Pipeline;

    #[test]
    fn test_ceil_div() {
        assert_eq!(ceil_div(7, 2), 4);
        assert_eq!(ceil_div(-3, 2), -1);
        assert_eq!(ceil_div(4, 2), 2);
    }

    #[test]
    fn test_shrink_geometry_and_values() {
        let mut p = Pipeline::<i64, 2>::new();
        let src = p.add_filter(
            ImageSource::new(Region::new(Index([1, 0]), Size([7, 4])), |idx| {
                idx.0[0] + 100 * idx.0[1]
            })
            .with_spacing([1.0, 0.5]),
        );
        let shrink = p.add_filter(ShrinkFilter::new([2, 3]));
        p.connect(src, shrink).unwrap();
        p.update(shrink).unwrap();

        let out = p.output(shrink).unwrap();
        // x in 1..=7 -> multiples of 2: 2, 4, 6; y in 0..=3 -> multiples of 3: 0, 3
        assert_eq!(
            out.largest_possible_region(),
            Region::new(Index([1, 0]), Size([3, 2]))
        );
        assert_eq!(out.spacing(), [2.0, 1.5]);
        assert_eq!(out.as_slice(), &[2, 4, 6, 302, 304, 306]);
    }

    #[test]
    fn test_zero_factor_rejected() {
        let mut p = Pipeline::<u8, 2>::new();
        let src = p.add_filter(ImageSource::constant(Region::from_size(Size([4, 4])), 0));
        let shrink = p.add_filter(ShrinkFilter::new([0, 1]));
        p.connect(src, shrink).unwrap();
        assert!(p.update(shrink).unwrap_err().is_configuration());
    }
}
