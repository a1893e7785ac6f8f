use crate::image::{Image, Pixel};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::filter::{primary_input, Filter, Generation, RegionPolicy};
use crate::pipeline::filters::input_row;
use crate::pipeline::threader::ExecContext;
use serde::{Deserialize, Serialize};

/// Summary statistics of every pixel of an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub count: u64,
    pub sum: f64,
    pub sum_of_squares: f64,
    pub minimum: f64,
    pub maximum: f64,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_of_squares: 0.0,
            minimum: f64::INFINITY,
            maximum: f64::NEG_INFINITY,
        }
    }
}

impl Statistics {
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_of_squares += value * value;
        self.minimum = self.minimum.min(value);
        self.maximum = self.maximum.max(value);
    }

    /// Combines two partial results.
    ///
    /// `count`, `minimum` and `maximum` merge exactly in any order. `sum` and
    /// `sum_of_squares` are floating-point additions, so the last bits depend
    /// on how the image was split unless every partial sum is exact (integer
    /// pixels well below 2^53).
    pub fn merge(mut self, other: Statistics) -> Statistics {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_of_squares += other.sum_of_squares;
        self.minimum = self.minimum.min(other.minimum);
        self.maximum = self.maximum.max(other.maximum);
        self
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Sample variance.
    pub fn variance(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        let n = self.count as f64;
        Some(((self.sum_of_squares - self.sum * self.sum / n) / (n - 1.0)).max(0.0))
    }

    pub fn sigma(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }
}

/// Computes [`Statistics`] over the whole input and passes the input through.
///
/// The statistics always cover the input's largest possible region, so the
/// input request is the whole input regardless of what was requested
/// downstream.
#[derive(Debug, Clone, Default)]
pub struct StatisticsFilter {
    statistics: Option<Statistics>,
}

impl StatisticsFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result of the last successful generation.
    pub fn statistics(&self) -> Option<&Statistics> {
        self.statistics.as_ref()
    }
}

impl<P: Pixel, const D: usize> Filter<P, D> for StatisticsFilter {
    fn name(&self) -> &str {
        "statistics"
    }

    fn generation(&self) -> Generation {
        Generation::Whole
    }

    fn input_region_policy(&self, _input: usize) -> RegionPolicy<D> {
        RegionPolicy::Whole
    }

    fn generate_data(
        &mut self,
        inputs: &[&Image<P, D>],
        output: &mut Image<P, D>,
        exec: &ExecContext<'_>,
    ) -> PipelineResult<()> {
        self.statistics = None;
        let input = primary_input(inputs)?;
        let whole = input.largest_possible_region();
        if !input.buffered_region().contains(&whole) {
            return Err(PipelineError::RegionOutOfBounds {
                requested: whole.to_string(),
                largest: input.buffered_region().to_string(),
            });
        }

        let stats = exec.reduce(
            &whole,
            Statistics::default,
            |mut acc, piece, worker| {
                for row in piece.rows() {
                    for value in input_row(input, &row)? {
                        acc.add(value.to_f64());
                    }
                    worker.check_abort()?;
                }
                Ok(acc)
            },
            Statistics::merge,
        )?;

        let passed = output.buffered_region();
        output.copy_region_from(input, &passed)?;
        exec.worker().complete_pixels(passed.number_of_pixels());

        tracing::debug!("Statistics over {}: {:?}", whole, stats);
        self.statistics = Some(stats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::region::{Index, Region, Size};

    #[test]
    fn test_merge_matches_sequential() {
        let values = [3.0, -1.0, 4.0, 1.0, 5.0, 9.0];
        let mut all = Statistics::default();
        values.iter().for_each(|&v| all.add(v));

        let (mut left, mut right) = (Statistics::default(), Statistics::default());
        values[..2].iter().for_each(|&v| left.add(v));
        values[2..].iter().for_each(|&v| right.add(v));
        assert_eq!(left.merge(right), all);
        assert_eq!(all.minimum, -1.0);
        assert_eq!(all.maximum, 9.0);
        assert_eq!(all.mean(), Some(3.5));
    }

    #[test]
    fn test_empty_statistics() {
        let s = Statistics::default();
        assert_eq!(s.mean(), None);
        assert_eq!(s.variance(), None);
    }

    #[test]
    fn test_whole_input_is_requested_for_a_partial_output() {
        let mut p = Pipeline::<u16, 2>::new();
        let img = p.add_image(
            "input",
            Image::from_fn(Region::from_size(Size([8, 8])), |idx| {
                (idx.0[0] + 8 * idx.0[1]) as u16
            }),
        );
        let stats = p.add_filter(StatisticsFilter::new());
        p.connect(img, stats).unwrap();
        let corner = Region::new(Index([0, 0]), Size([2, 2]));
        p.set_requested_region(stats, corner).unwrap();
        p.update(stats).unwrap();

        let s = *p.filter::<StatisticsFilter>(stats).unwrap().statistics().unwrap();
        assert_eq!(s.count, 64);
        assert_eq!(s.sum, (0..64).sum::<u32>() as f64);
        assert_eq!(s.minimum, 0.0);
        assert_eq!(s.maximum, 63.0);

        let out = p.output(stats).unwrap();
        assert_eq!(out.buffered_region(), corner);
        assert_eq!(out.as_slice(), &[0, 1, 8, 9]);
    }
}
