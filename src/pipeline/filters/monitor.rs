use crate::image::{Image, Pixel};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::filter::{primary_input, Filter};
use crate::pipeline::filters::copy_rows;
use crate::pipeline::threader::{OutputChunk, WorkerContext};
use crate::region::Region;

/// Pass-through filter that records what the pipeline asked of it.
///
/// Placed after a filter under test, it shows how often the upstream part
/// of the pipeline was generated and with which regions, which is how
/// streaming behaviour is verified.
#[derive(Debug, Clone)]
pub struct PipelineMonitor<const D: usize> {
    updates: usize,
    output_requested_regions: Vec<Region<D>>,
    input_buffered_regions: Vec<Region<D>>,
    input_requested_regions: Vec<Region<D>>,
}

impl<const D: usize> Default for PipelineMonitor<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> PipelineMonitor<D> {
    pub fn new() -> Self {
        Self {
            updates: 0,
            output_requested_regions: Vec::new(),
            input_buffered_regions: Vec::new(),
            input_requested_regions: Vec::new(),
        }
    }

    pub fn number_of_updates(&self) -> usize {
        self.updates
    }

    pub fn output_requested_regions(&self) -> &[Region<D>] {
        &self.output_requested_regions
    }

    pub fn input_buffered_regions(&self) -> &[Region<D>] {
        &self.input_buffered_regions
    }

    pub fn input_requested_regions(&self) -> &[Region<D>] {
        &self.input_requested_regions
    }

    /// Forgets everything recorded so far.
    pub fn clear(&mut self) {
        self.updates = 0;
        self.output_requested_regions.clear();
        self.input_buffered_regions.clear();
        self.input_requested_regions.clear();
    }

    /// The input was generated exactly `expected` times, each time buffering
    /// no more than it was asked for.
    pub fn verify_input_streamed(&self, expected: usize) -> bool {
        self.updates == expected && self.verify_input_buffered_requested_regions()
    }

    /// Every input buffer matched the input request.
    pub fn verify_input_buffered_requested_regions(&self) -> bool {
        self.input_buffered_regions
            .iter()
            .zip(&self.input_requested_regions)
            .all(|(buffered, requested)| buffered == requested)
    }

    /// The recorded output requests tile `region` without overlap.
    pub fn verify_output_covers(&self, region: &Region<D>) -> bool {
        let total: u64 = self
            .output_requested_regions
            .iter()
            .map(|r| r.number_of_pixels())
            .sum();
        let inside = self
            .output_requested_regions
            .iter()
            .all(|r| region.contains(r));
        let disjoint = self.output_requested_regions.iter().enumerate().all(|(i, a)| {
            self.output_requested_regions[i + 1..]
                .iter()
                .all(|b| a.intersect(b).is_empty())
        });
        inside && disjoint && total == region.number_of_pixels()
    }
}

impl<P: Pixel, const D: usize> Filter<P, D> for PipelineMonitor<D> {
    fn name(&self) -> &str {
        "pipeline_monitor"
    }

    fn before_threaded_generate_data(
        &mut self,
        inputs: &[&Image<P, D>],
        output: &Image<P, D>,
    ) -> PipelineResult<()> {
        let input = primary_input(inputs)?;
        self.updates += 1;
        self.output_requested_regions.push(output.requested_region());
        self.input_buffered_regions.push(input.buffered_region());
        self.input_requested_regions.push(input.requested_region());
        tracing::trace!(
            "Monitor update {}: output {} from input {}",
            self.updates,
            output.requested_region(),
            input.buffered_region()
        );
        Ok(())
    }

    fn threaded_generate_data(
        &self,
        inputs: &[&Image<P, D>],
        chunk: &mut OutputChunk<'_, P, D>,
        worker: &WorkerContext<'_>,
    ) -> PipelineResult<()> {
        copy_rows(primary_input(inputs)?, chunk, worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::filters::ImageSource;
    use crate::pipeline::Pipeline;
    use crate::region::{Index, Size, SplitStrategy};

    #[test]
    fn test_monitor_records_streamed_pieces() {
        let mut p = Pipeline::<u8, 2>::new();
        let full = Region::from_size(Size([6, 6]));
        let src = p.add_filter(ImageSource::new(full, |idx| (idx.0[0] + idx.0[1]) as u8));
        let monitor = p.add_filter(PipelineMonitor::new());
        p.connect(src, monitor).unwrap();

        p.stream(monitor, None, 3, SplitStrategy::SlowestAxis, |_, _| Ok(()))
            .unwrap();
        let m = p.filter::<PipelineMonitor<2>>(monitor).unwrap();
        assert!(m.verify_input_streamed(3));
        assert!(m.verify_output_covers(&full));
        assert_eq!(
            m.output_requested_regions()[1],
            Region::new(Index([0, 2]), Size([6, 2]))
        );
    }

    #[test]
    fn test_clear() {
        let mut m = PipelineMonitor::<2>::new();
        m.updates = 2;
        m.output_requested_regions.push(Region::empty());
        m.clear();
        assert_eq!(m.number_of_updates(), 0);
        assert!(m.output_requested_regions().is_empty());
    }
}
