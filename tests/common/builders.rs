//! Test data builders for creating pipelines, sources and instrumented filters

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voxflow::pipeline::filters::ImageSource;
use voxflow::pipeline::{primary_input, Filter, OutputChunk, PipelineResult, WorkerContext, WorkerPool};
use voxflow::{ExecutionSettings, Image, Index, Pipeline, Pixel, Region, Size, SplitStrategy};

/// Builder for pipelines with their own worker pool
pub struct PipelineBuilder {
    settings: ExecutionSettings,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            settings: ExecutionSettings::single_threaded(),
        }
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.settings.number_of_threads = threads;
        self
    }

    pub fn split_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.settings.split_strategy = strategy;
        self
    }

    pub fn abort_check_rows(mut self, rows: u64) -> Self {
        self.settings.abort_check_rows = rows;
        self
    }

    pub fn build<P: Pixel, const D: usize>(self) -> Pipeline<P, D> {
        let pool = Arc::new(WorkerPool::new(self.settings.number_of_threads));
        Pipeline::with_settings(self.settings, pool)
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Region starting at the origin
pub fn region2(width: u64, height: u64) -> Region<2> {
    Region::new(Index([0, 0]), Size([width, height]))
}

/// Value of the ramp pattern at `idx`
pub fn ramp_value(idx: &Index<2>) -> f32 {
    (idx.0[0] * 3 + idx.0[1] * 1000) as f32
}

/// Source whose pixel value encodes its position
pub fn ramp_source(region: Region<2>) -> ImageSource<f32, 2> {
    ImageSource::new(region, ramp_value)
}

/// Copy filter counting its generations through a shared counter
pub struct CountingCopy {
    generations: Arc<AtomicUsize>,
}

impl CountingCopy {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let generations = Arc::new(AtomicUsize::new(0));
        (
            Self {
                generations: Arc::clone(&generations),
            },
            generations,
        )
    }
}

impl<P: Pixel, const D: usize> Filter<P, D> for CountingCopy {
    fn name(&self) -> &str {
        "counting_copy"
    }

    fn before_threaded_generate_data(
        &mut self,
        _inputs: &[&Image<P, D>],
        _output: &Image<P, D>,
    ) -> PipelineResult<()> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn threaded_generate_data(
        &self,
        inputs: &[&Image<P, D>],
        chunk: &mut OutputChunk<'_, P, D>,
        worker: &WorkerContext<'_>,
    ) -> PipelineResult<()> {
        let input = primary_input(inputs)?;
        for row in chunk.region().rows() {
            let src = input.row(&row).expect("input row buffered");
            chunk.row_mut(&row)?.copy_from_slice(src);
            worker.complete_row(src.len() as u64)?;
        }
        Ok(())
    }
}

/// Copy filter that sleeps on every scan line, for cancellation tests
pub struct SlowCopy {
    pub row_delay: Duration,
}

impl<P: Pixel, const D: usize> Filter<P, D> for SlowCopy {
    fn name(&self) -> &str {
        "slow_copy"
    }

    fn threaded_generate_data(
        &self,
        inputs: &[&Image<P, D>],
        chunk: &mut OutputChunk<'_, P, D>,
        worker: &WorkerContext<'_>,
    ) -> PipelineResult<()> {
        let input = primary_input(inputs)?;
        for row in chunk.region().rows() {
            std::thread::sleep(self.row_delay);
            let src = input.row(&row).expect("input row buffered");
            chunk.row_mut(&row)?.copy_from_slice(src);
            worker.complete_row(src.len() as u64)?;
        }
        Ok(())
    }
}

/// Two-input filter adding its inputs pixel by pixel
pub struct AddFilter;

impl<P: Pixel, const D: usize> Filter<P, D> for AddFilter {
    fn name(&self) -> &str {
        "add"
    }

    fn number_of_required_inputs(&self) -> usize {
        2
    }

    fn threaded_generate_data(
        &self,
        inputs: &[&Image<P, D>],
        chunk: &mut OutputChunk<'_, P, D>,
        worker: &WorkerContext<'_>,
    ) -> PipelineResult<()> {
        let (a, b) = (inputs[0], inputs[1]);
        for row in chunk.region().rows() {
            let ra = a.row(&row).expect("first input row buffered");
            let rb = b.row(&row).expect("second input row buffered");
            for ((out, x), y) in chunk.row_mut(&row)?.iter_mut().zip(ra).zip(rb) {
                *out = P::from_f64(x.to_f64() + y.to_f64());
            }
            worker.complete_row(ra.len() as u64)?;
        }
        Ok(())
    }
}
