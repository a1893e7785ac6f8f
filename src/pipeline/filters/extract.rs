use crate::image::{Image, ImageInfo, Pixel};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::filter::{primary_input, Filter};
use crate::pipeline::filters::copy_rows;
use crate::pipeline::threader::{OutputChunk, WorkerContext};
use crate::region::Region;

/// Crops its input to a fixed region.
///
/// Indices are preserved, so the output's physical geometry lines up with
/// the input's.
#[derive(Debug, Clone)]
pub struct ExtractRegionFilter<const D: usize> {
    region: Region<D>,
}

impl<const D: usize> ExtractRegionFilter<D> {
    pub fn new(region: Region<D>) -> Self {
        Self { region }
    }

    pub fn region(&self) -> Region<D> {
        self.region
    }

    pub fn set_region(&mut self, region: Region<D>) {
        self.region = region;
    }
}

impl<P: Pixel, const D: usize> Filter<P, D> for ExtractRegionFilter<D> {
    fn name(&self) -> &str {
        "extract_region"
    }

    fn generate_output_information(&self, inputs: &[&ImageInfo<D>]) -> PipelineResult<ImageInfo<D>> {
        let input = inputs.first().ok_or_else(|| {
            PipelineError::InvalidParameter("extract_region has no input".to_string())
        })?;
        if self.region.is_empty() || !input.largest_possible_region.contains(&self.region) {
            return Err(PipelineError::InvalidParameter(format!(
                "extraction region {} is not inside the input {}",
                self.region, input.largest_possible_region
            )));
        }
        let mut info = (*input).clone();
        info.largest_possible_region = self.region;
        Ok(info)
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
