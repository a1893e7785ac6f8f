use crate::image::{Image, ImageInfo, Pixel};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::filter::{primary_input, Filter};
use crate::pipeline::threader::{OutputChunk, WorkerContext};
use crate::region::{Region, Size};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the cells along the projection axis are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionOperation {
    #[default]
    Sum,
    Mean,
    Min,
    Max,
}

impl fmt::Display for ProjectionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionOperation::Sum => write!(f, "sum"),
            ProjectionOperation::Mean => write!(f, "mean"),
            ProjectionOperation::Min => write!(f, "min"),
            ProjectionOperation::Max => write!(f, "max"),
        }
    }
}

/// Collapses one axis of its input.
///
/// The output keeps the dimension with the projection axis reduced to a
/// single cell at the input's start index. Every output cell needs the whole
/// input line along the axis, so the input request spans that axis entirely.
///
/// Each output cell is reduced by one worker in ascending axis order, so the
/// result does not depend on the thread count. Sums accumulate in `f64`;
/// min and max compare pixels directly.
#[derive(Debug, Clone)]
pub struct ProjectionFilter {
    axis: usize,
    operation: ProjectionOperation,
}

impl ProjectionFilter {
    pub fn new(axis: usize, operation: ProjectionOperation) -> Self {
        Self { axis, operation }
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn operation(&self) -> ProjectionOperation {
        self.operation
    }

    pub fn set_axis(&mut self, axis: usize) {
        self.axis = axis;
    }

    pub fn set_operation(&mut self, operation: ProjectionOperation) {
        self.operation = operation;
    }

    fn check_axis<const D: usize>(&self) -> PipelineResult<()> {
        if self.axis >= D {
            return Err(PipelineError::InvalidParameter(format!(
                "projection axis {} of a {}-dimensional image",
                self.axis, D
            )));
        }
        Ok(())
    }

    fn reduce<P: Pixel>(&self, line: impl Iterator<Item = P>) -> Option<P> {
        match self.operation {
            ProjectionOperation::Sum | ProjectionOperation::Mean => {
                let (sum, count) = line.fold((0.0, 0u64), |(s, n), v| (s + v.to_f64(), n + 1));
                if count == 0 {
                    return None;
                }
                Some(match self.operation {
                    ProjectionOperation::Mean => P::from_f64(sum / count as f64),
                    _ => P::from_f64(sum),
                })
            }
            ProjectionOperation::Min => line.reduce(|a, b| if b < a { b } else { a }),
            ProjectionOperation::Max => line.reduce(|a, b| if b > a { b } else { a }),
        }
    }
}

impl<P: Pixel, const D: usize> Filter<P, D> for ProjectionFilter {
    fn name(&self) -> &str {
        "projection"
    }

    fn generate_output_information(&self, inputs: &[&ImageInfo<D>]) -> PipelineResult<ImageInfo<D>> {
        self.check_axis::<D>()?;
        let input = inputs
            .first()
            .ok_or_else(|| PipelineError::InvalidParameter("projection has no input".to_string()))?;
        let mut info = (*input).clone();
        let mut size = info.largest_possible_region.size();
        size.0[self.axis] = size.0[self.axis].min(1);
        info.largest_possible_region.set_size(size);
        Ok(info)
    }

    fn input_requested_region(
        &self,
        output_requested: &Region<D>,
        _input: usize,
        input_info: &ImageInfo<D>,
    ) -> PipelineResult<Region<D>> {
        self.check_axis::<D>()?;
        if output_requested.is_empty() {
            return Ok(*output_requested);
        }
        let largest = input_info.largest_possible_region;
        let mut index = output_requested.index();
        let mut size: Size<D> = output_requested.size();
        index.0[self.axis] = largest.index().0[self.axis];
        size.0[self.axis] = largest.size().0[self.axis];
        Ok(Region::new(index, size))
    }

    fn threaded_generate_data(
        &self,
        inputs: &[&Image<P, D>],
        chunk: &mut OutputChunk<'_, P, D>,
        worker: &WorkerContext<'_>,
    ) -> PipelineResult<()> {
        let input = primary_input(inputs)?;
        let largest = input.largest_possible_region();
        let start = largest.index().0[self.axis];
        let extent = largest.size().0[self.axis] as i64;

        for row in chunk.region().rows() {
            let dst = chunk.row_mut(&row)?;
            let mut cell = row.index();
            let first = cell.0[0];
            for (k, px) in dst.iter_mut().enumerate() {
                cell.0[0] = first + k as i64;
                let line = (start..start + extent).map(|position| {
                    let mut idx = cell;
                    idx.0[self.axis] = position;
                    input.get(&idx)
                });
                let values = line.collect::<Option<Vec<P>>>().ok_or_else(|| {
                    PipelineError::RegionOutOfBounds {
                        requested: cell.to_string(),
                        largest: input.buffered_region().to_string(),
                    }
                })?;
                *px = self.reduce(values.into_iter()).unwrap_or_default();
            }
            worker.complete_row(dst.len() as u64)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::region::Index;

    fn grid(p: &mut Pipeline<i32, 2>) -> crate::pipeline::NodeId {
        // 3 columns, 4 rows: value = x + 10 * y
        let region = Region::new(Index([0, 1]), Size([3, 4]));
        p.add_image("grid", Image::from_fn(region, |idx| (idx.0[0] + 10 * idx.0[1]) as i32))
    }

    #[test]
    fn test_project_rows() {
        let mut p = Pipeline::<i32, 2>::new();
        let img = grid(&mut p);
        let sum = p.add_filter(ProjectionFilter::new(1, ProjectionOperation::Sum));
        p.connect(img, sum).unwrap();
        p.update(sum).unwrap();

        let out = p.output(sum).unwrap();
        assert_eq!(
            out.largest_possible_region(),
            Region::new(Index([0, 1]), Size([3, 1]))
        );
        // Column x: sum over y = 1..=4 of (x + 10y) = 4x + 100
        assert_eq!(out.as_slice(), &[100, 104, 108]);
    }

    #[test]
    fn test_min_max_mean_along_axis_zero() {
        let mut p = Pipeline::<i32, 2>::new();
        let img = grid(&mut p);
        let proj = p.add_filter(ProjectionFilter::new(0, ProjectionOperation::Max));
        p.connect(img, proj).unwrap();
        p.update(proj).unwrap();
        assert_eq!(p.output(proj).unwrap().as_slice(), &[12, 22, 32, 42]);

        p.configure::<ProjectionFilter, _>(proj, |f| f.set_operation(ProjectionOperation::Min))
            .unwrap();
        p.update(proj).unwrap();
        assert_eq!(p.output(proj).unwrap().as_slice(), &[10, 20, 30, 40]);

        p.configure::<ProjectionFilter, _>(proj, |f| f.set_operation(ProjectionOperation::Mean))
            .unwrap();
        p.update(proj).unwrap();
        assert_eq!(p.output(proj).unwrap().as_slice(), &[11, 21, 31, 41]);
    }

    #[test]
    fn test_bad_axis_is_a_configuration_error() {
        let mut p = Pipeline::<i32, 2>::new();
        let img = grid(&mut p);
        let proj = p.add_filter(ProjectionFilter::new(2, ProjectionOperation::Sum));
        p.connect(img, proj).unwrap();
        assert!(p.update(proj).unwrap_err().is_configuration());
    }
}
