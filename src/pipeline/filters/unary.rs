use crate::image::{Image, Pixel};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::filter::{primary_input, Filter};
use crate::pipeline::filters::input_row;
use crate::pipeline::threader::{OutputChunk, WorkerContext};
use std::marker::PhantomData;

/// Applies a per-pixel function to its single input.
///
/// The function is the strategy object; the filter only handles regions and
/// threading. Input and output requests are identical.
pub struct UnaryFunctorFilter<P, F> {
    name: String,
    functor: F,
    _pixel: PhantomData<fn(P) -> P>,
}

/// A unary filter that copies its input unchanged.
pub type CopyFilter<P> = UnaryFunctorFilter<P, fn(P) -> P>;

impl<P, F> UnaryFunctorFilter<P, F>
where
    P: Pixel,
    F: Fn(P) -> P + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, functor: F) -> Self {
        Self {
            name: name.into(),
            functor,
            _pixel: PhantomData,
        }
    }

    /// Replaces the functor; go through `Pipeline::configure` so consumers regenerate.
    pub fn set_functor(&mut self, functor: F) {
        self.functor = functor;
    }
}

impl<P: Pixel> UnaryFunctorFilter<P, fn(P) -> P> {
    pub fn identity() -> Self {
        Self::new("copy", std::convert::identity::<P> as fn(P) -> P)
    }
}

impl<P, F, const D: usize> Filter<P, D> for UnaryFunctorFilter<P, F>
where
    P: Pixel,
    F: Fn(P) -> P + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn threaded_generate_data(
        &self,
        inputs: &[&Image<P, D>],
        chunk: &mut OutputChunk<'_, P, D>,
        worker: &WorkerContext<'_>,
    ) -> PipelineResult<()> {
        let input = primary_input(inputs)?;
        for row in chunk.region().rows() {
            let src = input_row(input, &row)?;
            let dst = chunk.row_mut(&row)?;
            for (out, &value) in dst.iter_mut().zip(src) {
                *out = (self.functor)(value);
            }
            worker.complete_row(src.len() as u64)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::region::{Index, Region, Size};

    #[test]
    fn test_functor_applies_per_pixel() {
        let mut p = Pipeline::<i16, 2>::new();
        let region = Region::new(Index([-2, 0]), Size([5, 2]));
        let img = p.add_image("ramp", Image::from_fn(region, |idx| idx.0[0] as i16));
        let abs = p.add_filter(UnaryFunctorFilter::new("abs", |v: i16| v.abs()));
        p.connect(img, abs).unwrap();
        p.update(abs).unwrap();
        assert_eq!(
            p.output(abs).unwrap().as_slice(),
            &[2, 1, 0, 1, 2, 2, 1, 0, 1, 2]
        );
    }

    #[test]
    fn test_identity_copies() {
        let mut p = Pipeline::<u8, 2>::new();
        let region = Region::from_size(Size([3, 3]));
        let img = p.add_image("input", Image::from_fn(region, |idx| (idx.0[0] * idx.0[1]) as u8));
        let copy = p.add_filter(CopyFilter::identity());
        p.connect(img, copy).unwrap();
        p.update(copy).unwrap();
        assert_eq!(
            p.output(copy).unwrap().as_slice(),
            p.output(img).unwrap().as_slice()
        );
        assert_eq!(p.name(copy).unwrap(), "copy");
    }
}
