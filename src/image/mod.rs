//! Buffer-owning data objects.
//!
//! An [`Image`] carries three region roles:
//!
//! - **Largest possible region**: everything its producer could ever generate,
//!   agreed during the output-information pass.
//! - **Buffered region**: what the buffer holds right now.
//! - **Requested region**: what the next update must make valid.
//!
//! After a successful update `requested ⊆ buffered ⊆ largest possible`.
//! The image also records three times on the process-wide clock: when it was
//! last modified, the newest modification anywhere upstream of it, and when
//! its contents were last generated.

pub mod pixel;

pub use pixel::Pixel;

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::time_stamp::{ModifiedTime, TimeStamp};
use crate::region::{Index, Region};
use std::fmt;

/// Size-only metadata of an image: produced without touching any buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo<const D: usize> {
    pub largest_possible_region: Region<D>,
    pub spacing: [f64; D],
    pub origin: [f64; D],
    pub direction: [[f64; D]; D],
}

impl<const D: usize> ImageInfo<D> {
    /// Unit spacing, zero origin, identity direction.
    pub fn new(largest_possible_region: Region<D>) -> Self {
        let mut direction = [[0.0; D]; D];
        for (axis, row) in direction.iter_mut().enumerate() {
            row[axis] = 1.0;
        }
        Self {
            largest_possible_region,
            spacing: [1.0; D],
            origin: [0.0; D],
            direction,
        }
    }

    pub fn with_spacing(mut self, spacing: [f64; D]) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_origin(mut self, origin: [f64; D]) -> Self {
        self.origin = origin;
        self
    }

    /// Physical position of the centre of `index`, ignoring direction cosines.
    pub fn physical_point(&self, index: &Index<D>) -> [f64; D] {
        let mut point = self.origin;
        for axis in 0..D {
            point[axis] += index.0[axis] as f64 * self.spacing[axis];
        }
        point
    }
}

impl<const D: usize> Default for ImageInfo<D> {
    fn default() -> Self {
        Self::new(Region::empty())
    }
}

/// An N-dimensional image of scalar pixels.
#[derive(Clone)]
pub struct Image<P: Pixel, const D: usize> {
    info: ImageInfo<D>,
    buffered_region: Region<D>,
    requested_region: Region<D>,
    buffer: Vec<P>,
    mtime: TimeStamp,
    pipeline_mtime: ModifiedTime,
    update_time: TimeStamp,
    release_data_flag: bool,
    data_released: bool,
}

impl<P: Pixel, const D: usize> Default for Image<P, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Pixel, const D: usize> fmt::Debug for Image<P, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("largest", &self.info.largest_possible_region)
            .field("buffered", &self.buffered_region)
            .field("requested", &self.requested_region)
            .field("pixels", &self.buffer.len())
            .field("mtime", &self.mtime.time())
            .field("pipeline_mtime", &self.pipeline_mtime)
            .field("update_time", &self.update_time.time())
            .field("data_released", &self.data_released)
            .finish()
    }
}

impl<P: Pixel, const D: usize> Image<P, D> {
    /// An image with no regions and no buffer.
    pub fn new() -> Self {
        let mut mtime = TimeStamp::new();
        mtime.modified();
        Self {
            info: ImageInfo::default(),
            buffered_region: Region::empty(),
            requested_region: Region::empty(),
            buffer: Vec::new(),
            mtime,
            pipeline_mtime: ModifiedTime::ZERO,
            update_time: TimeStamp::new(),
            release_data_flag: false,
            data_released: false,
        }
    }

    /// A standalone image covering `region`, every pixel set to `value`.
    pub fn filled(region: Region<D>, value: P) -> Self {
        let mut image = Self::new();
        image.info.largest_possible_region = region;
        image.requested_region = region;
        image.allocate(region);
        image.fill(value);
        image
    }

    /// A standalone image covering `region` with pixels computed from their index.
    pub fn from_fn(region: Region<D>, mut f: impl FnMut(&Index<D>) -> P) -> Self {
        let mut image = Self::new();
        image.info.largest_possible_region = region;
        image.requested_region = region;
        image.buffered_region = region;
        image.buffer = region.iter().map(|idx| f(&idx)).collect();
        image
    }

    /// A standalone image over `region` taking ownership of `data` in buffer order.
    pub fn from_vec(region: Region<D>, data: Vec<P>) -> PipelineResult<Self> {
        let expected = region.number_of_pixels() as usize;
        if data.len() != expected {
            return Err(PipelineError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        let mut image = Self::new();
        image.info.largest_possible_region = region;
        image.requested_region = region;
        image.buffered_region = region;
        image.buffer = data;
        Ok(image)
    }

    // ── Regions and metadata ──

    pub fn info(&self) -> &ImageInfo<D> {
        &self.info
    }

    pub fn largest_possible_region(&self) -> Region<D> {
        self.info.largest_possible_region
    }

    pub fn buffered_region(&self) -> Region<D> {
        self.buffered_region
    }

    pub fn requested_region(&self) -> Region<D> {
        self.requested_region
    }

    pub fn spacing(&self) -> [f64; D] {
        self.info.spacing
    }

    pub fn origin(&self) -> [f64; D] {
        self.info.origin
    }

    pub fn set_spacing(&mut self, spacing: [f64; D]) {
        self.info.spacing = spacing;
        self.modified();
    }

    pub fn set_origin(&mut self, origin: [f64; D]) {
        self.info.origin = origin;
        self.modified();
    }

    pub fn set_largest_possible_region(&mut self, region: Region<D>) {
        if self.info.largest_possible_region != region {
            self.info.largest_possible_region = region;
            self.modified();
        }
    }

    /// Does not count as a modification: requests drive regeneration through
    /// the buffered-region check instead.
    pub fn set_requested_region(&mut self, region: Region<D>) {
        self.requested_region = region;
    }

    pub fn set_requested_region_to_largest_possible_region(&mut self) {
        self.requested_region = self.info.largest_possible_region;
    }

    /// Fails when the requested region leaves the largest possible region.
    pub fn verify_requested_region(&self) -> PipelineResult<()> {
        if self.info.largest_possible_region.contains(&self.requested_region) {
            Ok(())
        } else {
            Err(PipelineError::RegionOutOfBounds {
                requested: self.requested_region.to_string(),
                largest: self.info.largest_possible_region.to_string(),
            })
        }
    }

    pub fn requested_region_is_outside_of_buffered_region(&self) -> bool {
        !self.buffered_region.contains(&self.requested_region)
    }

    // ── Buffer ──

    /// Resize the buffer to exactly cover `region`. Contents are reset to the default pixel.
    pub fn allocate(&mut self, region: Region<D>) {
        let len = region.number_of_pixels() as usize;
        self.buffer.clear();
        self.buffer.resize(len, P::default());
        self.buffered_region = region;
        self.data_released = false;
    }

    pub fn fill(&mut self, value: P) {
        self.buffer.fill(value);
    }

    pub fn as_slice(&self) -> &[P] {
        &self.buffer
    }

    pub fn as_mut_slice(&mut self) -> &mut [P] {
        &mut self.buffer
    }

    /// Pixel at `index`, if buffered.
    pub fn get(&self, index: &Index<D>) -> Option<P> {
        if !self.buffered_region.contains_index(index) {
            return None;
        }
        self.buffer
            .get(self.buffered_region.compute_offset(index))
            .copied()
    }

    pub fn get_mut(&mut self, index: &Index<D>) -> Option<&mut P> {
        if !self.buffered_region.contains_index(index) {
            return None;
        }
        let offset = self.buffered_region.compute_offset(index);
        self.buffer.get_mut(offset)
    }

    /// Writes `value` at `index`; returns `false` when `index` is not buffered.
    pub fn set(&mut self, index: &Index<D>, value: P) -> bool {
        match self.get_mut(index) {
            Some(pixel) => {
                *pixel = value;
                true
            }
            None => false,
        }
    }

    fn row_span(&self, row: &Region<D>) -> Option<std::ops::Range<usize>> {
        if row.is_empty() || !self.buffered_region.contains(row) {
            return None;
        }
        let start = self.buffered_region.compute_offset(&row.index());
        Some(start..start + row.size().0[0] as usize)
    }

    /// Buffer slice of an axis-0 scan line, if fully buffered.
    pub fn row(&self, row: &Region<D>) -> Option<&[P]> {
        let span = self.row_span(row)?;
        self.buffer.get(span)
    }

    pub fn row_mut(&mut self, row: &Region<D>) -> Option<&mut [P]> {
        let span = self.row_span(row)?;
        self.buffer.get_mut(span)
    }

    fn buffered_or_err(&self, region: &Region<D>) -> PipelineResult<()> {
        if self.buffered_region.contains(region) {
            Ok(())
        } else {
            Err(PipelineError::RegionOutOfBounds {
                requested: region.to_string(),
                largest: self.buffered_region.to_string(),
            })
        }
    }

    /// Copies the pixels of `region` out, in buffer order of `region`.
    pub fn extract(&self, region: &Region<D>) -> PipelineResult<Vec<P>> {
        self.buffered_or_err(region)?;
        let mut out = Vec::with_capacity(region.number_of_pixels() as usize);
        for row in region.rows() {
            if let Some(src) = self.row(&row) {
                out.extend_from_slice(src);
            }
        }
        Ok(out)
    }

    /// Copies `region` from `source`; both images must buffer it.
    pub fn copy_region_from(&mut self, source: &Image<P, D>, region: &Region<D>) -> PipelineResult<()> {
        source.buffered_or_err(region)?;
        self.buffered_or_err(region)?;
        for row in region.rows() {
            if let (Some(src), Some(dst)) = (source.row(&row), self.row_mut(&row)) {
                dst.copy_from_slice(src);
            }
        }
        Ok(())
    }

    /// Writes `data`, laid out over `region`, into the buffer.
    pub fn write_region(&mut self, region: &Region<D>, data: &[P]) -> PipelineResult<()> {
        self.buffered_or_err(region)?;
        let expected = region.number_of_pixels() as usize;
        if data.len() != expected {
            return Err(PipelineError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        let mut consumed = 0;
        for row in region.rows() {
            let len = row.size().0[0] as usize;
            if let Some(dst) = self.row_mut(&row) {
                dst.copy_from_slice(&data[consumed..consumed + len]);
            }
            consumed += len;
        }
        Ok(())
    }

    // ── Time stamps ──

    /// Marks a semantic change to this image.
    pub fn modified(&mut self) {
        self.mtime.modified();
    }

    pub fn mtime(&self) -> ModifiedTime {
        self.mtime.time()
    }

    /// Newest modification of this image's producer or anything upstream of it.
    pub fn pipeline_mtime(&self) -> ModifiedTime {
        self.pipeline_mtime
    }

    /// When the buffer contents were last generated.
    pub fn update_mtime(&self) -> ModifiedTime {
        self.update_time.time()
    }

    // ── Memory management ──

    pub fn release_data_flag(&self) -> bool {
        self.release_data_flag
    }

    /// When set, a consumer frees this image's buffer once it has used it.
    pub fn set_release_data_flag(&mut self, flag: bool) {
        self.release_data_flag = flag;
    }

    pub fn data_released(&self) -> bool {
        self.data_released
    }

    pub fn release_data(&mut self) {
        self.buffer = Vec::new();
        self.buffered_region = Region::empty();
        self.data_released = true;
    }

    // ── Pipeline hooks ──

    pub(crate) fn set_info(&mut self, info: ImageInfo<D>) {
        self.info = info;
    }

    pub(crate) fn set_pipeline_mtime(&mut self, time: ModifiedTime) {
        self.pipeline_mtime = time;
    }

    /// Drops the old contents before the producer regenerates.
    pub(crate) fn prepare_for_new_data(&mut self) {
        self.buffer = Vec::new();
        self.buffered_region = Region::empty();
    }

    pub(crate) fn data_has_been_generated(&mut self) {
        self.data_released = false;
        self.mtime.modified();
        self.update_time.modified();
    }

    /// Contents are undefined; the next update must regenerate them.
    pub(crate) fn invalidate(&mut self) {
        self.update_time.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Size;

    fn region(ix: i64, iy: i64, sx: u64, sy: u64) -> Region<2> {
        Region::new(Index([ix, iy]), Size([sx, sy]))
    }

    #[test]
    fn test_standalone_regions() {
        let image = Image::<u8, 2>::filled(region(2, 3, 4, 5), 7);
        assert_eq!(image.largest_possible_region(), region(2, 3, 4, 5));
        assert_eq!(image.buffered_region(), region(2, 3, 4, 5));
        assert_eq!(image.requested_region(), region(2, 3, 4, 5));
        assert_eq!(image.as_slice().len(), 20);
        assert_eq!(image.get(&Index([2, 3])), Some(7));
        assert_eq!(image.get(&Index([1, 3])), None);
    }

    #[test]
    fn test_from_fn_layout() {
        let image = Image::<i32, 2>::from_fn(region(0, 0, 3, 2), |idx| {
            (idx.0[0] + 10 * idx.0[1]) as i32
        });
        assert_eq!(image.as_slice(), &[0, 1, 2, 10, 11, 12]);
        assert_eq!(image.row(&region(0, 1, 3, 1)), Some(&[10, 11, 12][..]));
    }

    #[test]
    fn test_from_vec_checks_length() {
        let err = Image::<u8, 2>::from_vec(region(0, 0, 2, 2), vec![0; 3]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BufferSize {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_extract_and_write_region() {
        let image = Image::<u16, 2>::from_fn(region(0, 0, 4, 4), |idx| {
            (idx.0[0] + 4 * idx.0[1]) as u16
        });
        let part = image.extract(&region(1, 1, 2, 2)).unwrap();
        assert_eq!(part, vec![5, 6, 9, 10]);

        let mut target = Image::<u16, 2>::filled(region(0, 0, 4, 4), 0);
        target.write_region(&region(1, 1, 2, 2), &part).unwrap();
        assert_eq!(target.get(&Index([2, 2])), Some(10));
        assert_eq!(target.get(&Index([0, 0])), Some(0));

        assert!(image.extract(&region(3, 3, 2, 2)).is_err());
    }

    #[test]
    fn test_copy_region_from() {
        let source = Image::<f32, 2>::filled(region(0, 0, 5, 5), 1.5);
        let mut target = Image::<f32, 2>::filled(region(2, 2, 5, 5), 0.0);
        target.copy_region_from(&source, &region(2, 2, 3, 3)).unwrap();
        assert_eq!(target.get(&Index([4, 4])), Some(1.5));
        assert_eq!(target.get(&Index([5, 5])), Some(0.0));
    }

    #[test]
    fn test_verify_requested_region() {
        let mut image = Image::<u8, 2>::filled(region(0, 0, 4, 4), 0);
        image.set_requested_region(region(1, 1, 2, 2));
        assert!(image.verify_requested_region().is_ok());
        assert!(!image.requested_region_is_outside_of_buffered_region());

        image.set_requested_region(region(3, 3, 2, 2));
        assert!(image.verify_requested_region().is_err());
        assert!(image.requested_region_is_outside_of_buffered_region());
    }

    #[test]
    fn test_release_data() {
        let mut image = Image::<u8, 2>::filled(region(0, 0, 4, 4), 1);
        image.release_data();
        assert!(image.data_released());
        assert!(image.buffered_region().is_empty());
        assert!(image.as_slice().is_empty());
        assert!(image.requested_region_is_outside_of_buffered_region());
    }

    #[test]
    fn test_modified_advances_mtime() {
        let mut image = Image::<u8, 2>::filled(region(0, 0, 2, 2), 1);
        let before = image.mtime();
        image.set_requested_region(region(0, 0, 1, 1));
        assert_eq!(image.mtime(), before);
        image.set_spacing([0.5, 0.5]);
        assert!(image.mtime() > before);
    }

    #[test]
    fn test_physical_point() {
        let info = ImageInfo::<2>::new(region(0, 0, 4, 4))
            .with_spacing([0.5, 2.0])
            .with_origin([10.0, -1.0]);
        assert_eq!(info.physical_point(&Index([2, 3])), [11.0, 5.0]);
    }
}
