//! Axis-aligned N-dimensional index boxes.
//!
//! A [`Region`] is an origin [`Index`] plus a [`Size`] per axis. Every buffer
//! in the crate is laid out row-major with axis 0 varying fastest, so a region
//! doubles as the layout descriptor of the buffer that covers it.
//!
//! All arithmetic is exact integer arithmetic.

pub mod splitter;

pub use splitter::SplitStrategy;

use std::fmt;
use std::ops::{Add, Sub};

/// Grid cell coordinates, one signed component per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Index<const D: usize>(pub [i64; D]);

impl<const D: usize> Index<D> {
    pub const fn new(components: [i64; D]) -> Self {
        Self(components)
    }

    pub const fn zero() -> Self {
        Self([0; D])
    }

    /// Index with every component equal to `value`.
    pub const fn filled(value: i64) -> Self {
        Self([value; D])
    }
}

impl<const D: usize> Default for Index<D> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<const D: usize> Add for Index<D> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        for (a, b) in self.0.iter_mut().zip(rhs.0) {
            *a += b;
        }
        self
    }
}

impl<const D: usize> Sub for Index<D> {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self {
        for (a, b) in self.0.iter_mut().zip(rhs.0) {
            *a -= b;
        }
        self
    }
}

impl<const D: usize> fmt::Display for Index<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (axis, v) in self.0.iter().enumerate() {
            if axis > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

/// Extent per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size<const D: usize>(pub [u64; D]);

impl<const D: usize> Size<D> {
    pub const fn new(extents: [u64; D]) -> Self {
        Self(extents)
    }

    /// Size with every extent equal to `value`.
    pub const fn filled(value: u64) -> Self {
        Self([value; D])
    }

    /// Product of all extents.
    pub fn number_of_pixels(&self) -> u64 {
        self.0.iter().product()
    }
}

impl<const D: usize> Default for Size<D> {
    fn default() -> Self {
        Self([0; D])
    }
}

impl<const D: usize> fmt::Display for Size<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (axis, v) in self.0.iter().enumerate() {
            if axis > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "]")
    }
}

/// Flat buffer offset of `index` inside a buffer of extent `size`.
///
/// `index` is relative to the buffer origin and must lie inside it.
pub fn compute_offset<const D: usize>(index: &Index<D>, size: &Size<D>) -> usize {
    let mut offset = 0usize;
    let mut stride = 1usize;
    for axis in 0..D {
        offset += index.0[axis] as usize * stride;
        stride *= size.0[axis] as usize;
    }
    offset
}

/// Inverse of [`compute_offset`].
pub fn compute_index<const D: usize>(offset: usize, size: &Size<D>) -> Index<D> {
    let mut remaining = offset;
    let mut index = [0i64; D];
    for axis in 0..D {
        let extent = size.0[axis].max(1) as usize;
        index[axis] = (remaining % extent) as i64;
        remaining /= extent;
    }
    Index(index)
}

/// An axis-aligned box of grid cells.
///
/// A region with any zero extent is empty and yields no cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region<const D: usize> {
    index: Index<D>,
    size: Size<D>,
}

impl<const D: usize> Default for Region<D> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const D: usize> Region<D> {
    pub const fn new(index: Index<D>, size: Size<D>) -> Self {
        Self { index, size }
    }

    /// Region anchored at the zero index.
    pub const fn from_size(size: Size<D>) -> Self {
        Self {
            index: Index::zero(),
            size,
        }
    }

    /// The canonical empty region: zero index, zero size.
    pub const fn empty() -> Self {
        Self {
            index: Index::zero(),
            size: Size([0; D]),
        }
    }

    #[inline]
    pub fn index(&self) -> Index<D> {
        self.index
    }

    #[inline]
    pub fn size(&self) -> Size<D> {
        self.size
    }

    pub fn set_index(&mut self, index: Index<D>) {
        self.index = index;
    }

    pub fn set_size(&mut self, size: Size<D>) {
        self.size = size;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size.0.iter().any(|&s| s == 0)
    }

    pub fn number_of_pixels(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.size.number_of_pixels()
        }
    }

    /// One past the last index along `axis`.
    #[inline]
    pub fn upper_bound(&self, axis: usize) -> i64 {
        self.index.0[axis] + self.size.0[axis] as i64
    }

    pub fn contains_index(&self, index: &Index<D>) -> bool {
        (0..D).all(|axis| {
            index.0[axis] >= self.index.0[axis] && index.0[axis] < self.upper_bound(axis)
        })
    }

    /// `other ⊆ self`. An empty region is contained in every region.
    pub fn contains(&self, other: &Region<D>) -> bool {
        if other.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        (0..D).all(|axis| {
            other.index.0[axis] >= self.index.0[axis]
                && other.upper_bound(axis) <= self.upper_bound(axis)
        })
    }

    /// Componentwise overlap. Disjoint regions give [`Region::empty`].
    pub fn intersect(&self, other: &Region<D>) -> Region<D> {
        if self.is_empty() || other.is_empty() {
            return Region::empty();
        }
        let mut index = [0i64; D];
        let mut size = [0u64; D];
        for axis in 0..D {
            let lo = self.index.0[axis].max(other.index.0[axis]);
            let hi = self.upper_bound(axis).min(other.upper_bound(axis));
            if hi <= lo {
                return Region::empty();
            }
            index[axis] = lo;
            size[axis] = (hi - lo) as u64;
        }
        Region::new(Index(index), Size(size))
    }

    /// Crops `self` to `bounds` in place.
    ///
    /// Returns `false` and leaves `self` untouched when the two are disjoint.
    pub fn crop_to(&mut self, bounds: &Region<D>) -> bool {
        let cropped = self.intersect(bounds);
        if cropped.is_empty() {
            return false;
        }
        *self = cropped;
        true
    }

    /// Grows the region by `radius` on both sides of every axis.
    pub fn pad_by_radius(&self, radius: &Size<D>) -> Region<D> {
        let mut padded = *self;
        for axis in 0..D {
            padded.index.0[axis] -= radius.0[axis] as i64;
            padded.size.0[axis] += 2 * radius.0[axis];
        }
        padded
    }

    pub fn pad_by(&self, radius: u64) -> Region<D> {
        self.pad_by_radius(&Size::filled(radius))
    }

    /// Flat offset of `index` in a buffer laid out over this region.
    pub fn compute_offset(&self, index: &Index<D>) -> usize {
        debug_assert!(self.contains_index(index), "{} outside {}", index, self);
        compute_offset(&(*index - self.index), &self.size)
    }

    /// Absolute index of the cell at `offset` in a buffer laid out over this region.
    pub fn compute_index(&self, offset: usize) -> Index<D> {
        compute_index(offset, &self.size) + self.index
    }

    /// Cells in buffer order.
    pub fn iter(&self) -> RegionIter<D> {
        RegionIter {
            region: *self,
            next: if self.is_empty() { None } else { Some(self.index) },
        }
    }

    /// Scan lines along axis 0, in buffer order.
    pub fn rows(&self) -> RowIter<D> {
        let mut outer = *self;
        let mut row_size = self.size;
        if D > 0 {
            outer.size.0[0] = if self.is_empty() { 0 } else { 1 };
            row_size = Size::filled(1);
            row_size.0[0] = self.size.0[0];
        }
        RowIter {
            outer: outer.iter(),
            row_size,
        }
    }

    /// Whether `self` occupies a single contiguous span of a buffer laid out over `outer`.
    ///
    /// `self` must lie inside `outer`.
    pub fn is_contiguous_in(&self, outer: &Region<D>) -> bool {
        if self.is_empty() {
            return true;
        }
        let Some(top) = (0..D).rev().find(|&axis| self.size.0[axis] > 1) else {
            return true;
        };
        (0..top).all(|axis| self.size.0[axis] == outer.size.0[axis])
    }

    /// Highest axis with an extent greater than one.
    pub fn slowest_varying_axis(&self) -> Option<usize> {
        (0..D).rev().find(|&axis| self.size.0[axis] > 1)
    }
}

impl<const D: usize> fmt::Display for Region<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{index {}, size {}}}", self.index, self.size)
    }
}

/// Iterator over the cells of a [`Region`].
#[derive(Debug, Clone)]
pub struct RegionIter<const D: usize> {
    region: Region<D>,
    next: Option<Index<D>>,
}

impl<const D: usize> Iterator for RegionIter<D> {
    type Item = Index<D>;

    fn next(&mut self) -> Option<Index<D>> {
        let current = self.next?;
        let mut idx = current;
        self.next = None;
        for axis in 0..D {
            idx.0[axis] += 1;
            if idx.0[axis] < self.region.upper_bound(axis) {
                self.next = Some(idx);
                break;
            }
            idx.0[axis] = self.region.index.0[axis];
        }
        Some(current)
    }
}

/// Iterator over the axis-0 scan lines of a [`Region`].
#[derive(Debug, Clone)]
pub struct RowIter<const D: usize> {
    outer: RegionIter<D>,
    row_size: Size<D>,
}

impl<const D: usize> Iterator for RowIter<D> {
    type Item = Region<D>;

    fn next(&mut self) -> Option<Region<D>> {
        self.outer
            .next()
            .map(|start| Region::new(start, self.row_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn region2(ix: i64, iy: i64, sx: u64, sy: u64) -> Region<2> {
        Region::new(Index([ix, iy]), Size([sx, sy]))
    }

    #[test]
    fn test_contains() {
        let outer = region2(0, 0, 10, 10);
        assert!(outer.contains(&region2(2, 3, 4, 4)));
        assert!(outer.contains(&region2(0, 0, 10, 10)));
        assert!(!outer.contains(&region2(8, 8, 4, 1)));
        assert!(!outer.contains(&region2(-1, 0, 2, 2)));
        assert!(outer.contains(&Region::empty()));
        assert!(!Region::<2>::empty().contains(&outer));
    }

    #[test]
    fn test_intersect() {
        let a = region2(0, 0, 10, 10);
        let b = region2(5, -5, 10, 10);
        assert_eq!(a.intersect(&b), region2(5, 0, 5, 5));
        assert_eq!(a.intersect(&region2(10, 0, 3, 3)), Region::empty());
    }

    #[test]
    fn test_crop_to() {
        let bounds = region2(0, 0, 10, 10);
        let mut r = region2(-2, 4, 5, 20);
        assert!(r.crop_to(&bounds));
        assert_eq!(r, region2(0, 4, 3, 6));

        let mut outside = region2(20, 20, 2, 2);
        assert!(!outside.crop_to(&bounds));
        assert_eq!(outside, region2(20, 20, 2, 2));
    }

    #[test]
    fn test_pad_by_radius() {
        let r = region2(3, 3, 4, 2);
        assert_eq!(r.pad_by_radius(&Size([1, 2])), region2(2, 1, 6, 6));
        assert_eq!(r.pad_by(0), r);
    }

    #[test]
    fn test_compute_offset() {
        let size = Size([4, 3, 2]);
        assert_eq!(compute_offset(&Index([0, 0, 0]), &size), 0);
        assert_eq!(compute_offset(&Index([1, 0, 0]), &size), 1);
        assert_eq!(compute_offset(&Index([0, 1, 0]), &size), 4);
        assert_eq!(compute_offset(&Index([3, 2, 1]), &size), 23);
        assert_eq!(compute_index(23, &size), Index([3, 2, 1]));

        let r = Region::new(Index([10, 20]), Size([5, 5]));
        assert_eq!(r.compute_offset(&Index([11, 21])), 6);
        assert_eq!(r.compute_index(6), Index([11, 21]));
    }

    #[test]
    fn test_iteration_order() {
        let r = region2(1, 1, 2, 2);
        let cells: Vec<_> = r.iter().collect();
        assert_eq!(
            cells,
            vec![
                Index([1, 1]),
                Index([2, 1]),
                Index([1, 2]),
                Index([2, 2])
            ]
        );
        assert_eq!(Region::<2>::empty().iter().count(), 0);
    }

    #[test]
    fn test_rows() {
        let r = Region::new(Index([0, 0, 0]), Size([4, 2, 3]));
        let rows: Vec<_> = r.rows().collect();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0], Region::new(Index([0, 0, 0]), Size([4, 1, 1])));
        assert_eq!(rows[5], Region::new(Index([0, 1, 2]), Size([4, 1, 1])));
        assert_eq!(Region::<3>::empty().rows().count(), 0);
    }

    #[test]
    fn test_is_contiguous_in() {
        let outer = region2(0, 0, 8, 8);
        assert!(region2(0, 2, 8, 3).is_contiguous_in(&outer));
        assert!(region2(2, 5, 3, 1).is_contiguous_in(&outer));
        assert!(!region2(0, 0, 4, 8).is_contiguous_in(&outer));
    }

    #[test]
    fn test_display() {
        assert_eq!(region2(1, -2, 3, 4).to_string(), "{index (1, -2), size [3, 4]}");
    }

    fn arb_region() -> impl Strategy<Value = Region<2>> {
        (-20i64..20, -20i64..20, 0u64..15, 0u64..15)
            .prop_map(|(ix, iy, sx, sy)| region2(ix, iy, sx, sy))
    }

    proptest! {
        #[test]
        fn intersect_is_contained_in_both(a in arb_region(), b in arb_region()) {
            let i = a.intersect(&b);
            prop_assert!(a.contains(&i));
            prop_assert!(b.contains(&i));
        }

        #[test]
        fn intersect_is_commutative(a in arb_region(), b in arb_region()) {
            prop_assert_eq!(a.intersect(&b), b.intersect(&a));
        }

        #[test]
        fn padded_crop_stays_in_bounds(a in arb_region(), bounds in arb_region(), radius in 0u64..6) {
            let mut padded = a.pad_by(radius);
            if padded.crop_to(&bounds) {
                prop_assert!(bounds.contains(&padded));
            }
        }

        #[test]
        fn iteration_visits_every_cell_once(a in arb_region()) {
            let cells: Vec<_> = a.iter().collect();
            prop_assert_eq!(cells.len() as u64, a.number_of_pixels());
            for (offset, cell) in cells.iter().enumerate() {
                prop_assert_eq!(a.compute_offset(cell), offset);
            }
        }
    }
}
