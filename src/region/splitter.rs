//! Partitioning of a region into work items or stream pieces.
//!
//! Pieces along an axis follow one rule: with `extent` cells and `requested`
//! pieces, each piece spans `ceil(extent / requested)` cells and the last one
//! takes the remainder, so fewer pieces than requested may come back.

use super::Region;
use serde::{Deserialize, Serialize};

/// How a region is cut into sub-regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Cut along the highest axis with more than one cell. Every piece is a
    /// contiguous span of the parent buffer.
    #[default]
    SlowestAxis,
    /// Cut along the axis with the largest extent.
    LargestAxis,
    /// Distribute the cuts over several axes, producing blocks.
    Multidimensional,
}

/// `(cells per piece, piece count)` for one axis.
fn axis_layout(extent: u64, requested: usize) -> (u64, usize) {
    if extent == 0 || requested <= 1 {
        return (extent, 1);
    }
    let per_piece = extent.div_ceil(requested as u64);
    (per_piece, extent.div_ceil(per_piece) as usize)
}

fn largest_axis<const D: usize>(region: &Region<D>) -> Option<usize> {
    let size = region.size();
    let mut best: Option<usize> = None;
    for axis in 0..D {
        if size.0[axis] > 1 && best.is_none_or(|b| size.0[axis] >= size.0[b]) {
            best = Some(axis);
        }
    }
    best
}

/// `(cells per piece, piece count)` per axis for the block layout.
fn block_layout<const D: usize>(region: &Region<D>, requested: usize) -> [(u64, usize); D] {
    let size = region.size();
    let mut splits = [1u64; D];
    loop {
        let candidate = (0..D)
            .filter(|&axis| splits[axis] < size.0[axis])
            .max_by(|&a, &b| (size.0[a] * splits[b]).cmp(&(size.0[b] * splits[a])));
        let Some(axis) = candidate else { break };
        let product: u64 = splits
            .iter()
            .enumerate()
            .map(|(a, &s)| if a == axis { s + 1 } else { s })
            .product();
        if product > requested as u64 {
            break;
        }
        splits[axis] += 1;
    }
    let mut layout = [(0u64, 1usize); D];
    for axis in 0..D {
        layout[axis] = axis_layout(size.0[axis], splits[axis] as usize);
    }
    layout
}

/// Piece `i` along `axis` for a given `(cells per piece, piece count)` layout.
fn axis_piece<const D: usize>(
    region: &Region<D>,
    axis: usize,
    i: usize,
    (per_piece, count): (u64, usize),
) -> Region<D> {
    if i >= count {
        return Region::empty();
    }
    let extent = region.size().0[axis];
    let start = i as u64 * per_piece;
    let mut index = region.index();
    let mut size = region.size();
    index.0[axis] += start as i64;
    size.0[axis] = if i + 1 == count {
        extent - start
    } else {
        per_piece
    };
    Region::new(index, size)
}

impl SplitStrategy {
    fn split_axis<const D: usize>(&self, region: &Region<D>) -> Option<usize> {
        match self {
            SplitStrategy::SlowestAxis => region.slowest_varying_axis(),
            SplitStrategy::LargestAxis => largest_axis(region),
            SplitStrategy::Multidimensional => None,
        }
    }

    /// Number of pieces actually produced for `requested`, at least one.
    pub fn number_of_splits<const D: usize>(&self, region: &Region<D>, requested: usize) -> usize {
        if region.is_empty() {
            return 1;
        }
        match self {
            SplitStrategy::Multidimensional => block_layout(region, requested)
                .iter()
                .map(|&(_, count)| count)
                .product(),
            _ => match self.split_axis(region) {
                Some(axis) => axis_layout(region.size().0[axis], requested).1,
                None => 1,
            },
        }
    }

    /// Piece `i` of the layout computed for `requested` pieces.
    ///
    /// Returns an empty region when `i` is past the last piece.
    pub fn split<const D: usize>(&self, i: usize, requested: usize, region: &Region<D>) -> Region<D> {
        if region.is_empty() {
            return if i == 0 { *region } else { Region::empty() };
        }
        match self {
            SplitStrategy::Multidimensional => {
                let layout = block_layout(region, requested);
                let total: usize = layout.iter().map(|&(_, count)| count).product();
                if i >= total {
                    return Region::empty();
                }
                let mut piece = *region;
                let mut rest = i;
                for (axis, &(per_piece, count)) in layout.iter().enumerate() {
                    piece = axis_piece(&piece, axis, rest % count, (per_piece, count));
                    rest /= count;
                }
                piece
            }
            _ => match self.split_axis(region) {
                Some(axis) => {
                    let layout = axis_layout(region.size().0[axis], requested);
                    axis_piece(region, axis, i, layout)
                }
                None if i == 0 => *region,
                None => Region::empty(),
            },
        }
    }

    /// All pieces for `requested`, in order.
    pub fn split_all<const D: usize>(&self, region: &Region<D>, requested: usize) -> Vec<Region<D>> {
        let count = self.number_of_splits(region, requested);
        (0..count)
            .map(|i| self.split(i, requested, region))
            .collect()
    }
}

impl std::fmt::Display for SplitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitStrategy::SlowestAxis => write!(f, "slowest_axis"),
            SplitStrategy::LargestAxis => write!(f, "largest_axis"),
            SplitStrategy::Multidimensional => write!(f, "multidimensional"),
        }
    }
}
