use core::fmt;
use core::ops::Range;
use serde::{Deserialize, Serialize};
use crate::point::Point;
use crate::DIM;




/**
 * Identifies one of the two faces of an index space along an axis.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Lo,
    Hi,
}




// ============================================================================
impl Side {

    pub const BOTH: [Side; 2] = [Side::Lo, Side::Hi];

    /**
     * The outward unit sign of this face: -1 for the lower face, +1 for the
     * upper face.
     */
    pub fn sign(&self) -> i64 {
        match self {
            Side::Lo => -1,
            Side::Hi => 1,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Side::Lo => 0,
            Side::Hi => 1,
        }
    }

    pub fn flip(&self) -> Self {
        match self {
            Side::Lo => Side::Hi,
            Side::Hi => Side::Lo,
        }
    }
}




/**
 * Represents a rectangular region in a discrete index space. Both corners are
 * inclusive; the space is empty if `hi < lo` on any axis.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpace {
    lo: Point,
    hi: Point,
}




// ============================================================================
impl IndexSpace {

    pub fn new(lo: Point, hi: Point) -> Self {
        Self { lo, hi }
    }

    /**
     * An index space with no elements.
     */
    pub fn empty() -> Self {
        Self { lo: Point::zeros(), hi: Point::ones(-1) }
    }

    /**
     * The index space `[0, size - 1]` on every axis.
     */
    pub fn cube(size: i64) -> Self {
        Self::new(Point::zeros(), Point::ones(size - 1))
    }

    /**
     * The block of cells covered by the patch at `point` on a lattice of
     * patches with the given size.
     */
    pub fn patch(point: Point, size: Point) -> Self {
        let lo = point.scale(size);
        Self::new(lo, lo + size - Point::ones(1))
    }

    pub fn lo(&self) -> Point {
        self.lo
    }

    pub fn hi(&self) -> Point {
        self.hi
    }

    pub fn is_empty(&self) -> bool {
        (0..DIM).any(|a| self.hi[a] < self.lo[a])
    }


    /**
     * Return the number of indexes on each axis.
     */
    pub fn dim(&self) -> Point {
        if self.is_empty() {
            Point::zeros()
        } else {
            self.hi - self.lo + Point::ones(1)
        }
    }


    /**
     * Return the number of elements in this index space.
     */
    pub fn len(&self) -> usize {
        self.dim().product() as usize
    }


    /**
     * Determine whether this index space contains the given index.
     */
    pub fn contains(&self, index: Point) -> bool {
        (0..DIM).all(|a| self.lo[a] <= index[a] && index[a] <= self.hi[a])
    }


    /**
     * Determine whether another index space is a subset of this one. The
     * empty space is a subset of everything.
     */
    pub fn contains_space(&self, other: &Self) -> bool {
        other.is_empty() || (self.contains(other.lo) && self.contains(other.hi))
    }


    /**
     * Expand this index space by the given number of elements on each side
     * of each axis. Negative values shrink it.
     */
    pub fn grow(&self, delta: Point) -> Self {
        Self::new(self.lo - delta, self.hi + delta)
    }


    /**
     * Expand this index space by the same number of elements on every axis.
     */
    pub fn extend_all(&self, delta: i64) -> Self {
        self.grow(Point::ones(delta))
    }


    /**
     * Trim this index space by the given number of elements on each axis.
     */
    pub fn trim_all(&self, delta: i64) -> Self {
        self.extend_all(-delta)
    }


    /**
     * Extend just the upper elements of this index space on the given axis.
     * A cell space extended by one on axis `a` is the space of `a`-faces.
     */
    pub fn extend_upper(&self, delta: i64, axis: usize) -> Self {
        let mut hi = self.hi;
        hi[axis] += delta;
        Self::new(self.lo, hi)
    }


    /**
     * Extend just the lower elements of this index space on the given axis.
     */
    pub fn extend_lower(&self, delta: i64, axis: usize) -> Self {
        let mut lo = self.lo;
        lo[axis] -= delta;
        Self::new(lo, self.hi)
    }


    /**
     * Shift the index space along one axis.
     */
    pub fn translate(&self, delta: i64, axis: usize) -> Self {
        self.shift(Point::basis(axis) * delta)
    }


    pub fn shift(&self, delta: Point) -> Self {
        Self::new(self.lo + delta, self.hi + delta)
    }


    /**
     * Return the coarse index space whose cells cover this one.
     */
    pub fn coarsen(&self, ratio: Point) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::new(self.lo.coarsen(ratio), self.hi.coarsen(ratio))
    }


    /**
     * Whether this space is an exact union of coarse cells at the given
     * ratio.
     */
    pub fn coarsenable(&self, ratio: Point) -> bool {
        self.lo.divisible_by(ratio) && (self.hi + Point::ones(1)).divisible_by(ratio)
    }


    /**
     * Increase the size of this index space by the given factor.
     */
    pub fn refine(&self, ratio: Point) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::new(self.lo.scale(ratio), (self.hi + Point::ones(1)).scale(ratio) - Point::ones(1))
    }


    /**
     * Return the intersection of two index spaces, which may be empty.
     */
    pub fn intersect(&self, other: &Self) -> Self {
        Self::new(
            self.lo.zip_map(other.lo, i64::max),
            self.hi.zip_map(other.hi, i64::min))
    }


    /**
     * Return the slab of the given thickness lying just outside the face of
     * this index space on the given axis and side.
     */
    pub fn adjacent(&self, axis: usize, side: Side, width: i64) -> Self {
        let (mut lo, mut hi) = (self.lo, self.hi);
        match side {
            Side::Lo => {
                hi[axis] = self.lo[axis] - 1;
                lo[axis] = self.lo[axis] - width;
            }
            Side::Hi => {
                lo[axis] = self.hi[axis] + 1;
                hi[axis] = self.hi[axis] + width;
            }
        }
        Self::new(lo, hi)
    }


    /**
     * Return the linear offset for the given index, in a row-major memory
     * buffer aligned with the start of this index space.
     */
    pub fn row_major_offset(&self, index: Point) -> usize {
        let dim = self.dim();
        let mut offset = 0;
        for a in 0..DIM {
            offset = offset * dim[a] + (index[a] - self.lo[a]);
        }
        offset as usize
    }


    /**
     * Return an iterator which traverses the index space in row-major order
     * (C-like; the final index increases fastest).
     */
    pub fn iter(&self) -> IndexSpaceIter {
        IndexSpaceIter {
            space: *self,
            next: if self.is_empty() { None } else { Some(self.lo) },
        }
    }
}




// ============================================================================
impl IntoIterator for IndexSpace {
    type Item = Point;
    type IntoIter = IndexSpaceIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &'a IndexSpace {
    type Item = Point;
    type IntoIter = IndexSpaceIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for IndexSpace {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "[{} .. {}]", self.lo, self.hi)
    }
}




/**
 * Row-major iterator over the points of an index space.
 */
pub struct IndexSpaceIter {
    space: IndexSpace,
    next: Option<Point>,
}

impl Iterator for IndexSpaceIter {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        let current = self.next?;
        let mut p = current;
        let mut axis = DIM;

        self.next = loop {
            if axis == 0 {
                break None;
            }
            axis -= 1;
            if p[axis] < self.space.hi[axis] {
                p[axis] += 1;
                break Some(p);
            }
            p[axis] = self.space.lo[axis];
        };
        Some(current)
    }
}




/**
 * Less imposing factory function to construct an IndexSpace object from
 * half-open ranges.
 */
pub fn range2d(di: Range<i64>, dj: Range<i64>) -> IndexSpace {
    IndexSpace::new(Point::new([di.start, dj.start]), Point::new([di.end - 1, dj.end - 1]))
}
