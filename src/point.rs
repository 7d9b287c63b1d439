use core::fmt;
use core::ops::{Add, AddAssign, Index, IndexMut, Mul, Neg, Sub, SubAssign};
use serde::{Deserialize, Serialize};
use crate::DIM;




/**
 * A point on the integer lattice. Arithmetic is componentwise, and ordering
 * is lexicographic (the first axis is most significant), which is also the
 * order in which an `IndexSpace` is traversed.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Point(pub [i64; DIM]);




// ============================================================================
impl Point {

    pub const fn new(coords: [i64; DIM]) -> Self {
        Self(coords)
    }

    pub const fn zeros() -> Self {
        Self([0; DIM])
    }

    pub const fn ones(value: i64) -> Self {
        Self([value; DIM])
    }

    /**
     * Return the unit vector along the given axis.
     */
    pub fn basis(axis: usize) -> Self {
        assert!(axis < DIM, "axis {} out of range for dimension {}", axis, DIM);
        let mut p = Self::zeros();
        p.0[axis] = 1;
        p
    }

    pub fn coords(&self) -> [i64; DIM] {
        self.0
    }

    pub fn sum(&self) -> i64 {
        self.0.iter().sum()
    }

    pub fn product(&self) -> i64 {
        self.0.iter().product()
    }

    pub fn min_component(&self) -> i64 {
        self.0.iter().copied().min().unwrap_or(0)
    }

    pub fn max_component(&self) -> i64 {
        self.0.iter().copied().max().unwrap_or(0)
    }

    /**
     * Apply a function to each component.
     */
    pub fn map<F: Fn(i64) -> i64>(&self, f: F) -> Self {
        let mut p = *self;
        for x in p.0.iter_mut() {
            *x = f(*x)
        }
        p
    }

    /**
     * Combine two points componentwise.
     */
    pub fn zip_map<F: Fn(i64, i64) -> i64>(&self, other: Self, f: F) -> Self {
        let mut p = *self;
        for (x, y) in p.0.iter_mut().zip(other.0) {
            *x = f(*x, y)
        }
        p
    }

    /**
     * Componentwise product with another point.
     */
    pub fn scale(&self, other: Self) -> Self {
        self.zip_map(other, |a, b| a * b)
    }

    /**
     * Floor division by a positive ratio on each axis. Negative coordinates
     * round toward negative infinity, so that every fine cell maps to the
     * coarse cell that contains it.
     */
    pub fn coarsen(&self, ratio: Self) -> Self {
        assert!(ratio.min_component() > 0, "coarsening ratio {} must be positive", ratio);
        self.zip_map(ratio, i64::div_euclid)
    }

    pub fn refine(&self, ratio: Self) -> Self {
        self.scale(ratio)
    }

    /**
     * Componentwise remainder of floor division, in `[0, ratio)`.
     */
    pub fn offset_within(&self, ratio: Self) -> Self {
        self.zip_map(ratio, i64::rem_euclid)
    }

    /**
     * Whether every component of this point is divisible by the given ratio.
     */
    pub fn divisible_by(&self, ratio: Self) -> bool {
        ratio.min_component() > 0 && self.0.iter().zip(ratio.0).all(|(a, r)| a.rem_euclid(r) == 0)
    }
}




// ============================================================================
impl Add for Point {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.zip_map(other, |a, b| a + b)
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self.zip_map(other, |a, b| a - b)
    }
}

impl Mul<i64> for Point {
    type Output = Self;

    fn mul(self, factor: i64) -> Self {
        self.map(|a| a * factor)
    }
}

impl Neg for Point {
    type Output = Self;

    fn neg(self) -> Self {
        self.map(|a| -a)
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other
    }
}

impl SubAssign for Point {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other
    }
}

impl Index<usize> for Point {
    type Output = i64;

    fn index(&self, axis: usize) -> &i64 {
        &self.0[axis]
    }
}

impl IndexMut<usize> for Point {
    fn index_mut(&mut self, axis: usize) -> &mut i64 {
        &mut self.0[axis]
    }
}

impl From<[i64; DIM]> for Point {
    fn from(coords: [i64; DIM]) -> Self {
        Self(coords)
    }
}

impl From<(i64, i64)> for Point {
    fn from(index: (i64, i64)) -> Self {
        Self([index.0, index.1])
    }
}

impl fmt::Display for Point {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "(")?;
        for (n, x) in self.0.iter().enumerate() {
            if n > 0 {
                write!(fmt, " ")?;
            }
            write!(fmt, "{}", x)?;
        }
        write!(fmt, ")")
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::Point;

    #[test]
    fn coarsening_rounds_toward_negative_infinity() {
        let p = Point::new([-1, 7]);
        assert_eq!(p.coarsen(Point::ones(4)), Point::new([-1, 1]));
        assert_eq!(Point::new([-4, -5]).coarsen(Point::ones(4)), Point::new([-1, -2]));
        assert_eq!(p.offset_within(Point::ones(4)), Point::new([3, 3]));
    }

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Point::new([0, 9]) < Point::new([1, 0]));
        assert!(Point::new([1, 0]) < Point::new([1, 1]));
    }

    #[test]
    fn arithmetic_is_componentwise() {
        let a = Point::new([1, 2]);
        let b = Point::new([3, -4]);
        assert_eq!(a + b, Point::new([4, -2]));
        assert_eq!(a - b, Point::new([-2, 6]));
        assert_eq!(a.scale(b), Point::new([3, -8]));
        assert_eq!(b * 2, Point::new([6, -8]));
        assert_eq!(Point::basis(1), Point::new([0, 1]));
        assert!(Point::new([8, 16]).divisible_by(Point::new([4, 8])));
        assert!(!Point::new([8, 12]).divisible_by(Point::new([4, 8])));
    }
}
