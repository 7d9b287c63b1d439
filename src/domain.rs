use serde::{Deserialize, Serialize};
use crate::index_space::IndexSpace;
use crate::point::Point;
use crate::DIM;




/**
 * The index space of a whole level, together with the periodicity of each
 * axis. Any lattice point whose periodic image lies in the space is
 * considered part of the domain; `image` returns the canonical
 * representative.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProblemDomain {
    space: IndexSpace,
    periodic: [bool; DIM],
}




// ============================================================================
impl ProblemDomain {

    pub fn new(space: IndexSpace, periodic: [bool; DIM]) -> Self {
        assert!(!space.is_empty(), "problem domain {} is empty", space);
        Self { space, periodic }
    }

    pub fn periodic(space: IndexSpace) -> Self {
        Self::new(space, [true; DIM])
    }

    pub fn space(&self) -> IndexSpace {
        self.space
    }

    pub fn is_periodic(&self, axis: usize) -> bool {
        self.periodic[axis]
    }

    pub fn periodicity(&self) -> [bool; DIM] {
        self.periodic
    }

    pub fn size(&self) -> Point {
        self.space.dim()
    }


    /**
     * Whether the point, or one of its periodic images, lies in the domain.
     */
    pub fn contains(&self, point: Point) -> bool {
        (0..DIM).all(|a| {
            self.periodic[a] || (self.space.lo()[a] <= point[a] && point[a] <= self.space.hi()[a])
        })
    }


    /**
     * Return the canonical periodic image of a point. Non-periodic axes are
     * left unchanged, so the result is only inside the domain if the input
     * point is `contains`-ed.
     */
    pub fn image(&self, point: Point) -> Point {
        let lo = self.space.lo();
        let size = self.size();
        let mut p = point;
        for a in 0..DIM {
            if self.periodic[a] {
                p[a] = lo[a] + (point[a] - lo[a]).rem_euclid(size[a]);
            }
        }
        p
    }


    /**
     * Return the rigid periodic image of an index space, if the whole space
     * maps with a single shift and lands inside the domain. Spaces crossing a
     * periodic seam or extending past a non-periodic edge yield `None`.
     */
    pub fn image_space(&self, space: &IndexSpace) -> Option<IndexSpace> {
        if space.is_empty() || !self.contains(space.lo()) || !self.contains(space.hi()) {
            return None;
        }
        let shift = self.image(space.lo()) - space.lo();
        let image = space.shift(shift);

        if self.space.contains_space(&image) {
            Some(image)
        } else {
            None
        }
    }


    /**
     * Trim an index space to the domain along non-periodic axes only.
     * Periodic axes are left alone since every point on them has an image.
     */
    pub fn clip(&self, space: &IndexSpace) -> IndexSpace {
        let mut lo = space.lo();
        let mut hi = space.hi();
        for a in 0..DIM {
            if !self.periodic[a] {
                lo[a] = lo[a].max(self.space.lo()[a]);
                hi[a] = hi[a].min(self.space.hi()[a]);
            }
        }
        IndexSpace::new(lo, hi)
    }


    pub fn coarsenable(&self, ratio: Point) -> bool {
        self.space.coarsenable(ratio)
    }


    /**
     * Return the domain coarsened by the given ratio. Panics if the domain
     * is not an exact union of coarse cells.
     */
    pub fn coarsen(&self, ratio: Point) -> Self {
        assert!(
            self.coarsenable(ratio),
            "problem domain {} cannot be coarsened by {}",
            self.space,
            ratio);
        Self::new(self.space.coarsen(ratio), self.periodic)
    }


    pub fn refine(&self, ratio: Point) -> Self {
        Self::new(self.space.refine(ratio), self.periodic)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::ProblemDomain;
    use crate::index_space::range2d;
    use crate::point::Point;

    #[test]
    fn periodic_images_are_canonical() {
        let domain = ProblemDomain::new(range2d(0..8, 0..8), [true, false]);
        assert_eq!(domain.image(Point::new([-1, 3])), Point::new([7, 3]));
        assert_eq!(domain.image(Point::new([17, 3])), Point::new([1, 3]));
        assert!(domain.contains(Point::new([-1, 3])));
        assert!(!domain.contains(Point::new([0, -1])));
    }

    #[test]
    fn rigid_images_reject_seams_and_edges() {
        let domain = ProblemDomain::new(range2d(0..8, 0..8), [true, false]);
        assert_eq!(domain.image_space(&range2d(-2..0, 0..4)), Some(range2d(6..8, 0..4)));
        assert_eq!(domain.image_space(&range2d(-2..2, 0..4)), None);
        assert_eq!(domain.image_space(&range2d(0..2, 7..9)), None);
        assert_eq!(domain.clip(&range2d(-2..10, -2..10)), range2d(-2..10, 0..8));
    }

    #[test]
    #[should_panic]
    fn coarsening_by_a_non_divisor_is_fatal() {
        ProblemDomain::periodic(range2d(0..12, 0..12)).coarsen(Point::ones(5));
    }
}
