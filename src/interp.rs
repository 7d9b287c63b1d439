use log::trace;
use crate::data::LevelData;
use crate::index_space::IndexSpace;
use crate::patch::Patch;
use crate::point::Point;
use crate::DIM;




/**
 * Weights for computing the average of a fine cell from the averages of
 * nearby coarse cells. A stencil is built per axis and combined as a tensor
 * product; for each offset of a fine cell within its coarse parent it holds
 * a list of (coarse offset, weight) pairs.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct InterpStencil {
    ratio: Point,
    ghost: Point,
    weights: Vec<Vec<(Point, f64)>>,
}




// ============================================================================
impl InterpStencil {

    /**
     * Every fine cell takes the value of its coarse parent.
     */
    pub fn piecewise_constant(ratio: Point) -> Self {
        Self::tensor(ratio, 0, |_, _| vec![(0, 1.0)])
    }


    /**
     * Centered multilinear interpolation between the parent and the coarse
     * neighbor on the side of the fine cell center.
     */
    pub fn linear(ratio: Point) -> Self {
        Self::tensor(ratio, 1, |n, r| {
            let xi = (n as f64 + 0.5) / r as f64 - 0.5;

            if xi < 0.0 {
                vec![(-1, -xi), (0, 1.0 + xi)]
            } else {
                vec![(0, 1.0 - xi), (1, xi)]
            }
        })
    }


    /**
     * Conservative quadratic interpolation: each fine cell gets the exact
     * average, over that cell, of the parabola whose averages over the
     * parent and its two neighbors match the coarse values. The fine cells
     * of a parent average to the parent's value.
     */
    pub fn quadratic(ratio: Point) -> Self {
        Self::tensor(ratio, 1, |n, r| {
            let a = -0.5 + n as f64 / r as f64;
            let b = a + 1.0 / r as f64;
            let xi = 0.5 * (a + b);
            let m2 = (a * a + a * b + b * b) / 3.0 - 1.0 / 12.0;
            vec![(-1, -0.5 * xi + 0.5 * m2), (0, 1.0 - m2), (1, 0.5 * xi + 0.5 * m2)]
        })
    }


    /**
     * Return the stencil of the given polynomial order (0, 1, or 2).
     */
    pub fn build(order: usize, ratio: Point) -> Self {
        match order {
            0 => Self::piecewise_constant(ratio),
            1 => Self::linear(ratio),
            2 => Self::quadratic(ratio),
            _ => panic!("no interpolation stencil of order {}", order),
        }
    }


    fn tensor<F>(ratio: Point, ghost: i64, weights_1d: F) -> Self
    where
        F: Fn(i64, i64) -> Vec<(i64, f64)>,
    {
        assert!(ratio.min_component() > 0, "refinement ratio {} must be positive", ratio);

        let block = IndexSpace::new(Point::zeros(), ratio - Point::ones(1));
        let weights = block
            .iter()
            .map(|offset| {
                let mut terms = vec![(Point::zeros(), 1.0)];

                for axis in 0..DIM {
                    let mut factors = weights_1d(offset[axis], ratio[axis]);
                    factors.retain(|(_, w)| *w != 0.0);
                    terms = terms
                        .iter()
                        .flat_map(|(k, w)| {
                            factors.iter().map(move |(dk, dw)| (*k + Point::basis(axis) * *dk, w * dw))
                        })
                        .collect();
                }
                terms
            })
            .collect();

        Self {
            ratio,
            ghost: Point::ones(ghost),
            weights,
        }
    }


    pub fn ratio(&self) -> Point {
        self.ratio
    }

    /**
     * The number of coarse cells beyond the parent which the stencil reads.
     */
    pub fn ghost(&self) -> Point {
        self.ghost
    }

    /**
     * The (coarse offset, weight) pairs for a fine cell at the given offset
     * within its parent.
     */
    pub fn weights(&self, offset: Point) -> &[(Point, f64)] {
        let block = IndexSpace::new(Point::zeros(), self.ratio - Point::ones(1));
        &self.weights[block.row_major_offset(offset)]
    }


    /**
     * Interpolate one field of the fine cell `fine`, from a coarse patch
     * holding its parent and the parent's neighbors.
     */
    pub fn apply(&self, coarse: &Patch, fine: Point, field: usize) -> f64 {
        let parent = fine.coarsen(self.ratio);
        self.weights(fine.offset_within(self.ratio))
            .iter()
            .map(|(k, w)| w * coarse.get(parent + *k, field))
            .sum()
    }
}




/**
 * Fill the ghost zones of a fine level from a coarser one. Fine ghost cells
 * covered by another fine patch are filled by exchange; the others are
 * interpolated from the coarse level with the given stencil. Where the
 * stencil would read outside a non-periodic edge of the coarse domain, the
 * parent value is used instead. Ghost cells outside a non-periodic edge of
 * the domain are not touched.
 *
 * This is a collective operation. The coarse level must cover the fine
 * level grown by its ghost depth and the stencil's reach.
 */
pub fn interp_boundaries(crse: &mut LevelData, fine: &mut LevelData, stencil: &InterpStencil) {
    let ratio = stencil.ratio();
    let fine_layout = fine.layout().clone();
    let fine_domain = fine_layout.domain();
    let crse_domain = crse.layout().domain();
    let reach = fine.ghost().zip_map(ratio, |g, r| (g + r - 1) / r) + stencil.ghost();
    let mut temp = LevelData::new(&fine_layout.coarsen(ratio), crse.num_fields(), reach);

    crse.exchange();
    crse.copy_to(&mut temp);

    let mut filled = 0;

    for ((index, patch), (_, coarse)) in fine.iter_mut().zip(temp.iter()) {
        let interior = fine_layout.patch_space(index);

        for p in patch.space() {
            if interior.contains(p)
                || !fine_domain.contains(p)
                || fine_layout.find(p.coarsen(fine_layout.patch_size())).is_some()
            {
                continue;
            }
            let parent = p.coarsen(ratio);
            let in_reach = stencil
                .weights(p.offset_within(ratio))
                .iter()
                .all(|(k, _)| crse_domain.contains(parent + *k));

            for q in 0..coarse.num_fields() {
                *patch.get_mut(p, q) = if in_reach {
                    stencil.apply(coarse, p, q)
                } else {
                    coarse.get(parent, q)
                };
            }
            filled += 1;
        }
    }
    trace!("interpolated {} fine ghost cells", filled);

    fine.exchange();
}
