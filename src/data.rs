use std::ops::{Index, IndexMut};
use rayon::prelude::*;
use crate::context::Reduction;
use crate::copier::{MotionItem, MotionPlan, Pack, Unpack};
use crate::index_space::IndexSpace;
use crate::layout::{Layout, PatchIndex};
use crate::patch::Patch;
use crate::point::Point;
use crate::DIM;




/**
 * The data of one refinement level: one patch for each entry of a layout
 * owned by this rank, covering the entry's box grown by a ghost depth, with
 * a fixed number of fields per cell. Patches are allocated when the
 * container is created and never resized.
 */
#[derive(Clone, Debug)]
pub struct LevelData {
    layout: Layout,
    ghost: Point,
    num_fields: usize,
    patches: Vec<Patch>,
}




// ============================================================================
impl LevelData {

    pub fn new(layout: &Layout, num_fields: usize, ghost: Point) -> Self {
        assert!(ghost.min_component() >= 0, "ghost depth {} must be non-negative", ghost);

        let patches = layout
            .iter()
            .map(|index| Patch::zeros(layout.patch_space(index).grow(ghost), num_fields))
            .collect();

        Self {
            layout: layout.clone(),
            ghost,
            num_fields,
            patches,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn ghost(&self) -> Point {
        self.ghost
    }

    pub fn num_fields(&self) -> usize {
        self.num_fields
    }

    /**
     * The number of values in each patch, ghost zones included.
     */
    pub fn patch_len(&self) -> usize {
        let size = self.layout.patch_size().zip_map(self.ghost, |n, g| n + 2 * g);
        size.product() as usize * self.num_fields
    }

    /**
     * Whether the two containers are defined over the same partition.
     */
    pub fn compatible(&self, other: &Self) -> bool {
        self.layout.compatible(&other.layout)
    }

    /**
     * The cells of a patch, not including ghost zones.
     */
    pub fn interior(&self, index: PatchIndex) -> IndexSpace {
        self.layout.patch_space(index)
    }


    /**
     * Iterate over the local patches and their handles, in layout order.
     */
    pub fn iter(&self) -> impl Iterator<Item = (PatchIndex, &Patch)> + '_ {
        self.layout.iter().zip(self.patches.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PatchIndex, &mut Patch)> + '_ {
        self.layout.iter().zip(self.patches.iter_mut())
    }

    /**
     * The local patches in layout order, for parallel traversal.
     */
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn patches_mut(&mut self) -> &mut [Patch] {
        &mut self.patches
    }


    /**
     * Fill the ghost zones of every patch from the interiors of its
     * neighbors. Ghost zones with no neighbor keep their values. This is a
     * collective operation.
     */
    pub fn exchange(&mut self) {
        if self.ghost == Point::zeros() {
            return;
        }
        let context = self.layout.context().clone();
        let plan = MotionPlan::cached_exchange(&self.layout, self.ghost);
        context.barrier();
        plan.execute_in_place(&context, self);
    }


    /**
     * Copy the interior values of this container into another one at the same
     * resolution, including its ghost zones where they overlap an interior of
     * this one. This is a collective operation.
     */
    pub fn copy_to(&self, dst: &mut LevelData) {
        assert_eq!(
            self.num_fields, dst.num_fields,
            "cannot copy {} fields into {} fields",
            self.num_fields, dst.num_fields);

        if self.layout == dst.layout {
            for ((index, src), target) in self.iter().zip(dst.patches.iter_mut()) {
                target.copy_region_from(src, &self.layout.patch_space(index), Point::zeros())
            }
            dst.exchange();
        } else {
            let plan = MotionPlan::cached_copy(&self.layout, &dst.layout, dst.ghost);
            plan.execute(self.layout.context(), self, dst);
        }
    }


    /**
     * Average this container down by the given ratio, and copy the result
     * into a coarser container. Cells of the destination which are not
     * covered by this container keep their values.
     */
    pub fn coarsen_to(&self, dst: &mut LevelData, ratio: Point) {
        let mut temp = LevelData::new(&self.layout.coarsen(ratio), self.num_fields, Point::zeros());

        temp.patches
            .par_iter_mut()
            .zip(self.patches.par_iter())
            .for_each(|(coarse, fine)| coarse.average_down(fine, ratio));

        temp.copy_to(dst);
    }


    /**
     * Reduce every field over the interiors of all patches on all ranks.
     */
    pub fn reduce(&self, op: Reduction) -> f64 {
        let local = self
            .iter()
            .map(|(index, patch)| patch.reduce(&self.interior(index), op))
            .fold(op.init(), |a, b| op.combine(a, b));

        self.layout.context().all_reduce_f64(local, op)
    }

    pub fn sum(&self) -> f64 {
        self.reduce(Reduction::Sum)
    }

    pub fn sum_abs(&self) -> f64 {
        self.reduce(Reduction::SumAbs)
    }

    pub fn max(&self) -> f64 {
        self.reduce(Reduction::Max)
    }

    pub fn min(&self) -> f64 {
        self.reduce(Reduction::Min)
    }

    pub fn abs_max(&self) -> f64 {
        self.reduce(Reduction::AbsMax)
    }

    /**
     * The sum over interior cells, times the cell volume.
     */
    pub fn integrate(&self, dx: [f64; DIM]) -> f64 {
        self.sum() * dx.iter().product::<f64>()
    }

    pub fn integrate_abs(&self, dx: [f64; DIM]) -> f64 {
        self.sum_abs() * dx.iter().product::<f64>()
    }


    pub fn set_to_zero(&mut self) {
        self.set_val(0.0)
    }

    /**
     * Set every value, ghost zones included.
     */
    pub fn set_val(&mut self, value: f64) {
        self.patches.par_iter_mut().for_each(|patch| patch.fill(value))
    }

    /**
     * Set the fields of every cell, ghost zones included, from a function of
     * the cell index.
     */
    pub fn initialize<F>(&mut self, f: F)
    where
        F: Fn(Point, &mut [f64]) + Sync,
    {
        self.patches.par_iter_mut().for_each(|patch| {
            for p in patch.space() {
                f(p, patch.get_slice_mut(p))
            }
        })
    }

    /**
     * Set the fields of every cell to fourth-order cell averages of a
     * function sampled at cell centers: `f` is evaluated over each patch
     * grown by one more cell, and the average is recovered as
     * `u + lap(u) / 24`, with the five-point Laplacian.
     */
    pub fn init_convolve<F>(&mut self, f: F)
    where
        F: Fn(Point, &mut [f64]) + Sync,
    {
        let num_fields = self.num_fields;

        self.patches.par_iter_mut().for_each(|patch| {
            let space = patch.space();
            let mut temp = Patch::zeros(space.grow(Point::ones(1)), num_fields);

            for p in temp.space() {
                f(p, temp.get_slice_mut(p))
            }
            for p in space {
                for q in 0..num_fields {
                    let center = temp.get(p, q);
                    let lap: f64 = (0..DIM)
                        .map(|dir| {
                            let e = Point::basis(dir);
                            temp.get(p + e, q) - 2.0 * center + temp.get(p - e, q)
                        })
                        .sum();
                    *patch.get_mut(p, q) = center + lap / 24.0;
                }
            }
        })
    }

    /**
     * Add `scale * other` to this container, ghost zones included.
     */
    pub fn increment(&mut self, other: &LevelData, scale: f64) {
        assert!(self.compatible(other), "cannot increment by data on an incompatible layout");

        self.patches
            .par_iter_mut()
            .zip(other.patches.par_iter())
            .for_each(|(y, x)| y.axpy(scale, x));
    }
}




// ============================================================================
impl Index<PatchIndex> for LevelData {
    type Output = Patch;

    fn index(&self, index: PatchIndex) -> &Patch {
        assert!(self.layout.is_local(index), "{} is not owned by this rank", index);
        &self.patches[index.local()]
    }
}

impl IndexMut<PatchIndex> for LevelData {
    fn index_mut(&mut self, index: PatchIndex) -> &mut Patch {
        assert!(self.layout.is_local(index), "{} is not owned by this rank", index);
        &mut self.patches[index.local()]
    }
}

impl Pack for LevelData {
    fn pack(&self, item: &MotionItem, buffer: &mut Vec<f64>) {
        self[item.src].pack(&item.src_space, buffer)
    }
}

impl Unpack for LevelData {
    fn linear_size(&self, item: &MotionItem) -> usize {
        item.dst_space.len() * self.num_fields
    }

    fn unpack(&mut self, item: &MotionItem, values: &[f64]) {
        self[item.dst].unpack(&item.dst_space, values);
    }
}




/**
 * Replace the coarse cells lying under the fine level with the average of
 * the fine cells they cover.
 */
pub fn average_down(crse: &mut LevelData, fine: &LevelData, ratio: Point) {
    fine.coarsen_to(crse, ratio)
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{average_down, LevelData};
    use crate::context::Context;
    use crate::domain::ProblemDomain;
    use crate::index_space::{range2d, IndexSpace};
    use crate::layout::Layout;
    use crate::message::local::run_ranks;
    use crate::point::Point;

    fn smooth(p: Point) -> f64 {
        (0.3 * p[0] as f64).sin() * (0.7 * p[1] as f64).cos() + p[0] as f64 * 1e-3
    }

    #[test]
    fn copy_round_trip_is_exact_across_layouts() {
        let matched = run_ranks(3, |context| {
            let domain = ProblemDomain::periodic(IndexSpace::cube(48));
            let a_layout = Layout::new(&context, domain, Point::ones(8));
            let b_layout = Layout::new(&context, domain, Point::ones(16));

            let mut a = LevelData::new(&a_layout, 2, Point::ones(1));
            let mut b = LevelData::new(&b_layout, 2, Point::ones(2));
            let mut c = LevelData::new(&a_layout, 2, Point::zeros());

            a.initialize(|p, u| {
                u[0] = smooth(p);
                u[1] = -smooth(p);
            });
            a.copy_to(&mut b);
            b.copy_to(&mut c);

            let matched = a.iter().zip(c.iter()).all(|((index, x), (_, y))| {
                a.interior(index).iter().all(|p| x.get_slice(p) == y.get_slice(p))
            });
            matched
        });
        assert!(matched.iter().all(|m| *m));
    }

    #[test]
    fn exchange_fills_periodic_ghosts_only() {
        let sentinel = -999.0;
        let ok = run_ranks(4, |context| {
            let domain = ProblemDomain::new(IndexSpace::cube(32), [true, false]);
            let layout = Layout::new(&context, domain, Point::ones(8));
            let mut data = LevelData::new(&layout, 1, Point::ones(2));

            data.set_val(sentinel);
            for (index, patch) in data.iter_mut() {
                for p in layout.patch_space(index) {
                    *patch.get_mut(p, 0) = smooth(p);
                }
            }
            data.exchange();

            let filled = data.iter().all(|(_, patch)| {
                patch.space().iter().all(|p| {
                    let expected = if domain.contains(p) { smooth(domain.image(p)) } else { sentinel };
                    patch.get(p, 0) == expected
                })
            });
            filled
        });
        assert!(ok.iter().all(|o| *o));
    }

    #[test]
    fn reductions_see_every_rank() {
        let results = run_ranks(3, |context| {
            let domain = ProblemDomain::periodic(IndexSpace::cube(32));
            let layout = Layout::new(&context, domain, Point::ones(8));
            let mut data = LevelData::new(&layout, 1, Point::ones(1));
            data.set_val(7.0);
            data.initialize(|p, u| u[0] = (p[0] - 10) as f64);
            (
                (data.sum(), data.max(), data.min(), data.abs_max(), data.integrate([0.5, 0.5])),
                (data.sum_abs(), data.integrate_abs([0.5, 0.5])),
            )
        });
        for ((sum, max, min, abs_max, integral), (sum_abs, integral_abs)) in results {
            assert_eq!(sum, 32.0 * (0..32).map(|i| (i - 10) as f64).sum::<f64>());
            assert_eq!(sum_abs, 32.0 * (0..32).map(|i| (i - 10_i64).abs() as f64).sum::<f64>());
            assert_eq!(sum_abs, 32.0 * 286.0);
            assert_eq!(integral_abs, 0.25 * sum_abs);
            assert_eq!(max, 21.0);
            assert_eq!(min, -10.0);
            assert_eq!(abs_max, 21.0);
            assert_eq!(integral, 0.25 * sum);
        }
    }

    #[test]
    fn average_down_conserves_the_sum() {
        let context = Context::serial();
        let domain = ProblemDomain::periodic(IndexSpace::cube(32));
        let coarse_layout = Layout::new(&context, domain.coarsen(Point::ones(2)), Point::ones(8));
        let fine_layout = Layout::from_region(&context, domain, range2d(8..24, 0..16), Point::ones(8));

        let mut coarse = LevelData::new(&coarse_layout, 1, Point::ones(1));
        let mut fine = LevelData::new(&fine_layout, 1, Point::zeros());
        coarse.set_val(1.0);
        fine.initialize(|p, u| u[0] = (p[0] + p[1]) as f64);

        average_down(&mut coarse, &fine, Point::ones(2));

        let covered: f64 = fine.sum() / 4.0;
        let uncovered = (16 * 16 - 8 * 8) as f64;
        assert_eq!(coarse.sum(), covered + uncovered);
        assert_eq!(coarse.iter().next().unwrap().1.get(Point::new([4, 0]), 0), 8.0 + 1.0);
    }

    #[test]
    fn init_convolve_gives_exact_averages_of_a_quadratic() {
        let context = Context::serial();
        let layout = Layout::new(&context, ProblemDomain::periodic(IndexSpace::cube(8)), Point::ones(4));
        let mut data = LevelData::new(&layout, 1, Point::ones(1));
        data.init_convolve(|p, u| {
            let x = p[0] as f64 + 0.5;
            let y = p[1] as f64 + 0.5;
            u[0] = x * x + 3.0 * x * y
        });

        // the mean of x^2 over [i, i + 1] is the center value plus 1/12
        for (_, patch) in data.iter() {
            for p in patch.space() {
                let x = p[0] as f64 + 0.5;
                let y = p[1] as f64 + 0.5;
                assert!((patch.get(p, 0) - (x * x + 3.0 * x * y + 1.0 / 12.0)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn increment_scales_and_adds() {
        let context = Context::serial();
        let layout = Layout::new(&context, ProblemDomain::periodic(IndexSpace::cube(16)), Point::ones(8));
        let mut a = LevelData::new(&layout, 1, Point::ones(1));
        let mut b = LevelData::new(&layout, 1, Point::ones(1));
        a.set_val(1.0);
        b.set_val(2.0);
        a.increment(&b, -0.5);
        assert_eq!(a.abs_max(), 0.0);
        assert_eq!(a.patch_len(), 100);
    }
}
