//! Refinement hierarchies, the data living on them, and operators applied
//! across all their levels at once.

use std::ops::{Index, IndexMut};
use log::debug;
use rayon::prelude::*;
use crate::context::{Context, Reduction};
use crate::data::{average_down, LevelData};
use crate::error::Error;
use crate::flux_register::FluxRegister;
use crate::interp::{interp_boundaries, InterpStencil};
use crate::layout::{Layout, PatchIndex};
use crate::operator::{face_patches, PatchOp};
use crate::patch::Patch;
use crate::point::Point;
use crate::DIM;




/**
 * The number of coarse cells by which each refined level must be surrounded
 * by its parent level.
 */
pub const NESTING: i64 = 2;




/**
 * A hierarchy of layouts, coarsest first, each refining the one before it
 * by a per-axis ratio.
 */
#[derive(Clone, Debug)]
pub struct AmrGrid {
    layouts: Vec<Layout>,
    ratios: Vec<Point>,
}




// ============================================================================
impl AmrGrid {

    /**
     * Validate and assemble a hierarchy. There must be one ratio per refined
     * level; each domain must be its parent's refined by the ratio; fine
     * patches must coarsen to whole coarse cells; and each fine patch must
     * be covered by its parent level out to `NESTING` coarse cells.
     */
    pub fn new(layouts: Vec<Layout>, ratios: Vec<Point>) -> Result<Self, Error> {
        if layouts.is_empty() {
            return Err(Error::EmptyLevel(0));
        }
        if ratios.len() + 1 != layouts.len() {
            return Err(Error::LevelCountMismatch { ratios: ratios.len(), levels: layouts.len() - 1 });
        }
        for (level, layout) in layouts.iter().enumerate() {
            if layout.is_empty() {
                return Err(Error::EmptyLevel(level));
            }
        }
        for (level, ratio) in ratios.iter().enumerate() {
            let crse = &layouts[level];
            let fine = &layouts[level + 1];

            if ratio.min_component() < 1 || !fine.domain().coarsenable(*ratio) {
                return Err(Error::NotCoarsenable(fine.domain().space(), *ratio));
            }
            if crse.domain().refine(*ratio) != fine.domain() {
                return Err(Error::RegionOutsideDomain(fine.domain().space(), crse.domain().refine(*ratio).space()));
            }
            if !fine.patch_size().divisible_by(*ratio) {
                return Err(Error::InvalidPatchSize(fine.patch_size()));
            }
            for index in fine.iter_all() {
                let region = crse.domain().clip(&fine.patch_space(index).coarsen(*ratio).extend_all(NESTING));

                if region.coarsen(crse.patch_size()).iter().any(|q| crse.find(q).is_none()) {
                    return Err(Error::NotNested(level + 1, fine.patch_space(index)));
                }
            }
        }
        debug!(
            "AMR grid with {} levels: {:?} patches",
            layouts.len(),
            layouts.iter().map(Layout::len).collect::<Vec<_>>());

        Ok(Self { layouts, ratios })
    }


    /**
     * A hierarchy with a single level.
     */
    pub fn single(layout: Layout) -> Self {
        Self { layouts: vec![layout], ratios: Vec::new() }
    }

    pub fn num_levels(&self) -> usize {
        self.layouts.len()
    }

    pub fn layout(&self, level: usize) -> &Layout {
        &self.layouts[level]
    }

    pub fn layouts(&self) -> &[Layout] {
        &self.layouts
    }

    /**
     * The ratio between a level and the next finer one.
     */
    pub fn ratio(&self, level: usize) -> Point {
        self.ratios[level]
    }

    pub fn ratios(&self) -> &[Point] {
        &self.ratios
    }

    pub fn context(&self) -> &Context {
        self.layouts[0].context()
    }


    /**
     * The grid spacing on a level, given the spacing on the coarsest.
     */
    pub fn dx(&self, level: usize, dx0: [f64; DIM]) -> [f64; DIM] {
        let mut dx = dx0;
        for ratio in &self.ratios[..level] {
            for (h, r) in dx.iter_mut().zip(ratio.coords()) {
                *h /= r as f64
            }
        }
        dx
    }


    /**
     * Whether a cell of the given level lies under a patch of the next finer
     * level.
     */
    pub fn is_covered(&self, level: usize, cell: Point) -> bool {
        match self.layouts.get(level + 1) {
            None => false,
            Some(fine) => fine.find(cell.refine(self.ratios[level]).coarsen(fine.patch_size())).is_some(),
        }
    }


    /**
     * Whether the levels of another hierarchy share this one's partitions.
     */
    pub fn compatible(&self, other: &Self) -> bool {
        self.num_levels() == other.num_levels()
            && self.layouts.iter().zip(&other.layouts).all(|(a, b)| a.compatible(b))
    }
}




/**
 * One `LevelData` per level of a hierarchy, all with the same number of
 * fields and ghost depth.
 */
#[derive(Clone, Debug)]
pub struct AmrData {
    grid: AmrGrid,
    levels: Vec<LevelData>,
}




// ============================================================================
impl AmrData {

    pub fn new(grid: &AmrGrid, num_fields: usize, ghost: Point) -> Self {
        Self {
            grid: grid.clone(),
            levels: grid.layouts.iter().map(|layout| LevelData::new(layout, num_fields, ghost)).collect(),
        }
    }

    pub fn grid(&self) -> &AmrGrid {
        &self.grid
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn num_fields(&self) -> usize {
        self.levels[0].num_fields()
    }

    pub fn ghost(&self) -> Point {
        self.levels[0].ghost()
    }

    pub fn levels(&self) -> &[LevelData] {
        &self.levels
    }

    pub fn levels_mut(&mut self) -> &mut [LevelData] {
        &mut self.levels
    }

    pub fn compatible(&self, other: &Self) -> bool {
        self.grid.compatible(&other.grid)
    }


    /**
     * Set every cell of every level from a function of the cell index and
     * the grid spacing of its level.
     */
    pub fn initialize<F>(&mut self, dx0: [f64; DIM], f: F)
    where
        F: Fn(Point, [f64; DIM], &mut [f64]) + Sync,
    {
        for (level, data) in self.levels.iter_mut().enumerate() {
            let dx = self.grid.dx(level, dx0);
            data.initialize(|p, values| f(p, dx, values))
        }
    }

    pub fn set_to_zero(&mut self) {
        for level in &mut self.levels {
            level.set_to_zero()
        }
    }

    pub fn exchange(&mut self) {
        for level in &mut self.levels {
            level.exchange()
        }
    }

    pub fn increment(&mut self, other: &AmrData, scale: f64) {
        for (y, x) in self.levels.iter_mut().zip(&other.levels) {
            y.increment(x, scale)
        }
    }


    /**
     * Replace coarse cells lying under finer levels with the average of the
     * fine cells they cover, from the finest level down.
     */
    pub fn average_down(&mut self) {
        for level in (1..self.levels.len()).rev() {
            let (crse, fine) = self.levels.split_at_mut(level);
            average_down(&mut crse[level - 1], &fine[0], self.grid.ratio(level - 1));
        }
    }


    /**
     * The integral over the composite grid: each level contributes only its
     * cells not covered by the next finer level. All fields are summed. This
     * is a collective operation.
     */
    pub fn integrate(&self, dx0: [f64; DIM]) -> f64 {
        let mut local = 0.0;

        for (level, data) in self.levels.iter().enumerate() {
            let volume: f64 = self.grid.dx(level, dx0).iter().product();
            let mut sum = 0.0;

            for (index, patch) in data.iter() {
                for p in data.interior(index) {
                    if !self.grid.is_covered(level, p) {
                        sum += patch.get_slice(p).iter().sum::<f64>()
                    }
                }
            }
            local += sum * volume;
        }
        self.grid.context().all_reduce_f64(local, Reduction::Sum)
    }


    /**
     * The largest magnitude over every cell of every level.
     */
    pub fn abs_max(&self) -> f64 {
        self.levels.iter().map(LevelData::abs_max).fold(0.0, f64::max)
    }
}

impl Index<usize> for AmrData {
    type Output = LevelData;

    fn index(&self, level: usize) -> &LevelData {
        &self.levels[level]
    }
}

impl IndexMut<usize> for AmrData {
    fn index_mut(&mut self, level: usize) -> &mut LevelData {
        &mut self.levels[level]
    }
}




/**
 * Applies a per-patch operator on every level of a hierarchy, filling the
 * ghost zones of refined levels by interpolation from their parents, and
 * correcting coarse cells next to refined regions so the result is
 * conservative over the composite grid.
 */
#[derive(Clone, Debug)]
pub struct AmrOp<OP> {
    grid: AmrGrid,
    dx: Vec<[f64; DIM]>,
    ops: Vec<OP>,
    registers: Vec<FluxRegister>,
    stencils: Vec<InterpStencil>,
}




// ============================================================================
impl<OP: PatchOp> AmrOp<OP> {

    /**
     * Create the operator on a hierarchy whose coarsest spacing is `dx0`.
     */
    pub fn new(grid: &AmrGrid, dx0: [f64; DIM]) -> Self {
        let dx: Vec<_> = (0..grid.num_levels()).map(|level| grid.dx(level, dx0)).collect();
        let ops = dx.iter().map(|h| OP::new(*h)).collect();
        let registers = (0..grid.num_levels() - 1)
            .map(|level| FluxRegister::new(grid.layout(level), grid.layout(level + 1), grid.ratio(level), dx[level], OP::NUM_STATE))
            .collect();
        let stencils = grid.ratios().iter().map(|ratio| InterpStencil::build(OP::INTERP_ORDER, *ratio)).collect();

        Self {
            grid: grid.clone(),
            dx,
            ops,
            registers,
            stencils,
        }
    }

    pub fn grid(&self) -> &AmrGrid {
        &self.grid
    }

    pub fn num_levels(&self) -> usize {
        self.ops.len()
    }

    pub fn op(&self, level: usize) -> &OP {
        &self.ops[level]
    }

    pub fn dx(&self, level: usize) -> [f64; DIM] {
        self.dx[level]
    }

    /**
     * The ghost depth state data must have.
     */
    pub fn ghost(&self) -> Point {
        Point::ones(OP::GHOST)
    }

    pub fn aux_ghost(&self) -> Point {
        Point::ones(OP::AUX_GHOST)
    }

    /**
     * The stencil filling the ghost zones of the given refined level from
     * its parent.
     */
    pub fn interp_stencil(&self, level: usize) -> &InterpStencil {
        assert!(level > 0, "the coarsest level has no interpolation stencil");
        &self.stencils[level - 1]
    }

    pub fn register(&self, level: usize) -> &FluxRegister {
        &self.registers[level]
    }


    /**
     * Set the flux scale of every level to `value / R^grid_factor`, where `R`
     * is the accumulated refinement ratio (along the first axis) of the
     * level.
     */
    pub fn set_flux_scale(&mut self, value: f64, grid_factor: i32) {
        for level in 0..self.ops.len() {
            let scale = value / self.refinement(level).powi(grid_factor);
            self.ops[level].set_flux_scale(scale)
        }
    }

    pub fn set_diag_scale(&mut self, value: f64, grid_factor: i32) {
        for level in 0..self.ops.len() {
            let scale = value / self.refinement(level).powi(grid_factor);
            self.ops[level].set_diag_scale(scale)
        }
    }

    fn refinement(&self, level: usize) -> f64 {
        self.grid.ratios()[..level].iter().map(|r| r[0] as f64).product()
    }


    fn check(&self, output: &AmrData, state: &AmrData, aux: Option<&AmrData>) {
        assert_eq!(state.num_levels(), self.num_levels(), "state has the wrong number of levels");
        assert_eq!(output.num_levels(), self.num_levels(), "output has the wrong number of levels");
        for level in 0..self.num_levels() {
            let layout = self.grid.layout(level);
            assert!(
                state[level].layout().compatible(layout) && output[level].layout().compatible(layout),
                "state and output on level {} are not defined on the operator's layout",
                level);
            if let Some(aux) = aux {
                assert_eq!(aux.num_levels(), self.num_levels(), "auxiliary data has the wrong number of levels");
                assert!(
                    aux[level].layout().compatible(layout),
                    "auxiliary data on level {} is not defined on the operator's layout",
                    level);
            }
        }
        assert_eq!(state.num_fields(), OP::NUM_STATE, "state has the wrong number of fields");
        assert_eq!(output.num_fields(), OP::NUM_STATE, "output has the wrong number of fields");
        assert!(
            state.ghost().min_component() >= OP::GHOST,
            "state ghost depth {} is less than the required {}",
            state.ghost(),
            OP::GHOST);

        if let Some(aux) = aux {
            assert_eq!(aux.num_fields(), OP::NUM_AUX, "auxiliary data has the wrong number of fields");
            assert!(
                aux.ghost().min_component() >= OP::AUX_GHOST,
                "auxiliary ghost depth {} is less than the required {}",
                aux.ghost(),
                OP::AUX_GHOST);
        }
    }


    fn check_level(&self, level: usize, output: &LevelData, state: &AmrData, aux: Option<&AmrData>) {
        assert!(level < self.num_levels(), "level {} is out of range", level);
        assert_eq!(state.num_levels(), self.num_levels(), "state has the wrong number of levels");
        assert!(
            output.layout().compatible(self.grid.layout(level)),
            "output is not defined on level {} of the operator",
            level);
        assert!(
            state.grid().compatible(&self.grid),
            "state is not defined on the operator's grid");
        assert!(
            state.ghost().min_component() >= OP::GHOST,
            "state ghost depth {} is less than the required {}",
            state.ghost(),
            OP::GHOST);

        if let Some(aux) = aux {
            assert!(aux.grid().compatible(&self.grid), "auxiliary data is not defined on the operator's grid");
        }
    }


    /**
     * Apply the operator to the local patches of one level, whose ghost
     * zones must already be filled, and return the face fluxes of each
     * patch.
     */
    fn apply_level(
        &self,
        level: usize,
        output: &mut LevelData,
        state: &LevelData,
        aux: Option<&LevelData>,
        scale: f64,
    ) -> Vec<(PatchIndex, Vec<Patch>)> {
        let op = &self.ops[level];
        let layout = state.layout();

        output
            .patches_mut()
            .par_iter_mut()
            .zip(state.patches().par_iter())
            .enumerate()
            .map(|(n, (out, patch))| {
                let index = layout.local_index(n);
                let interior = layout.patch_space(index);
                let mut fluxes = face_patches(&interior, OP::NUM_STATE);
                op.apply_with_fluxes(out, &mut fluxes, patch, aux.map(|a| &a.patches()[n]), &interior, scale);
                (index, fluxes)
            })
            .collect()
    }


    /**
     * Evaluate only the face fluxes on the local patches of one level.
     */
    fn level_fluxes(&self, level: usize, state: &LevelData, aux: Option<&LevelData>) -> Vec<(PatchIndex, Vec<Patch>)> {
        let op = &self.ops[level];
        let layout = state.layout();

        state
            .patches()
            .par_iter()
            .enumerate()
            .map(|(n, patch)| {
                let index = layout.local_index(n);
                let mut fluxes = face_patches(&layout.patch_space(index), OP::NUM_STATE);
                for (dir, flux) in fluxes.iter_mut().enumerate() {
                    op.flux(flux, patch, aux.map(|a| &a.patches()[n]), dir);
                }
                (index, fluxes)
            })
            .collect()
    }


    /**
     * Feed the fluxes computed on `level` into the registers it takes part
     * in: as the coarse side of its own register, and as the fine side of
     * its parent's.
     */
    fn accumulate(&mut self, level: usize, fluxes: &[(PatchIndex, Vec<Patch>)], as_coarse: bool, as_fine: bool) {
        let flux_scale = self.ops[level].flux_scale();

        for (index, patch_fluxes) in fluxes {
            for (dir, flux) in patch_fluxes.iter().enumerate() {
                if as_coarse {
                    self.registers[level].increment_coarse(flux, *index, flux_scale, dir);
                }
                if as_fine {
                    self.registers[level - 1].increment_fine(flux, *index, flux_scale, dir);
                }
            }
        }
    }


    /**
     * Fill the ghost zones of one level: by exchange on the coarsest level,
     * and by interpolation from the parent level above it.
     */
    fn fill_ghosts(&self, level: usize, state: &mut AmrData) {
        if level == 0 {
            state[0].exchange();
        } else {
            let (crse, fine) = state.levels.split_at_mut(level);
            interp_boundaries(&mut crse[level - 1], &mut fine[0], &self.stencils[level - 1]);
        }
    }


    /**
     * Apply the operator to one level whose ghost zones are already filled,
     * without any correction at refinement boundaries.
     */
    pub fn uncorrected_apply(&self, level: usize, output: &mut LevelData, state: &LevelData, aux: Option<&LevelData>, scale: f64) {
        assert!(
            output.layout().compatible(self.grid.layout(level)) && state.layout().compatible(self.grid.layout(level)),
            "output and state are not defined on level {} of the operator",
            level);
        self.apply_level(level, output, state, aux, scale);
    }


    /**
     * Write `scale * L(state)` on one level into `output`. The next finer
     * level is averaged down onto this one, and this one onto its parent;
     * the ghost zones are filled from the parent (or by exchange on the
     * coarsest level); and, if there is a finer level, the result is
     * refluxed against it. This is a collective operation.
     */
    pub fn level_apply(&mut self, level: usize, output: &mut LevelData, state: &mut AmrData, aux: Option<&AmrData>, scale: f64) {
        self.check_level(level, output, state, aux);

        if level + 1 < self.num_levels() {
            let (crse, fine) = state.levels.split_at_mut(level + 1);
            average_down(&mut crse[level], &fine[0], self.grid.ratio(level));
        }
        if level > 0 {
            let (crse, fine) = state.levels.split_at_mut(level);
            average_down(&mut crse[level - 1], &fine[0], self.grid.ratio(level - 1));
        }
        self.fill_ghosts(level, state);
        self.apply_level(level, output, &state[level], aux.map(|a| &a[level]), scale);

        if level + 1 < self.num_levels() {
            self.reflux(level, output, state, aux, scale);
        }
    }


    /**
     * Correct the output on `level` for the flux mismatch against the next
     * finer level. The register is reset, and both sides are recomputed
     * from the current state: the fine ghost zones are interpolated from
     * `level` first. This is a collective operation.
     */
    pub fn reflux(&mut self, level: usize, output: &mut LevelData, state: &mut AmrData, aux: Option<&AmrData>, scale: f64) {
        assert!(level + 1 < self.num_levels(), "level {} has no finer level to reflux against", level);
        self.check_level(level, output, state, aux);

        self.fill_ghosts(level + 1, state);
        let crse_fluxes = self.level_fluxes(level, &state[level], aux.map(|a| &a[level]));
        let fine_fluxes = self.level_fluxes(level + 1, &state[level + 1], aux.map(|a| &a[level + 1]));

        self.registers[level].reset();
        self.accumulate(level, &crse_fluxes, true, false);
        self.accumulate(level + 1, &fine_fluxes, false, true);
        self.registers[level].reflux(output, scale);
    }


    /**
     * Write `scale * L(state)` into every level of the output. The state is
     * averaged down, and its ghost zones are filled, before the operator is
     * applied. This is a collective operation.
     */
    pub fn apply(&mut self, output: &mut AmrData, state: &mut AmrData, aux: Option<&AmrData>, scale: f64) {
        self.check(output, state, aux);
        state.average_down();

        for register in &mut self.registers {
            register.reset()
        }

        let num_levels = self.num_levels();

        for level in 0..num_levels {
            self.fill_ghosts(level, state);
            let fluxes = self.apply_level(level, &mut output[level], &state[level], aux.map(|a| &a[level]), scale);
            self.accumulate(level, &fluxes, level + 1 < num_levels, level > 0);
        }

        for level in 0..num_levels - 1 {
            self.registers[level].reflux(&mut output[level], scale);
        }
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{AmrData, AmrGrid, AmrOp};
    use crate::context::Context;
    use crate::domain::ProblemDomain;
    use crate::error::Error;
    use crate::flux_register::RegisterState;
    use crate::index_space::{range2d, IndexSpace};
    use crate::layout::Layout;
    use crate::message::local::run_ranks;
    use crate::operator::Laplace;
    use crate::point::Point;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn two_level_grid(context: &Context) -> AmrGrid {
        let domain = ProblemDomain::periodic(IndexSpace::cube(16));
        let crse = Layout::new(context, domain, Point::ones(4));
        let fine = Layout::from_region(context, domain.refine(Point::ones(2)), range2d(8..16, 8..20), Point::ones(4));
        AmrGrid::new(vec![crse, fine], vec![Point::ones(2)]).unwrap()
    }

    #[test]
    fn grids_are_validated() {
        let context = Context::serial();
        let domain = ProblemDomain::new(IndexSpace::cube(16), [false, false]);
        let crse = Layout::from_region(&context, domain, range2d(0..8, 0..16), Point::ones(4));
        let fine_domain = domain.refine(Point::ones(2));
        let inside = Layout::from_region(&context, fine_domain, range2d(4..8, 12..16), Point::ones(4));
        let outside = Layout::from_region(&context, fine_domain, range2d(12..16, 12..16), Point::ones(4));

        assert!(AmrGrid::new(vec![crse.clone(), inside.clone()], vec![Point::ones(2)]).is_ok());
        assert_eq!(
            AmrGrid::new(vec![crse.clone(), inside], vec![]).unwrap_err(),
            Error::LevelCountMismatch { ratios: 0, levels: 1 });
        assert!(matches!(
            AmrGrid::new(vec![crse.clone(), outside.clone()], vec![Point::ones(2)]),
            Err(Error::NotNested(1, _))));
        assert!(matches!(
            AmrGrid::new(vec![crse, outside], vec![Point::ones(4)]),
            Err(Error::RegionOutsideDomain(..))));
    }

    #[test]
    fn covered_cells_are_found_on_the_finer_level() {
        let grid = two_level_grid(&Context::serial());
        assert!(grid.is_covered(0, Point::new([4, 4])));
        assert!(grid.is_covered(0, Point::new([7, 9])));
        assert!(!grid.is_covered(0, Point::new([8, 4])));
        assert!(!grid.is_covered(1, Point::new([8, 8])));
        assert_eq!(grid.dx(1, [1.0, 0.5]), [0.5, 0.25]);
    }

    #[test]
    fn composite_integral_skips_covered_cells() {
        let grid = two_level_grid(&Context::serial());
        let mut data = AmrData::new(&grid, 1, Point::ones(1));
        data.initialize([1.0 / 16.0; 2], |_, _, values| values[0] = 1.0);
        assert_relative_eq!(data.integrate([1.0 / 16.0; 2]), 1.0, epsilon = 1e-14);
    }

    #[test]
    fn average_down_overwrites_covered_cells() {
        let grid = two_level_grid(&Context::serial());
        let mut data = AmrData::new(&grid, 1, Point::zeros());
        data[1].set_val(3.0);
        data.average_down();

        // the fine level covers 4 x 6 coarse cells
        assert_eq!(data[0].sum(), 3.0 * 24.0);
        assert_eq!(data[0].max(), 3.0);
    }

    #[test]
    fn single_level_apply_of_a_constant_is_zero() {
        let context = Context::serial();
        let domain = ProblemDomain::periodic(IndexSpace::cube(8));
        let grid = AmrGrid::single(Layout::new(&context, domain, Point::ones(4)));
        let mut op: AmrOp<Laplace> = AmrOp::new(&grid, [0.125; 2]);
        let mut state = AmrData::new(&grid, 1, op.ghost());
        let mut output = AmrData::new(&grid, 1, Point::zeros());

        state.initialize([0.125; 2], |_, _, values| values[0] = 5.0);
        op.apply(&mut output, &mut state, None, 1.0);
        assert_eq!(output.abs_max(), 0.0);
    }

    #[test]
    fn two_level_apply_is_conservative() {
        let results = run_ranks(2, |context| {
            let grid = two_level_grid(&context);
            let dx0 = [1.0 / 16.0; 2];
            let mut op: AmrOp<Laplace> = AmrOp::new(&grid, dx0);
            let mut state = AmrData::new(&grid, 1, op.ghost());
            let mut output = AmrData::new(&grid, 1, Point::zeros());

            state.initialize(dx0, |p, dx, values| {
                let x = (p[0] as f64 + 0.5) * dx[0];
                let y = (p[1] as f64 + 0.5) * dx[1];
                values[0] = (2.0 * PI * x).sin() * (4.0 * PI * y).cos() + x * y
            });
            op.apply(&mut output, &mut state, None, 1.0);
            (output.integrate(dx0), output.abs_max(), op.register(0).state())
        });
        for (integral, magnitude, state) in results {
            assert!(magnitude > 1.0);
            assert!(integral.abs() < 1e-10);
            assert_eq!(state, RegisterState::Refluxed);
        }
    }

    #[test]
    fn level_apply_and_reflux_follow_the_state_they_are_given() {
        let results = run_ranks(2, |context| {
            let grid = two_level_grid(&context);
            let dx0 = [1.0 / 16.0; 2];
            let mut op: AmrOp<Laplace> = AmrOp::new(&grid, dx0);
            let mut a = AmrData::new(&grid, 1, op.ghost());
            let mut b = AmrData::new(&grid, 1, op.ghost());
            let mut reference = AmrData::new(&grid, 1, Point::zeros());
            let mut scratch = AmrData::new(&grid, 1, Point::zeros());
            let mut by_level = AmrData::new(&grid, 1, Point::zeros());
            let mut split = AmrData::new(&grid, 1, Point::zeros());

            a.initialize(dx0, |p, dx, values| values[0] = (2.0 * PI * (p[0] as f64 + 0.5) * dx[0]).cos());
            b.initialize(dx0, |p, dx, values| {
                let x = (p[0] as f64 + 0.5) * dx[0];
                let y = (p[1] as f64 + 0.5) * dx[1];
                values[0] = (2.0 * PI * x).sin() * (4.0 * PI * y).cos() + x * y
            });

            // leave the registers holding the fluxes of a different state
            op.apply(&mut reference, &mut b, None, 1.0);
            op.apply(&mut scratch, &mut a, None, 1.0);

            op.level_apply(0, &mut by_level[0], &mut b, None, 1.0);
            op.level_apply(1, &mut by_level[1], &mut b, None, 1.0);

            op.uncorrected_apply(0, &mut split[0], &b[0], None, 1.0);
            op.reflux(0, &mut split[0], &mut b, None, 1.0);

            by_level.increment(&reference, -1.0);
            split[0].increment(&reference[0], -1.0);
            (by_level.abs_max(), split[0].abs_max(), reference.abs_max())
        });
        for (by_level, split, magnitude) in results {
            assert!(magnitude > 1.0);
            assert!(by_level <= 1e-12 * magnitude, "level_apply differs from apply by {:e}", by_level);
            assert!(split <= 1e-12 * magnitude, "reflux differs from apply by {:e}", split);
        }
    }
}
