//! Accumulators for the fluxes through coarse-fine interfaces, used to make
//! a two-level discretization conservative.
//!
//! An interface piece is where the face of a fine patch on axis `dir` and
//! side `side` borders coarse cells not covered by any fine patch. The
//! coarse cells touching the face form a one-cell-thick slab. Each piece has
//! a fine register, owned by the rank of the fine patch, accumulating the
//! fine fluxes averaged to coarse faces; and a coarse register, owned by the
//! rank of the coarse patch, accumulating the coarse fluxes through the same
//! faces. Refluxing moves the fine registers to the coarse ranks and adds the
//! flux mismatch to the coarse cells of the slab.
//!
//! The side of a piece is always that of the fine patch: a `Hi` piece lies
//! above the fine patch, so its coarse cells touch the interface with their
//! lower face.

use log::{debug, warn};
use crate::copier::{MotionItem, MotionPlan, Pack, Unpack};
use crate::data::LevelData;
use crate::index_space::{IndexSpace, Side};
use crate::layout::{Layout, PatchIndex};
use crate::patch::Patch;
use crate::point::Point;
use crate::DIM;
use std::collections::BTreeSet;




/**
 * Where the register is in its reset, accumulate, reflux cycle.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterState {
    Reset,
    Accumulating,
    Refluxed,
}




#[derive(Clone, Debug)]
struct CoarseRegister {
    dir: usize,
    side: Side,
    space: IndexSpace,
    coarse: Patch,
    fine: Patch,
}




#[derive(Clone, Debug)]
struct FineRegister {
    dir: usize,
    side: Side,
    space: IndexSpace,
    fine: Patch,
}




/**
 * Coarse registers of the local coarse patches, in layout order.
 */
#[derive(Clone, Debug, Default)]
struct CoarseRegisters(Vec<Vec<CoarseRegister>>);

/**
 * Fine registers of the local fine patches, in layout order.
 */
#[derive(Clone, Debug, Default)]
struct FineRegisters(Vec<Vec<FineRegister>>);




#[derive(Clone, Debug)]
pub struct FluxRegister {
    crse_layout: Layout,
    fine_layout: Layout,
    ratio: Point,
    dx_crse: [f64; DIM],
    num_fields: usize,
    coarse: CoarseRegisters,
    fine: FineRegisters,
    plan: MotionPlan,
    state: RegisterState,
}




fn slot(dir: usize, side: Side) -> usize {
    2 * dir + side.index()
}




// ============================================================================
impl FluxRegister {

    /**
     * Define the registers between a coarse layout and a fine layout nested
     * in it, refined by `ratio`. The coarse grid spacing is used by
     * `reflux` to turn flux differences into cell updates.
     */
    pub fn new(crse_layout: &Layout, fine_layout: &Layout, ratio: Point, dx_crse: [f64; DIM], num_fields: usize) -> Self {
        assert_eq!(
            crse_layout.domain().refine(ratio), fine_layout.domain(),
            "fine domain is not the coarse domain refined by {}",
            ratio);
        assert!(
            fine_layout.patch_size().divisible_by(ratio),
            "fine patch size {} is not divisible by the refinement ratio {}",
            fine_layout.patch_size(),
            ratio);

        let mut register = Self {
            crse_layout: crse_layout.clone(),
            fine_layout: fine_layout.clone(),
            ratio,
            dx_crse,
            num_fields,
            coarse: CoarseRegisters::default(),
            fine: FineRegisters::default(),
            plan: MotionPlan::default(),
            state: RegisterState::Reset,
        };
        let rank = crse_layout.context().rank();
        let mut items = Vec::new();

        for c in crse_layout.iter() {
            let mut registers = Vec::new();

            for item in register.coarse_pieces(c) {
                registers.push(CoarseRegister {
                    dir: item.slot / 2,
                    side: if item.slot % 2 == 0 { Side::Lo } else { Side::Hi },
                    space: item.dst_space,
                    coarse: Patch::zeros(item.dst_space, num_fields),
                    fine: Patch::zeros(item.dst_space, num_fields),
                });
                items.push(item);
            }
            register.coarse.0.push(registers);
        }

        for f in fine_layout.iter() {
            let mut registers = Vec::new();

            for (dir, side, slab) in register.fine_slabs(f) {
                registers.push(FineRegister {
                    dir,
                    side,
                    space: slab,
                    fine: Patch::zeros(slab, num_fields),
                });
            }
            items.extend(register.fine_pieces(f).into_iter().filter(|item| item.dst_rank != rank));
            register.fine.0.push(registers);
        }

        register.plan = MotionPlan::from_items(rank, items);

        debug!(
            "flux register: {} coarse and {} fine registers; {}",
            register.coarse.0.iter().map(Vec::len).sum::<usize>(),
            register.fine.0.iter().map(Vec::len).sum::<usize>(),
            register.plan.summary());

        register
    }


    /**
     * The coarse slabs bordering fine patch `f`, one per face of `f` with no
     * fine neighbor and inside the domain, in unshifted coordinates.
     */
    fn fine_slabs(&self, f: PatchIndex) -> Vec<(usize, Side, IndexSpace)> {
        let point = self.fine_layout.point(f);
        let coarsened = self.fine_layout.patch_space(f).coarsen(self.ratio);
        let domain = self.crse_layout.domain();
        let mut slabs = Vec::new();

        for dir in 0..DIM {
            for side in Side::BOTH {
                let neighbor = point + Point::basis(dir) * side.sign();
                let slab = coarsened.adjacent(dir, side, 1);

                if self.fine_layout.find(neighbor).is_none() && domain.image_space(&slab).is_some() {
                    slabs.push((dir, side, slab))
                }
            }
        }
        slabs
    }


    /**
     * The transfers from the fine register of `f` to the coarse registers
     * of the coarse patches its slabs overlap.
     */
    fn fine_pieces(&self, f: PatchIndex) -> Vec<MotionItem> {
        let domain = self.crse_layout.domain();
        let size = self.crse_layout.patch_size();
        let mut items = Vec::new();

        for (dir, side, slab) in self.fine_slabs(f) {
            let image = match domain.image_space(&slab) {
                Some(image) => image,
                None => continue,
            };
            let shift = slab.lo() - image.lo();

            for p in image.coarsen(size) {
                if let Some(c) = self.crse_layout.find(p) {
                    let dst_space = IndexSpace::patch(p, size).intersect(&image);

                    items.push(MotionItem {
                        src: f,
                        dst: c,
                        src_space: dst_space.shift(shift),
                        dst_space,
                        slot: slot(dir, side),
                        src_rank: self.fine_layout.rank_of(f),
                        dst_rank: self.crse_layout.rank_of(c),
                    })
                }
            }
        }
        items
    }


    /**
     * The transfers into the coarse registers of coarse patch `c`, from every
     * fine patch bordering it.
     */
    fn coarse_pieces(&self, c: PatchIndex) -> Vec<MotionItem> {
        let candidates: BTreeSet<_> = self
            .crse_layout
            .patch_space(c)
            .extend_all(1)
            .refine(self.ratio)
            .coarsen(self.fine_layout.patch_size())
            .iter()
            .filter_map(|q| self.fine_layout.find(q))
            .collect();

        candidates
            .into_iter()
            .flat_map(|f| self.fine_pieces(f))
            .filter(|item| item.dst == c)
            .collect()
    }


    pub fn state(&self) -> RegisterState {
        self.state
    }

    pub fn ratio(&self) -> Point {
        self.ratio
    }

    pub fn crse_layout(&self) -> &Layout {
        &self.crse_layout
    }

    pub fn fine_layout(&self) -> &Layout {
        &self.fine_layout
    }


    /**
     * Zero every accumulator.
     */
    pub fn reset(&mut self) {
        for register in self.coarse.0.iter_mut().flatten() {
            register.coarse.fill(0.0);
            register.fine.fill(0.0);
        }
        for register in self.fine.0.iter_mut().flatten() {
            register.fine.fill(0.0);
        }
        self.state = RegisterState::Reset;
    }


    fn begin_increment(&mut self, weight: f64) {
        assert!(weight.is_finite(), "flux register weight {} is not finite", weight);

        if self.state == RegisterState::Refluxed {
            warn!("flux register incremented after reflux without a reset");
        }
        self.state = RegisterState::Accumulating;
    }


    /**
     * Add `weight` times the coarse fluxes in direction `dir`, given on the
     * faces of coarse patch `index`, to that patch's registers.
     */
    pub fn increment_coarse(&mut self, flux: &Patch, index: PatchIndex, weight: f64, dir: usize) {
        assert!(self.crse_layout.is_local(index), "{} is not a local coarse patch", index);
        self.begin_increment(weight);

        let e = Point::basis(dir);

        for register in self.coarse.0[index.local()].iter_mut().filter(|r| r.dir == dir) {
            for cell in register.space {
                let face = match register.side {
                    Side::Lo => cell + e,
                    Side::Hi => cell,
                };
                for q in 0..flux.num_fields() {
                    *register.coarse.get_mut(cell, q) += weight * flux.get(face, q);
                }
            }
        }
    }


    /**
     * Add `weight` times the fine fluxes in direction `dir`, given on the
     * faces of fine patch `index`, to that patch's registers. Fine faces
     * are averaged onto the coarse face they make up.
     */
    pub fn increment_fine(&mut self, flux: &Patch, index: PatchIndex, weight: f64, dir: usize) {
        assert!(self.fine_layout.is_local(index), "{} is not a local fine patch", index);
        self.begin_increment(weight);

        let interior = self.fine_layout.patch_space(index);
        let ratio = self.ratio;
        let norm = weight * ratio[dir] as f64 / ratio.product() as f64;

        for register in self.fine.0[index.local()].iter_mut().filter(|r| r.dir == dir) {
            let plane = match register.side {
                Side::Lo => interior.lo()[dir],
                Side::Hi => interior.hi()[dir] + 1,
            };
            for cell in register.space {
                let children = IndexSpace::new(cell, cell).refine(ratio);
                let (mut lo, mut hi) = (children.lo(), children.hi());
                lo[dir] = plane;
                hi[dir] = plane;
                let faces = IndexSpace::new(lo, hi);

                for q in 0..flux.num_fields() {
                    let total: f64 = faces.iter().map(|face| flux.get(face, q)).sum();
                    *register.fine.get_mut(cell, q) += norm * total;
                }
            }
        }
    }


    /**
     * Collect the fine registers on the coarse ranks, and add
     * `(coarse - fine) * scale / dx` to each coarse cell of each interface,
     * with the sign that replaces the coarse flux through the interface by
     * the fine one. This is a collective operation.
     */
    pub fn reflux(&mut self, crse: &mut LevelData, scale: f64) {
        assert!(
            crse.layout().compatible(&self.crse_layout),
            "reflux target is not defined on the register's coarse layout");

        let context = self.crse_layout.context().clone();
        self.plan.execute(&context, &self.fine, &mut self.coarse);

        for (index, registers) in self.crse_layout.iter().zip(&self.coarse.0) {
            let patch = &mut crse[index];

            for register in registers {
                let sign = match register.side {
                    Side::Lo => -1.0,
                    Side::Hi => 1.0,
                };
                let coef = sign * scale / self.dx_crse[register.dir];

                for cell in register.space {
                    for q in 0..self.num_fields {
                        *patch.get_mut(cell, q) += coef * (register.coarse.get(cell, q) - register.fine.get(cell, q));
                    }
                }
            }
        }
        self.state = RegisterState::Refluxed;
    }
}




// ============================================================================
impl Pack for FineRegisters {
    fn pack(&self, item: &MotionItem, buffer: &mut Vec<f64>) {
        let register = self.0[item.src.local()]
            .iter()
            .find(|r| slot(r.dir, r.side) == item.slot)
            .unwrap_or_else(|| panic!("no fine register in slot {} of {}", item.slot, item.src));
        register.fine.pack(&item.src_space, buffer)
    }
}

impl Unpack for CoarseRegisters {
    fn linear_size(&self, item: &MotionItem) -> usize {
        let n = self.position(item);
        item.dst_space.len() * self.0[item.dst.local()][n].fine.num_fields()
    }

    fn unpack(&mut self, item: &MotionItem, values: &[f64]) {
        let n = self.position(item);
        self.0[item.dst.local()][n].fine.unpack(&item.dst_space, values);
    }
}

impl CoarseRegisters {
    fn position(&self, item: &MotionItem) -> usize {
        self.0[item.dst.local()]
            .iter()
            .position(|r| slot(r.dir, r.side) == item.slot && r.space.contains_space(&item.dst_space))
            .unwrap_or_else(|| panic!("no coarse register in slot {} of {}", item.slot, item.dst))
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{FluxRegister, RegisterState};
    use crate::context::Context;
    use crate::data::LevelData;
    use crate::domain::ProblemDomain;
    use crate::index_space::{range2d, IndexSpace};
    use crate::layout::Layout;
    use crate::message::local::run_ranks;
    use crate::operator::face_patches;
    use crate::point::Point;
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::Mutex;

    struct Warnings(Mutex<Vec<String>>);

    impl Log for Warnings {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Warn
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                self.0.lock().unwrap().push(record.args().to_string())
            }
        }

        fn flush(&self) {}
    }

    static WARNINGS: Warnings = Warnings(Mutex::new(Vec::new()));

    struct Setup {
        crse: Layout,
        fine: Layout,
        register: FluxRegister,
    }

    fn setup(context: &Context) -> Setup {
        let domain = ProblemDomain::periodic(IndexSpace::cube(16));
        let crse = Layout::new(context, domain, Point::ones(4));
        let fine = Layout::from_region(context, domain.refine(Point::ones(2)), range2d(8..24, 8..16), Point::ones(8));
        let register = FluxRegister::new(&crse, &fine, Point::ones(2), [0.5, 0.5], 1);
        Setup { crse, fine, register }
    }

    /**
     * Feed the register fluxes taken from functions of the face position
     * (in coarse units, faces at integer coordinates on their axis), then
     * reflux into a zeroed coarse container.
     */
    fn run<F, G>(context: &Context, coarse_flux: F, fine_flux: G) -> (LevelData, Setup)
    where
        F: Fn(usize, [f64; 2]) -> f64,
        G: Fn(usize, [f64; 2]) -> f64,
    {
        let mut s = setup(context);
        let position = |p: Point, dir: usize, h: f64| {
            let mut x = [(p[0] as f64 + 0.5) * h, (p[1] as f64 + 0.5) * h];
            x[dir] = p[dir] as f64 * h;
            x
        };

        s.register.reset();
        for c in s.crse.iter() {
            let mut fluxes = face_patches(&s.crse.patch_space(c), 1);
            for (dir, flux) in fluxes.iter_mut().enumerate() {
                for p in flux.space() {
                    *flux.get_mut(p, 0) = coarse_flux(dir, position(p, dir, 1.0));
                }
                s.register.increment_coarse(flux, c, 1.0, dir);
            }
        }
        for f in s.fine.iter() {
            let mut fluxes = face_patches(&s.fine.patch_space(f), 1);
            for (dir, flux) in fluxes.iter_mut().enumerate() {
                for p in flux.space() {
                    *flux.get_mut(p, 0) = fine_flux(dir, position(p, dir, 0.5));
                }
                s.register.increment_fine(flux, f, 1.0, dir);
            }
        }
        assert_eq!(s.register.state(), RegisterState::Accumulating);

        let mut crse = LevelData::new(&s.crse, 1, Point::zeros());
        s.register.reflux(&mut crse, 1.0);
        (crse, s)
    }

    #[test]
    fn consistent_fluxes_give_no_correction() {
        let results = run_ranks(3, |context| {
            // the coarse flux is the exact average of a flux linear along each face
            let flux = |dir: usize, x: [f64; 2]| 1.0 + x[0] - 2.0 * x[1] + dir as f64;
            let (crse, s) = run(&context, flux, flux);
            (crse.abs_max(), s.register.state())
        });
        for (correction, state) in results {
            assert!(correction < 1e-12);
            assert_eq!(state, RegisterState::Refluxed);
        }
    }

    #[test]
    fn flux_mismatch_is_added_with_the_interface_orientation() {
        let results = run_ranks(2, |context| {
            // a unit fine flux against zero coarse flux, through x faces only
            let (crse, s) = run(&context, |_, _| 0.0, |dir, _| if dir == 0 { 1.0 } else { 0.0 });
            let mut values = Vec::new();
            for (index, patch) in crse.iter() {
                for p in s.crse.patch_space(index) {
                    if patch.get(p, 0) != 0.0 {
                        values.push((p, patch.get(p, 0)));
                    }
                }
            }
            values
        });
        let mut values: Vec<_> = results.into_iter().flatten().collect();
        values.sort_by_key(|(p, _)| *p);

        // fine region covers coarse cells [4, 12) x [4, 8); the x slabs are
        // the coarse columns 3 and 12 over rows 4..8
        assert_eq!(values.len(), 8);
        for (p, v) in values {
            assert!(p[1] >= 4 && p[1] < 8);
            match p[0] {
                3 => assert_eq!(v, 2.0),
                12 => assert_eq!(v, -2.0),
                _ => panic!("unexpected correction at {}", p),
            }
        }
    }

    #[test]
    fn registers_exist_only_where_no_fine_neighbor() {
        let context = Context::serial();
        let s = setup(&context);
        let pieces: usize = s.register.coarse.0.iter().map(Vec::len).sum();
        let slabs: usize = s.register.fine.0.iter().map(Vec::len).sum();

        // two fine patches side by side: each has three exposed faces, and
        // each face lies against a single coarse patch
        assert_eq!(s.fine.len(), 2);
        assert_eq!(slabs, 6);
        assert_eq!(pieces, 6);
        assert_eq!(s.register.plan.local().len(), 6);
    }

    #[test]
    fn incrementing_after_reflux_warns_and_keeps_accumulating() {
        let _ = log::set_logger(&WARNINGS);
        log::set_max_level(LevelFilter::Warn);

        let context = Context::serial();
        let (first, mut s) = run(&context, |_, _| 0.0, |dir, _| if dir == 0 { 1.0 } else { 0.0 });
        let c = s.crse.iter().next().unwrap();
        let fluxes = face_patches(&s.crse.patch_space(c), 1);

        s.register.increment_coarse(&fluxes[0], c, 1.0, 0);
        assert_eq!(s.register.state(), RegisterState::Accumulating);
        assert!(WARNINGS.0.lock().unwrap().iter().any(|m| m.contains("after reflux without a reset")));

        // the fine side is untouched, so refluxing again repeats the correction
        let mut second = LevelData::new(&s.crse, 1, Point::zeros());
        s.register.reflux(&mut second, 1.0);
        assert_eq!(first.sum_abs(), 16.0);
        assert_eq!(second.sum_abs(), first.sum_abs());
    }
}
