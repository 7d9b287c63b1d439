//! A geometric multigrid solver for `L(phi) = rhs` on a single level.

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use crate::data::LevelData;
use crate::interp::InterpStencil;
use crate::layout::Layout;
use crate::operator::PatchOp;
use crate::point::Point;
use crate::DIM;




/**
 * Parameters of the V-cycle.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultigridConfig {
    /// Relaxation sweeps on the way down.
    pub pre_relax: usize,

    /// Relaxation sweeps on the way up.
    pub post_relax: usize,

    /// Relaxation sweeps standing in for a direct solve on the coarsest level.
    pub bottom_relax: usize,

    /// The weight of the Jacobi update.
    pub relax_weight: f64,

    /// The largest domain which is gathered into a single patch.
    pub max_patch_size: i64,

    /// Partitioned levels are coarsened while patches stay this wide.
    pub min_patch: i64,

    /// No level is coarser than this many cells per axis.
    pub min_domain: i64,
}

impl Default for MultigridConfig {
    fn default() -> Self {
        Self {
            pre_relax: 2 * DIM,
            post_relax: 2 * DIM,
            bottom_relax: 10,
            relax_weight: (2 * DIM) as f64 / (2 * DIM + 1) as f64,
            max_patch_size: 64,
            min_patch: 4,
            min_domain: 2,
        }
    }
}




#[derive(Clone, Debug)]
struct Level<OP> {
    op: OP,
    lambda: f64,
    residual: LevelData,
}




/**
 * The correction and right-hand side of a coarse level, and the image of
 * the coarse correction on the parent's coarsened layout.
 */
#[derive(Clone, Debug)]
struct Scratch {
    phi: LevelData,
    rhs: LevelData,
    prolong: LevelData,
}




/**
 * A V-cycle solver over a hierarchy of successively coarsened layouts. The
 * finest level is the layout the solver is built on; coarse levels reuse its
 * partition while patches are wide enough, then gather into one patch.
 */
#[derive(Clone, Debug)]
pub struct Multigrid<OP> {
    config: MultigridConfig,
    levels: Vec<Level<OP>>,
    scratch: Vec<Scratch>,
    stencil: InterpStencil,
}




// ============================================================================
impl<OP: PatchOp> Multigrid<OP> {

    pub fn new(layout: &Layout, dx: [f64; DIM], config: MultigridConfig) -> Self {
        let layouts = Self::hierarchy(layout, &config);
        let ghost = Point::ones(OP::GHOST);
        let two = Point::ones(2);

        let levels = layouts
            .iter()
            .enumerate()
            .map(|(k, layout)| {
                let h = dx.map(|h| h * (1 << k) as f64);
                let op = OP::new(h);
                Level {
                    lambda: 2.0 * config.relax_weight / op.spectral_radius(),
                    op,
                    residual: LevelData::new(layout, OP::NUM_STATE, Point::zeros()),
                }
            })
            .collect();

        let scratch = layouts
            .windows(2)
            .map(|pair| Scratch {
                phi: LevelData::new(&pair[1], OP::NUM_STATE, ghost),
                rhs: LevelData::new(&pair[1], OP::NUM_STATE, Point::zeros()),
                prolong: LevelData::new(&pair[0].coarsen(two), OP::NUM_STATE, Point::ones(1)),
            })
            .collect();

        debug!(
            "multigrid with {} levels: {:?}",
            layouts.len(),
            layouts.iter().map(|l| (l.domain().size(), l.len())).collect::<Vec<_>>());

        Self {
            config,
            levels,
            scratch,
            stencil: InterpStencil::linear(two),
        }
    }


    fn hierarchy(layout: &Layout, config: &MultigridConfig) -> Vec<Layout> {
        let two = Point::ones(2);
        let mut layouts = vec![layout.clone()];

        loop {
            let current = &layouts[layouts.len() - 1];
            let domain = current.domain();

            if !current.coarsenable(two) || domain.size().min_component() / 2 < config.min_domain {
                break;
            }
            let next = if current.len() == 1 || current.patch_size().min_component() >= 2 * config.min_patch {
                current.coarsen(two)
            } else if domain.size().max_component() / 2 <= config.max_patch_size {
                let coarse = domain.coarsen(two);
                Layout::new(current.context(), coarse, coarse.size())
            } else {
                warn!(
                    "multigrid stops at domain {}: patches of {} are too small to coarsen and the domain too large to gather",
                    domain.size(),
                    current.patch_size());
                break;
            };
            layouts.push(next);
        }
        layouts
    }


    pub fn config(&self) -> &MultigridConfig {
        &self.config
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn layout(&self, level: usize) -> &Layout {
        self.levels[level].residual.layout()
    }

    pub fn op(&self, level: usize) -> &OP {
        &self.levels[level].op
    }


    /**
     * Perform exactly `num_cycles` V-cycles, and return the residual max-norm
     * before the first cycle and after each one.
     */
    pub fn solve(&mut self, phi: &mut LevelData, rhs: &LevelData, num_cycles: usize) -> Vec<f64> {
        let mut history = vec![self.resnorm(phi, rhs)];
        info!("multigrid initial residual {:.6e}", history[0]);

        for cycle in 0..num_cycles {
            self.vcycle(phi, rhs);
            let norm = self.resnorm(phi, rhs);
            info!("multigrid cycle {}: residual {:.6e}", cycle + 1, norm);
            history.push(norm);
        }
        history
    }


    /**
     * Perform one V-cycle on the finest level.
     */
    pub fn vcycle(&mut self, phi: &mut LevelData, rhs: &LevelData) {
        self.check(phi, rhs);
        vcycle(&self.config, &self.stencil, &mut self.levels, &mut self.scratch, phi, rhs)
    }


    /**
     * The max-norm of the residual on the finest level. This is a collective
     * operation.
     */
    pub fn resnorm(&mut self, phi: &mut LevelData, rhs: &LevelData) -> f64 {
        self.check(phi, rhs);
        let level = &mut self.levels[0];
        residual(level, phi, rhs);
        level.residual.abs_max()
    }


    /**
     * Perform `count` relaxation sweeps on the finest level.
     */
    pub fn relax(&mut self, phi: &mut LevelData, rhs: &LevelData, count: usize) {
        self.check(phi, rhs);
        point_relax(&mut self.levels[0], phi, rhs, count)
    }


    fn check(&self, phi: &LevelData, rhs: &LevelData) {
        let layout = self.layout(0);
        assert!(
            phi.layout().compatible(layout) && rhs.layout().compatible(layout),
            "solution and right-hand side must be defined on the solver's layout");
        assert_eq!(phi.num_fields(), OP::NUM_STATE, "solution has the wrong number of fields");
        assert_eq!(rhs.num_fields(), OP::NUM_STATE, "right-hand side has the wrong number of fields");
        assert!(
            phi.ghost().min_component() >= OP::GHOST,
            "solution ghost depth {} is less than the required {}",
            phi.ghost(),
            OP::GHOST);
    }
}




fn vcycle<OP: PatchOp>(
    config: &MultigridConfig,
    stencil: &InterpStencil,
    levels: &mut [Level<OP>],
    scratch: &mut [Scratch],
    phi: &mut LevelData,
    rhs: &LevelData,
) {
    let (level, coarser) = match levels.split_first_mut() {
        Some(split) => split,
        None => return,
    };
    let (coarse, rest) = match scratch.split_first_mut() {
        Some(split) => split,
        None => {
            point_relax(level, phi, rhs, config.bottom_relax);
            return;
        }
    };

    point_relax(level, phi, rhs, config.pre_relax);
    coarse_residual(level, phi, rhs, &mut coarse.rhs);
    coarse.phi.set_to_zero();
    vcycle(config, stencil, coarser, rest, &mut coarse.phi, &coarse.rhs);
    fine_interp(stencil, &coarse.phi, &mut coarse.prolong, phi);
    point_relax(level, phi, rhs, config.post_relax);
}




/**
 * Weighted Jacobi: `phi += lambda * (L(phi) - rhs)`, with the neighbor values
 * of each sweep taken from the previous one.
 */
fn point_relax<OP: PatchOp>(level: &mut Level<OP>, phi: &mut LevelData, rhs: &LevelData, count: usize) {
    let layout = phi.layout().clone();
    let op = &level.op;
    let lambda = level.lambda;

    for _ in 0..count {
        phi.exchange();
        phi.patches_mut()
            .par_iter_mut()
            .zip(rhs.patches().par_iter())
            .zip(level.residual.patches_mut().par_iter_mut())
            .enumerate()
            .for_each(|(n, ((phi, rhs), lphi))| {
                let interior = layout.patch_space(layout.local_index(n));
                op.apply(lphi, phi, None, &interior, 1.0);

                for p in &interior {
                    for q in 0..OP::NUM_STATE {
                        *phi.get_mut(p, q) += lambda * (lphi.get(p, q) - rhs.get(p, q));
                    }
                }
            });
    }
}




/**
 * Write `rhs - L(phi)` into the level's residual.
 */
fn residual<OP: PatchOp>(level: &mut Level<OP>, phi: &mut LevelData, rhs: &LevelData) {
    let layout = phi.layout().clone();
    let op = &level.op;

    phi.exchange();
    level
        .residual
        .patches_mut()
        .par_iter_mut()
        .zip(phi.patches().par_iter())
        .zip(rhs.patches().par_iter())
        .enumerate()
        .for_each(|(n, ((res, phi), rhs))| {
            let interior = layout.patch_space(layout.local_index(n));
            op.apply(res, phi, None, &interior, -1.0);
            res.axpy(1.0, rhs);
        });
}




/**
 * Restrict the residual of a level onto the right-hand side of the next
 * coarser one.
 */
fn coarse_residual<OP: PatchOp>(level: &mut Level<OP>, phi: &mut LevelData, rhs: &LevelData, coarse_rhs: &mut LevelData) {
    residual(level, phi, rhs);
    level.residual.coarsen_to(coarse_rhs, Point::ones(2));
}




/**
 * Add the interpolated coarse correction to the fine solution. The
 * correction is first copied onto the fine layout's coarsening, with one
 * ghost cell for the stencil.
 */
fn fine_interp(stencil: &InterpStencil, correction: &LevelData, prolong: &mut LevelData, phi: &mut LevelData) {
    let layout = phi.layout().clone();
    let crse_domain = prolong.layout().domain();
    let ratio = stencil.ratio();

    correction.copy_to(prolong);

    phi.patches_mut()
        .par_iter_mut()
        .zip(prolong.patches().par_iter())
        .enumerate()
        .for_each(|(n, (fine, coarse))| {
            for p in &layout.patch_space(layout.local_index(n)) {
                let parent = p.coarsen(ratio);
                let in_reach = stencil
                    .weights(p.offset_within(ratio))
                    .iter()
                    .all(|(k, _)| crse_domain.contains(parent + *k));

                for q in 0..fine.num_fields() {
                    *fine.get_mut(p, q) += if in_reach {
                        stencil.apply(coarse, p, q)
                    } else {
                        coarse.get(parent, q)
                    };
                }
            }
        });
}
