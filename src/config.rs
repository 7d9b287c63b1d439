use serde::{Deserialize, Serialize};
use crate::amr::AmrGrid;
use crate::context::Context;
use crate::domain::ProblemDomain;
use crate::error::Error;
use crate::index_space::IndexSpace;
use crate::layout::Layout;
use crate::point::Point;
use crate::DIM;




/**
 * How the patches of a refined level are placed.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LevelSpec {
    /// Tile a region, given in the index space of the level itself.
    Tile { region: IndexSpace },

    /// Place patches at explicit points of the level's domain coarsened by
    /// the patch size.
    Patches { points: Vec<Point> },
}




/**
 * A description of a refinement hierarchy, from which the layouts are
 * built. The base level always tiles the whole domain, and every level uses
 * the same patch size.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub domain_size: Point,
    pub periodic: [bool; DIM],
    pub patch_size: Point,
    pub dx: [f64; DIM],
    pub ratios: Vec<Point>,
    pub levels: Vec<LevelSpec>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            domain_size: Point::ones(64),
            periodic: [true; DIM],
            patch_size: Point::ones(16),
            dx: [1.0 / 64.0; DIM],
            ratios: Vec::new(),
            levels: Vec::new(),
        }
    }
}




// ============================================================================
impl GridConfig {

    pub fn base_domain(&self) -> ProblemDomain {
        ProblemDomain::new(IndexSpace::new(Point::zeros(), self.domain_size - Point::ones(1)), self.periodic)
    }


    /**
     * Validate the configuration and build the layouts of every level. This
     * must be called by every rank of the context with the same
     * configuration.
     */
    pub fn build(&self, context: &Context) -> Result<AmrGrid, Error> {
        if self.patch_size.min_component() < 1 || self.domain_size.min_component() < 1 {
            return Err(Error::InvalidPatchSize(self.patch_size));
        }
        if self.ratios.len() != self.levels.len() {
            return Err(Error::LevelCountMismatch { ratios: self.ratios.len(), levels: self.levels.len() });
        }

        let mut domain = self.base_domain();

        if !domain.coarsenable(self.patch_size) {
            return Err(Error::NotCoarsenable(domain.space(), self.patch_size));
        }
        let mut layouts = vec![Layout::new(context, domain, self.patch_size)];

        for (n, (ratio, spec)) in self.ratios.iter().zip(&self.levels).enumerate() {
            if ratio.min_component() < 1 {
                return Err(Error::NotCoarsenable(domain.space(), *ratio));
            }
            domain = domain.refine(*ratio);

            let patch_domain = domain.coarsen(self.patch_size);
            let points = match spec {
                LevelSpec::Tile { region } => {
                    if !domain.space().contains_space(region) {
                        return Err(Error::RegionOutsideDomain(*region, domain.space()));
                    }
                    if !region.coarsenable(self.patch_size) {
                        return Err(Error::NotCoarsenable(*region, self.patch_size));
                    }
                    region.coarsen(self.patch_size).iter().collect::<Vec<_>>()
                }
                LevelSpec::Patches { points } => {
                    let mut sorted = points.clone();
                    sorted.sort();
                    sorted.dedup();

                    if let Some(p) = points.iter().find(|p| !patch_domain.space().contains(**p)) {
                        return Err(Error::RegionOutsideDomain(IndexSpace::new(*p, *p), patch_domain.space()));
                    }
                    if sorted.len() != points.len() {
                        return Err(Error::DuplicatePatch(n + 1));
                    }
                    sorted
                }
            };
            if points.is_empty() {
                return Err(Error::EmptyLevel(n + 1));
            }
            layouts.push(Layout::from_points(context, domain, points, self.patch_size));
        }
        AmrGrid::new(layouts, self.ratios.clone())
    }
}
