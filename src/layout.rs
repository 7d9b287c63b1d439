use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use log::debug;
use crate::context::Context;
use crate::domain::ProblemDomain;
use crate::index_space::IndexSpace;
use crate::point::Point;
use crate::DIM;




static NEXT_LAYOUT_ID: AtomicU64 = AtomicU64::new(0);




/**
 * An opaque reference to one patch of a layout. It is only meaningful to the
 * layout which issued it, or to layouts sharing the same partition (such as
 * its coarsenings and refinements). The global index is the patch position
 * across all ranks, and the local index is its position within the slice of
 * patches owned by its rank.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PatchIndex {
    layout_id: u64,
    global: usize,
    local: usize,
}




// ============================================================================
impl PatchIndex {

    pub fn global(&self) -> usize {
        self.global
    }

    pub fn local(&self) -> usize {
        self.local
    }

    pub fn layout_id(&self) -> u64 {
        self.layout_id
    }
}

impl fmt::Display for PatchIndex {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "patch {} (local {}) of layout {}", self.global, self.local, self.layout_id)
    }
}




/**
 * The immutable partition shared by a layout and every layout derived from
 * it by coarsening or refinement.
 */
pub(crate) struct Partition {
    id: u64,
    patch_domain: ProblemDomain,
    boxes: Vec<(Point, usize)>,
    start_rank: Vec<usize>,
    lookup: BTreeMap<u64, usize>,
}




/**
 * Everything a communication schedule depends on, about one layout.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayoutKey {
    id: u64,
    domain: ProblemDomain,
    patch_size: Point,
}




/**
 * A distribution of equally sized patches over the ranks of a context. The
 * patches tile some subset of the problem domain; patch `p` covers the cells
 * `[p * patch_size, (p + 1) * patch_size - 1]`. Patches are ordered along a
 * Morton curve and split into contiguous runs, one per rank, whose lengths
 * differ by at most one.
 *
 * Cloning a layout is cheap; the partition is reference counted.
 */
#[derive(Clone)]
pub struct Layout {
    partition: Arc<Partition>,
    domain: ProblemDomain,
    patch_size: Point,
    context: Context,
}




// ============================================================================
impl Layout {

    /**
     * Tile the whole problem domain with patches of the given size.
     */
    pub fn new(context: &Context, domain: ProblemDomain, patch_size: Point) -> Self {
        Self::from_region(context, domain, domain.space(), patch_size)
    }


    /**
     * Tile a sub-region of the problem domain. The region must be inside the
     * domain and be a union of whole patches.
     */
    pub fn from_region(context: &Context, domain: ProblemDomain, region: IndexSpace, patch_size: Point) -> Self {
        assert!(
            domain.space().contains_space(&region),
            "region {} is not inside the problem domain {}",
            region,
            domain.space());
        assert!(
            region.coarsenable(patch_size),
            "region {} cannot be tiled by patches of size {}",
            region,
            patch_size);
        Self::from_points(context, domain, region.coarsen(patch_size).iter().collect(), patch_size)
    }


    /**
     * Create a layout from an explicit list of patch points, given in the
     * coordinates of the domain coarsened by the patch size. Points must be
     * distinct and lie inside the coarsened domain.
     */
    pub fn from_points(context: &Context, domain: ProblemDomain, mut points: Vec<Point>, patch_size: Point) -> Self {
        assert!(
            patch_size.min_component() > 0,
            "patch size {} must be positive",
            patch_size);
        assert!(
            domain.coarsenable(patch_size),
            "problem domain {} cannot be tiled by patches of size {}",
            domain.space(),
            patch_size);

        let patch_domain = domain.coarsen(patch_size);

        for p in &points {
            assert!(
                patch_domain.space().contains(*p),
                "patch point {} is outside the patch domain {}",
                p,
                patch_domain.space());
        }
        points.sort_by_key(|p| morton_key(&patch_domain, *p));

        let num_ranks = context.size();
        let length = points.len() / num_ranks;
        let remainder = points.len() % num_ranks;
        let mut boxes = Vec::with_capacity(points.len());
        let mut start_rank = Vec::with_capacity(num_ranks + 1);
        let mut lookup = BTreeMap::new();

        for rank in 0..num_ranks {
            start_rank.push(boxes.len());
            let segment = if rank < remainder { length + 1 } else { length };

            for _ in 0..segment {
                let p = points[boxes.len()];
                if lookup.insert(morton_key(&patch_domain, p), boxes.len()).is_some() {
                    panic!("patch point {} appears more than once", p)
                }
                boxes.push((p, rank));
            }
        }
        start_rank.push(boxes.len());

        let partition = Partition {
            id: NEXT_LAYOUT_ID.fetch_add(1, Ordering::Relaxed),
            patch_domain,
            boxes,
            start_rank,
            lookup,
        };

        debug!(
            "layout {}: {} patches of size {} over {} ranks ({} local)",
            partition.id,
            partition.boxes.len(),
            patch_size,
            num_ranks,
            partition.start_rank[context.rank() + 1] - partition.start_rank[context.rank()]);

        Self {
            partition: Arc::new(partition),
            domain,
            patch_size,
            context: context.clone(),
        }
    }


    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn domain(&self) -> ProblemDomain {
        self.domain
    }

    pub fn patch_size(&self) -> Point {
        self.patch_size
    }

    /**
     * The problem domain coarsened by the patch size; its cells are patches.
     */
    pub fn patch_domain(&self) -> ProblemDomain {
        self.partition.patch_domain
    }

    /**
     * A stable identifier of the partition. Layouts obtained from one another
     * by coarsening or refinement share it.
     */
    pub fn identity(&self) -> u64 {
        self.partition.id
    }

    /**
     * A reference to the partition which does not keep it alive.
     */
    pub(crate) fn downgrade(&self) -> Weak<Partition> {
        Arc::downgrade(&self.partition)
    }

    pub fn key(&self) -> LayoutKey {
        LayoutKey {
            id: self.partition.id,
            domain: self.domain,
            patch_size: self.patch_size,
        }
    }


    /**
     * The number of patches across all ranks.
     */
    pub fn len(&self) -> usize {
        self.partition.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partition.boxes.is_empty()
    }

    /**
     * The number of patches owned by this rank.
     */
    pub fn local_len(&self) -> usize {
        self.rank_len(self.context.rank())
    }

    /**
     * The global index of the first patch owned by the given rank.
     */
    pub fn offset(&self, rank: usize) -> usize {
        self.partition.start_rank[rank]
    }

    pub fn max_local_len(&self) -> usize {
        (0..self.context.size()).map(|r| self.rank_len(r)).max().unwrap_or(0)
    }

    pub fn min_local_len(&self) -> usize {
        (0..self.context.size()).map(|r| self.rank_len(r)).min().unwrap_or(0)
    }

    fn rank_len(&self, rank: usize) -> usize {
        self.partition.start_rank[rank + 1] - self.partition.start_rank[rank]
    }


    /**
     * Panics unless the handle was issued by a layout sharing this one's
     * partition.
     */
    pub fn validate(&self, index: PatchIndex) {
        assert!(
            self.compatible_index(index),
            "{} does not belong to layout {}",
            index,
            self.partition.id);
    }

    pub fn compatible_index(&self, index: PatchIndex) -> bool {
        index.layout_id == self.partition.id && index.global < self.len()
    }

    pub fn point(&self, index: PatchIndex) -> Point {
        self.validate(index);
        self.partition.boxes[index.global].0
    }

    pub fn rank_of(&self, index: PatchIndex) -> usize {
        self.validate(index);
        self.partition.boxes[index.global].1
    }

    pub fn is_local(&self, index: PatchIndex) -> bool {
        self.rank_of(index) == self.context.rank()
    }

    /**
     * The cells covered by a patch, not including ghost zones.
     */
    pub fn patch_space(&self, index: PatchIndex) -> IndexSpace {
        IndexSpace::patch(self.point(index), self.patch_size)
    }


    /**
     * Return the handle of the patch at the given global position.
     */
    pub fn index(&self, global: usize) -> PatchIndex {
        assert!(global < self.len(), "global index {} out of bounds for {} patches", global, self.len());
        let rank = self.partition.boxes[global].1;
        PatchIndex {
            layout_id: self.partition.id,
            global,
            local: global - self.partition.start_rank[rank],
        }
    }

    /**
     * Return the handle of the `local`-th patch owned by this rank.
     */
    pub fn local_index(&self, local: usize) -> PatchIndex {
        assert!(
            local < self.local_len(),
            "local index {} out of bounds for {} local patches",
            local,
            self.local_len());
        self.index(self.offset(self.context.rank()) + local)
    }


    /**
     * Find the patch at the given patch point, or one of its periodic images.
     * Returns `None` if there is no such patch, including when the point is
     * outside a non-periodic edge of the domain.
     */
    pub fn find(&self, point: Point) -> Option<PatchIndex> {
        let patch_domain = &self.partition.patch_domain;

        if !patch_domain.contains(point) {
            return None;
        }
        self.partition
            .lookup
            .get(&morton_key(patch_domain, patch_domain.image(point)))
            .map(|&global| self.index(global))
    }


    /**
     * Iterate over the handles of the patches owned by this rank, in order.
     */
    pub fn iter(&self) -> impl Iterator<Item = PatchIndex> + '_ {
        let start = self.offset(self.context.rank());
        (start..start + self.local_len()).map(move |g| self.index(g))
    }

    /**
     * Iterate over the handles of all patches, on every rank.
     */
    pub fn iter_all(&self) -> impl Iterator<Item = PatchIndex> + '_ {
        (0..self.len()).map(move |g| self.index(g))
    }


    /**
     * Whether the patches are symmetric under inversion through `origin`, a
     * corner in patch coordinates: the patch at `origin + s` must have a
     * partner at `origin - s - 1`.
     */
    pub fn radial_symmetry(&self, origin: Point) -> bool {
        self.partition.boxes.iter().all(|(p, _)| {
            let shifted = *p - origin;
            self.find(origin - shifted - Point::ones(1)).is_some()
        })
    }

    /**
     * Whether the patches are symmetric under reflection along `axis`
     * through the patch-coordinate plane `origin[axis]`.
     */
    pub fn mirror_symmetry(&self, origin: Point, axis: usize) -> bool {
        assert!(axis < DIM, "axis {} is out of range", axis);

        self.partition.boxes.iter().all(|(p, _)| {
            let mut image = *p;
            image[axis] = 2 * origin[axis] - p[axis] - 1;
            self.find(image).is_some()
        })
    }


    /**
     * Whether any neighbor of the patch at this point, including diagonal
     * neighbors, lies outside the (non-periodic) domain.
     */
    pub fn on_domain_boundary(&self, point: Point) -> bool {
        assert!(self.find(point).is_some(), "no patch at {}", point);
        IndexSpace::new(point, point)
            .extend_all(1)
            .iter()
            .filter(|q| *q != point)
            .any(|q| !self.partition.patch_domain.contains(q))
    }

    /**
     * Whether any neighbor of the patch at this point, including diagonal
     * neighbors, is not in this layout.
     */
    pub fn on_level_boundary(&self, point: Point) -> bool {
        assert!(self.find(point).is_some(), "no patch at {}", point);
        IndexSpace::new(point, point)
            .extend_all(1)
            .iter()
            .filter(|q| *q != point)
            .any(|q| self.find(q).is_none())
    }


    /**
     * The smallest index space containing the cells of every patch.
     */
    pub fn bounding_box(&self) -> IndexSpace {
        let mut points = self.partition.boxes.iter().map(|(p, _)| *p);

        match points.next() {
            None => IndexSpace::empty(),
            Some(first) => {
                let (lo, hi) = points.fold((first, first), |(lo, hi), p| {
                    (lo.zip_map(p, i64::min), hi.zip_map(p, i64::max))
                });
                IndexSpace::new(lo, hi).refine(self.patch_size)
            }
        }
    }


    /**
     * Whether both the domain and the patch size are divisible by the ratio.
     */
    pub fn coarsenable(&self, ratio: Point) -> bool {
        self.domain.coarsenable(ratio) && self.patch_size.divisible_by(ratio)
    }


    /**
     * Return the layout with the same partition, whose cells are coarser by
     * the given ratio. Panics unless `coarsenable(ratio)`.
     */
    pub fn coarsen(&self, ratio: Point) -> Self {
        assert!(
            self.coarsenable(ratio),
            "layout with domain {} and patch size {} cannot be coarsened by {}",
            self.domain.space(),
            self.patch_size,
            ratio);
        Self {
            partition: self.partition.clone(),
            domain: self.domain.coarsen(ratio),
            patch_size: self.patch_size.zip_map(ratio, |a, b| a / b),
            context: self.context.clone(),
        }
    }

    /**
     * Return the layout with the same partition, whose cells are finer by the
     * given ratio.
     */
    pub fn refine(&self, ratio: Point) -> Self {
        Self {
            partition: self.partition.clone(),
            domain: self.domain.refine(ratio),
            patch_size: self.patch_size.refine(ratio),
            context: self.context.clone(),
        }
    }


    /**
     * Whether two layouts share a partition, so that a handle issued by one
     * refers to the corresponding patch of the other.
     */
    pub fn compatible(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.partition, &other.partition)
    }
}




// ============================================================================
impl PartialEq for Layout {
    fn eq(&self, other: &Self) -> bool {
        self.compatible(other) && self.domain == other.domain && self.patch_size == other.patch_size
    }
}

impl Eq for Layout {}

impl fmt::Debug for Layout {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "Layout(id {}, {} patches of size {}, domain {})",
            self.partition.id,
            self.len(),
            self.patch_size,
            self.domain.space())
    }
}




/**
 * Interleave the bits of a point's offset from the patch domain's lower
 * corner, first axis most significant.
 */
fn morton_key(patch_domain: &ProblemDomain, point: Point) -> u64 {
    let bits = 64 / DIM;
    let offset = point - patch_domain.space().lo();
    let mut key = 0u64;

    for b in (0..bits).rev() {
        for a in 0..DIM {
            key = (key << 1) | ((offset[a] as u64 >> b) & 1);
        }
    }
    key
}
