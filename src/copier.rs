//! Communication schedules ("motion plans") and their execution.
//!
//! A plan is the list of block transfers needed to move data from the
//! patches of one layout to the patches of another, split three ways from
//! the point of view of the executing rank: transfers between two local
//! patches, transfers out of a local patch to a remote one, and transfers
//! into a local patch from a remote one. Plans depend only on the layouts
//! and ghost depth they were built from, so they are cached on the context.

use std::collections::BTreeSet;
use log::{debug, trace};
use crate::context::Context;
use crate::index_space::IndexSpace;
use crate::layout::{Layout, LayoutKey, PatchIndex};
use crate::message::{self, comm::TAG_MOTION};
use crate::point::Point;




/**
 * One block transfer: the values of `src` over `src_space` land in `dst` over
 * `dst_space`. The two spaces have the same shape; they differ by a periodic
 * shift, if at all. The slot distinguishes transfers of unrelated quantities
 * between the same pair of patches (such as flux register faces).
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotionItem {
    pub src: PatchIndex,
    pub dst: PatchIndex,
    pub src_space: IndexSpace,
    pub dst_space: IndexSpace,
    pub slot: usize,
    pub src_rank: usize,
    pub dst_rank: usize,
}




// ============================================================================
impl MotionItem {

    /**
     * Both ends of a transfer order their items by this key, so packed
     * messages are unpacked in the order they were packed.
     */
    fn order_key(&self) -> (usize, usize, usize, usize, Point, usize) {
        (
            self.src_rank,
            self.dst_rank,
            self.dst.global(),
            self.slot,
            self.dst_space.lo(),
            self.src.global(),
        )
    }
}




/**
 * Identifies a cacheable plan by everything it depends on.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlanKey {
    Exchange(LayoutKey, Point),
    Copy(LayoutKey, LayoutKey, Point),
}




/**
 * A source of values for a motion plan.
 */
pub trait Pack {
    /**
     * Append the values of the item's source region to the buffer.
     */
    fn pack(&self, item: &MotionItem, buffer: &mut Vec<f64>);
}




/**
 * A destination of values for a motion plan.
 */
pub trait Unpack {
    /**
     * The number of values the item's destination region takes.
     */
    fn linear_size(&self, item: &MotionItem) -> usize;

    /**
     * Write the leading `linear_size(item)` values into the item's
     * destination region.
     */
    fn unpack(&mut self, item: &MotionItem, values: &[f64]);
}




/**
 * A communication schedule, as seen by one rank.
 */
#[derive(Clone, Debug, Default)]
pub struct MotionPlan {
    local: Vec<MotionItem>,
    outbound: Vec<MotionItem>,
    inbound: Vec<MotionItem>,
}




// ============================================================================
impl MotionPlan {

    /**
     * Classify transfer items relative to the given rank, and put each class
     * in canonical order. Items which neither start nor end on this rank are
     * dropped. The caller must not supply the same transfer twice.
     */
    pub fn from_items<I>(rank: usize, items: I) -> Self
    where
        I: IntoIterator<Item = MotionItem>,
    {
        let mut plan = Self::default();

        for item in items {
            match (item.src_rank == rank, item.dst_rank == rank) {
                (true, true) => plan.local.push(item),
                (true, false) => plan.outbound.push(item),
                (false, true) => plan.inbound.push(item),
                (false, false) => {}
            }
        }
        plan.local.sort_by_key(MotionItem::order_key);
        plan.outbound.sort_by_key(MotionItem::order_key);
        plan.inbound.sort_by_key(MotionItem::order_key);
        plan
    }


    /**
     * Build the plan which fills the ghost zones of every patch of a layout
     * from the interiors of its neighbors, through periodic images where the
     * domain is periodic. Ghost zones outside a non-periodic edge of the
     * domain, or at the edge of the layout, are not touched.
     */
    pub fn exchange(layout: &Layout, ghost: Point) -> Self {
        let plan = Self::build(layout, layout, ghost, true);
        debug!("exchange plan for {:?} with ghost {}: {}", layout, ghost, plan.summary());
        plan
    }


    /**
     * Build the plan which copies the patch interiors of one layout into the
     * patches of another, each grown by the given ghost depth. The layouts
     * must be at the same resolution but may be partitioned differently.
     */
    pub fn copy(src: &Layout, dst: &Layout, dst_ghost: Point) -> Self {
        assert_eq!(
            src.domain(), dst.domain(),
            "cannot copy between layouts over different problem domains");
        let plan = Self::build(src, dst, dst_ghost, false);
        debug!("copy plan from {:?} to {:?} with ghost {}: {}", src, dst, dst_ghost, plan.summary());
        plan
    }


    /**
     * Return the exchange plan for a layout, from the context's cache.
     */
    pub fn cached_exchange(layout: &Layout, ghost: Point) -> std::sync::Arc<Self> {
        layout
            .context()
            .cached_plan(PlanKey::Exchange(layout.key(), ghost), &[layout], || Self::exchange(layout, ghost))
    }


    /**
     * Return the copy plan between two layouts, from the context's cache.
     */
    pub fn cached_copy(src: &Layout, dst: &Layout, dst_ghost: Point) -> std::sync::Arc<Self> {
        src.context()
            .cached_plan(PlanKey::Copy(src.key(), dst.key(), dst_ghost), &[src, dst], || Self::copy(src, dst, dst_ghost))
    }


    fn build(src: &Layout, dst: &Layout, ghost: Point, skip_self: bool) -> Self {
        let rank = src.context().rank();
        let mut items = Vec::new();

        for d in dst.iter() {
            items.extend(incoming(src, dst, d, ghost, skip_self));
        }

        // A destination-side scan only finds transfers into local patches;
        // transfers out of local patches to remote ones need a second scan
        // from the source side.
        for s in src.iter() {
            let candidates: BTreeSet<_> = src
                .patch_space(s)
                .grow(ghost)
                .coarsen(dst.patch_size())
                .iter()
                .filter_map(|q| dst.find(q))
                .filter(|d| !dst.is_local(*d))
                .collect();

            for d in candidates {
                items.extend(
                    incoming(src, dst, d, ghost, skip_self)
                        .into_iter()
                        .filter(|item| item.src == s));
            }
        }
        Self::from_items(rank, items)
    }


    pub fn local(&self) -> &[MotionItem] {
        &self.local
    }

    pub fn outbound(&self) -> &[MotionItem] {
        &self.outbound
    }

    pub fn inbound(&self) -> &[MotionItem] {
        &self.inbound
    }

    pub fn summary(&self) -> String {
        format!(
            "{} local, {} outbound, {} inbound",
            self.local.len(),
            self.outbound.len(),
            self.inbound.len())
    }


    /**
     * Move data from `src` to `dst` according to this plan.
     */
    pub fn execute<S: Pack, D: Unpack>(&self, context: &Context, src: &S, dst: &mut D) {
        let local = self.stage(context, src);
        self.complete(context, &local, dst);
    }


    /**
     * Move data within one container, as when filling its ghost zones. All
     * source values are read before any destination is written.
     */
    pub fn execute_in_place<T: Pack + Unpack>(&self, context: &Context, data: &mut T) {
        let local = self.stage(context, data);
        self.complete(context, &local, data);
    }


    /**
     * Pack and send the outbound transfers, one message per peer rank, and
     * return the packed values of the local transfers.
     */
    fn stage<S: Pack>(&self, context: &Context, src: &S) -> Vec<f64> {
        for group in self.outbound.chunk_by_rank(|item| item.dst_rank) {
            let mut buffer = Vec::new();

            for item in group {
                src.pack(item, &mut buffer)
            }
            let bytes = message::encode(&buffer);
            trace!("send {} values ({} bytes) to rank {}", buffer.len(), bytes.len(), group[0].dst_rank);
            context.send(group[0].dst_rank, TAG_MOTION, bytes);
        }

        let mut local = Vec::new();

        for item in &self.local {
            src.pack(item, &mut local)
        }
        local
    }


    /**
     * Unpack the local transfers, then receive and unpack the inbound ones.
     */
    fn complete<D: Unpack>(&self, context: &Context, local: &[f64], dst: &mut D) {
        let mut cursor = 0;

        for item in &self.local {
            let n = dst.linear_size(item);
            dst.unpack(item, &local[cursor..cursor + n]);
            cursor += n;
        }

        for group in self.inbound.chunk_by_rank(|item| item.src_rank) {
            let rank = group[0].src_rank;
            let bytes = context.recv(rank, TAG_MOTION);
            let values: Vec<f64> = message::decode(&bytes).unwrap_or_else(|e| panic!("from rank {}: {}", rank, e));
            let expected: usize = group.iter().map(|item| dst.linear_size(item)).sum();

            assert_eq!(
                values.len(), expected,
                "rank {} sent {} values but the plan expects {}",
                rank, values.len(), expected);
            trace!("recv {} values from rank {}", values.len(), rank);

            let mut cursor = 0;

            for item in group {
                let n = dst.linear_size(item);
                dst.unpack(item, &values[cursor..cursor + n]);
                cursor += n;
            }
        }
    }
}




/**
 * Return every transfer into patch `d` of the destination layout, from the
 * interiors of the source layout's patches. The region filled is the patch
 * grown by the ghost depth, trimmed along non-periodic axes. When
 * `skip_self` is set, the trivial transfer of a patch onto itself is
 * omitted.
 */
fn incoming(src: &Layout, dst: &Layout, d: PatchIndex, ghost: Point, skip_self: bool) -> Vec<MotionItem> {
    let grown = dst.domain().clip(&dst.patch_space(d).grow(ghost));
    let size = src.patch_size();
    let mut items = Vec::new();

    for p in grown.coarsen(size) {
        if let Some(s) = src.find(p) {
            let shift = (src.point(s) - p).scale(size);

            if skip_self && s == d && shift == Point::zeros() {
                continue;
            }
            let dst_space = IndexSpace::patch(p, size).intersect(&grown);

            items.push(MotionItem {
                src: s,
                dst: d,
                src_space: dst_space.shift(shift),
                dst_space,
                slot: 0,
                src_rank: src.rank_of(s),
                dst_rank: dst.rank_of(d),
            })
        }
    }
    items
}




/**
 * Split a slice of items, already sorted by peer rank, into runs sharing a
 * peer.
 */
trait ChunkByRank {
    fn chunk_by_rank<F: Fn(&MotionItem) -> usize>(&self, rank: F) -> Vec<&[MotionItem]>;
}

impl ChunkByRank for Vec<MotionItem> {
    fn chunk_by_rank<F: Fn(&MotionItem) -> usize>(&self, rank: F) -> Vec<&[MotionItem]> {
        let mut chunks = Vec::new();
        let mut start = 0;

        for n in 1..=self.len() {
            if n == self.len() || rank(&self[n]) != rank(&self[start]) {
                chunks.push(&self[start..n]);
                start = n;
            }
        }
        chunks
    }
}
