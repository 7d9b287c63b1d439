use std::collections::BTreeMap;
use rand::prelude::*;
use patchgrid::copier::{MotionItem, MotionPlan};
use patchgrid::domain::ProblemDomain;
use patchgrid::index_space::IndexSpace;
use patchgrid::layout::Layout;
use patchgrid::message::local::run_ranks;
use patchgrid::context::Context;
use patchgrid::point::Point;




fn random_domain(rng: &mut StdRng, patch_size: Point) -> ProblemDomain {
    let blocks = Point::new([rng.gen_range(1..5), rng.gen_range(1..5)]);
    let hi = blocks.scale(patch_size) - Point::ones(1);
    ProblemDomain::new(IndexSpace::new(Point::zeros(), hi), [rng.gen(), rng.gen()])
}

fn random_size(rng: &mut StdRng) -> Point {
    Point::new([rng.gen_range(2..6), rng.gen_range(2..6)])
}

/**
 * Map every destination cell written by the items into a patch to the
 * source patch and cell it comes from. Panics if a cell is written twice.
 */
fn transfers_into<'a, I>(items: I) -> BTreeMap<(usize, Point), (usize, Point)>
where
    I: IntoIterator<Item = &'a MotionItem>,
{
    let mut cells = BTreeMap::new();

    for item in items {
        assert_eq!(item.src_space.dim(), item.dst_space.dim());

        for (d, s) in item.dst_space.iter().zip(item.src_space.iter()) {
            let previous = cells.insert((item.dst.global(), d), (item.src.global(), s));
            assert!(previous.is_none(), "cell {} of patch {} is written twice", d, item.dst);
        }
    }
    cells
}

/**
 * Every cell the copy should fill, found by brute force: cells of the
 * destination patch grown by the ghost depth, whose periodic image lies in a
 * source patch.
 */
fn expected_into(src: &Layout, dst: &Layout, ghost: Point, skip_self: bool) -> BTreeMap<(usize, Point), (usize, Point)> {
    let domain = dst.domain();
    let mut cells = BTreeMap::new();

    for d in dst.iter() {
        for p in dst.patch_space(d).grow(ghost) {
            if !domain.contains(p) {
                continue;
            }
            let image = domain.image(p);

            if let Some(s) = src.find(image.coarsen(src.patch_size())) {
                if skip_self && s.global() == d.global() && image == p {
                    continue;
                }
                cells.insert((d.global(), p), (s.global(), image));
            }
        }
    }
    cells
}




#[test]
fn random_copy_plans_match_direct_intersection() {
    let mut rng = StdRng::seed_from_u64(31);
    let context = Context::serial();

    for _ in 0..40 {
        let src_size = random_size(&mut rng);
        let domain = random_domain(&mut rng, src_size);
        let mut dst_size = Point::ones(1);
        for axis in 0..2 {
            let divisors: Vec<i64> = (1..=6).filter(|k| domain.size()[axis] % k == 0).collect();
            dst_size[axis] = *divisors.choose(&mut rng).unwrap();
        }
        let ghost = Point::new([rng.gen_range(0..3), rng.gen_range(0..3)]);

        let src = if rng.gen() {
            Layout::new(&context, domain, src_size)
        } else {
            let mut points: Vec<_> = domain.coarsen(src_size).space().iter().collect();
            points.shuffle(&mut rng);
            points.truncate(rng.gen_range(1..=points.len()));
            Layout::from_points(&context, domain, points, src_size)
        };
        let dst = Layout::new(&context, domain, dst_size);
        let plan = MotionPlan::copy(&src, &dst, ghost);

        assert!(plan.outbound().is_empty() && plan.inbound().is_empty());
        assert_eq!(transfers_into(plan.local()), expected_into(&src, &dst, ghost, false));
    }
}

#[test]
fn random_exchange_plans_fill_every_ghost_cell_once() {
    let mut rng = StdRng::seed_from_u64(7);
    let context = Context::serial();

    for _ in 0..40 {
        let size = random_size(&mut rng);
        let domain = random_domain(&mut rng, size);
        let ghost = Point::new([rng.gen_range(0..4), rng.gen_range(0..4)]);
        let layout = Layout::new(&context, domain, size);
        let plan = MotionPlan::exchange(&layout, ghost);

        for item in plan.local() {
            assert_eq!(domain.image_space(&item.dst_space), Some(item.src_space));
            assert!(layout.patch_space(item.src).contains_space(&item.src_space));
        }
        assert_eq!(transfers_into(plan.local()), expected_into(&layout, &layout, ghost, true));
    }
}

#[test]
fn distributed_exchange_plans_agree_with_the_serial_plan() {
    let domain = ProblemDomain::new(IndexSpace::new(Point::zeros(), Point::new([35, 23])), [true, false]);
    let size = Point::new([6, 4]);
    let ghost = Point::new([2, 1]);
    let serial = transfers_into(MotionPlan::exchange(&Layout::new(&Context::serial(), domain, size), ghost).local());

    let parts = run_ranks(4, |context| {
        let layout = Layout::new(&context, domain, size);
        let plan = MotionPlan::exchange(&layout, ghost);

        for item in plan.outbound() {
            assert!(layout.is_local(item.src) && !layout.is_local(item.dst));
        }
        transfers_into(plan.local().iter().chain(plan.inbound()))
    });

    let mut merged = BTreeMap::new();
    for part in parts {
        for (key, value) in part {
            assert!(merged.insert(key, value).is_none());
        }
    }
    assert_eq!(merged, serial);
}
