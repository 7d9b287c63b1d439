use std::collections::BTreeSet;
use log::debug;
use crate::context::Context;
use crate::domain::ProblemDomain;
use crate::message;
use crate::point::Point;




/**
 * A set of cells of a problem domain that every rank can add to, and which
 * is made identical on all ranks by a collective `exchange`. Typically used
 * to agree on cells tagged for refinement. Points are stored by their
 * periodic image.
 */
#[derive(Clone, Debug)]
pub struct PointSet {
    context: Context,
    domain: ProblemDomain,
    pending: Vec<Point>,
    points: BTreeSet<Point>,
}




// ============================================================================
impl PointSet {

    pub fn new(context: &Context, domain: ProblemDomain) -> Self {
        Self {
            context: context.clone(),
            domain,
            pending: Vec::new(),
            points: BTreeSet::new(),
        }
    }

    pub fn domain(&self) -> ProblemDomain {
        self.domain
    }


    /**
     * Add a point on this rank. Returns false if the point lies outside the
     * domain, or is already in the set or waiting to be exchanged.
     */
    pub fn add(&mut self, point: Point) -> bool {
        if !self.domain.contains(point) {
            return false;
        }
        let image = self.domain.image(point);

        if self.points.contains(&image) || self.pending.contains(&image) {
            return false;
        }
        self.pending.push(image);
        true
    }


    /**
     * Merge the points added on every rank since the last exchange into
     * the set on every rank. This is a collective operation.
     */
    pub fn exchange(&mut self) {
        let merged = self.context.all_reduce(
            |a, b| {
                let mut a: Vec<Point> = decode_points(&a);
                a.extend(decode_points(&b));
                message::encode(&a)
            },
            message::encode(&self.pending),
        );
        let received = decode_points(&merged);

        debug!("point set exchange: {} local, {} total new", self.pending.len(), received.len());
        self.points.extend(received);
        self.pending.clear();
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.points.clear();
    }


    /**
     * The exchanged points, in lexicographic order.
     */
    pub fn points(&self) -> Vec<Point> {
        self.points.iter().copied().collect()
    }

    /**
     * The points added on this rank and not yet exchanged.
     */
    pub fn local_points(&self) -> &[Point] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn decode_points(bytes: &[u8]) -> Vec<Point> {
    message::decode(bytes).unwrap_or_else(|e| panic!("malformed point set message: {}", e))
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::PointSet;
    use crate::domain::ProblemDomain;
    use crate::index_space::IndexSpace;
    use crate::message::local::run_ranks;
    use crate::point::Point;

    #[test]
    fn exchange_gives_every_rank_the_union() {
        let results = run_ranks(3, |context| {
            let domain = ProblemDomain::new(IndexSpace::cube(16), [true, false]);
            let mut set = PointSet::new(&context, domain);
            let r = context.rank() as i64;

            assert!(set.add(Point::new([r, r])));
            assert!(!set.add(Point::new([r + 16, r])));
            assert!(set.add(Point::new([-1, 5])));
            assert!(!set.add(Point::new([0, 16])));
            assert_eq!(set.local_points().len(), 2);

            set.exchange();
            assert!(set.local_points().is_empty());
            assert!(!set.add(Point::new([15, 5])));
            set.points()
        });

        let expected = vec![Point::new([0, 0]), Point::new([1, 1]), Point::new([2, 2]), Point::new([15, 5])];
        assert!(results.iter().all(|points| *points == expected));
    }
}
