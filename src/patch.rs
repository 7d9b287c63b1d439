use crate::context::Reduction;
use crate::index_space::IndexSpace;
use crate::point::Point;




/**
 * A patch is a mapping from a rectangular index space to field values. The
 * mapping is backed by a row-major array in which the field components of
 * each index are stored next to each other.
 *
 * A patch knows nothing about layouts or ghost zones; it is simply a block
 * of data. Level containers hold one patch per locally owned layout entry,
 * sized to the patch box grown by the ghost depth.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Patch {
    space: IndexSpace,
    num_fields: usize,
    data: Vec<f64>,
}




// ============================================================================
impl Patch {

    /**
     * Generate a patch of zeros over the given index space.
     */
    pub fn zeros(space: IndexSpace, num_fields: usize) -> Self {
        Self {
            space,
            num_fields,
            data: vec![0.0; space.len() * num_fields],
        }
    }


    /**
     * Generate a single-field patch, with values defined from a closure.
     */
    pub fn from_function<F>(space: IndexSpace, f: F) -> Self
    where
        F: Fn(Point) -> f64,
    {
        Self {
            space,
            num_fields: 1,
            data: space.iter().map(f).collect(),
        }
    }


    /**
     * Generate a multi-field patch, with values defined from a closure.
     */
    pub fn from_function_n<F, const NUM_FIELDS: usize>(space: IndexSpace, f: F) -> Self
    where
        F: Fn(Point) -> [f64; NUM_FIELDS],
    {
        Self {
            space,
            num_fields: NUM_FIELDS,
            data: space.iter().flat_map(f).collect(),
        }
    }


    pub fn space(&self) -> IndexSpace {
        self.space
    }

    pub fn num_fields(&self) -> usize {
        self.num_fields
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }


    /**
     * Return the value of one field at the given index.
     */
    pub fn get(&self, index: Point, field: usize) -> f64 {
        self.data[self.offset(index) + field]
    }

    pub fn get_mut(&mut self, index: Point, field: usize) -> &mut f64 {
        let n = self.offset(index) + field;
        &mut self.data[n]
    }

    /**
     * Return all the fields at the given index.
     */
    pub fn get_slice(&self, index: Point) -> &[f64] {
        let n = self.offset(index);
        &self.data[n..n + self.num_fields]
    }

    pub fn get_slice_mut(&mut self, index: Point) -> &mut [f64] {
        let n = self.offset(index);
        &mut self.data[n..n + self.num_fields]
    }

    fn offset(&self, index: Point) -> usize {
        self.validate_index(index);
        self.space.row_major_offset(index) * self.num_fields
    }

    fn validate_index(&self, index: Point) {
        if !self.space.contains(index) {
            panic!("index {} out of range on patch {}", index, self.space);
        }
    }


    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|x| *x = value)
    }


    /**
     * Set the values of this patch in `region` to those of `source` at the
     * same index plus `shift`. All fields are copied.
     */
    pub fn copy_region_from(&mut self, source: &Patch, region: &IndexSpace, shift: Point) {
        assert_eq!(
            self.num_fields, source.num_fields,
            "cannot copy between patches with {} and {} fields",
            self.num_fields, source.num_fields);

        for p in region {
            let n = self.num_fields;
            let src = source.offset(p + shift);
            let dst = self.offset(p);
            self.data[dst..dst + n].copy_from_slice(&source.data[src..src + n]);
        }
    }


    /**
     * Append the values in `region` to a buffer, in row-major order with the
     * fields of each index adjacent.
     */
    pub fn pack(&self, region: &IndexSpace, buffer: &mut Vec<f64>) {
        for p in region {
            buffer.extend_from_slice(self.get_slice(p))
        }
    }


    /**
     * Overwrite the values in `region` from a buffer laid out as by `pack`.
     * Returns the number of values consumed.
     */
    pub fn unpack(&mut self, region: &IndexSpace, values: &[f64]) -> usize {
        let n = self.num_fields;
        let count = region.len() * n;

        assert!(
            values.len() >= count,
            "buffer of {} values is too short to fill {} with {} fields",
            values.len(),
            region,
            n);

        for (p, chunk) in region.iter().zip(values.chunks_exact(n)) {
            self.get_slice_mut(p).copy_from_slice(chunk)
        }
        count
    }


    /**
     * Add `a * x` to this patch, wherever the two patches overlap.
     */
    pub fn axpy(&mut self, a: f64, x: &Patch) {
        assert_eq!(self.num_fields, x.num_fields, "field counts differ");

        for p in self.space.intersect(&x.space) {
            let n = self.num_fields;
            let src = x.offset(p);
            let dst = self.offset(p);

            for (yi, xi) in self.data[dst..dst + n].iter_mut().zip(&x.data[src..src + n]) {
                *yi += a * xi
            }
        }
    }


    /**
     * Replace every coarse cell of this patch lying under `fine` with the
     * mean of the fine cells it covers. Coarse cells not entirely covered by
     * the fine patch are left unchanged.
     */
    pub fn average_down(&mut self, fine: &Patch, ratio: Point) {
        assert_eq!(self.num_fields, fine.num_fields, "field counts differ");

        let n = self.num_fields;
        let norm = 1.0 / ratio.product() as f64;
        let region = fine.space.coarsen(ratio).intersect(&self.space);

        for c in region {
            let block = IndexSpace::new(c, c).refine(ratio);

            if !fine.space.contains_space(&block) {
                continue;
            }
            for q in 0..n {
                *self.get_mut(c, q) = block.iter().map(|f| fine.get(f, q)).sum::<f64>() * norm;
            }
        }
    }


    /**
     * Reduce all fields over the part of `region` inside this patch.
     */
    pub fn reduce(&self, region: &IndexSpace, op: Reduction) -> f64 {
        self.space
            .intersect(region)
            .iter()
            .flat_map(|p| self.get_slice(p).iter().copied())
            .fold(op.init(), |acc, x| op.fold(acc, x))
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::Patch;
    use crate::context::Reduction;
    use crate::index_space::range2d;
    use crate::point::Point;

    #[test]
    fn patch_indexing_works() {
        let patch = Patch::from_function(range2d(4..10, 4..10), |p| (p[0] + p[1]) as f64);
        assert_eq!(patch.get(Point::new([5, 5]), 0), 10.0);
        assert_eq!(patch.get(Point::new([6, 8]), 0), 14.0);

        let multi = Patch::from_function_n(range2d(0..2, 0..2), |p| [p[0] as f64, p[1] as f64]);
        assert_eq!(multi.get_slice(Point::new([1, 0])), &[1.0, 0.0]);
        assert_eq!(multi.data().len(), 8);
    }

    #[test]
    #[should_panic]
    fn out_of_range_index_is_fatal() {
        Patch::zeros(range2d(0..4, 0..4), 1).get(Point::new([4, 0]), 0);
    }

    #[test]
    fn pack_then_unpack_moves_a_region() {
        let a = Patch::from_function_n(range2d(0..8, 0..8), |p| [p[0] as f64, 10.0 * p[1] as f64]);
        let mut b = Patch::zeros(range2d(0..8, 0..8), 2);
        let region = range2d(2..5, 3..4);
        let mut buffer = Vec::new();
        a.pack(&region, &mut buffer);
        assert_eq!(buffer.len(), 6);
        assert_eq!(b.unpack(&region, &buffer), 6);
        assert_eq!(b.get_slice(Point::new([4, 3])), &[4.0, 30.0]);
        assert_eq!(b.get(Point::new([5, 3]), 0), 0.0);
    }

    #[test]
    fn copy_region_applies_the_shift() {
        let a = Patch::from_function(range2d(0..8, 0..8), |p| (p[0] * 8 + p[1]) as f64);
        let mut b = Patch::zeros(range2d(-2..0, 0..8), 1);
        b.copy_region_from(&a, &range2d(-2..0, 0..8), Point::new([8, 0]));
        assert_eq!(b.get(Point::new([-1, 3]), 0), a.get(Point::new([7, 3]), 0));
    }

    #[test]
    fn average_down_preserves_the_mean() {
        let fine = Patch::from_function(range2d(0..8, 0..8), |p| (p[0] * p[1]) as f64);
        let mut coarse = Patch::zeros(range2d(-1..5, -1..5), 1);
        coarse.average_down(&fine, Point::ones(2));

        let fine_total = fine.reduce(&fine.space(), Reduction::Sum);
        let coarse_total = coarse.reduce(&range2d(0..4, 0..4), Reduction::Sum);
        assert_eq!(fine_total, 4.0 * coarse_total);
        assert_eq!(coarse.get(Point::new([1, 1]), 0), 0.25 * (4.0 + 6.0 + 6.0 + 9.0));
        assert_eq!(coarse.get(Point::new([-1, 0]), 0), 0.0);
    }

    #[test]
    fn axpy_touches_only_the_overlap() {
        let mut y = Patch::zeros(range2d(0..4, 0..4), 1);
        let mut x = Patch::zeros(range2d(2..6, 2..6), 1);
        x.fill(1.0);
        y.axpy(2.0, &x);
        assert_eq!(y.reduce(&y.space(), Reduction::Sum), 8.0);
        assert_eq!(y.reduce(&y.space(), Reduction::Max), 2.0);
    }
}
