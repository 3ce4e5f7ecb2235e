use std::borrow::Borrow;

/// Range where lower bound is exclusive, upper bound is inclusive or unbounded.
///
/// This matches the way the clinic buckets ages: `(18, 35]` holds 19 through 35.
#[derive(Copy, Clone, Debug)]
pub struct Range<T>(T, Option<T>);

impl<T> Range<T>
where
    T: Ord,
{
    pub fn new(from: T, to: Option<T>) -> Self {
        if let Some(ref to) = to {
            if from >= *to {
                panic!("ranges must go from low to high")
            }
        }
        Range(from, to)
    }

    pub fn contains(&self, val: &T) -> bool {
        if let Some(end) = &self.1 {
            val > &self.0 && val <= end
        } else {
            val > &self.0
        }
    }
}

/// An ordered list of ranges. Ranges are expected not to overlap; if they do, the first match
/// wins.
#[derive(Clone, Debug)]
pub struct RangeSet<T> {
    ranges: Vec<Range<T>>,
}

impl<T> RangeSet<T> {
    pub fn new(ranges: Vec<Range<T>>) -> Self {
        Self { ranges }
    }
}

impl<T> RangeSet<T>
where
    T: Ord,
{
    /// The index of the range containing `value`, if any.
    pub fn find(&self, value: &T) -> Option<usize> {
        self.ranges.iter().position(|range| range.contains(value))
    }

    /// Count values into buckets. Values that fall outside every range, and missing values, are
    /// both counted in the trailing "missing" bucket.
    pub fn bucket_values_with_missing<I, B>(&self, values: I) -> RangeSetCountsWithMissing<'_, T>
    where
        I: Iterator<Item = Option<B>>,
        B: Borrow<T>,
    {
        let mut buckets = vec![0usize; self.ranges.len() + 1];
        let last = self.ranges.len();
        for value in values {
            match value.and_then(|value| self.find(value.borrow())) {
                Some(idx) => buckets[idx] += 1,
                None => buckets[last] += 1,
            }
        }
        RangeSetCountsWithMissing {
            set: self,
            counts: buckets,
        }
    }
}

/// A range set with values bucketed, and bucket sizes recorded.
pub struct RangeSetCountsWithMissing<'a, T> {
    set: &'a RangeSet<T>,
    counts: Vec<usize>,
}

impl<'a, T> RangeSetCountsWithMissing<'a, T> {
    /// Counts for each range, in order, without the missing bucket.
    pub fn counts(&self) -> &[usize] {
        &self.counts[..self.set.ranges.len()]
    }

    pub fn missing(&self) -> usize {
        self.counts[self.set.ranges.len()]
    }
}

#[cfg(test)]
mod test {
    use super::{Range, RangeSet};

    #[test]
    fn bounds() {
        let range = Range::new(18, Some(35));
        assert!(!range.contains(&18));
        assert!(range.contains(&19));
        assert!(range.contains(&35));
        assert!(!range.contains(&36));

        let open = Range::new(80, None);
        assert!(!open.contains(&80));
        assert!(open.contains(&1000));
    }

    #[test]
    fn bucket_with_missing() {
        let set = RangeSet::new(vec![Range::new(0, Some(10)), Range::new(10, Some(20))]);
        let counts =
            set.bucket_values_with_missing([Some(1), Some(10), Some(11), None, Some(0), Some(25)].into_iter());
        assert_eq!(counts.counts(), &[2, 1]);
        assert_eq!(counts.missing(), 3);

        let empty = RangeSet::new(vec![Range::new(0, Some(10))]);
        let counts = empty.bucket_values_with_missing(std::iter::empty::<Option<i32>>());
        assert_eq!(counts.counts(), &[0]);
        assert_eq!(counts.missing(), 0);
    }
}
