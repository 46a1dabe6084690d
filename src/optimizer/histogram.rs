use std::fmt;

use crate::types::Op;

/// Fixed-bucket equal-width histogram over an integer domain `[min, max]`.
///
/// Bucket `i` covers `[min + i * width, min + (i + 1) * width)`, clipped to
/// `max` for the last occupied bucket. Estimates assume values are spread
/// uniformly inside each bucket.
#[derive(Debug, Clone)]
pub struct IntHistogram {
    buckets: Vec<usize>,
    min: i64,
    max: i64,
    width: i64,
    total: usize,
}

impl IntHistogram {
    /// `buckets` is clamped to at least one; a reversed range is swapped
    pub fn new(buckets: usize, min: i32, max: i32) -> Self {
        let (min, max) = if min <= max {
            (min as i64, max as i64)
        } else {
            (max as i64, min as i64)
        };
        let buckets = buckets.max(1);
        let range = max - min + 1;
        let width = (range + buckets as i64 - 1) / buckets as i64;
        IntHistogram {
            buckets: vec![0; buckets],
            min,
            max,
            width,
            total: 0,
        }
    }

    pub fn min(&self) -> i32 {
        self.min as i32
    }

    pub fn max(&self) -> i32 {
        self.max as i32
    }

    /// Number of values added so far
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn bucket_counts(&self) -> &[usize] {
        &self.buckets
    }

    fn bucket_of(&self, v: i64) -> usize {
        let pos = ((v - self.min) / self.width) as usize;
        pos.min(self.buckets.len() - 1)
    }

    fn left_edge(&self, pos: usize) -> i64 {
        self.min + self.width * pos as i64
    }

    /// Number of domain values bucket `pos` actually spans
    fn bucket_width(&self, pos: usize) -> i64 {
        (self.max + 1 - self.left_edge(pos)).clamp(1, self.width)
    }

    /// Record one observation. Values outside `[min, max]` land in the nearest
    /// end bucket.
    pub fn add_value(&mut self, v: i32) {
        let v = (v as i64).clamp(self.min, self.max);
        let pos = self.bucket_of(v);
        self.buckets[pos] += 1;
        self.total += 1;
    }

    /// Estimated fraction of recorded values satisfying `value <op> v`
    pub fn estimate_selectivity(&self, op: Op, v: i32) -> f64 {
        let (lt, eq, gt) = self.fractions(v as i64);
        match op {
            Op::Equals | Op::Like => eq,
            Op::NotEquals => 1.0 - eq,
            Op::GreaterThan => gt,
            Op::GreaterThanOrEq => gt + eq,
            Op::LessThan => lt,
            Op::LessThanOrEq => lt + eq,
        }
    }

    /// `(less-than, equal, greater-than)` fractions for `v`
    fn fractions(&self, v: i64) -> (f64, f64, f64) {
        if v < self.min {
            return (0.0, 0.0, 1.0);
        }
        if v > self.max {
            return (1.0, 0.0, 0.0);
        }
        if self.total == 0 {
            return (0.0, 0.0, 0.0);
        }

        let total = self.total as f64;
        let pos = self.bucket_of(v);
        let left = self.left_edge(pos);
        let w = self.bucket_width(pos);
        let per_value = self.buckets[pos] as f64 / w as f64 / total;

        let below: usize = self.buckets[..pos].iter().sum();
        let above: usize = self.buckets[pos + 1..].iter().sum();

        let eq = per_value;
        let lt = below as f64 / total + (v - left) as f64 * per_value;
        let gt = above as f64 / total + (left + w - v - 1) as f64 * per_value;
        (lt, eq, gt)
    }
}

impl fmt::Display for IntHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IntHistogram(min={}, max={}, width={}, total={}, buckets={:?})",
            self.min, self.max, self.width, self.total, self.buckets
        )
    }
}

/// Histogram over strings, keyed by the first four bytes of each value
#[derive(Debug, Clone)]
pub struct StringHistogram {
    hist: IntHistogram,
}

/// Base-256 value of the first four bytes of `s`, zero padded on the right
fn prefix_value(s: &str) -> i64 {
    let mut value = 0i64;
    for (i, shift) in [24, 16, 8, 0].into_iter().enumerate() {
        if let Some(&byte) = s.as_bytes().get(i) {
            value += (byte as i64) << shift;
        }
    }
    value
}

impl StringHistogram {
    const LOWEST: &'static str = "";
    const HIGHEST: &'static str = "zzzz";

    pub fn new(buckets: usize) -> Self {
        StringHistogram {
            hist: IntHistogram::new(buckets, Self::min_value(), Self::max_value()),
        }
    }

    fn min_value() -> i32 {
        prefix_value(Self::LOWEST) as i32
    }

    fn max_value() -> i32 {
        prefix_value(Self::HIGHEST) as i32
    }

    /// Integer key of `s`, clamped into the histogram's domain
    pub fn string_to_int(s: &str) -> i32 {
        let value = prefix_value(s);
        value.clamp(Self::min_value() as i64, Self::max_value() as i64) as i32
    }

    pub fn add_value(&mut self, s: &str) {
        self.hist.add_value(Self::string_to_int(s));
    }

    pub fn estimate_selectivity(&self, op: Op, s: &str) -> f64 {
        self.hist.estimate_selectivity(op, Self::string_to_int(s))
    }

    pub fn total(&self) -> usize {
        self.hist.total()
    }
}

impl fmt::Display for StringHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StringHistogram({})", self.hist)
    }
}
