//! Age buckets used for the demographic breakdowns.
//!
//! The clinic reports ages in six fixed groups. Boundaries are half-open on the left, so a
//! patient aged exactly 18 is in `0-18` and one aged 18.5 is in `19-35`. Ages of zero or less,
//! ages above 100, and missing ages are not placed in any group; callers count them separately
//! as "unknown".
use crate::range::{Range, RangeSet};
use noisy_float::prelude::*;
use once_cell::sync::Lazy;
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum AgeGroup {
    UpTo18,
    From19To35,
    From36To50,
    From51To65,
    From66To80,
    From81To100,
}

impl AgeGroup {
    /// All groups in ascending order.
    pub const ALL: [AgeGroup; 6] = [
        AgeGroup::UpTo18,
        AgeGroup::From19To35,
        AgeGroup::From36To50,
        AgeGroup::From51To65,
        AgeGroup::From66To80,
        AgeGroup::From81To100,
    ];

    /// Find the group for an age. `None` if the age is outside `(0, 100]`.
    pub fn of(age: R64) -> Option<Self> {
        AGE_BUCKETS.find(&age).map(|idx| Self::ALL[idx])
    }

    /// Like `of`, but passes a missing age straight through.
    pub fn of_opt(age: Option<R64>) -> Option<Self> {
        age.and_then(Self::of)
    }

    pub fn label(self) -> &'static str {
        use AgeGroup::*;
        match self {
            UpTo18 => "0-18",
            From19To35 => "19-35",
            From36To50 => "36-50",
            From51To65 => "51-65",
            From66To80 => "66-80",
            From81To100 => "81-100",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for AgeGroup {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.label())
    }
}

/// The bucket boundaries, in the same order as `AgeGroup::ALL`.
pub static AGE_BUCKETS: Lazy<RangeSet<R64>> = Lazy::new(|| {
    RangeSet::new(
        [0., 18., 35., 50., 65., 80., 100.]
            .windows(2)
            .map(|w| Range::new(r64(w[0]), Some(r64(w[1]))))
            .collect(),
    )
});

/// Label used wherever an age could not be placed in a group.
pub const UNKNOWN_AGE_LABEL: &str = "unknown";
