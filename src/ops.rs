use std::{
    fmt::{Debug, Formatter},
    ops::Sub,
};

use chrono::{DateTime, Local};

pub type Interval<Tz = Local> = RangeExclusive<DateTime<Tz>>;

/// Half-open range `[start, end)`.
#[must_use]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct RangeExclusive<T: Copy> {
    pub start: T,
    pub end: T,
}

impl<T: Copy + Debug> Debug for RangeExclusive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}..{:?}", self.start, self.end)
    }
}

impl<T: Copy> RangeExclusive<T> {
    pub const fn new(start: T, end: T) -> Self {
        Self { start, end }
    }
}

impl<T: Copy + Sub> RangeExclusive<T> {
    #[must_use]
    pub fn len(self) -> <T as Sub>::Output {
        self.end - self.start
    }
}

impl<T: Copy + PartialOrd> RangeExclusive<T> {
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.end <= self.start
    }

    #[must_use]
    pub fn contains(self, other: T) -> bool {
        (self.start <= other) && (other < self.end)
    }

    /// Overlap with another range, if any.
    pub fn intersect(self, other: Self) -> Option<Self> {
        let start = if self.start >= other.start { self.start } else { other.start };
        let end = if self.end <= other.end { self.end } else { other.end };
        (start < end).then_some(Self { start, end })
    }
}
