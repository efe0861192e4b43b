//! Miscellaneous utility structs and functions.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// An interval on the real number line.
#[derive(Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// Creates a new interval.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: std::cmp::PartialOrd> Interval<T> {
    /// Returns true if this interval overlaps with the other.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.max > other.min && other.max > self.min
    }

    /// Returns true if this interval contains the value.
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }

    /// Returns true if the value lies in `(min, max]`, i.e. it was reached
    /// by something travelling from `min` to `max`.
    pub fn crossed(&self, value: T) -> bool {
        value > self.min && value <= self.max
    }
}

impl<T: std::ops::Sub<T, Output = T> + Copy> Interval<T> {
    /// Gets the magnitude of the interval.
    pub fn length(&self) -> T {
        self.max - self.min
    }
}

impl Interval<f64> {
    /// Gets the length of the overlap between two intervals, or zero.
    pub fn overlap_with(&self, other: &Self) -> f64 {
        f64::max(f64::min(self.max, other.max) - f64::max(self.min, other.min), 0.0)
    }
}

impl<T: Debug> Debug for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interval({:?}, {:?})", &self.min, &self.max)
    }
}

/// The arithmetic mean of the values, or `None` if there are none.
pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn crossing_excludes_start() {
        let travelled = Interval::new(10.0, 20.0);
        assert!(!travelled.crossed(10.0));
        assert!(travelled.crossed(15.0));
        assert!(travelled.crossed(20.0));
        assert!(!travelled.crossed(21.0));
    }

    #[test]
    fn overlap_length() {
        let a = Interval::new(0.0, 10.0);
        assert_eq!(a.overlap_with(&Interval::new(5.0, 30.0)), 5.0);
        assert_eq!(a.overlap_with(&Interval::new(12.0, 30.0)), 0.0);
        assert_eq!(mean([1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(mean(std::iter::empty()), None);
    }
}
