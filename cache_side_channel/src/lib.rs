#![deny(unsafe_op_in_unsafe_fn)]

use std::fmt;

pub mod probe;

pub use probe::{ProbeArray, ProbeArrayError, ProbeOrder};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Latency boundary between a hit and a miss, in cycles.
///
/// A measurement at or below the value is a hit.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
pub struct Threshold {
    pub value: u64,
}

impl Threshold {
    pub fn new(value: u64) -> Self {
        Threshold { value }
    }

    pub fn is_hit(&self, time: u64) -> bool {
        time <= self.value
    }

    pub fn classify(&self, time: u64) -> CacheStatus {
        if self.is_hit(time) {
            CacheStatus::Hit
        } else {
            CacheStatus::Miss
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_is_a_hit() {
        let t = Threshold::new(37);
        assert_eq!(t.classify(36), CacheStatus::Hit);
        assert_eq!(t.classify(37), CacheStatus::Hit);
        assert_eq!(t.classify(38), CacheStatus::Miss);
    }
}
