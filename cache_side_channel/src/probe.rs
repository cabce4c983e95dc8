use cache_utils::mmap::MMappedMemory;
use cache_utils::{CACHE_LINE_LEN, PAGE_LEN};
use static_assertions::{const_assert, const_assert_eq};
use thiserror::Error;

/// One line per possible byte value.
pub const PROBE_LINES: usize = 256;

/// Distance between two probe lines: one page each, so that no prefetcher
/// working within a page brings in the line of another value.
pub const DEFAULT_STRIDE: usize = PAGE_LEN;

const_assert_eq!(DEFAULT_STRIDE % CACHE_LINE_LEN, 0);
const_assert!(DEFAULT_STRIDE >= PAGE_LEN);

#[derive(Debug, Error)]
pub enum ProbeArrayError {
    #[error("stride {0} is not a non-zero multiple of the {line} byte cache line", line = CACHE_LINE_LEN)]
    InvalidStride(usize),
    #[error("failed to map the probe array: {0}")]
    Allocation(#[from] nix::Error),
}

/// 256 lines, `stride` bytes apart, line `v` standing for the byte value `v`.
#[derive(Debug)]
pub struct ProbeArray {
    memory: MMappedMemory,
    stride: usize,
}

impl ProbeArray {
    pub fn new(stride: usize) -> Result<Self, ProbeArrayError> {
        if stride == 0 || stride % CACHE_LINE_LEN != 0 {
            return Err(ProbeArrayError::InvalidStride(stride));
        }
        let memory = MMappedMemory::try_new(PROBE_LINES * stride)?;
        let mut array = ProbeArray { memory, stride };
        array.fill(1);
        Ok(array)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Write every byte, so no line is backed by the shared zero page.
    pub fn fill(&mut self, byte: u8) {
        self.memory.fill(byte);
    }

    pub fn line(&self, value: u8) -> *const u8 {
        &self.memory[value as usize * self.stride] as *const u8
    }

    pub fn lines(&self) -> impl Iterator<Item = *const u8> + '_ {
        (0..=u8::MAX).map(move |v| self.line(v))
    }
}

/// Fixed permutation of the 256 probe lines, `i -> (i * multiplier + increment) mod 256`.
///
/// Walking the lines in this order hides the sequential pattern from stride
/// prefetchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOrder {
    multiplier: u8,
    increment: u8,
}

impl ProbeOrder {
    /// `None` unless the multiplier is odd, the condition for a permutation of 0..256.
    pub const fn new(multiplier: u8, increment: u8) -> Option<Self> {
        if multiplier % 2 == 1 {
            Some(ProbeOrder {
                multiplier,
                increment,
            })
        } else {
            None
        }
    }

    pub fn value(&self, i: u8) -> u8 {
        i.wrapping_mul(self.multiplier).wrapping_add(self.increment)
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> {
        let order = *self;
        (0..=u8::MAX).map(move |i| order.value(i))
    }
}

impl Default for ProbeOrder {
    fn default() -> Self {
        ProbeOrder {
            multiplier: 167,
            increment: 13,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order_is_a_permutation() {
        let mut seen = [false; PROBE_LINES];
        for v in ProbeOrder::default().iter() {
            assert!(!seen[v as usize]);
            seen[v as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn default_order_values() {
        let order = ProbeOrder::default();
        assert_eq!(order.value(0), 13);
        assert_eq!(order.value(1), 180);
        assert_eq!(order.value(2), (2 * 167 + 13) as u8);
    }

    #[test]
    fn even_multiplier_rejected() {
        assert!(ProbeOrder::new(166, 13).is_none());
        assert!(ProbeOrder::new(1, 0).is_some());
    }

    #[test]
    fn lines_are_stride_apart() {
        let array = ProbeArray::new(DEFAULT_STRIDE).unwrap();
        let base = array.line(0) as usize;
        for (v, p) in array.lines().enumerate() {
            assert_eq!(p as usize - base, v * DEFAULT_STRIDE);
            assert_eq!(unsafe { *p }, 1);
        }
    }

    #[test]
    fn default_stride_gives_each_line_its_own_page() {
        assert!(DEFAULT_STRIDE >= PAGE_LEN);
        let array = ProbeArray::new(DEFAULT_STRIDE).unwrap();
        let pages: std::collections::HashSet<usize> =
            array.lines().map(|p| p as usize / PAGE_LEN).collect();
        assert_eq!(pages.len(), PROBE_LINES);
    }

    #[test]
    fn narrow_stride_still_accepted() {
        let array = ProbeArray::new(4 * CACHE_LINE_LEN).unwrap();
        assert_eq!(array.stride(), 256);
        assert_eq!(array.line(1) as usize - array.line(0) as usize, 256);
    }

    #[test]
    fn bad_stride() {
        assert!(matches!(ProbeArray::new(100), Err(ProbeArrayError::InvalidStride(100))));
        assert!(matches!(ProbeArray::new(0), Err(ProbeArrayError::InvalidStride(0))));
    }
}
