//! Branch-free index selection for the training loop.
//!
//! Choosing between the training and the attack index with a conditional
//! branch would feed the very predictor being trained. Both functions here
//! compile to arithmetic only: no conditional branch and no memory access
//! depending on the selector.

/// `if_set` when `mask` is all ones, `if_clear` when `mask` is zero.
///
/// Any other mask mixes the two bitwise.
#[inline(always)]
pub fn branchless_select(mask: usize, if_set: usize, if_clear: usize) -> usize {
    if_clear ^ (mask & (if_set ^ if_clear))
}

/// All ones when `i` is a multiple of `period`, zero otherwise.
///
/// `period` must be in `1..=0x10000`.
#[inline(always)]
pub fn attack_mask(i: usize, period: usize) -> usize {
    // i % period == 0 underflows to all ones, anything else stays below 0x10000.
    let m = (i % period).wrapping_sub(1) & !0xFFFF;
    m | (m >> 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_every_sixth() {
        for i in 0..64 {
            let expected = if i % 6 == 0 { usize::MAX } else { 0 };
            assert_eq!(attack_mask(i, 6), expected, "i = {}", i);
        }
    }

    #[test]
    fn mask_large_period() {
        assert_eq!(attack_mask(0x10000, 0x10000), usize::MAX);
        assert_eq!(attack_mask(0xFFFF, 0x10000), 0);
    }

    #[test]
    fn select() {
        assert_eq!(branchless_select(usize::MAX, 300, 7), 300);
        assert_eq!(branchless_select(0, 300, 7), 7);
        assert_eq!(branchless_select(attack_mask(12, 6), 300, 7), 300);
        assert_eq!(branchless_select(attack_mask(13, 6), 300, 7), 7);
    }
}
