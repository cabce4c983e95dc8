#![deny(unsafe_op_in_unsafe_fn)]

use static_assertions::const_assert;

pub mod calibration;
pub mod environment;
pub mod mmap;
pub mod simulated;

use core::fmt::Debug;
use core::ptr;

pub const CACHE_LINE_LEN: usize = 64; // FIXME Magic, true for the Cortex-A72 and most x86.

/// Smallest page on every supported target.
pub const PAGE_LEN: usize = 4096;

const_assert!(CACHE_LINE_LEN.is_power_of_two());
const_assert!(PAGE_LEN % CACHE_LINE_LEN == 0);

/// Hardware operations every timing measurement is built on.
///
/// Implementations must pin the order of memory operations around `now`:
/// a timestamp may not be taken before earlier loads have completed.
pub trait TimingPrimitives: Debug {
    /// Monotonic cycle count, ordered with the surrounding memory accesses.
    fn now(&self) -> u64;
    /// No memory operation crosses this point, in either direction.
    fn barrier_full(&self);
    /// No later instruction starts before the earlier ones retire.
    fn barrier_instruction(&self);
    /// Remove the line containing `p` from every cache level.
    ///
    /// # Safety
    ///
    /// p must be a valid pointer.
    unsafe fn evict(&self, p: *const u8);
    /// Load the byte at `p`. The load is never elided.
    ///
    /// # Safety
    ///
    /// p must be a valid pointer to read.
    unsafe fn touch(&self, p: *const u8) -> u8;
}

pub unsafe fn maccess<T>(p: *const T) -> T {
    unsafe { ptr::read_volatile(p) }
}

#[cfg(target_arch = "x86_64")]
mod arch {
    use core::arch::x86_64 as arch_x86;

    // rdtsc no fence
    pub fn rdtsc_nofence() -> u64 {
        unsafe { arch_x86::_rdtsc() }
    }

    // rdtsc (has mfence before and after)
    pub fn rdtsc_fence() -> u64 {
        unsafe {
            arch_x86::_mm_mfence();
            let tsc: u64 = arch_x86::_rdtsc();
            arch_x86::_mm_mfence();
            tsc
        }
    }

    pub fn mfence() {
        unsafe { arch_x86::_mm_mfence() }
    }

    pub fn ifence() {
        unsafe { arch_x86::_mm_lfence() }
    }

    // flush (cflush)
    pub unsafe fn flush(p: *const u8) {
        unsafe { arch_x86::_mm_clflush(p) }
    }
}

#[cfg(target_arch = "aarch64")]
mod arch {
    use core::arch::asm;

    // PMU cycle counter. EL0 access must be enabled by the kernel (PMUSERENR_EL0).
    #[cfg(not(feature = "generic_timer"))]
    pub fn rdtsc_nofence() -> u64 {
        let t: u64;
        unsafe { asm!("mrs {t}, pmccntr_el0", t = out(reg) t, options(nomem, nostack)) };
        t
    }

    // Generic timer, tens of MHz: too coarse to tell a hit from a miss on most cores.
    #[cfg(feature = "generic_timer")]
    pub fn rdtsc_nofence() -> u64 {
        let t: u64;
        unsafe { asm!("mrs {t}, cntvct_el0", t = out(reg) t, options(nomem, nostack)) };
        t
    }

    // dsb + isb on both sides, so that no load straddles the read.
    pub fn rdtsc_fence() -> u64 {
        mfence();
        ifence();
        let t = rdtsc_nofence();
        ifence();
        t
    }

    pub fn mfence() {
        unsafe { asm!("dsb sy", options(nostack, preserves_flags)) };
    }

    pub fn ifence() {
        unsafe { asm!("isb", options(nostack, preserves_flags)) };
    }

    // flush (dc civac), clean and invalidate to the point of coherency
    pub unsafe fn flush(p: *const u8) {
        unsafe { asm!("dc civac, {p}", p = in(reg) p, options(nostack, preserves_flags)) };
    }
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub use arch::{flush, ifence, mfence, rdtsc_fence, rdtsc_nofence};

/// The real thing: cycle counter, fences and cache maintenance of the host core.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct HardwarePrimitives;

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
impl TimingPrimitives for HardwarePrimitives {
    #[inline(always)]
    fn now(&self) -> u64 {
        rdtsc_fence()
    }

    #[inline(always)]
    fn barrier_full(&self) {
        mfence();
    }

    #[inline(always)]
    fn barrier_instruction(&self) {
        ifence();
    }

    #[inline(always)]
    unsafe fn evict(&self, p: *const u8) {
        unsafe { flush(p) }
    }

    #[inline(always)]
    unsafe fn touch(&self, p: *const u8) -> u8 {
        unsafe { maccess(p) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn hardware_clock_is_monotonic() {
        let p = HardwarePrimitives;
        let a = p.now();
        let b = p.now();
        assert!(b >= a);
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn touch_after_evict_reads_memory() {
        let p = HardwarePrimitives;
        let data = [42u8; CACHE_LINE_LEN];
        unsafe {
            p.evict(&data[0]);
            p.barrier_full();
            assert_eq!(p.touch(&data[0]), 42);
        }
    }
}
