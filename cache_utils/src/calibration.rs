use crate::TimingPrimitives;
use core::num::NonZeroUsize;
use log::{debug, warn};

// Timing of single accesses. The caller is responsible for the state of the line.

pub unsafe fn only_reload<P: TimingPrimitives + ?Sized>(primitives: &P, p: *const u8) -> u64 {
    let t = primitives.now();
    unsafe { primitives.touch(p) };
    primitives.now() - t
}

/// Time a load of `p`, then evict it so the next load misses.
pub unsafe fn reload_and_flush<P: TimingPrimitives + ?Sized>(primitives: &P, p: *const u8) -> u64 {
    let d = unsafe { only_reload(primitives, p) };
    primitives.barrier_full();
    unsafe { primitives.evict(p) };
    d
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub hit_mean: u64,
    pub miss_mean: u64,
    pub threshold: u64,
}

impl Calibration {
    /// The clock could not tell a flushed line from a cached one.
    pub fn is_degenerate(&self) -> bool {
        self.miss_mean <= self.hit_mean
    }
}

/// Place the hit/miss boundary a third of the way from the hit mean to the miss mean.
pub fn threshold_from_means(hit_mean: u64, miss_mean: u64) -> u64 {
    (miss_mean + 2 * hit_mean) / 3
}

/// Measure the mean reload latency of a cached line and of a flushed line.
pub fn calibrate<P: TimingPrimitives + ?Sized>(primitives: &P, samples: NonZeroUsize) -> Calibration {
    // Throwaway data, one line of it is the target.
    let dummy: [usize; 16] = core::array::from_fn(|i| i);
    let pointer = &dummy[8] as *const usize as *const u8;

    let mut reload_time = 0u64;
    let mut flush_reload_time = 0u64;

    unsafe { primitives.touch(pointer) };
    for _ in 0..samples.get() {
        reload_time += unsafe { only_reload(primitives, pointer) };
    }
    for _ in 0..samples.get() {
        flush_reload_time += unsafe { reload_and_flush(primitives, pointer) };
    }

    let hit_mean = reload_time / samples.get() as u64;
    let miss_mean = flush_reload_time / samples.get() as u64;
    let threshold = threshold_from_means(hit_mean, miss_mean);
    debug!(
        "calibration over {} samples: hit {} miss {} threshold {}",
        samples, hit_mean, miss_mean, threshold
    );
    let calibration = Calibration {
        hit_mean,
        miss_mean,
        threshold,
    };
    if calibration.is_degenerate() {
        warn!(
            "hit and miss are indistinguishable (hit {} miss {}), the clock is too coarse",
            hit_mean, miss_mean
        );
    }
    calibration
}

pub fn calibrate_threshold<P: TimingPrimitives + ?Sized>(primitives: &P, samples: NonZeroUsize) -> u64 {
    calibrate(primitives, samples).threshold
}
