use cache_side_channel::{CacheStatus, ProbeArray, ProbeOrder, Threshold};
use cache_utils::calibration::only_reload;
use cache_utils::TimingPrimitives;

/// Flush+Reload over the lines of a [`ProbeArray`], with a single global threshold.
#[derive(Debug, Clone, Copy)]
pub struct NaiveFlushAndReload {
    pub threshold: Threshold,
    order: ProbeOrder,
}

impl NaiveFlushAndReload {
    pub fn from_threshold(threshold: Threshold) -> Self {
        NaiveFlushAndReload {
            threshold,
            order: ProbeOrder::default(),
        }
    }

    pub fn with_order(mut self, order: ProbeOrder) -> Self {
        self.order = order;
        self
    }

    pub fn order(&self) -> ProbeOrder {
        self.order
    }

    /// Evict every line of the array.
    ///
    /// Each flush is fenced on its own: some cores do not complete a batch of
    /// unfenced flushes before the following loads start.
    pub fn prepare<P: TimingPrimitives + ?Sized>(&self, primitives: &P, array: &ProbeArray) {
        for line in array.lines() {
            unsafe { primitives.evict(line) };
            primitives.barrier_full();
            primitives.barrier_instruction();
        }
    }

    /// # Safety
    ///
    /// addr must be a valid pointer to read.
    pub unsafe fn test_single<P: TimingPrimitives + ?Sized>(
        &self,
        primitives: &P,
        addr: *const u8,
    ) -> CacheStatus {
        let t = unsafe { only_reload(primitives, addr) };
        self.threshold.classify(t)
    }

    /// Reload every line in probe order, reporting the byte value of each hit.
    pub fn probe<P: TimingPrimitives + ?Sized>(
        &self,
        primitives: &P,
        array: &ProbeArray,
        mut on_hit: impl FnMut(u8),
    ) {
        for value in self.order.iter() {
            if unsafe { self.test_single(primitives, array.line(value)) } == CacheStatus::Hit {
                on_hit(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache_side_channel::probe::DEFAULT_STRIDE;
    use cache_utils::simulated::SimulatedCache;

    fn channel() -> NaiveFlushAndReload {
        NaiveFlushAndReload::from_threshold(Threshold::new(50))
    }

    #[test]
    fn only_touched_lines_hit() {
        let cache = SimulatedCache::new(10, 100);
        let array = ProbeArray::new(DEFAULT_STRIDE).unwrap();
        let channel = channel();
        channel.prepare(&cache, &array);
        unsafe {
            cache.touch(array.line(42));
            cache.touch(array.line(200));
        }
        let mut hits = Vec::new();
        channel.probe(&cache, &array, |v| hits.push(v));
        hits.sort();
        assert_eq!(hits, vec![42, 200]);
    }

    #[test]
    fn prepare_evicts_everything() {
        let cache = SimulatedCache::new(10, 100);
        let array = ProbeArray::new(DEFAULT_STRIDE).unwrap();
        for line in array.lines() {
            unsafe { cache.touch(line) };
        }
        channel().prepare(&cache, &array);
        assert!(array.lines().all(|line| !cache.is_resident(line)));
    }

    #[test]
    fn probe_follows_order() {
        let cache = SimulatedCache::new(10, 100);
        let array = ProbeArray::new(DEFAULT_STRIDE).unwrap();
        for line in array.lines() {
            unsafe { cache.touch(line) };
        }
        let channel = channel();
        let mut seen = Vec::new();
        channel.probe(&cache, &array, |v| seen.push(v));
        let expected: Vec<u8> = channel.order().iter().collect();
        assert_eq!(seen, expected);
    }
}
