//! A deterministic cache model implementing [`TimingPrimitives`].
//!
//! Time is a virtual cycle counter advanced only by loads: a load of a resident
//! line costs `hit_latency`, any other load costs `miss_latency` and brings the
//! line in. Nothing is ever evicted behind the caller's back.

use crate::{maccess, TimingPrimitives, CACHE_LINE_LEN};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;

pub const DEFAULT_HIT_LATENCY: u64 = 10;
pub const DEFAULT_MISS_LATENCY: u64 = 100;

#[derive(Debug)]
pub struct SimulatedCache {
    hit_latency: u64,
    miss_latency: u64,
    clock: Cell<u64>,
    resident: RefCell<HashSet<usize>>,
}

impl SimulatedCache {
    pub fn new(hit_latency: u64, miss_latency: u64) -> Self {
        Self {
            hit_latency,
            miss_latency,
            clock: Cell::new(0),
            resident: RefCell::new(HashSet::new()),
        }
    }

    pub fn hit_latency(&self) -> u64 {
        self.hit_latency
    }

    pub fn miss_latency(&self) -> u64 {
        self.miss_latency
    }

    pub fn is_resident(&self, p: *const u8) -> bool {
        self.resident.borrow().contains(&line_of(p))
    }
}

impl Default for SimulatedCache {
    fn default() -> Self {
        Self::new(DEFAULT_HIT_LATENCY, DEFAULT_MISS_LATENCY)
    }
}

fn line_of(p: *const u8) -> usize {
    p as usize & !(CACHE_LINE_LEN - 1)
}

impl TimingPrimitives for SimulatedCache {
    fn now(&self) -> u64 {
        self.clock.get()
    }

    fn barrier_full(&self) {}

    fn barrier_instruction(&self) {}

    unsafe fn evict(&self, p: *const u8) {
        self.resident.borrow_mut().remove(&line_of(p));
    }

    unsafe fn touch(&self, p: *const u8) -> u8 {
        let latency = if self.resident.borrow_mut().insert(line_of(p)) {
            self.miss_latency
        } else {
            self.hit_latency
        };
        self.clock.set(self.clock.get() + latency);
        unsafe { maccess(p) }
    }
}
