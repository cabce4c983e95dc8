use crate::memory::VictimMemory;
use cache_side_channel::ProbeArray;
use cache_utils::TimingPrimitives;
use core::hint::black_box;
use core::ptr;

/// How the bounds check is computed.
///
/// A slow comparison widens the window between the branch being predicted
/// and its condition being known.
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComparisonDelay {
    /// `index < bound`
    Integer,
    /// `index as f32 / bound as f32 < 1`
    #[default]
    FloatDivision,
    /// `index as f64 / bound as f64 < 1`
    DoubleDivision,
}

impl ComparisonDelay {
    #[inline(always)]
    pub fn in_bounds(&self, index: usize, bound: usize) -> bool {
        match self {
            ComparisonDelay::Integer => index < bound,
            ComparisonDelay::FloatDivision => (index as f32) / (bound as f32) < 1.0,
            ComparisonDelay::DoubleDivision => (index as f64) / (bound as f64) < 1.0,
        }
    }
}

/// A function guarded by a bounds check, whose body indexes the probe array
/// with the byte it reads.
pub trait Victim {
    /// Run the victim once on `index`.
    ///
    /// Returns the byte read through the probe array when the index is in
    /// bounds, something meaningless otherwise. Callers accumulate the result
    /// so that the loads cannot be optimised away.
    fn call<P: TimingPrimitives>(
        &mut self,
        primitives: &P,
        memory: &VictimMemory,
        probe: &ProbeArray,
        index: usize,
    ) -> u8;
}

/// The real gadget: the bound and the index are flushed before the check, so
/// the branch resolves late and the body runs speculatively on the predicted path.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundsCheckVictim {
    pub delay: ComparisonDelay,
}

impl BoundsCheckVictim {
    pub fn new(delay: ComparisonDelay) -> Self {
        BoundsCheckVictim { delay }
    }
}

impl Victim for BoundsCheckVictim {
    #[inline(never)]
    fn call<P: TimingPrimitives>(
        &mut self,
        primitives: &P,
        memory: &VictimMemory,
        probe: &ProbeArray,
        index: usize,
    ) -> u8 {
        // The index needs an address of its own to be flushed.
        let slot = black_box(index);
        primitives.barrier_full();
        unsafe {
            primitives.evict(memory.bound_ptr());
            primitives.evict(&slot as *const usize as *const u8);
        }
        primitives.barrier_full();
        primitives.barrier_instruction();

        let index = unsafe { ptr::read_volatile(&slot) };
        if self.delay.in_bounds(index, memory.bound()) {
            let value = memory.bytes()[index];
            unsafe { primitives.touch(probe.line(value)) }
        } else {
            0
        }
    }
}

/// A victim that emulates a two-bit saturating predictor in software.
///
/// The counter starts at "strongly not taken". The body runs whenever the
/// index is in bounds or the counter predicts it is. Transient executions
/// leave their probe line in the cache but return nothing, like a squashed
/// path. Paired with [`cache_utils::simulated::SimulatedCache`], this gives a
/// fully deterministic rendition of the attack.
#[derive(Debug, Clone, Default)]
pub struct SimulatedVictim {
    counter: u8,
    no_speculation: bool,
}

impl SimulatedVictim {
    pub fn new() -> Self {
        Self::default()
    }

    /// A core that never executes past an unresolved branch.
    pub fn without_speculation() -> Self {
        SimulatedVictim {
            counter: 0,
            no_speculation: true,
        }
    }

    pub fn predicts_in_bounds(&self) -> bool {
        !self.no_speculation && self.counter >= 2
    }

    fn update(&mut self, in_bounds: bool) {
        self.counter = if in_bounds {
            (self.counter + 1).min(3)
        } else {
            self.counter.saturating_sub(1)
        };
    }
}

impl Victim for SimulatedVictim {
    fn call<P: TimingPrimitives>(
        &mut self,
        primitives: &P,
        memory: &VictimMemory,
        probe: &ProbeArray,
        index: usize,
    ) -> u8 {
        let in_bounds = index < memory.bound();
        let mut read = 0;
        if in_bounds || self.predicts_in_bounds() {
            // Past the allocation a real core would fault or read garbage.
            if let Some(value) = memory.byte(index) {
                read = unsafe { primitives.touch(probe.line(value)) };
            }
        }
        self.update(in_bounds);
        if in_bounds {
            read
        } else {
            0
        }
    }
}
