//! Spectre PHT-SA-IP: the pattern history table is trained in the same
//! address space, on the very branch that is later exploited.
//!
//! A bounds check is trained to predict "in bounds", then called with an
//! out-of-bounds index. The transiently loaded byte selects one line of a
//! probe array, which Flush+Reload recovers afterwards.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod engine;
pub mod memory;
pub mod select;
pub mod tally;
pub mod victim;

pub use engine::{AttackEngine, AttackParams, GuessResult};
pub use memory::VictimMemory;
pub use victim::{BoundsCheckVictim, ComparisonDelay, SimulatedVictim, Victim};

use cache_side_channel::ProbeArrayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Probe(#[from] ProbeArrayError),
    #[error("the secret must contain at least one byte")]
    EmptySecret,
}
