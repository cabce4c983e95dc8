//! Spectre Research Toolkit: runs the PHT-SA-IP attack against a planted
//! secret and reports one line of statistics per repetition.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod args;
pub mod harness;
pub mod report;
pub mod util;

pub use args::{Backend, Parameters};
pub use harness::{run_experiments, HarnessConfig};
pub use report::ExperimentRecord;

use spectre_pht::EngineError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to set up the attack: {0}")]
    Engine(#[from] EngineError),
    #[error("no timing primitives for this architecture, use the model backend")]
    UnsupportedArchitecture,
    #[error("failed to write results: {0}")]
    Io(#[from] io::Error),
}
