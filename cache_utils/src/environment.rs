use core::num::NonZeroUsize;
use std::ffi::OsStr;

/// Name of the variable a full-system simulator run script sets.
pub const SIMULATION_VARIABLE: &str = "GEM5_SIM";

const HARDWARE_SAMPLES: NonZeroUsize = match NonZeroUsize::new(100_000) {
    Some(n) => n,
    None => unreachable!(),
};
const SIMULATED_SAMPLES: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(n) => n,
    None => unreachable!(),
};

/// Where the measurements are taken.
///
/// A cycle-accurate simulator is deterministic, so a handful of calibration
/// samples is enough there, and it exposes no usable performance counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionEnvironment {
    Hardware,
    Simulated,
}

impl ExecutionEnvironment {
    pub fn from_env() -> Self {
        Self::from_value(std::env::var_os(SIMULATION_VARIABLE).as_deref())
    }

    /// Simulated iff the variable is set to anything but `false`.
    pub fn from_value(value: Option<&OsStr>) -> Self {
        match value {
            Some(v) if v != "false" => ExecutionEnvironment::Simulated,
            _ => ExecutionEnvironment::Hardware,
        }
    }

    pub fn is_simulated(&self) -> bool {
        *self == ExecutionEnvironment::Simulated
    }

    pub fn calibration_samples(&self) -> NonZeroUsize {
        match self {
            ExecutionEnvironment::Hardware => HARDWARE_SAMPLES,
            ExecutionEnvironment::Simulated => SIMULATED_SAMPLES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_values() {
        assert_eq!(ExecutionEnvironment::from_value(None), ExecutionEnvironment::Hardware);
        assert_eq!(
            ExecutionEnvironment::from_value(Some(OsStr::new("false"))),
            ExecutionEnvironment::Hardware
        );
        assert_eq!(
            ExecutionEnvironment::from_value(Some(OsStr::new("true"))),
            ExecutionEnvironment::Simulated
        );
        assert_eq!(
            ExecutionEnvironment::from_value(Some(OsStr::new(""))),
            ExecutionEnvironment::Simulated
        );
    }

    #[test]
    fn sample_counts() {
        assert_eq!(ExecutionEnvironment::Simulated.calibration_samples().get(), 10);
        assert_eq!(ExecutionEnvironment::Hardware.calibration_samples().get(), 100_000);
    }
}
