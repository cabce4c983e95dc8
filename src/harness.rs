use crate::args::{Backend, Parameters};
use crate::report::{ExperimentRecord, HEADER};
use crate::util::printable;
use crate::HarnessError;
use cache_side_channel::Threshold;
use cache_utils::environment::ExecutionEnvironment;
use cache_utils::TimingPrimitives;
use core::num::NonZeroUsize;
use log::{debug, error, info};
use perf_counters::{PerfCounters, PerfEventSource};
use spectre_pht::{AttackEngine, AttackParams, GuessResult, Victim};
use std::io::Write;

/// Everything the repetition loop needs besides the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessConfig {
    pub meta: u32,
    pub attack: AttackParams,
    /// Fixed threshold, or `None` to calibrate at every repetition.
    pub cache_threshold: Option<u64>,
    pub calibration_samples: NonZeroUsize,
    /// Counters to engage around each repetition, if any.
    pub counters: Option<PerfEventSource>,
    pub quiet: bool,
}

impl HarnessConfig {
    /// Counters are only engaged on real hardware.
    pub fn new(parameters: &Parameters, environment: ExecutionEnvironment) -> Self {
        let engage_counters =
            !environment.is_simulated() && parameters.backend == Backend::Hardware;
        HarnessConfig {
            meta: parameters.meta,
            attack: parameters.attack_params(),
            cache_threshold: parameters.cache_threshold,
            calibration_samples: environment.calibration_samples(),
            counters: engage_counters.then(|| parameters.perf_event_source()),
            quiet: parameters.quiet,
        }
    }
}

fn start_counters(source: PerfEventSource) -> Option<PerfCounters> {
    match PerfCounters::init(source) {
        Ok(counters) => Some(counters),
        Err(e) => {
            error!("{}, counting nothing", e);
            None
        }
    }
}

fn stop_counters(mut counters: PerfCounters) -> (u64, u64) {
    let cache_misses = counters.read_cache_misses().unwrap_or_else(|e| {
        error!("{}", e);
        0
    });
    let branch_misses = counters.read_branch_misses().unwrap_or_else(|e| {
        error!("{}", e);
        0
    });
    counters.close();
    (cache_misses, branch_misses)
}

/// Run `config.meta` repetitions of the attack over the whole secret,
/// writing the CSV header (unless quiet) and one line per repetition to `out`.
pub fn run_experiments<P, V, W>(
    engine: &mut AttackEngine<P, V>,
    config: &HarnessConfig,
    out: &mut W,
) -> Result<Vec<ExperimentRecord>, HarnessError>
where
    P: TimingPrimitives,
    V: Victim,
    W: Write,
{
    if !config.quiet {
        writeln!(out, "{}", HEADER)?;
        out.flush()?;
    }

    let mut records = Vec::with_capacity(config.meta as usize);
    for meta in 0..config.meta {
        let threshold = match config.cache_threshold {
            Some(value) => {
                engine.set_threshold(Threshold::new(value));
                engine.threshold()
            }
            None => engine.calibrate(config.calibration_samples),
        };
        debug!("repetition {}: threshold {}", meta, threshold);

        engine.refresh_probe_array();
        let counters = config.counters.and_then(start_counters);

        let start = engine.primitives().now();
        let mut guesses: Vec<GuessResult> = Vec::with_capacity(engine.memory().secret_len());
        for offset in engine.memory().target_offsets() {
            let guess = engine.attack_one_offset(offset, config.attack);
            info!(
                "offset {}: {:#04x}='{}' score {}",
                offset,
                guess.value,
                printable(guess.value),
                guess.score
            );
            guesses.push(guess);
        }
        let end = engine.primitives().now();

        let (cache_misses, branch_misses) = counters.map(stop_counters).unwrap_or((0, 0));

        let record = ExperimentRecord::from_guesses(
            engine.memory().secret(),
            &guesses,
            end.saturating_sub(start),
            cache_misses,
            branch_misses,
        );
        writeln!(out, "{}", record)?;
        out.flush()?;
        records.push(record);
    }
    debug!("sink {:#04x}", engine.sink());
    Ok(records)
}
