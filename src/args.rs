use cache_side_channel::probe::DEFAULT_STRIDE;
use cache_utils::CACHE_LINE_LEN;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use perf_counters::PerfEventSource;
use cache_side_channel::ProbeOrder;
use spectre_pht::memory::DEFAULT_SECRET;
use spectre_pht::{AttackParams, ComparisonDelay};

/// What the attack runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Backend {
    /// The host core: cycle counter, fences, cache flushes and a real bounds check
    #[default]
    Hardware,
    /// A deterministic cache and branch predictor model, runnable anywhere
    Model,
}

/// Spectre PHT-SA-IP: leak a planted secret through a mistrained bounds check
#[derive(Parser, Debug, Clone)]
#[command(name = "srt")]
#[command(version)]
pub struct Parameters {
    /// Maximum number of rounds spent on each secret byte
    #[arg(short, long, default_value_t = 999, value_parser = clap::value_parser!(u32).range(1..))]
    pub tries: u32,

    /// Victim calls per round, minus one; every sixth call attacks
    #[arg(short, long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
    pub loops: u32,

    /// Number of times the whole experiment is repeated
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub meta: u32,

    /// Cache hit threshold in cycles, calibrated at every repetition when absent
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub cache_threshold: Option<u64>,

    /// Log every recovered byte and the calibration results
    #[arg(short, long)]
    pub verbose: bool,

    /// Do not print the CSV header
    #[arg(short, long, short_alias = 's', alias = "silent")]
    pub quiet: bool,

    /// Bytes between two probe lines
    #[arg(long, default_value_t = DEFAULT_STRIDE, value_parser = parse_stride)]
    pub stride: usize,

    /// Secret planted behind the legitimate array
    #[arg(long, default_value = DEFAULT_SECRET)]
    pub secret: String,

    /// How the victim's bounds check is slowed down
    #[arg(long, value_enum, default_value_t)]
    pub delay: ComparisonDelay,

    #[arg(long, value_enum, default_value_t)]
    pub backend: Backend,

    /// Count raw PMU events 0x33 and 0x10 instead of the generic hardware events
    #[arg(long)]
    pub raw_pmu_events: bool,

    /// Lines are probed in the order `i * multiplier + increment mod 256`; must be odd
    #[arg(long, default_value_t = 167, value_parser = parse_multiplier)]
    pub probe_multiplier: u8,

    #[arg(long, default_value_t = 13)]
    pub probe_increment: u8,
}

fn parse_multiplier(s: &str) -> Result<u8, String> {
    let multiplier: u8 = s.parse().map_err(|e| format!("{}", e))?;
    ProbeOrder::new(multiplier, 0)
        .map(|_| multiplier)
        .ok_or_else(|| "must be odd".to_string())
}

fn parse_stride(s: &str) -> Result<usize, String> {
    let stride: usize = s.parse().map_err(|e| format!("{}", e))?;
    if stride == 0 || stride % CACHE_LINE_LEN != 0 {
        return Err(format!("must be a non-zero multiple of {}", CACHE_LINE_LEN));
    }
    Ok(stride)
}

impl Parameters {
    pub fn attack_params(&self) -> AttackParams {
        AttackParams {
            max_rounds: self.tries,
            loops_per_round: self.loops,
        }
    }

    pub fn perf_event_source(&self) -> PerfEventSource {
        if self.raw_pmu_events {
            PerfEventSource::Raw
        } else {
            PerfEventSource::Hardware
        }
    }

    pub fn probe_order(&self) -> ProbeOrder {
        ProbeOrder::new(self.probe_multiplier, self.probe_increment).unwrap_or_default()
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        }
    }
}
