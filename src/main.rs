use cache_side_channel::Threshold;
use cache_utils::environment::ExecutionEnvironment;
use cache_utils::simulated::SimulatedCache;
use cache_utils::TimingPrimitives;
use clap::Parser;
use log::{error, info};
use spectre_pht::{AttackEngine, SimulatedVictim, Victim};
use srt::{run_experiments, Backend, HarnessConfig, HarnessError, Parameters};
use std::io;
use std::process::ExitCode;

// Replaced before the first round, by the fixed or the calibrated value.
const INITIAL_THRESHOLD: Threshold = Threshold { value: 0 };

fn run<P: TimingPrimitives, V: Victim>(
    mut engine: AttackEngine<P, V>,
    parameters: &Parameters,
    config: &HarnessConfig,
) -> Result<(), HarnessError> {
    engine.set_probe_order(parameters.probe_order());
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_experiments(&mut engine, config, &mut out)?;
    Ok(())
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn run_on_hardware(parameters: &Parameters, config: &HarnessConfig) -> Result<(), HarnessError> {
    use cache_utils::HardwarePrimitives;
    use spectre_pht::BoundsCheckVictim;

    let engine = AttackEngine::new(
        HardwarePrimitives,
        BoundsCheckVictim::new(parameters.delay),
        parameters.secret.as_bytes(),
        parameters.stride,
        INITIAL_THRESHOLD,
    )?;
    run(engine, parameters, config)
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn run_on_hardware(_parameters: &Parameters, _config: &HarnessConfig) -> Result<(), HarnessError> {
    Err(HarnessError::UnsupportedArchitecture)
}

fn run_on_model(parameters: &Parameters, config: &HarnessConfig) -> Result<(), HarnessError> {
    let engine = AttackEngine::new(
        SimulatedCache::default(),
        SimulatedVictim::new(),
        parameters.secret.as_bytes(),
        parameters.stride,
        INITIAL_THRESHOLD,
    )?;
    run(engine, parameters, config)
}

fn main() -> ExitCode {
    let parameters = Parameters::parse();
    env_logger::Builder::new()
        .filter_level(parameters.log_level())
        .parse_default_env()
        .init();

    let environment = ExecutionEnvironment::from_env();
    let config = HarnessConfig::new(&parameters, environment);
    info!("{:?} backend, {:?} environment", parameters.backend, environment);

    let result = match parameters.backend {
        Backend::Hardware => run_on_hardware(&parameters, &config),
        Backend::Model => run_on_model(&parameters, &config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
