use cache_side_channel::Threshold;
use cache_utils::environment::ExecutionEnvironment;
use cache_utils::simulated::SimulatedCache;
use clap::Parser;
use spectre_pht::{AttackEngine, SimulatedVictim};
use srt::report::HEADER;
use srt::{run_experiments, ExperimentRecord, HarnessConfig, Parameters};

fn parameters(args: &[&str]) -> Parameters {
    Parameters::try_parse_from(
        ["srt", "--backend", "model"]
            .iter()
            .chain(args.iter())
            .copied(),
    )
    .unwrap()
}

fn model_engine(parameters: &Parameters) -> AttackEngine<SimulatedCache, SimulatedVictim> {
    let mut engine = AttackEngine::new(
        SimulatedCache::default(),
        SimulatedVictim::new(),
        parameters.secret.as_bytes(),
        parameters.stride,
        Threshold::new(0),
    )
    .unwrap();
    engine.set_probe_order(parameters.probe_order());
    engine
}

fn run(args: &[&str]) -> (Vec<ExperimentRecord>, String) {
    let parameters = parameters(args);
    let config = HarnessConfig::new(&parameters, ExecutionEnvironment::Simulated);
    let mut engine = model_engine(&parameters);
    let mut out = Vec::new();
    let records = run_experiments(&mut engine, &config, &mut out).unwrap();
    (records, String::from_utf8(out).unwrap())
}

#[test]
fn two_byte_secret_is_recovered() {
    let (records, output) = run(&["--secret", "AB", "-t", "50", "-l", "30"]);
    assert_eq!(records.len(), 1);
    let record = records[0];
    assert_eq!(record.total_bytes, 2);
    assert_eq!(record.correct_bytes, 2);
    assert!(record.score_sum > 0);
    assert_eq!(record.cache_misses, 0);
    assert_eq!(record.branch_misses, 0);
    assert!(record.elapsed_cycles > 0);

    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines, vec![HEADER.to_string(), record.csv()]);
}

#[test]
fn recovered_with_any_probe_order_and_stride() {
    let (records, _) = run(&[
        "--secret",
        "AB",
        "-q",
        "--probe-multiplier",
        "1",
        "--probe-increment",
        "0",
        "--stride",
        "256",
    ]);
    assert_eq!(records[0].correct_bytes, 2);
}

#[test]
fn default_secret_is_recovered() {
    let (records, _) = run(&["-q"]);
    let secret = spectre_pht::memory::DEFAULT_SECRET;
    assert_eq!(records[0].total_bytes, secret.len());
    assert_eq!(records[0].correct_bytes, secret.len());
}

#[test]
fn header_written_once() {
    let (records, output) = run(&["--secret", "AB", "-t", "50", "-m", "3"]);
    assert_eq!(records.len(), 3);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines.iter().filter(|l| **l == HEADER).count(), 1);
    assert_eq!(lines[0], HEADER);
    // The model is deterministic, so are the results.
    assert!(records.iter().all(|r| r.correct_bytes == 2));
}

#[test]
fn quiet_has_no_header() {
    let (records, output) = run(&["--secret", "AB", "-q", "-m", "2"]);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| *l != HEADER));
    assert_eq!(lines[1], records[1].csv());
}

#[test]
fn fixed_threshold_bypasses_calibration() {
    let (fixed, _) = run(&["--secret", "AB", "-q", "-c", "50"]);
    assert_eq!(fixed[0].correct_bytes, 2);

    // Below the hit latency of the model, nothing is ever a hit.
    let (blind, _) = run(&["--secret", "AB", "-q", "-c", "5", "-t", "4"]);
    assert_eq!(blind[0].score_sum, 0);
}

#[test]
fn counters_stay_off_outside_hardware() {
    let parameters = parameters(&[]);
    let config = HarnessConfig::new(&parameters, ExecutionEnvironment::Hardware);
    assert_eq!(config.counters, None);

    let hardware = Parameters::try_parse_from(["srt"]).unwrap();
    assert!(HarnessConfig::new(&hardware, ExecutionEnvironment::Simulated)
        .counters
        .is_none());
    assert!(HarnessConfig::new(&hardware, ExecutionEnvironment::Hardware)
        .counters
        .is_some());
}

#[test]
fn simulated_environment_calibrates_quickly() {
    let config = HarnessConfig::new(&parameters(&[]), ExecutionEnvironment::Simulated);
    assert_eq!(config.calibration_samples.get(), 10);
}
