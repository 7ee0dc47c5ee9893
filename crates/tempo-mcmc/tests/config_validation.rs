use tempo_mcmc::{HeatLadder, PowerMode, RunConfig, SamplerKind, ScheduleKind, SwapMode};

#[test]
fn minimal_document_uses_defaults() {
    let config = RunConfig::from_yaml_str("generations: 500\n").unwrap();
    assert_eq!(config.generations, 500);
    assert_eq!(config.tuning_interval, 100);
    assert_eq!(config.schedule, ScheduleKind::Random);
    assert_eq!(config.sampler, SamplerKind::Mcmc);
    assert_eq!(config.mc3.chains, 4);
    assert_eq!(config.mc3.ladder, HeatLadder::Incremental { delta: 0.2 });
    assert_eq!(config.power.mode, PowerMode::Adaptive);
    assert_eq!(config.power.sample_freq, 100);
    assert_eq!(config.power.cats, 50);
    config.validate().unwrap();
}

#[test]
fn nested_sections_parse() {
    let yaml = r#"
generations: 2000
burn_in: 500
schedule: sequential
sampler: mcmcmc
mc3:
  chains: 3
  swap_mode: both
  swap_interval2: 10
  ladder:
    type: manual
    heats: [1.0, 0.6, 0.3]
power:
  mode: fixed
  powers: [1.0, 0.5, 0.0]
  sample_freq: 10
  filename: out/ml.txt
seed_policy:
  master_seed: 99
  label: replicate-a
"#;
    let config = RunConfig::from_yaml_str(yaml).unwrap();
    assert_eq!(config.schedule, ScheduleKind::Sequential);
    assert_eq!(config.mc3.swap_mode, SwapMode::Both);
    assert_eq!(config.mc3.swap_interval, 1);
    assert_eq!(config.mc3.swap_interval2, 10);
    assert_eq!(config.seed_policy.master_seed, 99);
    config.validate_power().unwrap();
    let reparsed = RunConfig::from_yaml_str(&config.to_yaml().unwrap()).unwrap();
    assert_eq!(reparsed, config);
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let err = RunConfig::from_yaml_str("generations: [").unwrap_err();
    assert_eq!(err.info().code, "config-parse");
    let err = RunConfig::from_yaml_str("generations: 10\nschedule: shuffled\n").unwrap_err();
    assert_eq!(err.info().code, "config-parse");
}

#[test]
fn manual_ladder_must_match_the_chain_count() {
    let yaml = "generations: 10\nsampler: mcmcmc\nmc3:\n  chains: 4\n  ladder:\n    type: manual\n    heats: [1.0, 0.5]\n";
    let err = RunConfig::from_yaml_str(yaml).unwrap().validate().unwrap_err();
    assert_eq!(err.info().code, "invalid-heat-ladder");
}

#[test]
fn power_checks_run_before_sampling() {
    let mut config = RunConfig::from_yaml_str("generations: 50\n").unwrap();
    let err = config.validate_power().unwrap_err();
    assert_eq!(err.info().code, "sample-freq-exceeds-generations");

    config.power.sample_freq = 10;
    config.power.filename = "powp".into();
    let err = config.validate_power().unwrap_err();
    assert_eq!(err.info().code, "missing-extension");

    config.power.filename = "powp.out".into();
    config.validate_power().unwrap();
}

#[test]
fn zero_generations_is_rejected() {
    let err = RunConfig::from_yaml_str("generations: 0\n")
        .unwrap()
        .validate()
        .unwrap_err();
    assert_eq!(err.info().code, "invalid-config");
    assert_eq!(
        err.info().context.get("field").map(String::as_str),
        Some("generations")
    );
}

#[test]
fn explicit_powers_must_include_both_endpoints() {
    let yaml = "generations: 50\npower:\n  mode: fixed\n  sample_freq: 5\n  powers: [0.9, 0.1]\n";
    let err = RunConfig::from_yaml_str(yaml)
        .unwrap()
        .validate_power()
        .unwrap_err();
    assert_eq!(err.info().code, "invalid-config");
    assert_eq!(
        err.info().context.get("field").map(String::as_str),
        Some("power.powers")
    );
}
