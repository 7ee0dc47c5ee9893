use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::tempdir;

const MODEL: &str = "\
model:
  prior_mean: 0.0
  prior_sd: 1.0
  sigma: 1.0
  observations: [0.4, -0.2, 0.9, 0.1, 0.6]
moves:
  - kind: gibbs
";

fn tempo_sim(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tempo-sim"))
        .args(args)
        .output()
        .unwrap()
}

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path.display().to_string()
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn mcmc_writes_trace_summary_and_manifest() {
    let dir = tempdir().unwrap();
    let config = write(
        dir.path(),
        "run.yaml",
        "generations: 200\nburn_in: 50\ntuning_interval: 25\nsampler: mcmcmc\noutput:\n  print_interval: 10\n",
    );
    let model = write(
        dir.path(),
        "model.yaml",
        "model:\n  prior_mean: 1.0\n  prior_sd: 2.0\n  sigma: 1.0\n  observations: [2.1, 1.7, 2.6]\n",
    );
    let out = dir.path().join("run");
    let output = tempo_sim(&[
        "mcmc",
        "--config",
        &config,
        "--model",
        &model,
        "--out",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let trace = fs::read_to_string(out.join("trace.log")).unwrap();
    let mut lines = trace.lines();
    assert_eq!(lines.next(), Some("Iteration\tPosterior\tLikelihood\tPrior\tmu"));
    assert_eq!(lines.count(), 21);

    let summary = read_json(&out.join("summary.json"));
    assert_eq!(summary["generations"], 200);
    let manifest = read_json(&out.join("manifest.json"));
    assert_eq!(manifest["outputs"].as_array().map(Vec::len), Some(4));
    assert_eq!(
        fs::read_to_string(out.join("model.yaml")).unwrap(),
        fs::read_to_string(&model).unwrap()
    );
}

const SHORT_RUN: &str = "generations: 40\nburn_in: 10\noutput:\n  print_interval: 10\n";

#[test]
fn inputs_already_in_the_run_directory_are_kept() {
    let dir = tempdir().unwrap();
    let config = write(dir.path(), "config.yaml", SHORT_RUN);
    let model = write(dir.path(), "model.yaml", MODEL);
    let output = tempo_sim(&[
        "mcmc",
        "--config",
        &config,
        "--model",
        &model,
        "--out",
        dir.path().to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read_to_string(&config).unwrap(), SHORT_RUN);
    assert_eq!(fs::read_to_string(&model).unwrap(), MODEL);
}

#[test]
fn failed_input_copy_fails_the_run() {
    let dir = tempdir().unwrap();
    let config = write(dir.path(), "run.yaml", SHORT_RUN);
    let model = write(dir.path(), "model.yaml", MODEL);
    let out = dir.path().join("blocked");
    fs::create_dir_all(out.join("config.yaml")).unwrap();
    let output = tempo_sim(&[
        "mcmc",
        "--config",
        &config,
        "--model",
        &model,
        "--out",
        out.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("could not copy"));
}

#[test]
fn power_posterior_on_two_ranks_recovers_the_marginal_likelihood() {
    let dir = tempdir().unwrap();
    let config = write(
        dir.path(),
        "power.yaml",
        "generations: 800\nburn_in: 50\ntuning_interval: 25\n\
         power:\n  sample_freq: 4\n  tolerance: 0.05\n  max_refinements: 4\n  filename: powp.out\n\
         parallel:\n  processes: 2\nseed_policy:\n  master_seed: 7\n",
    );
    let model = write(dir.path(), "model.yaml", MODEL);
    let out = dir.path().join("power");
    let output = tempo_sim(&[
        "power-posterior",
        "--config",
        &config,
        "--model",
        &model,
        "--out",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("stepping stone"));

    let report = read_json(&out.join("power_report.json"));
    let exact = report["exact"].as_f64().unwrap();
    for key in ["path_sampling", "stepping_stone"] {
        let estimate = report[key].as_f64().unwrap();
        assert!((estimate - exact).abs() < 1.0, "{key} {estimate} vs {exact}");
    }
    let powers = report["powers"].as_array().unwrap();
    assert!(powers.len() >= 3);
    for index in 0..powers.len() {
        assert!(out.join(format!("powp_stone_{index}.out")).exists());
    }

    let estimates = dir.path().join("estimates.json");
    let output = tempo_sim(&[
        "estimate",
        "--input",
        out.join("powp.out").to_str().unwrap(),
        "--json",
        estimates.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let recomputed = read_json(&estimates);
    assert_eq!(recomputed["path_sampling"], report["path_sampling"]);
    assert_eq!(recomputed["stepping_stone"], report["stepping_stone"]);
}

#[test]
fn fixed_ladder_uses_the_configured_categories() {
    let dir = tempdir().unwrap();
    let config = write(
        dir.path(),
        "fixed.yaml",
        "generations: 100\nburn_in: 10\n\
         power:\n  mode: fixed\n  cats: 4\n  alpha: 0.3\n  sample_freq: 10\n  filename: fixed.out\n",
    );
    let model = write(dir.path(), "model.yaml", MODEL);
    let out = dir.path().join("fixed");
    let output = tempo_sim(&[
        "power-posterior",
        "--config",
        &config,
        "--model",
        &model,
        "--out",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report = read_json(&out.join("power_report.json"));
    assert_eq!(report["powers"].as_array().map(Vec::len), Some(5));
    assert_eq!(report["adaptive_estimates"].as_array().map(Vec::len), Some(0));
    let summary = fs::read_to_string(out.join("fixed.out")).unwrap();
    assert_eq!(summary.lines().count(), 1 + 5 * 10);
}

#[test]
fn summary_file_without_extension_is_rejected() {
    let dir = tempdir().unwrap();
    let config = write(
        dir.path(),
        "bad.yaml",
        "generations: 100\npower:\n  sample_freq: 10\n  filename: powp\n",
    );
    let model = write(dir.path(), "model.yaml", MODEL);
    let output = tempo_sim(&[
        "power-posterior",
        "--config",
        &config,
        "--model",
        &model,
        "--out",
        dir.path().join("bad").to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr)
        .contains("Please provide a filename with an extension"));
}
