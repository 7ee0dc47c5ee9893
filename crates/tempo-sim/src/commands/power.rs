use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use serde::Serialize;
use tempo_core::{Communicator, LocalCommunicator, ParallelContext, TempoError};
use tempo_mcmc::{PowerMode, RunConfig, RunManifest};
use tempo_power::{
    likelihood_group, AdaptivePowerPosterior, PathSampler, PowerPosteriorAnalysis, PowerSamples,
    SteppingStoneSampler, StoneSchedule,
};

use crate::setup::ModelFile;
use crate::{copy_input, load_config, on_ranks, write_json};

#[derive(Args, Debug)]
pub struct PowerArgs {
    /// YAML run configuration; `generations` and `burn_in` apply per stone.
    #[arg(long)]
    pub config: PathBuf,
    /// YAML model file with hyper-parameters, observations and moves.
    #[arg(long)]
    pub model: PathBuf,
    /// Output directory for stone files, the summary file and the report.
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Debug, Clone)]
struct StoneOutcome {
    powers: Vec<f64>,
    estimates: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct PowerReport {
    mode: PowerMode,
    powers: Vec<f64>,
    adaptive_estimates: Vec<f64>,
    path_sampling: f64,
    stepping_stone: f64,
    exact: f64,
}

pub fn run(args: &PowerArgs) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(&args.out)?;
    let config = load_config(&args.config, &args.out)?;
    config.validate_power()?;
    let setup = ModelFile::load(&args.model)?;
    let exact = setup.build_model()?.exact_ln_marginal_likelihood();
    let processes = config.parallel.processes;

    let outcomes = if processes > 1 {
        let (job_config, job_setup) = (config.clone(), setup.clone());
        on_ranks(processes, move |comm, context| {
            run_rank(&job_config, &job_setup, comm, context)
        })?
    } else {
        vec![run_rank(
            &config,
            &setup,
            Arc::new(LocalCommunicator::new()),
            ParallelContext::single(),
        )?]
    };
    let outcome = outcomes.into_iter().next().ok_or("no rank reported")?;

    let samples = PowerSamples::read(&config.power.filename)?;
    let path_sampling = PathSampler::new(samples.clone()).marginal_likelihood();
    let stepping_stone = SteppingStoneSampler::new(samples).marginal_likelihood();

    println!("stones             {}", outcome.powers.len());
    if let Some(estimate) = outcome.estimates.last() {
        println!("adaptive estimate  {estimate:.6}");
    }
    println!("path sampling      {path_sampling:.6}");
    println!("stepping stone     {stepping_stone:.6}");
    println!("exact              {exact:.6}");

    let report_path = args.out.join("power_report.json");
    write_json(
        &report_path,
        &PowerReport {
            mode: config.power.mode,
            powers: outcome.powers,
            adaptive_estimates: outcome.estimates.clone(),
            path_sampling,
            stepping_stone,
            exact,
        },
    )?;
    let config_copy = copy_input(&args.config, &args.out, "config.yaml")?;
    let model_copy = copy_input(&args.model, &args.out, "model.yaml")?;

    let mut manifest = RunManifest::new(&config);
    manifest.record_output(&config_copy)?;
    manifest.record_output(&model_copy)?;
    manifest.record_output(&config.power.filename)?;
    manifest.record_output(&report_path)?;
    if let Some(estimate) = outcome.estimates.last() {
        manifest.record_result("adaptive", *estimate);
    }
    manifest.record_result("path_sampling", path_sampling);
    manifest.record_result("stepping_stone", stepping_stone);
    manifest.record_result("exact", exact);
    manifest.write(&args.out.join("manifest.json"))?;
    Ok(())
}

fn run_rank<C: Communicator>(
    config: &RunConfig,
    setup: &ModelFile,
    comm: Arc<C>,
    context: ParallelContext,
) -> Result<StoneOutcome, TempoError> {
    let processors_per_likelihood = config.parallel.processors_per_likelihood;
    let group = likelihood_group(context, processors_per_likelihood);
    let sampler =
        setup.build_sampler(config, Arc::clone(&comm), group, &config.output.trace_path())?;
    let schedule = StoneSchedule {
        generations: config.generations,
        burn_in: config.burn_in,
        tuning_interval: config.tuning_interval,
        sample_freq: config.power.sample_freq,
    };
    let seed = config.seed_policy.master_seed;
    match config.power.mode {
        PowerMode::Adaptive => {
            let mut analysis = AdaptivePowerPosterior::new(
                sampler,
                comm,
                context,
                processors_per_likelihood,
                &config.power,
                schedule,
                seed,
            )?;
            analysis.run_all()?;
            Ok(StoneOutcome {
                powers: analysis.ladder().powers(),
                estimates: analysis.estimates().to_vec(),
            })
        }
        PowerMode::Fixed => {
            let mut analysis = PowerPosteriorAnalysis::new(
                sampler,
                comm,
                context,
                processors_per_likelihood,
                &config.power,
                schedule,
                seed,
            )?;
            analysis.run_all()?;
            Ok(StoneOutcome {
                powers: analysis.ladder().powers(),
                estimates: Vec::new(),
            })
        }
    }
}
