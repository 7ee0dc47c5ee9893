use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tempo_core::{Communicator, LocalCommunicator, ParallelContext, TempoError};
use tempo_mcmc::{
    with_file_extension, McmcAnalysis, RunConfig, RunManifest, RunReport, SamplerCheckpoint,
    SamplerKind,
};

use crate::setup::ModelFile;
use crate::{copy_input, load_config, on_ranks, write_json};

#[derive(Args, Debug)]
pub struct McmcArgs {
    /// YAML run configuration.
    #[arg(long)]
    pub config: PathBuf,
    /// YAML model file with hyper-parameters, observations and moves.
    #[arg(long)]
    pub model: PathBuf,
    /// Output directory for the trace, checkpoints and manifest.
    #[arg(long)]
    pub out: PathBuf,
    /// Checkpoint written by an earlier run to continue from.
    #[arg(long)]
    pub resume: Option<PathBuf>,
}

pub fn run(args: &McmcArgs) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(&args.out)?;
    let config = load_config(&args.config, &args.out)?;
    config.validate()?;
    let setup = ModelFile::load(&args.model)?;
    let processes = config.parallel.processes;

    let reports = if config.sampler == SamplerKind::Mcmcmc && processes > 1 {
        let (job_config, resume) = (config.clone(), args.resume.clone());
        on_ranks(processes, move |comm, context| {
            run_rank(&job_config, &setup, resume.as_ref(), comm, context)
        })?
    } else {
        if processes > 1 {
            log::warn!("only coupled chains are spread over processes; running on one");
        }
        vec![run_rank(
            &config,
            &setup,
            args.resume.as_ref(),
            Arc::new(LocalCommunicator::new()),
            ParallelContext::single(),
        )?]
    };
    let report = reports.into_iter().next().ok_or("no rank reported")?;
    log::info!(
        "stopped after {} generations ({:?})",
        report.generations,
        report.stopped_by
    );

    let summary_path = args.out.join("summary.json");
    write_json(&summary_path, &report)?;
    let config_copy = copy_input(&args.config, &args.out, "config.yaml")?;
    let model_copy = copy_input(&args.model, &args.out, "model.yaml")?;

    let mut manifest = RunManifest::new(&config);
    manifest.record_output(&config_copy)?;
    manifest.record_output(&model_copy)?;
    manifest.record_output(&config.output.trace_path())?;
    manifest.record_output(&summary_path)?;
    manifest.record_result("generations", report.generations as f64);
    manifest.write(&args.out.join("manifest.json"))?;
    Ok(())
}

fn run_rank<C: Communicator>(
    config: &RunConfig,
    setup: &ModelFile,
    resume: Option<&PathBuf>,
    comm: Arc<C>,
    context: ParallelContext,
) -> Result<RunReport, TempoError> {
    let trace = config.output.trace_path();
    let mut sampler = setup.build_sampler(config, Arc::clone(&comm), context, &trace)?;
    if let Some(path) = resume {
        let path = if context.num_processes > 1 {
            with_file_extension(path, &format!("_rank_{}", context.pid), false)
        } else {
            path.clone()
        };
        sampler.restore(&SamplerCheckpoint::load(&path)?)?;
    }
    let mut analysis = McmcAnalysis::new(sampler, comm, context, config.seed_policy.master_seed);
    if let (Some(interval), Some(path)) = (config.checkpoint.interval, &config.checkpoint.path) {
        analysis = analysis.with_checkpoints(interval, path.clone());
    }
    if resume.is_none() {
        analysis.burnin(config.burn_in, config.tuning_interval)?;
    }
    analysis.run(config.generations, &config.stopping.rules())
}
