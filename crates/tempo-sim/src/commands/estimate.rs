use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use serde_json::json;
use tempo_power::{PathSampler, PowerSamples, SteppingStoneSampler};

use crate::write_json;

#[derive(Args, Debug)]
pub struct EstimateArgs {
    /// Summary file written by `tempo-sim power-posterior`.
    #[arg(long)]
    pub input: PathBuf,
    /// Also write the estimates to this JSON file.
    #[arg(long)]
    pub json: Option<PathBuf>,
}

pub fn run(args: &EstimateArgs) -> Result<(), Box<dyn Error>> {
    let samples = PowerSamples::read(&args.input)?;
    let powers = samples.powers().to_vec();
    let path_sampling = PathSampler::new(samples.clone()).marginal_likelihood();
    let stepping_stone = SteppingStoneSampler::new(samples).marginal_likelihood();

    println!("stones             {}", powers.len());
    println!("path sampling      {path_sampling:.6}");
    println!("stepping stone     {stepping_stone:.6}");

    if let Some(path) = &args.json {
        let summary = json!({
            "input": args.input.display().to_string(),
            "powers": powers,
            "path_sampling": path_sampling,
            "stepping_stone": stepping_stone,
        });
        write_json(path, &summary)?;
    }
    Ok(())
}
