#![deny(missing_docs)]

//! Marginal-likelihood estimation over power posteriors: adaptive and fixed
//! stone ladders, their sample files, and the path-sampling and
//! stepping-stone estimators.

pub mod adaptive;
pub mod estimators;
pub mod fixed;
pub mod quadrature;
pub mod sampling;
pub mod stone;

pub use adaptive::{adapt, first_pass_estimate, Adaptation, AdaptivePowerPosterior, LadderState};
pub use estimators::{PathSampler, PowerSamples, SteppingStoneSampler};
pub use fixed::{fixed_powers, PowerPosteriorAnalysis};
pub use quadrature::{simpsons_rule, trapezoid_rule};
pub use sampling::{average_ln_likelihood, likelihood_group, StoneRunner, StoneSchedule};
pub use stone::{
    require_extension, stone_file_name, summarize_stones, Stone, StoneLadder, StoneRow,
    StoneWriter, STONE_COLUMNS,
};
