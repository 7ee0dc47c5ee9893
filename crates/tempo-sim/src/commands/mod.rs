pub mod estimate;
pub mod mcmc;
pub mod power;
