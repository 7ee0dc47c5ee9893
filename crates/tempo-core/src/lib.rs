#![deny(missing_docs)]
#![doc = "Core contracts and data types for the tempo tempered-MCMC engine: errors, deterministic randomness, the model collaborator contract and rank bookkeeping."]

pub mod errors;
pub mod model;
pub mod normal;
pub mod parallel;
pub mod rng;

pub use errors::{ErrorInfo, TempoError};
pub use model::{is_computable, Model, NodeId, ScalarModel, VersionedCache};
pub use normal::{NormalMeanModel, NormalMeanSpec};
pub use parallel::{ChannelCommunicator, Communicator, LocalCommunicator, ParallelContext, Partition};
pub use rng::{derive_substream_seed, RngHandle};
