//! Deterministic seed derivation helpers.

use tempo_core::derive_substream_seed;

/// Derives the deterministic seed used by a specific chain.
pub fn chain_seed(master_seed: u64, chain_index: usize) -> u64 {
    derive_substream_seed(master_seed, chain_index as u64)
}

/// Deterministic seed for the swap decisions of a coupled run.
pub fn swap_seed(master_seed: u64) -> u64 {
    derive_substream_seed(master_seed ^ 0xA5A5_A5A5_A5A5_A5A5, 0)
}

/// Derives the seed of the sampler that runs a given stone or replicate.
pub fn stone_seed(master_seed: u64, stone_index: usize) -> u64 {
    derive_substream_seed(master_seed ^ 0x5A5A_5A5A_5A5A_5A5A, stone_index as u64)
}
