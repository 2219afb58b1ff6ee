//! Seeded random source
//!
//! Every roll draws from a [`SeededRng`] keyed by an explicit seed string.
//! The stream is ChaCha20 keyed with the SHA-256 digest of the UTF-8 seed,
//! and unit-interval values take the top 53 bits of each `u64` draw, so a
//! seed replays identically on any platform.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

/// 2^-53, the spacing of the unit-interval grid.
const UNIT_SCALE: f64 = 1.0 / (1u64 << 53) as f64;

/// Deterministic pseudo-random stream keyed by a seed string
#[derive(Debug, Clone)]
pub struct SeededRng {
    seed: String,
    inner: ChaCha20Rng,
}

impl SeededRng {
    /// Create a stream from the given seed
    pub fn new(seed: impl Into<String>) -> Self {
        let seed = seed.into();
        let digest: [u8; 32] = Sha256::digest(seed.as_bytes()).into();
        Self {
            seed,
            inner: ChaCha20Rng::from_seed(digest),
        }
    }

    /// Create a stream from a freshly generated seed
    pub fn fresh() -> Self {
        Self::new(generate_seed())
    }

    /// The seed this stream was keyed with
    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Next value in `[0, 1)`
    pub fn next_unit(&mut self) -> f64 {
        (self.inner.next_u64() >> 11) as f64 * UNIT_SCALE
    }

    /// Roll one die: `floor(unit * sides) + 1`, always in `[1, sides]`
    pub fn roll_die(&mut self, sides: u32) -> u32 {
        let face = (self.next_unit() * f64::from(sides)).floor() as u32 + 1;
        face.min(sides)
    }
}

/// Generate a new random seed string
pub fn generate_seed() -> String {
    uuid::Uuid::new_v4().to_string()
}
