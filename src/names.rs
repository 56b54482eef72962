//! Random-suffix name generation.
//!
//! Generated names keep implicit volumes, the placer container, script files
//! and heredoc delimiters from colliding with anything the user declared.
//! The generator is an explicit handle so tests can seed it.

use crate::constants::{MAX_GENERATED_NAME_LEN, RANDOM_SUFFIX_ALPHABET, RANDOM_SUFFIX_LEN};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Produces unique names from a base.
pub trait NameGenerator: Send + Sync {
    /// Returns `base-xxxxx`, truncating `base` so the result fits in
    /// [`MAX_GENERATED_NAME_LEN`].
    fn restrict_length_with_random_suffix(&self, base: &str) -> String;
}

/// [`NameGenerator`] drawing suffixes from a seedable RNG.
pub struct SimpleNameGenerator {
    rng: Mutex<StdRng>,
}

impl SimpleNameGenerator {
    /// Creates a generator seeded from the OS.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Creates a deterministic generator.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn random_suffix(&self) -> String {
        let alphabet = RANDOM_SUFFIX_ALPHABET.as_bytes();
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        (0..RANDOM_SUFFIX_LEN)
            .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
            .collect()
    }
}

impl Default for SimpleNameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl NameGenerator for SimpleNameGenerator {
    fn restrict_length_with_random_suffix(&self, base: &str) -> String {
        let max_base = MAX_GENERATED_NAME_LEN - RANDOM_SUFFIX_LEN - 1;
        let base = match base.char_indices().nth(max_base) {
            Some((cut, _)) => &base[..cut],
            None => base,
        };
        format!("{}-{}", base, self.random_suffix())
    }
}
