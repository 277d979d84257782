use crate::Generator;
use jiff::Timestamp;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use snip_core::shortcode::{ALPHABET, GENERATED_LENGTH};
use snip_core::ShortCode;

/// Random short code generator over `[a-zA-Z0-9]`.
///
/// Every instance owns its own PRNG. [`RandomGenerator::new`] seeds it from the
/// wall clock once, at construction; [`RandomGenerator::with_seed`] makes the
/// sequence reproducible.
#[derive(Debug)]
pub struct RandomGenerator {
    rng: Mutex<StdRng>,
}

impl RandomGenerator {
    /// Creates a generator seeded from the current time.
    pub fn new() -> Self {
        // truncation keeps the fast-moving low bits of the nanosecond clock
        Self::with_seed(Timestamp::now().as_nanosecond() as u64)
    }

    /// Creates a generator with a fixed seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for RandomGenerator {
    fn generate(&self) -> ShortCode {
        let mut rng = self.rng.lock();
        let code: String = (0..GENERATED_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        ShortCode::new_unchecked(code)
    }
}
