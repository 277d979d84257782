use crate::Generator;
use snip_core::shortcode::{ALPHABET, GENERATED_LENGTH};
use snip_core::ShortCode;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of distinct fixed-width codes (62^6).
const CODE_SPACE: u64 = 62u64.pow(GENERATED_LENGTH as u32);

/// A sequential short code generator.
///
/// Encodes a monotonically increasing counter as a fixed-width base62 code
/// ("aaaaaa", "aaaaab", ...). Codes are unique within a single instance until
/// the counter wraps around the 62^6 code space.
///
/// For several nodes sharing one store, give each node a disjoint offset.
#[derive(Debug)]
pub struct SeqGenerator {
    counter: AtomicU64,
}

impl Clone for SeqGenerator {
    fn clone(&self) -> Self {
        Self {
            counter: AtomicU64::new(self.counter.load(Ordering::SeqCst)),
        }
    }
}

impl SeqGenerator {
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    /// Creates a generator starting from a specific counter value.
    ///
    /// Useful for resuming from a known state or distributing
    /// counter ranges across nodes.
    pub fn with_offset(offset: u64) -> Self {
        Self {
            counter: AtomicU64::new(offset),
        }
    }

    fn encode(mut value: u64) -> String {
        let mut buf = [ALPHABET[0]; GENERATED_LENGTH];
        for slot in buf.iter_mut().rev() {
            *slot = ALPHABET[(value % 62) as usize];
            value /= 62;
        }
        buf.iter().map(|&b| b as char).collect()
    }
}

impl Default for SeqGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for SeqGenerator {
    fn generate(&self) -> ShortCode {
        let count = self.counter.fetch_add(1, Ordering::SeqCst);
        ShortCode::new_unchecked(Self::encode(count % CODE_SPACE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_sequential_codes() {
        let generator = SeqGenerator::new();

        assert_eq!(generator.generate().as_str(), "aaaaaa");
        assert_eq!(generator.generate().as_str(), "aaaaab");
        assert_eq!(generator.generate().as_str(), "aaaaac");
    }

    #[test]
    fn with_offset() {
        let generator = SeqGenerator::with_offset(62);

        assert_eq!(generator.generate().as_str(), "aaaaba");
        assert_eq!(generator.generate().as_str(), "aaaabb");
    }

    #[test]
    fn wraps_at_code_space() {
        let generator = SeqGenerator::with_offset(CODE_SPACE - 1);

        assert_eq!(generator.generate().as_str(), "999999");
        assert_eq!(generator.generate().as_str(), "aaaaaa");
    }

    #[test]
    fn generator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SeqGenerator>();
    }

    #[test]
    fn clone_preserves_counter_state() {
        let generator = SeqGenerator::new();
        generator.generate();
        generator.generate();

        let cloned = generator.clone();

        assert_eq!(generator.generate().as_str(), "aaaaac");
        assert_eq!(cloned.generate().as_str(), "aaaaac");
    }
}
