//! Request ID generation.
//!
//! Every inbound request is assigned an identifier made of two parts:
//!
//! 1. **Prefix**: a random alphanumeric string drawn once per process from
//!    the operating system's secure random source
//! 2. **Sequence**: a counter incremented atomically once per request,
//!    zero-padded to a fixed width
//!
//! ```text
//! qX3f9A0000000001
//! └─┬──┘└───┬────┘
//! prefix  sequence
//! ```
//!
//! The prefix separates processes; the sequence separates requests within a
//! process. The counter is a `u32`, whose maximum fits exactly in
//! [`SEQUENCE_WIDTH`] digits. It wraps after 2^32 requests, at which point
//! uniqueness within the process is no longer guaranteed.

use std::sync::atomic::{AtomicU32, Ordering};

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CoreError, CoreResult};

/// Length of the random per-process prefix.
pub const PREFIX_LEN: usize = 6;

/// Number of decimal digits the sequence number is padded to.
pub const SEQUENCE_WIDTH: usize = 10;

/// Characters the prefix is drawn from.
pub const ALPHABET: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Bytes at or above this value are rejected so every alphabet index is
/// equally likely (248 = 4 * 62).
const ACCEPT_BELOW: u8 = 248;

/// Generates process-unique request IDs.
///
/// The generator is shared by reference (usually behind an `Arc`) between
/// all connection tasks. [`next_id`](Self::next_id) is lock-free: the single
/// atomic increment is the only synchronisation point.
///
/// # Example
///
/// ```
/// use webdiag_core::RequestIdGenerator;
///
/// let ids = RequestIdGenerator::with_prefix("abcDEF");
/// assert_eq!(ids.next_id(), "abcDEF0000000001");
/// assert_eq!(ids.next_id(), "abcDEF0000000002");
/// ```
#[derive(Debug)]
pub struct RequestIdGenerator {
    prefix: String,
    counter: AtomicU32,
}

impl RequestIdGenerator {
    /// Creates a generator with a fresh random prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Entropy`] if the operating system random source
    /// is unavailable. Callers should treat this as fatal: a weaker prefix
    /// would break uniqueness across processes.
    pub fn new() -> CoreResult<Self> {
        let prefix = random_string(PREFIX_LEN)?;
        Ok(Self::with_prefix(prefix))
    }

    /// Creates a generator with a caller-supplied prefix.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU32::new(0),
        }
    }

    /// Returns the per-process prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the next request ID.
    ///
    /// The first call returns sequence 1. Safe to call from any number of
    /// tasks concurrently; no two calls observe the same sequence number
    /// until the counter wraps.
    #[must_use]
    pub fn next_id(&self) -> String {
        // Relaxed is enough: only the uniqueness of the returned value matters.
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        format_id(&self.prefix, sequence)
    }
}

/// Formats a prefix and sequence number as a request ID.
#[must_use]
pub fn format_id(prefix: &str, sequence: u32) -> String {
    format!("{prefix}{sequence:0width$}", width = SEQUENCE_WIDTH)
}

/// Returns a random string of `len` characters drawn uniformly from
/// [`ALPHABET`] using the operating system random source.
///
/// # Errors
///
/// Returns [`CoreError::InvalidLength`] for `len == 0` and
/// [`CoreError::Entropy`] if the random source fails.
pub fn random_string(len: usize) -> CoreResult<String> {
    random_string_from(&mut OsRng, len)
}

fn random_string_from<R: RngCore + ?Sized>(rng: &mut R, len: usize) -> CoreResult<String> {
    if len == 0 {
        return Err(CoreError::InvalidLength(len));
    }

    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 32];

    while out.len() < len {
        rng.try_fill_bytes(&mut buf)?;
        for &byte in buf.iter().filter(|&&b| b < ACCEPT_BELOW) {
            if out.len() == len {
                break;
            }
            out.push(char::from(ALPHABET[usize::from(byte) % ALPHABET.len()]));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use regex::Regex;
    use std::collections::HashSet;

    const ID_PATTERN: &str = r"^[A-Za-z0-9]{6}\d{10}$";

    /// An RNG whose entropy source is always unavailable.
    struct FailingRng;

    impl RngCore for FailingRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::other("no entropy")))
        }
    }

    /// An RNG that only ever yields bytes the sampler must reject, then a
    /// usable byte.
    struct BiasedRng {
        calls: usize,
    }

    impl RngCore for BiasedRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            self.calls += 1;
            let byte = if self.calls < 3 { 255 } else { 63 };
            dest.fill(byte);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    #[test]
    fn test_first_id_is_sequence_one() {
        let ids = RequestIdGenerator::with_prefix("AAAAAA");
        assert_eq!(ids.next_id(), "AAAAAA0000000001");
    }

    #[test]
    fn test_sequential_ids_are_unique_and_increasing() {
        let ids = RequestIdGenerator::with_prefix("xY9zQ1");
        let generated: Vec<String> = (0..1000).map(|_| ids.next_id()).collect();

        let unique: HashSet<&String> = generated.iter().collect();
        assert_eq!(unique.len(), generated.len());

        let mut sorted = generated.clone();
        sorted.sort();
        assert_eq!(sorted, generated);
    }

    #[test]
    fn test_generated_ids_match_format() {
        let re = Regex::new(ID_PATTERN).unwrap();
        let ids = RequestIdGenerator::new().unwrap();

        assert_eq!(ids.prefix().len(), PREFIX_LEN);
        for _ in 0..100 {
            let id = ids.next_id();
            assert!(re.is_match(&id), "malformed id: {id}");
        }
    }

    #[test]
    fn test_prefixes_differ_between_generators() {
        // 62^6 possible prefixes; a collision here means the source is broken.
        let a = RequestIdGenerator::new().unwrap();
        let b = RequestIdGenerator::new().unwrap();
        assert_ne!(a.prefix(), b.prefix());
    }

    #[test]
    fn test_concurrent_ids_have_no_duplicates_or_gaps() {
        const THREADS: usize = 1000;
        const PER_THREAD: usize = 100;

        let ids = RequestIdGenerator::with_prefix("conc01");

        let mut all: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| scope.spawn(|| (0..PER_THREAD).map(|_| ids.next_id()).collect::<Vec<_>>()))
                .collect();

            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(all.len(), THREADS * PER_THREAD);

        all.sort();
        all.dedup();
        assert_eq!(all.len(), THREADS * PER_THREAD);

        for (expected, id) in (1u32..).zip(&all) {
            let sequence: u32 = id[PREFIX_LEN..].parse().unwrap();
            assert_eq!(sequence, expected);
        }
    }

    #[test]
    fn test_counter_maximum_fits_width() {
        assert_eq!(format_id("AbC123", u32::MAX), "AbC1234294967295");
    }

    #[test]
    fn test_random_string_rejects_zero_length() {
        assert!(matches!(random_string(0), Err(CoreError::InvalidLength(0))));
    }

    #[test]
    fn test_random_string_reports_entropy_failure() {
        let result = random_string_from(&mut FailingRng, PREFIX_LEN);
        assert!(matches!(result, Err(CoreError::Entropy(_))));
    }

    #[test]
    fn test_random_string_skips_biased_bytes() {
        let mut rng = BiasedRng { calls: 0 };
        let s = random_string_from(&mut rng, 4).unwrap();
        // 63 % 62 == 1 -> 'B'
        assert_eq!(s, "BBBB");
        assert_eq!(rng.calls, 3);
    }

    #[test]
    fn test_random_string_uses_alphabet_only() {
        let s = random_string(256).unwrap();
        assert_eq!(s.len(), 256);
        assert!(s.bytes().all(|b| ALPHABET.contains(&b)));
    }

    proptest! {
        #[test]
        fn prop_format_id_shape(sequence in any::<u32>(), prefix in "[A-Za-z0-9]{6}") {
            let re = Regex::new(ID_PATTERN).unwrap();
            let id = format_id(&prefix, sequence);
            prop_assert!(re.is_match(&id));
            prop_assert_eq!(id[PREFIX_LEN..].parse::<u32>().unwrap(), sequence);
        }
    }
}
