//! HyperLogLog cardinality estimator.
//!
//! Fixed memory (`2^precision` one-byte registers) and ~`1.04 / sqrt(2^precision)` relative
//! standard error. At the default precision of 14 that is 16 KiB and ~0.81%.
//! Small cardinalities are estimated by linear counting over empty registers, which is
//! exact in practice for the handful of actors seen in tests.
//!
//! Sketches with the same precision merge by taking the register-wise maximum; the merge
//! is associative, commutative and idempotent, so concurrent adds never need ordering.

use std::{fmt, hash::BuildHasher};

use ahash::RandomState;

/// Default precision, matching the register count of redis' HyperLogLog.
pub const DEFAULT_PRECISION: u8 = 14;
/// Smallest supported precision
pub const MIN_PRECISION: u8 = 4;
/// Largest supported precision
pub const MAX_PRECISION: u8 = 18;

// Fixed seeds so that one actor hashes identically in every sketch of the process.
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Error when merging sketches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SketchMergeError {
    /// The two sketches have different precisions and cannot be merged
    MismatchedPrecision {
        /// precision of the sketch being merged into
        this: u8,
        /// precision of the other sketch
        other: u8,
    },
}

impl fmt::Display for SketchMergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MismatchedPrecision { this, other } => write!(
                f,
                "cannot merge sketches with different precisions: {this} vs {other}"
            ),
        }
    }
}

impl std::error::Error for SketchMergeError {}

/// A HyperLogLog sketch.
#[derive(Clone, PartialEq, Eq)]
pub struct HyperLogLog {
    precision: u8,
    registers: Box<[u8]>,
}

impl fmt::Debug for HyperLogLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperLogLog")
            .field("precision", &self.precision)
            .field("estimate", &self.estimate())
            .finish()
    }
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperLogLog {
    /// Create an empty sketch at [`DEFAULT_PRECISION`]
    pub fn new() -> Self {
        Self::empty(DEFAULT_PRECISION)
    }

    /// Create an empty sketch, returning None if `precision` is outside
    /// [`MIN_PRECISION`]`..=`[`MAX_PRECISION`]
    pub fn with_precision(precision: u8) -> Option<Self> {
        (MIN_PRECISION..=MAX_PRECISION)
            .contains(&precision)
            .then(|| Self::empty(precision))
    }

    fn empty(precision: u8) -> Self {
        Self {
            precision,
            registers: vec![0; 1 << precision].into_boxed_slice(),
        }
    }

    /// Precision (log2 of the register count)
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Add an item. Returns true if a register changed.
    pub fn insert(&mut self, item: &str) -> bool {
        let hash = RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]).hash_one(item);
        let p = u32::from(self.precision);
        let index = (hash >> (64 - p)) as usize;
        // the sentinel bit caps the run of zeros at 64 - p
        let rest = (hash << p) | (1 << (p - 1));
        let rank = (rest.leading_zeros() + 1) as u8;

        let register = &mut self.registers[index];
        if rank > *register {
            *register = rank;
            true
        } else {
            false
        }
    }

    /// Merge `other` into this sketch. Afterwards this sketch estimates the union.
    pub fn merge(&mut self, other: &HyperLogLog) -> Result<(), SketchMergeError> {
        if self.precision != other.precision {
            return Err(SketchMergeError::MismatchedPrecision {
                this: self.precision,
                other: other.precision,
            });
        }
        for (mine, theirs) in self.registers.iter_mut().zip(other.registers.iter()) {
            *mine = (*mine).max(*theirs);
        }
        Ok(())
    }

    /// Whether nothing was ever inserted
    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|&r| r == 0)
    }

    /// Estimated number of distinct items inserted
    pub fn estimate(&self) -> u64 {
        let m = self.registers.len() as f64;
        let mut sum = 0.0;
        let mut zeros = 0usize;
        for &register in self.registers.iter() {
            sum += 1.0 / (1u64 << register) as f64;
            if register == 0 {
                zeros += 1;
            }
        }

        let alpha = 0.7213 / (1.0 + 1.079 / m);
        let raw = alpha * m * m / sum;

        let estimate = if raw <= 2.5 * m && zeros > 0 {
            m * (m / zeros as f64).ln()
        } else {
            raw
        };
        estimate.round() as u64
    }

    /// Memory used by the registers, in bytes
    pub fn memory_bytes(&self) -> usize {
        self.registers.len()
    }
}
