use std::fmt::{self, Debug};

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of bytes in a node's random bit string.
pub const RS_BYTE_LENGTH: usize = 2;
/// Number of bits in a node's random bit string (`rs`).
pub const RS_BIT_LENGTH: usize = RS_BYTE_LENGTH * 8;

/// A fixed-length sequence of bits, ordered most-significant-bit first.
///
/// Mirrors `CopyableBitArray` from the original Python source: orderable,
/// sliceable by `prefix`, and wire-copyable via `Serialize`/`Deserialize`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BitString(Vec<bool>);

impl Debug for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.0 {
            write!(f, "{}", if *bit { '1' } else { '0' })?
        }
        Ok(())
    }
}

impl BitString {
    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self(bits)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> bool {
        self.0[index]
    }

    /// Returns the first `i` bits of `self` as a new `BitString`.
    ///
    /// `prefix(0)` is the empty string; `prefix(len())` is `self` itself.
    pub fn prefix(&self, i: usize) -> Self {
        Self(self.0[..i].to_vec())
    }

    /// Appends a single bit, returning the extended bit string.
    pub fn append(&self, bit: bool) -> Self {
        let mut bits = self.0.clone();
        bits.push(bit);
        Self(bits)
    }

    /// Largest `k` such that `self[0:k] == other[0:k]`.
    pub fn common_prefix_length(&self, other: &Self) -> usize {
        self.0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }
}

/// Draws a uniformly random `BitString` of `8 * len_bytes` bits.
pub fn random_bit_string(len_bytes: usize) -> BitString {
    let mut bytes = vec![0u8; len_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    let bits = bytes
        .iter()
        .flat_map(|byte| (0..8).rev().map(move |i| byte & (1 << i) != 0))
        .collect();
    BitString(bits)
}
