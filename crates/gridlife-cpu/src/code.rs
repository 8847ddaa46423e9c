//! Bytecode: the genome of a CPU-driven organism.

use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ops::op_count;

/// Shortest randomly-generated program.
pub const RAND_LENGTH_MIN: usize = 50;
/// Longest randomly-generated program.
pub const RAND_LENGTH_MAX: usize = 1000;

/// An ordered byte sequence interpreted through the opcode table. The hash
/// of the bytes is the organism's species key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bytecode(Vec<u8>);

impl Bytecode {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Generates plausibly-executable random code of random length.
    #[must_use]
    pub fn random(rng: &mut dyn RngCore) -> Self {
        let len = rng.random_range(RAND_LENGTH_MIN..RAND_LENGTH_MAX);
        let max_op = op_count() as u8;
        Self((0..len).map(|_| rng.random_range(0..max_op)).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn byte(&self, index: usize) -> u8 {
        self.0[index]
    }

    /// Species identity: the first eight bytes of SHA-256 over the code.
    #[must_use]
    pub fn hash(&self) -> u64 {
        let digest = Sha256::digest(&self.0);
        u64::from_le_bytes(digest[..8].try_into().expect("digest is long enough"))
    }

    /// Randomly perturbs the code with one of three mutations: substitute a
    /// single byte, duplicate a segment (wrapping through the original), or
    /// delete a segment. A mutation that would empty the code is discarded.
    pub fn mutate(&mut self, rng: &mut dyn RngCore) {
        if self.0.is_empty() {
            return;
        }
        let len = self.0.len();
        let i = rng.random_range(0..len);
        let normal = Normal::new(0.0f64, 1.0).expect("unit normal");
        let l = (normal.sample(rng) * 5.0).abs().ceil() as usize;
        let max_op = op_count() as u8;

        let roll: f32 = rng.random();
        let mutated: Vec<u8> = if roll < 0.333 {
            let mut d = self.0.clone();
            d[i] = rng.random_range(0..max_op);
            d
        } else if roll < 0.666 {
            let mut d = Vec::with_capacity(len + l);
            d.extend_from_slice(&self.0[..i]);
            for k in 0..l {
                d.push(self.0[(i + k) % len]);
            }
            d.extend_from_slice(&self.0[i..]);
            d
        } else {
            let l = l.min(len - i);
            let mut d = Vec::with_capacity(len - l);
            d.extend_from_slice(&self.0[..i]);
            d.extend_from_slice(&self.0[i + l..]);
            d
        };

        if !mutated.is_empty() {
            self.0 = mutated;
        }
    }

    /// Index of the next occurrence of `value` at or after `start`, wrapping
    /// through the start of the code. Falls back to 0 when absent.
    #[must_use]
    pub(crate) fn find(&self, value: u8, start: usize) -> usize {
        for (i, byte) in self.0.iter().enumerate().skip(start) {
            if *byte == value {
                return i;
            }
        }
        for (i, byte) in self.0.iter().enumerate().take(start) {
            if *byte == value {
                return i;
            }
        }
        0
    }

    /// Like [`find`](Self::find), scanning backward from the end.
    #[must_use]
    pub(crate) fn find_backward(&self, value: u8, start: usize) -> usize {
        for i in ((start + 1)..self.0.len()).rev() {
            if self.0[i] == value {
                return i;
            }
        }
        for i in 0..start.min(self.0.len()) {
            if self.0[i] == value {
                return i;
            }
        }
        0
    }
}

impl From<Vec<u8>> for Bytecode {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}
