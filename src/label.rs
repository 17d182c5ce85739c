// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! 128-bit labels and the fixed-key block cipher that expands them.

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use rand::{
    distributions::{Distribution, Standard},
    Rng,
};
use serde::{Deserialize, Serialize};
use std::ops::{BitXor, BitXorAssign};
use subtle::{Choice, ConditionallySelectable};

/// The size of a label in bytes.
pub const LABEL_SIZE: usize = 16;

/// A 128-bit value: a PRG seed, a GGM tree node, or a PRF key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label(pub [u8; LABEL_SIZE]);

impl Label {
    /// Returns the least significant bit of the first byte.
    pub fn lsb(&self) -> bool {
        self.0[0] & 1 == 1
    }

    /// Returns a copy of `self` with the least significant bit of the first byte cleared.
    pub fn with_lsb_cleared(mut self) -> Label {
        self.0[0] &= 0xfe;
        self
    }

    /// Returns a copy of `self` with `b` folded into the first byte.
    pub fn with_discriminant(mut self, b: u8) -> Label {
        self.0[0] ^= b;
        self
    }

    /// Reads the first 8 bytes as a little-endian integer.
    pub fn low_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Reads the last 8 bytes as a little-endian integer.
    pub fn high_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[8..]);
        u64::from_le_bytes(bytes)
    }

    /// Reads the first 4 bytes as a little-endian integer.
    pub fn low_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.0[..4]);
        u32::from_le_bytes(bytes)
    }
}

impl BitXor for Label {
    type Output = Label;

    fn bitxor(mut self, rhs: Label) -> Label {
        self ^= rhs;
        self
    }
}

impl BitXorAssign for Label {
    fn bitxor_assign(&mut self, rhs: Label) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a ^= b;
        }
    }
}

impl Distribution<Label> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Label {
        let mut bytes = [0u8; LABEL_SIZE];
        rng.fill_bytes(&mut bytes);
        Label(bytes)
    }
}

impl ConditionallySelectable for Label {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        let mut result = Label::default();
        for i in 0..LABEL_SIZE {
            result.0[i] = u8::conditional_select(&a.0[i], &b.0[i], choice);
        }
        result
    }
}

/// AES-128 under a fixed key, used as a random permutation on labels.
#[derive(Clone)]
pub struct LabelCipher {
    cipher: Aes128,
}

impl std::fmt::Debug for LabelCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelCipher").finish_non_exhaustive()
    }
}

impl LabelCipher {
    /// Returns a cipher keyed with `key`.
    pub fn new(key: &Label) -> Self {
        Self {
            cipher: Aes128::new(&key.0.into()),
        }
    }

    /// Encrypts a single label.
    pub fn encrypt(&self, input: &Label) -> Label {
        let mut block = input.0.into();
        self.cipher.encrypt_block(&mut block);
        let mut output = Label::default();
        output.0.copy_from_slice(&block);
        output
    }

    /// The Matyas-Meyer-Oseas compression `E(x) ^ x`.
    pub fn hash(&self, input: &Label) -> Label {
        self.encrypt(input) ^ *input
    }

    /// Evaluates the cipher on `tag || counter` (little-endian), as a PRF on `counter`.
    pub fn prf(&self, tag: u8, counter: u32) -> Label {
        let mut block = Label::default();
        block.0[0] = tag;
        block.0[1..5].copy_from_slice(&counter.to_le_bytes());
        self.encrypt(&block)
    }
}
