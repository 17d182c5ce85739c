// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Two-server PIR from a distributed point function (DPF).
//!
//! The client splits the point function `f(x) = [x == i]` over `0..2^log_n` into two keys.
//! Each server expands its key into a bit vector and returns the XOR of the rows at set bits.
//! The two bit vectors differ only at `i`, so the XOR of the answers is row `i`.
//!
//! The DPF is the tree construction of Boyle, Gilboa and Ishai, with one bit of output:
//! every node holds a seed and a control bit, and the keys carry one correction word per level.

use crate::database::{xor_into, DbParams, DbView, Row};
use crate::label::{Label, LabelCipher};
use crate::utils::{bitmap_get, bitmap_len, bitmap_set, ceil_log2};
use crate::{PirError, RowIndex, LEFT, RIGHT};
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::{Choice, ConditionallySelectable};

const PRG_LEFT_KEY: Label = Label(*b"dpf-prg-left-key");
const PRG_RIGHT_KEY: Label = Label(*b"dpf-prg-rightkey");

/// A correction word of one tree level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionWord {
    /// Seed correction.
    pub seed: Label,
    /// Control bit correction of the left child.
    pub left_bit: bool,
    /// Control bit correction of the right child.
    pub right_bit: bool,
}

/// One party's share of a point function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpfKey {
    /// The root seed.
    pub seed: Label,
    /// The root control bit.
    pub bit: bool,
    /// One correction word per level, from the root down.
    pub correction_words: Vec<CorrectionWord>,
}

struct DpfPrg {
    left: LabelCipher,
    right: LabelCipher,
}

impl DpfPrg {
    fn new() -> Self {
        Self {
            left: LabelCipher::new(&PRG_LEFT_KEY),
            right: LabelCipher::new(&PRG_RIGHT_KEY),
        }
    }

    // Returns the left and right child seeds and control bits of `seed`.
    fn expand(&self, seed: &Label) -> ((Label, bool), (Label, bool)) {
        let left = self.left.hash(seed);
        let right = self.right.hash(seed);
        (
            (left.with_lsb_cleared(), left.lsb()),
            (right.with_lsb_cleared(), right.lsb()),
        )
    }

    // Expands a node and applies the correction word if the control bit is set.
    fn corrected_children(
        &self,
        seed: &Label,
        bit: bool,
        cw: &CorrectionWord,
    ) -> ((Label, bool), (Label, bool)) {
        let ((seed_l, bit_l), (seed_r, bit_r)) = self.expand(seed);
        let correction = Label::conditional_select(&Label::default(), &cw.seed, Choice::from(u8::from(bit)));
        (
            (seed_l ^ correction, bit_l ^ (bit & cw.left_bit)),
            (seed_r ^ correction, bit_r ^ (bit & cw.right_bit)),
        )
    }
}

/// Splits the point function at `alpha` over a domain of `2^log_n` points.
pub fn gen<R: RngCore + CryptoRng>(alpha: u64, log_n: u32, rng: &mut R) -> (DpfKey, DpfKey) {
    let prg = DpfPrg::new();
    let roots: [Label; 2] = [rng.gen(), rng.gen()];
    let mut seeds = roots;
    let mut bits = [false, true];
    let mut correction_words = Vec::with_capacity(log_n as usize);

    for level in 0..log_n {
        let alpha_bit = (alpha >> (log_n - level - 1)) & 1 == 1;
        let children = [prg.expand(&seeds[0]), prg.expand(&seeds[1])];
        let ((l0, tl0), (r0, tr0)) = children[0];
        let ((l1, tl1), (r1, tr1)) = children[1];

        let lose_seed = if alpha_bit { l0 ^ l1 } else { r0 ^ r1 };
        let cw = CorrectionWord {
            seed: lose_seed,
            left_bit: tl0 ^ tl1 ^ alpha_bit ^ true,
            right_bit: tr0 ^ tr1 ^ alpha_bit,
        };

        for party in 0..2 {
            let ((seed_l, bit_l), (seed_r, bit_r)) = children[party];
            let t = bits[party];
            let mask = Label::conditional_select(&Label::default(), &cw.seed, Choice::from(u8::from(t)));
            if alpha_bit {
                seeds[party] = seed_r ^ mask;
                bits[party] = bit_r ^ (t & cw.right_bit);
            } else {
                seeds[party] = seed_l ^ mask;
                bits[party] = bit_l ^ (t & cw.left_bit);
            }
        }
        correction_words.push(cw);
    }

    (
        DpfKey {
            seed: roots[0],
            bit: false,
            correction_words: correction_words.clone(),
        },
        DpfKey {
            seed: roots[1],
            bit: true,
            correction_words,
        },
    )
}

impl DpfKey {
    /// Evaluates the share at point `x`.
    pub fn eval(&self, x: u64) -> bool {
        let prg = DpfPrg::new();
        let log_n = self.correction_words.len() as u32;
        let mut seed = self.seed;
        let mut bit = self.bit;
        for (level, cw) in self.correction_words.iter().enumerate() {
            let (left, right) = prg.corrected_children(&seed, bit, cw);
            let goes_right = (x >> (log_n - level as u32 - 1)) & 1 == 1;
            (seed, bit) = if goes_right { right } else { left };
        }
        bit
    }

    /// Evaluates the share at points `0..domain`, as a bitmap.
    pub fn eval_full(&self, domain: usize) -> Vec<u8> {
        let prg = DpfPrg::new();
        let mut out = vec![0u8; bitmap_len(domain)];
        self.eval_subtree(&prg, &self.seed, self.bit, 0, 0, domain, &mut out);
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_subtree(
        &self,
        prg: &DpfPrg,
        seed: &Label,
        bit: bool,
        level: usize,
        first_leaf: usize,
        domain: usize,
        out: &mut [u8],
    ) {
        if first_leaf >= domain {
            return;
        }
        if level == self.correction_words.len() {
            if bit {
                bitmap_set(out, first_leaf);
            }
            return;
        }
        let height = self.correction_words.len() - level;
        let half = 1usize << (height - 1);
        let ((seed_l, bit_l), (seed_r, bit_r)) =
            prg.corrected_children(seed, bit, &self.correction_words[level]);
        self.eval_subtree(prg, &seed_l, bit_l, level + 1, first_leaf, domain, out);
        self.eval_subtree(prg, &seed_r, bit_r, level + 1, first_leaf + half, domain, out);
    }
}

/// A DPF database needs no hint beyond its shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpfHintReq {}

/// The shape of a DPF database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpfHintResp {
    /// The shape of the database.
    pub params: DbParams,
}

impl DpfHintReq {
    /// Returns the shape of `db`.
    pub fn process(&self, db: DbView<'_>) -> DpfHintResp {
        DpfHintResp {
            params: db.params(),
        }
    }
}

impl DpfHintResp {
    /// Builds a client.
    pub fn init_client(self) -> DpfClient {
        DpfClient {
            params: self.params,
        }
    }
}

/// A DPF key sent to one server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpfQueryReq {
    /// The key share.
    pub key: DpfKey,
}

/// The XOR of the rows selected by a key share.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpfQueryResp {
    /// The XOR of the rows at set bits.
    pub answer: Row,
}

impl DpfQueryReq {
    /// Answers the query over `db`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` if the key depth does not match the size of `db`.
    pub fn process(&self, db: DbView<'_>) -> Result<DpfQueryResp, PirError> {
        if self.key.correction_words.len() != ceil_log2(db.num_rows()) as usize {
            return Err(PirError::MalformedRequest);
        }
        let bits = self.key.eval_full(db.num_rows());
        let answer = db.xor_rows((0..db.num_rows()).filter(|j| bitmap_get(&bits, *j)))?;
        Ok(DpfQueryResp { answer })
    }
}

/// A client of a DPF database.
#[derive(Clone, Debug)]
pub struct DpfClient {
    params: DbParams,
}

impl DpfClient {
    /// The number of rows of the database.
    pub fn num_rows(&self) -> usize {
        self.params.num_rows
    }

    /// Returns the query pair for row `i`.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds` if `i` is not a row of the database.
    pub fn query<R: RngCore + CryptoRng>(
        &self,
        i: RowIndex,
        rng: &mut R,
    ) -> Result<[DpfQueryReq; 2], PirError> {
        if i >= self.params.num_rows {
            return Err(PirError::IndexOutOfBounds {
                index: i,
                len: self.params.num_rows,
            });
        }
        let log_n = ceil_log2(self.params.num_rows);
        let (left, right) = gen(i as u64, log_n, rng);
        Ok([DpfQueryReq { key: left }, DpfQueryReq { key: right }])
    }

    /// A query for row 0.
    pub fn dummy_query<R: RngCore + CryptoRng>(&self, rng: &mut R) -> [DpfQueryReq; 2] {
        let log_n = ceil_log2(self.params.num_rows);
        let (left, right) = gen(0, log_n, rng);
        [DpfQueryReq { key: left }, DpfQueryReq { key: right }]
    }

    /// XORs the two answers.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedResponse` if an answer does not have the database's row length.
    pub fn reconstruct(&self, resps: [DpfQueryResp; 2]) -> Result<Row, PirError> {
        if resps.iter().any(|r| r.answer.len() != self.params.row_len) {
            return Err(PirError::UnexpectedResponse);
        }
        let mut out = resps[LEFT].answer.clone();
        xor_into(&mut out, &resps[RIGHT].answer);
        Ok(out)
    }
}
