// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Two-server PIR from puncturable pseudorandom sets.
//!
//! In the offline phase the left server samples about `SEC_PARAM * ln(2) * sqrt(n)` sets of size
//! `sqrt(n)` from a seed chosen by the client, and returns the XOR of the rows of each set.
//! Online, the client punctures a set containing the target row for one server
//! and a freshly generated set for the other. Each server returns the XOR of the rows of
//! its punctured set, together with one extra row in the clear.
//!
//! Each query samples one of three cases, with probabilities proportional to
//! `(set_size - 1, set_size - 1, n - 2 * (set_size - 1))`. This makes the view of either server
//! independent of the target row.
//!
//! - [`QueryCase::Refresh`]: the right server gets the stored set punctured at the target row,
//!   which is answered with the stored hint. The left server gets a fresh set containing the
//!   target, punctured at the target. Its answer becomes the hint of the fresh set, which
//!   replaces the consumed one.
//! - [`QueryCase::ExtraRight`] and [`QueryCase::ExtraLeft`]: both servers get the same fresh set,
//!   punctured at the target on one side and at another member on the other side. That member's
//!   row, which comes back in the clear, corrects the difference.

use crate::database::{xor_into, DbView, Row};
use crate::label::Label;
use crate::pset::{PuncturableSet, PuncturedSet, SetGenerator, SetKey};
use crate::utils::{ceil_log2, sample_three_way};
use crate::{PirError, RowIndex, LEFT, RIGHT, SEC_PARAM};
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};

/// The default multiplier of `n / set_size` in the number of hints, `floor(SEC_PARAM * ln(2))`.
pub const DEFAULT_NUM_HINTS_MULTIPLIER: usize = (SEC_PARAM as f64 * std::f64::consts::LN_2) as usize;

/// Asks the left server for the hints of the sets generated by `rand_seed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuncHintReq {
    /// The master key of the hint sets.
    pub rand_seed: Label,
    /// The number of hints is `num_hints_multiplier * n / set_size`.
    pub num_hints_multiplier: usize,
}

/// The hints of a [`PuncHintReq`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuncHintResp {
    /// The number of rows of the database.
    pub num_rows: usize,
    /// The row length of the database.
    pub row_len: usize,
    /// The size of each set.
    pub set_size: usize,
    /// The master key of the hint sets.
    pub set_gen_key: Label,
    /// `hints[j]` is the XOR of the rows of set `j`.
    pub hints: Vec<Row>,
}

/// The set size used for a database of `num_rows` rows: `round(sqrt(num_rows))`.
pub fn set_size_for(num_rows: usize) -> usize {
    (num_rows as f64).sqrt().round() as usize
}

/// Whether a database of `num_rows` rows is large enough for sets of at least two elements.
pub fn supports_num_rows(num_rows: usize) -> bool {
    set_size_for(num_rows) >= 2
}

impl PuncHintReq {
    /// Returns a request for hints under a fresh random seed.
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            rand_seed: rng.gen(),
            num_hints_multiplier: DEFAULT_NUM_HINTS_MULTIPLIER,
        }
    }

    /// Computes the hints over `db`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` if `db` is too small to hold sets of two elements.
    pub fn process(&self, db: DbView<'_>) -> Result<PuncHintResp, PirError> {
        let num_rows = db.num_rows();
        if !supports_num_rows(num_rows) {
            return Err(PirError::InvalidConfigurationError);
        }
        let set_size = set_size_for(num_rows);
        let num_hints = self.num_hints_multiplier * num_rows / set_size;
        log::info!(
            "PuncHintReq::process(num_rows = {}, set_size = {}, num_hints = {})",
            num_rows,
            set_size,
            num_hints
        );

        let mut set_gen = SetGenerator::new(&self.rand_seed, 0, num_rows, set_size);
        let mut hints = Vec::with_capacity(num_hints);
        for _ in 0..num_hints {
            let set = set_gen.gen();
            hints.push(db.xor_rows(set.elems().iter().copied())?);
        }

        Ok(PuncHintResp {
            num_rows,
            row_len: db.row_len(),
            set_size,
            set_gen_key: self.rand_seed,
            hints,
        })
    }
}

/// The client-held hints, one per stored set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HintTable {
    hints: Vec<Row>,
}

impl HintTable {
    fn new(hints: Vec<Row>) -> Self {
        Self { hints }
    }

    /// The number of hints.
    pub fn len(&self) -> usize {
        self.hints.len()
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    /// The hint of set `set_idx`.
    pub fn get(&self, set_idx: usize) -> &[u8] {
        &self.hints[set_idx]
    }

    /// Overwrites the hint of set `set_idx`.
    pub fn replace(&mut self, set_idx: usize, hint: Row) {
        assert_eq!(self.hints[set_idx].len(), hint.len());
        self.hints[set_idx] = hint;
    }
}

/// A query for the XOR of the rows of a punctured set, plus one row in the clear.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuncQueryReq {
    /// The set whose rows are XORed.
    pub punctured_set: PuncturedSet,
    /// The row returned in the clear.
    pub extra_elem: RowIndex,
}

/// The answer to a [`PuncQueryReq`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuncQueryResp {
    /// The XOR of the rows of the punctured set.
    pub answer: Row,
    /// The row at the requested extra position.
    pub extra_elem: Row,
}

impl PuncQueryReq {
    /// Answers the query over `db`.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds` if the set universe or the extra element exceed `db`,
    /// and `MalformedRequest` if the punctured set is inconsistent.
    pub fn process(&self, db: DbView<'_>) -> Result<PuncQueryResp, PirError> {
        let set = &self.punctured_set;
        if set.univ_size > db.num_rows() {
            return Err(PirError::IndexOutOfBounds {
                index: set.univ_size,
                len: db.num_rows(),
            });
        }
        let full_size = set
            .set_size
            .checked_add(1)
            .ok_or(PirError::MalformedRequest)?;
        if full_size > set.univ_size
            || set.hole >= full_size
            || set.keys.len() != ceil_log2(full_size) as usize
        {
            return Err(PirError::MalformedRequest);
        }
        Ok(PuncQueryResp {
            answer: db.xor_rows(set.eval())?,
            extra_elem: db.row(self.extra_elem)?.to_vec(),
        })
    }
}

/// Which of the three query shapes a query used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryCase {
    /// The stored set is consumed and replaced.
    Refresh,
    /// The right server's extra row corrects the answer.
    ExtraRight,
    /// The left server's extra row corrects the answer.
    ExtraLeft,
}

/// Client state kept between a query and its reconstruction.
#[derive(Clone, Debug)]
pub struct PuncQueryCtx {
    case: QueryCase,
    set_idx: usize,
    replacement: Option<PuncturableSet>,
}

impl PuncQueryCtx {
    /// The sampled case.
    pub fn case(&self) -> QueryCase {
        self.case
    }
}

/// A client holding hints for a punctured-set PIR database.
#[derive(Clone, Debug)]
pub struct PuncClient {
    num_rows: usize,
    row_len: usize,
    set_size: usize,
    sets: Vec<SetKey>,
    hints: HintTable,
    orig_set_gen: SetGenerator,
    set_gen: SetGenerator,
    idx_to_set: Vec<Option<u32>>,
}

impl PuncHintResp {
    /// Builds a client from the hints.
    ///
    /// New sets are drawn from a generator under a fresh key,
    /// so that they look random to the left server, which knows `set_gen_key`.
    pub fn init_client<R: RngCore + CryptoRng>(self, rng: &mut R) -> PuncClient {
        let mut orig_set_gen =
            SetGenerator::new(&self.set_gen_key, 0, self.num_rows, self.set_size);
        let mut sets = Vec::with_capacity(self.hints.len());
        let mut idx_to_set = vec![None; self.num_rows];
        for set_idx in 0..self.hints.len() {
            let set = orig_set_gen.gen();
            for &elem in set.elems() {
                idx_to_set[elem] = Some(set_idx as u32);
            }
            sets.push(set.key);
        }

        let set_gen = SetGenerator::new(
            &rng.gen(),
            orig_set_gen.next_id(),
            self.num_rows,
            self.set_size,
        );

        PuncClient {
            num_rows: self.num_rows,
            row_len: self.row_len,
            set_size: self.set_size,
            sets,
            hints: HintTable::new(self.hints),
            orig_set_gen,
            set_gen,
            idx_to_set,
        }
    }
}

impl PuncClient {
    /// The number of rows of the database.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// The size of each set.
    pub fn set_size(&self) -> usize {
        self.set_size
    }

    /// The stored hints.
    pub fn hints(&self) -> &HintTable {
        &self.hints
    }

    fn set_gen_for_set(&self, set_idx: usize) -> &SetGenerator {
        if self.sets[set_idx].id < self.orig_set_gen.next_id() {
            &self.orig_set_gen
        } else {
            &self.set_gen
        }
    }

    fn eval(&self, set_idx: usize) -> PuncturableSet {
        self.set_gen_for_set(set_idx).eval(self.sets[set_idx])
    }

    // Returns a stored set containing row `i`. Stale pointers are repaired
    // along the linear scan that resolves a missing one.
    fn find_index(&mut self, i: RowIndex) -> Option<usize> {
        if i >= self.num_rows {
            return None;
        }
        if let Some(set_idx) = self.idx_to_set[i] {
            return Some(set_idx as usize);
        }
        log::debug!("PuncClient::find_index({}) scanning {} sets", i, self.sets.len());
        for set_idx in 0..self.sets.len() {
            let set = self.eval(set_idx);
            for &elem in set.elems() {
                if elem == i {
                    return Some(set_idx);
                }
                self.idx_to_set[elem] = Some(set_idx as u32);
            }
        }
        None
    }

    fn replace_set(&mut self, set_idx: usize, new_set: &PuncturableSet, hint: Row) {
        let old_set = self.eval(set_idx);
        for &elem in old_set.elems() {
            if self.idx_to_set[elem] == Some(set_idx as u32) {
                self.idx_to_set[elem] = None;
            }
        }
        self.sets[set_idx] = new_set.key;
        for &elem in new_set.elems() {
            self.idx_to_set[elem] = Some(set_idx as u32);
        }
        self.hints.replace(set_idx, hint);
    }

    // Rejection sampling; needs `set_size >= 2`.
    fn random_member_except<R: RngCore + CryptoRng>(
        &self,
        set: &PuncturableSet,
        idx: RowIndex,
        rng: &mut R,
    ) -> RowIndex {
        loop {
            let val = set.elems()[rng.gen_range(0..self.set_size)];
            if val != idx {
                return val;
            }
        }
    }

    /// Returns the query pair for row `i`.
    ///
    /// # Errors
    ///
    /// Returns `NotCovered` if no stored set contains row `i`.
    pub fn query<R: RngCore + CryptoRng>(
        &mut self,
        i: RowIndex,
        rng: &mut R,
    ) -> Result<([PuncQueryReq; 2], PuncQueryCtx), PirError> {
        if self.hints.is_empty() {
            return Err(PirError::NoHint);
        }
        let set_idx = self.find_index(i).ok_or(PirError::NotCovered(i))?;

        let case = match sample_three_way(rng, self.set_size - 1, self.set_size - 1, self.num_rows)
        {
            1 => QueryCase::ExtraRight,
            2 => QueryCase::ExtraLeft,
            _ => QueryCase::Refresh,
        };
        log::debug!("PuncClient::query({}) case {:?}", i, case);

        let new_set = self.set_gen.gen_with(i);
        let (punc_l, extra_l, punc_r, extra_r, replacement) = match case {
            QueryCase::Refresh => {
                let old_set = self.eval(set_idx);
                let extra_l = self.random_member_except(&new_set, i, rng);
                let extra_r = self.random_member_except(&old_set, i, rng);
                let punc_l = self.set_gen.punc(&new_set, i);
                let punc_r = self.set_gen_for_set(set_idx).punc(&old_set, i);
                (punc_l, extra_l, punc_r, extra_r, Some(new_set))
            }
            QueryCase::ExtraRight => {
                let extra_r = self.random_member_except(&new_set, i, rng);
                let extra_l = self.random_member_except(&new_set, extra_r, rng);
                let punc_l = self.set_gen.punc(&new_set, extra_r);
                let punc_r = self.set_gen.punc(&new_set, i);
                (punc_l, extra_l, punc_r, extra_r, None)
            }
            QueryCase::ExtraLeft => {
                let extra_l = self.random_member_except(&new_set, i, rng);
                let extra_r = self.random_member_except(&new_set, extra_l, rng);
                let punc_l = self.set_gen.punc(&new_set, i);
                let punc_r = self.set_gen.punc(&new_set, extra_l);
                (punc_l, extra_l, punc_r, extra_r, None)
            }
        };

        Ok((
            [
                PuncQueryReq {
                    punctured_set: punc_l,
                    extra_elem: extra_l,
                },
                PuncQueryReq {
                    punctured_set: punc_r,
                    extra_elem: extra_r,
                },
            ],
            PuncQueryCtx {
                case,
                set_idx,
                replacement,
            },
        ))
    }

    /// Returns a query of the same shape as a real one, sent identically to both servers.
    pub fn dummy_query<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> [PuncQueryReq; 2] {
        let new_set = self.set_gen.gen_with(0);
        let extra = self.random_member_except(&new_set, 0, rng);
        let query = PuncQueryReq {
            punctured_set: self.set_gen.punc(&new_set, 0),
            extra_elem: extra,
        };
        [query.clone(), query]
    }

    /// Recovers the queried row. A `Refresh` query also replaces the consumed set and its hint.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedResponse` if an answer does not have the database's row length.
    pub fn reconstruct(
        &mut self,
        ctx: PuncQueryCtx,
        resps: [PuncQueryResp; 2],
    ) -> Result<Row, PirError> {
        if resps
            .iter()
            .any(|r| r.answer.len() != self.row_len || r.extra_elem.len() != self.row_len)
        {
            return Err(PirError::UnexpectedResponse);
        }

        let mut out = vec![0u8; self.row_len];
        match ctx.case {
            QueryCase::Refresh => {
                xor_into(&mut out, self.hints.get(ctx.set_idx));
                xor_into(&mut out, &resps[RIGHT].answer);
                let mut new_hint = resps[LEFT].answer.clone();
                xor_into(&mut new_hint, &out);
                if let Some(new_set) = ctx.replacement {
                    self.replace_set(ctx.set_idx, &new_set, new_hint);
                }
            }
            QueryCase::ExtraRight => {
                xor_into(&mut out, &resps[LEFT].answer);
                xor_into(&mut out, &resps[RIGHT].answer);
                xor_into(&mut out, &resps[RIGHT].extra_elem);
            }
            QueryCase::ExtraLeft => {
                xor_into(&mut out, &resps[LEFT].answer);
                xor_into(&mut out, &resps[RIGHT].answer);
                xor_into(&mut out, &resps[LEFT].extra_elem);
            }
        }
        Ok(out)
    }

    /// The number of distinct rows covered by the stored sets.
    pub fn num_covered(&self) -> usize {
        let mut covered = vec![false; self.num_rows];
        for set_idx in 0..self.sets.len() {
            for &elem in self.eval(set_idx).elems() {
                covered[elem] = true;
            }
        }
        covered.iter().filter(|c| **c).count()
    }

    /// Returns `(bits_per_key, fixed_bytes)` of client storage.
    pub fn state_size(&self) -> (usize, usize) {
        let bits_per_key = (self.hints.len() as f64).log2() as usize;
        (bits_per_key, self.hints.len() * self.row_len)
    }
}
