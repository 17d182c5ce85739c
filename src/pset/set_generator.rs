// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Keyed generation of shifted puncturable sets.

use super::ggm::GgmSetGenerator;
use crate::label::{Label, LabelCipher};
use crate::utils::math_mod;
use serde::{Deserialize, Serialize};

const SEED_TAG: u8 = 0xAA;
const SHIFT_TAG: u8 = 0xBB;

/// A compact handle from which a [`SetGenerator`] re-derives a set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SetKey {
    /// The set id; the GGM seed is derived from it.
    pub id: u32,
    /// Added to every element, modulo the universe size.
    pub shift: u32,
}

/// A fully evaluated set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PuncturableSet {
    /// The handle of the set.
    pub key: SetKey,
    seed: Label,
    univ_size: usize,
    elems: Vec<usize>,
}

impl PuncturableSet {
    /// The (shifted) elements of the set, in leaf order.
    pub fn elems(&self) -> &[usize] {
        &self.elems
    }

    /// Returns whether `idx` belongs to the set.
    pub fn contains(&self, idx: usize) -> bool {
        self.elems.contains(&idx)
    }
}

/// A set with one element removed. The other elements can still be evaluated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuncturedSet {
    /// The universe size.
    pub univ_size: usize,
    /// The number of remaining elements.
    pub set_size: usize,
    /// The copath of the hole, from the root down.
    pub keys: Vec<Label>,
    /// The leaf position of the removed element.
    pub hole: usize,
    /// The shift of the original set.
    pub shift: u32,
}

impl PuncturedSet {
    /// Evaluates the remaining elements.
    ///
    /// # Panics
    ///
    /// Panics if the punctured set is malformed.
    pub fn eval(&self) -> Vec<usize> {
        let generator = GgmSetGenerator::new(self.univ_size, self.set_size + 1);
        let mut elems = generator.eval_punctured(&self.keys, self.hole);
        shift_elems(&mut elems, self.shift, self.univ_size);
        elems
    }
}

fn shift_elems(elems: &mut [usize], shift: u32, univ_size: usize) {
    if shift == 0 {
        return;
    }
    for elem in elems.iter_mut() {
        *elem = ((*elem as u64 + u64::from(shift)) % univ_size as u64) as usize;
    }
}

/// Generates pseudorandom sets with consecutive ids from a master key.
///
/// The GGM seed of set `id` is `AES_k(0xAA || id)`, and its shift is derived from `AES_k(0xBB || id)`.
/// Seeds whose leaves collide are skipped, so ids of generated sets need not be consecutive.
#[derive(Clone, Debug)]
pub struct SetGenerator {
    base: GgmSetGenerator,
    next_id: u32,
    id_gen: LabelCipher,
}

impl SetGenerator {
    /// Returns a generator of `set_size`-element subsets of `0..univ_size`
    /// whose first set has id `start_id`.
    pub fn new(master_key: &Label, start_id: u32, univ_size: usize, set_size: usize) -> Self {
        Self {
            base: GgmSetGenerator::new(univ_size, set_size),
            next_id: start_id,
            id_gen: LabelCipher::new(master_key),
        }
    }

    /// The id that the next generated set will try first.
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// The universe size.
    pub fn univ_size(&self) -> usize {
        self.base.univ_size()
    }

    /// The number of elements per set.
    pub fn set_size(&self) -> usize {
        self.base.set_size()
    }

    // Advances to the next id whose unshifted elements are distinct.
    fn gen_unshifted(&mut self) -> PuncturableSet {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            let seed = self.id_gen.prf(SEED_TAG, id);
            let elems = self.base.eval(&seed);
            if GgmSetGenerator::distinct(&elems) {
                return PuncturableSet {
                    key: SetKey { id, shift: 0 },
                    seed,
                    univ_size: self.univ_size(),
                    elems,
                };
            }
        }
    }

    fn apply_shift(&self, set: &mut PuncturableSet, shift: u32) {
        set.key.shift = shift;
        shift_elems(&mut set.elems, shift, self.univ_size());
    }

    /// Generates a fresh set with a pseudorandom shift.
    pub fn gen(&mut self) -> PuncturableSet {
        let mut set = self.gen_unshifted();
        let shift = self.id_gen.prf(SHIFT_TAG, set.key.id).low_u64() % self.univ_size() as u64;
        self.apply_shift(&mut set, shift as u32);
        set
    }

    /// Generates a fresh set containing `val`, shifted so that `val` lands on a pseudorandom leaf.
    pub fn gen_with(&mut self, val: usize) -> PuncturableSet {
        let mut set = self.gen_unshifted();
        let pos = (self.id_gen.prf(SHIFT_TAG, set.key.id).low_u64() % self.set_size() as u64) as usize;
        let shift = math_mod(val as i64 - set.elems[pos] as i64, self.univ_size());
        self.apply_shift(&mut set, shift as u32);
        set
    }

    /// Re-derives the set with handle `key`.
    pub fn eval(&self, key: SetKey) -> PuncturableSet {
        let seed = self.id_gen.prf(SEED_TAG, key.id);
        let mut set = PuncturableSet {
            key: SetKey { id: key.id, shift: 0 },
            seed,
            univ_size: self.univ_size(),
            elems: self.base.eval(&seed),
        };
        self.apply_shift(&mut set, key.shift);
        set
    }

    /// Removes `idx` from `set`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is not an element of `set`.
    pub fn punc(&self, set: &PuncturableSet, idx: usize) -> PuncturedSet {
        let hole = set
            .elems
            .iter()
            .position(|e| *e == idx)
            .unwrap_or_else(|| panic!("Failed to find idx {} in set {:?}", idx, set.key));
        PuncturedSet {
            univ_size: set.univ_size,
            set_size: self.set_size() - 1,
            keys: self.base.punc(&set.seed, hole),
            hole,
            shift: set.key.shift,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_gen_and_eval_agree() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut generator = SetGenerator::new(&rng.gen(), 0, 1000, 32);
        for _ in 0..20 {
            let set = generator.gen();
            assert_eq!(set.elems().len(), 32);
            assert!(GgmSetGenerator::distinct(set.elems()));
            assert!(set.key.shift < 1000);
            assert_eq!(generator.eval(set.key), set);
        }
    }

    #[test]
    fn test_ids_increase() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut generator = SetGenerator::new(&rng.gen(), 100, 50, 7);
        let a = generator.gen();
        let b = generator.gen();
        assert!(a.key.id >= 100);
        assert!(b.key.id > a.key.id);
        assert!(generator.next_id() > b.key.id);
    }

    #[test]
    fn test_gen_with_contains_value() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut generator = SetGenerator::new(&rng.gen(), 0, 500, 22);
        for _ in 0..50 {
            let val = rng.gen_range(0..500);
            let set = generator.gen_with(val);
            assert!(set.contains(val));
            assert_eq!(generator.eval(set.key), set);
        }
    }

    #[test]
    fn test_punctured_set_eval() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut generator = SetGenerator::new(&rng.gen(), 0, 300, 17);
        let set = generator.gen_with(5);
        for &elem in set.elems() {
            let punctured = generator.punc(&set, elem);
            let mut remaining = punctured.eval();
            assert_eq!(remaining.len(), 16);
            assert!(!remaining.contains(&elem));
            remaining.push(elem);
            remaining.sort_unstable();
            let mut expected = set.elems().to_vec();
            expected.sort_unstable();
            assert_eq!(remaining, expected);
        }
    }

    #[test]
    #[should_panic]
    fn test_puncture_non_member() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut generator = SetGenerator::new(&rng.gen(), 0, 300, 17);
        let set = generator.gen();
        let outside = (0..300).find(|i| !set.contains(*i)).unwrap();
        generator.punc(&set, outside);
    }
}
