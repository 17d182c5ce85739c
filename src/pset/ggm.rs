// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A puncturable pseudorandom set generator built on a GGM tree.
//!
//! A seed is the root label of a complete binary tree of height `ceil(log2(set_size))`.
//! The children of a node with label `p` are `E(p ^ b) ^ p ^ b` for `b` in `{0, 1}`,
//! where `E` is AES-128 under a fixed key and `b` is folded into the first byte.
//! Leaf `j` (for `j < set_size`) maps to the set element
//! `(low_u64 ^ high_u64) mod univ_size` of its label.
//!
//! Puncturing at leaf `pos` reveals the labels of the siblings of the nodes on the root-to-`pos`
//! path. These suffice to evaluate every leaf except `pos`.

use crate::label::{Label, LabelCipher};
use crate::utils::ceil_log2;
use std::collections::HashSet;

/// Evaluates, punctures and checks GGM-tree sets of a fixed size over a fixed universe.
#[derive(Clone, Debug)]
pub struct GgmSetGenerator {
    univ_size: usize,
    set_size: usize,
    height: u32,
    prg: LabelCipher,
}

impl GgmSetGenerator {
    /// Returns a generator of `set_size`-element subsets of `0..univ_size`.
    ///
    /// # Panics
    ///
    /// Panics if `set_size` is zero or larger than `univ_size`.
    pub fn new(univ_size: usize, set_size: usize) -> Self {
        assert!(set_size >= 1, "GGM set size must be positive");
        assert!(
            univ_size >= set_size,
            "GGM universe of size {} cannot hold sets of size {}",
            univ_size,
            set_size
        );
        Self {
            univ_size,
            set_size,
            height: ceil_log2(set_size),
            prg: LabelCipher::new(&Label::default()),
        }
    }

    /// The height of the tree.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The number of elements of an unpunctured set.
    pub fn set_size(&self) -> usize {
        self.set_size
    }

    /// The universe size.
    pub fn univ_size(&self) -> usize {
        self.univ_size
    }

    fn expand(&self, parent: &Label) -> (Label, Label) {
        let left = parent.with_discriminant(0);
        let right = parent.with_discriminant(1);
        (self.prg.hash(&left), self.prg.hash(&right))
    }

    fn leaf_elem(&self, leaf: &Label) -> usize {
        ((leaf.low_u64() ^ leaf.high_u64()) % self.univ_size as u64) as usize
    }

    // Appends the elements of the leaves under `label` whose index is below `set_size`.
    fn eval_subtree(&self, label: &Label, height: u32, first_leaf: usize, out: &mut Vec<usize>) {
        if first_leaf >= self.set_size {
            return;
        }
        if height == 0 {
            out.push(self.leaf_elem(label));
            return;
        }
        let (left, right) = self.expand(label);
        let half = 1usize << (height - 1);
        self.eval_subtree(&left, height - 1, first_leaf, out);
        self.eval_subtree(&right, height - 1, first_leaf + half, out);
    }

    /// Evaluates the set rooted at `seed`, in leaf order.
    pub fn eval(&self, seed: &Label) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.set_size);
        self.eval_subtree(seed, self.height, 0, &mut out);
        out
    }

    /// Returns the copath of leaf `pos`, from the root down.
    ///
    /// # Panics
    ///
    /// Panics if `pos` is not a leaf of the set.
    pub fn punc(&self, seed: &Label, pos: usize) -> Vec<Label> {
        assert!(
            pos < self.set_size,
            "cannot puncture position {} of a set of size {}",
            pos,
            self.set_size
        );
        let mut copath = Vec::with_capacity(self.height as usize);
        let mut node = *seed;
        for depth in 0..self.height {
            let (left, right) = self.expand(&node);
            let goes_right = (pos >> (self.height - depth - 1)) & 1 == 1;
            if goes_right {
                copath.push(left);
                node = right;
            } else {
                copath.push(right);
                node = left;
            }
        }
        copath
    }

    fn eval_punctured_subtree(
        &self,
        copath: &[Label],
        height: u32,
        first_leaf: usize,
        hole: usize,
        out: &mut Vec<usize>,
    ) {
        if height == 0 {
            return;
        }
        let half = 1usize << (height - 1);
        let sibling = &copath[0];
        if hole < first_leaf + half {
            self.eval_punctured_subtree(&copath[1..], height - 1, first_leaf, hole, out);
            self.eval_subtree(sibling, height - 1, first_leaf + half, out);
        } else {
            self.eval_subtree(sibling, height - 1, first_leaf, out);
            self.eval_punctured_subtree(&copath[1..], height - 1, first_leaf + half, hole, out);
        }
    }

    /// Evaluates every leaf but `hole` from the copath of `hole`, in leaf order.
    ///
    /// # Panics
    ///
    /// Panics if the copath length does not match the tree height, or `hole` is not a leaf.
    pub fn eval_punctured(&self, copath: &[Label], hole: usize) -> Vec<usize> {
        assert_eq!(copath.len(), self.height as usize, "copath length mismatch");
        assert!(hole < self.set_size, "hole {} out of range", hole);
        let mut out = Vec::with_capacity(self.set_size - 1);
        self.eval_punctured_subtree(copath, self.height, 0, hole, &mut out);
        out
    }

    /// Returns whether the elements are pairwise distinct.
    pub fn distinct(elems: &[usize]) -> bool {
        let mut seen = HashSet::with_capacity(elems.len());
        elems.iter().all(|e| seen.insert(*e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_eval_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(0);
        let generator = GgmSetGenerator::new(1000, 32);
        let seed: Label = rng.gen();
        let elems = generator.eval(&seed);
        assert_eq!(elems.len(), 32);
        assert!(elems.iter().all(|e| *e < 1000));
        assert_eq!(elems, generator.eval(&seed));
        assert_ne!(elems, generator.eval(&rng.gen()));
    }

    #[test]
    fn test_puncture_reveals_all_other_elements() {
        let mut rng = StdRng::seed_from_u64(1);
        for set_size in [1usize, 2, 3, 7, 8, 9, 31, 32, 33] {
            let generator = GgmSetGenerator::new(10000, set_size);
            let seed: Label = rng.gen();
            let elems = generator.eval(&seed);
            for pos in 0..set_size {
                let copath = generator.punc(&seed, pos);
                assert_eq!(copath.len(), generator.height() as usize);
                let mut punctured = generator.eval_punctured(&copath, pos);
                assert_eq!(punctured.len(), set_size - 1);

                let mut expected = elems.clone();
                expected.remove(pos);
                assert_eq!(punctured, expected, "set_size {set_size}, pos {pos}");

                punctured.push(elems[pos]);
                punctured.sort_unstable();
                let mut sorted = elems.clone();
                sorted.sort_unstable();
                assert_eq!(punctured, sorted);
            }
        }
    }

    #[test]
    fn test_distinct() {
        assert!(GgmSetGenerator::distinct(&[1, 2, 3]));
        assert!(!GgmSetGenerator::distinct(&[1, 2, 1]));
        assert!(GgmSetGenerator::distinct(&[]));
    }

    #[test]
    #[should_panic]
    fn test_set_larger_than_universe() {
        GgmSetGenerator::new(4, 5);
    }

    #[test]
    #[should_panic]
    fn test_puncture_out_of_range() {
        let generator = GgmSetGenerator::new(100, 10);
        generator.punc(&Label::default(), 10);
    }
}
