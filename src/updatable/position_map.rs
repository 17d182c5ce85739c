// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Maps keys to the rows holding their current value.

use super::op_log::DbOp;
use crate::{Key, RowIndex};
use std::collections::HashMap;

/// Key to row mapping, built by replaying an operation log.
///
/// Every addition occupies the next row, so a key added twice points at its latest row and
/// the earlier one becomes dead. Deletions only remove the mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PositionMap {
    key_to_pos: HashMap<Key, RowIndex>,
    num_rows: usize,
}

impl PositionMap {
    /// An empty map over zero rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every key and row.
    pub fn clear(&mut self) {
        self.key_to_pos.clear();
        self.num_rows = 0;
    }

    /// The row holding `key`, if it is live.
    pub fn get(&self, key: Key) -> Option<RowIndex> {
        self.key_to_pos.get(&key).copied()
    }

    /// The number of live keys.
    pub fn len(&self) -> usize {
        self.key_to_pos.len()
    }

    /// Whether no key is live.
    pub fn is_empty(&self) -> bool {
        self.key_to_pos.is_empty()
    }

    /// The number of rows, live or dead.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// The live keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.key_to_pos.keys().copied()
    }

    /// Applies `ops` in order.
    pub fn replay(&mut self, ops: &[DbOp]) {
        for op in ops {
            if op.delete {
                self.key_to_pos.remove(&op.key);
            } else {
                self.key_to_pos.insert(op.key, self.num_rows);
                self.num_rows += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay() {
        let mut map = PositionMap::new();
        map.replay(&[
            DbOp::key_only(10, false),
            DbOp::key_only(20, false),
            DbOp::key_only(10, false),
        ]);
        assert_eq!(map.get(10), Some(2));
        assert_eq!(map.get(20), Some(1));
        assert_eq!(map.num_rows(), 3);
        assert_eq!(map.len(), 2);

        map.replay(&[DbOp::key_only(20, true), DbOp::key_only(30, true)]);
        assert_eq!(map.get(20), None);
        assert_eq!(map.num_rows(), 3);
        let mut keys: Vec<Key> = map.keys().collect();
        keys.sort_unstable();
        assert_eq!(keys, [10]);

        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.num_rows(), 0);
    }
}
