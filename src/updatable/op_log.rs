// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The append-only log of database operations, and its compaction.
//!
//! The operation at position `p` of the log has timestamp `initial_timestamp + p`. Compaction
//! only ever drops entries, so the timestamp one past the last entry never changes.

use crate::database::Row;
use crate::{Key, Timestamp};
use std::collections::HashMap;

/// One mutation of the database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DbOp {
    /// The key being added or deleted.
    pub key: Key,
    /// Whether this is a deletion.
    pub delete: bool,
    /// The added row. Servers keep it; clients only learn keys.
    pub data: Option<Row>,
}

impl DbOp {
    /// Adds `row` under `key`.
    pub fn add(key: Key, row: Row) -> Self {
        Self {
            key,
            delete: false,
            data: Some(row),
        }
    }

    /// Deletes `key`.
    pub fn delete(key: Key) -> Self {
        Self {
            key,
            delete: true,
            data: None,
        }
    }

    /// An operation on `key` whose row is unknown.
    pub fn key_only(key: Key, delete: bool) -> Self {
        Self {
            key,
            delete,
            data: None,
        }
    }
}

/// Compacts the prefix `ops[..end]`.
///
/// Within the prefix, only the last addition of each key survives, and only if the key is not
/// deleted later in the prefix. Every deletion in the prefix is dropped. Survivors keep their
/// relative order and are followed by `ops[end..]` unchanged.
///
/// # Panics
///
/// Panics if `end > ops.len()`.
pub fn defrag(ops: Vec<DbOp>, end: usize) -> Vec<DbOp> {
    assert!(end <= ops.len(), "defrag end {end} beyond log of {}", ops.len());
    let mut last_add: HashMap<Key, usize> = HashMap::new();
    for (i, op) in ops[..end].iter().enumerate() {
        if op.delete {
            last_add.remove(&op.key);
        } else {
            last_add.insert(op.key, i);
        }
    }
    ops.into_iter()
        .enumerate()
        .filter(|(i, op)| *i >= end || last_add.get(&op.key) == Some(i))
        .map(|(_, op)| op)
        .collect()
}

/// A log of operations with its timestamps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OpLog {
    initial_timestamp: Timestamp,
    defrag_timestamp: Timestamp,
    ops: Vec<DbOp>,
}

impl OpLog {
    /// An empty log starting at timestamp 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// The timestamp of the first entry.
    pub fn initial_timestamp(&self) -> Timestamp {
        self.initial_timestamp
    }

    /// The end of the most recent compacted prefix. Clients behind it cannot catch up
    /// incrementally.
    pub fn defrag_timestamp(&self) -> Timestamp {
        self.defrag_timestamp
    }

    /// The timestamp the next entry will get.
    pub fn next_timestamp(&self) -> Timestamp {
        self.initial_timestamp + self.ops.len() as Timestamp
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the log has no entries.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// All entries.
    pub fn ops(&self) -> &[DbOp] {
        &self.ops
    }

    /// Appends `ops`.
    pub fn append<I: IntoIterator<Item = DbOp>>(&mut self, ops: I) {
        self.ops.extend(ops);
    }

    /// The entries with timestamp at least `timestamp`.
    pub fn ops_since(&self, timestamp: Timestamp) -> &[DbOp] {
        let first = timestamp.saturating_sub(self.initial_timestamp);
        let first = usize::try_from(first).map_or(self.ops.len(), |f| f.min(self.ops.len()));
        &self.ops[first..]
    }

    /// Empties the log and restarts it at the given timestamps.
    pub fn reset(&mut self, initial_timestamp: Timestamp, defrag_timestamp: Timestamp) {
        self.ops.clear();
        self.initial_timestamp = initial_timestamp;
        self.defrag_timestamp = defrag_timestamp;
    }

    /// Compacts the first `end` entries with [`defrag`] and returns the number of entries
    /// dropped.
    pub fn compact(&mut self, end: usize) -> usize {
        let end = end.min(self.ops.len());
        let before = self.ops.len();
        self.ops = defrag(std::mem::take(&mut self.ops), end);
        let dropped = before - self.ops.len();
        self.defrag_timestamp = self.initial_timestamp + end as Timestamp;
        self.initial_timestamp += dropped as Timestamp;
        dropped
    }
}
