// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The server side of the updatable key-value store.

use super::op_log::{DbOp, OpLog};
use super::position_map::PositionMap;
use super::rice::{encode_rice_integers, RiceDeltaEncoding};
use crate::backend::{HintReq, HintResp, QueryReq, QueryResp};
use crate::database::{Row, StaticDb};
use crate::server::PirServer;
use crate::utils::{bitmap_len, bitmap_set};
use crate::{Key, PirError, RowIndex, Timestamp};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// The default bound on the ratio between the length of the operation log and the number of
/// live keys.
pub const DEFAULT_DEFRAG_RATIO: f64 = 4.0;

/// Asks for the operations a client has not seen yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyUpdatesReq {
    /// The last defragmentation timestamp the client knows of.
    pub defrag_timestamp: Timestamp,
    /// The timestamp of the first operation the client is missing.
    pub next_timestamp: Timestamp,
}

/// The keys of the operations starting at `initial_timestamp`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyUpdatesResp {
    /// The timestamp of the first returned operation.
    pub initial_timestamp: Timestamp,
    /// The server's defragmentation timestamp.
    pub defrag_timestamp: Timestamp,
    /// The keys, unless they are sent in `keys_rice`.
    pub keys: Vec<Key>,
    /// The keys, Rice-coded, when they are ascending.
    pub keys_rice: Option<RiceDeltaEncoding>,
    /// One bit per operation, set for deletions. Empty if there is no deletion.
    pub is_deletion: Vec<u8>,
    /// The row length of the database.
    pub row_len: usize,
    /// Set when the client is behind the defragmentation timestamp and must drop its history.
    pub should_delete_history: bool,
}

/// Hint request for the rows `first_row..first_row + num_rows` of one waterfall layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerHintReq {
    /// The request to run over the layer.
    pub req: HintReq,
    /// The first row of the layer.
    pub first_row: RowIndex,
    /// The number of rows of the layer.
    pub num_rows: usize,
}

impl LayerHintReq {
    /// Computes the hint over the layer's rows of `db`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` if the row range overflows, and `IndexOutOfBounds` if it does
    /// not lie within `db`.
    pub fn process(&self, db: &StaticDb) -> Result<HintResp, PirError> {
        let end_row = self
            .first_row
            .checked_add(self.num_rows)
            .ok_or(PirError::MalformedRequest)?;
        self.req.process(db.slice(self.first_row, end_row)?)
    }
}

/// One sub-query per active waterfall layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayeredQueryReq {
    /// The sub-queries, in layer order.
    pub reqs: Vec<QueryReq>,
    /// Layer `l` spans rows `first_row[l]..first_row[l + 1]`.
    pub first_row: Vec<RowIndex>,
}

/// The answers to a [`LayeredQueryReq`], in layer order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayeredQueryResp(pub Vec<QueryResp>);

impl LayeredQueryReq {
    /// Answers every sub-query over its layer of `db`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` if there is not one more boundary than sub-queries.
    pub fn process(&self, db: &StaticDb) -> Result<LayeredQueryResp, PirError> {
        if self.first_row.len() != self.reqs.len() + 1 {
            return Err(PirError::MalformedRequest);
        }
        self.reqs
            .iter()
            .zip(self.first_row.windows(2))
            .map(|(req, bounds)| req.process(db.slice(bounds[0], bounds[1])?))
            .collect::<Result<Vec<_>, _>>()
            .map(LayeredQueryResp)
    }
}

/// A server replica of an updatable database.
pub trait UpdatableServer: PirServer {
    /// Returns the operations the client has not seen yet.
    fn key_updates(&self, req: &KeyUpdatesReq) -> Result<KeyUpdatesResp, PirError>;

    /// Computes the hint of one waterfall layer.
    fn layer_hint(&self, req: &LayerHintReq) -> Result<HintResp, PirError>;

    /// Answers one sub-query per active layer.
    fn layer_answer(&self, req: &LayeredQueryReq) -> Result<LayeredQueryResp, PirError>;
}

/// Configuration of a [`KvServer`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ServerConfig {
    /// The log is compacted whenever it holds more than `defrag_ratio` entries per live key.
    pub defrag_ratio: f64,
    /// Whether [`KvServer::add_rows`] and [`KvServer::delete_rows`] are allowed.
    pub updatable: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            defrag_ratio: DEFAULT_DEFRAG_RATIO,
            updatable: true,
        }
    }
}

/// An in-memory key-value server.
///
/// Rows are stored in log order: every addition appends a row, and the rows of superseded or
/// deleted keys stay in place until the log is compacted.
#[derive(Clone, Debug)]
pub struct KvServer {
    config: ServerConfig,
    kv: PositionMap,
    db: StaticDb,
    log: OpLog,
}

impl Default for KvServer {
    fn default() -> Self {
        Self::new()
    }
}

impl KvServer {
    /// An empty updatable server with the default configuration.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            kv: PositionMap::new(),
            db: StaticDb::new(0),
            log: OpLog::new(),
        }
    }

    /// A server with configuration `config`, holding `rows` under `keys`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfigurationError` if the defrag ratio is below 1 or the numbers of keys
    /// and rows differ, and `RowLengthMismatch` if the rows do not all have the same length.
    pub fn new_with_config(
        config: ServerConfig,
        keys: &[Key],
        rows: Vec<Row>,
    ) -> Result<Self, PirError> {
        if config.defrag_ratio.is_nan() || config.defrag_ratio < 1.0 {
            return Err(PirError::InvalidConfigurationError);
        }
        let mut server = Self {
            config,
            ..Self::new()
        };
        server.insert_rows(keys, rows)?;
        server.maybe_defrag()?;
        Ok(server)
    }

    /// The configuration of the server.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The number of live keys.
    pub fn num_keys(&self) -> usize {
        self.kv.len()
    }

    /// The number of rows, live or dead.
    pub fn num_rows(&self) -> usize {
        self.db.num_rows()
    }

    /// The number of entries of the operation log.
    pub fn num_ops(&self) -> usize {
        self.log.len()
    }

    /// The live keys, in no particular order.
    pub fn keys(&self) -> Vec<Key> {
        self.kv.keys().collect()
    }

    /// The current value of `key`.
    pub fn row(&self, key: Key) -> Result<&[u8], PirError> {
        let pos = self.kv.get(key).ok_or(PirError::KeyNotFound(key))?;
        self.db.row(pos)
    }

    /// Adds `rows` under `keys`. Re-adding a key replaces its value.
    ///
    /// # Errors
    ///
    /// Returns `NotUpdatable` on a non-updatable server, `InvalidConfigurationError` if the
    /// numbers of keys and rows differ, and `RowLengthMismatch` if a row does not have the
    /// database's row length. Nothing is added on error.
    pub fn add_rows(&mut self, keys: &[Key], rows: Vec<Row>) -> Result<(), PirError> {
        if !self.config.updatable {
            return Err(PirError::NotUpdatable);
        }
        self.insert_rows(keys, rows)?;
        self.maybe_defrag()
    }

    /// Deletes `keys`.
    ///
    /// # Errors
    ///
    /// Returns `NotUpdatable` on a non-updatable server.
    pub fn delete_rows(&mut self, keys: &[Key]) -> Result<(), PirError> {
        if !self.config.updatable {
            return Err(PirError::NotUpdatable);
        }
        let ops: Vec<DbOp> = keys.iter().map(|key| DbOp::delete(*key)).collect();
        self.kv.replay(&ops);
        self.log.append(ops);
        self.maybe_defrag()
    }

    fn insert_rows(&mut self, keys: &[Key], rows: Vec<Row>) -> Result<(), PirError> {
        if keys.len() != rows.len() {
            return Err(PirError::InvalidConfigurationError);
        }
        let expected = match rows.first() {
            None => return Ok(()),
            Some(first) if self.db.num_rows() == 0 => first.len(),
            Some(_) => self.db.row_len(),
        };
        if let Some(row) = rows.iter().find(|row| row.len() != expected) {
            return Err(PirError::RowLengthMismatch {
                expected,
                got: row.len(),
            });
        }
        if self.db.num_rows() == 0 {
            self.db = StaticDb::new(expected);
        }

        let mut ops: Vec<DbOp> = keys
            .iter()
            .zip(rows)
            .map(|(key, row)| DbOp::add(*key, row))
            .collect();
        ops.sort_by_key(|op| op.key);
        for row in ops.iter().filter_map(|op| op.data.as_deref()) {
            self.db.push_row(row)?;
        }
        self.kv.replay(&ops);
        self.log.append(ops);
        debug!("added {} rows, {} ops in log", keys.len(), self.log.len());
        Ok(())
    }

    fn over_defrag_bound(&self) -> bool {
        self.log.len() as f64 > self.config.defrag_ratio * self.kv.len() as f64
    }

    /// Compacts the log if it exceeds the defrag bound, then rebuilds the rows from it.
    ///
    /// The compacted prefix is the first half of the log, extended to the previous compacted
    /// prefix, or the whole log if that is not enough.
    fn maybe_defrag(&mut self) -> Result<(), PirError> {
        if !self.over_defrag_bound() {
            return Ok(());
        }
        let before = self.log.len();
        let previous_end = (self.log.defrag_timestamp() - self.log.initial_timestamp()) as usize;
        self.log.compact((before / 2).max(previous_end));
        if self.over_defrag_bound() {
            self.log.compact(self.log.len());
        }

        self.db = StaticDb::new(self.db.row_len());
        for row in self.log.ops().iter().filter_map(|op| op.data.as_deref()) {
            self.db.push_row(row)?;
        }
        self.kv.clear();
        self.kv.replay(self.log.ops());
        info!(
            "defragmented log from {} to {} ops, initial timestamp {}, defrag timestamp {}",
            before,
            self.log.len(),
            self.log.initial_timestamp(),
            self.log.defrag_timestamp()
        );
        Ok(())
    }
}

impl PirServer for KvServer {
    fn hint(&self, req: &HintReq) -> Result<HintResp, PirError> {
        self.db.hint(req)
    }

    fn answer(&self, req: &QueryReq) -> Result<QueryResp, PirError> {
        self.db.answer(req)
    }
}

impl UpdatableServer for KvServer {
    fn key_updates(&self, req: &KeyUpdatesReq) -> Result<KeyUpdatesResp, PirError> {
        let mut next_timestamp = req.next_timestamp;
        let should_delete_history = next_timestamp < self.log.defrag_timestamp();
        if should_delete_history {
            next_timestamp = self.log.initial_timestamp();
        }
        let ops = self.log.ops_since(next_timestamp);

        let keys: Vec<Key> = ops.iter().map(|op| op.key).collect();
        let mut is_deletion = vec![0u8; bitmap_len(ops.len())];
        for (i, _) in ops.iter().enumerate().filter(|(_, op)| op.delete) {
            bitmap_set(&mut is_deletion, i);
        }
        if is_deletion.iter().all(|b| *b == 0) {
            is_deletion.clear();
        }

        let (keys, keys_rice) = if keys.windows(2).all(|w| w[0] <= w[1]) {
            (vec![], encode_rice_integers(&keys)?)
        } else {
            (keys, None)
        };
        Ok(KeyUpdatesResp {
            initial_timestamp: self.log.next_timestamp() - ops.len() as Timestamp,
            defrag_timestamp: self.log.defrag_timestamp(),
            keys,
            keys_rice,
            is_deletion,
            row_len: self.db.row_len(),
            should_delete_history,
        })
    }

    fn layer_hint(&self, req: &LayerHintReq) -> Result<HintResp, PirError> {
        req.process(&self.db)
    }

    fn layer_answer(&self, req: &LayeredQueryReq) -> Result<LayeredQueryResp, PirError> {
        req.process(&self.db)
    }
}
