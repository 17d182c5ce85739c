// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Two-server private information retrieval (PIR) built on puncturable pseudorandom sets.
//!
//! A client reads one row of a database replicated on two non-colluding servers
//! without revealing which row it reads. The [`backend`] module holds the static
//! read protocols; the default one ([`backend::PirType::Punc`]) has sublinear online cost
//! after an offline hint. The [`updatable`] module layers a key-value store on top,
//! so that the hint can be refreshed incrementally as rows are added and deleted.

#![warn(clippy::cargo, clippy::doc_markdown, missing_docs, rustdoc::all)]

#[cfg(test)]
#[macro_use]
mod test_utils;

pub mod backend;
pub mod database;
pub mod label;
pub mod pset;
pub mod reader;
pub mod server;
pub mod updatable;
pub(crate) mod utils;

use std::num::TryFromIntError;
use thiserror::Error;

pub use backend::PirType;
pub use database::{DbParams, DbView, Row, StaticDb};
pub use reader::PirReader;
pub use server::PirServer;
pub use updatable::{
    client::{ClientConfig, ClientStats, UpdatableClient},
    server::{KvServer, ServerConfig, UpdatableServer},
};

/// The type of the keys of an updatable database.
pub type Key = u32;
/// A logical timestamp of an operation in an operation log.
pub type Timestamp = u64;
/// The index of a row in a (flat) database.
pub type RowIndex = usize;

/// The security parameter, in bits.
pub const SEC_PARAM: usize = 128;
/// Index of the left server. The left server is the one that computes hints.
pub const LEFT: usize = 0;
/// Index of the right server.
pub const RIGHT: usize = 1;

#[derive(Error, Debug, PartialEq, Eq)]
/// Errors that can occur while serving or reading a PIR database.
pub enum PirError {
    /// Returned when reading a key that is unknown to the client, or was deleted.
    #[error("Key {0:#x} not found")]
    KeyNotFound(Key),
    /// Returned when no stored set covers a row. The client needs fresh hints before reading it.
    #[error("Row {0} is not covered by any stored set")]
    NotCovered(RowIndex),
    /// Returned when querying a client that has no active layer.
    #[error("No active layers")]
    NoActiveLayers,
    /// Returned when an active layer has no hint installed.
    #[error("No hint installed for an active layer")]
    NoHint,
    /// Returned when a response does not match the request it answers.
    #[error("Unexpected response")]
    UnexpectedResponse,
    /// Returned when a request is malformed.
    #[error("Malformed request")]
    MalformedRequest,
    /// Returned when Rice-encoded data cannot be decoded.
    #[error("Rice decoding error: {0}")]
    RiceDecode(String),
    /// Returned when adding a row whose length differs from the database's.
    #[error("Row length mismatch: expected {expected}, got {got}")]
    RowLengthMismatch {
        /// The row length of the database.
        expected: usize,
        /// The row length of the offending row.
        got: usize,
    },
    /// Returned when mutating a server that is not configured as updatable.
    #[error("Server is not updatable")]
    NotUpdatable,
    /// Returned when a row index is out of the bounds of the database it is applied to.
    #[error("Index {index} out of bounds [0:{len})")]
    IndexOutOfBounds {
        /// The offending index.
        index: usize,
        /// The number of rows.
        len: usize,
    },
    /// Returned when an invalid configuration is passed to a constructor.
    #[error("Invalid configuration")]
    InvalidConfigurationError,
    /// Returned when an integer conversion fails.
    #[error("Arithmetic error encountered.")]
    IntegerConversionError(#[from] TryFromIntError),
}
