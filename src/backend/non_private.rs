// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A non-private baseline that sends the queried index in the clear.

use crate::database::{DbParams, DbView, Row};
use crate::{PirError, RowIndex};
use serde::{Deserialize, Serialize};

/// Asks for the shape of the database.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonPrivateHintReq {}

/// The shape of the database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonPrivateHintResp {
    /// The shape of the database.
    pub params: DbParams,
}

impl NonPrivateHintReq {
    /// Returns the shape of `db`.
    pub fn process(&self, db: DbView<'_>) -> NonPrivateHintResp {
        NonPrivateHintResp {
            params: db.params(),
        }
    }
}

impl NonPrivateHintResp {
    /// Builds a client.
    pub fn init_client(self) -> NonPrivateClient {
        NonPrivateClient {
            params: self.params,
        }
    }
}

/// Asks for one row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonPrivateQueryReq {
    /// The requested row.
    pub index: RowIndex,
}

/// The requested row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonPrivateQueryResp {
    /// The row.
    pub row: Row,
}

impl NonPrivateQueryReq {
    /// Returns the requested row of `db`.
    pub fn process(&self, db: DbView<'_>) -> Result<NonPrivateQueryResp, PirError> {
        Ok(NonPrivateQueryResp {
            row: db.row(self.index)?.to_vec(),
        })
    }
}

/// A client that reveals what it reads.
#[derive(Clone, Debug)]
pub struct NonPrivateClient {
    params: DbParams,
}

impl NonPrivateClient {
    /// The number of rows of the database.
    pub fn num_rows(&self) -> usize {
        self.params.num_rows
    }

    /// Sends `i` to both servers.
    pub fn query(&self, i: RowIndex) -> Result<[NonPrivateQueryReq; 2], PirError> {
        if i >= self.params.num_rows {
            return Err(PirError::IndexOutOfBounds {
                index: i,
                len: self.params.num_rows,
            });
        }
        Ok([NonPrivateQueryReq { index: i }, NonPrivateQueryReq { index: i }])
    }

    /// A query for row 0.
    pub fn dummy_query(&self) -> [NonPrivateQueryReq; 2] {
        [NonPrivateQueryReq { index: 0 }, NonPrivateQueryReq { index: 0 }]
    }

    /// Returns the left answer.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedResponse` if the answer does not have the database's row length.
    pub fn reconstruct(&self, resps: [NonPrivateQueryResp; 2]) -> Result<Row, PirError> {
        let [left, _right] = resps;
        if left.row.len() != self.params.row_len {
            return Err(PirError::UnexpectedResponse);
        }
        Ok(left.row)
    }
}
