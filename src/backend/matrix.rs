// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Square-root two-server PIR: the database is laid out as a table of `height` lines
//! of `width` rows, and the client fetches the XOR of a random subset of lines from each server.

use crate::database::{xor_into, DbParams, DbView, Row};
use crate::{PirError, RowIndex, LEFT, RIGHT};
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Returns `(width, height)` of the table for a database of shape `params`.
pub fn table_shape(params: DbParams) -> (usize, usize) {
    if params.num_rows == 0 || params.row_len == 0 {
        return (1, params.num_rows);
    }
    let total = (params.num_rows * params.row_len) as f64;
    let width = ((total.sqrt() / params.row_len as f64).ceil() as usize).max(1);
    let height = (params.num_rows - 1) / width + 1;
    (width, height)
}

/// A matrix database needs no hint beyond its shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixHintReq {}

/// The shape of a matrix database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixHintResp {
    /// The shape of the database.
    pub params: DbParams,
}

impl MatrixHintReq {
    /// Returns the shape of `db`.
    pub fn process(&self, db: DbView<'_>) -> MatrixHintResp {
        MatrixHintResp {
            params: db.params(),
        }
    }
}

impl MatrixHintResp {
    /// Builds a client.
    pub fn init_client(self) -> MatrixClient {
        let (width, height) = table_shape(self.params);
        MatrixClient {
            params: self.params,
            width,
            height,
        }
    }
}

/// Selects lines of the table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixQueryReq {
    /// One entry per line.
    pub bit_vector: Vec<bool>,
}

/// The XOR of the selected lines.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixQueryResp {
    /// `width * row_len` bytes.
    pub answer: Row,
}

impl MatrixQueryReq {
    /// Answers the query over `db`. The last line is padded with zero rows.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` if the bit vector does not have one entry per line.
    pub fn process(&self, db: DbView<'_>) -> Result<MatrixQueryResp, PirError> {
        let (width, height) = table_shape(db.params());
        if self.bit_vector.len() != height {
            return Err(PirError::MalformedRequest);
        }
        let row_len = db.row_len();
        let mut answer = vec![0u8; width * row_len];
        for (line, _) in self.bit_vector.iter().enumerate().filter(|(_, b)| **b) {
            let first = line * width;
            let last = (first + width).min(db.num_rows());
            for (col, index) in (first..last).enumerate() {
                xor_into(&mut answer[col * row_len..(col + 1) * row_len], db.row(index)?);
            }
        }
        Ok(MatrixQueryResp { answer })
    }
}

/// A client of a matrix database.
#[derive(Clone, Debug)]
pub struct MatrixClient {
    params: DbParams,
    width: usize,
    height: usize,
}

/// Remembers the column of the queried row.
#[derive(Clone, Copy, Debug)]
pub struct MatrixQueryCtx {
    col: usize,
}

impl MatrixClient {
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
    ) -> Result<([MatrixQueryReq; 2], MatrixQueryCtx), PirError> {
        if i >= self.params.num_rows {
            return Err(PirError::IndexOutOfBounds {
                index: i,
                len: self.params.num_rows,
            });
        }
        let line = i / self.width;
        let left: Vec<bool> = (0..self.height).map(|_| rng.gen()).collect();
        let right = left
            .iter()
            .enumerate()
            .map(|(j, b)| *b != (j == line))
            .collect();
        Ok((
            [
                MatrixQueryReq { bit_vector: left },
                MatrixQueryReq { bit_vector: right },
            ],
            MatrixQueryCtx { col: i % self.width },
        ))
    }

    /// XORs the answers and extracts the queried column.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedResponse` if an answer does not have the length of a table line.
    pub fn reconstruct(
        &self,
        ctx: MatrixQueryCtx,
        resps: [MatrixQueryResp; 2],
    ) -> Result<Row, PirError> {
        let row_len = self.params.row_len;
        if resps.iter().any(|r| r.answer.len() != self.width * row_len) {
            return Err(PirError::UnexpectedResponse);
        }
        let mut line = resps[LEFT].answer.clone();
        xor_into(&mut line, &resps[RIGHT].answer);
        Ok(line[ctx.col * row_len..(ctx.col + 1) * row_len].to_vec())
    }
}
