// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Static two-server PIR protocols.
//!
//! Every protocol follows the same four steps. The client sends a hint request to the left
//! server and builds a [`PirClient`] from the response. To read row `i`, the client issues a
//! [`QueryReq`] to each server. Each server answers its query over its replica. The client
//! reconstructs row `i` from the two [`QueryResp`]s.
//!
//! The set of protocols is closed: messages are tagged with their [`PirType`] and dispatched by
//! exhaustive matching.

pub mod dpf;
pub mod matrix;
pub mod non_private;
pub mod punc;

use crate::database::{DbParams, DbView, Row};
use crate::{PirError, RowIndex};
use dpf::{DpfClient, DpfHintReq, DpfHintResp, DpfQueryReq, DpfQueryResp};
use duplicate::duplicate_item;
use matrix::{MatrixClient, MatrixHintReq, MatrixHintResp, MatrixQueryCtx, MatrixQueryReq, MatrixQueryResp};
use non_private::{
    NonPrivateClient, NonPrivateHintReq, NonPrivateHintResp, NonPrivateQueryReq,
    NonPrivateQueryResp,
};
use punc::{PuncClient, PuncHintReq, PuncHintResp, PuncQueryCtx, PuncQueryReq, PuncQueryResp};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// The available PIR protocols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PirType {
    /// Punctured pseudorandom sets, with an offline hint.
    Punc,
    /// Distributed point functions.
    Dpf,
    /// Square-root XOR PIR.
    Matrix,
    /// No privacy.
    NonPrivate,
}

impl PirType {
    /// All protocols.
    pub const ALL: [PirType; 4] = [
        PirType::Punc,
        PirType::Dpf,
        PirType::Matrix,
        PirType::NonPrivate,
    ];
}

/// A hint request, sent to the left server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HintReq {
    #[allow(missing_docs)]
    Punc(PuncHintReq),
    #[allow(missing_docs)]
    Dpf(DpfHintReq),
    #[allow(missing_docs)]
    Matrix(MatrixHintReq),
    #[allow(missing_docs)]
    NonPrivate(NonPrivateHintReq),
}

/// The response to a [`HintReq`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HintResp {
    #[allow(missing_docs)]
    Punc(PuncHintResp),
    #[allow(missing_docs)]
    Dpf(DpfHintResp),
    #[allow(missing_docs)]
    Matrix(MatrixHintResp),
    #[allow(missing_docs)]
    NonPrivate(NonPrivateHintResp),
}

/// A query sent to one server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryReq {
    #[allow(missing_docs)]
    Punc(PuncQueryReq),
    #[allow(missing_docs)]
    Dpf(DpfQueryReq),
    #[allow(missing_docs)]
    Matrix(MatrixQueryReq),
    #[allow(missing_docs)]
    NonPrivate(NonPrivateQueryReq),
}

/// The answer of one server to a [`QueryReq`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryResp {
    #[allow(missing_docs)]
    Punc(PuncQueryResp),
    #[allow(missing_docs)]
    Dpf(DpfQueryResp),
    #[allow(missing_docs)]
    Matrix(MatrixQueryResp),
    #[allow(missing_docs)]
    NonPrivate(NonPrivateQueryResp),
}

/// Client state kept between a query and its reconstruction.
#[derive(Clone, Debug)]
pub enum QueryCtx {
    #[allow(missing_docs)]
    Punc(PuncQueryCtx),
    #[allow(missing_docs)]
    Dpf,
    #[allow(missing_docs)]
    Matrix(MatrixQueryCtx),
    #[allow(missing_docs)]
    NonPrivate,
}

/// A client of one of the PIR protocols.
#[derive(Clone, Debug)]
pub enum PirClient {
    #[allow(missing_docs)]
    Punc(PuncClient),
    #[allow(missing_docs)]
    Dpf(DpfClient),
    #[allow(missing_docs)]
    Matrix(MatrixClient),
    #[allow(missing_docs)]
    NonPrivate(NonPrivateClient),
}

#[duplicate_item(
    hint_resp_type;
    [DpfHintResp];
    [MatrixHintResp];
    [NonPrivateHintResp];
)]
impl hint_resp_type {
    /// The number of rows of the database.
    pub fn num_rows(&self) -> usize {
        self.params.num_rows
    }
}

impl HintReq {
    /// Returns a fresh hint request for `pir_type`.
    pub fn new<R: RngCore + CryptoRng>(pir_type: PirType, rng: &mut R) -> Self {
        match pir_type {
            PirType::Punc => HintReq::Punc(PuncHintReq::new(rng)),
            PirType::Dpf => HintReq::Dpf(DpfHintReq {}),
            PirType::Matrix => HintReq::Matrix(MatrixHintReq {}),
            PirType::NonPrivate => HintReq::NonPrivate(NonPrivateHintReq {}),
        }
    }

    /// The protocol of the request.
    pub fn pir_type(&self) -> PirType {
        match self {
            HintReq::Punc(_) => PirType::Punc,
            HintReq::Dpf(_) => PirType::Dpf,
            HintReq::Matrix(_) => PirType::Matrix,
            HintReq::NonPrivate(_) => PirType::NonPrivate,
        }
    }

    /// Computes the hint over `db`.
    pub fn process(&self, db: DbView<'_>) -> Result<HintResp, PirError> {
        Ok(match self {
            HintReq::Punc(req) => HintResp::Punc(req.process(db)?),
            HintReq::Dpf(req) => HintResp::Dpf(req.process(db)),
            HintReq::Matrix(req) => HintResp::Matrix(req.process(db)),
            HintReq::NonPrivate(req) => HintResp::NonPrivate(req.process(db)),
        })
    }
}

impl HintResp {
    /// The number of rows of the database the hint was computed over.
    pub fn num_rows(&self) -> usize {
        match self {
            HintResp::Punc(resp) => resp.num_rows,
            HintResp::Dpf(resp) => resp.num_rows(),
            HintResp::Matrix(resp) => resp.num_rows(),
            HintResp::NonPrivate(resp) => resp.num_rows(),
        }
    }

    /// Builds a client from the hint.
    pub fn init_client<R: RngCore + CryptoRng>(self, rng: &mut R) -> PirClient {
        match self {
            HintResp::Punc(resp) => PirClient::Punc(resp.init_client(rng)),
            HintResp::Dpf(resp) => PirClient::Dpf(resp.init_client()),
            HintResp::Matrix(resp) => PirClient::Matrix(resp.init_client()),
            HintResp::NonPrivate(resp) => PirClient::NonPrivate(resp.init_client()),
        }
    }
}

impl QueryReq {
    /// Answers the query over `db`.
    pub fn process(&self, db: DbView<'_>) -> Result<QueryResp, PirError> {
        Ok(match self {
            QueryReq::Punc(req) => QueryResp::Punc(req.process(db)?),
            QueryReq::Dpf(req) => QueryResp::Dpf(req.process(db)?),
            QueryReq::Matrix(req) => QueryResp::Matrix(req.process(db)?),
            QueryReq::NonPrivate(req) => QueryResp::NonPrivate(req.process(db)?),
        })
    }
}

impl PirClient {
    /// Builds a client for a protocol whose hint depends only on the shape of the database.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` for [`PirType::Punc`], whose hint needs the rows.
    pub fn without_hint(pir_type: PirType, params: DbParams) -> Result<Self, PirError> {
        match pir_type {
            PirType::Punc => Err(PirError::InvalidConfigurationError),
            PirType::Dpf => Ok(PirClient::Dpf(DpfHintResp { params }.init_client())),
            PirType::Matrix => Ok(PirClient::Matrix(MatrixHintResp { params }.init_client())),
            PirType::NonPrivate => Ok(PirClient::NonPrivate(
                NonPrivateHintResp { params }.init_client(),
            )),
        }
    }

    /// The protocol of the client.
    pub fn pir_type(&self) -> PirType {
        match self {
            PirClient::Punc(_) => PirType::Punc,
            PirClient::Dpf(_) => PirType::Dpf,
            PirClient::Matrix(_) => PirType::Matrix,
            PirClient::NonPrivate(_) => PirType::NonPrivate,
        }
    }

    /// The number of rows of the database.
    pub fn num_rows(&self) -> usize {
        match self {
            PirClient::Punc(c) => c.num_rows(),
            PirClient::Dpf(c) => c.num_rows(),
            PirClient::Matrix(c) => c.num_rows(),
            PirClient::NonPrivate(c) => c.num_rows(),
        }
    }

    /// Returns the query pair `[left, right]` for row `i`, and the state to reconstruct it.
    pub fn query<R: RngCore + CryptoRng>(
        &mut self,
        i: RowIndex,
        rng: &mut R,
    ) -> Result<([QueryReq; 2], QueryCtx), PirError> {
        match self {
            PirClient::Punc(c) => {
                let (reqs, ctx) = c.query(i, rng)?;
                Ok((reqs.map(QueryReq::Punc), QueryCtx::Punc(ctx)))
            }
            PirClient::Dpf(c) => Ok((c.query(i, rng)?.map(QueryReq::Dpf), QueryCtx::Dpf)),
            PirClient::Matrix(c) => {
                let (reqs, ctx) = c.query(i, rng)?;
                Ok((reqs.map(QueryReq::Matrix), QueryCtx::Matrix(ctx)))
            }
            PirClient::NonPrivate(c) => Ok((
                c.query(i)?.map(QueryReq::NonPrivate),
                QueryCtx::NonPrivate,
            )),
        }
    }

    /// Returns a query pair of the same shape as a real query, whose answers are discarded.
    pub fn dummy_query<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> [QueryReq; 2] {
        match self {
            PirClient::Punc(c) => c.dummy_query(rng).map(QueryReq::Punc),
            PirClient::Dpf(c) => c.dummy_query(rng).map(QueryReq::Dpf),
            PirClient::Matrix(c) => match c.query(0, rng) {
                Ok((reqs, _)) => reqs.map(QueryReq::Matrix),
                Err(_) => [
                    QueryReq::Matrix(MatrixQueryReq { bit_vector: vec![] }),
                    QueryReq::Matrix(MatrixQueryReq { bit_vector: vec![] }),
                ],
            },
            PirClient::NonPrivate(c) => c.dummy_query().map(QueryReq::NonPrivate),
        }
    }

    /// Recovers the queried row from the answers `[left, right]`.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedResponse` if the context or an answer belongs to another protocol.
    pub fn reconstruct(&mut self, ctx: QueryCtx, resps: [QueryResp; 2]) -> Result<Row, PirError> {
        let [left, right] = resps;
        match (self, ctx, left, right) {
            (
                PirClient::Punc(c),
                QueryCtx::Punc(ctx),
                QueryResp::Punc(left),
                QueryResp::Punc(right),
            ) => c.reconstruct(ctx, [left, right]),
            (PirClient::Dpf(c), QueryCtx::Dpf, QueryResp::Dpf(left), QueryResp::Dpf(right)) => {
                c.reconstruct([left, right])
            }
            (
                PirClient::Matrix(c),
                QueryCtx::Matrix(ctx),
                QueryResp::Matrix(left),
                QueryResp::Matrix(right),
            ) => c.reconstruct(ctx, [left, right]),
            (
                PirClient::NonPrivate(c),
                QueryCtx::NonPrivate,
                QueryResp::NonPrivate(left),
                QueryResp::NonPrivate(right),
            ) => c.reconstruct([left, right]),
            _ => Err(PirError::UnexpectedResponse),
        }
    }

    /// Returns `(bits_per_key, fixed_bytes)` of client storage.
    pub fn state_size(&self) -> (usize, usize) {
        match self {
            PirClient::Punc(c) => c.state_size(),
            PirClient::Dpf(_) | PirClient::Matrix(_) | PirClient::NonPrivate(_) => (0, 0),
        }
    }
}
