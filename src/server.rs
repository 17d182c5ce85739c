// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The server side of static PIR.

use crate::backend::{HintReq, HintResp, QueryReq, QueryResp};
use crate::database::StaticDb;
use crate::PirError;

/// A server holding one replica of a static database.
pub trait PirServer {
    /// Computes the offline hint requested by `req`.
    fn hint(&self, req: &HintReq) -> Result<HintResp, PirError>;

    /// Answers one online query.
    fn answer(&self, req: &QueryReq) -> Result<QueryResp, PirError>;
}

impl PirServer for StaticDb {
    fn hint(&self, req: &HintReq) -> Result<HintResp, PirError> {
        req.process(self.view())
    }

    fn answer(&self, req: &QueryReq) -> Result<QueryResp, PirError> {
        req.process(self.view())
    }
}
