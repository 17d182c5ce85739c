// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! An updatable key-value store read privately through the [`crate::backend`] protocols.
//!
//! The servers keep an append-only [`op_log::OpLog`] of additions and deletions, and a flat
//! database with one row per addition. Clients fetch the suffix of the log they have not seen
//! (keys only, Rice-coded when possible), rebuild their [`position_map::PositionMap`], and
//! place the new rows in a [`waterfall::WaterfallClient`]: a stack of layers of halving size,
//! each with its own hint, so that an update only recomputes the hint of one layer.
//!
//! When the log grows too long compared to the number of live keys, the servers compact a
//! prefix of it. Clients that are behind the compacted prefix start over from scratch.

pub mod client;
pub mod op_log;
pub mod position_map;
pub mod rice;
pub mod server;
pub mod waterfall;
