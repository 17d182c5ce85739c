// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Puncturable pseudorandom sets.

pub mod ggm;
pub mod set_generator;

pub use ggm::GgmSetGenerator;
pub use set_generator::{PuncturableSet, PuncturedSet, SetGenerator, SetKey};
