// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Common test utilities.

use crate::database::{Row, StaticDb};
use crate::Key;
use rand::{Rng, RngCore};
use simplelog::{Config, WriteLogger};
use std::collections::HashSet;
use std::sync::Once;
static INIT: Once = Once::new();

// For use in manual testing and inspection.
pub(crate) fn init_logger() {
    INIT.call_once(|| {
        WriteLogger::init(log::LevelFilter::Info, Config::default(), std::io::stdout()).unwrap()
    })
}

/// Rows whose first two bytes identify them and whose remaining bytes are random.
pub(crate) fn make_rows<R: RngCore>(num_rows: usize, row_len: usize, rng: &mut R) -> Vec<Row> {
    (0..num_rows)
        .map(|i| {
            let mut row = vec![0u8; row_len];
            rng.fill_bytes(&mut row);
            if row_len > 0 {
                row[0] = (i % 256) as u8;
            }
            if row_len > 1 {
                row[1] = b'A'.wrapping_add((i % 256) as u8);
            }
            row
        })
        .collect()
}

/// `num_keys` distinct random keys.
pub(crate) fn make_keys<R: RngCore>(num_keys: usize, rng: &mut R) -> Vec<Key> {
    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(num_keys);
    while keys.len() < num_keys {
        let key: Key = rng.gen();
        if seen.insert(key) {
            keys.push(key);
        }
    }
    keys
}

pub(crate) fn make_db<R: RngCore>(num_rows: usize, row_len: usize, rng: &mut R) -> StaticDb {
    StaticDb::from_rows(&make_rows(num_rows, row_len, rng)).unwrap()
}

macro_rules! create_reader_test {
    ($pir_type: ident, $num_rows: expr, $row_len: expr) => {
        paste::paste! {
            #[test]
            fn [<test_reader_correctness_ $pir_type:snake _ $num_rows _ $row_len>]() {
                test_reader_correctness(PirType::$pir_type, $num_rows, $row_len);
            }
        }
    };
}

macro_rules! create_reader_tests {
    ($pir_type: ident) => {
        create_reader_test!($pir_type, 4, 1);
        create_reader_test!($pir_type, 100, 8);
        create_reader_test!($pir_type, 1000, 16);
    };
}

macro_rules! create_updatable_test {
    ($function_name: ident, $pir_type: ident, $num_keys: expr, $num_updates: expr) => {
        paste::paste! {
            #[test]
            fn [<$function_name _ $pir_type:snake _ $num_keys _ $num_updates>]() {
                $function_name(PirType::$pir_type, $num_keys, $num_updates);
            }
        }
    };
}

macro_rules! create_updatable_tests {
    ($function_name: ident, $pir_type: ident) => {
        create_updatable_test!($function_name, $pir_type, 50, 5);
        create_updatable_test!($function_name, $pir_type, 400, 10);
    };
}

pub(crate) use create_reader_test;
pub(crate) use create_reader_tests;
pub(crate) use create_updatable_test;
pub(crate) use create_updatable_tests;
