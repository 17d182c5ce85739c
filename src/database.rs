// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Flat row storage shared by all PIR servers.

use crate::{PirError, RowIndex};
use serde::{Deserialize, Serialize};

/// A database row: a fixed-length byte string, with the length agreed per database.
pub type Row = Vec<u8>;

/// The shape of a database.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbParams {
    /// The number of rows.
    pub num_rows: usize,
    /// The length of each row in bytes.
    pub row_len: usize,
}

/// A database of equal-length rows stored back to back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticDb {
    row_len: usize,
    flat_db: Vec<u8>,
}

impl StaticDb {
    /// Returns an empty database of rows of length `row_len`.
    pub fn new(row_len: usize) -> Self {
        Self {
            row_len,
            flat_db: Vec::new(),
        }
    }

    /// Returns a database holding `rows`, which must all share one length.
    ///
    /// # Errors
    ///
    /// Returns `RowLengthMismatch` if the rows do not all have the same length.
    pub fn from_rows(rows: &[Row]) -> Result<Self, PirError> {
        let row_len = rows.first().map_or(0, Vec::len);
        let mut db = Self::new(row_len);
        for row in rows {
            db.push_row(row)?;
        }
        Ok(db)
    }

    /// Appends a row.
    ///
    /// # Errors
    ///
    /// Returns `RowLengthMismatch` if `row` does not have the database's row length.
    pub fn push_row(&mut self, row: &[u8]) -> Result<(), PirError> {
        if row.len() != self.row_len {
            return Err(PirError::RowLengthMismatch {
                expected: self.row_len,
                got: row.len(),
            });
        }
        self.flat_db.extend_from_slice(row);
        Ok(())
    }

    /// The number of rows.
    pub fn num_rows(&self) -> usize {
        if self.row_len == 0 {
            0
        } else {
            self.flat_db.len() / self.row_len
        }
    }

    /// The length of each row in bytes.
    pub fn row_len(&self) -> usize {
        self.row_len
    }

    /// The shape of the database.
    pub fn params(&self) -> DbParams {
        DbParams {
            num_rows: self.num_rows(),
            row_len: self.row_len,
        }
    }

    /// Returns row `index`.
    pub fn row(&self, index: RowIndex) -> Result<&[u8], PirError> {
        self.view().row(index)
    }

    /// Borrows the whole database.
    pub fn view(&self) -> DbView<'_> {
        DbView {
            num_rows: self.num_rows(),
            row_len: self.row_len,
            flat_db: &self.flat_db,
        }
    }

    /// Borrows rows `first_row..end_row`.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds` if the range does not lie within the database.
    pub fn slice(&self, first_row: RowIndex, end_row: RowIndex) -> Result<DbView<'_>, PirError> {
        let num_rows = self.num_rows();
        if first_row > end_row || end_row > num_rows {
            return Err(PirError::IndexOutOfBounds {
                index: end_row.max(first_row),
                len: num_rows,
            });
        }
        Ok(DbView {
            num_rows: end_row - first_row,
            row_len: self.row_len,
            flat_db: &self.flat_db[first_row * self.row_len..end_row * self.row_len],
        })
    }
}

/// A borrowed, contiguous range of rows of a [`StaticDb`].
#[derive(Clone, Copy, Debug)]
pub struct DbView<'a> {
    num_rows: usize,
    row_len: usize,
    flat_db: &'a [u8],
}

impl<'a> DbView<'a> {
    /// The number of rows in the view.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// The length of each row in bytes.
    pub fn row_len(&self) -> usize {
        self.row_len
    }

    /// The shape of the view.
    pub fn params(&self) -> DbParams {
        DbParams {
            num_rows: self.num_rows,
            row_len: self.row_len,
        }
    }

    /// Returns row `index` of the view.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds` if `index` is not a row of the view.
    pub fn row(&self, index: RowIndex) -> Result<&'a [u8], PirError> {
        if index >= self.num_rows {
            return Err(PirError::IndexOutOfBounds {
                index,
                len: self.num_rows,
            });
        }
        Ok(&self.flat_db[index * self.row_len..(index + 1) * self.row_len])
    }

    /// Returns the XOR of the rows at `indices`.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds` if any index is not a row of the view.
    pub fn xor_rows<I: IntoIterator<Item = RowIndex>>(&self, indices: I) -> Result<Row, PirError> {
        let mut out = vec![0u8; self.row_len];
        for index in indices {
            xor_into(&mut out, self.row(index)?);
        }
        Ok(out)
    }
}

/// XORs `src` into `dst` byte by byte.
///
/// Operands of different lengths indicate a configuration bug, so this panics on them.
pub fn xor_into(dst: &mut [u8], src: &[u8]) {
    assert_eq!(
        dst.len(),
        src.len(),
        "XOR of rows of different lengths: {} and {}",
        dst.len(),
        src.len()
    );
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}
