// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Golomb-Rice delta coding of ascending `u32` sequences.
//!
//! Each delta `n` is split as `n = (q << k) + r`. The quotient `q` is written in unary as `q`
//! one bits followed by a zero bit, then the remainder `r` is written in `k` bits. Within a byte,
//! bits are consumed least-significant first, as in DEFLATE. The format is compatible with the
//! Safe Browsing `RiceDeltaEncoding`.

use crate::PirError;
use serde::{Deserialize, Serialize};

const MAX_RICE_PARAMETER: i32 = 32;

/// A Rice-coded ascending sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiceDeltaEncoding {
    /// The first value, stored verbatim.
    pub first_value: i64,
    /// The Golomb-Rice parameter `k`.
    pub rice_parameter: i32,
    /// The number of encoded deltas, one less than the number of values.
    pub num_entries: i32,
    /// The coded deltas.
    pub encoded_data: Vec<u8>,
}

fn decode_error(msg: &str) -> PirError {
    PirError::RiceDecode(msg.to_string())
}

/// Reads bits from a byte slice, least-significant bit of each byte first.
#[derive(Debug)]
pub struct BitReader<'a> {
    buf: &'a [u8],
    mask: u8,
}

impl<'a> BitReader<'a> {
    /// Reads from the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, mask: 0x01 }
    }

    /// Reads `n` bits as an integer whose first bit is the least significant.
    ///
    /// # Panics
    ///
    /// Panics if `n > 32`.
    pub fn read_bits(&mut self, n: u32) -> Result<u32, PirError> {
        assert!(n <= 32, "cannot read {n} bits into a u32");
        let mut v = 0u32;
        for i in 0..n {
            let byte = *self
                .buf
                .first()
                .ok_or_else(|| decode_error("unexpected end of data"))?;
            if byte & self.mask != 0 {
                v |= 1 << i;
            }
            self.mask <<= 1;
            if self.mask == 0 {
                self.buf = &self.buf[1..];
                self.mask = 0x01;
            }
        }
        Ok(v)
    }

    /// The number of bits left to read.
    pub fn bits_remaining(&self) -> usize {
        8 * self.buf.len() - self.mask.trailing_zeros() as usize
    }
}

/// Writes bits to a growing buffer, least-significant bit of each byte first.
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    mask: u8,
}

impl BitWriter {
    /// An empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    fn push_bit(&mut self, bit: bool) {
        if self.mask == 0 {
            self.buf.push(0);
            self.mask = 0x01;
        }
        if bit {
            // Nonempty after the push above.
            let last = self.buf.len() - 1;
            self.buf[last] |= self.mask;
        }
        self.mask <<= 1;
    }

    /// Writes the low `n` bits of `v`, least significant first.
    ///
    /// # Panics
    ///
    /// Panics if `n > 32`.
    pub fn write(&mut self, v: u32, n: u32) {
        assert!(n <= 32, "cannot write {n} bits of a u32");
        for i in 0..n {
            self.push_bit((v >> i) & 1 == 1);
        }
    }

    fn write_unary(&mut self, q: u64) {
        for _ in 0..q {
            self.push_bit(true);
        }
        self.push_bit(false);
    }

    /// The bytes written so far. The last byte is zero-padded.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

fn read_value(reader: &mut BitReader<'_>, k: u32) -> Result<u32, PirError> {
    let mut q = 0u64;
    while reader.read_bits(1)? == 1 {
        q += 1;
    }
    let r = reader.read_bits(k)?;
    u32::try_from((q << k) + u64::from(r)).map_err(|_| decode_error("value overflows 32 bits"))
}

fn write_value(writer: &mut BitWriter, v: u32, k: u32) {
    let v = u64::from(v);
    writer.write_unary(v >> k);
    // Truncation keeps the low k bits, which is the remainder.
    writer.write((v & ((1u64 << k) - 1)) as u32, k);
}

/// Decodes a Rice-coded sequence.
///
/// # Errors
///
/// Returns `RiceDecode` if the parameter is outside `[0, 32]`, the entry count is negative, the
/// data is truncated, at least a byte of data is left unread, or a value overflows 32 bits.
pub fn decode_rice_integers(rice: &RiceDeltaEncoding) -> Result<Vec<u32>, PirError> {
    if !(0..=MAX_RICE_PARAMETER).contains(&rice.rice_parameter) {
        return Err(decode_error("invalid rice parameter"));
    }
    let num_entries =
        usize::try_from(rice.num_entries).map_err(|_| decode_error("negative entry count"))?;
    let first =
        u32::try_from(rice.first_value).map_err(|_| decode_error("first value overflows 32 bits"))?;
    let k = rice.rice_parameter.unsigned_abs();
    // Every entry takes at least its unary terminator and k remainder bits.
    let min_bits = num_entries as u64 * (u64::from(k) + 1);
    if min_bits > 8 * rice.encoded_data.len() as u64 {
        return Err(decode_error("truncated rice encoded data"));
    }

    let mut values = Vec::with_capacity(num_entries + 1);
    values.push(first);
    let mut reader = BitReader::new(&rice.encoded_data);
    let mut last = first;
    for _ in 0..num_entries {
        let delta = read_value(&mut reader, k)?;
        last = last
            .checked_add(delta)
            .ok_or_else(|| decode_error("value overflows 32 bits"))?;
        values.push(last);
    }
    if reader.bits_remaining() >= 8 {
        return Err(decode_error("unconsumed rice encoded data"));
    }
    Ok(values)
}

/// Encodes the ascending sequence `values` with parameter `rice_parameter`.
///
/// A single value is stored as the first value alone, with parameter 0.
///
/// # Errors
///
/// Returns `InvalidConfigurationError` if `values` is empty or not ascending, or the parameter
/// is outside `[0, 32]`.
pub fn encode_rice_integers_with_param(
    values: &[u32],
    rice_parameter: i32,
) -> Result<RiceDeltaEncoding, PirError> {
    let first = *values.first().ok_or(PirError::InvalidConfigurationError)?;
    if !(0..=MAX_RICE_PARAMETER).contains(&rice_parameter)
        || values.windows(2).any(|w| w[1] < w[0])
    {
        return Err(PirError::InvalidConfigurationError);
    }
    let mut rice = RiceDeltaEncoding {
        first_value: i64::from(first),
        num_entries: i32::try_from(values.len() - 1)?,
        ..Default::default()
    };
    if rice.num_entries == 0 {
        return Ok(rice);
    }
    rice.rice_parameter = rice_parameter;
    let k = rice_parameter.unsigned_abs();
    let mut writer = BitWriter::new();
    for w in values.windows(2) {
        write_value(&mut writer, w[1] - w[0], k);
    }
    rice.encoded_data = writer.into_bytes();
    Ok(rice)
}

/// Encodes the ascending sequence `values`, choosing the parameter from the average gap.
///
/// Returns `None` for an empty sequence.
pub fn encode_rice_integers(values: &[u32]) -> Result<Option<RiceDeltaEncoding>, PirError> {
    let (first, last) = match (values.first(), values.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Ok(None),
    };
    let range = last.saturating_sub(first);
    let rice_parameter = if range == 0 {
        1
    } else {
        let k = (f64::from(range) / values.len() as f64).log2().floor();
        k.clamp(0.0, f64::from(MAX_RICE_PARAMETER)) as i32
    };
    encode_rice_integers_with_param(values, rice_parameter).map(Some)
}

/// Sorts `hashes` and encodes them.
pub fn rice_encoded_hashes(hashes: &mut [u32]) -> Result<Option<RiceDeltaEncoding>, PirError> {
    hashes.sort_unstable();
    encode_rice_integers(hashes)
}
