// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Reads rows of a static database held by two servers.

use crate::backend::{HintReq, PirClient, PirType};
use crate::database::Row;
use crate::server::PirServer;
use crate::{PirError, RowIndex, LEFT, RIGHT};
use log::debug;
use rand::{CryptoRng, RngCore};

/// A client reading a static database from two non-colluding servers.
#[derive(Debug)]
pub struct PirReader<S: PirServer> {
    servers: [S; 2],
    client: Option<PirClient>,
}

impl<S: PirServer> PirReader<S> {
    /// Returns a reader that is not yet initialized.
    pub fn new(servers: [S; 2]) -> Self {
        Self {
            servers,
            client: None,
        }
    }

    /// Fetches a hint from the left server and builds a client of type `pir_type`.
    pub fn init<R: RngCore + CryptoRng>(
        &mut self,
        pir_type: PirType,
        rng: &mut R,
    ) -> Result<(), PirError> {
        let req = HintReq::new(pir_type, rng);
        let resp = self.servers[LEFT].hint(&req)?;
        self.client = Some(resp.init_client(rng));
        Ok(())
    }

    /// The client built by [`PirReader::init`], if any.
    pub fn client(&self) -> Option<&PirClient> {
        self.client.as_ref()
    }

    /// Privately reads row `i`.
    ///
    /// # Errors
    ///
    /// Returns `NoHint` before [`PirReader::init`], and propagates server and protocol errors.
    pub fn read<R: RngCore + CryptoRng>(&mut self, i: RowIndex, rng: &mut R) -> Result<Row, PirError> {
        let client = self.client.as_mut().ok_or(PirError::NoHint)?;
        let ([left, right], ctx) = client.query(i, rng)?;
        let resps = [
            self.servers[LEFT].answer(&left)?,
            self.servers[RIGHT].answer(&right)?,
        ];
        debug!("read row {i} with {:?}", client.pir_type());
        client.reconstruct(ctx, resps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::StaticDb;
    use crate::test_utils::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn test_reader_correctness(pir_type: PirType, num_rows: usize, row_len: usize) {
        init_logger();
        let mut rng = StdRng::seed_from_u64(0);
        let db: StaticDb = make_db(num_rows, row_len, &mut rng);
        let mut reader = PirReader::new([db.clone(), db.clone()]);
        reader.init(pir_type, &mut rng).unwrap();
        // Puncturable-set hints cover most, but not all, rows.
        let mut failures = 0;
        for _ in 0..3 * num_rows {
            let i = rng.gen_range(0..num_rows);
            match reader.read(i, &mut rng) {
                Ok(row) => assert_eq!(row, db.row(i).unwrap(), "{i}"),
                Err(PirError::NotCovered(_)) if pir_type == PirType::Punc => failures += 1,
                Err(e) => panic!("{e:?}"),
            }
        }
        assert!(failures * 10 < 3 * num_rows, "{failures}");
    }

    create_reader_tests!(Punc);
    create_reader_tests!(Dpf);
    create_reader_tests!(Matrix);
    create_reader_tests!(NonPrivate);

    #[test]
    fn test_read_before_init() {
        let mut rng = StdRng::seed_from_u64(0);
        let db = make_db(4, 4, &mut rng);
        let mut reader = PirReader::new([db.clone(), db]);
        assert!(reader.client().is_none());
        assert_eq!(reader.read(0, &mut rng), Err(PirError::NoHint));
    }
}
