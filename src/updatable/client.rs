// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The client side of the updatable key-value store.

use super::op_log::{DbOp, OpLog};
use super::position_map::PositionMap;
use super::rice::{decode_rice_integers, rice_encoded_hashes};
use super::server::{
    KeyUpdatesReq, KeyUpdatesResp, LayerHintReq, LayeredQueryResp, UpdatableServer,
};
use super::waterfall::{WaterfallClient, DEFAULT_SMALLEST_LAYER_SIZE};
use crate::backend::PirType;
use crate::database::Row;
use crate::utils::{bitmap_get, bitmap_len};
use crate::{Key, PirError, LEFT, RIGHT};
use log::{debug, info};
use rand::{CryptoRng, RngCore};

/// Configuration of an [`UpdatableClient`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// The protocol of the layers.
    pub pir_type: PirType,
    /// Overrides [`DEFAULT_SMALLEST_LAYER_SIZE`].
    pub smallest_layer_size: Option<usize>,
    /// Whether the two servers are queried concurrently.
    pub call_async: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pir_type: PirType::Punc,
            smallest_layer_size: None,
            call_async: false,
        }
    }
}

/// Counters of the work done by an [`UpdatableClient`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Bytes of key updates received.
    pub key_update_bytes: usize,
    /// Layer hints requested from the left server.
    pub hint_requests: usize,
    /// Private reads performed.
    pub reads: usize,
    /// Times the client dropped its history to resynchronize from scratch.
    pub full_resets: usize,
}

/// A client privately reading a key-value store replicated on two servers.
#[derive(Clone, Debug)]
pub struct UpdatableClient {
    config: ClientConfig,
    waterfall: WaterfallClient,
    log: OpLog,
    positions: PositionMap,
    stats: ClientStats,
}

impl UpdatableClient {
    /// A client with the default configuration.
    pub fn new() -> Self {
        let config = ClientConfig::default();
        Self {
            config,
            waterfall: WaterfallClient::new(config.pir_type, DEFAULT_SMALLEST_LAYER_SIZE),
            log: OpLog::new(),
            positions: PositionMap::new(),
            stats: ClientStats::default(),
        }
    }

    /// A client with configuration `config`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfigurationError` if the smallest layer size is overridden with 0.
    pub fn new_with_config(config: ClientConfig) -> Result<Self, PirError> {
        let smallest_layer_size = config
            .smallest_layer_size
            .unwrap_or(DEFAULT_SMALLEST_LAYER_SIZE);
        if smallest_layer_size == 0 {
            return Err(PirError::InvalidConfigurationError);
        }
        Ok(Self {
            config,
            waterfall: WaterfallClient::new(config.pir_type, smallest_layer_size),
            ..Self::new()
        })
    }

    /// The configuration of the client.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The counters of the client.
    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    /// The layers of the client.
    pub fn waterfall(&self) -> &WaterfallClient {
        &self.waterfall
    }

    /// The live keys, in no particular order.
    pub fn keys(&self) -> Vec<Key> {
        self.positions.keys().collect()
    }

    /// The number of rows known to the client, live or dead.
    pub fn num_rows(&self) -> usize {
        self.positions.num_rows()
    }

    /// The bytes of client storage.
    ///
    /// With punctured-set layers this is the layer state, 32 bits per live key, and one bit per
    /// row for dead rows. The other protocols keep no hint, so only the Rice-coded live keys
    /// count.
    pub fn storage_num_bytes(&self) -> Result<usize, PirError> {
        if self.waterfall.pir_type() != PirType::Punc {
            let mut keys = self.keys();
            let rice = rice_encoded_hashes(&mut keys)?;
            return Ok(rice.map_or(0, |rice| rice.encoded_data.len()));
        }
        let (bits_per_key, fixed_bytes) = self.waterfall.state();
        let bits = self.positions.len() * (bits_per_key + 32) + self.positions.num_rows();
        Ok(bits / 8 + fixed_bytes)
    }

    /// Drops the local state and fetches the whole database state from the servers, with fresh
    /// hints for every layer.
    pub fn init<S: UpdatableServer, R: RngCore + CryptoRng>(
        &mut self,
        servers: &[S; 2],
        rng: &mut R,
    ) -> Result<(), PirError> {
        self.log = OpLog::new();
        self.positions.clear();
        self.waterfall.reset();
        self.update(servers, rng)
    }

    /// Fetches the operations since the last update and refreshes the affected layer.
    ///
    /// Layers whose hint could not be fetched by an earlier call are requested again.
    pub fn update<S: UpdatableServer, R: RngCore + CryptoRng>(
        &mut self,
        servers: &[S; 2],
        rng: &mut R,
    ) -> Result<(), PirError> {
        let req = KeyUpdatesReq {
            defrag_timestamp: self.log.defrag_timestamp(),
            next_timestamp: self.log.next_timestamp(),
        };
        let resp = servers[LEFT].key_updates(&req)?;
        let row_len = resp.row_len;
        let num_new_rows = self.process_key_update(resp)?;
        if num_new_rows > 0 {
            if let Some(hint_req) = self.waterfall.hint_update_req(num_new_rows, row_len, rng)? {
                self.fetch_hint(&servers[LEFT], &hint_req, rng)?;
            }
        }
        while let Some(hint_req) = self.waterfall.missing_hint_req(rng)? {
            debug!(
                "refetching hint of rows {}..{}",
                hint_req.first_row,
                hint_req.first_row + hint_req.num_rows
            );
            self.fetch_hint(&servers[LEFT], &hint_req, rng)?;
        }
        Ok(())
    }

    fn fetch_hint<S: UpdatableServer, R: RngCore + CryptoRng>(
        &mut self,
        server: &S,
        req: &LayerHintReq,
        rng: &mut R,
    ) -> Result<(), PirError> {
        self.stats.hint_requests += 1;
        let hint = server.layer_hint(req)?;
        self.waterfall.init_hint(hint, rng)
    }

    /// Applies a key update and returns the number of rows to place in the layers.
    fn process_key_update(&mut self, resp: KeyUpdatesResp) -> Result<usize, PirError> {
        if resp.should_delete_history {
            info!(
                "client behind defrag timestamp {}, resetting from {}",
                resp.defrag_timestamp, resp.initial_timestamp
            );
            self.log
                .reset(resp.initial_timestamp, resp.defrag_timestamp);
            self.positions.clear();
            self.waterfall.reset();
            self.stats.full_resets += 1;
        }
        if resp.initial_timestamp != self.log.next_timestamp() {
            return Err(PirError::UnexpectedResponse);
        }

        let keys = match &resp.keys_rice {
            Some(rice) => {
                self.stats.key_update_bytes += rice.encoded_data.len();
                decode_rice_integers(rice)?
            }
            None => {
                self.stats.key_update_bytes += 4 * resp.keys.len() + resp.is_deletion.len();
                resp.keys
            }
        };
        let has_deletions = !resp.is_deletion.is_empty();
        if has_deletions && resp.is_deletion.len() < bitmap_len(keys.len()) {
            return Err(PirError::UnexpectedResponse);
        }
        let new_ops = keys
            .into_iter()
            .enumerate()
            .map(|(i, key)| DbOp::key_only(key, has_deletions && bitmap_get(&resp.is_deletion, i)));

        let replay_from = if resp.defrag_timestamp > self.log.defrag_timestamp() {
            let end = (resp.defrag_timestamp - self.log.initial_timestamp()) as usize;
            let dropped = self.log.compact(end);
            debug!("compacted {dropped} ops up to {}", resp.defrag_timestamp);
            self.positions.clear();
            self.waterfall.reset();
            0
        } else {
            self.log.len()
        };
        self.log.append(new_ops);

        let replayed = &self.log.ops()[replay_from..];
        self.positions.replay(replayed);
        Ok(replayed.iter().filter(|op| !op.delete).count())
    }

    /// Privately reads the value of `key`.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the key is unknown or deleted, and `NotCovered` if no stored set
    /// covers its row, in which case [`UpdatableClient::init`] fetches fresh hints.
    pub fn read<S: UpdatableServer + Sync, R: RngCore + CryptoRng>(
        &mut self,
        key: Key,
        servers: &[S; 2],
        rng: &mut R,
    ) -> Result<Row, PirError> {
        let pos = self.positions.get(key).ok_or(PirError::KeyNotFound(key))?;
        let ([left, right], ctx) = self.waterfall.query(pos, rng)?;
        let (left, right) = if self.config.call_async {
            std::thread::scope(|scope| {
                let left = scope.spawn(|| servers[LEFT].layer_answer(&left));
                let right = scope.spawn(|| servers[RIGHT].layer_answer(&right));
                (join(left), join(right))
            })
        } else {
            (
                servers[LEFT].layer_answer(&left),
                servers[RIGHT].layer_answer(&right),
            )
        };
        self.stats.reads += 1;
        self.waterfall.reconstruct(ctx, [left?, right?])
    }
}

impl Default for UpdatableClient {
    fn default() -> Self {
        Self::new()
    }
}

fn join(
    handle: std::thread::ScopedJoinHandle<'_, Result<LayeredQueryResp, PirError>>,
) -> Result<LayeredQueryResp, PirError> {
    handle
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use crate::backend::{HintReq, HintResp, QueryReq, QueryResp};
    use crate::server::PirServer;
    use crate::updatable::server::{
        KvServer, LayeredQueryReq, ServerConfig, DEFAULT_DEFRAG_RATIO,
    };
    use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    const ROW_LEN: usize = 16;

    /// Fails the next layer hint request when `fail_hint` is set.
    struct FlakyServer<'a> {
        inner: &'a KvServer,
        fail_hint: AtomicBool,
    }

    impl<'a> FlakyServer<'a> {
        fn new(inner: &'a KvServer, fail_hint: bool) -> Self {
            Self {
                inner,
                fail_hint: AtomicBool::new(fail_hint),
            }
        }
    }

    impl PirServer for FlakyServer<'_> {
        fn hint(&self, req: &HintReq) -> Result<HintResp, PirError> {
            self.inner.hint(req)
        }

        fn answer(&self, req: &QueryReq) -> Result<QueryResp, PirError> {
            self.inner.answer(req)
        }
    }

    impl UpdatableServer for FlakyServer<'_> {
        fn key_updates(&self, req: &KeyUpdatesReq) -> Result<KeyUpdatesResp, PirError> {
            self.inner.key_updates(req)
        }

        fn layer_hint(&self, req: &LayerHintReq) -> Result<HintResp, PirError> {
            if self.fail_hint.swap(false, Ordering::SeqCst) {
                return Err(PirError::UnexpectedResponse);
            }
            self.inner.layer_hint(req)
        }

        fn layer_answer(&self, req: &LayeredQueryReq) -> Result<LayeredQueryResp, PirError> {
            self.inner.layer_answer(req)
        }
    }

    struct Fixture {
        servers: [KvServer; 2],
        mirror: HashMap<Key, Row>,
        rng: StdRng,
    }

    impl Fixture {
        fn new(num_keys: usize, seed: u64) -> Self {
            init_logger();
            let mut rng = StdRng::seed_from_u64(seed);
            let mut fixture = Self {
                servers: [KvServer::new(), KvServer::new()],
                mirror: HashMap::new(),
                rng: StdRng::seed_from_u64(seed + 1),
            };
            fixture.add(&make_keys(num_keys, &mut rng));
            fixture
        }

        fn add(&mut self, keys: &[Key]) {
            let rows = make_rows(keys.len(), ROW_LEN, &mut self.rng);
            for server in &mut self.servers {
                server.add_rows(keys, rows.clone()).unwrap();
            }
            self.mirror.extend(keys.iter().copied().zip(rows));
        }

        fn delete(&mut self, keys: &[Key]) {
            for server in &mut self.servers {
                server.delete_rows(keys).unwrap();
            }
            for key in keys {
                self.mirror.remove(key);
            }
        }

        fn client(&self, pir_type: PirType) -> UpdatableClient {
            UpdatableClient::new_with_config(ClientConfig {
                pir_type,
                smallest_layer_size: Some(20),
                call_async: false,
            })
            .unwrap()
        }

        fn random_key(&mut self) -> Key {
            let mut keys: Vec<Key> = self.mirror.keys().copied().collect();
            keys.sort_unstable();
            *keys.choose(&mut self.rng).unwrap()
        }

        fn assert_reads(&mut self, client: &mut UpdatableClient, num_reads: usize) {
            for _ in 0..num_reads {
                let key = self.random_key();
                match client.read(key, &self.servers, &mut self.rng) {
                    Ok(row) => assert_eq!(row, self.mirror[&key], "{key}"),
                    Err(PirError::NotCovered(_)) => {}
                    Err(e) => panic!("{e:?}"),
                }
            }
        }
    }

    fn test_updates_correctness(pir_type: PirType, num_keys: usize, num_updates: usize) {
        let mut fixture = Fixture::new(num_keys, 0);
        let mut client = fixture.client(pir_type);
        client.init(&fixture.servers, &mut fixture.rng).unwrap();
        fixture.assert_reads(&mut client, 20);

        for _ in 0..num_updates {
            let num_new = fixture.rng.gen_range(1..num_keys / 4);
            let new_keys = make_keys(num_new, &mut fixture.rng);
            fixture.add(&new_keys);
            let num_deleted = fixture.rng.gen_range(0..num_new);
            let deleted: Vec<Key> = (0..num_deleted).map(|_| fixture.random_key()).collect();
            fixture.delete(&deleted);

            client.update(&fixture.servers, &mut fixture.rng).unwrap();
            let mut keys = client.keys();
            keys.sort_unstable();
            let mut expected: Vec<Key> = fixture.mirror.keys().copied().collect();
            expected.sort_unstable();
            assert_eq!(keys, expected);
            fixture.assert_reads(&mut client, 10);
        }
    }

    create_updatable_tests!(test_updates_correctness, Punc);
    create_updatable_tests!(test_updates_correctness, Dpf);
    create_updatable_tests!(test_updates_correctness, Matrix);
    create_updatable_tests!(test_updates_correctness, NonPrivate);

    #[test]
    fn test_read_same_row_twice() {
        let mut fixture = Fixture::new(256, 1);
        let mut client = fixture.client(PirType::Punc);
        client.init(&fixture.servers, &mut fixture.rng).unwrap();
        assert!(client
            .waterfall()
            .layers()
            .any(|layer| layer.pir_type() == PirType::Punc));
        let key = fixture.random_key();
        for _ in 0..5 {
            let row = client.read(key, &fixture.servers, &mut fixture.rng).unwrap();
            assert_eq!(row, fixture.mirror[&key]);
        }
        assert_eq!(client.stats().reads, 5);
    }

    #[test]
    fn test_read_after_large_add() {
        let mut fixture = Fixture::new(1000, 2);
        let mut client = fixture.client(PirType::Punc);
        client.init(&fixture.servers, &mut fixture.rng).unwrap();
        let old_key = fixture.random_key();

        let new_keys = make_keys(2000, &mut fixture.rng);
        fixture.add(&new_keys);
        client.update(&fixture.servers, &mut fixture.rng).unwrap();
        assert_eq!(client.num_rows(), 3000);

        for key in [old_key, new_keys[0], new_keys[1999]] {
            let row = client.read(key, &fixture.servers, &mut fixture.rng).unwrap();
            assert_eq!(row, fixture.mirror[&key]);
        }
    }

    #[test]
    fn test_deleted_rows() {
        let mut fixture = Fixture::new(500, 3);
        let mut keys: Vec<Key> = fixture.mirror.keys().copied().collect();
        keys.sort_unstable();
        fixture.delete(&keys[..200]);

        let mut client = fixture.client(PirType::Punc);
        client.init(&fixture.servers, &mut fixture.rng).unwrap();
        assert_eq!(
            client.read(keys[199], &fixture.servers, &mut fixture.rng),
            Err(PirError::KeyNotFound(keys[199]))
        );
        let row = client
            .read(keys[300], &fixture.servers, &mut fixture.rng)
            .unwrap();
        assert_eq!(row, fixture.mirror[&keys[300]]);
    }

    #[test]
    fn test_delete_everything() {
        let mut fixture = Fixture::new(50, 4);
        let mut client = fixture.client(PirType::Punc);
        client.init(&fixture.servers, &mut fixture.rng).unwrap();
        let keys: Vec<Key> = fixture.mirror.keys().copied().collect();
        fixture.delete(&keys);
        client.update(&fixture.servers, &mut fixture.rng).unwrap();
        assert!(client.keys().is_empty());
        assert_eq!(
            client.read(keys[0], &fixture.servers, &mut fixture.rng),
            Err(PirError::KeyNotFound(keys[0]))
        );

        fixture.add(&[7, 8]);
        client.update(&fixture.servers, &mut fixture.rng).unwrap();
        let row = client.read(8, &fixture.servers, &mut fixture.rng).unwrap();
        assert_eq!(row, fixture.mirror[&8]);
    }

    #[test]
    fn test_key_override() {
        let mut fixture = Fixture::new(40, 5);
        let mut client = fixture.client(PirType::Punc);
        client.init(&fixture.servers, &mut fixture.rng).unwrap();
        let key = fixture.random_key();
        let before = fixture.mirror[&key].clone();
        fixture.add(&[key]);
        assert_ne!(fixture.mirror[&key], before);
        assert_eq!(fixture.servers[LEFT].row(key).unwrap(), &fixture.mirror[&key][..]);

        client.update(&fixture.servers, &mut fixture.rng).unwrap();
        assert_eq!(client.num_rows(), 41);
        let row = client.read(key, &fixture.servers, &mut fixture.rng).unwrap();
        assert_eq!(row, fixture.mirror[&key]);
    }

    #[test]
    fn test_stale_client_resets() {
        let mut fixture = Fixture::new(30, 6);
        let mut client = fixture.client(PirType::Punc);
        client.init(&fixture.servers, &mut fixture.rng).unwrap();

        // Churn until the servers compact past the client's position.
        let is_stale = |servers: &[KvServer; 2], client: &UpdatableClient| {
            let req = KeyUpdatesReq {
                defrag_timestamp: client.log.defrag_timestamp(),
                next_timestamp: client.log.next_timestamp(),
            };
            servers[LEFT].key_updates(&req).unwrap().should_delete_history
        };
        let mut rounds = 0;
        while !is_stale(&fixture.servers, &client) {
            let key = fixture.random_key();
            fixture.add(&[key]);
            fixture.delete(&[key]);
            let new_keys = make_keys(1, &mut fixture.rng);
            fixture.add(&new_keys);
            rounds += 1;
            assert!(rounds < 1000);
        }

        client.update(&fixture.servers, &mut fixture.rng).unwrap();
        assert_eq!(client.stats().full_resets, 1);
        let mut keys = client.keys();
        keys.sort_unstable();
        let mut expected: Vec<Key> = fixture.mirror.keys().copied().collect();
        expected.sort_unstable();
        assert_eq!(keys, expected);
        fixture.assert_reads(&mut client, 10);
    }

    #[test]
    fn test_client_follows_defrag() {
        let mut fixture = Fixture::new(30, 7);
        let mut client = fixture.client(PirType::Dpf);
        client.init(&fixture.servers, &mut fixture.rng).unwrap();
        for _ in 0..150 {
            let key = fixture.random_key();
            fixture.add(&[key]);
            client.update(&fixture.servers, &mut fixture.rng).unwrap();
            assert!(client.log.len() as f64 <= DEFAULT_DEFRAG_RATIO * client.keys().len() as f64);
            assert_eq!(client.log.len(), fixture.servers[LEFT].num_ops());
            assert_eq!(client.num_rows(), fixture.servers[LEFT].num_rows());
        }
        assert!(client.log.initial_timestamp() > 0);
        assert_eq!(client.stats().full_resets, 0);
        fixture.assert_reads(&mut client, 10);
    }

    #[test]
    fn test_interleaved_adds_and_deletes() {
        let mut fixture = Fixture::new(60, 8);
        let mut client = fixture.client(PirType::Punc);
        client.init(&fixture.servers, &mut fixture.rng).unwrap();
        for round in 0..30 {
            if round % 3 == 0 {
                let key = fixture.random_key();
                fixture.delete(&[key]);
            } else {
                let new_keys = make_keys(3, &mut fixture.rng);
                fixture.add(&new_keys);
            }
            client.update(&fixture.servers, &mut fixture.rng).unwrap();
            fixture.assert_reads(&mut client, 3);
        }
        assert_eq!(client.keys().len(), fixture.mirror.len());
    }

    #[test]
    fn test_call_async() {
        let mut fixture = Fixture::new(100, 9);
        let mut client = UpdatableClient::new_with_config(ClientConfig {
            pir_type: PirType::Punc,
            smallest_layer_size: Some(20),
            call_async: true,
        })
        .unwrap();
        client.init(&fixture.servers, &mut fixture.rng).unwrap();
        fixture.assert_reads(&mut client, 10);
    }

    #[test]
    fn test_privacy_shape() {
        let mut fixture = Fixture::new(200, 10);
        let mut client = fixture.client(PirType::Punc);
        client.init(&fixture.servers, &mut fixture.rng).unwrap();
        let new_keys = make_keys(10, &mut fixture.rng);
        fixture.add(&new_keys);
        client.update(&fixture.servers, &mut fixture.rng).unwrap();
        assert!(client.waterfall().layers().count() > 1);

        let mut shapes = Vec::new();
        for key in [fixture.random_key(), new_keys[0]] {
            let pos = client.positions.get(key).unwrap();
            let ([left, right], _) = client.waterfall.query(pos, &mut fixture.rng).unwrap();
            shapes.push((
                left.reqs.len(),
                right.reqs.len(),
                bincode::serialized_size(&left).unwrap(),
                bincode::serialized_size(&right).unwrap(),
            ));
        }
        assert_eq!(shapes[0], shapes[1]);
    }

    #[test]
    fn test_storage_and_stats() {
        let mut fixture = Fixture::new(100, 11);
        let mut client = fixture.client(PirType::Punc);
        assert_eq!(client.storage_num_bytes().unwrap(), 0);
        client.init(&fixture.servers, &mut fixture.rng).unwrap();
        assert!(client.storage_num_bytes().unwrap() > 100 * 4);
        let stats = client.stats();
        assert_eq!(stats.hint_requests, 1);
        assert!(stats.key_update_bytes > 0);
    }

    #[test]
    fn test_storage_of_hintless_protocols() {
        let mut fixture = Fixture::new(100, 14);
        let mut keys = fixture.servers[LEFT].keys();
        let rice = rice_encoded_hashes(&mut keys).unwrap().unwrap();
        for pir_type in [PirType::Dpf, PirType::NonPrivate] {
            let mut client = fixture.client(pir_type);
            assert_eq!(client.storage_num_bytes().unwrap(), 0);
            client.init(&fixture.servers, &mut fixture.rng).unwrap();
            let num_bytes = client.storage_num_bytes().unwrap();
            assert_eq!(num_bytes, rice.encoded_data.len());
            assert!(num_bytes > 0 && num_bytes < 100 * 4);
        }
    }

    #[test]
    fn test_hint_refetched_after_failure() {
        let mut fixture = Fixture::new(100, 15);
        let mut client = fixture.client(PirType::Punc);
        let key = fixture.random_key();
        {
            let servers = [
                FlakyServer::new(&fixture.servers[LEFT], true),
                FlakyServer::new(&fixture.servers[RIGHT], false),
            ];
            assert_eq!(
                client.init(&servers, &mut fixture.rng),
                Err(PirError::UnexpectedResponse)
            );
            assert_eq!(
                client.read(key, &servers, &mut fixture.rng),
                Err(PirError::NoHint)
            );
            client.update(&servers, &mut fixture.rng).unwrap();
            assert_eq!(client.stats().hint_requests, 2);
            assert!(client.waterfall().layers().all(|layer| layer.has_hint()));
            assert_eq!(
                client.read(key, &servers, &mut fixture.rng).unwrap(),
                fixture.mirror[&key]
            );
        }
        client.update(&fixture.servers, &mut fixture.rng).unwrap();
        assert_eq!(client.stats().hint_requests, 2);
        fixture.assert_reads(&mut client, 20);
    }

    #[test]
    fn test_tiny_smallest_layer() {
        let mut fixture = Fixture::new(8, 16);
        let mut client = UpdatableClient::new_with_config(ClientConfig {
            pir_type: PirType::Punc,
            smallest_layer_size: Some(1),
            call_async: false,
        })
        .unwrap();
        client.init(&fixture.servers, &mut fixture.rng).unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..6 {
            fixture.add(&make_keys(1, &mut rng));
            client.update(&fixture.servers, &mut fixture.rng).unwrap();
            assert!(client.waterfall().layers().all(|layer| layer.has_hint()));
            fixture.assert_reads(&mut client, 5);
        }
        assert_eq!(client.keys().len(), fixture.mirror.len());
    }

    #[test]
    fn test_init_twice() {
        let mut fixture = Fixture::new(100, 18);
        let mut client = fixture.client(PirType::Punc);
        client.init(&fixture.servers, &mut fixture.rng).unwrap();
        fixture.assert_reads(&mut client, 10);
        fixture.add(&make_keys(30, &mut StdRng::seed_from_u64(19)));
        client.update(&fixture.servers, &mut fixture.rng).unwrap();
        let hint_requests = client.stats().hint_requests;

        client.init(&fixture.servers, &mut fixture.rng).unwrap();
        let stats = client.stats();
        assert_eq!(stats.hint_requests, hint_requests + 1);
        assert_eq!(stats.full_resets, 0);
        assert_eq!(client.num_rows(), 130);
        assert_eq!(client.waterfall().layers().count(), 1);
        fixture.assert_reads(&mut client, 20);
    }

    #[test]
    fn test_invalid_config() {
        let config = ClientConfig {
            smallest_layer_size: Some(0),
            ..Default::default()
        };
        assert_eq!(
            UpdatableClient::new_with_config(config).unwrap_err(),
            PirError::InvalidConfigurationError
        );
    }

    #[test]
    fn test_non_updatable_server() {
        let mut rng = StdRng::seed_from_u64(12);
        let keys = make_keys(30, &mut rng);
        let rows = make_rows(30, ROW_LEN, &mut rng);
        let config = ServerConfig {
            updatable: false,
            ..Default::default()
        };
        let mut servers = [
            KvServer::new_with_config(config, &keys, rows.clone()).unwrap(),
            KvServer::new_with_config(config, &keys, rows.clone()).unwrap(),
        ];
        let mut client = UpdatableClient::new();
        client.init(&servers, &mut rng).unwrap();
        assert_eq!(client.read(keys[4], &servers, &mut rng).unwrap(), rows[4]);
        assert_eq!(
            servers[LEFT].add_rows(&[1], make_rows(1, ROW_LEN, &mut rng)),
            Err(PirError::NotUpdatable)
        );
        assert_eq!(servers[RIGHT].delete_rows(&keys), Err(PirError::NotUpdatable));
    }
}
