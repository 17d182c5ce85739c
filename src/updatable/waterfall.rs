// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Waterfall layering of PIR sub-databases.
//!
//! The rows are split into contiguous layers of capacities `[n, n/2, n/4, ...]`, down to the
//! smallest layer size. New rows go to the smallest layer with room for them together with
//! the rows of every smaller layer, which is then rebuilt from scratch while the smaller
//! layers are emptied. When no layer but the largest has room, the capacities are recomputed
//! from the new total and everything is rebuilt as one layer.
//!
//! With punctured-set PIR, the smallest layer uses DPF-based PIR instead, which needs no hint.
//! Other backends use a single layer.

use super::server::{LayerHintReq, LayeredQueryReq, LayeredQueryResp};
use crate::backend::{punc, HintReq, HintResp, PirClient, PirType, QueryCtx};
use crate::database::{DbParams, Row};
use crate::{PirError, RowIndex, LEFT, SEC_PARAM};
use log::{debug, info};
use rand::{CryptoRng, RngCore};

/// The default capacity below which layers are not split further.
pub const DEFAULT_SMALLEST_LAYER_SIZE: usize = 10 * SEC_PARAM * SEC_PARAM;

/// One layer: a contiguous range of rows with its own PIR client.
#[derive(Clone, Debug)]
pub struct Layer {
    first_row: RowIndex,
    num_rows: usize,
    pir_type: PirType,
    pir: Option<PirClient>,
}

impl Layer {
    /// The first row of the layer.
    pub fn first_row(&self) -> RowIndex {
        self.first_row
    }

    /// The number of rows of the layer.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// The protocol used to read the layer.
    pub fn pir_type(&self) -> PirType {
        self.pir_type
    }

    /// Whether the layer's client is ready.
    pub fn has_hint(&self) -> bool {
        self.pir.is_some()
    }

    fn contains(&self, pos: RowIndex) -> bool {
        (self.first_row..self.first_row + self.num_rows).contains(&pos)
    }
}

#[derive(Clone, Debug)]
struct LayerSlot {
    max_size: usize,
    layer: Option<Layer>,
}

/// Remembers which layer was queried for real.
#[derive(Clone, Debug)]
pub struct WaterfallQueryCtx {
    slot: usize,
    sub_request: usize,
    ctx: QueryCtx,
}

/// The client side of the waterfall layers.
#[derive(Clone, Debug)]
pub struct WaterfallClient {
    pir_type: PirType,
    smallest_layer_size: usize,
    num_rows: usize,
    row_len: usize,
    slots: Vec<LayerSlot>,
    pending: Option<usize>,
}

impl WaterfallClient {
    /// A client with no rows.
    ///
    /// # Panics
    ///
    /// Panics if `smallest_layer_size` is 0.
    pub fn new(pir_type: PirType, smallest_layer_size: usize) -> Self {
        assert!(smallest_layer_size > 0);
        Self {
            pir_type,
            smallest_layer_size,
            num_rows: 0,
            row_len: 0,
            slots: Vec::new(),
            pending: None,
        }
    }

    /// Drops every layer.
    pub fn reset(&mut self) {
        self.num_rows = 0;
        self.slots.clear();
        self.pending = None;
    }

    /// The protocol of the layers.
    pub fn pir_type(&self) -> PirType {
        self.pir_type
    }

    /// The number of rows across all layers.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// The layers holding rows, largest first.
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.slots
            .iter()
            .filter_map(|slot| slot.layer.as_ref())
            .filter(|layer| layer.num_rows > 0)
    }

    /// The capacity of every layer slot, largest first.
    pub fn capacities(&self) -> Vec<usize> {
        self.slots.iter().map(|slot| slot.max_size).collect()
    }

    /// The layer capacities for `num_rows` rows: strictly decreasing, with the last at most the
    /// smallest layer size.
    pub fn layers_max_size(&self, num_rows: usize) -> Vec<usize> {
        let mut sizes = vec![num_rows];
        if self.pir_type != PirType::Punc {
            return sizes;
        }
        let mut last = num_rows;
        while last > self.smallest_layer_size {
            last /= 2;
            sizes.push(last);
        }
        sizes
    }

    fn reshuffle(&mut self, num_rows: usize) {
        let sizes = self.layers_max_size(num_rows);
        info!("reshuffling {num_rows} rows into layers of capacities {sizes:?}");
        self.slots.clear();
        self.slots.extend(sizes.into_iter().map(|max_size| LayerSlot {
            max_size,
            layer: None,
        }));
    }

    /// Places `num_new_rows` new rows and returns the slot of the layer to rebuild.
    ///
    /// Must be called after `num_rows` counts the new rows.
    fn update_layers(&mut self, num_new_rows: usize) -> usize {
        let mut incoming = num_new_rows;
        let mut target = None;
        for (i, slot) in self.slots.iter_mut().enumerate().rev() {
            incoming += slot.layer.take().map_or(0, |layer| layer.num_rows);
            if incoming <= slot.max_size {
                target = Some(i);
                break;
            }
        }
        let target = match target {
            Some(i) if i > 0 => i,
            _ => {
                self.reshuffle(incoming);
                0
            }
        };

        let is_smallest = target + 1 == self.slots.len();
        let pir_type = if self.pir_type == PirType::Punc
            && (is_smallest || !punc::supports_num_rows(incoming))
        {
            PirType::Dpf
        } else {
            self.pir_type
        };
        debug!("rebuilding layer {target} with {incoming} rows using {pir_type:?}");
        self.slots[target].layer = Some(Layer {
            first_row: self.num_rows - incoming,
            num_rows: incoming,
            pir_type,
            pir: None,
        });
        target
    }

    /// Places `num_new_rows` new rows of length `row_len` into the layers.
    ///
    /// Layers whose protocol needs no hint are ready on return. Otherwise this returns the hint
    /// request for the rebuilt layer, whose response must be passed to
    /// [`WaterfallClient::init_hint`].
    pub fn hint_update_req<R: RngCore + CryptoRng>(
        &mut self,
        num_new_rows: usize,
        row_len: usize,
        rng: &mut R,
    ) -> Result<Option<LayerHintReq>, PirError> {
        self.num_rows += num_new_rows;
        self.row_len = row_len;
        self.pending = None;
        let target = self.update_layers(num_new_rows);
        self.layer_hint_req(target, rng)
    }

    /// Returns the hint request of a layer left without a client, for instance because fetching
    /// its hint failed. Layers whose protocol needs no hint are made ready along the way.
    pub fn missing_hint_req<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<Option<LayerHintReq>, PirError> {
        self.pending = None;
        for slot in 0..self.slots.len() {
            let missing = matches!(
                &self.slots[slot].layer,
                Some(layer) if layer.num_rows > 0 && layer.pir.is_none()
            );
            if missing {
                if let Some(req) = self.layer_hint_req(slot, rng)? {
                    return Ok(Some(req));
                }
            }
        }
        Ok(None)
    }

    fn layer_hint_req<R: RngCore + CryptoRng>(
        &mut self,
        slot: usize,
        rng: &mut R,
    ) -> Result<Option<LayerHintReq>, PirError> {
        let row_len = self.row_len;
        let layer = self.slots[slot]
            .layer
            .as_mut()
            .ok_or(PirError::NoActiveLayers)?;
        if layer.num_rows == 0 {
            return Ok(None);
        }
        if layer.pir_type != PirType::Punc {
            let params = DbParams {
                num_rows: layer.num_rows,
                row_len,
            };
            layer.pir = Some(PirClient::without_hint(layer.pir_type, params)?);
            return Ok(None);
        }
        self.pending = Some(slot);
        Ok(Some(LayerHintReq {
            req: HintReq::new(PirType::Punc, rng),
            first_row: layer.first_row,
            num_rows: layer.num_rows,
        }))
    }

    /// Installs the hint requested by the last [`WaterfallClient::hint_update_req`] or
    /// [`WaterfallClient::missing_hint_req`].
    ///
    /// # Errors
    ///
    /// Returns `NoActiveLayers` if no hint is pending, and `UnexpectedResponse` if the hint does
    /// not cover the pending layer.
    pub fn init_hint<R: RngCore + CryptoRng>(
        &mut self,
        resp: HintResp,
        rng: &mut R,
    ) -> Result<(), PirError> {
        let target = self.pending.take().ok_or(PirError::NoActiveLayers)?;
        let layer = self.slots[target]
            .layer
            .as_mut()
            .ok_or(PirError::NoActiveLayers)?;
        if resp.num_rows() != layer.num_rows {
            return Err(PirError::UnexpectedResponse);
        }
        layer.pir = Some(resp.init_client(rng));
        Ok(())
    }

    /// Queries row `pos` in its layer, and sends a dummy query to every other layer.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveLayers` if there are no rows, `NoHint` if a layer is not ready, and
    /// `IndexOutOfBounds` if no layer holds `pos`.
    pub fn query<R: RngCore + CryptoRng>(
        &mut self,
        pos: RowIndex,
        rng: &mut R,
    ) -> Result<([LayeredQueryReq; 2], WaterfallQueryCtx), PirError> {
        let mut reqs = [LayeredQueryReq::default(), LayeredQueryReq::default()];
        let mut target = None;
        let mut end_row = 0;
        for (slot, layer) in self
            .slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.layer.as_mut().map(|layer| (i, layer)))
            .filter(|(_, layer)| layer.num_rows > 0)
        {
            let holds_pos = layer.contains(pos);
            let pir = layer.pir.as_mut().ok_or(PirError::NoHint)?;
            let sub_reqs = if holds_pos {
                let (sub_reqs, ctx) = pir.query(pos - layer.first_row, rng)?;
                target = Some(WaterfallQueryCtx {
                    slot,
                    sub_request: reqs[LEFT].reqs.len(),
                    ctx,
                });
                sub_reqs
            } else {
                pir.dummy_query(rng)
            };
            for (req, sub_req) in reqs.iter_mut().zip(sub_reqs) {
                req.reqs.push(sub_req);
                req.first_row.push(layer.first_row);
            }
            end_row = layer.first_row + layer.num_rows;
        }
        if reqs[LEFT].reqs.is_empty() {
            return Err(PirError::NoActiveLayers);
        }
        let ctx = target.ok_or(PirError::IndexOutOfBounds {
            index: pos,
            len: self.num_rows,
        })?;
        for req in &mut reqs {
            req.first_row.push(end_row);
        }
        Ok((reqs, ctx))
    }

    /// Recovers the queried row from the answers of the layer that held it.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedResponse` if an answer lacks the sub-response of that layer.
    pub fn reconstruct(
        &mut self,
        ctx: WaterfallQueryCtx,
        resps: [LayeredQueryResp; 2],
    ) -> Result<Row, PirError> {
        let [left, right] = resps.map(|resp| resp.0.into_iter().nth(ctx.sub_request));
        let (left, right) = left.zip(right).ok_or(PirError::UnexpectedResponse)?;
        let pir = self
            .slots
            .get_mut(ctx.slot)
            .and_then(|slot| slot.layer.as_mut())
            .and_then(|layer| layer.pir.as_mut())
            .ok_or(PirError::NoHint)?;
        pir.reconstruct(ctx.ctx, [left, right])
    }

    /// Returns `(bits_per_key, fixed_bytes)` of client storage, over all ready layers.
    pub fn state(&self) -> (usize, usize) {
        self.layers()
            .filter_map(|layer| layer.pir.as_ref())
            .map(PirClient::state_size)
            .fold((0, 0), |(bits, fixed), (layer_bits, layer_fixed)| {
                (bits.max(layer_bits), fixed + layer_fixed)
            })
    }
}
