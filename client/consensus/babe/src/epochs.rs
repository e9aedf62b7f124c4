// This file is part of Meridian.

// Copyright (C) Meridian Developers.
// SPDX-License-Identifier: GPL-3.0-or-later WITH Classpath-exception-2.0

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Epoch tracking.
//!
//! Epoch 0 starts at the first observed slot (genesis carries none); each
//! epoch spans `epoch_length` slots. Future epochs' authorities and
//! randomness arrive through `NextEpochDescriptor` consensus digests and
//! apply atomically at the epoch boundary; absent a descriptor the genesis
//! configuration applies.

use crate::types::{BabeConfiguration, EpochData, NextEpochDescriptor, PreDigest};
use codec::Decode;
use mp_core::sr25519;
use mp_runtime::{Header, BABE_ENGINE_ID};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Shared epoch bookkeeping between the producer and the verifier.
pub struct EpochState {
	inner: RwLock<Inner>,
}

struct Inner {
	config: BabeConfiguration,
	/// Slot the chain started at; pins the epoch-0 boundary.
	genesis_slot: Option<u64>,
	/// Descriptors for specific epochs, from digests or configuration
	/// refreshes.
	epochs: BTreeMap<u64, (Vec<([u8; 32], u64)>, [u8; 32])>,
}

impl EpochState {
	/// Start from the genesis configuration.
	pub fn new(config: BabeConfiguration) -> Self {
		Self {
			inner: RwLock::new(Inner { config, genesis_slot: None, epochs: BTreeMap::new() }),
		}
	}

	/// Start with the epoch-0 boundary pinned to `first_slot` (used by
	/// state import).
	pub fn with_first_slot(config: BabeConfiguration, first_slot: u64) -> Self {
		let state = Self::new(config);
		state.inner.write().genesis_slot = Some(first_slot);
		state
	}

	/// The configured slot duration in milliseconds.
	pub fn slot_duration(&self) -> u64 {
		self.inner.read().config.slot_duration
	}

	/// Record the first slot ever seen, if none is pinned yet.
	pub fn note_first_slot(&self, slot: u64) {
		let mut inner = self.inner.write();
		if inner.genesis_slot.is_none() {
			log::info!(target: crate::LOG_TARGET, "pinning epoch 0 to first slot {slot}");
			inner.genesis_slot = Some(slot);
		}
	}

	/// The epoch index containing `slot`. `None` before the first slot is
	/// pinned.
	pub fn epoch_index(&self, slot: u64) -> Option<u64> {
		let inner = self.inner.read();
		let genesis_slot = inner.genesis_slot?;
		Some(slot.saturating_sub(genesis_slot) / inner.config.epoch_length)
	}

	/// The epoch data governing `slot`, falling back to the genesis
	/// configuration when no descriptor was recorded.
	pub fn data_for_slot(&self, slot: u64) -> EpochData {
		let inner = self.inner.read();
		let epoch_index = inner
			.genesis_slot
			.map(|genesis| slot.saturating_sub(genesis) / inner.config.epoch_length)
			.unwrap_or(0);
		let (authorities, randomness) = inner
			.epochs
			.get(&epoch_index)
			.cloned()
			.unwrap_or_else(|| (inner.config.authorities.clone(), inner.config.randomness));
		EpochData {
			epoch_index,
			authorities: authorities
				.into_iter()
				.map(|(raw, weight)| (sr25519::Public(raw), weight))
				.collect(),
			randomness,
			c: inner.config.c,
			secondary_slots: inner.config.secondary_slots,
		}
	}

	/// Digest scan on an imported or authored header: pins the first slot
	/// and stores any `NextEpochDescriptor` for the following epoch.
	pub fn note_header(&self, header: &Header) {
		let Some(pre_digest) = header
			.babe_pre_digest()
			.and_then(|bytes| PreDigest::decode(&mut &bytes[..]).ok())
		else {
			return
		};
		self.note_first_slot(pre_digest.slot());
		let Some(current_epoch) = self.epoch_index(pre_digest.slot()) else { return };

		for payload in header.digest.consensus(BABE_ENGINE_ID) {
			if let Ok(descriptor) = NextEpochDescriptor::decode(&mut &*payload) {
				log::debug!(
					target: crate::LOG_TARGET,
					"scheduling authorities for epoch {} from block #{}",
					current_epoch + 1,
					header.number,
				);
				self.inner
					.write()
					.epochs
					.insert(current_epoch + 1, (descriptor.authorities, descriptor.randomness));
			}
		}
	}

	/// Whether epoch `epoch_index` has recorded authorities and randomness.
	pub fn has_descriptor(&self, epoch_index: u64) -> bool {
		self.inner.read().epochs.contains_key(&epoch_index)
	}

	/// Install epoch data obtained from a `BabeApi_configuration` call made
	/// against a block inside the previous epoch.
	pub fn install_epoch(&self, epoch_index: u64, authorities: Vec<([u8; 32], u64)>, randomness: [u8; 32]) {
		self.inner.write().epochs.insert(epoch_index, (authorities, randomness));
	}

	/// Drop descriptors for epochs that already ended before `slot`.
	pub fn prune_before(&self, slot: u64) {
		let Some(current) = self.epoch_index(slot) else { return };
		self.inner.write().epochs.retain(|&epoch, _| epoch + 1 >= current);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::PrimaryPreDigest;
	use codec::Encode;
	use mp_runtime::{Digest, DigestItem, Hash};
	use pretty_assertions::assert_eq;

	fn config() -> BabeConfiguration {
		BabeConfiguration {
			slot_duration: 3000,
			epoch_length: 10,
			c: (1, 1),
			authorities: vec![([1; 32], 1)],
			randomness: [9; 32],
			secondary_slots: true,
		}
	}

	fn header_claiming(slot: u64) -> Header {
		let mut header = Header::new(Hash::zero(), 1);
		let claim = PreDigest::Primary(PrimaryPreDigest {
			authority_index: 0,
			slot,
			vrf_signature: sr25519::VrfSignature {
				pre_output: sr25519::VrfPreOutput([0; 32]),
				proof: sr25519::VrfProofBytes([0; 64]),
			},
		});
		header.digest = Digest {
			logs: vec![DigestItem::PreRuntime(BABE_ENGINE_ID, claim.encode())],
		};
		header
	}

	#[test]
	fn first_slot_pins_epoch_zero() {
		let state = EpochState::new(config());
		assert_eq!(state.epoch_index(100), None);
		state.note_first_slot(95);
		assert_eq!(state.epoch_index(95), Some(0));
		assert_eq!(state.epoch_index(104), Some(0));
		assert_eq!(state.epoch_index(105), Some(1));
		// Pinning is idempotent.
		state.note_first_slot(50);
		assert_eq!(state.epoch_index(95), Some(0));
	}

	#[test]
	fn falls_back_to_genesis_configuration() {
		let state = EpochState::with_first_slot(config(), 0);
		let epoch = state.data_for_slot(25);
		assert_eq!(epoch.epoch_index, 2);
		assert_eq!(epoch.authorities, vec![(sr25519::Public([1; 32]), 1)]);
		assert_eq!(epoch.randomness, [9; 32]);
	}

	#[test]
	fn next_epoch_descriptor_applies_at_the_boundary() {
		let state = EpochState::with_first_slot(config(), 0);
		let mut header = header_claiming(7);
		let descriptor =
			NextEpochDescriptor { authorities: vec![([2; 32], 1)], randomness: [4; 32] };
		header
			.digest
			.push(DigestItem::Consensus(BABE_ENGINE_ID, descriptor.encode()));
		state.note_header(&header);

		// Epoch 0 still runs the genesis set, epoch 1 the scheduled one.
		assert_eq!(state.data_for_slot(9).authorities, vec![(sr25519::Public([1; 32]), 1)]);
		assert_eq!(state.data_for_slot(10).authorities, vec![(sr25519::Public([2; 32]), 1)]);
		assert_eq!(state.data_for_slot(10).randomness, [4; 32]);
	}

	#[test]
	fn headers_pin_the_first_slot() {
		let state = EpochState::new(config());
		state.note_header(&header_claiming(42));
		assert_eq!(state.epoch_index(42), Some(0));
	}
}
