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

//! The block production worker.
//!
//! One long-lived task sleeps to each slot boundary, runs the lottery, and
//! on a claim assembles a block on top of the best head: initialise, apply
//! inherents, drain the transaction pool until the slot's wall clock (or
//! the runtime's resource limit) runs out, finalise, pre-digest and seal.
//! The finished block goes through the regular import pipeline.

use crate::{
	authorship::claim_slot,
	epochs::EpochState,
	types::{PreDigest, Slot},
	BabeError, LOG_TARGET,
};
use codec::{Decode, Encode};
use mc_blockchain::{BlockImporter, BlockOrigin};
use mc_executor::RuntimeApi;
use mc_transaction_pool::{PoolTransaction, TransactionPool};
use mp_core::{
	crypto::KeyTypeId,
	keystore::{Keystore, KeystorePtr},
	sr25519,
};
use mp_runtime::{
	inherents, Block, DigestItem, Header, InherentData, OpaqueExtrinsic, BABE_ENGINE_ID,
};
use mp_state_machine::TrieState;
use mp_trie::NodeStore;
use parking_lot::RwLock;
use std::{
	sync::Arc,
	time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tokio::sync::watch;

/// The block production service.
pub struct BabeWorker {
	keystore: KeystorePtr,
	epochs: Arc<EpochState>,
	importer: Arc<BlockImporter>,
	pool: Arc<TransactionPool>,
	runtime: RuntimeApi,
	storage: Arc<RwLock<NodeStore>>,
}

impl BabeWorker {
	/// Assemble the worker from its collaborators.
	pub fn new(
		keystore: KeystorePtr,
		epochs: Arc<EpochState>,
		importer: Arc<BlockImporter>,
		pool: Arc<TransactionPool>,
		runtime: RuntimeApi,
		storage: Arc<RwLock<NodeStore>>,
	) -> Self {
		Self { keystore, epochs, importer, pool, runtime, storage }
	}

	/// Drive slots until shutdown. Finishes the slot in progress before
	/// exiting.
	pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
		let slot_duration = Duration::from_millis(self.epochs.slot_duration());
		log::info!(target: LOG_TARGET, "block production started, slot duration {slot_duration:?}");
		loop {
			let slot = Slot::current(slot_duration);
			self.on_slot(slot);
			tokio::select! {
				_ = shutdown.changed() => {
					log::info!(target: LOG_TARGET, "block production stopping");
					return
				},
				_ = tokio::time::sleep(slot.remaining()) => {},
			}
		}
	}

	/// Lottery plus, on a win, block building for one slot.
	pub fn on_slot(&self, slot: Slot) {
		self.epochs.note_first_slot(slot.number);
		self.epochs.prune_before(slot.number);
		self.refresh_epoch_data(slot.number);
		let epoch = self.epochs.data_for_slot(slot.number);
		let Some((pre_digest, author)) = claim_slot(slot.number, &epoch, &self.keystore) else {
			log::trace!(target: LOG_TARGET, "not authorised for slot {}", slot.number);
			return
		};
		log::debug!(
			target: LOG_TARGET,
			"claimed slot {} ({})",
			slot.number,
			match pre_digest {
				PreDigest::Primary(_) => "primary",
				PreDigest::Secondary(_) => "secondary",
			},
		);

		match self.build_block(slot, pre_digest, author) {
			Ok(block) => {
				let hash = block.header.hash();
				let number = block.header.number;
				if let Err(error) = self.importer.import_block(block, BlockOrigin::Own) {
					log::warn!(target: LOG_TARGET, "own block {hash} rejected on import: {error}");
				} else {
					log::info!(target: LOG_TARGET, "authored block #{number} ({hash})");
				}
			},
			Err(error) => {
				log::warn!(target: LOG_TARGET, "failed to build block for slot {}: {error}", slot.number);
			},
		}
	}

	/// An epoch entered without an in-chain `NextEpochData` descriptor gets
	/// its data from `BabeApi_configuration` against the best block instead.
	fn refresh_epoch_data(&self, slot: u64) {
		let Some(epoch_index) = self.epochs.epoch_index(slot) else { return };
		if epoch_index == 0 || self.epochs.has_descriptor(epoch_index) {
			return
		}
		let best = self.importer.state().best_header();
		let Ok(trie) = self.storage.read().load(&best.state_root) else { return };
		match self.runtime.babe_configuration_raw(&TrieState::new(trie)) {
			Ok(raw) => match crate::types::BabeConfiguration::decode(&mut &raw[..]) {
				Ok(config) => {
					log::debug!(
						target: LOG_TARGET,
						"epoch {epoch_index} data fetched from the runtime",
					);
					self.epochs.install_epoch(epoch_index, config.authorities, config.randomness);
				},
				Err(error) => {
					log::warn!(target: LOG_TARGET, "undecodable runtime epoch configuration: {error}");
				},
			},
			Err(error) => {
				log::debug!(target: LOG_TARGET, "epoch configuration call failed: {error}");
			},
		}
	}

	/// Assemble, finalise and seal one block for `slot`.
	fn build_block(
		&self,
		slot: Slot,
		pre_digest: PreDigest,
		author: sr25519::Public,
	) -> Result<Block, BabeError> {
		let parent = self.importer.state().best_header();
		let parent_hash = parent.hash();

		let trie = self
			.storage
			.read()
			.load(&parent.state_root)
			.map_err(|error| BabeError::StateUnavailable(error.to_string()))?;
		let mut state = TrieState::new(trie);

		let mut header = Header::new(parent_hash, parent.number + 1);
		header
			.digest
			.push(DigestItem::PreRuntime(BABE_ENGINE_ID, pre_digest.encode()));

		state = self.runtime.initialize_block(state, &header)?;

		// Inherents first: timestamp, slot, last finalised number.
		let mut inherent_data = InherentData::new();
		inherent_data.put(inherents::TIMESTAMP, &unix_millis());
		inherent_data.put(inherents::BABE_SLOT, &slot.number);
		inherent_data.put(inherents::FINALIZED_NUMBER, &self.importer.state().finalized().1);
		let (inherent_extrinsics, new_state) =
			self.runtime.inherent_extrinsics(state, &inherent_data)?;
		state = new_state;

		let mut body: Vec<OpaqueExtrinsic> = Vec::new();
		for extrinsic in inherent_extrinsics {
			let (result, new_state) = self.runtime.apply_extrinsic(state, &extrinsic)?;
			state = new_state;
			if result.is_err() {
				// A refused inherent invalidates the whole block attempt.
				return Err(BabeError::InherentRejected(format!("{result:?}")))
			}
			body.push(OpaqueExtrinsic(extrinsic));
		}

		// Fill with pool transactions until the slot clock or the runtime
		// says stop.
		state = self.push_transactions(&slot, state, &mut body)?;

		let (mut final_header, state) = self.runtime.finalize_block(state)?;
		final_header.parent_hash = parent_hash;
		final_header.number = parent.number + 1;
		if final_header.digest.logs.is_empty() {
			final_header.digest = header.digest.clone();
		}

		// Seal over the seal-less header hash.
		let signature = self
			.keystore
			.sr25519_sign(KeyTypeId::BABE, &author, final_header.hash().as_bytes())
			.ok_or(BabeError::KeyDisappeared)?;
		final_header
			.digest
			.push(DigestItem::Seal(BABE_ENGINE_ID, signature.0.to_vec()));

		// Persist the post-state and check the runtime's declared root.
		let trie = state.into_trie();
		let computed_root = trie.root();
		if computed_root != final_header.state_root {
			return Err(BabeError::StateRootMismatch {
				declared: final_header.state_root,
				computed: computed_root,
			})
		}
		{
			let mut storage = self.storage.write();
			storage.insert(&trie);
			storage.pin(computed_root);
		}

		// A competing block may have arrived while building; abandon the
		// stale build rather than import a worse head.
		if self.importer.state().best_number() >= final_header.number {
			return Err(BabeError::StaleBuild)
		}

		Ok(Block { header: final_header, body })
	}

	fn push_transactions(
		&self,
		slot: &Slot,
		mut state: TrieState,
		body: &mut Vec<OpaqueExtrinsic>,
	) -> Result<TrieState, BabeError> {
		let mut unlucky: Vec<Arc<PoolTransaction>> = Vec::new();
		while Instant::now() < slot.ends_at() {
			let Some(transaction) = self.pool.pop() else { break };
			let snapshot = state.clone();
			let (result, new_state) = self.runtime.apply_extrinsic(state, &transaction.extrinsic)?;
			match result {
				Ok(outcome) => {
					// A failed dispatch still occupies its place in the
					// block.
					if let Err(error) = outcome {
						log::debug!(
							target: LOG_TARGET,
							"extrinsic {} dispatched with error {error:?}",
							transaction.hash,
						);
					}
					body.push(OpaqueExtrinsic(transaction.extrinsic.clone()));
					state = new_state;
				},
				Err(validity) if validity.exhausted_resources() => {
					// Block is full; the transaction stays for the next one.
					unlucky.push(transaction);
					state = snapshot;
					break
				},
				Err(validity) => {
					log::debug!(
						target: LOG_TARGET,
						"dropping invalid extrinsic {}: {validity:?}",
						transaction.hash,
					);
					self.pool.remove_invalid(&transaction.hash);
					state = snapshot;
				},
			}
		}
		for transaction in unlucky {
			self.pool.requeue(transaction);
		}
		Ok(state)
	}
}

fn unix_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_millis() as u64)
		.unwrap_or(0)
}
