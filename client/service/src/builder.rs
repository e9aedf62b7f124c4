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

//! Node assembly.
//!
//! Builds the storage, executor, consensus and pool services and connects
//! them with channels: the sync driver feeds the importer task, imports
//! feed epoch/authority tracking and pool maintenance, the producer and
//! voter run on their own timers. Each service owns its state; cross-service
//! communication goes through the narrow handles wired here.

use crate::{
	genesis::{initialize_genesis, GenesisConfig},
	tasks::TaskManager,
	ServiceError, LOG_TARGET,
};
use codec::Decode;
use mc_blockchain::{
	BlockExecutor, BlockImporter, BlockOrigin, BlockState, DatabasePtr, MemoryDb,
};
use mc_consensus_babe::{BabeVerifier, BabeWorker, EpochState};
use mc_consensus_grandpa::{GrandpaMessage, GrandpaNetwork, GrandpaVoter, SharedAuthoritySet};
use mc_executor::{RuntimeApi, WasmRuntime};
use mc_transaction_pool::{PoolError, TransactionPool, TransactionValidator};
use mp_core::{ed25519, keystore::KeystorePtr};
use mp_runtime::{Block, Header};
use mp_state_machine::TrieState;
use mp_trie::NodeStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;

/// How a node participates in consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	/// Follows and verifies only.
	Full,
	/// Authors blocks and votes.
	Authority,
}

/// Static node configuration the CLI collaborator hands over.
pub struct ServiceConfig {
	/// Consensus participation.
	pub role: Role,
	/// The chain's genesis.
	pub genesis: GenesisConfig,
	/// The runtime blob. Falls back to the `:code` genesis entry when
	/// empty.
	pub runtime_code: Vec<u8>,
}

/// The assembled node: shared handles plus the running tasks.
pub struct Service {
	/// The runtime call dispatcher.
	pub runtime_api: RuntimeApi,
	/// Canonical chain state.
	pub block_state: Arc<BlockState>,
	/// The import pipeline, fed by sync and the producer.
	pub importer: Arc<BlockImporter>,
	/// The transaction pool.
	pub pool: Arc<TransactionPool>,
	/// Trie node storage.
	pub storage: Arc<RwLock<NodeStore>>,
	/// Epoch bookkeeping.
	pub epochs: Arc<EpochState>,
	/// The finality authority set.
	pub authorities: Arc<SharedAuthoritySet>,
	/// Task lifecycle handle.
	pub task_manager: TaskManager,
	/// Inbox for blocks arriving from the network.
	pub block_sender: mpsc::Sender<(Block, BlockOrigin)>,
	/// Inbox for finality-gadget messages from the network.
	pub grandpa_sender: mpsc::Sender<(mc_consensus_grandpa::PeerId, GrandpaMessage)>,
}

/// Executes blocks against their parent state through the WASM runtime,
/// persisting the resulting tries.
pub struct WasmBlockExecutor {
	runtime: RuntimeApi,
	storage: Arc<RwLock<NodeStore>>,
}

impl WasmBlockExecutor {
	/// Build the execution adapter.
	pub fn new(runtime: RuntimeApi, storage: Arc<RwLock<NodeStore>>) -> Self {
		Self { runtime, storage }
	}
}

impl BlockExecutor for WasmBlockExecutor {
	fn execute_block(&self, parent: &Header, block: &Block) -> Result<mp_runtime::Hash, String> {
		let trie = self
			.storage
			.read()
			.load(&parent.state_root)
			.map_err(|error| format!("parent state unavailable: {error}"))?;
		let state = self
			.runtime
			.execute_block(TrieState::new(trie), block)
			.map_err(|error| error.to_string())?;
		let trie = state.into_trie();
		let root = trie.root();
		let mut storage = self.storage.write();
		storage.insert(&trie);
		storage.pin(root);
		Ok(root)
	}
}

/// Validates pool submissions against the current best state.
pub struct RuntimeValidator {
	runtime: RuntimeApi,
	block_state: Arc<BlockState>,
	storage: Arc<RwLock<NodeStore>>,
}

impl TransactionValidator for RuntimeValidator {
	fn validate(
		&self,
		extrinsic: &[u8],
	) -> Result<mp_runtime::ValidTransaction, PoolError> {
		let best = self.block_state.best_header();
		let trie = self
			.storage
			.read()
			.load(&best.state_root)
			.map_err(|error| PoolError::Validator(error.to_string()))?;
		let verdict = self
			.runtime
			.validate_transaction(&TrieState::new(trie), extrinsic)
			.map_err(|error| PoolError::Validator(error.to_string()))?;
		verdict.map_err(PoolError::Invalid)
	}
}

/// Outgoing finality messages handed to the network collaborator.
pub struct ChannelGrandpaNetwork {
	outgoing: mpsc::UnboundedSender<(Option<mc_consensus_grandpa::PeerId>, GrandpaMessage)>,
}

impl GrandpaNetwork for ChannelGrandpaNetwork {
	fn broadcast(&self, message: GrandpaMessage) {
		let _ = self.outgoing.send((None, message));
	}

	fn send_to(&self, peer: mc_consensus_grandpa::PeerId, message: GrandpaMessage) {
		let _ = self.outgoing.send((Some(peer), message));
	}
}

impl Service {
	/// Build and start a node over an in-memory database.
	///
	/// Returns the service plus the stream of outgoing finality messages
	/// the network layer must deliver.
	pub fn start(
		config: ServiceConfig,
		keystore: KeystorePtr,
	) -> Result<
		(Self, mpsc::UnboundedReceiver<(Option<mc_consensus_grandpa::PeerId>, GrandpaMessage)>),
		ServiceError,
	> {
		let db: DatabasePtr = Arc::new(MemoryDb::new());
		let storage = Arc::new(RwLock::new(NodeStore::new()));
		let block_state = initialize_genesis(db.clone(), &storage, &config.genesis);

		let code = if config.runtime_code.is_empty() {
			config
				.genesis
				.state
				.iter()
				.find(|(key, _)| key == b":code")
				.map(|(_, code)| code.clone())
				.unwrap_or_default()
		} else {
			config.runtime_code.clone()
		};
		let runtime = Arc::new(WasmRuntime::new(&code)?);
		let is_authority = config.role == Role::Authority;
		let runtime_api = RuntimeApi::new(runtime, keystore.clone(), is_authority);

		let epochs = Arc::new(EpochState::new(config.genesis.babe.clone()));
		let authorities = Arc::new(SharedAuthoritySet::new(
			config
				.genesis
				.grandpa_authorities
				.iter()
				.map(|(key, weight)| (ed25519::Public(*key), *weight))
				.collect(),
		));

		let verifier = Arc::new(BabeVerifier::new(epochs.clone()));
		let executor =
			Arc::new(WasmBlockExecutor::new(runtime_api.clone(), storage.clone()));
		let importer = Arc::new(BlockImporter::new(
			block_state.clone(),
			verifier,
			Some(executor as Arc<dyn BlockExecutor>),
		));

		let pool = Arc::new(TransactionPool::new());
		let mut task_manager = TaskManager::new();

		// Importer task: drains blocks handed over by the network layer.
		let (block_sender, mut block_receiver) =
			mpsc::channel::<(Block, BlockOrigin)>(1024);
		{
			let importer = importer.clone();
			let mut shutdown = task_manager.shutdown_receiver();
			task_manager.spawn("block-import", async move {
				loop {
					tokio::select! {
						_ = shutdown.changed() => return,
						incoming = block_receiver.recv() => {
							let Some((block, origin)) = incoming else { return };
							if let Err(error) = importer.import_block(block, origin) {
								log::debug!(target: LOG_TARGET, "import failed: {error}");
							}
						},
					}
				}
			});
		}

		// Chain maintenance: every import (own blocks included) feeds
		// authority-change tracking and pool eviction; finality activates
		// scheduled authority changes and sweeps stale tries.
		{
			let pool = pool.clone();
			let authorities = authorities.clone();
			let storage = storage.clone();
			let mut imports = block_state.import_notification_stream();
			let mut finality = block_state.finality_notification_stream();
			let mut shutdown = task_manager.shutdown_receiver();
			task_manager.spawn("chain-maintenance", async move {
				loop {
					tokio::select! {
						_ = shutdown.changed() => return,
						notification = imports.recv() => {
							if let Ok(notification) = notification {
								authorities.note_header(&notification.header);
								if notification.is_best {
									pool.maintain(notification.number);
								}
							}
						},
						notification = finality.recv() => {
							if let Ok(notification) = notification {
								authorities.note_finalized(notification.number);
								let mut storage = storage.write();
								for stale in &notification.stale_state_roots {
									storage.unpin(stale);
								}
								storage.sweep();
							}
						},
					}
				}
			});
		}

		// The block producer.
		if is_authority {
			let worker = BabeWorker::new(
				keystore.clone(),
				epochs.clone(),
				importer.clone(),
				pool.clone(),
				runtime_api.clone(),
				storage.clone(),
			);
			let shutdown = task_manager.shutdown_receiver();
			task_manager.spawn("babe", worker.run(shutdown));
		}

		// The finality voter.
		let (grandpa_sender, grandpa_receiver) = mpsc::channel(1024);
		let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
		{
			let voter = GrandpaVoter::new(
				keystore,
				authorities.clone(),
				block_state.clone(),
				Arc::new(ChannelGrandpaNetwork { outgoing: outgoing_tx }),
			)
			.with_database(db);
			let shutdown = task_manager.shutdown_receiver();
			task_manager.spawn("grandpa", voter.run(grandpa_receiver, shutdown));
		}

		log::info!(target: LOG_TARGET, "node services started");
		Ok((
			Self {
				runtime_api,
				block_state,
				importer,
				pool,
				storage,
				epochs,
				authorities,
				task_manager,
				block_sender,
				grandpa_sender,
			},
			outgoing_rx,
		))
	}

	/// Decode the runtime's BABE configuration from a raw
	/// `BabeApi_configuration` payload.
	pub fn decode_babe_configuration(
		raw: &[u8],
	) -> Result<mc_consensus_babe::BabeConfiguration, ServiceError> {
		mc_consensus_babe::BabeConfiguration::decode(&mut &*raw)
			.map_err(|error| ServiceError::BadConfiguration(error.to_string()))
	}

	/// A pool validator bound to this node's best state, for the gossip
	/// handler.
	pub fn transaction_validator(&self) -> RuntimeValidator {
		RuntimeValidator {
			runtime: self.runtime_api.clone(),
			block_state: self.block_state.clone(),
			storage: self.storage.clone(),
		}
	}

	/// A fresh sync driver over this node's importer, for the network
	/// service.
	pub fn chain_sync(&self) -> mc_sync::ChainSync {
		mc_sync::ChainSync::new(self.importer.clone())
	}
}
