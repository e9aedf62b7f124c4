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

//! Genesis bootstrapping: build the genesis state trie and header and seed
//! the block state with them.

use mc_blockchain::{BlockState, DatabasePtr};
use mc_consensus_babe::BabeConfiguration;
use mp_runtime::{Hash, Header};
use mp_trie::{NodeStore, Trie};
use parking_lot::RwLock;
use std::sync::Arc;

/// Everything the node needs to start from block zero.
#[derive(Debug, Clone)]
pub struct GenesisConfig {
	/// The genesis key-value state (includes the runtime blob under
	/// `:code`).
	pub state: Vec<(Vec<u8>, Vec<u8>)>,
	/// The genesis BABE configuration.
	pub babe: BabeConfiguration,
	/// The genesis finality authorities.
	pub grandpa_authorities: Vec<([u8; 32], u64)>,
}

/// Build the genesis header over `state`: number zero, zero parent, state
/// root over the pairs and the empty extrinsics root.
pub fn genesis_header(state: &[(Vec<u8>, Vec<u8>)]) -> Header {
	let trie = Trie::from_pairs(state.iter().cloned());
	let mut header = Header::new(Hash::zero(), 0);
	header.state_root = trie.root();
	header.extrinsics_root = mp_trie::ordered_root(&[]);
	header
}

/// Store the genesis trie, pin its root and seed the block state.
pub fn initialize_genesis(
	db: DatabasePtr,
	storage: &Arc<RwLock<NodeStore>>,
	config: &GenesisConfig,
) -> Arc<BlockState> {
	let trie = Trie::from_pairs(config.state.iter().cloned());
	let header = genesis_header(&config.state);
	{
		let mut storage = storage.write();
		let root = storage.insert(&trie);
		storage.pin(root);
	}
	log::info!(
		target: crate::LOG_TARGET,
		"initialised genesis block {} with state root {}",
		header.hash(),
		header.state_root,
	);
	Arc::new(BlockState::new(db, header))
}

#[cfg(test)]
mod tests {
	use super::*;
	use mc_blockchain::MemoryDb;
	use pretty_assertions::assert_eq;

	fn sample_config() -> GenesisConfig {
		GenesisConfig {
			state: vec![(b":code".to_vec(), vec![0x00]), (b"balance:alice".to_vec(), vec![100])],
			babe: BabeConfiguration {
				slot_duration: 3000,
				epoch_length: 200,
				c: (1, 4),
				authorities: Vec::new(),
				randomness: [0; 32],
				secondary_slots: true,
			},
			grandpa_authorities: Vec::new(),
		}
	}

	#[test]
	fn genesis_header_commits_to_the_state() {
		let config = sample_config();
		let header = genesis_header(&config.state);
		assert_eq!(header.number, 0);
		assert_eq!(header.parent_hash, Hash::zero());
		assert_eq!(
			header.state_root,
			Trie::from_pairs(config.state.clone()).root(),
		);
	}

	#[test]
	fn initialization_pins_the_genesis_state() {
		let config = sample_config();
		let storage = Arc::new(RwLock::new(NodeStore::new()));
		let state = initialize_genesis(Arc::new(MemoryDb::new()), &storage, &config);

		let header = genesis_header(&config.state);
		assert_eq!(state.best_hash(), header.hash());
		assert_eq!(state.finalized(), (header.hash(), 0));

		// The genesis state survives a sweep.
		storage.write().sweep();
		let loaded = storage.read().load(&header.state_root).unwrap();
		assert_eq!(loaded.get(b"balance:alice"), Some(&[100u8][..]));
	}
}
