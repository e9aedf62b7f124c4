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

//! State import: bootstrap a node from a state snapshot plus the header it
//! belongs to, without replaying history.

use crate::ServiceError;
use mc_blockchain::{BlockState, DatabasePtr};
use mc_consensus_babe::{BabeConfiguration, EpochState};
use mp_runtime::Header;
use mp_trie::{NodeStore, Trie};
use parking_lot::RwLock;
use std::sync::Arc;

/// Load `pairs` as the state of `header`, verify the trie root against the
/// header, pin it, and start the block state at that head. `first_slot`
/// pins the epoch-0 boundary for the slot lottery.
pub fn import_state(
	db: DatabasePtr,
	storage: &Arc<RwLock<NodeStore>>,
	babe: BabeConfiguration,
	pairs: Vec<(Vec<u8>, Vec<u8>)>,
	header: Header,
	first_slot: u64,
) -> Result<(Arc<BlockState>, Arc<EpochState>), ServiceError> {
	let trie = Trie::from_pairs(pairs);
	let computed = trie.root();
	if computed != header.state_root {
		return Err(ServiceError::StateRootMismatch {
			declared: header.state_root,
			computed,
		})
	}
	{
		let mut storage = storage.write();
		let root = storage.insert(&trie);
		storage.pin(root);
	}
	log::info!(
		target: crate::LOG_TARGET,
		"imported state at block #{} ({}), first slot {first_slot}",
		header.number,
		header.hash(),
	);
	let epochs = Arc::new(EpochState::with_first_slot(babe, first_slot));
	let state = Arc::new(BlockState::new(db, header));
	Ok((state, epochs))
}
