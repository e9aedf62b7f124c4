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

//! The verification and import pipeline for blocks arriving from the
//! network or from this node's own author.
//!
//! Verification is layered: structural checks (parent, numbering) happen
//! against the tree, the consensus engine checks the slot claim and seal
//! through [`ConsensusVerifier`], and optionally the block is re-executed
//! through [`BlockExecutor`] to confirm the declared state root. Blocks
//! with an unknown parent wait in a bounded orphan buffer and are retried
//! after each successful import.

use crate::{
	error::BlockImportError,
	state::{BlockOrigin, BlockState},
	LOG_TARGET,
};
use mp_runtime::{Block, Hash};
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};

/// Blocks parked while their parent is missing.
const ORPHAN_CAPACITY: usize = 512;

/// Consensus-level header verification: pre-digest well-formedness and the
/// seal signature against the slot's expected authority.
pub trait ConsensusVerifier: Send + Sync {
	/// Verify the header of an incoming block.
	fn verify_header(&self, header: &mp_runtime::Header) -> Result<(), String>;
}

/// Re-execution of a block against its parent's state.
pub trait BlockExecutor: Send + Sync {
	/// Execute `block` on top of `parent`'s post-state, returning the
	/// computed state root. Implementations persist the resulting trie.
	fn execute_block(
		&self,
		parent: &mp_runtime::Header,
		block: &Block,
	) -> Result<Hash, String>;
}

/// A [`ConsensusVerifier`] that accepts every header; used for state-import
/// bootstrapping and in tests.
pub struct AcceptAll;

impl ConsensusVerifier for AcceptAll {
	fn verify_header(&self, _header: &mp_runtime::Header) -> Result<(), String> {
		Ok(())
	}
}

/// The import pipeline.
pub struct BlockImporter {
	state: Arc<BlockState>,
	verifier: Arc<dyn ConsensusVerifier>,
	executor: Option<Arc<dyn BlockExecutor>>,
	orphans: Mutex<VecDeque<(Block, BlockOrigin)>>,
}

impl BlockImporter {
	/// Build an importer over `state`. Passing `None` for `executor` skips
	/// state-root re-execution (used for own blocks, which were just built
	/// against that same state).
	pub fn new(
		state: Arc<BlockState>,
		verifier: Arc<dyn ConsensusVerifier>,
		executor: Option<Arc<dyn BlockExecutor>>,
	) -> Self {
		Self { state, verifier, executor, orphans: Mutex::new(VecDeque::new()) }
	}

	/// The block state this importer feeds.
	pub fn state(&self) -> &Arc<BlockState> {
		&self.state
	}

	/// Verify and import one block, then retry any orphans it unblocked.
	pub fn import_block(
		&self,
		block: Block,
		origin: BlockOrigin,
	) -> Result<(), BlockImportError> {
		let imported = self.import_one(block, origin)?;
		self.drain_orphans(imported);
		Ok(())
	}

	fn import_one(&self, block: Block, origin: BlockOrigin) -> Result<Hash, BlockImportError> {
		let hash = block.header.hash();
		if self.state.contains(&hash) {
			return Err(BlockImportError::AlreadyImported(hash))
		}

		let parent_hash = block.header.parent_hash;
		let Some(parent) = self
			.state
			.contains(&parent_hash)
			.then(|| self.state.header(&parent_hash))
			.flatten()
		else {
			self.park_orphan(block, origin);
			return Err(BlockImportError::UnknownParent { hash, parent: parent_hash })
		};

		self.verifier
			.verify_header(&block.header)
			.map_err(|reason| BlockImportError::BadSignature { hash, reason })?;

		if let Some(executor) = &self.executor {
			// The runtime re-executes the block without its seal.
			let mut unsealed = block.clone();
			unsealed.header.digest.pop_seal();
			let computed = executor
				.execute_block(&parent, &unsealed)
				.map_err(|reason| BlockImportError::ExecutionFailed { hash, reason })?;
			if computed != block.header.state_root {
				return Err(BlockImportError::BadStateRoot {
					hash,
					declared: block.header.state_root,
					computed,
				})
			}
		}

		self.state.add_block(block.header, Some(block.body), origin)?;
		Ok(hash)
	}

	fn park_orphan(&self, block: Block, origin: BlockOrigin) {
		let mut orphans = self.orphans.lock();
		if orphans.len() == ORPHAN_CAPACITY {
			let evicted = orphans.pop_front();
			if let Some((evicted, _)) = evicted {
				log::debug!(
					target: LOG_TARGET,
					"orphan buffer full, dropping block {}",
					evicted.header.hash(),
				);
			}
		}
		log::debug!(
			target: LOG_TARGET,
			"parking orphan block {} awaiting parent {}",
			block.header.hash(),
			block.header.parent_hash,
		);
		orphans.push_back((block, origin));
	}

	/// Import any parked orphans whose parent has just appeared; repeats
	/// until no more progress is made.
	fn drain_orphans(&self, mut newly_imported: Hash) {
		loop {
			let unblocked: Vec<(Block, BlockOrigin)> = {
				let mut orphans = self.orphans.lock();
				let mut ready = Vec::new();
				orphans.retain(|(block, origin)| {
					if block.header.parent_hash == newly_imported {
						ready.push((block.clone(), *origin));
						false
					} else {
						true
					}
				});
				ready
			};
			let Some((block, origin)) = unblocked.into_iter().next() else { return };
			match self.import_one(block, origin) {
				Ok(hash) => newly_imported = hash,
				Err(error) => {
					log::debug!(target: LOG_TARGET, "orphan import failed: {error}");
					return
				},
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::database::MemoryDb;
	use mp_runtime::Header;
	use pretty_assertions::assert_eq;

	fn genesis() -> Header {
		Header::new(Hash::zero(), 0)
	}

	fn block_after(parent: &Header, tag: u8) -> Block {
		let mut header = Header::new(parent.hash(), parent.number + 1);
		header.extrinsics_root = Hash::repeat_byte(tag);
		Block { header, body: Vec::new() }
	}

	fn importer(executor: Option<Arc<dyn BlockExecutor>>) -> BlockImporter {
		let state = Arc::new(BlockState::new(Arc::new(MemoryDb::new()), genesis()));
		BlockImporter::new(state, Arc::new(AcceptAll), executor)
	}

	struct EchoExecutor;

	impl BlockExecutor for EchoExecutor {
		fn execute_block(&self, _parent: &Header, block: &Block) -> Result<Hash, String> {
			// Pretend execution always reproduces the declared root.
			Ok(block.header.state_root)
		}
	}

	struct WrongRootExecutor;

	impl BlockExecutor for WrongRootExecutor {
		fn execute_block(&self, _parent: &Header, _block: &Block) -> Result<Hash, String> {
			Ok(Hash::repeat_byte(0xee))
		}
	}

	#[test]
	fn imports_chain_in_order() {
		let importer = importer(None);
		let a = block_after(&genesis(), 1);
		let b = block_after(&a.header, 2);
		importer.import_block(a.clone(), BlockOrigin::NetworkSync).unwrap();
		importer.import_block(b.clone(), BlockOrigin::NetworkSync).unwrap();
		assert_eq!(importer.state().best_hash(), b.header.hash());
	}

	#[test]
	fn orphan_waits_for_its_parent() {
		let importer = importer(None);
		let a = block_after(&genesis(), 1);
		let b = block_after(&a.header, 2);

		assert!(matches!(
			importer.import_block(b.clone(), BlockOrigin::NetworkBroadcast),
			Err(BlockImportError::UnknownParent { .. }),
		));
		assert!(!importer.state().contains(&b.header.hash()));

		// Importing the parent pulls the orphan in.
		importer.import_block(a.clone(), BlockOrigin::NetworkBroadcast).unwrap();
		assert!(importer.state().contains(&b.header.hash()));
	}

	#[test]
	fn execution_guards_the_state_root() {
		let importer = importer(Some(Arc::new(WrongRootExecutor)));
		let a = block_after(&genesis(), 1);
		assert!(matches!(
			importer.import_block(a, BlockOrigin::NetworkSync),
			Err(BlockImportError::BadStateRoot { .. }),
		));

		let importer = importer_with_echo();
		let a = block_after(&genesis(), 1);
		importer.import_block(a, BlockOrigin::NetworkSync).unwrap();
	}

	fn importer_with_echo() -> BlockImporter {
		importer(Some(Arc::new(EchoExecutor)))
	}

	#[test]
	fn rejecting_verifier_blocks_import() {
		struct RejectAll;
		impl ConsensusVerifier for RejectAll {
			fn verify_header(&self, _header: &Header) -> Result<(), String> {
				Err("bad seal".into())
			}
		}
		let state = Arc::new(BlockState::new(Arc::new(MemoryDb::new()), genesis()));
		let importer = BlockImporter::new(state, Arc::new(RejectAll), None);
		let a = block_after(&genesis(), 1);
		let error = importer.import_block(a, BlockOrigin::NetworkBroadcast).unwrap_err();
		assert!(error.is_bad_block());
		assert!(matches!(error, BlockImportError::BadSignature { .. }));
	}
}
