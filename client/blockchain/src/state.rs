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

//! The canonical block state: tree, header/body storage, finality and the
//! notification streams.
//!
//! Writers take the inner lock exclusively; notifications are sent while
//! the lock is held so every subscriber observes imports in insertion order
//! and finalisations in monotone number order. Subscriber channels are
//! bounded; a lagging subscriber loses the oldest notifications rather than
//! blocking the tree.

use crate::{
	database::{Column, Database, DatabasePtr},
	error::{BlockImportError, FinalizeError},
	tree::BlockTree,
	LOG_TARGET,
};
use codec::{Decode, Encode};
use mp_runtime::{BlockNumber, EncodedJustification, Hash, Header, OpaqueExtrinsic};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Bound of each subscriber's notification buffer.
const NOTIFICATION_BUFFER: usize = 256;

/// Where an imported block came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOrigin {
	/// Authored by this node.
	Own,
	/// Announced by a peer.
	NetworkBroadcast,
	/// Fetched during ancestor sync.
	NetworkSync,
	/// Loaded from a state/chain import.
	File,
}

/// Sent to subscribers after a block enters the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportNotification {
	/// The block's hash.
	pub hash: Hash,
	/// The block's number.
	pub number: BlockNumber,
	/// The full header.
	pub header: Header,
	/// Whether the block became the best head.
	pub is_best: bool,
	/// The block's origin.
	pub origin: BlockOrigin,
}

/// Sent to subscribers after finalisation moved the tree root.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalityNotification {
	/// The newly finalised block.
	pub hash: Hash,
	/// Its number.
	pub number: BlockNumber,
	/// Its header.
	pub header: Header,
	/// Blocks discarded because they were not on the finalised path.
	pub pruned: Vec<Hash>,
	/// State roots of the pruned blocks, for trie store sweeping.
	pub stale_state_roots: Vec<Hash>,
}

struct Inner {
	tree: BlockTree,
	headers: HashMap<Hash, Header>,
	bodies: HashMap<Hash, Vec<OpaqueExtrinsic>>,
	finalized: (Hash, BlockNumber),
}

/// Thread-safe access to the chain's block data.
pub struct BlockState {
	db: DatabasePtr,
	genesis_hash: Hash,
	inner: RwLock<Inner>,
	import_tx: broadcast::Sender<ImportNotification>,
	finality_tx: broadcast::Sender<FinalityNotification>,
}

impl BlockState {
	/// Start a block state rooted at `root_header` (genesis, or the head of
	/// an imported state snapshot).
	pub fn new(db: DatabasePtr, root_header: Header) -> Self {
		let hash = root_header.hash();
		let number = root_header.number;
		db.insert(Column::Header, hash.as_bytes(), root_header.encode());
		let inner = Inner {
			tree: BlockTree::new(hash, number),
			headers: HashMap::from([(hash, root_header)]),
			bodies: HashMap::new(),
			finalized: (hash, number),
		};
		let (import_tx, _) = broadcast::channel(NOTIFICATION_BUFFER);
		let (finality_tx, _) = broadcast::channel(NOTIFICATION_BUFFER);
		Self { db, genesis_hash: hash, inner: RwLock::new(inner), import_tx, finality_tx }
	}

	/// The hash this state was rooted at when created.
	pub fn genesis_hash(&self) -> Hash {
		self.genesis_hash
	}

	/// The best head per fork choice.
	pub fn best_hash(&self) -> Hash {
		self.inner.read().tree.best_head()
	}

	/// The best head's header.
	pub fn best_header(&self) -> Header {
		let inner = self.inner.read();
		let best = inner.tree.best_head();
		inner.headers.get(&best).cloned().expect("every tree node has a stored header; qed")
	}

	/// The best head's number.
	pub fn best_number(&self) -> BlockNumber {
		self.best_header().number
	}

	/// The latest finalised block.
	pub fn finalized(&self) -> (Hash, BlockNumber) {
		self.inner.read().finalized
	}

	/// The latest finalised header.
	pub fn finalized_header(&self) -> Header {
		let inner = self.inner.read();
		inner
			.headers
			.get(&inner.finalized.0)
			.cloned()
			.expect("the finalised block always has a stored header; qed")
	}

	/// The header of `hash`, from memory or the database.
	pub fn header(&self, hash: &Hash) -> Option<Header> {
		if let Some(header) = self.inner.read().headers.get(hash) {
			return Some(header.clone())
		}
		self.db
			.get(Column::Header, hash.as_bytes())
			.and_then(|bytes| Header::decode(&mut &bytes[..]).ok())
	}

	/// The body of `hash`, from memory or the database.
	pub fn body(&self, hash: &Hash) -> Option<Vec<OpaqueExtrinsic>> {
		if let Some(body) = self.inner.read().bodies.get(hash) {
			return Some(body.clone())
		}
		self.db
			.get(Column::Block, hash.as_bytes())
			.and_then(|bytes| Vec::<OpaqueExtrinsic>::decode(&mut &bytes[..]).ok())
	}

	/// The stored justification for `hash`, if finalised with one.
	pub fn justification(&self, hash: &Hash) -> Option<EncodedJustification> {
		self.db.get(Column::Justification, hash.as_bytes())
	}

	/// Whether `hash` is in the unfinalised tree.
	pub fn contains(&self, hash: &Hash) -> bool {
		self.inner.read().tree.contains(hash)
	}

	/// Whether `descendant` is at-or-below `ancestor`.
	pub fn is_descendant(&self, ancestor: &Hash, descendant: &Hash) -> bool {
		self.inner.read().tree.is_descendant(ancestor, descendant)
	}

	/// The path from `ancestor` to `descendant`, inclusive.
	pub fn subchain(&self, ancestor: &Hash, descendant: &Hash) -> Option<Vec<Hash>> {
		self.inner.read().tree.subchain(ancestor, descendant)
	}

	/// The current leaves of the tree.
	pub fn leaves(&self) -> Vec<Hash> {
		self.inner.read().tree.leaves()
	}

	/// Attach an already-verified block to the tree, persist it, and notify
	/// subscribers.
	pub fn add_block(
		&self,
		header: Header,
		body: Option<Vec<OpaqueExtrinsic>>,
		origin: BlockOrigin,
	) -> Result<ImportNotification, BlockImportError> {
		let hash = header.hash();
		let mut inner = self.inner.write();
		if inner.tree.contains(&hash) {
			return Err(BlockImportError::AlreadyImported(hash))
		}
		let parent = header.parent_hash;
		let Some(parent_number) = inner.tree.number(&parent) else {
			return Err(if header.number <= inner.finalized.1 {
				BlockImportError::BelowFinalized(hash)
			} else {
				BlockImportError::UnknownParent { hash, parent }
			})
		};
		if header.number != parent_number + 1 {
			return Err(BlockImportError::NumberMismatch {
				hash,
				number: header.number,
				parent_number,
			})
		}

		inner.tree.insert(hash, header.number, &parent);
		inner.headers.insert(hash, header.clone());
		self.db.insert(Column::Header, hash.as_bytes(), header.encode());
		if let Some(body) = body {
			self.db.insert(Column::Block, hash.as_bytes(), body.encode());
			inner.bodies.insert(hash, body);
		}

		let notification = ImportNotification {
			hash,
			number: header.number,
			header,
			is_best: inner.tree.best_head() == hash,
			origin,
		};
		log::debug!(
			target: LOG_TARGET,
			"imported block #{} ({hash}), best={}",
			notification.number,
			notification.is_best,
		);
		// Sent under the lock so subscribers see insertion order.
		let _ = self.import_tx.send(notification.clone());
		Ok(notification)
	}

	/// Move the finalised root to `hash`, pruning every branch not through
	/// it, and notify subscribers.
	pub fn finalize(
		&self,
		hash: Hash,
		justification: Option<EncodedJustification>,
	) -> Result<FinalityNotification, FinalizeError> {
		let mut inner = self.inner.write();
		if !inner.tree.contains(&hash) {
			return Err(FinalizeError::UnknownBlock(hash))
		}
		let root = inner.tree.root_hash();
		if !inner.tree.is_descendant(&root, &hash) {
			return Err(FinalizeError::NotDescendant(hash))
		}

		// Ancestors on the finalised path leave the tree but stay on disk;
		// blocks on losing forks are deleted outright.
		let canonical: std::collections::HashSet<Hash> = inner
			.tree
			.subchain(&root, &hash)
			.expect("descendance was checked above; qed")
			.into_iter()
			.collect();
		let dropped = inner.tree.finalize(&hash);
		let mut pruned = Vec::new();
		let mut stale_state_roots = Vec::new();
		for stale in dropped {
			let header = inner.headers.remove(&stale);
			inner.bodies.remove(&stale);
			if canonical.contains(&stale) {
				continue
			}
			if let Some(header) = header {
				stale_state_roots.push(header.state_root);
			}
			self.db.remove(Column::Header, stale.as_bytes());
			self.db.remove(Column::Block, stale.as_bytes());
			pruned.push(stale);
		}

		let header = inner
			.headers
			.get(&hash)
			.cloned()
			.expect("the new root survived pruning; qed");
		inner.finalized = (hash, header.number);
		if let Some(justification) = justification {
			self.db.insert(Column::Justification, hash.as_bytes(), justification);
		}

		let notification = FinalityNotification {
			hash,
			number: header.number,
			header,
			pruned,
			stale_state_roots,
		};
		log::info!(
			target: LOG_TARGET,
			"finalised block #{} ({hash}), pruned {} stale blocks",
			notification.number,
			notification.pruned.len(),
		);
		let _ = self.finality_tx.send(notification.clone());
		Ok(notification)
	}

	/// Subscribe to import notifications.
	pub fn import_notification_stream(&self) -> broadcast::Receiver<ImportNotification> {
		self.import_tx.subscribe()
	}

	/// Subscribe to finality notifications.
	pub fn finality_notification_stream(&self) -> broadcast::Receiver<FinalityNotification> {
		self.finality_tx.subscribe()
	}
}
