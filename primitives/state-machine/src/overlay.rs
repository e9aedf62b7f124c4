// This file is part of Meridian.

// Copyright (C) Meridian Developers.
// SPDX-License-Identifier: Apache-2.0

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// 	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The transactional write overlay kept on top of a state trie during
//! runtime execution.
//!
//! Each key holds a stack of versions, one per transaction that wrote it.
//! Which keys the current transaction touched is tracked in a per-depth
//! dirty set, so closing a transaction only visits the keys it wrote.
//! Transactions opened by the client (the block builder) are protected from
//! being closed by the runtime.

use smallvec::SmallVec;
use std::collections::{BTreeMap, HashSet};

/// Raw storage key.
pub type StorageKey = Vec<u8>;

/// Raw storage value.
pub type StorageValue = Vec<u8>;

const PROOF_ENTRY_NON_EMPTY: &str = "\
	an overlay entry is created with one version and removed when the last \
	version is popped; qed";

/// Error returned when closing a transaction while none is open, or when the
/// runtime tries to close a transaction the client opened.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("no open storage transaction")]
pub struct NoOpenTransaction;

/// Who currently drives the overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
	/// The client: all transactions may be closed.
	#[default]
	Client,
	/// The runtime: transactions opened by the client are protected.
	Runtime,
}

/// The version stack for one key. `None` marks a deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct OverlayedEntry {
	versions: SmallVec<[Option<StorageValue>; 2]>,
}

impl OverlayedEntry {
	fn value(&self) -> Option<&StorageValue> {
		self.versions.last().expect(PROOF_ENTRY_NON_EMPTY).as_ref()
	}

	fn set(&mut self, value: Option<StorageValue>, first_write_in_tx: bool) {
		if first_write_in_tx || self.versions.is_empty() {
			self.versions.push(value);
		} else {
			*self.versions.last_mut().expect(PROOF_ENTRY_NON_EMPTY) = value;
		}
	}
}

/// A change set over one trie (the main trie or one child trie) with nested
/// transaction support.
#[derive(Debug, Clone, Default)]
pub struct OverlayedMap {
	changes: BTreeMap<StorageKey, OverlayedEntry>,
	/// One dirty-key set per open transaction; the length is the depth.
	dirty_keys: SmallVec<[HashSet<StorageKey>; 2]>,
	/// Leading transactions opened by the client, protected in runtime mode.
	num_client_transactions: usize,
	execution_mode: ExecutionMode,
}

impl OverlayedMap {
	/// A map at the same transaction depth as `self` but without contents.
	/// Used when a child trie is first touched mid-execution.
	pub fn spawn_child(&self) -> Self {
		Self {
			changes: BTreeMap::new(),
			dirty_keys: std::iter::repeat_with(HashSet::new)
				.take(self.transaction_depth())
				.collect(),
			num_client_transactions: self.num_client_transactions,
			execution_mode: self.execution_mode,
		}
	}

	/// The pending change for `key`: `None` if untouched, `Some(None)` if
	/// deleted, `Some(Some(_))` if written.
	pub fn value(&self, key: &[u8]) -> Option<Option<&StorageValue>> {
		self.changes.get(key).map(OverlayedEntry::value)
	}

	/// Record a write (`Some`) or deletion (`None`) of `key`.
	pub fn set(&mut self, key: StorageKey, value: Option<StorageValue>) {
		let first_write_in_tx = self
			.dirty_keys
			.last_mut()
			.map(|dirty| dirty.insert(key.clone()))
			.unwrap_or(false);
		self.changes.entry(key).or_default().set(value, first_write_in_tx);
	}

	/// Mark every key matched by `predicate` as deleted, returning how many
	/// previously-live overlay entries were affected.
	pub fn clear_where(&mut self, predicate: impl Fn(&[u8]) -> bool) -> u32 {
		let mut cleared = 0;
		let keys: Vec<StorageKey> =
			self.changes.keys().filter(|key| predicate(key)).cloned().collect();
		for key in keys {
			if self.changes[&key].value().is_some() {
				cleared += 1;
			}
			self.set(key, None);
		}
		cleared
	}

	/// The pending changes with keys strictly greater than `key`, in order.
	pub fn changes_after(
		&self,
		key: &[u8],
	) -> impl Iterator<Item = (&[u8], Option<&StorageValue>)> {
		use std::ops::Bound;
		self.changes
			.range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
			.map(|(k, v)| (k.as_slice(), v.value()))
	}

	/// All pending changes as seen by the current transaction.
	pub fn changes(&self) -> impl Iterator<Item = (&StorageKey, Option<&StorageValue>)> {
		self.changes.iter().map(|(k, v)| (k, v.value()))
	}

	/// Current transaction nesting depth. Zero means writes commit directly.
	pub fn transaction_depth(&self) -> usize {
		self.dirty_keys.len()
	}

	/// Open a nested transaction.
	pub fn start_transaction(&mut self) {
		self.dirty_keys.push(Default::default());
	}

	/// Commit the innermost transaction into its parent.
	pub fn commit_transaction(&mut self) -> Result<(), NoOpenTransaction> {
		self.close_transaction(false)
	}

	/// Discard the innermost transaction's writes.
	pub fn rollback_transaction(&mut self) -> Result<(), NoOpenTransaction> {
		self.close_transaction(true)
	}

	/// Switch to runtime mode, protecting the currently open transactions.
	pub fn enter_runtime(&mut self) {
		debug_assert_eq!(self.execution_mode, ExecutionMode::Client, "not reentrant; qed");
		self.execution_mode = ExecutionMode::Runtime;
		self.num_client_transactions = self.transaction_depth();
	}

	/// Return to client mode, rolling back transactions the runtime left
	/// open.
	pub fn exit_runtime(&mut self) {
		if self.execution_mode == ExecutionMode::Client {
			return
		}
		self.execution_mode = ExecutionMode::Client;
		if self.has_open_runtime_transactions() {
			log::warn!(
				target: "state",
				"{} storage transactions left open by the runtime; rolling them back",
				self.transaction_depth() - self.num_client_transactions,
			);
		}
		while self.has_open_runtime_transactions() {
			self.rollback_transaction()
				.expect("the loop condition checks the depth is > 0; qed");
		}
	}

	/// Consume the overlay and return the committed changes.
	///
	/// Panics if any transaction is still open.
	pub fn drain_committed(self) -> impl Iterator<Item = (StorageKey, Option<StorageValue>)> {
		assert!(self.transaction_depth() == 0, "cannot drain with open transactions");
		self.changes.into_iter().map(|(key, mut entry)| {
			(key, entry.versions.pop().expect(PROOF_ENTRY_NON_EMPTY))
		})
	}

	fn close_transaction(&mut self, rollback: bool) -> Result<(), NoOpenTransaction> {
		if self.execution_mode == ExecutionMode::Runtime && !self.has_open_runtime_transactions() {
			return Err(NoOpenTransaction)
		}

		for key in self.dirty_keys.pop().ok_or(NoOpenTransaction)? {
			let entry = self.changes.get_mut(&key).expect(
				"a write is recorded in the dirty set only for keys present in the \
				 change map; qed",
			);

			if rollback {
				entry.versions.pop();
				if entry.versions.is_empty() {
					self.changes.remove(&key);
				}
			} else {
				let has_predecessor = if let Some(dirty) = self.dirty_keys.last_mut() {
					// Not the outermost tx: did the parent write this key?
					!dirty.insert(key)
				} else {
					// Outermost tx: is there a committed version below?
					entry.versions.len() > 1
				};
				if has_predecessor {
					let dropped = entry.versions.pop().expect(PROOF_ENTRY_NON_EMPTY);
					*entry.versions.last_mut().expect(PROOF_ENTRY_NON_EMPTY) = dropped;
				}
			}
		}
		Ok(())
	}

	fn has_open_runtime_transactions(&self) -> bool {
		self.transaction_depth() > self.num_client_transactions
	}
}

/// The full overlay: the main trie's change set plus one per touched child
/// trie, all kept at the same transaction depth.
#[derive(Debug, Clone, Default)]
pub struct OverlayedChanges {
	top: OverlayedMap,
	children: BTreeMap<Vec<u8>, OverlayedMap>,
}

impl OverlayedChanges {
	/// An empty overlay.
	pub fn new() -> Self {
		Self::default()
	}

	/// The main trie's change set.
	pub fn top(&self) -> &OverlayedMap {
		&self.top
	}

	/// Mutable access to the main trie's change set.
	pub fn top_mut(&mut self) -> &mut OverlayedMap {
		&mut self.top
	}

	/// The change set of child trie `name`, if touched.
	pub fn child(&self, name: &[u8]) -> Option<&OverlayedMap> {
		self.children.get(name)
	}

	/// The change set of child trie `name`, created at the current depth on
	/// first use.
	pub fn child_mut(&mut self, name: &[u8]) -> &mut OverlayedMap {
		let template = &self.top;
		self.children
			.entry(name.to_vec())
			.or_insert_with(|| template.spawn_child())
	}

	/// Names of the touched child tries.
	pub fn children(&self) -> impl Iterator<Item = (&[u8], &OverlayedMap)> {
		self.children.iter().map(|(name, map)| (name.as_slice(), map))
	}

	/// Current transaction depth.
	pub fn transaction_depth(&self) -> usize {
		self.top.transaction_depth()
	}

	/// Open a nested transaction across the main and all child change sets.
	pub fn start_transaction(&mut self) {
		self.top.start_transaction();
		for child in self.children.values_mut() {
			child.start_transaction();
		}
	}

	/// Commit the innermost transaction everywhere.
	pub fn commit_transaction(&mut self) -> Result<(), NoOpenTransaction> {
		self.top.commit_transaction()?;
		for child in self.children.values_mut() {
			child
				.commit_transaction()
				.expect("child overlays are kept at the top overlay's depth; qed");
		}
		Ok(())
	}

	/// Roll back the innermost transaction everywhere.
	pub fn rollback_transaction(&mut self) -> Result<(), NoOpenTransaction> {
		self.top.rollback_transaction()?;
		for child in self.children.values_mut() {
			child
				.rollback_transaction()
				.expect("child overlays are kept at the top overlay's depth; qed");
		}
		Ok(())
	}

	/// Enter runtime mode everywhere.
	pub fn enter_runtime(&mut self) {
		self.top.enter_runtime();
		for child in self.children.values_mut() {
			child.enter_runtime();
		}
	}

	/// Exit runtime mode everywhere, rolling back dangling transactions.
	pub fn exit_runtime(&mut self) {
		self.top.exit_runtime();
		for child in self.children.values_mut() {
			child.exit_runtime();
		}
	}

	/// Consume into per-trie committed change lists.
	pub fn into_committed(
		self,
	) -> (
		Vec<(StorageKey, Option<StorageValue>)>,
		Vec<(Vec<u8>, Vec<(StorageKey, Option<StorageValue>)>)>,
	) {
		let top = self.top.drain_committed().collect();
		let children = self
			.children
			.into_iter()
			.map(|(name, map)| (name, map.drain_committed().collect()))
			.collect();
		(top, children)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn drained(map: OverlayedMap) -> Vec<(StorageKey, Option<StorageValue>)> {
		map.drain_committed().collect()
	}

	#[test]
	fn writes_without_transaction_commit_directly() {
		let mut map = OverlayedMap::default();
		map.set(b"key0".to_vec(), Some(b"val0".to_vec()));
		map.set(b"key0".to_vec(), Some(b"val0-1".to_vec()));
		map.set(b"key1".to_vec(), None);

		assert_eq!(
			drained(map),
			vec![
				(b"key0".to_vec(), Some(b"val0-1".to_vec())),
				(b"key1".to_vec(), None),
			],
		);
	}

	#[test]
	fn rollback_discards_and_commit_keeps() {
		let mut map = OverlayedMap::default();
		map.set(b"key".to_vec(), Some(b"committed".to_vec()));

		map.start_transaction();
		map.set(b"key".to_vec(), Some(b"kept".to_vec()));
		map.set(b"other".to_vec(), Some(b"kept-too".to_vec()));

		map.start_transaction();
		map.set(b"key".to_vec(), Some(b"dropped".to_vec()));
		assert_eq!(map.value(b"key"), Some(Some(&b"dropped".to_vec())));
		map.rollback_transaction().unwrap();
		assert_eq!(map.value(b"key"), Some(Some(&b"kept".to_vec())));

		map.commit_transaction().unwrap();
		assert_eq!(map.transaction_depth(), 0);
		assert_eq!(
			drained(map),
			vec![
				(b"key".to_vec(), Some(b"kept".to_vec())),
				(b"other".to_vec(), Some(b"kept-too".to_vec())),
			],
		);
	}

	#[test]
	fn rollback_removes_keys_first_written_inside_the_tx() {
		let mut map = OverlayedMap::default();
		map.start_transaction();
		map.set(b"fresh".to_vec(), Some(vec![1]));
		map.rollback_transaction().unwrap();
		assert_eq!(map.value(b"fresh"), None);
	}

	#[test]
	fn closing_without_open_transaction_errors() {
		let mut map = OverlayedMap::default();
		assert_eq!(map.commit_transaction(), Err(NoOpenTransaction));
		assert_eq!(map.rollback_transaction(), Err(NoOpenTransaction));
	}

	#[test]
	fn runtime_cannot_close_client_transactions() {
		let mut map = OverlayedMap::default();
		map.start_transaction();
		map.enter_runtime();
		map.start_transaction();
		map.commit_transaction().unwrap();
		assert_eq!(map.commit_transaction(), Err(NoOpenTransaction));
		assert_eq!(map.rollback_transaction(), Err(NoOpenTransaction));
	}

	#[test]
	fn exit_runtime_rolls_back_dangling_transactions() {
		let mut map = OverlayedMap::default();
		map.enter_runtime();
		map.start_transaction();
		map.set(b"key".to_vec(), Some(vec![1]));
		map.exit_runtime();
		assert_eq!(map.transaction_depth(), 0);
		assert_eq!(map.value(b"key"), None);
	}

	#[test]
	fn clear_where_counts_live_entries() {
		let mut map = OverlayedMap::default();
		map.set(b"del1".to_vec(), Some(vec![1]));
		map.set(b"del2".to_vec(), None);
		map.set(b"keep".to_vec(), Some(vec![2]));
		assert_eq!(map.clear_where(|key| key.starts_with(b"del")), 1);
		assert_eq!(map.value(b"del1"), Some(None));
		assert_eq!(map.value(b"del2"), Some(None));
		assert_eq!(map.value(b"keep"), Some(Some(&vec![2])));
	}

	#[test]
	fn changes_after_is_ordered_and_exclusive() {
		let mut map = OverlayedMap::default();
		map.set(b"a".to_vec(), Some(vec![1]));
		map.set(b"b".to_vec(), None);
		map.set(b"c".to_vec(), Some(vec![3]));
		let after: Vec<&[u8]> = map.changes_after(b"a").map(|(k, _)| k).collect();
		assert_eq!(after, vec![b"b".as_slice(), b"c".as_slice()]);
	}

	#[test]
	fn child_overlays_track_the_top_depth() {
		let mut overlay = OverlayedChanges::new();
		overlay.start_transaction();
		overlay.child_mut(b"assets").set(b"k".to_vec(), Some(vec![1]));
		assert_eq!(overlay.child(b"assets").unwrap().transaction_depth(), 1);
		overlay.rollback_transaction().unwrap();
		assert_eq!(overlay.child(b"assets").unwrap().value(b"k"), None);
	}

	#[test]
	fn drain_with_open_transaction_panics() {
		let result = std::panic::catch_unwind(|| {
			let mut map = OverlayedMap::default();
			map.start_transaction();
			let _ = map.drain_committed();
		});
		assert!(result.is_err());
	}
}
