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

//! The execution state a runtime call runs against: a state trie snapshot
//! plus a transactional write overlay.
//!
//! All host storage functions operate on [`TrieState`]. Reads consult the
//! overlay first and fall through to the trie; writes only ever touch the
//! overlay. `storage_root` folds the overlay's current view into a copy of
//! the trie, so it is callable inside open transactions.

pub mod overlay;

pub use overlay::{NoOpenTransaction, OverlayedChanges, OverlayedMap, StorageKey, StorageValue};

use mp_core::Hash;
use mp_trie::Trie;

/// The log target of state and overlay code.
pub const LOG_TARGET: &str = "state";

/// State access errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
	/// A read-with-offset pointed past the end of the value.
	#[error("offset {0} out of bounds for a value of {1} bytes")]
	OutOfBounds(u32, usize),
	/// The backing trie store failed.
	#[error(transparent)]
	Trie(#[from] mp_trie::NodeError),
}

/// A state trie snapshot with a pending write overlay.
#[derive(Debug, Clone, Default)]
pub struct TrieState {
	trie: Trie,
	overlay: OverlayedChanges,
}

impl TrieState {
	/// Wrap the given trie snapshot with an empty overlay.
	pub fn new(trie: Trie) -> Self {
		Self { trie, overlay: OverlayedChanges::new() }
	}

	/// The untouched backing trie snapshot.
	pub fn backend(&self) -> &Trie {
		&self.trie
	}

	/// Read a value, overlay first.
	pub fn storage(&self, key: &[u8]) -> Option<Vec<u8>> {
		match self.overlay.top().value(key) {
			Some(change) => change.cloned(),
			None => self.trie.get(key).map(<[u8]>::to_vec),
		}
	}

	/// Read a value from `offset` onwards.
	pub fn storage_read(&self, key: &[u8], offset: u32) -> Result<Option<Vec<u8>>, StateError> {
		let Some(value) = self.storage(key) else { return Ok(None) };
		if offset as usize > value.len() {
			return Err(StateError::OutOfBounds(offset, value.len()))
		}
		Ok(Some(value[offset as usize..].to_vec()))
	}

	/// Whether a value exists under `key`.
	pub fn exists_storage(&self, key: &[u8]) -> bool {
		match self.overlay.top().value(key) {
			Some(change) => change.is_some(),
			None => self.trie.get(key).is_some(),
		}
	}

	/// Write `value` under `key`.
	pub fn set_storage(&mut self, key: StorageKey, value: StorageValue) {
		self.overlay.top_mut().set(key, Some(value));
	}

	/// Delete `key`.
	pub fn clear_storage(&mut self, key: &[u8]) {
		self.overlay.top_mut().set(key.to_vec(), None);
	}

	/// Delete every key starting with `prefix`.
	pub fn clear_prefix(&mut self, prefix: &[u8]) {
		// Backend keys need explicit deletion markers; overlay-only keys are
		// handled by `clear_where`.
		let mut bound = prefix.to_vec();
		if self.trie.get(prefix).is_some() {
			self.overlay.top_mut().set(prefix.to_vec(), None);
		}
		while let Some(key) = self.trie.next_key(&bound) {
			if !key.starts_with(prefix) {
				break
			}
			self.overlay.top_mut().set(key.clone(), None);
			bound = key;
		}
		self.overlay.top_mut().clear_where(|key| key.starts_with(prefix));
	}

	/// The smallest key strictly greater than `key`, merging overlay and
	/// backend.
	pub fn next_storage_key(&self, key: &[u8]) -> Option<Vec<u8>> {
		let trie = &self.trie;
		merged_next_key(key, |bound| trie.next_key(bound), self.overlay.top())
	}

	/// Read from child trie `name`, overlay first.
	pub fn child_storage(&self, name: &[u8], key: &[u8]) -> Option<Vec<u8>> {
		match self.overlay.child(name).and_then(|map| map.value(key)) {
			Some(change) => change.cloned(),
			None => self.trie.child_get(name, key).map(<[u8]>::to_vec),
		}
	}

	/// Read from child trie `name` starting at `offset`.
	pub fn child_storage_read(
		&self,
		name: &[u8],
		key: &[u8],
		offset: u32,
	) -> Result<Option<Vec<u8>>, StateError> {
		let Some(value) = self.child_storage(name, key) else { return Ok(None) };
		if offset as usize > value.len() {
			return Err(StateError::OutOfBounds(offset, value.len()))
		}
		Ok(Some(value[offset as usize..].to_vec()))
	}

	/// Whether child trie `name` holds `key`.
	pub fn exists_child_storage(&self, name: &[u8], key: &[u8]) -> bool {
		match self.overlay.child(name).and_then(|map| map.value(key)) {
			Some(change) => change.is_some(),
			None => self.trie.child_get(name, key).is_some(),
		}
	}

	/// Write into child trie `name`.
	pub fn set_child_storage(&mut self, name: &[u8], key: StorageKey, value: StorageValue) {
		self.overlay.child_mut(name).set(key, Some(value));
	}

	/// Delete from child trie `name`.
	pub fn clear_child_storage(&mut self, name: &[u8], key: &[u8]) {
		self.overlay.child_mut(name).set(key.to_vec(), None);
	}

	/// Delete every key starting with `prefix` from child trie `name`.
	pub fn clear_child_prefix(&mut self, name: &[u8], prefix: &[u8]) {
		if self.trie.child_get(name, prefix).is_some() {
			self.overlay.child_mut(name).set(prefix.to_vec(), None);
		}
		let mut bound = prefix.to_vec();
		while let Some(key) = self.trie.child_next_key(name, &bound) {
			if !key.starts_with(prefix) {
				break
			}
			self.overlay.child_mut(name).set(key.clone(), None);
			bound = key;
		}
		self.overlay.child_mut(name).clear_where(|key| key.starts_with(prefix));
	}

	/// Remove child trie `name` entirely.
	pub fn kill_child_storage(&mut self, name: &[u8]) {
		self.clear_child_prefix(name, &[]);
	}

	/// The smallest key in child trie `name` strictly greater than `key`.
	pub fn next_child_storage_key(&self, name: &[u8], key: &[u8]) -> Option<Vec<u8>> {
		let trie = &self.trie;
		match self.overlay.child(name) {
			Some(map) => merged_next_key(key, |bound| trie.child_next_key(name, bound), map),
			None => trie.child_next_key(name, key),
		}
	}

	/// The root of child trie `name` with the overlay folded in, if the
	/// child exists.
	pub fn child_storage_root(&self, name: &[u8]) -> Option<Hash> {
		self.materialize().child_root(name)
	}

	/// The state root with the overlay's current view folded in. Callable
	/// inside open transactions.
	pub fn storage_root(&self) -> Hash {
		self.materialize().root()
	}

	/// Open a nested storage transaction.
	pub fn start_transaction(&mut self) {
		self.overlay.start_transaction();
	}

	/// Commit the innermost storage transaction.
	pub fn commit_transaction(&mut self) -> Result<(), NoOpenTransaction> {
		self.overlay.commit_transaction()
	}

	/// Roll back the innermost storage transaction.
	pub fn rollback_transaction(&mut self) -> Result<(), NoOpenTransaction> {
		self.overlay.rollback_transaction()
	}

	/// Mark the hand-over of control to the runtime.
	pub fn enter_runtime(&mut self) {
		self.overlay.enter_runtime();
	}

	/// Mark the runtime's return, rolling back transactions it left open.
	pub fn exit_runtime(&mut self) {
		self.overlay.exit_runtime();
	}

	/// Consume the state, folding all committed changes into a new trie.
	///
	/// Panics if a transaction is still open.
	pub fn into_trie(self) -> Trie {
		let mut trie = self.trie;
		let (top, children) = self.overlay.into_committed();
		apply_changes(&mut trie, top.into_iter(), children.into_iter());
		trie
	}

	fn materialize(&self) -> Trie {
		let mut trie = self.trie.clone();
		let top = self
			.overlay
			.top()
			.changes()
			.map(|(key, value)| (key.clone(), value.cloned()));
		let children = self.overlay.children().map(|(name, map)| {
			let changes: Vec<_> =
				map.changes().map(|(key, value)| (key.clone(), value.cloned())).collect();
			(name.to_vec(), changes)
		});
		apply_changes(&mut trie, top, children);
		trie
	}
}

fn apply_changes(
	trie: &mut Trie,
	top: impl Iterator<Item = (StorageKey, Option<StorageValue>)>,
	children: impl Iterator<Item = (Vec<u8>, Vec<(StorageKey, Option<StorageValue>)>)>,
) {
	for (key, value) in top {
		match value {
			Some(value) => trie.put(&key, value),
			None => trie.delete(&key),
		}
	}
	for (name, changes) in children {
		for (key, value) in changes {
			match value {
				Some(value) => trie.child_put(&name, &key, value),
				None => trie.child_delete(&name, &key),
			}
		}
		// A child trie emptied out is indistinguishable from a removed one:
		// drop it so the root stays a pure function of the key-value set.
		if trie.child_root(&name).map(|root| root == Trie::new().root()).unwrap_or(false) {
			trie.kill_child(&name);
		}
	}
}

/// Merge the backend's key order with the overlay's pending changes to find
/// the next live key after `key`.
fn merged_next_key(
	key: &[u8],
	backend_next: impl Fn(&[u8]) -> Option<Vec<u8>>,
	overlay: &OverlayedMap,
) -> Option<Vec<u8>> {
	let mut bound = key.to_vec();
	loop {
		let backend = backend_next(&bound);
		let pending = overlay.changes_after(&bound).next();
		match (backend, pending) {
			(None, None) => return None,
			(Some(backend_key), None) => return Some(backend_key),
			(None, Some((overlay_key, value))) =>
				if value.is_some() {
					return Some(overlay_key.to_vec())
				} else {
					bound = overlay_key.to_vec();
				},
			(Some(backend_key), Some((overlay_key, value))) => {
				if overlay_key > backend_key.as_slice() {
					return Some(backend_key)
				}
				if value.is_some() {
					return Some(overlay_key.to_vec())
				}
				// Deleted: skip past it on both sides.
				bound = overlay_key.to_vec();
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn base_state() -> TrieState {
		TrieState::new(Trie::from_pairs(vec![
			(b"key1".as_slice(), b"backend1".to_vec()),
			(b"key3".as_slice(), b"backend3".to_vec()),
		]))
	}

	#[test]
	fn reads_prefer_the_overlay() {
		let mut state = base_state();
		assert_eq!(state.storage(b"key1"), Some(b"backend1".to_vec()));
		state.set_storage(b"key1".to_vec(), b"overlaid".to_vec());
		assert_eq!(state.storage(b"key1"), Some(b"overlaid".to_vec()));
		state.clear_storage(b"key1");
		assert_eq!(state.storage(b"key1"), None);
		assert!(!state.exists_storage(b"key1"));
	}

	#[test]
	fn read_with_offset_bounds() {
		let mut state = base_state();
		state.set_storage(b"key".to_vec(), b"abcdef".to_vec());
		assert_eq!(state.storage_read(b"key", 2).unwrap(), Some(b"cdef".to_vec()));
		assert_eq!(state.storage_read(b"key", 6).unwrap(), Some(Vec::new()));
		assert_eq!(state.storage_read(b"key", 7), Err(StateError::OutOfBounds(7, 6)));
		assert_eq!(state.storage_read(b"missing", 3).unwrap(), None);
	}

	#[test]
	fn next_key_merges_backend_and_overlay() {
		let mut state = base_state();
		state.set_storage(b"key2".to_vec(), vec![1]);
		assert_eq!(state.next_storage_key(b"key1"), Some(b"key2".to_vec()));
		assert_eq!(state.next_storage_key(b"key2"), Some(b"key3".to_vec()));

		// Deleting a backend key removes it from the order.
		state.clear_storage(b"key3");
		assert_eq!(state.next_storage_key(b"key2"), None);
	}

	#[test]
	fn clear_prefix_spans_backend_and_overlay() {
		let mut state = TrieState::new(Trie::from_pairs(vec![
			(b"abc1".as_slice(), vec![1]),
			(b"abc2".as_slice(), vec![2]),
			(b"xyz".as_slice(), vec![3]),
		]));
		state.set_storage(b"abc3".to_vec(), vec![4]);
		state.clear_prefix(b"abc");
		assert_eq!(state.storage(b"abc1"), None);
		assert_eq!(state.storage(b"abc2"), None);
		assert_eq!(state.storage(b"abc3"), None);
		assert_eq!(state.storage(b"xyz"), Some(vec![3]));
	}

	#[test]
	fn storage_root_matches_materialised_trie() {
		let mut state = base_state();
		state.set_storage(b"key2".to_vec(), b"two".to_vec());
		state.clear_storage(b"key3");

		let expected = Trie::from_pairs(vec![
			(b"key1".as_slice(), b"backend1".to_vec()),
			(b"key2".as_slice(), b"two".to_vec()),
		]);
		assert_eq!(state.storage_root(), expected.root());

		// The root computed inside a transaction sees the pending writes.
		state.start_transaction();
		state.set_storage(b"key1".to_vec(), b"temp".to_vec());
		let inside = state.storage_root();
		state.rollback_transaction().unwrap();
		assert_ne!(inside, state.storage_root());
		assert_eq!(state.storage_root(), expected.root());
	}

	#[test]
	fn transactions_nest_and_roll_back() {
		let mut state = base_state();
		state.start_transaction();
		state.set_storage(b"a".to_vec(), vec![1]);
		state.start_transaction();
		state.clear_storage(b"a");
		assert_eq!(state.storage(b"a"), None);
		state.rollback_transaction().unwrap();
		assert_eq!(state.storage(b"a"), Some(vec![1]));
		state.commit_transaction().unwrap();
		assert_eq!(state.storage(b"a"), Some(vec![1]));
	}

	#[test]
	fn child_storage_round_trip() {
		let mut state = base_state();
		state.set_child_storage(b"assets", b"coin".to_vec(), vec![9]);
		assert_eq!(state.child_storage(b"assets", b"coin"), Some(vec![9]));
		assert!(state.exists_child_storage(b"assets", b"coin"));

		let trie = state.clone().into_trie();
		assert_eq!(trie.child_get(b"assets", b"coin"), Some(&[9u8][..]));

		state.clear_child_storage(b"assets", b"coin");
		assert_eq!(state.child_storage(b"assets", b"coin"), None);
	}

	#[test]
	fn killing_a_child_removes_its_embedded_root() {
		let mut trie = Trie::new();
		trie.child_put(b"assets", b"coin", vec![1]);
		let mut state = TrieState::new(trie);

		state.kill_child_storage(b"assets");
		let folded = state.into_trie();
		assert_eq!(folded.get(&mp_trie::child_storage_key(b"assets")), None);
		assert_eq!(folded.root(), Trie::new().root());
	}

	#[test]
	fn into_trie_applies_only_committed_changes() {
		let mut state = base_state();
		state.set_storage(b"new".to_vec(), vec![5]);
		state.enter_runtime();
		state.start_transaction();
		state.set_storage(b"dangling".to_vec(), vec![6]);
		state.exit_runtime();

		let trie = state.into_trie();
		assert_eq!(trie.get(b"new"), Some(&[5u8][..]));
		assert_eq!(trie.get(b"dangling"), None);
	}
}
