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

//! The hash-keyed trie node store backing the state database.
//!
//! Nodes are keyed by the Blake2b-256 of their encoding, so identical
//! sub-tries across different roots share storage. Roots referenced by live
//! blocks or open overlays are pinned; `sweep` drops every node unreachable
//! from a pinned root after finalisation pruning.

use crate::{
	node::{decode_node, encode_node, merkle_root, Node, NodeError},
	Trie, CHILD_STORAGE_PREFIX, LOG_TARGET,
};
use mp_core::{blake2_256, Hash, H256};
use std::{
	cell::RefCell,
	collections::{HashMap, HashSet},
	sync::Arc,
};

/// In-memory trie node store.
#[derive(Debug, Default)]
pub struct NodeStore {
	nodes: HashMap<Hash, Vec<u8>>,
	pinned: HashMap<Hash, u32>,
}

impl NodeStore {
	/// An empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Store every node of `trie` (child tries included) and return the main
	/// root hash. The root is pinned by the caller if it must survive a
	/// sweep.
	pub fn insert(&mut self, trie: &Trie) -> Hash {
		for child in trie.children_map().values() {
			self.store_trie(child);
		}
		self.store_trie(trie)
	}

	/// Whether `root` is present.
	pub fn contains(&self, root: &Hash) -> bool {
		self.nodes.contains_key(root)
	}

	/// The raw encoding stored under `hash`, if any.
	pub fn get(&self, hash: &Hash) -> Option<&[u8]> {
		self.nodes.get(hash).map(Vec::as_slice)
	}

	/// Reconstruct the trie rooted at `root`, re-attaching child tries via
	/// their embedded root hashes.
	pub fn load(&self, root: &Hash) -> Result<Trie, NodeError> {
		let mut trie = self.load_plain(root)?;
		let children: Vec<(Vec<u8>, Hash)> = trie
			.pairs()
			.into_iter()
			.filter(|(key, _)| key.starts_with(CHILD_STORAGE_PREFIX))
			.map(|(key, value)| {
				if value.len() != 32 {
					return Err(NodeError::BadChildReference)
				}
				Ok((key[CHILD_STORAGE_PREFIX.len()..].to_vec(), H256::from_slice(&value)))
			})
			.collect::<Result<_, _>>()?;
		for (name, child_root) in children {
			let child = self.load_plain(&child_root)?;
			trie.attach_child(name, child);
		}
		Ok(trie)
	}

	/// Pin `root` so its nodes survive sweeps.
	pub fn pin(&mut self, root: Hash) {
		*self.pinned.entry(root).or_insert(0) += 1;
	}

	/// Drop one pin of `root`.
	pub fn unpin(&mut self, root: &Hash) {
		if let Some(count) = self.pinned.get_mut(root) {
			*count -= 1;
			if *count == 0 {
				self.pinned.remove(root);
			}
		}
	}

	/// Remove every node unreachable from the pinned roots.
	pub fn sweep(&mut self) {
		let mut retained = HashSet::new();
		for root in self.pinned.keys() {
			match self.reachable(root) {
				Ok(set) => retained.extend(set),
				Err(error) => {
					// A pinned root with missing nodes is state corruption;
					// keep what we can reach and surface the error loudly.
					log::error!(target: LOG_TARGET, "pinned root {root} unreadable during sweep: {error}");
				},
			}
		}
		let before = self.nodes.len();
		self.nodes.retain(|hash, _| retained.contains(hash));
		log::debug!(
			target: LOG_TARGET,
			"state sweep retained {} of {before} nodes for {} pinned roots",
			self.nodes.len(),
			self.pinned.len(),
		);
	}

	/// Number of stored node encodings.
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	/// Whether the store holds no nodes.
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	fn store_trie(&mut self, trie: &Trie) -> Hash {
		if let Some(root) = trie.root_node() {
			self.store_subtree(root);
		}
		let encoded = crate::encode_root(trie);
		let root = H256(blake2_256(&encoded));
		self.nodes.insert(root, encoded);
		root
	}

	fn store_subtree(&mut self, node: &Node) {
		if let Node::Branch { children, .. } = node {
			for child in children.iter().flatten() {
				self.store_subtree(child);
				let encoded = encode_node(child);
				if encoded.len() >= 32 {
					self.nodes.insert(H256(blake2_256(&encoded)), encoded);
				}
			}
		}
	}

	fn load_plain(&self, root: &Hash) -> Result<Trie, NodeError> {
		let encoded = self.nodes.get(root).ok_or(NodeError::MissingNode(*root))?;
		let resolve = |hash: &Hash| self.nodes.get(hash).cloned();
		let node = decode_node(encoded, &resolve)?;
		let trie = Trie::from_root_node(node.map(Arc::new));
		debug_assert_eq!(&trie.root(), root, "decode of a stored root reproduces it; qed");
		Ok(trie)
	}

	/// Every node hash reachable from `root`, child tries included.
	fn reachable(&self, root: &Hash) -> Result<HashSet<Hash>, NodeError> {
		let mut set = HashSet::new();
		set.insert(*root);
		let trie = {
			let touched = RefCell::new(HashSet::new());
			let resolve = |hash: &Hash| {
				touched.borrow_mut().insert(*hash);
				self.nodes.get(hash).cloned()
			};
			let encoded = self.nodes.get(root).ok_or(NodeError::MissingNode(*root))?;
			let node = decode_node(encoded, &resolve)?;
			set.extend(touched.into_inner());
			Trie::from_root_node(node.map(Arc::new))
		};
		for (key, value) in trie.pairs() {
			if key.starts_with(CHILD_STORAGE_PREFIX) && value.len() == 32 {
				let child_root = H256::from_slice(&value);
				if self.nodes.contains_key(&child_root) {
					set.extend(self.reachable(&child_root)?);
				}
			}
		}
		Ok(set)
	}
}

/// Convenience: the root hash of the empty trie.
pub fn empty_trie_root() -> Hash {
	merkle_root(None)
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn sample_trie() -> Trie {
		Trie::from_pairs(vec![
			(b"a".as_slice(), vec![1]),
			(b"ab".as_slice(), vec![2]),
			(b"abc".as_slice(), vec![3]),
			(b"big".as_slice(), vec![7; 64]),
		])
	}

	#[test]
	fn insert_then_load_round_trips() {
		let mut store = NodeStore::new();
		let trie = sample_trie();
		let root = store.insert(&trie);
		assert_eq!(root, trie.root());

		let loaded = store.load(&root).unwrap();
		assert_eq!(loaded.pairs(), trie.pairs());
		assert_eq!(loaded.root(), root);

		// Loading is repeatable and byte-stable.
		let again = store.load(&root).unwrap();
		assert_eq!(again.root(), root);
		assert_eq!(store.get(&root).map(<[u8]>::to_vec), store.get(&root).map(<[u8]>::to_vec));
	}

	#[test]
	fn child_tries_survive_the_store() {
		let mut store = NodeStore::new();
		let mut trie = sample_trie();
		trie.child_put(b"assets", b"coin", vec![9]);
		let root = store.insert(&trie);

		let loaded = store.load(&root).unwrap();
		assert_eq!(loaded.child_get(b"assets", b"coin"), Some(&[9u8][..]));
		assert_eq!(loaded.root(), root);
	}

	#[test]
	fn sweep_keeps_pinned_roots_only() {
		let mut store = NodeStore::new();
		let old = sample_trie();
		let old_root = store.insert(&old);

		let mut new = old.clone();
		new.put(b"fresh", vec![1, 2, 3]);
		let new_root = store.insert(&new);

		store.pin(new_root);
		store.sweep();

		assert!(store.load(&new_root).is_ok());
		assert!(store.load(&old_root).is_err());
	}

	#[test]
	fn shared_subtries_survive_sweeping_either_root() {
		let mut store = NodeStore::new();
		let base = sample_trie();
		let base_root = store.insert(&base);
		let mut fork = base.clone();
		fork.put(b"fork", vec![4]);
		let fork_root = store.insert(&fork);

		store.pin(base_root);
		store.pin(fork_root);
		store.sweep();
		assert!(store.load(&base_root).is_ok());
		assert!(store.load(&fork_root).is_ok());

		store.unpin(&base_root);
		store.sweep();
		assert!(store.load(&base_root).is_err());
		assert_eq!(store.load(&fork_root).unwrap().get(b"big"), Some(&[7u8; 64][..]));
	}

	#[test]
	fn empty_trie_round_trips() {
		let mut store = NodeStore::new();
		let root = store.insert(&Trie::new());
		assert_eq!(root, empty_trie_root());
		assert!(store.load(&root).unwrap().is_empty());
	}
}
