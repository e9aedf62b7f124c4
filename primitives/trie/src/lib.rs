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

//! A copy-on-write Patricia-Merkle radix-16 trie.
//!
//! Nodes are shared between trie versions through `Arc`; a mutation clones
//! only the nodes on the touched path, so cheap snapshots of past states
//! stay valid. The root hash is a pure function of the key-value set: two
//! tries are equal iff their roots are equal.
//!
//! Child tries are sub-tries whose root hash is embedded in the main trie
//! under `:child_storage:default:<name>`; all child operations keep that
//! embedded hash in sync.

pub mod nibbles;
pub mod node;
pub mod store;

pub use node::{NodeError, EMPTY_NODE};
pub use store::{empty_trie_root, NodeStore};

use mp_core::Hash;
use nibbles::{bytes_to_nibbles, common_prefix_len, nibbles_to_bytes};
use node::{encode_node, index_key, merkle_root, Node};
use std::{collections::BTreeMap, sync::Arc};

/// The log target used by trie and storage code.
pub const LOG_TARGET: &str = "trie";

/// Prefix under which child trie roots live in the main trie.
pub const CHILD_STORAGE_PREFIX: &[u8] = b":child_storage:default:";

/// The full main-trie key holding the root of child trie `name`.
pub fn child_storage_key(name: &[u8]) -> Vec<u8> {
	let mut key = CHILD_STORAGE_PREFIX.to_vec();
	key.extend_from_slice(name);
	key
}

/// An in-memory Patricia-Merkle trie with copy-on-write node sharing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trie {
	root: Option<Arc<Node>>,
	children: BTreeMap<Vec<u8>, Trie>,
}

impl Trie {
	/// An empty trie.
	pub fn new() -> Self {
		Self::default()
	}

	/// Build a trie from byte key-value pairs.
	pub fn from_pairs<I, K, V>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<[u8]>,
		V: Into<Vec<u8>>,
	{
		let mut trie = Self::new();
		for (key, value) in pairs {
			trie.put(key.as_ref(), value.into());
		}
		trie
	}

	/// Whether no key is stored.
	pub fn is_empty(&self) -> bool {
		self.root.is_none()
	}

	/// Get the value stored under `key`.
	pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
		let nibbles = bytes_to_nibbles(key);
		get_in(self.root.as_deref()?, &nibbles)
	}

	/// Insert `value` under `key`, replacing any previous value.
	pub fn put(&mut self, key: &[u8], value: Vec<u8>) {
		let nibbles = bytes_to_nibbles(key);
		self.root = Some(insert_in(self.root.as_ref(), &nibbles, value));
	}

	/// Remove the value under `key`, if any.
	pub fn delete(&mut self, key: &[u8]) {
		let nibbles = bytes_to_nibbles(key);
		self.root = match self.root.take() {
			Some(root) => remove_in(&root, &nibbles),
			None => None,
		};
	}

	/// Remove every key starting with `prefix`.
	pub fn clear_prefix(&mut self, prefix: &[u8]) {
		let nibbles = bytes_to_nibbles(prefix);
		self.root = match self.root.take() {
			Some(root) => clear_prefix_in(&root, &nibbles),
			None => None,
		};
	}

	/// The smallest stored key strictly greater than `key`.
	pub fn next_key(&self, key: &[u8]) -> Option<Vec<u8>> {
		let bound = bytes_to_nibbles(key);
		let found = next_in(self.root.as_deref()?, Vec::new(), Some(&bound))?;
		Some(nibbles_to_bytes(&found))
	}

	/// The merkle root over the current key-value set.
	pub fn root(&self) -> Hash {
		merkle_root(self.root.as_deref())
	}

	/// All key-value pairs in key order.
	pub fn pairs(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
		let mut out = Vec::new();
		if let Some(root) = self.root.as_deref() {
			collect_pairs(root, Vec::new(), &mut out);
		}
		out
	}

	/// Names of the child tries currently attached.
	pub fn child_names(&self) -> impl Iterator<Item = &[u8]> {
		self.children.keys().map(|name| name.as_slice())
	}

	/// Get a value from the child trie `name`.
	pub fn child_get(&self, name: &[u8], key: &[u8]) -> Option<&[u8]> {
		self.children.get(name)?.get(key)
	}

	/// Insert into the child trie `name`, creating it if absent.
	pub fn child_put(&mut self, name: &[u8], key: &[u8], value: Vec<u8>) {
		let child = self.children.entry(name.to_vec()).or_default();
		child.put(key, value);
		let root = child.root();
		self.put(&child_storage_key(name), root.as_bytes().to_vec());
	}

	/// Remove a key from the child trie `name`.
	pub fn child_delete(&mut self, name: &[u8], key: &[u8]) {
		if let Some(child) = self.children.get_mut(name) {
			child.delete(key);
			let root = child.root();
			self.put(&child_storage_key(name), root.as_bytes().to_vec());
		}
	}

	/// Remove every key starting with `prefix` from the child trie `name`.
	pub fn child_clear_prefix(&mut self, name: &[u8], prefix: &[u8]) {
		if let Some(child) = self.children.get_mut(name) {
			child.clear_prefix(prefix);
			let root = child.root();
			self.put(&child_storage_key(name), root.as_bytes().to_vec());
		}
	}

	/// The smallest key in the child trie `name` strictly greater than `key`.
	pub fn child_next_key(&self, name: &[u8], key: &[u8]) -> Option<Vec<u8>> {
		self.children.get(name)?.next_key(key)
	}

	/// The root of the child trie `name`, if it exists.
	pub fn child_root(&self, name: &[u8]) -> Option<Hash> {
		self.children.get(name).map(Trie::root)
	}

	/// Delete the child trie `name` along with its embedded root key.
	pub fn kill_child(&mut self, name: &[u8]) {
		self.children.remove(name);
		self.delete(&child_storage_key(name));
	}

	/// Attach a pre-built child trie (used when loading from the store).
	pub(crate) fn attach_child(&mut self, name: Vec<u8>, child: Trie) {
		self.children.insert(name, child);
	}

	pub(crate) fn root_node(&self) -> Option<&Arc<Node>> {
		self.root.as_ref()
	}

	pub(crate) fn children_map(&self) -> &BTreeMap<Vec<u8>, Trie> {
		&self.children
	}

	pub(crate) fn from_root_node(root: Option<Arc<Node>>) -> Self {
		Self { root, children: BTreeMap::new() }
	}
}

/// The root of the order-indexed trie over `items`: keys are the compact
/// encodings of the item indices. Used for extrinsics roots.
pub fn ordered_root(items: &[Vec<u8>]) -> Hash {
	let mut trie = Trie::new();
	for (index, item) in items.iter().enumerate() {
		trie.put(&index_key(index as u32), item.clone());
	}
	trie.root()
}

fn get_in<'a>(node: &'a Node, key: &[u8]) -> Option<&'a [u8]> {
	match node {
		Node::Leaf { partial, value } =>
			if partial.as_slice() == key {
				Some(value)
			} else {
				None
			},
		Node::Branch { partial, children, value } => {
			if !key.starts_with(partial) {
				return None
			}
			let rest = &key[partial.len()..];
			match rest.split_first() {
				None => value.as_deref(),
				Some((index, rest)) => get_in(children[*index as usize].as_deref()?, rest),
			}
		},
	}
}

fn insert_in(node: Option<&Arc<Node>>, key: &[u8], value: Vec<u8>) -> Arc<Node> {
	let Some(node) = node else {
		return Arc::new(Node::Leaf { partial: key.to_vec(), value })
	};
	match node.as_ref() {
		Node::Leaf { partial, value: old_value } => {
			if partial.as_slice() == key {
				return Arc::new(Node::Leaf { partial: partial.clone(), value })
			}
			let split = common_prefix_len(partial, key);
			let mut children = Node::no_children();
			let mut branch_value = None;

			if partial.len() == split {
				branch_value = Some(old_value.clone());
			} else {
				children[partial[split] as usize] = Some(Arc::new(Node::Leaf {
					partial: partial[split + 1..].to_vec(),
					value: old_value.clone(),
				}));
			}
			if key.len() == split {
				debug_assert!(branch_value.is_none(), "keys differ; qed");
				branch_value = Some(value);
			} else {
				children[key[split] as usize] =
					Some(Arc::new(Node::Leaf { partial: key[split + 1..].to_vec(), value }));
			}
			Arc::new(Node::Branch { partial: key[..split].to_vec(), children, value: branch_value })
		},
		Node::Branch { partial, children, value: branch_value } => {
			let split = common_prefix_len(partial, key);
			if split == partial.len() {
				if key.len() == split {
					return Arc::new(Node::Branch {
						partial: partial.clone(),
						children: children.clone(),
						value: Some(value),
					})
				}
				let index = key[split] as usize;
				let mut children = children.clone();
				children[index] = Some(insert_in(children[index].as_ref(), &key[split + 1..], value));
				Arc::new(Node::Branch {
					partial: partial.clone(),
					children,
					value: branch_value.clone(),
				})
			} else {
				// Split this branch's partial key at the divergence point.
				let lower = Arc::new(Node::Branch {
					partial: partial[split + 1..].to_vec(),
					children: children.clone(),
					value: branch_value.clone(),
				});
				let mut children = Node::no_children();
				children[partial[split] as usize] = Some(lower);
				let mut upper_value = None;
				if key.len() == split {
					upper_value = Some(value);
				} else {
					children[key[split] as usize] =
						Some(Arc::new(Node::Leaf { partial: key[split + 1..].to_vec(), value }));
				}
				Arc::new(Node::Branch {
					partial: partial[..split].to_vec(),
					children,
					value: upper_value,
				})
			}
		},
	}
}

fn remove_in(node: &Arc<Node>, key: &[u8]) -> Option<Arc<Node>> {
	match node.as_ref() {
		Node::Leaf { partial, .. } =>
			if partial.as_slice() == key {
				None
			} else {
				Some(node.clone())
			},
		Node::Branch { partial, children, value } => {
			if !key.starts_with(partial) {
				return Some(node.clone())
			}
			let rest = &key[partial.len()..];
			match rest.split_first() {
				None => collapse(partial.clone(), children.clone(), None),
				Some((index, rest)) => {
					let index = *index as usize;
					let Some(child) = children[index].as_ref() else {
						return Some(node.clone())
					};
					let mut children = children.clone();
					children[index] = remove_in(child, rest);
					collapse(partial.clone(), children, value.clone())
				},
			}
		},
	}
}

fn clear_prefix_in(node: &Arc<Node>, prefix: &[u8]) -> Option<Arc<Node>> {
	match node.as_ref() {
		Node::Leaf { partial, .. } => {
			let split = common_prefix_len(partial, prefix);
			if split == prefix.len() {
				None
			} else {
				Some(node.clone())
			}
		},
		Node::Branch { partial, children, value } => {
			let split = common_prefix_len(partial, prefix);
			if split == prefix.len() {
				// The prefix covers this node's whole key: drop the subtree.
				return None
			}
			if split < partial.len() {
				return Some(node.clone())
			}
			let rest = &prefix[partial.len()..];
			let index = rest[0] as usize;
			let Some(child) = children[index].as_ref() else { return Some(node.clone()) };
			let mut children = children.clone();
			children[index] = clear_prefix_in(child, &rest[1..]);
			collapse(partial.clone(), children, value.clone())
		},
	}
}

/// Rebuild a branch after a child or value was removed, restoring the
/// invariant that branches carry a value or at least two children.
fn collapse(
	partial: Vec<u8>,
	children: [Option<Arc<Node>>; 16],
	value: Option<Vec<u8>>,
) -> Option<Arc<Node>> {
	let occupied: Vec<usize> =
		children.iter().enumerate().filter(|(_, c)| c.is_some()).map(|(i, _)| i).collect();
	match (value, occupied.len()) {
		(None, 0) => None,
		(Some(value), 0) => Some(Arc::new(Node::Leaf { partial, value })),
		(None, 1) => {
			let index = occupied[0];
			let child = children[index].as_ref().expect("index comes from occupied; qed");
			let mut merged = partial;
			merged.push(index as u8);
			Some(Arc::new(match child.as_ref() {
				Node::Leaf { partial: child_partial, value } => {
					merged.extend_from_slice(child_partial);
					Node::Leaf { partial: merged, value: value.clone() }
				},
				Node::Branch { partial: child_partial, children, value } => {
					merged.extend_from_slice(child_partial);
					Node::Branch {
						partial: merged,
						children: children.clone(),
						value: value.clone(),
					}
				},
			}))
		},
		(value, _) => Some(Arc::new(Node::Branch { partial, children, value })),
	}
}

/// The smallest key under `node` strictly greater than `bound` (`None`
/// meaning unbounded), as full nibble paths. `path` is the key prefix above
/// this node.
fn next_in(node: &Node, mut path: Vec<u8>, bound: Option<&[u8]>) -> Option<Vec<u8>> {
	let partial: &[u8] = match node {
		Node::Leaf { partial, .. } | Node::Branch { partial, .. } => partial,
	};
	let bound = match bound {
		None => None,
		Some(bound) => {
			let split = common_prefix_len(partial, bound);
			if split < partial.len() && split < bound.len() {
				if bound[split] < partial[split] {
					// Everything below this node is greater than the bound.
					None
				} else {
					return None
				}
			} else if split == bound.len() && bound.len() < partial.len() {
				// The bound is a strict prefix of this node's key, which
				// makes the node's own key strictly greater.
				None
			} else {
				// The node's partial is a prefix of the bound.
				Some(&bound[partial.len()..])
			}
		},
	};
	path.extend_from_slice(partial);
	match node {
		Node::Leaf { .. } => match bound {
			None => Some(path),
			Some(_) => None,
		},
		Node::Branch { children, value, .. } => {
			match bound {
				None => {
					if value.is_some() {
						return Some(path)
					}
					descend_leftmost(children, path)
				},
				Some([]) => {
					// The bound is exactly this node's key: its value is
					// excluded, children are all greater.
					descend_leftmost(children, path)
				},
				Some(rest) => {
					let start = rest[0] as usize;
					if let Some(child) = children[start].as_deref() {
						let mut child_path = path.clone();
						child_path.push(rest[0]);
						if let Some(found) = next_in(child, child_path, Some(&rest[1..])) {
							return Some(found)
						}
					}
					for index in start + 1..16 {
						if let Some(child) = children[index].as_deref() {
							let mut child_path = path.clone();
							child_path.push(index as u8);
							if let Some(found) = next_in(child, child_path, None) {
								return Some(found)
							}
						}
					}
					None
				},
			}
		},
	}
}

fn descend_leftmost(children: &[Option<Arc<Node>>; 16], path: Vec<u8>) -> Option<Vec<u8>> {
	for (index, child) in children.iter().enumerate() {
		if let Some(child) = child.as_deref() {
			let mut child_path = path.clone();
			child_path.push(index as u8);
			return next_in(child, child_path, None)
		}
	}
	None
}

fn collect_pairs(node: &Node, mut path: Vec<u8>, out: &mut Vec<(Vec<u8>, Vec<u8>)>) {
	match node {
		Node::Leaf { partial, value } => {
			path.extend_from_slice(partial);
			out.push((nibbles_to_bytes(&path), value.clone()));
		},
		Node::Branch { partial, children, value } => {
			path.extend_from_slice(partial);
			if let Some(value) = value {
				out.push((nibbles_to_bytes(&path), value.clone()));
			}
			for (index, child) in children.iter().enumerate() {
				if let Some(child) = child.as_deref() {
					let mut child_path = path.clone();
					child_path.push(index as u8);
					collect_pairs(child, child_path, out);
				}
			}
		},
	}
}

/// Encode every node of `trie` (main trie only), returning the root node's
/// encoding. Used by the store.
pub(crate) fn encode_root(trie: &Trie) -> Vec<u8> {
	match trie.root_node() {
		Some(root) => encode_node(root),
		None => EMPTY_NODE.to_vec(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn spec_pairs() -> Vec<(&'static [u8], Vec<u8>)> {
		vec![(b"a".as_slice(), vec![1]), (b"ab".as_slice(), vec![2]), (b"abc".as_slice(), vec![3])]
	}

	#[test]
	fn get_put_delete() {
		let mut trie = Trie::new();
		trie.put(b"key", b"value".to_vec());
		assert_eq!(trie.get(b"key"), Some(b"value".as_slice()));
		assert_eq!(trie.get(b"other"), None);
		trie.delete(b"key");
		assert_eq!(trie.get(b"key"), None);
		assert!(trie.is_empty());
	}

	#[test]
	fn root_is_insertion_order_independent() {
		let pairs = spec_pairs();
		let mut roots = Vec::new();
		// All six permutations of the three keys.
		for order in
			[[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]]
		{
			let mut trie = Trie::new();
			for i in order {
				trie.put(pairs[i].0, pairs[i].1.clone());
			}
			roots.push(trie.root());
		}
		assert!(roots.windows(2).all(|pair| pair[0] == pair[1]));
	}

	#[test]
	fn delete_then_reinsert_restores_root() {
		let mut trie = Trie::from_pairs(spec_pairs());
		let original = trie.root();
		trie.delete(b"ab");
		assert_ne!(trie.root(), original);
		assert_eq!(trie.get(b"ab"), None);
		assert_eq!(trie.get(b"abc"), Some(&[3u8][..]));
		trie.put(b"ab", vec![2]);
		assert_eq!(trie.root(), original);
	}

	#[test]
	fn empty_tries_share_a_root() {
		assert_eq!(Trie::new().root(), {
			let mut trie = Trie::new();
			trie.put(b"x", vec![1]);
			trie.delete(b"x");
			trie.root()
		});
	}

	#[test]
	fn overwrite_changes_and_restores_root() {
		let mut trie = Trie::from_pairs(spec_pairs());
		let original = trie.root();
		trie.put(b"a", vec![9]);
		assert_ne!(trie.root(), original);
		trie.put(b"a", vec![1]);
		assert_eq!(trie.root(), original);
	}

	#[test]
	fn clear_prefix_removes_only_matches() {
		let mut trie = Trie::from_pairs(vec![
			(b"aaa".as_slice(), vec![1]),
			(b"aab".as_slice(), vec![2]),
			(b"ab".as_slice(), vec![3]),
			(b"zz".as_slice(), vec![4]),
		]);
		trie.clear_prefix(b"aa");
		assert_eq!(trie.get(b"aaa"), None);
		assert_eq!(trie.get(b"aab"), None);
		assert_eq!(trie.get(b"ab"), Some(&[3u8][..]));
		assert_eq!(trie.get(b"zz"), Some(&[4u8][..]));
		assert_eq!(trie.root(), Trie::from_pairs(vec![
			(b"ab".as_slice(), vec![3]),
			(b"zz".as_slice(), vec![4]),
		]).root());
	}

	#[test]
	fn next_key_walks_in_order() {
		let trie = Trie::from_pairs(spec_pairs());
		assert_eq!(trie.next_key(b""), Some(b"a".to_vec()));
		assert_eq!(trie.next_key(b"a"), Some(b"ab".to_vec()));
		assert_eq!(trie.next_key(b"ab"), Some(b"abc".to_vec()));
		assert_eq!(trie.next_key(b"abc"), None);
		assert_eq!(trie.next_key(b"aa"), Some(b"ab".to_vec()));
	}

	#[test]
	fn pairs_are_sorted() {
		let trie = Trie::from_pairs(vec![
			(b"b".as_slice(), vec![2]),
			(b"a".as_slice(), vec![1]),
			(b"c".as_slice(), vec![3]),
		]);
		let keys: Vec<Vec<u8>> = trie.pairs().into_iter().map(|(k, _)| k).collect();
		assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
	}

	#[test]
	fn child_trie_operations() {
		let mut trie = Trie::new();
		trie.child_put(b"assets", b"key", vec![7]);
		assert_eq!(trie.child_get(b"assets", b"key"), Some(&[7u8][..]));

		// The child root is embedded under the reserved prefix.
		let embedded = trie.get(&child_storage_key(b"assets")).unwrap();
		assert_eq!(embedded, trie.child_root(b"assets").unwrap().as_bytes());

		trie.child_delete(b"assets", b"key");
		assert_eq!(trie.child_get(b"assets", b"key"), None);

		trie.kill_child(b"assets");
		assert_eq!(trie.get(&child_storage_key(b"assets")), None);
		assert_eq!(trie.child_root(b"assets"), None);
	}

	#[test]
	fn child_mutation_changes_main_root() {
		let mut trie = Trie::new();
		trie.child_put(b"assets", b"key", vec![1]);
		let before = trie.root();
		trie.child_put(b"assets", b"key", vec![2]);
		assert_ne!(trie.root(), before);
	}

	#[test]
	fn ordered_root_depends_on_order() {
		let items = vec![vec![1u8], vec![2u8]];
		let swapped = vec![vec![2u8], vec![1u8]];
		assert_ne!(ordered_root(&items), ordered_root(&swapped));
		assert_eq!(ordered_root(&items), ordered_root(&items.clone()));
	}

	#[test]
	fn large_values_round_trip() {
		// Values above the inline threshold force hashed child references.
		let mut trie = Trie::new();
		trie.put(b"big", vec![0xab; 100]);
		trie.put(b"bigger", vec![0xcd; 1000]);
		assert_eq!(trie.get(b"big"), Some(&[0xab; 100][..]));
		assert_eq!(trie.get(b"bigger"), Some(&[0xcd; 1000][..]));
	}
}
