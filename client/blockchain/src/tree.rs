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

//! The in-memory tree of unfinalised blocks.
//!
//! Nodes live in an index arena; blocks refer to each other by `u32` slot,
//! never by owning pointers. The single root is the latest finalised block.
//! The best head is the leaf with the greatest `(number, earliest arrival,
//! hash)` key among the root's descendants, so ties between equal-height
//! forks go to the one seen first.

use mp_runtime::{BlockNumber, Hash};
use std::{
	collections::{HashMap, HashSet},
	time::Instant,
};

#[derive(Debug, Clone)]
struct TreeNode {
	hash: Hash,
	number: BlockNumber,
	parent: Option<u32>,
	children: Vec<u32>,
	arrival: Instant,
}

/// The rooted tree of headers-at-or-above the finalised block.
#[derive(Debug)]
pub struct BlockTree {
	nodes: Vec<TreeNode>,
	lookup: HashMap<Hash, u32>,
	root: u32,
	leaves: HashSet<u32>,
}

impl BlockTree {
	/// A tree rooted at the given (finalised or genesis) block.
	pub fn new(root_hash: Hash, root_number: BlockNumber) -> Self {
		let node = TreeNode {
			hash: root_hash,
			number: root_number,
			parent: None,
			children: Vec::new(),
			arrival: Instant::now(),
		};
		Self {
			nodes: vec![node],
			lookup: HashMap::from([(root_hash, 0)]),
			root: 0,
			leaves: HashSet::from([0]),
		}
	}

	/// The current root (last finalised block).
	pub fn root_hash(&self) -> Hash {
		self.nodes[self.root as usize].hash
	}

	/// The root's block number.
	pub fn root_number(&self) -> BlockNumber {
		self.nodes[self.root as usize].number
	}

	/// Whether `hash` is in the tree.
	pub fn contains(&self, hash: &Hash) -> bool {
		self.lookup.contains_key(hash)
	}

	/// The number of the given block, if present.
	pub fn number(&self, hash: &Hash) -> Option<BlockNumber> {
		self.lookup.get(hash).map(|&index| self.nodes[index as usize].number)
	}

	/// Number of blocks in the tree.
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	/// Whether only the root is present.
	pub fn is_empty(&self) -> bool {
		self.nodes.len() == 1
	}

	/// Attach `hash` under `parent`, recording its arrival time now.
	///
	/// The caller has already validated parent presence and numbering.
	pub fn insert(&mut self, hash: Hash, number: BlockNumber, parent: &Hash) -> bool {
		if self.lookup.contains_key(&hash) {
			return false
		}
		let Some(&parent_index) = self.lookup.get(parent) else { return false };
		let index = self.nodes.len() as u32;
		self.nodes.push(TreeNode {
			hash,
			number,
			parent: Some(parent_index),
			children: Vec::new(),
			arrival: Instant::now(),
		});
		self.nodes[parent_index as usize].children.push(index);
		self.lookup.insert(hash, index);
		self.leaves.remove(&parent_index);
		self.leaves.insert(index);
		true
	}

	/// The best head per the fork-choice rule.
	pub fn best_head(&self) -> Hash {
		let best = self
			.leaves
			.iter()
			.map(|&leaf| &self.nodes[leaf as usize])
			.max_by(|a, b| {
				a.number
					.cmp(&b.number)
					// Earlier arrival wins, so later arrival compares lower.
					.then_with(|| b.arrival.cmp(&a.arrival))
					.then_with(|| b.hash.cmp(&a.hash))
			})
			.expect("a tree always has at least its root as a leaf; qed");
		best.hash
	}

	/// Whether `descendant` is `ancestor` or below it in the tree.
	pub fn is_descendant(&self, ancestor: &Hash, descendant: &Hash) -> bool {
		let Some(&ancestor_index) = self.lookup.get(ancestor) else { return false };
		let Some(&descendant_index) = self.lookup.get(descendant) else { return false };
		let mut current = Some(descendant_index);
		while let Some(index) = current {
			if index == ancestor_index {
				return true
			}
			current = self.nodes[index as usize].parent;
		}
		false
	}

	/// The chain of hashes from `ancestor` to `descendant`, inclusive.
	/// `None` when they are not on one path.
	pub fn subchain(&self, ancestor: &Hash, descendant: &Hash) -> Option<Vec<Hash>> {
		let &ancestor_index = self.lookup.get(ancestor)?;
		let mut chain = Vec::new();
		let mut current = Some(*self.lookup.get(descendant)?);
		while let Some(index) = current {
			chain.push(self.nodes[index as usize].hash);
			if index == ancestor_index {
				chain.reverse();
				return Some(chain)
			}
			current = self.nodes[index as usize].parent;
		}
		None
	}

	/// The hashes of all blocks in the tree, root first, parents before
	/// children.
	pub fn blocks(&self) -> Vec<Hash> {
		let mut out = Vec::with_capacity(self.nodes.len());
		let mut stack = vec![self.root];
		while let Some(index) = stack.pop() {
			let node = &self.nodes[index as usize];
			out.push(node.hash);
			stack.extend(node.children.iter().copied());
		}
		out
	}

	/// All current leaves.
	pub fn leaves(&self) -> Vec<Hash> {
		self.leaves.iter().map(|&leaf| self.nodes[leaf as usize].hash).collect()
	}

	/// Re-root the tree at `hash`, dropping every branch not on the path to
	/// it nor descended from it. Returns the pruned block hashes.
	///
	/// The caller has verified `hash` descends from the current root.
	pub fn finalize(&mut self, hash: &Hash) -> Vec<Hash> {
		let &new_root = self.lookup.get(hash).expect("caller checked membership; qed");

		// Survivors: the new root and everything below it.
		let mut survives = HashSet::new();
		let mut stack = vec![new_root];
		while let Some(index) = stack.pop() {
			survives.insert(index);
			stack.extend(self.nodes[index as usize].children.iter().copied());
		}

		let mut pruned = Vec::new();
		let mut nodes = Vec::with_capacity(survives.len());
		let mut remap = HashMap::with_capacity(survives.len());
		for (index, node) in self.nodes.iter().enumerate() {
			if survives.contains(&(index as u32)) {
				remap.insert(index as u32, nodes.len() as u32);
				nodes.push(node.clone());
			} else {
				pruned.push(node.hash);
			}
		}
		for node in &mut nodes {
			node.parent = node.parent.and_then(|parent| remap.get(&parent).copied());
			node.children = node
				.children
				.iter()
				.filter_map(|child| remap.get(child).copied())
				.collect();
		}

		self.root = remap[&new_root];
		nodes[self.root as usize].parent = None;
		self.lookup = nodes
			.iter()
			.enumerate()
			.map(|(index, node)| (node.hash, index as u32))
			.collect();
		self.leaves = nodes
			.iter()
			.enumerate()
			.filter(|(_, node)| node.children.is_empty())
			.map(|(index, _)| index as u32)
			.collect();
		self.nodes = nodes;
		pruned
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn hash(byte: u8) -> Hash {
		Hash::repeat_byte(byte)
	}

	fn genesis_tree() -> BlockTree {
		BlockTree::new(hash(0), 0)
	}

	#[test]
	fn longer_chain_wins() {
		let mut tree = genesis_tree();
		// G <- A <- B, then a competing G <- A' <- B' <- C'.
		tree.insert(hash(1), 1, &hash(0));
		tree.insert(hash(2), 2, &hash(1));
		assert_eq!(tree.best_head(), hash(2));

		tree.insert(hash(11), 1, &hash(0));
		tree.insert(hash(12), 2, &hash(11));
		assert_eq!(tree.best_head(), hash(2), "equal height keeps the earlier arrival");

		tree.insert(hash(13), 3, &hash(12));
		assert_eq!(tree.best_head(), hash(13), "the longer fork takes over");
	}

	#[test]
	fn finalizing_prunes_the_losing_fork() {
		let mut tree = genesis_tree();
		tree.insert(hash(1), 1, &hash(0));
		tree.insert(hash(2), 2, &hash(1));
		tree.insert(hash(11), 1, &hash(0));
		tree.insert(hash(12), 2, &hash(11));
		tree.insert(hash(13), 3, &hash(12));

		let pruned = tree.finalize(&hash(1));
		assert_eq!(tree.root_hash(), hash(1));
		assert!(pruned.contains(&hash(0)));
		assert!(pruned.contains(&hash(11)));
		assert!(pruned.contains(&hash(12)));
		assert!(pruned.contains(&hash(13)));
		assert!(!tree.contains(&hash(11)));
		assert!(tree.contains(&hash(2)));
		assert_eq!(tree.best_head(), hash(2));
	}

	#[test]
	fn descendant_and_subchain() {
		let mut tree = genesis_tree();
		tree.insert(hash(1), 1, &hash(0));
		tree.insert(hash(2), 2, &hash(1));
		tree.insert(hash(11), 1, &hash(0));

		assert!(tree.is_descendant(&hash(0), &hash(2)));
		assert!(tree.is_descendant(&hash(1), &hash(1)));
		assert!(!tree.is_descendant(&hash(1), &hash(11)));
		assert_eq!(
			tree.subchain(&hash(0), &hash(2)),
			Some(vec![hash(0), hash(1), hash(2)]),
		);
		assert_eq!(tree.subchain(&hash(1), &hash(11)), None);
	}

	#[test]
	fn insert_requires_known_parent() {
		let mut tree = genesis_tree();
		assert!(!tree.insert(hash(5), 5, &hash(9)));
		assert!(tree.insert(hash(1), 1, &hash(0)));
		assert!(!tree.insert(hash(1), 1, &hash(0)), "duplicate insert is rejected");
	}

	#[test]
	fn leaves_track_the_frontier() {
		let mut tree = genesis_tree();
		assert_eq!(tree.leaves(), vec![hash(0)]);
		tree.insert(hash(1), 1, &hash(0));
		tree.insert(hash(11), 1, &hash(0));
		let mut leaves = tree.leaves();
		leaves.sort();
		assert_eq!(leaves, vec![hash(1), hash(11)]);
	}
}
