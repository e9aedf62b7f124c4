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

//! Trie node model and its canonical encoding.
//!
//! A node encodes as a header byte (two type bits plus a six-bit partial key
//! length with continuation bytes), the packed partial key nibbles, and for
//! branches a 16-bit child bitmap followed by the present child references
//! in index order. A child reference is the child's encoding when shorter
//! than 32 bytes, otherwise its Blake2b-256 hash; either way it is written
//! as a length-prefixed byte vector. Values are length-prefixed byte
//! vectors.

use crate::nibbles::{pack_partial, unpack_partial};
use codec::{Compact, Decode, Encode};
use mp_core::{blake2_256, Hash, H256};
use std::sync::Arc;

/// The encoding of the empty node (and thus of the empty trie's root).
pub const EMPTY_NODE: &[u8] = &[0];

/// Header type bits.
const LEAF: u8 = 0b01 << 6;
const BRANCH: u8 = 0b10 << 6;
const BRANCH_WITH_VALUE: u8 = 0b11 << 6;

/// A node of the radix-16 trie. Shared between trie versions through `Arc`,
/// so every mutation clones the nodes along the touched path only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
	/// Terminal node holding a value.
	Leaf {
		/// Remaining key nibbles below the parent.
		partial: Vec<u8>,
		/// The stored value.
		value: Vec<u8>,
	},
	/// Interior node with up to 16 children and an optional value.
	Branch {
		/// Remaining key nibbles below the parent.
		partial: Vec<u8>,
		/// Children indexed by the next nibble.
		children: [Option<Arc<Node>>; 16],
		/// Value stored exactly at this node's key, if any.
		value: Option<Vec<u8>>,
	},
}

impl Node {
	/// An empty child array.
	pub fn no_children() -> [Option<Arc<Node>>; 16] {
		std::array::from_fn(|_| None)
	}
}

/// Errors produced while decoding nodes out of the store.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NodeError {
	/// The input ended early or a length did not fit.
	#[error("truncated node encoding")]
	Truncated,
	/// The header type bits were `00` in a non-root position or unknown.
	#[error("invalid node header")]
	BadHeader,
	/// A child reference was longer than a hash.
	#[error("oversized child reference")]
	BadChildReference,
	/// A hashed child was not present in the backing store.
	#[error("missing trie node {0}")]
	MissingNode(Hash),
	/// A SCALE length or value failed to decode.
	#[error("codec: {0}")]
	Codec(#[from] codec::Error),
}

fn encode_header(out: &mut Vec<u8>, kind: u8, partial_len: usize) {
	if partial_len < 63 {
		out.push(kind | partial_len as u8);
		return
	}
	out.push(kind | 63);
	let mut rest = partial_len - 63;
	while rest >= 255 {
		out.push(255);
		rest -= 255;
	}
	out.push(rest as u8);
}

fn decode_header(input: &mut &[u8]) -> Result<(u8, usize), NodeError> {
	let header = *input.first().ok_or(NodeError::Truncated)?;
	*input = &input[1..];
	let kind = header & 0b1100_0000;
	let mut len = (header & 0b0011_1111) as usize;
	if len == 63 {
		loop {
			let byte = *input.first().ok_or(NodeError::Truncated)?;
			*input = &input[1..];
			len += byte as usize;
			if byte < 255 {
				break
			}
		}
	}
	Ok((kind, len))
}

fn take<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], NodeError> {
	if input.len() < n {
		return Err(NodeError::Truncated)
	}
	let (head, rest) = input.split_at(n);
	*input = rest;
	Ok(head)
}

/// Encode a node. Child references are computed recursively.
pub fn encode_node(node: &Node) -> Vec<u8> {
	let mut out = Vec::new();
	match node {
		Node::Leaf { partial, value } => {
			encode_header(&mut out, LEAF, partial.len());
			out.extend_from_slice(&pack_partial(partial));
			value.encode_to(&mut out);
		},
		Node::Branch { partial, children, value } => {
			let kind = if value.is_some() { BRANCH_WITH_VALUE } else { BRANCH };
			encode_header(&mut out, kind, partial.len());
			out.extend_from_slice(&pack_partial(partial));
			let mut bitmap = 0u16;
			for (index, child) in children.iter().enumerate() {
				if child.is_some() {
					bitmap |= 1 << index;
				}
			}
			out.extend_from_slice(&bitmap.to_le_bytes());
			if let Some(value) = value {
				value.encode_to(&mut out);
			}
			for child in children.iter().flatten() {
				child_reference(child).encode_to(&mut out);
			}
		},
	}
	out
}

/// The reference under which a child is embedded in its parent: the child's
/// encoding if shorter than a hash, otherwise its Blake2b-256 hash.
pub fn child_reference(child: &Node) -> Vec<u8> {
	let encoded = encode_node(child);
	if encoded.len() < 32 {
		encoded
	} else {
		blake2_256(&encoded).to_vec()
	}
}

/// The merkle root of a (sub-)trie rooted at `node`: the Blake2b-256 of the
/// node's encoding. The empty trie hashes [`EMPTY_NODE`].
pub fn merkle_root(node: Option<&Node>) -> Hash {
	let encoded = match node {
		Some(node) => encode_node(node),
		None => EMPTY_NODE.to_vec(),
	};
	H256(blake2_256(&encoded))
}

/// Decode a node, resolving hashed child references through `resolve`.
pub fn decode_node(
	encoded: &[u8],
	resolve: &impl Fn(&Hash) -> Option<Vec<u8>>,
) -> Result<Option<Node>, NodeError> {
	let mut input = encoded;
	let (kind, partial_len) = decode_header(&mut input)?;
	if kind == 0 {
		return Ok(None)
	}
	let packed_len = partial_len / 2 + partial_len % 2;
	let partial = unpack_partial(take(&mut input, packed_len)?, partial_len);
	match kind {
		LEAF => {
			let value = Vec::<u8>::decode(&mut input)?;
			Ok(Some(Node::Leaf { partial, value }))
		},
		BRANCH | BRANCH_WITH_VALUE => {
			let bitmap = u16::from_le_bytes(
				take(&mut input, 2)?.try_into().expect("slice is two bytes long; qed"),
			);
			let value = if kind == BRANCH_WITH_VALUE {
				Some(Vec::<u8>::decode(&mut input)?)
			} else {
				None
			};
			let mut children = Node::no_children();
			for (index, slot) in children.iter_mut().enumerate() {
				if bitmap & (1 << index) == 0 {
					continue
				}
				let reference = Vec::<u8>::decode(&mut input)?;
				let child = match reference.len() {
					32 => {
						let hash = H256::from_slice(&reference);
						let encoded = resolve(&hash).ok_or(NodeError::MissingNode(hash))?;
						decode_node(&encoded, resolve)?.ok_or(NodeError::BadHeader)?
					},
					n if n < 32 => decode_node(&reference, resolve)?.ok_or(NodeError::BadHeader)?,
					_ => return Err(NodeError::BadChildReference),
				};
				*slot = Some(Arc::new(child));
			}
			Ok(Some(Node::Branch { partial, children, value }))
		},
		_ => Err(NodeError::BadHeader),
	}
}

/// Compact-length helper used for the ordered (extrinsics) trie keys.
pub fn index_key(index: u32) -> Vec<u8> {
	Compact(index).encode()
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn no_resolver(_: &Hash) -> Option<Vec<u8>> {
		None
	}

	#[test]
	fn leaf_round_trips() {
		let leaf = Node::Leaf { partial: vec![1, 2, 3], value: b"value".to_vec() };
		let encoded = encode_node(&leaf);
		assert_eq!(encoded[0], LEAF | 3);
		assert_eq!(decode_node(&encoded, &no_resolver).unwrap(), Some(leaf));
	}

	#[test]
	fn branch_round_trips_with_inline_children() {
		let mut children = Node::no_children();
		children[2] = Some(Arc::new(Node::Leaf { partial: vec![], value: vec![1] }));
		children[11] = Some(Arc::new(Node::Leaf { partial: vec![4], value: vec![2] }));
		let branch = Node::Branch { partial: vec![0xa], children, value: Some(vec![7, 8]) };
		let encoded = encode_node(&branch);
		assert_eq!(decode_node(&encoded, &no_resolver).unwrap(), Some(branch));
	}

	#[test]
	fn long_partial_uses_continuation_bytes() {
		let leaf = Node::Leaf { partial: vec![5; 70], value: vec![1] };
		let encoded = encode_node(&leaf);
		assert_eq!(encoded[0], LEAF | 63);
		assert_eq!(encoded[1], 7);
		assert_eq!(decode_node(&encoded, &no_resolver).unwrap(), Some(leaf));
	}

	#[test]
	fn large_child_is_referenced_by_hash() {
		let big = Node::Leaf { partial: vec![1, 2], value: vec![9; 64] };
		let reference = child_reference(&big);
		assert_eq!(reference.len(), 32);
		assert_eq!(reference, blake2_256(&encode_node(&big)).to_vec());

		let small = Node::Leaf { partial: vec![1], value: vec![1] };
		assert!(child_reference(&small).len() < 32);
	}

	#[test]
	fn hashed_children_need_the_store() {
		let mut children = Node::no_children();
		children[0] = Some(Arc::new(Node::Leaf { partial: vec![], value: vec![9; 64] }));
		let branch = Node::Branch { partial: vec![], children, value: None };
		let encoded = encode_node(&branch);
		assert!(matches!(
			decode_node(&encoded, &no_resolver),
			Err(NodeError::MissingNode(_)),
		));
	}

	#[test]
	fn empty_node_decodes_to_none() {
		assert_eq!(decode_node(EMPTY_NODE, &no_resolver).unwrap(), None);
	}
}
