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

//! Block and header types.

use crate::{digest::Digest, BlockNumber, Hash};
use codec::{Decode, Encode};
use mp_core::hash_of;
use scale_info::TypeInfo;

/// A block header.
///
/// The identity hash of a block is the Blake2b-256 of the header encoding
/// with the seal digest stripped; the same encoding is what the author
/// signs. Stored headers keep the seal.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct Header {
	/// Hash of the parent block.
	pub parent_hash: Hash,
	/// Block number, one more than the parent's.
	#[codec(compact)]
	pub number: BlockNumber,
	/// Root of the state trie after applying this block.
	pub state_root: Hash,
	/// Root of the ordered trie over this block's extrinsics.
	pub extrinsics_root: Hash,
	/// Consensus log entries.
	pub digest: Digest,
}

impl Header {
	/// Create a header with empty roots and digest, for block building.
	pub fn new(parent_hash: Hash, number: BlockNumber) -> Self {
		Self {
			parent_hash,
			number,
			state_root: Hash::zero(),
			extrinsics_root: Hash::zero(),
			digest: Digest::default(),
		}
	}

	/// The header's encoding with any seal digest removed.
	pub fn encode_without_seal(&self) -> Vec<u8> {
		match self.digest.seal() {
			None => self.encode(),
			Some(_) => {
				let mut stripped = self.clone();
				stripped.digest.pop_seal();
				stripped.encode()
			},
		}
	}

	/// The block identity hash: Blake2b-256 of the seal-less encoding.
	pub fn hash(&self) -> Hash {
		hash_of(&self.encode_without_seal())
	}

	/// The BABE pre-runtime payload, if present.
	pub fn babe_pre_digest(&self) -> Option<&[u8]> {
		self.digest.pre_runtime(crate::BABE_ENGINE_ID)
	}

	/// The seal digest, if present.
	pub fn seal(&self) -> Option<(&crate::ConsensusEngineId, &[u8])> {
		self.digest.seal()
	}
}

/// An opaque extrinsic: the node never interprets the bytes, only the
/// runtime does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode, TypeInfo)]
pub struct OpaqueExtrinsic(pub Vec<u8>);

impl OpaqueExtrinsic {
	/// The raw bytes handed to the runtime.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl From<Vec<u8>> for OpaqueExtrinsic {
	fn from(bytes: Vec<u8>) -> Self {
		Self(bytes)
	}
}

/// A block: header plus ordered extrinsics.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct Block {
	/// The header.
	pub header: Header,
	/// The body, in application order.
	pub body: Vec<OpaqueExtrinsic>,
}

impl Block {
	/// The block's identity hash (the header's seal-less hash).
	pub fn hash(&self) -> Hash {
		self.header.hash()
	}
}

/// Strip the seal from an encoded header and hash the result, without fully
/// materialising a `Header`.
pub fn block_hash(encoded_header: &[u8]) -> Result<Hash, codec::Error> {
	let header = Header::decode(&mut &*encoded_header)?;
	Ok(header.hash())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{DigestItem, BABE_ENGINE_ID};
	use pretty_assertions::assert_eq;

	fn sealed_header() -> Header {
		let mut header = Header::new(Hash::repeat_byte(1), 7);
		header.digest.push(DigestItem::PreRuntime(BABE_ENGINE_ID, vec![1, 2, 3]));
		header.digest.push(DigestItem::Seal(BABE_ENGINE_ID, vec![9; 64]));
		header
	}

	#[test]
	fn header_round_trips() {
		let header = sealed_header();
		assert_eq!(Header::decode(&mut &header.encode()[..]).unwrap(), header);
	}

	#[test]
	fn hash_ignores_seal() {
		let sealed = sealed_header();
		let mut unsealed = sealed.clone();
		unsealed.digest.pop_seal();
		assert_eq!(sealed.hash(), unsealed.hash());
		assert_eq!(hash_of(&sealed.encode_without_seal()), block_hash(&sealed.encode()).unwrap());
	}

	#[test]
	fn hash_covers_everything_else() {
		let header = sealed_header();
		let mut other = header.clone();
		other.number += 1;
		assert_ne!(header.hash(), other.hash());
	}

	#[test]
	fn number_is_compact_encoded() {
		let header = Header::new(Hash::zero(), 1);
		// 32 bytes parent hash, then the compact block number in one byte.
		assert_eq!(header.encode()[32], 4);
	}

	#[test]
	fn body_encodes_as_opaque_byte_vectors() {
		let block = Block {
			header: Header::new(Hash::zero(), 1),
			body: vec![OpaqueExtrinsic(vec![1, 2]), OpaqueExtrinsic(vec![3])],
		};
		let decoded = Block::decode(&mut &block.encode()[..]).unwrap();
		assert_eq!(decoded, block);
	}
}
