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

//! Header digest items.
//!
//! Digest items are tagged by a 4-byte consensus engine id and carry opaque
//! payloads interpreted by the engine that owns the tag. The wire indices
//! (`0` other, `4` consensus, `5` seal, `6` pre-runtime) are fixed by the
//! host protocol.

use codec::{Decode, Encode, Error as CodecError, Input, Output};
use scale_info::TypeInfo;

/// Identifier of a consensus engine, tagging digest items on the wire.
pub type ConsensusEngineId = [u8; 4];

/// The engine id of the block production engine.
pub const BABE_ENGINE_ID: ConsensusEngineId = *b"BABE";

/// The engine id of the finality gadget.
pub const GRANDPA_ENGINE_ID: ConsensusEngineId = *b"FRNK";

/// A single log entry of a header digest.
#[derive(Debug, Clone, PartialEq, Eq, TypeInfo)]
pub enum DigestItem {
	/// Put in by the block author before running the runtime; carries the
	/// slot claim.
	PreRuntime(ConsensusEngineId, Vec<u8>),
	/// Emitted by the runtime towards a consensus engine, e.g. authority set
	/// changes.
	Consensus(ConsensusEngineId, Vec<u8>),
	/// The author's signature over the header. At most one per header,
	/// always the last item, stripped before hashing.
	Seal(ConsensusEngineId, Vec<u8>),
	/// Anything else.
	Other(Vec<u8>),
}

// The wire indices are part of the header hash, so they are spelled out
// rather than derived.
const OTHER: u8 = 0;
const CONSENSUS: u8 = 4;
const SEAL: u8 = 5;
const PRE_RUNTIME: u8 = 6;

impl Encode for DigestItem {
	fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
		match self {
			Self::PreRuntime(engine, data) => {
				dest.push_byte(PRE_RUNTIME);
				engine.encode_to(dest);
				data.encode_to(dest);
			},
			Self::Consensus(engine, data) => {
				dest.push_byte(CONSENSUS);
				engine.encode_to(dest);
				data.encode_to(dest);
			},
			Self::Seal(engine, data) => {
				dest.push_byte(SEAL);
				engine.encode_to(dest);
				data.encode_to(dest);
			},
			Self::Other(data) => {
				dest.push_byte(OTHER);
				data.encode_to(dest);
			},
		}
	}
}

impl Decode for DigestItem {
	fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
		match input.read_byte()? {
			PRE_RUNTIME => Ok(Self::PreRuntime(Decode::decode(input)?, Decode::decode(input)?)),
			CONSENSUS => Ok(Self::Consensus(Decode::decode(input)?, Decode::decode(input)?)),
			SEAL => Ok(Self::Seal(Decode::decode(input)?, Decode::decode(input)?)),
			OTHER => Ok(Self::Other(Decode::decode(input)?)),
			_ => Err("unknown digest item variant".into()),
		}
	}
}

impl DigestItem {
	/// The pre-runtime payload, if this item is one tagged with `engine`.
	pub fn as_pre_runtime(&self, engine: ConsensusEngineId) -> Option<&[u8]> {
		match self {
			Self::PreRuntime(id, data) if *id == engine => Some(data),
			_ => None,
		}
	}

	/// The consensus payload, if this item is one tagged with `engine`.
	pub fn as_consensus(&self, engine: ConsensusEngineId) -> Option<&[u8]> {
		match self {
			Self::Consensus(id, data) if *id == engine => Some(data),
			_ => None,
		}
	}

	/// The seal payload, if this item is one tagged with `engine`.
	pub fn as_seal(&self, engine: ConsensusEngineId) -> Option<&[u8]> {
		match self {
			Self::Seal(id, data) if *id == engine => Some(data),
			_ => None,
		}
	}
}

/// An ordered list of digest items attached to a header.
#[derive(Debug, Clone, PartialEq, Eq, Default, Encode, Decode, TypeInfo)]
pub struct Digest {
	/// The log entries, in insertion order. A seal, if any, is last.
	pub logs: Vec<DigestItem>,
}

impl Digest {
	/// Push a new item. Seals must be pushed last; pushing a non-seal after
	/// a seal is a logic error upstream and is rejected here.
	pub fn push(&mut self, item: DigestItem) {
		debug_assert!(
			matches!(item, DigestItem::Seal(..)) ||
				!self.logs.iter().any(|log| matches!(log, DigestItem::Seal(..))),
			"seal digests terminate the log list",
		);
		self.logs.push(item);
	}

	/// Remove and return the trailing seal, if the last item is one.
	pub fn pop_seal(&mut self) -> Option<(ConsensusEngineId, Vec<u8>)> {
		match self.logs.last() {
			Some(DigestItem::Seal(..)) => match self.logs.pop() {
				Some(DigestItem::Seal(engine, data)) => Some((engine, data)),
				_ => unreachable!("last item was just checked to be a seal; qed"),
			},
			_ => None,
		}
	}

	/// The trailing seal without removing it.
	pub fn seal(&self) -> Option<(&ConsensusEngineId, &[u8])> {
		match self.logs.last() {
			Some(DigestItem::Seal(engine, data)) => Some((engine, data)),
			_ => None,
		}
	}

	/// Iterate over pre-runtime payloads tagged with `engine`.
	pub fn pre_runtime(&self, engine: ConsensusEngineId) -> Option<&[u8]> {
		self.logs.iter().find_map(|item| item.as_pre_runtime(engine))
	}

	/// Iterate over consensus payloads tagged with `engine`.
	pub fn consensus(&self, engine: ConsensusEngineId) -> impl Iterator<Item = &[u8]> {
		self.logs.iter().filter_map(move |item| item.as_consensus(engine))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn digest_item_wire_indices() {
		assert_eq!(DigestItem::Other(vec![1]).encode()[0], 0);
		assert_eq!(DigestItem::Consensus(BABE_ENGINE_ID, vec![]).encode()[0], 4);
		assert_eq!(DigestItem::Seal(BABE_ENGINE_ID, vec![]).encode()[0], 5);
		assert_eq!(DigestItem::PreRuntime(BABE_ENGINE_ID, vec![]).encode()[0], 6);
	}

	#[test]
	fn digest_round_trips() {
		let digest = Digest {
			logs: vec![
				DigestItem::PreRuntime(BABE_ENGINE_ID, vec![1, 2, 3]),
				DigestItem::Consensus(GRANDPA_ENGINE_ID, vec![4, 5]),
				DigestItem::Seal(BABE_ENGINE_ID, vec![6; 64]),
			],
		};
		assert_eq!(Digest::decode(&mut &digest.encode()[..]).unwrap(), digest);
	}

	#[test]
	fn pop_seal_only_removes_trailing_seal() {
		let mut digest = Digest::default();
		digest.push(DigestItem::PreRuntime(BABE_ENGINE_ID, vec![1]));
		assert_eq!(digest.pop_seal(), None);
		digest.push(DigestItem::Seal(BABE_ENGINE_ID, vec![9]));
		assert_eq!(digest.pop_seal(), Some((BABE_ENGINE_ID, vec![9])));
		assert_eq!(digest.logs.len(), 1);
	}

	#[test]
	fn unknown_variant_rejected() {
		// One-element digest (compact 1 = 0x04) whose item carries the
		// unassigned variant index 3.
		assert!(Digest::decode(&mut &[4u8, 3u8][..]).is_err());
	}
}
