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

//! Inherent data passed to `BlockBuilder_inherent_extrinsics`.
//!
//! Inherents are the extrinsics the block author inserts on its own
//! authority: the wall-clock timestamp, the claimed slot and the latest
//! finalised number.

use codec::{Decode, Encode};
use std::collections::BTreeMap;

/// An 8-byte ASCII tag identifying a kind of inherent.
pub type InherentIdentifier = [u8; 8];

/// Current unix timestamp, in milliseconds.
pub const TIMESTAMP: InherentIdentifier = *b"timstap0";

/// The slot this block claims.
pub const BABE_SLOT: InherentIdentifier = *b"babeslot";

/// The latest finalised block number known to the author.
pub const FINALIZED_NUMBER: InherentIdentifier = *b"finalnum";

/// The inherent data map, SCALE-encoded as a length-prefixed sequence of
/// `(identifier, encoded value)` pairs in identifier order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Encode, Decode)]
pub struct InherentData {
	data: BTreeMap<InherentIdentifier, Vec<u8>>,
}

impl InherentData {
	/// Empty inherent data.
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert `value` under `identifier`, replacing any previous entry.
	pub fn put<V: Encode>(&mut self, identifier: InherentIdentifier, value: &V) {
		self.data.insert(identifier, value.encode());
	}

	/// Decode the entry stored under `identifier`, if any.
	pub fn get<V: Decode>(&self, identifier: &InherentIdentifier) -> Option<V> {
		self.data
			.get(identifier)
			.and_then(|encoded| V::decode(&mut &encoded[..]).ok())
	}

	/// Number of entries.
	pub fn len(&self) -> usize {
		self.data.len()
	}

	/// Whether there are no entries.
	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn put_get_round_trip() {
		let mut data = InherentData::new();
		data.put(TIMESTAMP, &1_600_000_000_000u64);
		data.put(BABE_SLOT, &42u64);
		data.put(FINALIZED_NUMBER, &7u64);

		assert_eq!(data.get::<u64>(&TIMESTAMP), Some(1_600_000_000_000));
		assert_eq!(data.get::<u64>(&BABE_SLOT), Some(42));
		assert_eq!(data.get::<u64>(&FINALIZED_NUMBER), Some(7));
	}

	#[test]
	fn encoding_round_trips() {
		let mut data = InherentData::new();
		data.put(BABE_SLOT, &9u64);
		assert_eq!(InherentData::decode(&mut &data.encode()[..]).unwrap(), data);
	}

	#[test]
	fn missing_entry_is_none() {
		assert_eq!(InherentData::new().get::<u64>(&TIMESTAMP), None);
	}
}
