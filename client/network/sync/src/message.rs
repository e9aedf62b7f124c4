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

//! Wire messages of the sync and block-announce protocols.

use bitflags::bitflags;
use codec::{Decode, Encode, Error as CodecError, Input, Output};
use mp_runtime::{BlockNumber, EncodedJustification, Hash, Header, OpaqueExtrinsic};

bitflags! {
	/// Which parts of a block a request asks for.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct BlockAttributes: u8 {
		/// The header.
		const HEADER = 0b0000_0001;
		/// The body.
		const BODY = 0b0000_0010;
		/// The receipt.
		const RECEIPT = 0b0000_0100;
		/// The message queue.
		const MESSAGE_QUEUE = 0b0000_1000;
		/// The justification, if the block is finalised.
		const JUSTIFICATION = 0b0001_0000;
	}
}

impl Encode for BlockAttributes {
	fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
		dest.push_byte(self.bits());
	}
}

impl Decode for BlockAttributes {
	fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
		Self::from_bits(input.read_byte()?).ok_or_else(|| "invalid block attribute bits".into())
	}
}

/// Where a block range starts.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum FromBlock {
	/// Start at this hash.
	#[codec(index = 0)]
	Hash(Hash),
	/// Start at this number.
	#[codec(index = 1)]
	Number(BlockNumber),
}

/// Walk direction of a range request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Direction {
	/// Child to parent.
	#[codec(index = 0)]
	Ascending,
	/// Parent to child.
	#[codec(index = 1)]
	Descending,
}

/// A block-range request on `/<chain>/sync/2`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct BlockRequest {
	/// The parts wanted per block.
	pub fields: BlockAttributes,
	/// Range start.
	pub from: FromBlock,
	/// Optional end hash.
	pub to: Option<Hash>,
	/// Walk direction.
	pub direction: Direction,
	/// Cap on the number of blocks returned.
	pub max: Option<u32>,
}

/// One block of a response, fields present as requested and available.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct BlockData {
	/// The block's hash.
	pub hash: Hash,
	/// The header.
	pub header: Option<Header>,
	/// The body.
	pub body: Option<Vec<OpaqueExtrinsic>>,
	/// The receipt.
	pub receipt: Option<Vec<u8>>,
	/// The message queue.
	pub message_queue: Option<Vec<u8>>,
	/// The justification.
	pub justification: Option<EncodedJustification>,
}

/// The response to a [`BlockRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct BlockResponse {
	/// The blocks, in the requested direction.
	pub blocks: Vec<BlockData>,
}

/// The handshake of the block-announce protocol.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct BlockAnnounceHandshake {
	/// The sender's role bitfield.
	pub roles: u8,
	/// The sender's best number.
	pub best_number: BlockNumber,
	/// The sender's best hash.
	pub best_hash: Hash,
	/// The sender's genesis hash.
	pub genesis_hash: Hash,
}

/// A block announcement.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct BlockAnnounce {
	/// The announced header.
	pub header: Header,
	/// Whether the sender considers it its new best.
	pub is_best: bool,
}

/// The payload of the transactions gossip protocol: a batch of opaque
/// extrinsics.
pub type TransactionsMessage = Vec<OpaqueExtrinsic>;

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn attributes_encode_as_one_byte() {
		let fields = BlockAttributes::HEADER | BlockAttributes::BODY;
		assert_eq!(fields.encode(), vec![0b0000_0011]);
		assert_eq!(BlockAttributes::decode(&mut &[0b0001_0001u8][..]).unwrap(),
			BlockAttributes::HEADER | BlockAttributes::JUSTIFICATION);
		assert!(BlockAttributes::decode(&mut &[0b1000_0000u8][..]).is_err());
	}

	#[test]
	fn request_round_trips() {
		let request = BlockRequest {
			fields: BlockAttributes::HEADER | BlockAttributes::BODY,
			from: FromBlock::Number(100),
			to: None,
			direction: Direction::Ascending,
			max: Some(64),
		};
		assert_eq!(BlockRequest::decode(&mut &request.encode()[..]).unwrap(), request);
	}

	#[test]
	fn response_round_trips() {
		let header = Header::new(Hash::repeat_byte(1), 5);
		let response = BlockResponse {
			blocks: vec![BlockData {
				hash: header.hash(),
				header: Some(header),
				body: Some(vec![OpaqueExtrinsic(vec![1, 2])]),
				receipt: None,
				message_queue: None,
				justification: Some(vec![9, 9]),
			}],
		};
		assert_eq!(BlockResponse::decode(&mut &response.encode()[..]).unwrap(), response);
	}
}
