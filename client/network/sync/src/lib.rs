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

//! Chain synchronisation: drives block-range requests against connected
//! peers and feeds complete, ordered runs of blocks into the import
//! pipeline.
//!
//! The transport is a collaborator; this crate owns the message types and
//! the request/response driving logic, surfaced as plain methods the
//! network service calls with decoded messages.

pub mod blocks;
pub mod message;

pub use blocks::{BlockCollection, IncomingBlock};
pub use message::{
	BlockAnnounce, BlockAnnounceHandshake, BlockAttributes, BlockData, BlockRequest,
	BlockResponse, Direction, FromBlock, TransactionsMessage,
};

use mc_blockchain::{BlockImportError, BlockImporter, BlockOrigin};
use mp_runtime::{Block, BlockNumber, Hash};
use std::{collections::HashMap, sync::Arc};

/// Log target of the syncer.
pub const LOG_TARGET: &str = "sync";

/// Handle the network layer assigns to a connected peer.
pub type PeerId = u64;

/// Blocks requested per range.
const MAX_BLOCKS_PER_REQUEST: u32 = 64;

/// How many peers may download the same range concurrently.
const MAX_PARALLEL_DOWNLOADS: u32 = 5;

/// How far past the import point ranges may run.
const MAX_DOWNLOAD_AHEAD: u32 = 2048;

/// Reputation penalty for protocol violations.
const PENALTY_BAD_BLOCK: i32 = -100;

/// Reputation penalty for a useless (empty or misordered) response.
const PENALTY_USELESS_RESPONSE: i32 = -20;

/// What the driver wants the network layer to do next.
#[derive(Debug, PartialEq, Eq)]
pub enum SyncAction {
	/// Send a request to a peer.
	Request(PeerId, BlockRequest),
	/// Adjust a peer's reputation.
	ReportPeer(PeerId, i32),
	/// Drop the peer (e.g. different genesis).
	Disconnect(PeerId),
	/// Nothing to do right now.
	Idle,
}

#[derive(Debug, Clone)]
struct PeerInfo {
	best_hash: Hash,
	best_number: BlockNumber,
}

/// The sync driver.
pub struct ChainSync {
	importer: Arc<BlockImporter>,
	peers: HashMap<PeerId, PeerInfo>,
	collection: BlockCollection,
	genesis_hash: Hash,
}

impl ChainSync {
	/// A driver feeding `importer`.
	pub fn new(importer: Arc<BlockImporter>) -> Self {
		let genesis_hash = importer.state().genesis_hash();
		Self { importer, peers: HashMap::new(), collection: BlockCollection::new(), genesis_hash }
	}

	/// Number of peers we are syncing with.
	pub fn peer_count(&self) -> usize {
		self.peers.len()
	}

	/// The best block number any peer advertises.
	pub fn target_number(&self) -> BlockNumber {
		self.peers
			.values()
			.map(|info| info.best_number)
			.max()
			.unwrap_or_else(|| self.importer.state().best_number())
	}

	/// A peer completed the block-announce handshake.
	pub fn on_peer_connected(
		&mut self,
		peer: PeerId,
		handshake: BlockAnnounceHandshake,
	) -> SyncAction {
		if handshake.genesis_hash != self.genesis_hash {
			log::debug!(target: LOG_TARGET, "peer {peer} is on another chain, disconnecting");
			return SyncAction::Disconnect(peer)
		}
		self.peers.insert(
			peer,
			PeerInfo { best_hash: handshake.best_hash, best_number: handshake.best_number },
		);
		log::debug!(
			target: LOG_TARGET,
			"peer {peer} connected at #{} ({})",
			handshake.best_number,
			handshake.best_hash,
		);
		self.next_request(peer)
	}

	/// A peer went away; its in-flight range is released.
	pub fn on_peer_disconnected(&mut self, peer: PeerId) {
		self.peers.remove(&peer);
		self.collection.clear_peer_download(&peer);
	}

	/// A peer announced a new block.
	pub fn on_block_announce(&mut self, peer: PeerId, announce: BlockAnnounce) -> SyncAction {
		let hash = announce.header.hash();
		if let Some(info) = self.peers.get_mut(&peer) {
			if announce.is_best {
				info.best_hash = hash;
				info.best_number = announce.header.number;
			}
		}
		if self.importer.state().contains(&hash) {
			return SyncAction::Idle
		}
		// If the parent is known the single block is fetchable directly;
		// otherwise fall back to range download.
		if self.importer.state().contains(&announce.header.parent_hash) {
			return SyncAction::Request(
				peer,
				BlockRequest {
					fields: BlockAttributes::HEADER |
						BlockAttributes::BODY | BlockAttributes::JUSTIFICATION,
					from: FromBlock::Hash(hash),
					to: None,
					direction: Direction::Descending,
					max: Some(1),
				},
			)
		}
		self.next_request(peer)
	}

	/// The next range request for `peer`, if it has anything we want.
	pub fn next_request(&mut self, peer: PeerId) -> SyncAction {
		let Some(info) = self.peers.get(&peer) else { return SyncAction::Idle };
		let common = self.importer.state().best_number();
		let Some(range) = self.collection.needed_blocks(
			peer,
			MAX_BLOCKS_PER_REQUEST,
			info.best_number,
			common,
			MAX_PARALLEL_DOWNLOADS,
			MAX_DOWNLOAD_AHEAD,
		) else {
			return SyncAction::Idle
		};
		SyncAction::Request(
			peer,
			BlockRequest {
				fields: BlockAttributes::HEADER |
					BlockAttributes::BODY | BlockAttributes::JUSTIFICATION,
				from: FromBlock::Number(range.start),
				to: None,
				direction: Direction::Ascending,
				max: Some((range.end - range.start) as u32),
			},
		)
	}

	/// Handle a response to `request`; imports whatever became contiguous
	/// and returns the follow-up action.
	pub fn on_block_response(
		&mut self,
		peer: PeerId,
		request: &BlockRequest,
		response: BlockResponse,
	) -> SyncAction {
		self.collection.clear_peer_download(&peer);
		let blocks = match request.direction {
			Direction::Ascending => response.blocks,
			Direction::Descending => {
				let mut blocks = response.blocks;
				blocks.reverse();
				blocks
			},
		};
		let Some(first) = blocks.first() else {
			return SyncAction::ReportPeer(peer, PENALTY_USELESS_RESPONSE)
		};
		let Some(start) = first.header.as_ref().map(|header| header.number) else {
			return SyncAction::ReportPeer(peer, PENALTY_USELESS_RESPONSE)
		};

		// Responses must be a contiguous ascending run of headers.
		let contiguous = blocks
			.iter()
			.enumerate()
			.all(|(offset, data)| {
				data.header
					.as_ref()
					.map(|header| header.number == start + offset as BlockNumber)
					.unwrap_or(false)
			});
		if !contiguous {
			log::debug!(target: LOG_TARGET, "misordered block response from peer {peer}");
			return SyncAction::ReportPeer(peer, PENALTY_BAD_BLOCK)
		}

		self.collection.insert(start, blocks, peer);
		let our_best = self.importer.state().best_number();
		let ready = self.collection.ready_blocks(our_best + 1);
		let mut imported_up_to = None;
		for incoming in ready {
			let Some(header) = incoming.block.header.clone() else { continue };
			let number = header.number;
			let block = Block { header, body: incoming.block.body.clone().unwrap_or_default() };
			match self.importer.import_block(block, BlockOrigin::NetworkSync) {
				Ok(()) => imported_up_to = Some(number),
				Err(BlockImportError::AlreadyImported(_)) => imported_up_to = Some(number),
				Err(BlockImportError::UnknownParent { .. }) => break,
				Err(error) => {
					log::debug!(
						target: LOG_TARGET,
						"bad block from peer {}: {error}",
						incoming.origin,
					);
					return SyncAction::ReportPeer(incoming.origin, PENALTY_BAD_BLOCK)
				},
			}
		}
		if let Some(number) = imported_up_to {
			self.collection.clear_queued_up_to(number);
		}
		self.next_request(peer)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mc_blockchain::{AcceptAll, BlockState, MemoryDb};
	use mp_runtime::Header;
	use pretty_assertions::assert_eq;

	fn chain(len: u8) -> Vec<Header> {
		let mut headers = vec![Header::new(Hash::zero(), 0)];
		for tag in 1..=len {
			let parent = headers.last().expect("seeded; qed");
			let mut header = Header::new(parent.hash(), parent.number + 1);
			header.extrinsics_root = Hash::repeat_byte(tag);
			headers.push(header);
		}
		headers
	}

	fn sync_over(genesis: Header) -> ChainSync {
		let state = Arc::new(BlockState::new(Arc::new(MemoryDb::new()), genesis));
		ChainSync::new(Arc::new(BlockImporter::new(state, Arc::new(AcceptAll), None)))
	}

	fn handshake(headers: &[Header]) -> BlockAnnounceHandshake {
		let best = headers.last().expect("nonempty; qed");
		BlockAnnounceHandshake {
			roles: 1,
			best_number: best.number,
			best_hash: best.hash(),
			genesis_hash: headers[0].hash(),
		}
	}

	fn response_for(headers: &[Header], range: std::ops::Range<usize>) -> BlockResponse {
		BlockResponse {
			blocks: headers[range]
				.iter()
				.map(|header| BlockData {
					hash: header.hash(),
					header: Some(header.clone()),
					body: Some(Vec::new()),
					receipt: None,
					message_queue: None,
					justification: None,
				})
				.collect(),
		}
	}

	#[test]
	fn wrong_genesis_disconnects() {
		let headers = chain(3);
		let mut sync = sync_over(Header::new(Hash::repeat_byte(0xaa), 0));
		assert_eq!(
			sync.on_peer_connected(1, handshake(&headers)),
			SyncAction::Disconnect(1),
		);
	}

	#[test]
	fn connect_request_import_cycle() {
		let headers = chain(5);
		let mut sync = sync_over(headers[0].clone());

		let action = sync.on_peer_connected(1, handshake(&headers));
		let SyncAction::Request(peer, request) = action else {
			panic!("expected a range request, got {action:?}")
		};
		assert_eq!(peer, 1);
		assert_eq!(request.from, FromBlock::Number(1));

		let action = sync.on_block_response(1, &request, response_for(&headers, 1..6));
		// Everything imported; nothing left to request from this peer.
		assert_eq!(action, SyncAction::Idle);
		assert_eq!(sync.importer.state().best_number(), 5);
	}

	#[test]
	fn misordered_responses_are_penalised() {
		let headers = chain(5);
		let mut sync = sync_over(headers[0].clone());
		let SyncAction::Request(_, request) = sync.on_peer_connected(1, handshake(&headers))
		else {
			panic!("expected a request")
		};
		let mut response = response_for(&headers, 1..4);
		response.blocks.swap(0, 2);
		assert_eq!(
			sync.on_block_response(1, &request, response),
			SyncAction::ReportPeer(1, PENALTY_BAD_BLOCK),
		);
	}

	#[test]
	fn empty_responses_are_penalised() {
		let headers = chain(3);
		let mut sync = sync_over(headers[0].clone());
		let SyncAction::Request(_, request) = sync.on_peer_connected(1, handshake(&headers))
		else {
			panic!("expected a request")
		};
		assert_eq!(
			sync.on_block_response(1, &request, BlockResponse { blocks: Vec::new() }),
			SyncAction::ReportPeer(1, PENALTY_USELESS_RESPONSE),
		);
	}

	#[test]
	fn announcements_of_known_parents_fetch_one_block() {
		let headers = chain(2);
		let mut sync = sync_over(headers[0].clone());
		sync.on_peer_connected(1, handshake(&headers[..1].to_vec()));

		let announce = BlockAnnounce { header: headers[1].clone(), is_best: true };
		let action = sync.on_block_announce(1, announce);
		let SyncAction::Request(_, request) = action else {
			panic!("expected a single-block request, got {action:?}")
		};
		assert_eq!(request.max, Some(1));
		assert_eq!(request.direction, Direction::Descending);
	}
}
