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

//! Bookkeeping of block ranges being downloaded from peers.
//!
//! Ranges move through downloading, complete and queued-for-import states.
//! Range selection fills gaps first, allows a bounded number of peers on
//! the same range, and refuses to run too far ahead of the import point.

use crate::{message::BlockData, PeerId, LOG_TARGET};
use mp_runtime::BlockNumber;
use std::{
	cmp,
	collections::{BTreeMap, HashMap},
	ops::Range,
};

/// A downloaded block with the peer it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingBlock {
	/// The wire payload.
	pub block: BlockData,
	/// The peer that served it.
	pub origin: PeerId,
}

#[derive(Debug)]
enum RangeState {
	Downloading { len: BlockNumber, downloading: u32 },
	Complete(Vec<IncomingBlock>),
	Queued { len: BlockNumber },
}

impl RangeState {
	fn len(&self) -> BlockNumber {
		match self {
			Self::Downloading { len, .. } => *len,
			Self::Complete(blocks) => blocks.len() as BlockNumber,
			Self::Queued { len } => *len,
		}
	}
}

/// The set of block ranges in flight.
#[derive(Debug, Default)]
pub struct BlockCollection {
	ranges: BTreeMap<BlockNumber, RangeState>,
	peer_requests: HashMap<PeerId, BlockNumber>,
}

impl BlockCollection {
	/// An empty collection.
	pub fn new() -> Self {
		Self::default()
	}

	/// Forget everything (e.g. the sync target changed drastically).
	pub fn clear(&mut self) {
		self.ranges.clear();
		self.peer_requests.clear();
	}

	/// Record a downloaded range starting at `start`.
	pub fn insert(&mut self, start: BlockNumber, blocks: Vec<BlockData>, peer: PeerId) {
		if blocks.is_empty() {
			return
		}
		match self.ranges.get(&start) {
			Some(RangeState::Downloading { .. }) => {
				log::trace!(target: LOG_TARGET, "inserting range {start} still marked downloading");
			},
			Some(RangeState::Complete(existing)) if existing.len() >= blocks.len() => {
				log::trace!(target: LOG_TARGET, "ignoring already-downloaded range {start}");
				return
			},
			_ => {},
		}
		self.ranges.insert(
			start,
			RangeState::Complete(
				blocks
					.into_iter()
					.map(|block| IncomingBlock { block, origin: peer })
					.collect(),
			),
		);
	}

	/// Pick the next range `peer` should download. `common` is the highest
	/// block number we share with the peer.
	pub fn needed_blocks(
		&mut self,
		peer: PeerId,
		count: u32,
		peer_best: BlockNumber,
		common: BlockNumber,
		max_parallel: u32,
		max_ahead: u32,
	) -> Option<Range<BlockNumber>> {
		if peer_best <= common {
			return None
		}
		let first_different = common + 1;
		let count = count as BlockNumber;
		let (mut range, downloading) = {
			let mut ranges = self.ranges.iter().peekable();
			let mut prev: Option<(&BlockNumber, &RangeState)> = None;
			loop {
				let next = ranges.next();
				break match (prev, next) {
					// Join a range already in flight if it is still thin.
					(Some((start, &RangeState::Downloading { ref len, downloading })), _)
						if downloading < max_parallel && *start >= first_different =>
						(*start..*start + *len, downloading),
					// Fill a gap between two tracked ranges.
					(Some((start, state)), Some((next_start, _)))
						if *start + state.len() < *next_start &&
							*start + state.len() >= first_different =>
						(
							*start + state.len()..
								cmp::min(*next_start, *start + state.len() + count),
							0,
						),
					// Extend past the last tracked range.
					(Some((start, state)), None) if *start + state.len() >= first_different =>
						(*start + state.len()..*start + state.len() + count, 0),
					// Nothing tracked: start right after the common block.
					(None, None) => (first_different..first_different + count, 0),
					// A gap before the first tracked range.
					(None, Some((start, _))) if *start > first_different =>
						(first_different..cmp::min(first_different + count, *start), 0),
					_ => {
						prev = next;
						continue
					},
				}
			}
		};

		if range.start > peer_best {
			log::trace!(target: LOG_TARGET, "range {range:?} out of reach for peer {peer} at {peer_best}");
			return None
		}
		range.end = cmp::min(peer_best + 1, range.end);

		if self
			.ranges
			.iter()
			.next()
			.map_or(false, |(first, _)| range.start > *first + max_ahead as BlockNumber)
		{
			log::trace!(target: LOG_TARGET, "range {range:?} too far ahead of the import point");
			return None
		}
		if range.end <= range.start {
			return None
		}

		self.peer_requests.insert(peer, range.start);
		self.ranges.insert(
			range.start,
			RangeState::Downloading { len: range.end - range.start, downloading: downloading + 1 },
		);
		Some(range)
	}

	/// Drain the contiguous run of complete blocks importable after `from`.
	pub fn ready_blocks(&mut self, from: BlockNumber) -> Vec<IncomingBlock> {
		let mut ready = Vec::new();
		let mut prev = from;
		let mut drained = Vec::new();
		for (&start, state) in &mut self.ranges {
			if start > prev {
				break
			}
			match state {
				RangeState::Complete(blocks) => {
					let len = blocks.len() as BlockNumber;
					prev = start + len;
					ready.append(blocks);
					drained.push((start, len));
				},
				RangeState::Queued { .. } => continue,
				RangeState::Downloading { .. } => break,
			}
		}
		for (start, len) in drained {
			self.ranges.insert(start, RangeState::Queued { len });
		}
		if !ready.is_empty() {
			log::trace!(target: LOG_TARGET, "{} blocks ready for import", ready.len());
		}
		ready
	}

	/// Drop the queued ranges fully below-or-at `to` once imported.
	pub fn clear_queued_up_to(&mut self, to: BlockNumber) {
		self.ranges.retain(|start, state| match state {
			RangeState::Queued { len } => *start + *len - 1 > to,
			_ => true,
		});
	}

	/// The peer's outstanding request range was abandoned (disconnect or
	/// timeout).
	pub fn clear_peer_download(&mut self, peer: &PeerId) {
		if let Some(start) = self.peer_requests.remove(peer) {
			let remove = match self.ranges.get_mut(&start) {
				Some(RangeState::Downloading { downloading, .. }) if *downloading > 1 => {
					*downloading -= 1;
					false
				},
				Some(RangeState::Downloading { .. }) => true,
				_ => false,
			};
			if remove {
				self.ranges.remove(&start);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mp_runtime::{Hash, Header};
	use pretty_assertions::assert_eq;

	fn block_data(number: BlockNumber) -> BlockData {
		let header = Header::new(Hash::repeat_byte(number as u8), number);
		BlockData {
			hash: header.hash(),
			header: Some(header),
			body: Some(Vec::new()),
			receipt: None,
			message_queue: None,
			justification: None,
		}
	}

	fn range_of(range: Range<BlockNumber>) -> Vec<BlockData> {
		range.map(block_data).collect()
	}

	#[test]
	fn requests_start_after_the_common_block() {
		let mut collection = BlockCollection::new();
		assert_eq!(collection.needed_blocks(1, 64, 100, 0, 1, 2048), Some(1..65));
		// A second peer continues after the in-flight range.
		assert_eq!(collection.needed_blocks(2, 64, 100, 0, 1, 2048), Some(65..101));
	}

	#[test]
	fn peers_short_of_the_range_are_skipped() {
		let mut collection = BlockCollection::new();
		assert_eq!(collection.needed_blocks(1, 64, 10, 10, 1, 2048), None);
	}

	#[test]
	fn ready_blocks_require_contiguity() {
		let mut collection = BlockCollection::new();
		let first = collection.needed_blocks(1, 8, 100, 0, 1, 2048).unwrap();
		let second = collection.needed_blocks(2, 8, 100, 0, 1, 2048).unwrap();
		assert_eq!((first.clone(), second.clone()), (1..9, 9..17));

		// The second range lands first: nothing contiguous yet.
		collection.insert(second.start, range_of(second.clone()), 2);
		assert!(collection.ready_blocks(1).is_empty());

		collection.insert(first.start, range_of(first), 1);
		let ready = collection.ready_blocks(1);
		assert_eq!(ready.len(), 16);
		assert_eq!(ready[0].origin, 1);
		assert_eq!(ready[8].origin, 2);
	}

	#[test]
	fn disconnecting_peer_releases_its_range() {
		let mut collection = BlockCollection::new();
		let range = collection.needed_blocks(1, 8, 100, 0, 1, 2048).unwrap();
		collection.clear_peer_download(&1);
		// The same range is handed out again.
		assert_eq!(collection.needed_blocks(2, 8, 100, 0, 1, 2048), Some(range));
	}

	#[test]
	fn max_ahead_limits_the_window() {
		let mut collection = BlockCollection::new();
		let _ = collection.needed_blocks(1, 64, 10_000, 0, 1, 128).unwrap();
		// Range 2 would start at 65; with max_ahead 128 requesting far
		// beyond the first tracked range is refused once the window fills.
		for peer in 2..10 {
			if collection.needed_blocks(peer, 64, 10_000, 0, 1, 128).is_none() {
				return
			}
		}
		panic!("the download window never closed");
	}
}
