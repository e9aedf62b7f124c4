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

//! Finality gadget wire and state types: votes, commits, justifications
//! and the `FRNK` network envelope.
//!
//! Vote signatures cover the SCALE encoding of `(message, round, set_id)`,
//! binding every vote to its round and to the authority-set generation it
//! was cast under.

use codec::{Decode, Encode};
use mp_core::ed25519;
use mp_runtime::{BlockNumber, Hash};
use scale_info::TypeInfo;

/// A finality authority's public key.
pub type AuthorityId = ed25519::Public;

/// Voting weight of an authority.
pub type AuthorityWeight = u64;

/// Monotone counter of authority-set generations.
pub type SetId = u64;

/// Round counter within one authority-set generation.
pub type RoundNumber = u64;

/// Handle the network layer assigns to a connected peer.
pub type PeerId = u64;

/// The ordered voter set of one generation.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct VoterSet {
	/// The authorities with their weights, in declared order.
	pub authorities: Vec<(AuthorityId, AuthorityWeight)>,
	/// The generation this set belongs to.
	pub set_id: SetId,
}

impl VoterSet {
	/// A set over `authorities` for generation `set_id`.
	pub fn new(authorities: Vec<(AuthorityId, AuthorityWeight)>, set_id: SetId) -> Self {
		Self { authorities, set_id }
	}

	/// Total voting weight.
	pub fn total_weight(&self) -> u64 {
		self.authorities.iter().map(|(_, weight)| weight).sum()
	}

	/// Whether `weight` reaches the two-thirds supermajority bound.
	pub fn is_supermajority(&self, weight: u64) -> bool {
		weight > 0 && 3 * weight >= 2 * self.total_weight()
	}

	/// The weight of `id`, if it is a voter.
	pub fn weight_of(&self, id: &AuthorityId) -> Option<AuthorityWeight> {
		self.authorities
			.iter()
			.find(|(authority, _)| authority == id)
			.map(|(_, weight)| *weight)
	}

	/// Whether `id` belongs to the set.
	pub fn contains(&self, id: &AuthorityId) -> bool {
		self.weight_of(id).is_some()
	}
}

/// A first-phase vote for the highest block the voter considers valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct Prevote {
	/// The voted block.
	pub target_hash: Hash,
	/// Its number.
	pub target_number: BlockNumber,
}

/// A second-phase vote committing to finalise a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct Precommit {
	/// The voted block.
	pub target_hash: Hash,
	/// Its number.
	pub target_number: BlockNumber,
}

/// A vote of either phase, as covered by the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub enum Message {
	/// First phase.
	#[codec(index = 0)]
	Prevote(Prevote),
	/// Second phase.
	#[codec(index = 1)]
	Precommit(Precommit),
}

impl Message {
	/// The voted block and number, whatever the phase.
	pub fn target(&self) -> (Hash, BlockNumber) {
		match self {
			Self::Prevote(prevote) => (prevote.target_hash, prevote.target_number),
			Self::Precommit(precommit) => (precommit.target_hash, precommit.target_number),
		}
	}
}

/// The bytes an authority signs for a vote.
pub fn signing_payload(message: &Message, round: RoundNumber, set_id: SetId) -> Vec<u8> {
	(message, round, set_id).encode()
}

/// A signed vote as gossiped.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SignedMessage {
	/// The vote.
	pub message: Message,
	/// Signature over [`signing_payload`].
	pub signature: ed25519::Signature,
	/// The voter.
	pub id: AuthorityId,
}

impl SignedMessage {
	/// Verify the signature for `round` under `set_id`.
	pub fn verify(&self, round: RoundNumber, set_id: SetId) -> bool {
		self.id
			.verify(&signing_payload(&self.message, round, set_id), &self.signature)
	}
}

/// A precommit with its signature, as carried inside commits.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SignedPrecommit {
	/// The precommit.
	pub precommit: Precommit,
	/// Signature over the precommit's [`signing_payload`].
	pub signature: ed25519::Signature,
	/// The voter.
	pub id: AuthorityId,
}

impl SignedPrecommit {
	/// Verify the signature for `round` under `set_id`.
	pub fn verify(&self, round: RoundNumber, set_id: SetId) -> bool {
		let message = Message::Precommit(self.precommit);
		self.id.verify(&signing_payload(&message, round, set_id), &self.signature)
	}
}

/// A commit: the target plus the precommits proving supermajority support.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Commit {
	/// The finalised block.
	pub target_hash: Hash,
	/// Its number.
	pub target_number: BlockNumber,
	/// Precommits for the target or its descendants.
	pub precommits: Vec<SignedPrecommit>,
}

/// The persisted finality certificate for a block.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct GrandpaJustification {
	/// The round the commit was produced in.
	pub round: RoundNumber,
	/// The commit itself.
	pub commit: Commit,
}

/// Evidence of one authority voting twice in the same phase of a round.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct EquivocationProof {
	/// The offending round.
	pub round: RoundNumber,
	/// The set generation.
	pub set_id: SetId,
	/// The offender.
	pub id: AuthorityId,
	/// The first signed vote.
	pub first: (Message, ed25519::Signature),
	/// The conflicting signed vote.
	pub second: (Message, ed25519::Signature),
}

/// Everything the gadget sends over the `FRNK` notification protocol.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum GrandpaMessage {
	/// A prevote or precommit for the given round.
	#[codec(index = 0)]
	Vote {
		/// The round the vote belongs to.
		round: RoundNumber,
		/// The set generation the vote was cast under.
		set_id: SetId,
		/// The signed vote.
		message: SignedMessage,
	},
	/// A commit finalising a block.
	#[codec(index = 1)]
	Commit {
		/// The round the commit concluded.
		round: RoundNumber,
		/// The set generation.
		set_id: SetId,
		/// The commit.
		commit: Commit,
	},
	/// Periodic state advertisement.
	#[codec(index = 2)]
	Neighbour {
		/// The sender's current round.
		round: RoundNumber,
		/// The sender's set generation.
		set_id: SetId,
		/// The sender's last finalised number.
		last_finalized: BlockNumber,
	},
	/// Request to replay a completed round.
	#[codec(index = 3)]
	CatchUpRequest {
		/// The round the requester wants to reach.
		round: RoundNumber,
		/// The requester's set generation.
		set_id: SetId,
	},
	/// Reply with the votes of the last completed round.
	#[codec(index = 4)]
	CatchUpResponse {
		/// The set generation.
		set_id: SetId,
		/// The replayed round.
		round: RoundNumber,
		/// Its prevotes.
		prevotes: Vec<SignedMessage>,
		/// Its precommits.
		precommits: Vec<SignedMessage>,
	},
}
