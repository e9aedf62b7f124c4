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

//! One voting round: vote tracking, equivocation detection and the GHOST
//! computation.
//!
//! The ghost of a weighted vote set is the highest block whose sub-tree
//! gathers votes reaching two thirds of the voter weight. Equivocated
//! votes stay in the totals (counting an equivocator once per phase with
//! its first target and weight on every ancestor it voted for would break
//! the multiset semantics; instead both votes count toward their targets,
//! but the authority's weight counts only once per block thanks to
//! per-authority deduplication along ancestries).

use crate::types::{
	AuthorityId, EquivocationProof, Message, Precommit, Prevote, RoundNumber, SignedMessage,
	VoterSet,
};
use mp_core::ed25519;
use mp_runtime::{BlockNumber, Hash};
use std::collections::HashMap;

/// Read access to the block tree's ancestry, as the gadget needs it.
pub trait Chain: Send + Sync {
	/// The number of `hash`, if known.
	fn number(&self, hash: &Hash) -> Option<BlockNumber>;
	/// Whether `descendant` is at-or-below `ancestor`.
	fn is_descendant(&self, ancestor: &Hash, descendant: &Hash) -> bool;
	/// `hash` and its ancestors up to the finalised root, inclusive.
	fn ancestry(&self, hash: &Hash) -> Option<Vec<Hash>>;
	/// The current best head.
	fn best_head(&self) -> (Hash, BlockNumber);
}

/// Why a vote was not imported into the round.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum VoteError {
	/// The signature did not verify for this round and set.
	#[error("bad vote signature")]
	BadSignature,
	/// The signer is not in the voter set.
	#[error("vote from a non-voter")]
	NotAVoter,
	/// The same vote was already imported.
	#[error("duplicate vote")]
	Duplicate,
}

/// Per-phase vote storage: first vote per authority plus any equivocations.
#[derive(Debug, Default)]
struct Phase {
	votes: HashMap<AuthorityId, Vec<(Message, ed25519::Signature)>>,
}

impl Phase {
	/// Import a vote; `Ok(Some(_))` reports a fresh equivocation.
	fn import(
		&mut self,
		id: AuthorityId,
		message: Message,
		signature: ed25519::Signature,
	) -> Result<Option<(Message, ed25519::Signature)>, VoteError> {
		let entry = self.votes.entry(id).or_default();
		if entry.iter().any(|(existing, _)| *existing == message) {
			return Err(VoteError::Duplicate)
		}
		let equivocated = entry.first().cloned();
		entry.push((message, signature));
		Ok(equivocated)
	}

	/// All `(target, authority, weight)` triples of this phase. Every vote
	/// of an equivocator is included.
	fn weighted_targets<'a>(
		&'a self,
		voters: &'a VoterSet,
	) -> impl Iterator<Item = (Hash, AuthorityId, u64)> + 'a {
		self.votes.iter().flat_map(move |(id, votes)| {
			let weight = voters.weight_of(id).unwrap_or(0);
			votes
				.iter()
				.map(move |(message, _)| (message.target().0, *id, weight))
		})
	}
}

/// The state of one round.
pub struct Round {
	/// The round number.
	pub number: RoundNumber,
	/// The voter set of this round's generation.
	pub voters: VoterSet,
	prevotes: Phase,
	precommits: Phase,
	equivocations: Vec<EquivocationProof>,
}

impl Round {
	/// An empty round.
	pub fn new(number: RoundNumber, voters: VoterSet) -> Self {
		Self {
			number,
			voters,
			prevotes: Phase::default(),
			precommits: Phase::default(),
			equivocations: Vec::new(),
		}
	}

	/// Import a signed vote of either phase.
	pub fn import(&mut self, signed: SignedMessage) -> Result<(), VoteError> {
		if !self.voters.contains(&signed.id) {
			return Err(VoteError::NotAVoter)
		}
		if !signed.verify(self.number, self.voters.set_id) {
			return Err(VoteError::BadSignature)
		}
		let phase = match signed.message {
			Message::Prevote(_) => &mut self.prevotes,
			Message::Precommit(_) => &mut self.precommits,
		};
		if let Some(first) = phase.import(signed.id, signed.message, signed.signature)? {
			log::warn!(
				target: crate::LOG_TARGET,
				"authority {:?} equivocated in round {}",
				signed.id,
				self.number,
			);
			self.equivocations.push(EquivocationProof {
				round: self.number,
				set_id: self.voters.set_id,
				id: signed.id,
				first,
				second: (signed.message, signed.signature),
			});
		}
		Ok(())
	}

	/// The prevote ghost: drives the precommit target.
	pub fn prevote_ghost(&self, chain: &dyn Chain) -> Option<(Hash, BlockNumber)> {
		ghost(self.prevotes.weighted_targets(&self.voters), &self.voters, chain)
	}

	/// The precommit ghost: the block this round can finalise.
	pub fn precommit_ghost(&self, chain: &dyn Chain) -> Option<(Hash, BlockNumber)> {
		ghost(self.precommits.weighted_targets(&self.voters), &self.voters, chain)
	}

	/// A round is completable once a precommit supermajority exists.
	pub fn completable(&self, chain: &dyn Chain) -> bool {
		self.precommit_ghost(chain).is_some()
	}

	/// The signed precommits supporting `target` (votes on it or its
	/// descendants), for commit assembly.
	pub fn commit_precommits(
		&self,
		target: &Hash,
		chain: &dyn Chain,
	) -> Vec<crate::types::SignedPrecommit> {
		let mut out = Vec::new();
		for (id, votes) in &self.precommits.votes {
			for (message, signature) in votes {
				let Message::Precommit(precommit) = message else { continue };
				if chain.is_descendant(target, &precommit.target_hash) {
					out.push(crate::types::SignedPrecommit {
						precommit: *precommit,
						signature: *signature,
						id: *id,
					});
				}
			}
		}
		out
	}

	/// All signed prevotes, for catch-up responses.
	pub fn signed_prevotes(&self) -> Vec<SignedMessage> {
		self.signed_messages(&self.prevotes)
	}

	/// All signed precommits, for catch-up responses.
	pub fn signed_precommits(&self) -> Vec<SignedMessage> {
		self.signed_messages(&self.precommits)
	}

	fn signed_messages(&self, phase: &Phase) -> Vec<SignedMessage> {
		phase
			.votes
			.iter()
			.flat_map(|(id, votes)| {
				votes.iter().map(move |(message, signature)| SignedMessage {
					message: *message,
					signature: *signature,
					id: *id,
				})
			})
			.collect()
	}

	/// Prevote weight gathered so far (each voter once).
	pub fn prevote_participation(&self) -> u64 {
		self.participation(&self.prevotes)
	}

	/// Precommit weight gathered so far (each voter once).
	pub fn precommit_participation(&self) -> u64 {
		self.participation(&self.precommits)
	}

	fn participation(&self, phase: &Phase) -> u64 {
		phase
			.votes
			.keys()
			.filter_map(|id| self.voters.weight_of(id))
			.sum()
	}

	/// Equivocations observed in this round.
	pub fn equivocations(&self) -> &[EquivocationProof] {
		&self.equivocations
	}

	/// Convenience: build this voter's prevote for the given target.
	pub fn prevote(target_hash: Hash, target_number: BlockNumber) -> Message {
		Message::Prevote(Prevote { target_hash, target_number })
	}

	/// Convenience: build this voter's precommit for the given target.
	pub fn precommit(target_hash: Hash, target_number: BlockNumber) -> Message {
		Message::Precommit(Precommit { target_hash, target_number })
	}
}

/// The GHOST of a weighted vote multiset: the highest block whose sub-tree
/// carries a supermajority. Each authority's weight counts at most once per
/// candidate block, even when it equivocated.
fn ghost(
	votes: impl Iterator<Item = (Hash, AuthorityId, u64)>,
	voters: &VoterSet,
	chain: &dyn Chain,
) -> Option<(Hash, BlockNumber)> {
	// Which authorities support each candidate block (vote on it or below).
	let mut support: HashMap<Hash, HashMap<AuthorityId, u64>> = HashMap::new();
	for (target, id, weight) in votes {
		let Some(ancestry) = chain.ancestry(&target) else { continue };
		for block in ancestry {
			support.entry(block).or_default().insert(id, weight);
		}
	}

	support
		.into_iter()
		.filter_map(|(hash, supporters)| {
			let weight: u64 = supporters.values().sum();
			let number = chain.number(&hash)?;
			voters.is_supermajority(weight).then_some((hash, number))
		})
		.max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::types::signing_payload;
	use mp_core::crypto::dev_seed;
	use pretty_assertions::assert_eq;
	use std::collections::HashMap;

	/// A hand-built chain: every block maps to (number, parent).
	pub(crate) struct TestChain {
		pub blocks: HashMap<Hash, (BlockNumber, Option<Hash>)>,
		pub best: (Hash, BlockNumber),
	}

	impl TestChain {
		/// `G <- A <- B <- C` with hashes 0x00, 0x0a, 0x0b, 0x0c.
		pub fn linear() -> Self {
			let g = Hash::repeat_byte(0);
			let a = Hash::repeat_byte(0x0a);
			let b = Hash::repeat_byte(0x0b);
			let c = Hash::repeat_byte(0x0c);
			let mut blocks = HashMap::new();
			blocks.insert(g, (0, None));
			blocks.insert(a, (1, Some(g)));
			blocks.insert(b, (2, Some(a)));
			blocks.insert(c, (3, Some(b)));
			Self { blocks, best: (c, 3) }
		}
	}

	impl Chain for TestChain {
		fn number(&self, hash: &Hash) -> Option<BlockNumber> {
			self.blocks.get(hash).map(|(number, _)| *number)
		}

		fn is_descendant(&self, ancestor: &Hash, descendant: &Hash) -> bool {
			let mut current = Some(*descendant);
			while let Some(hash) = current {
				if hash == *ancestor {
					return true
				}
				current = self.blocks.get(&hash).and_then(|(_, parent)| *parent);
			}
			false
		}

		fn ancestry(&self, hash: &Hash) -> Option<Vec<Hash>> {
			if !self.blocks.contains_key(hash) {
				return None
			}
			let mut out = Vec::new();
			let mut current = Some(*hash);
			while let Some(hash) = current {
				out.push(hash);
				current = self.blocks.get(&hash).and_then(|(_, parent)| *parent);
			}
			Some(out)
		}

		fn best_head(&self) -> (Hash, BlockNumber) {
			self.best
		}
	}

	pub(crate) fn test_voters(count: u8) -> (Vec<ed25519::Pair>, VoterSet) {
		let pairs: Vec<ed25519::Pair> = (0..count)
			.map(|i| ed25519::Pair::from_seed(&dev_seed(&format!("//voter{i}"))))
			.collect();
		let voters =
			VoterSet::new(pairs.iter().map(|pair| (pair.public(), 1)).collect(), 0);
		(pairs, voters)
	}

	pub(crate) fn signed_vote(
		pair: &ed25519::Pair,
		message: Message,
		round: RoundNumber,
		set_id: u64,
	) -> SignedMessage {
		SignedMessage {
			message,
			signature: pair.sign(&signing_payload(&message, round, set_id)),
			id: pair.public(),
		}
	}

	#[test]
	fn ghost_needs_a_supermajority() {
		let chain = TestChain::linear();
		let (pairs, voters) = test_voters(3);
		let mut round = Round::new(1, voters);
		let b = Hash::repeat_byte(0x0b);

		round
			.import(signed_vote(&pairs[0], Round::prevote(b, 2), 1, 0))
			.unwrap();
		assert_eq!(round.prevote_ghost(&chain), None, "1 of 3 is not a supermajority");

		round
			.import(signed_vote(&pairs[1], Round::prevote(b, 2), 1, 0))
			.unwrap();
		assert_eq!(round.prevote_ghost(&chain), Some((b, 2)));
	}

	#[test]
	fn two_of_three_on_c_finalises_c() {
		// Voters 0 and 1 precommit C, voter 2 precommits B. C gathers two
		// thirds of the weight and is the highest such block; B gathers all
		// three but sits lower.
		let chain = TestChain::linear();
		let (pairs, voters) = test_voters(3);
		let mut round = Round::new(1, voters);
		let b = Hash::repeat_byte(0x0b);
		let c = Hash::repeat_byte(0x0c);

		round.import(signed_vote(&pairs[0], Round::precommit(c, 3), 1, 0)).unwrap();
		round.import(signed_vote(&pairs[1], Round::precommit(c, 3), 1, 0)).unwrap();
		round.import(signed_vote(&pairs[2], Round::precommit(b, 2), 1, 0)).unwrap();

		assert_eq!(round.precommit_ghost(&chain), Some((c, 3)));
		assert!(round.completable(&chain));

		// The commit for C carries exactly the two precommits on C.
		assert_eq!(round.commit_precommits(&c, &chain).len(), 2);
		// A commit for B would carry all three.
		assert_eq!(round.commit_precommits(&b, &chain).len(), 3);
	}

	#[test]
	fn minority_fork_votes_settle_on_the_ancestor() {
		// One voter strays to a block the others do not support: only the
		// common ancestor reaches the threshold.
		let chain = TestChain::linear();
		let (pairs, voters) = test_voters(3);
		let mut round = Round::new(1, voters);
		let a = Hash::repeat_byte(0x0a);
		let b = Hash::repeat_byte(0x0b);
		let c = Hash::repeat_byte(0x0c);

		round.import(signed_vote(&pairs[0], Round::prevote(b, 2), 1, 0)).unwrap();
		round.import(signed_vote(&pairs[1], Round::prevote(c, 3), 1, 0)).unwrap();
		round.import(signed_vote(&pairs[2], Round::prevote(a, 1), 1, 0)).unwrap();

		// A: 3 supporters, B: 2, C: 1. Highest with >= 2/3 is B.
		assert_eq!(round.prevote_ghost(&chain), Some((b, 2)));
	}

	#[test]
	fn equivocations_are_detected_and_still_counted() {
		let chain = TestChain::linear();
		let (pairs, voters) = test_voters(3);
		let mut round = Round::new(1, voters);
		let a = Hash::repeat_byte(0x0a);
		let c = Hash::repeat_byte(0x0c);

		round.import(signed_vote(&pairs[0], Round::prevote(c, 3), 1, 0)).unwrap();
		// Voter 2 equivocates: A first, then C.
		round.import(signed_vote(&pairs[2], Round::prevote(a, 1), 1, 0)).unwrap();
		round.import(signed_vote(&pairs[2], Round::prevote(c, 3), 1, 0)).unwrap();

		assert_eq!(round.equivocations().len(), 1);
		assert_eq!(round.equivocations()[0].id, pairs[2].public());
		// Both of the equivocator's votes stay in the totals, its weight
		// counting once per block: C reaches the threshold.
		assert_eq!(round.prevote_ghost(&chain), Some((c, 3)));
	}

	#[test]
	fn outsiders_and_bad_signatures_are_rejected() {
		let (pairs, voters) = test_voters(3);
		let mut round = Round::new(1, voters);
		let b = Hash::repeat_byte(0x0b);

		let outsider = ed25519::Pair::from_seed(&dev_seed("//outsider"));
		assert_eq!(
			round.import(signed_vote(&outsider, Round::prevote(b, 2), 1, 0)),
			Err(VoteError::NotAVoter),
		);

		// A vote signed for another round fails verification here.
		let stale = signed_vote(&pairs[0], Round::prevote(b, 2), 9, 0);
		assert_eq!(round.import(stale), Err(VoteError::BadSignature));

		// Re-sending the same vote is flagged as a duplicate, not an
		// equivocation.
		let vote = signed_vote(&pairs[0], Round::prevote(b, 2), 1, 0);
		round.import(vote.clone()).unwrap();
		assert_eq!(round.import(vote), Err(VoteError::Duplicate));
		assert!(round.equivocations().is_empty());
	}
}
