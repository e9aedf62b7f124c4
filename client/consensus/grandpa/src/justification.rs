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

//! Verification of finality justifications.
//!
//! A justification proves a block final under a specific voter-set
//! generation: every precommit signature must verify for the carried round
//! and set id, target the finalised block or one of its descendants, and
//! the distinct signers' weight must reach the two-thirds bound.

use crate::{
	round::Chain,
	types::{GrandpaJustification, VoterSet},
};
use codec::Decode;
use mp_runtime::{BlockNumber, Hash};
use std::collections::HashSet;

/// Why a justification was rejected.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum JustificationError {
	/// The bytes did not decode.
	#[error("undecodable justification")]
	Undecodable,
	/// The justification targets a different block than asked.
	#[error("justification targets the wrong block")]
	WrongTarget,
	/// A precommit signature failed for the carried round and set id.
	#[error("bad precommit signature in justification")]
	BadSignature,
	/// A precommit targets a block that is not the target or its
	/// descendant.
	#[error("precommit for a block outside the target's subtree")]
	TargetNotInSubtree,
	/// The same authority appears twice.
	#[error("duplicate precommit signer")]
	DuplicateSigner,
	/// A signer is not in the voter set.
	#[error("precommit from a non-voter")]
	NotAVoter,
	/// The distinct signers' weight misses the two-thirds bound.
	#[error("insufficient precommit weight")]
	InsufficientWeight,
}

/// Verify `justification` finalises `(target_hash, target_number)` under
/// `voters`.
///
/// Descendancy is checked against `chain`; precommits for blocks this node
/// has pruned already are rejected rather than trusted.
pub fn verify_justification(
	justification: &GrandpaJustification,
	target_hash: &Hash,
	target_number: BlockNumber,
	voters: &VoterSet,
	chain: &dyn Chain,
) -> Result<(), JustificationError> {
	let commit = &justification.commit;
	if commit.target_hash != *target_hash || commit.target_number != target_number {
		return Err(JustificationError::WrongTarget)
	}

	let mut signers: HashSet<_> = HashSet::with_capacity(commit.precommits.len());
	let mut weight = 0u64;
	for signed in &commit.precommits {
		let voter_weight =
			voters.weight_of(&signed.id).ok_or(JustificationError::NotAVoter)?;
		if !signers.insert(signed.id) {
			return Err(JustificationError::DuplicateSigner)
		}
		if !signed.verify(justification.round, voters.set_id) {
			return Err(JustificationError::BadSignature)
		}
		if !chain.is_descendant(target_hash, &signed.precommit.target_hash) {
			return Err(JustificationError::TargetNotInSubtree)
		}
		weight += voter_weight;
	}

	if !voters.is_supermajority(weight) {
		return Err(JustificationError::InsufficientWeight)
	}
	Ok(())
}

/// Decode and verify an encoded justification.
pub fn decode_and_verify(
	encoded: &[u8],
	target_hash: &Hash,
	target_number: BlockNumber,
	voters: &VoterSet,
	chain: &dyn Chain,
) -> Result<GrandpaJustification, JustificationError> {
	let justification = GrandpaJustification::decode(&mut &*encoded)
		.map_err(|_| JustificationError::Undecodable)?;
	verify_justification(&justification, target_hash, target_number, voters, chain)?;
	Ok(justification)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		round::tests::{signed_vote, test_voters, TestChain},
		round::Round,
		types::{Commit, Message, SignedPrecommit},
	};
	use codec::Encode;
	use pretty_assertions::assert_eq;

	fn build_justification(
		voters_count: u8,
		signing: impl Fn(usize) -> Option<(Hash, BlockNumber)>,
	) -> (GrandpaJustification, VoterSet) {
		let (pairs, voters) = test_voters(voters_count);
		let target = Hash::repeat_byte(0x0c);
		let precommits = pairs
			.iter()
			.enumerate()
			.filter_map(|(index, pair)| {
				let (hash, number) = signing(index)?;
				let signed = signed_vote(pair, Round::precommit(hash, number), 1, 0);
				let Message::Precommit(precommit) = signed.message else { unreachable!() };
				Some(SignedPrecommit { precommit, signature: signed.signature, id: signed.id })
			})
			.collect();
		(
			GrandpaJustification {
				round: 1,
				commit: Commit { target_hash: target, target_number: 3, precommits },
			},
			voters,
		)
	}

	#[test]
	fn honest_two_thirds_verifies() {
		let chain = TestChain::linear();
		let c = Hash::repeat_byte(0x0c);
		let (justification, voters) =
			build_justification(3, |index| (index < 2).then_some((c, 3)));
		verify_justification(&justification, &c, 3, &voters, &chain).unwrap();

		// And through the encoded path.
		decode_and_verify(&justification.encode(), &c, 3, &voters, &chain).unwrap();
	}

	#[test]
	fn insufficient_weight_is_rejected() {
		let chain = TestChain::linear();
		let c = Hash::repeat_byte(0x0c);
		let (justification, voters) =
			build_justification(3, |index| (index < 1).then_some((c, 3)));
		assert_eq!(
			verify_justification(&justification, &c, 3, &voters, &chain),
			Err(JustificationError::InsufficientWeight),
		);
	}

	#[test]
	fn precommit_below_the_target_is_rejected() {
		let chain = TestChain::linear();
		let c = Hash::repeat_byte(0x0c);
		let b = Hash::repeat_byte(0x0b);
		// Voter 2 precommits B, an ancestor of the target C.
		let (justification, voters) = build_justification(3, |index| {
			Some(if index < 2 { (c, 3) } else { (b, 2) })
		});
		assert_eq!(
			verify_justification(&justification, &c, 3, &voters, &chain),
			Err(JustificationError::TargetNotInSubtree),
		);
	}

	#[test]
	fn wrong_set_id_breaks_signatures() {
		let chain = TestChain::linear();
		let c = Hash::repeat_byte(0x0c);
		let (justification, voters) =
			build_justification(3, |index| (index < 2).then_some((c, 3)));
		let shifted = VoterSet { set_id: 1, ..voters };
		assert_eq!(
			verify_justification(&justification, &c, 3, &shifted, &chain),
			Err(JustificationError::BadSignature),
		);
	}

	#[test]
	fn wrong_target_is_rejected() {
		let chain = TestChain::linear();
		let c = Hash::repeat_byte(0x0c);
		let b = Hash::repeat_byte(0x0b);
		let (justification, voters) =
			build_justification(3, |index| (index < 2).then_some((c, 3)));
		assert_eq!(
			verify_justification(&justification, &b, 2, &voters, &chain),
			Err(JustificationError::WrongTarget),
		);
	}
}
