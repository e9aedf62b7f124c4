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

//! The slot lottery: primary claims through the VRF threshold, secondary
//! claims through the deterministic fallback author.

use crate::types::{EpochData, PreDigest, PrimaryPreDigest, SecondaryPreDigest};
use mp_core::{
	blake2_256,
	crypto::KeyTypeId,
	keystore::{Keystore, KeystorePtr},
	sr25519::{self, Transcript},
};

/// Build the VRF transcript binding a slot to the epoch randomness.
pub fn slot_transcript(randomness: &[u8; 32], slot: u64, epoch_index: u64) -> Transcript {
	let mut transcript = Transcript::new(b"BABE");
	transcript.append_u64(b"slot number", slot);
	transcript.append_u64(b"current epoch", epoch_index);
	transcript.append_message(b"chain randomness", randomness);
	transcript
}

/// The primary-claim threshold for one authority:
/// `T = (1 - (1 - c)^(weight / total_weight)) * 2^128`.
///
/// `u128::MAX` stands in for the untruncated `2^128` bound (`c = 1`), which
/// every VRF output satisfies.
pub fn primary_threshold(c: (u64, u64), weight: u64, total_weight: u64) -> u128 {
	if c.1 == 0 || total_weight == 0 {
		return 0
	}
	let c = (c.0 as f64 / c.1 as f64).clamp(0.0, 1.0);
	let theta = weight as f64 / total_weight as f64;
	let probability = 1.0 - (1.0 - c).powf(theta);
	if probability >= 1.0 {
		return u128::MAX
	}
	if probability <= 0.0 {
		return 0
	}
	(probability * (u128::MAX as f64)) as u128
}

/// Whether a VRF score wins against the threshold.
pub fn score_wins(score: u128, threshold: u128) -> bool {
	// A saturated threshold means the exact bound was 2^128: every output
	// is below it.
	threshold == u128::MAX || score < threshold
}

/// The authority index entitled to the secondary claim of `slot`.
pub fn secondary_slot_author(randomness: &[u8; 32], slot: u64, authorities: usize) -> Option<u32> {
	if authorities == 0 {
		return None
	}
	let mut material = randomness.to_vec();
	material.extend_from_slice(&slot.to_le_bytes());
	let hash = blake2_256(&material);
	let seed = u64::from_le_bytes(hash[..8].try_into().expect("hash has 32 bytes; qed"));
	Some((seed % authorities as u64) as u32)
}

/// Try to claim `slot` with any of our keys in the epoch's authority set.
///
/// Primary claims take precedence; the secondary path only fires when the
/// epoch allows it and our key is the designated fallback author.
pub fn claim_slot(
	slot: u64,
	epoch: &EpochData,
	keystore: &KeystorePtr,
) -> Option<(PreDigest, sr25519::Public)> {
	let local_keys = keystore.sr25519_public_keys(KeyTypeId::BABE);
	if local_keys.is_empty() {
		return None
	}
	let total_weight = epoch.total_weight();

	for (authority_index, (public, weight)) in epoch.authorities.iter().enumerate() {
		if !local_keys.contains(public) {
			continue
		}
		let transcript = slot_transcript(&epoch.randomness, slot, epoch.epoch_index);
		let Some((vrf_signature, score)) =
			keystore.sr25519_vrf_sign(KeyTypeId::BABE, public, transcript)
		else {
			continue
		};
		let threshold = primary_threshold(epoch.c, *weight, total_weight);
		if score_wins(score, threshold) {
			return Some((
				PreDigest::Primary(PrimaryPreDigest {
					authority_index: authority_index as u32,
					slot,
					vrf_signature,
				}),
				*public,
			))
		}
	}

	if epoch.secondary_slots {
		let expected =
			secondary_slot_author(&epoch.randomness, slot, epoch.authorities.len())?;
		let (public, _) = epoch.authorities.get(expected as usize)?;
		if local_keys.contains(public) {
			return Some((
				PreDigest::Secondary(SecondaryPreDigest { authority_index: expected, slot }),
				*public,
			))
		}
	}

	None
}

#[cfg(test)]
mod tests {
	use super::*;
	use mp_core::{crypto::dev_seed, keystore::{Keystore, MemoryKeystore}};
	use pretty_assertions::assert_eq;
	use std::sync::Arc;

	fn solo_epoch(c: (u64, u64), secondary_slots: bool, public: sr25519::Public) -> EpochData {
		EpochData {
			epoch_index: 0,
			authorities: vec![(public, 1)],
			randomness: [7; 32],
			c,
			secondary_slots,
		}
	}

	fn keystore_with_alice() -> (KeystorePtr, sr25519::Public) {
		let keystore = Arc::new(MemoryKeystore::new());
		let public = keystore
			.sr25519_generate(KeyTypeId::BABE, Some(dev_seed("//Alice")))
			.unwrap();
		(keystore, public)
	}

	#[test]
	fn sole_authority_with_c_one_claims_every_slot() {
		let (keystore, public) = keystore_with_alice();
		let epoch = solo_epoch((1, 1), false, public);
		for slot in 0..20 {
			let (claim, author) = claim_slot(slot, &epoch, &keystore).expect("claims all slots");
			assert_eq!(author, public);
			assert!(matches!(claim, PreDigest::Primary(_)));
			assert_eq!(claim.slot(), slot);
		}
	}

	#[test]
	fn c_zero_claims_nothing() {
		let (keystore, public) = keystore_with_alice();
		let epoch = solo_epoch((0, 1), false, public);
		for slot in 0..20 {
			assert_eq!(claim_slot(slot, &epoch, &keystore), None);
		}
	}

	#[test]
	fn c_zero_with_secondary_slots_still_authors() {
		let (keystore, public) = keystore_with_alice();
		let epoch = solo_epoch((0, 1), true, public);
		let (claim, _) = claim_slot(4, &epoch, &keystore).expect("fallback author");
		assert!(matches!(claim, PreDigest::Secondary(_)));
	}

	#[test]
	fn threshold_extremes() {
		assert_eq!(primary_threshold((0, 1), 1, 1), 0);
		assert_eq!(primary_threshold((1, 1), 1, 1), u128::MAX);
		let half = primary_threshold((1, 2), 1, 1);
		assert!(half > 0 && half < u128::MAX);
		// Lower weight lowers the threshold.
		let minority = primary_threshold((1, 2), 1, 10);
		assert!(minority < half);
	}

	#[test]
	fn fixed_vrf_output_yields_at_most_one_primary_claim() {
		// With a fixed key, slot and randomness the score is deterministic,
		// so the threshold test gives the same answer every time.
		let (keystore, public) = keystore_with_alice();
		let epoch = solo_epoch((1, 2), false, public);
		let first = claim_slot(9, &epoch, &keystore);
		let second = claim_slot(9, &epoch, &keystore);
		match (&first, &second) {
			(Some((PreDigest::Primary(a), _)), Some((PreDigest::Primary(b), _))) =>
				assert_eq!(a.slot, b.slot),
			(None, None) => {},
			other => panic!("claim outcome changed between identical runs: {other:?}"),
		}
	}

	#[test]
	fn secondary_author_is_stable() {
		let randomness = [3; 32];
		let first = secondary_slot_author(&randomness, 10, 4);
		let second = secondary_slot_author(&randomness, 10, 4);
		assert_eq!(first, second);
		assert!(first.unwrap() < 4);
		assert_eq!(secondary_slot_author(&randomness, 10, 0), None);
	}

	#[test]
	fn keyless_node_never_claims() {
		let keystore: KeystorePtr = Arc::new(MemoryKeystore::new());
		let public = sr25519::Pair::from_seed(&dev_seed("//Alice")).unwrap().public();
		let epoch = solo_epoch((1, 1), true, public);
		assert_eq!(claim_slot(0, &epoch, &keystore), None);
	}
}
