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

//! Header verification for incoming BABE blocks: pre-digest
//! well-formedness, the slot claim (VRF or secondary eligibility) and the
//! author's seal signature.

use crate::{
	authorship::{primary_threshold, score_wins, secondary_slot_author, slot_transcript},
	epochs::EpochState,
	types::PreDigest,
	BabeError,
};
use codec::Decode;
use mc_blockchain::ConsensusVerifier;
use mp_core::sr25519;
use mp_runtime::{Header, BABE_ENGINE_ID};
use std::sync::Arc;

/// Verifies headers against the epoch state shared with the producer.
pub struct BabeVerifier {
	epochs: Arc<EpochState>,
}

impl BabeVerifier {
	/// A verifier over the given epoch state.
	pub fn new(epochs: Arc<EpochState>) -> Self {
		Self { epochs }
	}

	/// Full consensus check of `header`.
	pub fn check_header(&self, header: &Header) -> Result<(), BabeError> {
		let pre_digest = header
			.babe_pre_digest()
			.ok_or(BabeError::MissingPreDigest)
			.and_then(|bytes| {
				PreDigest::decode(&mut &bytes[..]).map_err(|_| BabeError::MissingPreDigest)
			})?;
		let epoch = self.epochs.data_for_slot(pre_digest.slot());
		let authority_index = pre_digest.authority_index() as usize;
		let (public, weight) = epoch
			.authorities
			.get(authority_index)
			.copied()
			.ok_or(BabeError::AuthorityOutOfRange(pre_digest.authority_index()))?;

		match &pre_digest {
			PreDigest::Primary(primary) => {
				let transcript =
					slot_transcript(&epoch.randomness, primary.slot, epoch.epoch_index);
				let score = public
					.vrf_verify(transcript, &primary.vrf_signature)
					.map_err(|_| BabeError::BadVrfProof)?;
				let threshold = primary_threshold(epoch.c, weight, epoch.total_weight());
				if !score_wins(score, threshold) {
					return Err(BabeError::ThresholdNotMet)
				}
			},
			PreDigest::Secondary(secondary) => {
				if !epoch.secondary_slots {
					return Err(BabeError::SecondarySlotsDisabled)
				}
				let expected = secondary_slot_author(
					&epoch.randomness,
					secondary.slot,
					epoch.authorities.len(),
				);
				if expected != Some(secondary.authority_index) {
					return Err(BabeError::WrongSecondaryAuthor)
				}
			},
		}

		self.check_seal(header, &public)?;
		// Only verified headers feed epoch tracking (first-slot pinning and
		// scheduled next-epoch descriptors).
		self.epochs.note_header(header);
		Ok(())
	}

	/// The seal signs the Blake2b-256 of the header without the seal digest.
	fn check_seal(&self, header: &Header, public: &sr25519::Public) -> Result<(), BabeError> {
		let (engine, payload) = header.seal().ok_or(BabeError::Unsealed)?;
		if *engine != BABE_ENGINE_ID {
			return Err(BabeError::Unsealed)
		}
		let raw: [u8; 64] = payload.try_into().map_err(|_| BabeError::BadSeal)?;
		let signature = sr25519::Signature(raw);
		if !public.verify(header.hash().as_bytes(), &signature) {
			return Err(BabeError::BadSeal)
		}
		Ok(())
	}
}

impl ConsensusVerifier for BabeVerifier {
	fn verify_header(&self, header: &Header) -> Result<(), String> {
		self.check_header(header).map_err(|error| error.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		authorship::claim_slot,
		types::{BabeConfiguration, SecondaryPreDigest},
	};
	use codec::Encode;
	use mp_core::{
		crypto::{dev_seed, KeyTypeId},
		keystore::{Keystore, KeystorePtr, MemoryKeystore},
	};
	use mp_runtime::{DigestItem, Hash};

	fn setup() -> (KeystorePtr, sr25519::Public, Arc<EpochState>) {
		let keystore = Arc::new(MemoryKeystore::new());
		let public = keystore
			.sr25519_generate(KeyTypeId::BABE, Some(dev_seed("//Alice")))
			.unwrap();
		let config = BabeConfiguration {
			slot_duration: 3000,
			epoch_length: 100,
			c: (1, 1),
			authorities: vec![(public.0, 1)],
			randomness: [5; 32],
			secondary_slots: true,
		};
		(keystore as KeystorePtr, public, Arc::new(EpochState::with_first_slot(config, 0)))
	}

	fn authored_header(
		keystore: &KeystorePtr,
		public: &sr25519::Public,
		epochs: &EpochState,
		slot: u64,
	) -> Header {
		let epoch = epochs.data_for_slot(slot);
		let (pre_digest, _) = claim_slot(slot, &epoch, keystore).expect("sole authority claims");
		let mut header = Header::new(Hash::repeat_byte(1), 1);
		header
			.digest
			.push(DigestItem::PreRuntime(BABE_ENGINE_ID, pre_digest.encode()));
		let signature = keystore
			.sr25519_sign(KeyTypeId::BABE, public, header.hash().as_bytes())
			.expect("key is in the store");
		header
			.digest
			.push(DigestItem::Seal(BABE_ENGINE_ID, signature.0.to_vec()));
		header
	}

	#[test]
	fn accepts_own_authored_header() {
		let (keystore, public, epochs) = setup();
		let header = authored_header(&keystore, &public, &epochs, 7);
		BabeVerifier::new(epochs).check_header(&header).unwrap();
	}

	#[test]
	fn rejects_tampered_seal() {
		let (keystore, public, epochs) = setup();
		let mut header = authored_header(&keystore, &public, &epochs, 7);
		let (engine, mut payload) = header.digest.pop_seal().unwrap();
		payload[0] ^= 0xff;
		header.digest.push(DigestItem::Seal(engine, payload));
		assert!(matches!(
			BabeVerifier::new(epochs).check_header(&header),
			Err(BabeError::BadSeal),
		));
	}

	#[test]
	fn rejects_missing_pre_digest() {
		let (_, _, epochs) = setup();
		let header = Header::new(Hash::zero(), 1);
		assert!(matches!(
			BabeVerifier::new(epochs).check_header(&header),
			Err(BabeError::MissingPreDigest),
		));
	}

	#[test]
	fn rejects_wrong_secondary_author() {
		let (keystore, public, epochs) = setup();
		// Forge a secondary claim with a bogus index.
		let claim = PreDigest::Secondary(SecondaryPreDigest { authority_index: 3, slot: 7 });
		let mut header = Header::new(Hash::zero(), 1);
		header
			.digest
			.push(DigestItem::PreRuntime(BABE_ENGINE_ID, claim.encode()));
		let signature = keystore
			.sr25519_sign(KeyTypeId::BABE, &public, header.hash().as_bytes())
			.unwrap();
		header
			.digest
			.push(DigestItem::Seal(BABE_ENGINE_ID, signature.0.to_vec()));
		assert!(matches!(
			BabeVerifier::new(epochs).check_header(&header),
			Err(BabeError::AuthorityOutOfRange(3)),
		));
	}

	#[test]
	fn rejects_unsealed_header() {
		let (keystore, public, epochs) = setup();
		let mut header = authored_header(&keystore, &public, &epochs, 7);
		header.digest.pop_seal();
		assert!(matches!(
			BabeVerifier::new(epochs).check_header(&header),
			Err(BabeError::Unsealed),
		));
	}
}
