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

//! Simple sr25519 (schnorr on ristretto255) API with VRF support.
//!
//! Used for BABE authority keys and account keys. Plain signatures use the
//! `"substrate"` signing context; VRF material is produced over a caller
//! supplied transcript.

use crate::crypto::CryptoError;
use codec::{Decode, Encode};
use scale_info::TypeInfo;
use schnorrkel::{
	vrf::{VRFInOut, VRFPreOut, VRFProof},
	ExpansionMode, Keypair, MiniSecretKey, PublicKey,
};

pub use merlin::Transcript;

/// The context used for plain sr25519 signatures.
const SIGNING_CTX: &[u8] = b"substrate";

/// The context label used to squeeze lottery score bytes out of a VRF in-out.
const SCORE_VRF_CTX: &[u8] = b"substrate-babe-vrf";

/// An sr25519 public key.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, TypeInfo,
)]
pub struct Public(pub [u8; 32]);

/// An sr25519 signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct Signature(pub [u8; 64]);

/// The 32-byte VRF pre-output included in primary slot claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct VrfPreOutput(pub [u8; 32]);

/// The 64-byte VRF proof accompanying a pre-output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct VrfProofBytes(pub [u8; 64]);

/// A VRF pre-output together with its proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct VrfSignature {
	/// The pre-output; hashing it with the input transcript yields the score.
	pub pre_output: VrfPreOutput,
	/// Proof that the pre-output was produced by the key over the transcript.
	pub proof: VrfProofBytes,
}

/// An sr25519 key pair.
#[derive(Clone)]
pub struct Pair(Keypair);

impl Pair {
	/// Derive a pair from a 32-byte mini secret seed.
	pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CryptoError> {
		let mini = MiniSecretKey::from_bytes(&seed[..])
			.map_err(|_| CryptoError::Malformed("sr25519 seed"))?;
		Ok(Self(mini.expand_to_keypair(ExpansionMode::Ed25519)))
	}

	/// Generate a fresh random pair.
	pub fn generate() -> Self {
		let mini = MiniSecretKey::generate_with(rand::rngs::OsRng);
		Self(mini.expand_to_keypair(ExpansionMode::Ed25519))
	}

	/// The public half of the pair.
	pub fn public(&self) -> Public {
		Public(self.0.public.to_bytes())
	}

	/// Sign a message under the standard signing context.
	pub fn sign(&self, message: &[u8]) -> Signature {
		let context = schnorrkel::signing_context(SIGNING_CTX);
		Signature(self.0.sign(context.bytes(message)).to_bytes())
	}

	/// Produce a VRF signature over `transcript` and the lottery score bytes
	/// derived from the in-out.
	pub fn vrf_sign(&self, transcript: Transcript) -> (VrfSignature, u128) {
		let (inout, proof, _) = self.0.vrf_sign(transcript);
		let signature = VrfSignature {
			pre_output: VrfPreOutput(inout.to_preout().to_bytes()),
			proof: VrfProofBytes(proof.to_bytes()),
		};
		(signature, score_of(&inout))
	}
}

impl Public {
	/// Verify a plain signature over `message`.
	pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
		let Ok(public) = PublicKey::from_bytes(&self.0) else { return false };
		let Ok(signature) = schnorrkel::Signature::from_bytes(&signature.0) else { return false };
		let context = schnorrkel::signing_context(SIGNING_CTX);
		public.verify(context.bytes(message), &signature).is_ok()
	}

	/// Verify a VRF signature over `transcript`, returning the lottery score
	/// bytes on success.
	pub fn vrf_verify(
		&self,
		transcript: Transcript,
		signature: &VrfSignature,
	) -> Result<u128, CryptoError> {
		let public =
			PublicKey::from_bytes(&self.0).map_err(|_| CryptoError::Malformed("sr25519 public"))?;
		let output = VRFPreOut::from_bytes(&signature.pre_output.0)
			.map_err(|_| CryptoError::Malformed("vrf pre-output"))?;
		let proof = VRFProof::from_bytes(&signature.proof.0)
			.map_err(|_| CryptoError::Malformed("vrf proof"))?;
		let (inout, _) = public
			.vrf_verify(transcript, &output, &proof)
			.map_err(|_| CryptoError::Malformed("vrf signature"))?;
		Ok(score_of(&inout))
	}
}

impl AsRef<[u8]> for Public {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

/// Squeeze 16 score bytes out of a VRF in-out pair, little-endian.
fn score_of(inout: &VRFInOut) -> u128 {
	u128::from_le_bytes(inout.make_bytes::<[u8; 16]>(SCORE_VRF_CTX))
}
