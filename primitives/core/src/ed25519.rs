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

//! Simple ed25519 API, used for GRANDPA authority keys.

use crate::crypto::CryptoError;
use codec::{Decode, Encode};
use ed25519_zebra::{SigningKey, VerificationKey};
use scale_info::TypeInfo;

/// An ed25519 public key.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, TypeInfo,
)]
pub struct Public(pub [u8; 32]);

/// An ed25519 signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct Signature(pub [u8; 64]);

/// An ed25519 key pair.
#[derive(Clone)]
pub struct Pair(SigningKey);

impl Pair {
	/// Derive a pair from a 32-byte seed.
	pub fn from_seed(seed: &[u8; 32]) -> Self {
		Self(SigningKey::from(*seed))
	}

	/// Generate a fresh random pair.
	pub fn generate() -> Self {
		Self(SigningKey::new(rand::rngs::OsRng))
	}

	/// The public half of the pair.
	pub fn public(&self) -> Public {
		let verification: VerificationKey = (&self.0).into();
		Public(verification.into())
	}

	/// Sign a message.
	pub fn sign(&self, message: &[u8]) -> Signature {
		Signature(self.0.sign(message).into())
	}
}

impl Public {
	/// Verify a signature over `message`.
	pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
		let Ok(verification) = VerificationKey::try_from(self.0) else { return false };
		verification
			.verify(&ed25519_zebra::Signature::from(signature.0), message)
			.is_ok()
	}

	/// Parse a public key from a byte slice.
	pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
		let bytes: [u8; 32] =
			data.try_into().map_err(|_| CryptoError::InvalidLength("ed25519 public", data.len()))?;
		Ok(Self(bytes))
	}
}

impl AsRef<[u8]> for Public {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::crypto::dev_seed;

	#[test]
	fn sign_and_verify() {
		let pair = Pair::from_seed(&dev_seed("//Alice"));
		let signature = pair.sign(b"finality vote");
		assert!(pair.public().verify(b"finality vote", &signature));
		assert!(!pair.public().verify(b"another vote", &signature));
	}

	#[test]
	fn wrong_key_rejected() {
		let alice = Pair::from_seed(&dev_seed("//Alice"));
		let bob = Pair::from_seed(&dev_seed("//Bob"));
		let signature = alice.sign(b"finality vote");
		assert!(!bob.public().verify(b"finality vote", &signature));
	}
}
