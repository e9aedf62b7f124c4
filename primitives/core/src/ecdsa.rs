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

//! ECDSA (secp256k1) public key recovery, exposed to the runtime through
//! the `ext_crypto_secp256k1_ecdsa_recover` host functions.

use secp256k1::{
	ecdsa::{RecoverableSignature, RecoveryId},
	Message, Secp256k1,
};

/// Error variants mirrored to the runtime on a failed recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, codec::Encode, codec::Decode)]
pub enum EcdsaVerifyError {
	/// Incorrect value of R or S.
	BadRS,
	/// Incorrect recovery id.
	BadV,
	/// Invalid signature.
	BadSignature,
}

/// Recover the uncompressed 64-byte public key from a 65-byte recoverable
/// signature over a 32-byte message hash.
pub fn secp256k1_ecdsa_recover(
	signature: &[u8; 65],
	message: &[u8; 32],
) -> Result<[u8; 64], EcdsaVerifyError> {
	let recovery_id =
		RecoveryId::from_i32(signature[64] as i32).map_err(|_| EcdsaVerifyError::BadV)?;
	let signature = RecoverableSignature::from_compact(&signature[..64], recovery_id)
		.map_err(|_| EcdsaVerifyError::BadRS)?;
	let public = Secp256k1::verification_only()
		.recover_ecdsa(&Message::from_digest(*message), &signature)
		.map_err(|_| EcdsaVerifyError::BadSignature)?;
	let mut out = [0u8; 64];
	out.copy_from_slice(&public.serialize_uncompressed()[1..]);
	Ok(out)
}

/// Recover the compressed 33-byte public key from a 65-byte recoverable
/// signature over a 32-byte message hash.
pub fn secp256k1_ecdsa_recover_compressed(
	signature: &[u8; 65],
	message: &[u8; 32],
) -> Result<[u8; 33], EcdsaVerifyError> {
	let recovery_id =
		RecoveryId::from_i32(signature[64] as i32).map_err(|_| EcdsaVerifyError::BadV)?;
	let signature = RecoverableSignature::from_compact(&signature[..64], recovery_id)
		.map_err(|_| EcdsaVerifyError::BadRS)?;
	let public = Secp256k1::verification_only()
		.recover_ecdsa(&Message::from_digest(*message), &signature)
		.map_err(|_| EcdsaVerifyError::BadSignature)?;
	Ok(public.serialize())
}

#[cfg(test)]
mod tests {
	use super::*;
	use secp256k1::SecretKey;

	fn signed(message: &[u8; 32]) -> ([u8; 65], [u8; 64]) {
		let secp = Secp256k1::new();
		let secret = SecretKey::from_slice(&[0x42; 32]).unwrap();
		let public = secret.public_key(&secp);
		let recoverable = secp.sign_ecdsa_recoverable(&Message::from_digest(*message), &secret);
		let (recovery_id, compact) = recoverable.serialize_compact();
		let mut signature = [0u8; 65];
		signature[..64].copy_from_slice(&compact);
		signature[64] = recovery_id.to_i32() as u8;
		let mut expected = [0u8; 64];
		expected.copy_from_slice(&public.serialize_uncompressed()[1..]);
		(signature, expected)
	}

	#[test]
	fn recovers_signer() {
		let message = crate::hashing::blake2_256(b"payload");
		let (signature, expected) = signed(&message);
		assert_eq!(secp256k1_ecdsa_recover(&signature, &message).unwrap(), expected);
	}

	#[test]
	fn bad_recovery_id_rejected() {
		let message = crate::hashing::blake2_256(b"payload");
		let (mut signature, _) = signed(&message);
		signature[64] = 9;
		assert_eq!(
			secp256k1_ecdsa_recover(&signature, &message),
			Err(EcdsaVerifyError::BadV),
		);
	}
}
