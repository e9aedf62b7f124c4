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

//! Cryptographic utilities shared by the concrete schemes.

use codec::{Decode, Encode};
use scale_info::TypeInfo;

/// An identifier for a specific cryptographic key kept in the keystore.
///
/// The consensus engines each look up their authority keys under a fixed
/// key type.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, TypeInfo,
)]
pub struct KeyTypeId(pub [u8; 4]);

impl KeyTypeId {
	/// Key type for BABE authority keys (sr25519).
	pub const BABE: KeyTypeId = KeyTypeId(*b"babe");
	/// Key type for GRANDPA authority keys (ed25519).
	pub const GRANDPA: KeyTypeId = KeyTypeId(*b"gran");
}

/// Error when working with key material.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
	/// The byte slice had the wrong length for the scheme.
	#[error("invalid {0} length: got {1} bytes")]
	InvalidLength(&'static str, usize),
	/// The bytes were the right length but not a valid key/signature.
	#[error("malformed {0}")]
	Malformed(&'static str),
	/// A seed phrase could not be turned into key material.
	#[error("invalid seed")]
	InvalidSeed,
}

/// Derive a 32-byte seed from a `//`-style dev phrase such as `"//Alice"`.
///
/// This is a development convenience only: the phrase is hashed, it is not a
/// BIP39 derivation.
pub fn dev_seed(phrase: &str) -> [u8; 32] {
	crate::hashing::blake2_256(phrase.as_bytes())
}
