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

//! The keystore interface the consensus engines and the runtime host use to
//! reach signing keys.
//!
//! The on-disk keystore (scrypt-wrapped JSON files) lives outside the engine;
//! in here is only the trait plus an in-memory implementation used by the
//! service wiring and by tests.

use crate::{
	crypto::{CryptoError, KeyTypeId},
	ed25519, sr25519,
};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// A handle to a keystore shared between services.
pub type KeystorePtr = Arc<dyn Keystore>;

/// Access to signing keys, grouped by [`KeyTypeId`].
pub trait Keystore: Send + Sync {
	/// Generate (or insert from `seed`) a new sr25519 key.
	fn sr25519_generate(
		&self,
		key_type: KeyTypeId,
		seed: Option<[u8; 32]>,
	) -> Result<sr25519::Public, CryptoError>;

	/// All sr25519 public keys stored under `key_type`.
	fn sr25519_public_keys(&self, key_type: KeyTypeId) -> Vec<sr25519::Public>;

	/// Sign `message` with the sr25519 key identified by `public`, if present.
	fn sr25519_sign(
		&self,
		key_type: KeyTypeId,
		public: &sr25519::Public,
		message: &[u8],
	) -> Option<sr25519::Signature>;

	/// Produce a VRF signature and lottery score with the sr25519 key
	/// identified by `public`, if present.
	fn sr25519_vrf_sign(
		&self,
		key_type: KeyTypeId,
		public: &sr25519::Public,
		transcript: sr25519::Transcript,
	) -> Option<(sr25519::VrfSignature, u128)>;

	/// Generate (or insert from `seed`) a new ed25519 key.
	fn ed25519_generate(
		&self,
		key_type: KeyTypeId,
		seed: Option<[u8; 32]>,
	) -> Result<ed25519::Public, CryptoError>;

	/// All ed25519 public keys stored under `key_type`.
	fn ed25519_public_keys(&self, key_type: KeyTypeId) -> Vec<ed25519::Public>;

	/// Sign `message` with the ed25519 key identified by `public`, if present.
	fn ed25519_sign(
		&self,
		key_type: KeyTypeId,
		public: &ed25519::Public,
		message: &[u8],
	) -> Option<ed25519::Signature>;
}

/// Keystore keeping all key material in memory.
#[derive(Default)]
pub struct MemoryKeystore {
	sr25519: RwLock<HashMap<(KeyTypeId, sr25519::Public), sr25519::Pair>>,
	ed25519: RwLock<HashMap<(KeyTypeId, ed25519::Public), ed25519::Pair>>,
}

impl MemoryKeystore {
	/// Create an empty keystore.
	pub fn new() -> Self {
		Self::default()
	}
}

impl Keystore for MemoryKeystore {
	fn sr25519_generate(
		&self,
		key_type: KeyTypeId,
		seed: Option<[u8; 32]>,
	) -> Result<sr25519::Public, CryptoError> {
		let pair = match seed {
			Some(seed) => sr25519::Pair::from_seed(&seed)?,
			None => sr25519::Pair::generate(),
		};
		let public = pair.public();
		self.sr25519.write().insert((key_type, public), pair);
		Ok(public)
	}

	fn sr25519_public_keys(&self, key_type: KeyTypeId) -> Vec<sr25519::Public> {
		self.sr25519
			.read()
			.keys()
			.filter(|(kt, _)| *kt == key_type)
			.map(|(_, public)| *public)
			.collect()
	}

	fn sr25519_sign(
		&self,
		key_type: KeyTypeId,
		public: &sr25519::Public,
		message: &[u8],
	) -> Option<sr25519::Signature> {
		self.sr25519.read().get(&(key_type, *public)).map(|pair| pair.sign(message))
	}

	fn sr25519_vrf_sign(
		&self,
		key_type: KeyTypeId,
		public: &sr25519::Public,
		transcript: sr25519::Transcript,
	) -> Option<(sr25519::VrfSignature, u128)> {
		self.sr25519
			.read()
			.get(&(key_type, *public))
			.map(|pair| pair.vrf_sign(transcript))
	}

	fn ed25519_generate(
		&self,
		key_type: KeyTypeId,
		seed: Option<[u8; 32]>,
	) -> Result<ed25519::Public, CryptoError> {
		let pair = match seed {
			Some(seed) => ed25519::Pair::from_seed(&seed),
			None => ed25519::Pair::generate(),
		};
		let public = pair.public();
		self.ed25519.write().insert((key_type, public), pair);
		Ok(public)
	}

	fn ed25519_public_keys(&self, key_type: KeyTypeId) -> Vec<ed25519::Public> {
		self.ed25519
			.read()
			.keys()
			.filter(|(kt, _)| *kt == key_type)
			.map(|(_, public)| *public)
			.collect()
	}

	fn ed25519_sign(
		&self,
		key_type: KeyTypeId,
		public: &ed25519::Public,
		message: &[u8],
	) -> Option<ed25519::Signature> {
		self.ed25519.read().get(&(key_type, *public)).map(|pair| pair.sign(message))
	}
}
