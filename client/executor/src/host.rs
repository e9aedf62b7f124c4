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

//! The capability bundle behind the host functions.
//!
//! [`HostContext`] carries everything a runtime call may touch: the storage
//! overlay, the keystore, and the offchain scratch state. The functions in
//! here implement the semantics of each `ext_*` import on plain byte
//! arguments; the WASM layer only marshals pointers.

use crate::error::Error;
use codec::{Compact, Decode, Encode};
use mp_core::{
	blake2_128, blake2_256,
	crypto::{dev_seed, KeyTypeId},
	ecdsa, ed25519,
	keystore::{Keystore, KeystorePtr},
	sha2_256, sr25519, twox_128, twox_256, twox_64, Hash,
};
use mp_state_machine::TrieState;
use mp_trie::{ordered_root, Trie};
use std::{
	collections::HashMap,
	time::{SystemTime, UNIX_EPOCH},
};

/// Log target of runtime-host plumbing.
pub const LOG_TARGET: &str = "executor";

/// Log target used for messages the runtime itself emits.
const RUNTIME_TARGET: &str = "runtime";

/// Offchain worker scratch state, local to the node.
#[derive(Debug, Default)]
pub struct OffchainState {
	/// Whether this node is an authority; reported to the runtime.
	pub is_validator: bool,
	/// The persistent offchain local storage.
	pub local_storage: HashMap<Vec<u8>, Vec<u8>>,
	/// Transactions the runtime submitted; drained into the pool after the
	/// call returns.
	pub submitted_transactions: Vec<Vec<u8>>,
	seed_nonce: u64,
}

/// Everything a single runtime invocation may reach.
pub struct HostContext {
	/// The storage overlay the call executes against.
	pub state: TrieState,
	/// Access to this node's signing keys.
	pub keystore: KeystorePtr,
	/// Offchain scratch state.
	pub offchain: OffchainState,
}

impl HostContext {
	/// Bundle the given state with the keystore, with fresh offchain state.
	pub fn new(state: TrieState, keystore: KeystorePtr) -> Self {
		Self { state, keystore, offchain: OffchainState::default() }
	}

	// ---- ext_storage_* ----

	/// `ext_storage_set_version_1`
	pub fn storage_set(&mut self, key: &[u8], value: &[u8]) {
		self.state.set_storage(key.to_vec(), value.to_vec());
	}

	/// `ext_storage_get_version_1`
	pub fn storage_get(&self, key: &[u8]) -> Option<Vec<u8>> {
		self.state.storage(key)
	}

	/// `ext_storage_read_version_1`: copy the value from `offset` into a
	/// buffer of at most `out_len` bytes; returns the bytes to write and
	/// the total remaining length.
	pub fn storage_read(
		&self,
		key: &[u8],
		offset: u32,
		out_len: u32,
	) -> Result<Option<Vec<u8>>, Error> {
		let mut chunk = match self.state.storage_read(key, offset)? {
			Some(chunk) => chunk,
			None => return Ok(None),
		};
		chunk.truncate(out_len as usize);
		Ok(Some(chunk))
	}

	/// `ext_storage_clear_version_1`
	pub fn storage_clear(&mut self, key: &[u8]) {
		self.state.clear_storage(key);
	}

	/// `ext_storage_exists_version_1`
	pub fn storage_exists(&self, key: &[u8]) -> bool {
		self.state.exists_storage(key)
	}

	/// `ext_storage_clear_prefix_version_1`
	pub fn storage_clear_prefix(&mut self, prefix: &[u8]) {
		self.state.clear_prefix(prefix);
	}

	/// `ext_storage_append_version_1`: append one SCALE-encoded element to
	/// the SCALE list stored under `key`.
	pub fn storage_append(&mut self, key: &[u8], element: Vec<u8>) {
		let value = match self.state.storage(key) {
			None => {
				let mut fresh = Compact(1u32).encode();
				fresh.extend_from_slice(&element);
				fresh
			},
			Some(current) => match append_scale_list(&current, &element) {
				Some(appended) => appended,
				None => {
					// Not a well-formed list: reset to a one-element list,
					// matching the reference host's compatibility behaviour.
					let mut fresh = Compact(1u32).encode();
					fresh.extend_from_slice(&element);
					fresh
				},
			},
		};
		self.state.set_storage(key.to_vec(), value);
	}

	/// `ext_storage_root_version_1`
	pub fn storage_root(&self) -> Hash {
		self.state.storage_root()
	}

	/// `ext_storage_next_key_version_1`
	pub fn storage_next_key(&self, key: &[u8]) -> Option<Vec<u8>> {
		self.state.next_storage_key(key)
	}

	/// `ext_storage_start_transaction_version_1`
	pub fn storage_start_transaction(&mut self) {
		self.state.start_transaction();
	}

	/// `ext_storage_commit_transaction_version_1`
	pub fn storage_commit_transaction(&mut self) -> Result<(), Error> {
		self.state
			.commit_transaction()
			.map_err(|_| Error::Trap("commit without an open storage transaction".into()))
	}

	/// `ext_storage_rollback_transaction_version_1`
	pub fn storage_rollback_transaction(&mut self) -> Result<(), Error> {
		self.state
			.rollback_transaction()
			.map_err(|_| Error::Trap("rollback without an open storage transaction".into()))
	}

	// ---- ext_default_child_storage_* ----

	/// `ext_default_child_storage_set_version_1`
	pub fn child_storage_set(&mut self, name: &[u8], key: &[u8], value: &[u8]) {
		self.state.set_child_storage(name, key.to_vec(), value.to_vec());
	}

	/// `ext_default_child_storage_get_version_1`
	pub fn child_storage_get(&self, name: &[u8], key: &[u8]) -> Option<Vec<u8>> {
		self.state.child_storage(name, key)
	}

	/// `ext_default_child_storage_read_version_1`
	pub fn child_storage_read(
		&self,
		name: &[u8],
		key: &[u8],
		offset: u32,
		out_len: u32,
	) -> Result<Option<Vec<u8>>, Error> {
		let mut chunk = match self.state.child_storage_read(name, key, offset)? {
			Some(chunk) => chunk,
			None => return Ok(None),
		};
		chunk.truncate(out_len as usize);
		Ok(Some(chunk))
	}

	/// `ext_default_child_storage_clear_version_1`
	pub fn child_storage_clear(&mut self, name: &[u8], key: &[u8]) {
		self.state.clear_child_storage(name, key);
	}

	/// `ext_default_child_storage_exists_version_1`
	pub fn child_storage_exists(&self, name: &[u8], key: &[u8]) -> bool {
		self.state.exists_child_storage(name, key)
	}

	/// `ext_default_child_storage_clear_prefix_version_1`
	pub fn child_storage_clear_prefix(&mut self, name: &[u8], prefix: &[u8]) {
		self.state.clear_child_prefix(name, prefix);
	}

	/// `ext_default_child_storage_root_version_1`
	pub fn child_storage_root(&self, name: &[u8]) -> Option<Hash> {
		self.state.child_storage_root(name)
	}

	/// `ext_default_child_storage_next_key_version_1`
	pub fn child_storage_next_key(&self, name: &[u8], key: &[u8]) -> Option<Vec<u8>> {
		self.state.next_child_storage_key(name, key)
	}

	/// `ext_default_child_storage_storage_kill_version_1`
	pub fn child_storage_kill(&mut self, name: &[u8]) {
		self.state.kill_child_storage(name);
	}

	// ---- ext_crypto_* ----

	/// `ext_crypto_ed25519_generate_version_1`. The optional seed is a
	/// `//`-style dev phrase.
	pub fn ed25519_generate(&self, key_type: KeyTypeId, seed: Option<Vec<u8>>) -> [u8; 32] {
		let seed = seed
			.and_then(|phrase| String::from_utf8(phrase).ok())
			.map(|phrase| dev_seed(&phrase));
		match self.keystore.ed25519_generate(key_type, seed) {
			Ok(public) => public.0,
			Err(error) => {
				log::warn!(target: LOG_TARGET, "ed25519 key generation failed: {error}");
				[0; 32]
			},
		}
	}

	/// `ext_crypto_ed25519_public_keys_version_1`
	pub fn ed25519_public_keys(&self, key_type: KeyTypeId) -> Vec<[u8; 32]> {
		self.keystore
			.ed25519_public_keys(key_type)
			.into_iter()
			.map(|public| public.0)
			.collect()
	}

	/// `ext_crypto_ed25519_sign_version_1`
	pub fn ed25519_sign(
		&self,
		key_type: KeyTypeId,
		public: &[u8; 32],
		message: &[u8],
	) -> Option<[u8; 64]> {
		self.keystore
			.ed25519_sign(key_type, &ed25519::Public(*public), message)
			.map(|signature| signature.0)
	}

	/// `ext_crypto_ed25519_verify_version_1`
	pub fn ed25519_verify(&self, signature: &[u8; 64], message: &[u8], public: &[u8; 32]) -> bool {
		ed25519::Public(*public).verify(message, &ed25519::Signature(*signature))
	}

	/// `ext_crypto_sr25519_generate_version_1`
	pub fn sr25519_generate(&self, key_type: KeyTypeId, seed: Option<Vec<u8>>) -> [u8; 32] {
		let seed = seed
			.and_then(|phrase| String::from_utf8(phrase).ok())
			.map(|phrase| dev_seed(&phrase));
		match self.keystore.sr25519_generate(key_type, seed) {
			Ok(public) => public.0,
			Err(error) => {
				log::warn!(target: LOG_TARGET, "sr25519 key generation failed: {error}");
				[0; 32]
			},
		}
	}

	/// `ext_crypto_sr25519_public_keys_version_1`
	pub fn sr25519_public_keys(&self, key_type: KeyTypeId) -> Vec<[u8; 32]> {
		self.keystore
			.sr25519_public_keys(key_type)
			.into_iter()
			.map(|public| public.0)
			.collect()
	}

	/// `ext_crypto_sr25519_sign_version_1`
	pub fn sr25519_sign(
		&self,
		key_type: KeyTypeId,
		public: &[u8; 32],
		message: &[u8],
	) -> Option<[u8; 64]> {
		self.keystore
			.sr25519_sign(key_type, &sr25519::Public(*public), message)
			.map(|signature| signature.0)
	}

	/// `ext_crypto_sr25519_verify_version_1`
	pub fn sr25519_verify(&self, signature: &[u8; 64], message: &[u8], public: &[u8; 32]) -> bool {
		sr25519::Public(*public).verify(message, &sr25519::Signature(*signature))
	}

	/// `ext_crypto_secp256k1_ecdsa_recover_version_1`
	pub fn secp256k1_ecdsa_recover(
		&self,
		signature: &[u8; 65],
		message: &[u8; 32],
	) -> Result<[u8; 64], ecdsa::EcdsaVerifyError> {
		ecdsa::secp256k1_ecdsa_recover(signature, message)
	}

	/// `ext_crypto_secp256k1_ecdsa_recover_compressed_version_1`
	pub fn secp256k1_ecdsa_recover_compressed(
		&self,
		signature: &[u8; 65],
		message: &[u8; 32],
	) -> Result<[u8; 33], ecdsa::EcdsaVerifyError> {
		ecdsa::secp256k1_ecdsa_recover_compressed(signature, message)
	}

	// ---- ext_hashing_* ----

	/// `ext_hashing_blake2_128_version_1`
	pub fn hashing_blake2_128(&self, data: &[u8]) -> [u8; 16] {
		blake2_128(data)
	}

	/// `ext_hashing_blake2_256_version_1`
	pub fn hashing_blake2_256(&self, data: &[u8]) -> [u8; 32] {
		blake2_256(data)
	}

	/// `ext_hashing_keccak_256_version_1`
	pub fn hashing_keccak_256(&self, data: &[u8]) -> [u8; 32] {
		mp_core::keccak_256(data)
	}

	/// `ext_hashing_sha2_256_version_1`
	pub fn hashing_sha2_256(&self, data: &[u8]) -> [u8; 32] {
		sha2_256(data)
	}

	/// `ext_hashing_twox_64_version_1`
	pub fn hashing_twox_64(&self, data: &[u8]) -> [u8; 8] {
		twox_64(data)
	}

	/// `ext_hashing_twox_128_version_1`
	pub fn hashing_twox_128(&self, data: &[u8]) -> [u8; 16] {
		twox_128(data)
	}

	/// `ext_hashing_twox_256_version_1`
	pub fn hashing_twox_256(&self, data: &[u8]) -> [u8; 32] {
		twox_256(data)
	}

	// ---- ext_trie_* ----

	/// `ext_trie_blake2_256_root_version_1`
	pub fn trie_root(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Hash {
		Trie::from_pairs(pairs).root()
	}

	/// `ext_trie_blake2_256_ordered_root_version_1`
	pub fn trie_ordered_root(&self, items: Vec<Vec<u8>>) -> Hash {
		ordered_root(&items)
	}

	// ---- ext_offchain_* ----

	/// `ext_offchain_is_validator_version_1`
	pub fn offchain_is_validator(&self) -> bool {
		self.offchain.is_validator
	}

	/// `ext_offchain_random_seed_version_1`
	pub fn offchain_random_seed(&mut self) -> [u8; 32] {
		self.offchain.seed_nonce += 1;
		let mut material = self.offchain.seed_nonce.to_le_bytes().to_vec();
		material.extend_from_slice(&self.offchain_timestamp().to_le_bytes());
		blake2_256(&material)
	}

	/// `ext_offchain_timestamp_version_1`: unix time in milliseconds.
	pub fn offchain_timestamp(&self) -> u64 {
		SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|elapsed| elapsed.as_millis() as u64)
			.unwrap_or(0)
	}

	/// `ext_offchain_sleep_until_version_1`
	pub fn offchain_sleep_until(&self, deadline: u64) {
		let now = self.offchain_timestamp();
		if deadline > now {
			std::thread::sleep(std::time::Duration::from_millis(deadline - now));
		}
	}

	/// `ext_offchain_local_storage_set_version_1`
	pub fn offchain_local_storage_set(&mut self, key: &[u8], value: &[u8]) {
		self.offchain.local_storage.insert(key.to_vec(), value.to_vec());
	}

	/// `ext_offchain_local_storage_get_version_1`
	pub fn offchain_local_storage_get(&self, key: &[u8]) -> Option<Vec<u8>> {
		self.offchain.local_storage.get(key).cloned()
	}

	/// `ext_offchain_local_storage_compare_and_set_version_1`
	pub fn offchain_local_storage_compare_and_set(
		&mut self,
		key: &[u8],
		old_value: Option<Vec<u8>>,
		new_value: &[u8],
	) -> bool {
		let current = self.offchain.local_storage.get(key).cloned();
		if current == old_value {
			self.offchain.local_storage.insert(key.to_vec(), new_value.to_vec());
			true
		} else {
			false
		}
	}

	/// `ext_offchain_submit_transaction_version_1`
	pub fn offchain_submit_transaction(&mut self, extrinsic: Vec<u8>) -> bool {
		self.offchain.submitted_transactions.push(extrinsic);
		true
	}

	// ---- ext_misc_* / ext_logging_* ----

	/// `ext_misc_print_utf8_version_1`
	pub fn misc_print_utf8(&self, data: &[u8]) {
		if let Ok(message) = std::str::from_utf8(data) {
			log::info!(target: RUNTIME_TARGET, "{message}");
		}
	}

	/// `ext_misc_print_hex_version_1`
	pub fn misc_print_hex(&self, data: &[u8]) {
		log::info!(target: RUNTIME_TARGET, "0x{}", hex_string(data));
	}

	/// `ext_misc_print_num_version_1`
	pub fn misc_print_num(&self, value: u64) {
		log::info!(target: RUNTIME_TARGET, "{value}");
	}

	/// `ext_logging_log_version_1`
	pub fn logging_log(&self, level: u32, target: &[u8], message: &[u8]) {
		let level = match level {
			0 => log::Level::Error,
			1 => log::Level::Warn,
			2 => log::Level::Info,
			3 => log::Level::Debug,
			_ => log::Level::Trace,
		};
		let target = std::str::from_utf8(target).unwrap_or(RUNTIME_TARGET);
		let message = String::from_utf8_lossy(message);
		log::log!(target: "runtime", level, "{target}: {message}");
	}
}

/// Append one pre-encoded element to a compact-length SCALE list. Returns
/// `None` if the current value does not start with a valid compact length.
fn append_scale_list(current: &[u8], element: &[u8]) -> Option<Vec<u8>> {
	let mut input = current;
	let length = Compact::<u32>::decode(&mut input).ok()?;
	let mut out = Compact(length.0.checked_add(1)?).encode();
	out.extend_from_slice(input);
	out.extend_from_slice(element);
	Some(out)
}

fn hex_string(data: &[u8]) -> String {
	data.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use mp_core::keystore::{Keystore, MemoryKeystore};
	use pretty_assertions::assert_eq;
	use std::sync::Arc;

	fn context() -> HostContext {
		HostContext::new(TrieState::default(), Arc::new(MemoryKeystore::new()))
	}

	#[test]
	fn hashing_blake2_256_matches_direct_call() {
		// SCALE-encoding "helloworld" as passed by the runtime adds a length
		// prefix; the host hashes the raw payload it is handed.
		let payload = b"helloworld";
		assert_eq!(context().hashing_blake2_256(payload), blake2_256(payload));
	}

	#[test]
	fn storage_set_then_get_returns_the_value() {
		let mut context = context();
		context.storage_set(b"key", b"value");
		assert_eq!(context.storage_get(b"key"), Some(b"value".to_vec()));
		assert!(context.storage_exists(b"key"));
	}

	#[test]
	fn clear_prefix_removes_only_matching_keys() {
		let mut context = context();
		context.storage_set(b"prefix:a", b"1");
		context.storage_set(b"prefix:b", b"2");
		context.storage_set(b"other", b"3");
		context.storage_clear_prefix(b"prefix:");
		assert_eq!(context.storage_get(b"prefix:a"), None);
		assert_eq!(context.storage_get(b"prefix:b"), None);
		assert_eq!(context.storage_get(b"other"), Some(b"3".to_vec()));
	}

	#[test]
	fn storage_read_clamps_to_buffer_and_offset() {
		let mut context = context();
		context.storage_set(b"key", b"abcdef");
		assert_eq!(context.storage_read(b"key", 2, 3).unwrap(), Some(b"cde".to_vec()));
		assert_eq!(context.storage_read(b"key", 0, 100).unwrap(), Some(b"abcdef".to_vec()));
		assert!(context.storage_read(b"key", 7, 1).is_err());
		assert_eq!(context.storage_read(b"absent", 0, 8).unwrap(), None);
	}

	#[test]
	fn storage_append_builds_a_scale_list() {
		let mut context = context();
		context.storage_append(b"list", 7u32.encode());
		context.storage_append(b"list", 8u32.encode());
		let stored = context.storage_get(b"list").unwrap();
		assert_eq!(Vec::<u32>::decode(&mut &stored[..]).unwrap(), vec![7, 8]);
	}

	#[test]
	fn transactions_roll_back_storage() {
		let mut context = context();
		context.storage_start_transaction();
		context.storage_set(b"key", b"temp");
		context.storage_rollback_transaction().unwrap();
		assert_eq!(context.storage_get(b"key"), None);
		assert!(context.storage_commit_transaction().is_err());
	}

	#[test]
	fn child_storage_is_isolated_from_top() {
		let mut context = context();
		context.child_storage_set(b"assets", b"key", b"child");
		context.storage_set(b"key", b"top");
		assert_eq!(context.child_storage_get(b"assets", b"key"), Some(b"child".to_vec()));
		assert_eq!(context.storage_get(b"key"), Some(b"top".to_vec()));
		context.child_storage_kill(b"assets");
		assert_eq!(context.child_storage_get(b"assets", b"key"), None);
	}

	#[test]
	fn sr25519_sign_and_verify_through_keystore() {
		let context = context();
		let public = context.sr25519_generate(KeyTypeId::BABE, Some(b"//Alice".to_vec()));
		let signature = context.sr25519_sign(KeyTypeId::BABE, &public, b"msg").unwrap();
		assert!(context.sr25519_verify(&signature, b"msg", &public));
		assert!(!context.sr25519_verify(&signature, b"other", &public));
	}

	#[test]
	fn generated_keys_land_in_the_keystore() {
		let keystore = Arc::new(MemoryKeystore::new());
		let context = HostContext::new(TrieState::default(), keystore.clone());
		context.ed25519_generate(KeyTypeId::GRANDPA, None);
		assert_eq!(keystore.ed25519_public_keys(KeyTypeId::GRANDPA).len(), 1);
	}

	#[test]
	fn trie_root_host_function_matches_trie() {
		let context = context();
		let pairs = vec![(b"a".to_vec(), vec![1]), (b"b".to_vec(), vec![2])];
		assert_eq!(context.trie_root(pairs.clone()), Trie::from_pairs(pairs).root());
	}

	#[test]
	fn compare_and_set_is_atomic_on_expectation() {
		let mut context = context();
		assert!(context.offchain_local_storage_compare_and_set(b"k", None, b"v1"));
		assert!(!context.offchain_local_storage_compare_and_set(b"k", None, b"v2"));
		assert!(context.offchain_local_storage_compare_and_set(
			b"k",
			Some(b"v1".to_vec()),
			b"v2",
		));
		assert_eq!(context.offchain_local_storage_get(b"k"), Some(b"v2".to_vec()));
	}

	#[test]
	fn submitted_transactions_are_collected() {
		let mut context = context();
		assert!(context.offchain_submit_transaction(vec![1, 2, 3]));
		assert_eq!(context.offchain.submitted_transactions, vec![vec![1, 2, 3]]);
	}
}
