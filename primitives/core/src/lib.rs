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

//! Shareable Meridian types: hashes, key pairs, signatures and the keystore
//! interface used by the consensus engines.

pub mod crypto;
pub mod ecdsa;
pub mod ed25519;
pub mod hashing;
pub mod keystore;
pub mod sr25519;

pub use hashing::{blake2_128, blake2_256, keccak_256, sha2_256, twox_128, twox_256, twox_64};
pub use primitive_types::H256;

/// The block and trie hash type used throughout the node.
pub type Hash = H256;

/// Compute the Blake2b-256 hash of `data` as an [`H256`].
pub fn hash_of(data: &[u8]) -> Hash {
	H256(blake2_256(data))
}
