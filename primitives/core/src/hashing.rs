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

//! Hashing functions exposed to the runtime and used by the trie and the
//! consensus engines.

use core::hash::Hasher as _;
use sha2::Digest as _;

/// Blake2b with a 256-bit output.
pub fn blake2_256(data: &[u8]) -> [u8; 32] {
	let mut out = [0u8; 32];
	let hash = blake2b_simd::Params::new().hash_length(32).hash(data);
	out.copy_from_slice(hash.as_bytes());
	out
}

/// Blake2b with a 128-bit output.
pub fn blake2_128(data: &[u8]) -> [u8; 16] {
	let mut out = [0u8; 16];
	let hash = blake2b_simd::Params::new().hash_length(16).hash(data);
	out.copy_from_slice(hash.as_bytes());
	out
}

/// Keccak-256.
pub fn keccak_256(data: &[u8]) -> [u8; 32] {
	use sha3::Digest as _;
	let mut out = [0u8; 32];
	out.copy_from_slice(sha3::Keccak256::digest(data).as_slice());
	out
}

/// SHA2-256.
pub fn sha2_256(data: &[u8]) -> [u8; 32] {
	let mut out = [0u8; 32];
	out.copy_from_slice(sha2::Sha256::digest(data).as_slice());
	out
}

/// XX hash with a 64-bit output, seed 0, little-endian.
pub fn twox_64(data: &[u8]) -> [u8; 8] {
	let mut hasher = twox_hash::XxHash64::with_seed(0);
	hasher.write(data);
	hasher.finish().to_le_bytes()
}

/// XX hash with a 128-bit output: two seeded 64-bit passes concatenated.
pub fn twox_128(data: &[u8]) -> [u8; 16] {
	let mut out = [0u8; 16];
	for seed in 0..2u64 {
		let mut hasher = twox_hash::XxHash64::with_seed(seed);
		hasher.write(data);
		let i = seed as usize * 8;
		out[i..i + 8].copy_from_slice(&hasher.finish().to_le_bytes());
	}
	out
}

/// XX hash with a 256-bit output: four seeded 64-bit passes concatenated.
pub fn twox_256(data: &[u8]) -> [u8; 32] {
	let mut out = [0u8; 32];
	for seed in 0..4u64 {
		let mut hasher = twox_hash::XxHash64::with_seed(seed);
		hasher.write(data);
		let i = seed as usize * 8;
		out[i..i + 8].copy_from_slice(&hasher.finish().to_le_bytes());
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn blake2_matches_known_vector() {
		// blake2b-256 of the empty input.
		assert_eq!(
			array_bytes::bytes2hex("", blake2_256(b"")),
			"0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8",
		);
	}

	#[test]
	fn twox_128_is_two_seeded_passes() {
		let out = twox_128(b"balances");
		assert_eq!(&out[..8], twox_64(b"balances"));
		assert_ne!(&out[..8], &out[8..]);
	}

	#[test]
	fn output_lengths() {
		assert_eq!(blake2_128(b"x").len(), 16);
		assert_eq!(keccak_256(b"x").len(), 32);
		assert_eq!(sha2_256(b"x").len(), 32);
		assert_eq!(twox_256(b"x").len(), 32);
	}
}
