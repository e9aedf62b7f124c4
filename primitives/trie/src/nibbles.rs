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

//! Nibble (half-byte) key handling for the radix-16 trie.
//!
//! Keys are expanded high nibble first, so `0xF1 0x02` becomes
//! `[0xF, 0x1, 0x0, 0x2]`. Keys that originate from byte strings always
//! have an even nibble count; odd counts only appear in partial keys after
//! prefix splits.

/// Expand a byte key into nibbles, high nibble first.
pub fn bytes_to_nibbles(key: &[u8]) -> Vec<u8> {
	let mut nibbles = Vec::with_capacity(key.len() * 2);
	for byte in key {
		nibbles.push(byte >> 4);
		nibbles.push(byte & 0x0f);
	}
	nibbles
}

/// Collapse nibbles back into bytes. The nibble count must be even.
pub fn nibbles_to_bytes(nibbles: &[u8]) -> Vec<u8> {
	debug_assert!(nibbles.len() % 2 == 0, "byte keys have an even nibble count");
	nibbles.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect()
}

/// Pack a partial key into bytes for node encoding. For an odd count the
/// first output byte carries only the first nibble, in its low half; the
/// stored nibble count disambiguates on decode.
pub fn pack_partial(nibbles: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);
	let mut rest = nibbles;
	if rest.len() % 2 == 1 {
		out.push(rest[0]);
		rest = &rest[1..];
	}
	for pair in rest.chunks(2) {
		out.push((pair[0] << 4) | pair[1]);
	}
	out
}

/// Unpack `count` nibbles from bytes written by [`pack_partial`].
pub fn unpack_partial(data: &[u8], count: usize) -> Vec<u8> {
	let mut out = Vec::with_capacity(count);
	let mut data = data;
	if count % 2 == 1 {
		out.push(data[0] & 0x0f);
		data = &data[1..];
	}
	for byte in data {
		out.push(byte >> 4);
		out.push(byte & 0x0f);
	}
	out.truncate(count);
	out
}

/// Length of the longest common prefix of two nibble slices.
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
	a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
