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

//! BABE wire and state types: slots, epoch data, pre-digests and the
//! runtime-provided genesis configuration.

use codec::{Decode, Encode};
use mp_core::sr25519;
use scale_info::TypeInfo;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A BABE authority: sr25519 public key and voting weight.
pub type Authority = (sr25519::Public, u64);

/// A time slot. The slot number is a global monotone counter;
/// `number × slot_duration` is its absolute start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
	/// The slot number.
	pub number: u64,
	/// Local instant at which the slot began.
	pub start: Instant,
	/// Slot length.
	pub duration: Duration,
}

impl Slot {
	/// The slot containing the current wall-clock time.
	pub fn current(slot_duration: Duration) -> Self {
		let now_millis = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.expect("the system clock is past the unix epoch; qed")
			.as_millis() as u64;
		let duration_millis = slot_duration.as_millis() as u64;
		let number = now_millis / duration_millis;
		let into_slot = Duration::from_millis(now_millis % duration_millis);
		Self {
			number,
			start: Instant::now() - into_slot,
			duration: slot_duration,
		}
	}

	/// When this slot's window closes.
	pub fn ends_at(&self) -> Instant {
		self.start + self.duration
	}

	/// Time left until the next slot begins.
	pub fn remaining(&self) -> Duration {
		self.ends_at().saturating_duration_since(Instant::now())
	}
}

/// The genesis BABE configuration, as returned by `BabeApi_configuration`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct BabeConfiguration {
	/// Slot duration in milliseconds.
	pub slot_duration: u64,
	/// Slots per epoch.
	pub epoch_length: u64,
	/// The lottery ratio `c` as a fraction: chance that a slot has at least
	/// one primary leader.
	pub c: (u64, u64),
	/// The genesis authority set.
	pub authorities: Vec<([u8; 32], u64)>,
	/// The genesis randomness.
	pub randomness: [u8; 32],
	/// Whether empty slots fall back to a secondary author.
	pub secondary_slots: bool,
}

/// The per-epoch data the lottery runs against.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct EpochData {
	/// The epoch index.
	pub epoch_index: u64,
	/// The authority set for this epoch, in declared order.
	pub authorities: Vec<Authority>,
	/// The epoch's VRF randomness.
	pub randomness: [u8; 32],
	/// The lottery ratio `c`.
	pub c: (u64, u64),
	/// Whether secondary slots are allowed.
	pub secondary_slots: bool,
}

impl EpochData {
	/// Total authority weight.
	pub fn total_weight(&self) -> u64 {
		self.authorities.iter().map(|(_, weight)| weight).sum()
	}
}

/// A runtime-emitted descriptor of the next epoch's authorities and
/// randomness, carried in a BABE consensus digest.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct NextEpochDescriptor {
	/// The next epoch's authority set.
	pub authorities: Vec<([u8; 32], u64)>,
	/// The next epoch's randomness.
	pub randomness: [u8; 32],
}

/// A primary slot claim: the authority won the VRF lottery.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct PrimaryPreDigest {
	/// Index into the epoch's authority list.
	pub authority_index: u32,
	/// The claimed slot.
	pub slot: u64,
	/// The VRF pre-output and proof over the slot transcript.
	pub vrf_signature: sr25519::VrfSignature,
}

/// A secondary slot claim: the deterministic fallback author.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SecondaryPreDigest {
	/// Index into the epoch's authority list.
	pub authority_index: u32,
	/// The claimed slot.
	pub slot: u64,
}

/// The author-supplied pre-runtime digest carrying the slot claim.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum PreDigest {
	/// VRF-backed claim.
	#[codec(index = 1)]
	Primary(PrimaryPreDigest),
	/// Round-robin fallback claim.
	#[codec(index = 2)]
	Secondary(SecondaryPreDigest),
}

impl PreDigest {
	/// The claimed slot number.
	pub fn slot(&self) -> u64 {
		match self {
			Self::Primary(primary) => primary.slot,
			Self::Secondary(secondary) => secondary.slot,
		}
	}

	/// The claiming authority's index.
	pub fn authority_index(&self) -> u32 {
		match self {
			Self::Primary(primary) => primary.authority_index,
			Self::Secondary(secondary) => secondary.authority_index,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn pre_digest_round_trips_with_fixed_indices() {
		let primary = PreDigest::Primary(PrimaryPreDigest {
			authority_index: 3,
			slot: 77,
			vrf_signature: sr25519::VrfSignature {
				pre_output: sr25519::VrfPreOutput([1; 32]),
				proof: sr25519::VrfProofBytes([2; 64]),
			},
		});
		let encoded = primary.encode();
		assert_eq!(encoded[0], 1);
		assert_eq!(PreDigest::decode(&mut &encoded[..]).unwrap(), primary);

		let secondary =
			PreDigest::Secondary(SecondaryPreDigest { authority_index: 0, slot: 78 });
		let encoded = secondary.encode();
		assert_eq!(encoded[0], 2);
		assert_eq!(PreDigest::decode(&mut &encoded[..]).unwrap(), secondary);
	}

	#[test]
	fn slots_have_contiguous_windows() {
		let duration = Duration::from_millis(3000);
		let slot = Slot::current(duration);
		assert!(slot.remaining() <= duration);
		assert_eq!(slot.ends_at(), slot.start + duration);
	}
}
