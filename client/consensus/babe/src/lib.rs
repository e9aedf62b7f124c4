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

//! BABE: slot-based block production.
//!
//! Authorities run a per-slot VRF lottery against the epoch's randomness;
//! a winning output below the weight-derived threshold entitles the
//! authority to author the slot's block (with an optional deterministic
//! secondary fallback). The worker builds and seals blocks; the verifier
//! checks incoming headers' claims and seals; epoch bookkeeping feeds both.

pub mod authorship;
pub mod epochs;
pub mod types;
pub mod verification;
pub mod worker;

pub use authorship::{claim_slot, primary_threshold, slot_transcript};
pub use epochs::EpochState;
pub use types::{
	Authority, BabeConfiguration, EpochData, NextEpochDescriptor, PreDigest, PrimaryPreDigest,
	SecondaryPreDigest, Slot,
};
pub use verification::BabeVerifier;
pub use worker::BabeWorker;

use mp_runtime::Hash;

/// Log target of the block production engine.
pub const LOG_TARGET: &str = "babe";

/// Errors of the lottery, verification and block assembly.
#[derive(Debug, thiserror::Error)]
pub enum BabeError {
	/// The header carries no (or an undecodable) BABE pre-digest.
	#[error("missing or malformed BABE pre-digest")]
	MissingPreDigest,

	/// The claimed authority index is outside the epoch's set.
	#[error("authority index {0} out of range for the epoch")]
	AuthorityOutOfRange(u32),

	/// The VRF proof did not verify against the claimed authority.
	#[error("invalid VRF proof in primary claim")]
	BadVrfProof,

	/// The VRF output does not clear the authority's threshold.
	#[error("VRF output does not meet the primary threshold")]
	ThresholdNotMet,

	/// A secondary claim arrived while the epoch forbids them.
	#[error("secondary slot claims are disabled")]
	SecondarySlotsDisabled,

	/// A secondary claim by an authority that is not the designated one.
	#[error("secondary claim by the wrong authority")]
	WrongSecondaryAuthor,

	/// The header has no seal digest.
	#[error("header is unsealed")]
	Unsealed,

	/// The seal signature did not verify.
	#[error("invalid seal signature")]
	BadSeal,

	/// The parent block's state is not in the store.
	#[error("parent state unavailable: {0}")]
	StateUnavailable(String),

	/// The runtime refused one of the block's inherents.
	#[error("inherent rejected by the runtime: {0}")]
	InherentRejected(String),

	/// The authoring key vanished from the keystore mid-build.
	#[error("authoring key disappeared from the keystore")]
	KeyDisappeared,

	/// The locally computed state root disagrees with the runtime's.
	#[error("state root mismatch: runtime declared {declared}, trie computed {computed}")]
	StateRootMismatch {
		/// The root in the finalised header.
		declared: Hash,
		/// The root computed from the folded trie.
		computed: Hash,
	},

	/// A better block arrived while this one was being built.
	#[error("chain advanced during the build")]
	StaleBuild,

	/// The runtime call layer failed.
	#[error(transparent)]
	Runtime(#[from] mc_executor::Error),
}
