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

//! The block, header, digest and inherent types of the chain together with
//! their SCALE codecs.
//!
//! Everything in here is consensus-critical wire format: the encodings must
//! stay byte-stable.

pub mod digest;
pub mod header;
pub mod inherents;
pub mod transaction;

pub use digest::{ConsensusEngineId, Digest, DigestItem, BABE_ENGINE_ID, GRANDPA_ENGINE_ID};
pub use header::{Block, Header, OpaqueExtrinsic};
pub use inherents::{InherentData, InherentIdentifier};
pub use transaction::{
	ApplyExtrinsicResult, DispatchError, DispatchOutcome, InvalidTransaction, TransactionValidity,
	TransactionValidityError, UnknownTransaction, ValidTransaction,
};

use codec::{Decode, Encode};
use scale_info::TypeInfo;

/// Block hash type.
pub type Hash = mp_core::Hash;

/// Block number type.
pub type BlockNumber = u64;

/// An opaque, SCALE-encoded GRANDPA justification as carried on the wire and
/// in the database. The typed form lives with the finality gadget.
pub type EncodedJustification = Vec<u8>;

/// Version information of the loaded runtime, returned by `Core_version`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct RuntimeVersion {
	/// Name of the runtime specification.
	pub spec_name: String,
	/// Name of this concrete implementation.
	pub impl_name: String,
	/// Bumped when the authoring interface changes.
	pub authoring_version: u32,
	/// Bumped on any logic change that alters the state transition.
	pub spec_version: u32,
	/// Bumped on implementation-only changes.
	pub impl_version: u32,
	/// Supported runtime APIs: (blake2-64 of the trait name, version).
	pub apis: Vec<([u8; 8], u32)>,
	/// Bumped when the extrinsic format changes.
	pub transaction_version: u32,
}
