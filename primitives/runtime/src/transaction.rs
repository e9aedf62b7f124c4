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

//! Transaction validity and extrinsic application results, as decoded from
//! the runtime's return buffers.

use codec::{Decode, Encode};
use scale_info::TypeInfo;

/// A tag a transaction provides or requires; opaque to the node.
pub type TransactionTag = Vec<u8>;

/// Priority of a transaction in the pool: higher goes first.
pub type TransactionPriority = u64;

/// Number of blocks a validity verdict stays meaningful for.
pub type TransactionLongevity = u64;

/// The verdict of `TaggedTransactionQueue_validate_transaction` for a valid
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct ValidTransaction {
	/// Queueing priority among ready transactions.
	pub priority: TransactionPriority,
	/// Tags that must be provided before this transaction becomes ready.
	pub requires: Vec<TransactionTag>,
	/// Tags this transaction provides once included.
	pub provides: Vec<TransactionTag>,
	/// For how many blocks the verdict holds.
	pub longevity: TransactionLongevity,
	/// Whether the transaction should be gossiped.
	pub propagate: bool,
}

/// Rejection reasons that mean the transaction can never apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub enum InvalidTransaction {
	/// The call is not expected by the runtime.
	Call,
	/// Inability to pay fees.
	Payment,
	/// The transaction is not yet applicable, e.g. a future nonce.
	Future,
	/// The transaction is outdated, e.g. a reused nonce.
	Stale,
	/// Bad signature.
	BadProof,
	/// The birth block is ancient.
	AncientBirthBlock,
	/// Applying it would exhaust block resources; retry in a later block.
	ExhaustsResources,
	/// Runtime-specific reason.
	Custom(u8),
	/// A mandatory (inherent) dispatch failed; the block is invalid.
	BadMandatory,
	/// A non-inherent was dispatched as mandatory.
	MandatoryValidation,
}

/// Rejection reasons that may resolve later or elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub enum UnknownTransaction {
	/// Lookup of the sender failed.
	CannotLookup,
	/// No validator found for the unsigned transaction.
	NoUnsignedValidator,
	/// Runtime-specific reason.
	Custom(u8),
}

/// Why a transaction was refused by validation or application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub enum TransactionValidityError {
	/// The transaction is invalid and must be dropped.
	Invalid(InvalidTransaction),
	/// Validity cannot currently be determined.
	Unknown(UnknownTransaction),
}

impl TransactionValidityError {
	/// Whether the block builder should stop filling the current block and
	/// retry the extrinsic in the next one.
	pub fn exhausted_resources(&self) -> bool {
		matches!(self, Self::Invalid(InvalidTransaction::ExhaustsResources))
	}
}

/// The verdict of validating a transaction against some chain state.
pub type TransactionValidity = Result<ValidTransaction, TransactionValidityError>;

/// Why an extrinsic's dispatch failed inside the runtime. A failed dispatch
/// still occupies its place in the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub enum DispatchError {
	/// Unspecified failure.
	Other,
	/// Sender lookup failed.
	CannotLookup,
	/// The origin was not allowed to make the call.
	BadOrigin,
	/// A module-specific error.
	Module {
		/// The module index.
		index: u8,
		/// The module-local error code.
		error: u8,
	},
}

/// The outcome of dispatching an extrinsic that made it into the block.
pub type DispatchOutcome = Result<(), DispatchError>;

/// What `BlockBuilder_apply_extrinsic` returns: either the extrinsic was
/// included (possibly with a failed dispatch), or it was refused entirely.
pub type ApplyExtrinsicResult = Result<DispatchOutcome, TransactionValidityError>;

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn successful_application_is_two_zero_bytes() {
		let ok: ApplyExtrinsicResult = Ok(Ok(()));
		assert_eq!(ok.encode(), vec![0, 0]);
	}

	#[test]
	fn validity_round_trips() {
		let validity: TransactionValidity = Ok(ValidTransaction {
			priority: 5,
			requires: vec![vec![1]],
			provides: vec![vec![2]],
			longevity: 64,
			propagate: true,
		});
		assert_eq!(
			TransactionValidity::decode(&mut &validity.encode()[..]).unwrap(),
			validity,
		);
	}

	#[test]
	fn exhausted_resources_is_the_stop_signal() {
		assert!(TransactionValidityError::Invalid(InvalidTransaction::ExhaustsResources)
			.exhausted_resources());
		assert!(!TransactionValidityError::Invalid(InvalidTransaction::Stale).exhausted_resources());
	}
}
