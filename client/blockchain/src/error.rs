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

//! Block import and finalisation errors.
//!
//! The variants carry the recovery policy: [`BlockImportError::UnknownParent`]
//! is transient (the block waits in the orphan buffer), the others mean the
//! block is invalid and its source earns a reputation penalty.

use mp_runtime::{BlockNumber, Hash};

/// Why a block failed to import.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BlockImportError {
	/// The parent is not in the tree yet; the block is parked in the
	/// orphan buffer and retried after further imports.
	#[error("unknown parent {parent} of block {hash}")]
	UnknownParent {
		/// The imported block's hash.
		hash: Hash,
		/// The missing parent's hash.
		parent: Hash,
	},

	/// The block is already in the tree.
	#[error("block {0} already imported")]
	AlreadyImported(Hash),

	/// The block number does not follow its parent's.
	#[error("block {hash} has number {number}, parent has {parent_number}")]
	NumberMismatch {
		/// The imported block's hash.
		hash: Hash,
		/// Its claimed number.
		number: BlockNumber,
		/// The parent's number.
		parent_number: BlockNumber,
	},

	/// The block is at or below the last finalised block but not on the
	/// finalised chain.
	#[error("block {0} is on a pruned fork below the finalised root")]
	BelowFinalized(Hash),

	/// The slot claim or seal did not verify.
	#[error("bad seal on block {hash}: {reason}")]
	BadSignature {
		/// The block's hash.
		hash: Hash,
		/// What the consensus verifier objected to.
		reason: String,
	},

	/// Re-executing the block produced a different state root.
	#[error("block {hash} declares state root {declared}, execution produced {computed}")]
	BadStateRoot {
		/// The block's hash.
		hash: Hash,
		/// The state root in the header.
		declared: Hash,
		/// The root obtained by executing the block.
		computed: Hash,
	},

	/// The runtime failed while executing the block.
	#[error("execution of block {hash} failed: {reason}")]
	ExecutionFailed {
		/// The block's hash.
		hash: Hash,
		/// The runtime error.
		reason: String,
	},
}

/// Why a finalisation request was rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FinalizeError {
	/// The target block is not in the tree.
	#[error("cannot finalise unknown block {0}")]
	UnknownBlock(Hash),

	/// The target is not a descendant of the finalised root; accepting it
	/// would revert finality.
	#[error("block {0} does not descend from the finalised root")]
	NotDescendant(Hash),

	/// The supplied justification did not verify.
	#[error("bad justification for block {0}")]
	BadJustification(Hash),
}

impl BlockImportError {
	/// Whether the source peer should be penalised for this failure.
	pub fn is_bad_block(&self) -> bool {
		!matches!(self, Self::UnknownParent { .. } | Self::AlreadyImported(_))
	}
}
