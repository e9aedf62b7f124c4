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

//! Typed wrappers over the runtime's exported calls.
//!
//! Each wrapper SCALE-encodes its arguments, runs the export through the
//! instance pool against the given state, and decodes the return buffer.
//! Consensus-specific payloads (`BabeApi_configuration`,
//! `GrandpaApi_grandpa_authorities`) are returned raw; the owning engine
//! decodes them.

use crate::{error::Error, host::HostContext, wasm::WasmRuntime};
use codec::{Decode, Encode};
use mp_core::keystore::KeystorePtr;
use mp_runtime::{
	ApplyExtrinsicResult, Block, Header, InherentData, RuntimeVersion, TransactionValidity,
};
use mp_state_machine::TrieState;
use std::sync::Arc;

/// The outcome of one runtime call: the decoded-by-caller return buffer,
/// the mutated state and any offchain-submitted extrinsics.
pub struct CallOutput {
	/// The raw SCALE return buffer.
	pub return_data: Vec<u8>,
	/// The state including the call's storage writes.
	pub state: TrieState,
	/// Extrinsics the runtime submitted through the offchain interface,
	/// destined for the transaction pool.
	pub submitted: Vec<Vec<u8>>,
}

/// Handle for invoking runtime APIs against chain state.
#[derive(Clone)]
pub struct RuntimeApi {
	runtime: Arc<WasmRuntime>,
	keystore: KeystorePtr,
	is_validator: bool,
}

impl RuntimeApi {
	/// Wrap a compiled runtime.
	pub fn new(runtime: Arc<WasmRuntime>, keystore: KeystorePtr, is_validator: bool) -> Self {
		Self { runtime, keystore, is_validator }
	}

	/// Run `method` against `state` with pre-encoded `args`.
	pub fn call_raw(
		&self,
		state: TrieState,
		method: &str,
		args: &[u8],
	) -> Result<CallOutput, Error> {
		let mut context = HostContext::new(state, self.keystore.clone());
		context.offchain.is_validator = self.is_validator;
		context.state.enter_runtime();
		let (result, mut context) = self.runtime.call(context, method, args);
		context.state.exit_runtime();
		let return_data = result?;
		Ok(CallOutput {
			return_data,
			state: context.state,
			submitted: std::mem::take(&mut context.offchain.submitted_transactions),
		})
	}

	/// `Core_version`
	pub fn version(&self, state: &TrieState) -> Result<RuntimeVersion, Error> {
		let output = self.call_raw(state.clone(), "Core_version", &[])?;
		Ok(RuntimeVersion::decode(&mut &output.return_data[..])?)
	}

	/// `Core_initialize_block`
	pub fn initialize_block(&self, state: TrieState, header: &Header) -> Result<TrieState, Error> {
		let output = self.call_raw(state, "Core_initialize_block", &header.encode())?;
		Ok(output.state)
	}

	/// `Core_execute_block`. The caller strips the seal digest beforehand;
	/// the returned state carries the block's storage changes.
	pub fn execute_block(&self, state: TrieState, block: &Block) -> Result<TrieState, Error> {
		let output = self.call_raw(state, "Core_execute_block", &block.encode())?;
		Ok(output.state)
	}

	/// `BlockBuilder_inherent_extrinsics`
	pub fn inherent_extrinsics(
		&self,
		state: TrieState,
		data: &InherentData,
	) -> Result<(Vec<Vec<u8>>, TrieState), Error> {
		let output = self.call_raw(state, "BlockBuilder_inherent_extrinsics", &data.encode())?;
		let extrinsics = Vec::<Vec<u8>>::decode(&mut &output.return_data[..])?;
		Ok((extrinsics, output.state))
	}

	/// `BlockBuilder_apply_extrinsic`
	pub fn apply_extrinsic(
		&self,
		state: TrieState,
		extrinsic: &[u8],
	) -> Result<(ApplyExtrinsicResult, TrieState), Error> {
		let output = self.call_raw(state, "BlockBuilder_apply_extrinsic", extrinsic)?;
		let result = ApplyExtrinsicResult::decode(&mut &output.return_data[..])?;
		Ok((result, output.state))
	}

	/// `BlockBuilder_finalize_block`
	pub fn finalize_block(&self, state: TrieState) -> Result<(Header, TrieState), Error> {
		let output = self.call_raw(state, "BlockBuilder_finalize_block", &[])?;
		let header = Header::decode(&mut &output.return_data[..])?;
		Ok((header, output.state))
	}

	/// `BlockBuilder_check_inherents`
	pub fn check_inherents(
		&self,
		state: TrieState,
		block: &Block,
		data: &InherentData,
	) -> Result<CheckInherentsResult, Error> {
		let args = (block, data).encode();
		let output = self.call_raw(state, "BlockBuilder_check_inherents", &args)?;
		Ok(CheckInherentsResult::decode(&mut &output.return_data[..])?)
	}

	/// `TaggedTransactionQueue_validate_transaction`
	pub fn validate_transaction(
		&self,
		state: &TrieState,
		extrinsic: &[u8],
	) -> Result<TransactionValidity, Error> {
		let output =
			self.call_raw(state.clone(), "TaggedTransactionQueue_validate_transaction", extrinsic)?;
		Ok(TransactionValidity::decode(&mut &output.return_data[..])?)
	}

	/// `BabeApi_configuration`, raw payload.
	pub fn babe_configuration_raw(&self, state: &TrieState) -> Result<Vec<u8>, Error> {
		Ok(self.call_raw(state.clone(), "BabeApi_configuration", &[])?.return_data)
	}

	/// `GrandpaApi_grandpa_authorities`, raw payload.
	pub fn grandpa_authorities_raw(&self, state: &TrieState) -> Result<Vec<u8>, Error> {
		Ok(self.call_raw(state.clone(), "GrandpaApi_grandpa_authorities", &[])?.return_data)
	}

	/// `AuthorityDiscoveryApi_authorities`, raw payload.
	pub fn authority_discovery_authorities_raw(&self, state: &TrieState) -> Result<Vec<u8>, Error> {
		Ok(self.call_raw(state.clone(), "AuthorityDiscoveryApi_authorities", &[])?.return_data)
	}
}

/// The runtime's verdict on a block's inherents.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct CheckInherentsResult {
	/// Whether all inherents were accepted.
	pub okay: bool,
	/// Whether an error was unrecoverable for the block.
	pub fatal_error: bool,
	/// Per-inherent error payloads.
	pub errors: InherentData,
}
