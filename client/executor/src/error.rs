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

//! Executor errors. A failing runtime call is fatal for the block attempt
//! being worked on, never for the node.

/// Errors raised while loading or calling into the runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The blob failed to compile or instantiate.
	#[error("runtime instantiation failed: {0}")]
	Instantiation(String),

	/// The runtime does not export the called function; the blob is
	/// incompatible with this host.
	#[error("missing runtime export `{0}`")]
	MissingExport(String),

	/// The runtime trapped (or a host function returned an error, which
	/// unwinds the call the same way).
	#[error("runtime trapped: {0}")]
	Trap(String),

	/// The runtime heap allocator failed or was misused.
	#[error("allocator: {0}")]
	Allocator(&'static str),

	/// The linear memory cannot fit the allocation; the caller may grow the
	/// memory and retry.
	#[error("linear memory exhausted")]
	OutOfMemory,

	/// Guest memory access outside the linear memory.
	#[error("memory access: {0}")]
	Memory(&'static str),

	/// A host function received arguments it could not decode.
	#[error("malformed host call arguments: {0}")]
	BadArguments(#[from] codec::Error),

	/// The storage layer failed underneath a host function.
	#[error(transparent)]
	State(#[from] mp_state_machine::StateError),
}
