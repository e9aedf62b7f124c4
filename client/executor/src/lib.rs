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

//! The WASM runtime host.
//!
//! Loads a runtime blob, exposes the `ext_*` host function surface to it,
//! and dispatches the exported runtime calls (`Core_*`, `BlockBuilder_*`,
//! `TaggedTransactionQueue_*`, `BabeApi_*`, `GrandpaApi_*`) against a
//! [`mp_state_machine::TrieState`]. Runtime instances are single-threaded
//! and pooled; a caller holds one exclusively for the duration of a call.

pub mod allocator;
pub mod api;
pub mod error;
pub mod host;
pub mod wasm;

pub use api::{CallOutput, CheckInherentsResult, RuntimeApi};
pub use allocator::{FreeingBumpHeapAllocator, Memory};
pub use error::Error;
pub use host::{HostContext, OffchainState};
pub use wasm::WasmRuntime;

/// Log target of the executor.
pub const LOG_TARGET: &str = "executor";
