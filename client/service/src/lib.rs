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

//! Service assembly: wires storage, executor, consensus engines, pool and
//! sync into cooperating tasks with a shared shutdown signal.

pub mod builder;
pub mod genesis;
pub mod import;
pub mod tasks;

pub use builder::{Service, ServiceConfig};
pub use genesis::{genesis_header, initialize_genesis, GenesisConfig};
pub use import::import_state;
pub use tasks::TaskManager;

/// Log target of the service layer.
pub const LOG_TARGET: &str = "service";

/// Errors raised while assembling or bootstrapping the node.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	/// The supplied state snapshot does not match the header's state root.
	#[error("state snapshot root {computed} does not match header state root {declared}")]
	StateRootMismatch {
		/// The root declared by the header.
		declared: mp_runtime::Hash,
		/// The root computed over the snapshot.
		computed: mp_runtime::Hash,
	},

	/// The runtime blob failed to load.
	#[error(transparent)]
	Executor(#[from] mc_executor::Error),

	/// The runtime's consensus configuration was undecodable.
	#[error("malformed consensus configuration: {0}")]
	BadConfiguration(String),
}
