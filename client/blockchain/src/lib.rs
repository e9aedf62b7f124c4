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

//! Block tree, block state and the block import pipeline.
//!
//! The tree tracks every unfinalised fork with arrival timestamps and
//! serves fork choice; the block state persists headers, bodies and
//! justifications and fans out import/finality notifications; the importer
//! runs structural, consensus and (optionally) execution checks before a
//! block enters the tree.

pub mod database;
pub mod error;
pub mod import;
pub mod state;
pub mod tree;

pub use database::{Column, Database, DatabasePtr, MemoryDb};
pub use error::{BlockImportError, FinalizeError};
pub use import::{AcceptAll, BlockExecutor, BlockImporter, ConsensusVerifier};
pub use state::{BlockOrigin, BlockState, FinalityNotification, ImportNotification};
pub use tree::BlockTree;

/// Log target of tree and import code.
pub const LOG_TARGET: &str = "block-tree";
