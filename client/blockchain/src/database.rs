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

//! The key-value store interface the engine persists through.
//!
//! The on-disk implementation lives outside the engine; tests and the
//! default service wiring use [`MemoryDb`].

use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// The column families of the node database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
	/// Block bodies by hash.
	Block,
	/// Headers by hash.
	Header,
	/// Justifications by block hash.
	Justification,
	/// Trie nodes by node hash.
	State,
	/// Epoch descriptors.
	Epoch,
	/// Finality-gadget auxiliary data (set id, completed rounds,
	/// equivocations).
	Grandpa,
}

/// A column-family key-value store.
pub trait Database: Send + Sync {
	/// Read the value under `key` in `column`.
	fn get(&self, column: Column, key: &[u8]) -> Option<Vec<u8>>;
	/// Write `value` under `key` in `column`.
	fn insert(&self, column: Column, key: &[u8], value: Vec<u8>);
	/// Remove `key` from `column`.
	fn remove(&self, column: Column, key: &[u8]);
}

/// A shared database handle.
pub type DatabasePtr = Arc<dyn Database>;

/// In-memory [`Database`].
#[derive(Default)]
pub struct MemoryDb {
	columns: RwLock<HashMap<(Column, Vec<u8>), Vec<u8>>>,
}

impl MemoryDb {
	/// An empty database.
	pub fn new() -> Self {
		Self::default()
	}
}

impl Database for MemoryDb {
	fn get(&self, column: Column, key: &[u8]) -> Option<Vec<u8>> {
		self.columns.read().get(&(column, key.to_vec())).cloned()
	}

	fn insert(&self, column: Column, key: &[u8], value: Vec<u8>) {
		self.columns.write().insert((column, key.to_vec()), value);
	}

	fn remove(&self, column: Column, key: &[u8]) {
		self.columns.write().remove(&(column, key.to_vec()));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn columns_are_isolated() {
		let db = MemoryDb::new();
		db.insert(Column::Header, b"key", vec![1]);
		db.insert(Column::Block, b"key", vec![2]);
		assert_eq!(db.get(Column::Header, b"key"), Some(vec![1]));
		assert_eq!(db.get(Column::Block, b"key"), Some(vec![2]));
		db.remove(Column::Header, b"key");
		assert_eq!(db.get(Column::Header, b"key"), None);
		assert_eq!(db.get(Column::Block, b"key"), Some(vec![2]));
	}
}
