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

//! Temporary bans for evicted transactions.
//!
//! A transaction dropped for staleness is banned for a while so gossip
//! cannot immediately reinsert it.

use mp_runtime::Hash;
use parking_lot::RwLock;
use std::{
	collections::HashMap,
	time::{Duration, Instant},
};

/// Expected size of the ban cache; twice this triggers a purge.
const EXPECTED_SIZE: usize = 2048;

/// Default ban duration.
const DEFAULT_BAN_SECS: u64 = 30 * 60;

/// Keeps recently evicted transaction hashes banned.
pub struct PoolRotator {
	ban_time: Duration,
	banned_until: RwLock<HashMap<Hash, Instant>>,
}

impl Default for PoolRotator {
	fn default() -> Self {
		Self {
			ban_time: Duration::from_secs(DEFAULT_BAN_SECS),
			banned_until: Default::default(),
		}
	}
}

impl PoolRotator {
	/// A rotator with a custom ban time.
	pub fn new(ban_time: Duration) -> Self {
		Self { ban_time, ..Self::default() }
	}

	/// Whether `hash` is currently banned.
	pub fn is_banned(&self, hash: &Hash) -> bool {
		self.banned_until.read().contains_key(hash)
	}

	/// Ban the given hashes from `now`.
	pub fn ban(&self, now: Instant, hashes: impl IntoIterator<Item = Hash>) {
		let mut banned = self.banned_until.write();
		for hash in hashes {
			banned.insert(hash, now + self.ban_time);
		}
		if banned.len() > 2 * EXPECTED_SIZE {
			while banned.len() > EXPECTED_SIZE {
				if let Some(key) = banned.keys().next().copied() {
					banned.remove(&key);
				}
			}
		}
	}

	/// Drop bans that have expired by `now`.
	pub fn clear_timeouts(&self, now: Instant) {
		self.banned_until.write().retain(|_, until| *until >= now);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ban_expires() {
		let rotator = PoolRotator::new(Duration::from_millis(10));
		let hash = Hash::repeat_byte(1);
		let now = Instant::now();
		rotator.ban(now, [hash]);
		assert!(rotator.is_banned(&hash));
		rotator.clear_timeouts(now + Duration::from_millis(20));
		assert!(!rotator.is_banned(&hash));
	}

	#[test]
	fn cache_is_bounded() {
		let rotator = PoolRotator::default();
		let now = Instant::now();
		for i in 0..(2 * EXPECTED_SIZE as u64 + 1) {
			rotator.ban(now, [Hash::from_low_u64_le(i)]);
		}
		assert!(rotator.banned_until.read().len() <= EXPECTED_SIZE + 1);
	}
}
