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

//! The transaction pool: a priority queue of runtime-validated extrinsics.
//!
//! A transaction is **ready** when every tag it requires is provided by an
//! already-included or already-ready transaction; otherwise it waits in the
//! future set. `pop` hands the block author the highest-priority ready
//! transaction. Transactions outliving their longevity are evicted and
//! temporarily banned.

pub mod rotator;

pub use rotator::PoolRotator;

use mp_core::hash_of;
use mp_runtime::{
	BlockNumber, Hash, TransactionValidityError, ValidTransaction,
};
use parking_lot::Mutex;
use std::{
	collections::{BTreeMap, HashMap, HashSet},
	cmp::Reverse,
	sync::Arc,
	time::Instant,
};

/// Log target of the pool.
pub const LOG_TARGET: &str = "txpool";

/// A dependency tag, opaque to the node.
pub type Tag = Vec<u8>;

/// Validation of a submitted extrinsic against current best state.
pub trait TransactionValidator: Send + Sync {
	/// Run `TaggedTransactionQueue_validate_transaction`.
	fn validate(&self, extrinsic: &[u8]) -> Result<ValidTransaction, PoolError>;
}

/// Why a submission was refused.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
	/// The transaction is already pooled.
	#[error("transaction {0} already in the pool")]
	AlreadyImported(Hash),

	/// The transaction was recently evicted and is temporarily banned.
	#[error("transaction {0} is temporarily banned")]
	TemporarilyBanned(Hash),

	/// The runtime rejected the transaction.
	#[error("invalid transaction: {0:?}")]
	Invalid(TransactionValidityError),

	/// The validation call itself failed.
	#[error("validation failed: {0}")]
	Validator(String),
}

/// A pooled, validated transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolTransaction {
	/// The opaque extrinsic bytes.
	pub extrinsic: Vec<u8>,
	/// Blake2b-256 of the extrinsic bytes.
	pub hash: Hash,
	/// Queueing priority.
	pub priority: u64,
	/// Tags that must be provided before this becomes ready.
	pub requires: Vec<Tag>,
	/// Tags provided once included.
	pub provides: Vec<Tag>,
	/// Last block number the validity verdict holds for.
	pub valid_until: BlockNumber,
	/// Whether to gossip this transaction.
	pub propagate: bool,
}

#[derive(Default)]
struct Inner {
	/// Ready transactions, keyed for highest-priority-first, FIFO within a
	/// priority.
	ready: BTreeMap<(u64, Reverse<u64>), Arc<PoolTransaction>>,
	/// Transactions with unsatisfied requirements, by hash.
	future: HashMap<Hash, Arc<PoolTransaction>>,
	/// Tags provided by ready or already-popped transactions.
	satisfied: HashSet<Tag>,
	/// All pooled hashes with their ready-queue key, if ready.
	known: HashMap<Hash, Option<(u64, Reverse<u64>)>>,
	/// Insertion sequence for FIFO tie-breaks.
	sequence: u64,
}

/// The pool. Interior mutability with short critical sections; shared via
/// `Arc` between the gossip handler, the maintenance task and the author.
#[derive(Default)]
pub struct TransactionPool {
	inner: Mutex<Inner>,
	rotator: PoolRotator,
}

impl TransactionPool {
	/// An empty pool.
	pub fn new() -> Self {
		Self::default()
	}

	/// Validate and insert an extrinsic observed at `best_number`.
	pub fn submit(
		&self,
		validator: &dyn TransactionValidator,
		extrinsic: Vec<u8>,
		best_number: BlockNumber,
	) -> Result<Hash, PoolError> {
		let hash = hash_of(&extrinsic);
		if self.rotator.is_banned(&hash) {
			return Err(PoolError::TemporarilyBanned(hash))
		}
		if self.inner.lock().known.contains_key(&hash) {
			return Err(PoolError::AlreadyImported(hash))
		}

		let validity = validator.validate(&extrinsic)?;
		let transaction = Arc::new(PoolTransaction {
			extrinsic,
			hash,
			priority: validity.priority,
			requires: validity.requires,
			provides: validity.provides,
			valid_until: best_number.saturating_add(validity.longevity),
			propagate: validity.propagate,
		});

		let mut inner = self.inner.lock();
		inner.insert(transaction);
		log::debug!(target: LOG_TARGET, "pooled transaction {hash}");
		Ok(hash)
	}

	/// Remove and return the highest-priority ready transaction. Its
	/// provided tags stay satisfied, so dependants remain ready.
	pub fn pop(&self) -> Option<Arc<PoolTransaction>> {
		let mut inner = self.inner.lock();
		let (_key, transaction) = inner.ready.pop_last()?;
		inner.known.remove(&transaction.hash);
		// Treat as included: its tags stay in the satisfied set and may
		// promote future transactions.
		let provides = transaction.provides.clone();
		for tag in provides {
			inner.satisfied.insert(tag);
		}
		inner.promote_futures();
		Some(transaction)
	}

	/// Put a transaction back (e.g. the slot ended before it fit).
	pub fn requeue(&self, transaction: Arc<PoolTransaction>) {
		let mut inner = self.inner.lock();
		if inner.known.contains_key(&transaction.hash) {
			return
		}
		inner.insert(transaction);
	}

	/// Evict transactions whose validity expired before `best_number` and
	/// ban them briefly.
	pub fn maintain(&self, best_number: BlockNumber) {
		let now = Instant::now();
		self.rotator.clear_timeouts(now);
		let mut inner = self.inner.lock();
		let expired: Vec<Arc<PoolTransaction>> = inner
			.ready
			.values()
			.chain(inner.future.values())
			.filter(|transaction| transaction.valid_until < best_number)
			.cloned()
			.collect();
		for transaction in &expired {
			inner.remove(&transaction.hash);
		}
		drop(inner);
		if !expired.is_empty() {
			log::debug!(target: LOG_TARGET, "evicted {} expired transactions", expired.len());
			self.rotator.ban(now, expired.iter().map(|transaction| transaction.hash));
		}
	}

	/// Drop a transaction the runtime has since declared invalid, banning
	/// it.
	pub fn remove_invalid(&self, hash: &Hash) {
		self.inner.lock().remove(hash);
		self.rotator.ban(Instant::now(), [*hash]);
	}

	/// Number of ready transactions.
	pub fn ready_len(&self) -> usize {
		self.inner.lock().ready.len()
	}

	/// Number of future transactions.
	pub fn future_len(&self) -> usize {
		self.inner.lock().future.len()
	}

	/// The hashes currently pooled, ready first.
	pub fn hashes(&self) -> Vec<Hash> {
		let inner = self.inner.lock();
		inner
			.ready
			.values()
			.rev()
			.map(|transaction| transaction.hash)
			.chain(inner.future.values().map(|transaction| transaction.hash))
			.collect()
	}
}

impl Inner {
	fn insert(&mut self, transaction: Arc<PoolTransaction>) {
		if self.is_ready(&transaction) {
			self.insert_ready(transaction);
			self.promote_futures();
		} else {
			self.known.insert(transaction.hash, None);
			self.future.insert(transaction.hash, transaction);
		}
	}

	fn is_ready(&self, transaction: &PoolTransaction) -> bool {
		transaction.requires.iter().all(|tag| self.satisfied.contains(tag))
	}

	fn insert_ready(&mut self, transaction: Arc<PoolTransaction>) {
		self.sequence += 1;
		let key = (transaction.priority, Reverse(self.sequence));
		for tag in &transaction.provides {
			self.satisfied.insert(tag.clone());
		}
		self.known.insert(transaction.hash, Some(key));
		self.ready.insert(key, transaction);
	}

	/// Move future transactions whose requirements are now met into the
	/// ready queue, transitively.
	fn promote_futures(&mut self) {
		loop {
			let promotable: Vec<Hash> = self
				.future
				.values()
				.filter(|transaction| {
					transaction.requires.iter().all(|tag| self.satisfied.contains(tag))
				})
				.map(|transaction| transaction.hash)
				.collect();
			if promotable.is_empty() {
				return
			}
			for hash in promotable {
				let transaction = self
					.future
					.remove(&hash)
					.expect("hash was collected from the future set above; qed");
				self.insert_ready(transaction);
			}
		}
	}

	fn remove(&mut self, hash: &Hash) {
		match self.known.remove(hash) {
			Some(Some(key)) => {
				self.ready.remove(&key);
			},
			Some(None) => {
				self.future.remove(hash);
			},
			None => {},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	struct StaticValidator(HashMap<Vec<u8>, ValidTransaction>);

	impl TransactionValidator for StaticValidator {
		fn validate(&self, extrinsic: &[u8]) -> Result<ValidTransaction, PoolError> {
			self.0.get(extrinsic).cloned().ok_or_else(|| PoolError::Validator("unknown".into()))
		}
	}

	fn validity(priority: u64) -> ValidTransaction {
		ValidTransaction {
			priority,
			requires: Vec::new(),
			provides: Vec::new(),
			longevity: 64,
			propagate: true,
		}
	}

	fn validator(entries: Vec<(Vec<u8>, ValidTransaction)>) -> StaticValidator {
		StaticValidator(entries.into_iter().collect())
	}

	#[test]
	fn pop_returns_highest_priority_first() {
		let validator = validator(vec![
			(vec![1], validity(1)),
			(vec![2], validity(9)),
			(vec![3], validity(5)),
		]);
		let pool = TransactionPool::new();
		for extrinsic in [vec![1], vec![2], vec![3]] {
			pool.submit(&validator, extrinsic, 0).unwrap();
		}
		assert_eq!(pool.pop().unwrap().extrinsic, vec![2]);
		assert_eq!(pool.pop().unwrap().extrinsic, vec![3]);
		assert_eq!(pool.pop().unwrap().extrinsic, vec![1]);
		assert!(pool.pop().is_none());
	}

	#[test]
	fn equal_priority_is_fifo() {
		let validator = validator(vec![(vec![1], validity(5)), (vec![2], validity(5))]);
		let pool = TransactionPool::new();
		pool.submit(&validator, vec![1], 0).unwrap();
		pool.submit(&validator, vec![2], 0).unwrap();
		assert_eq!(pool.pop().unwrap().extrinsic, vec![1]);
	}

	#[test]
	fn unmet_requirements_park_in_future() {
		let mut gated = validity(5);
		gated.requires = vec![b"nonce-1".to_vec()];
		let mut provider = validity(1);
		provider.provides = vec![b"nonce-1".to_vec()];

		let validator = validator(vec![(vec![1], gated), (vec![2], provider)]);
		let pool = TransactionPool::new();
		pool.submit(&validator, vec![1], 0).unwrap();
		assert_eq!(pool.ready_len(), 0);
		assert_eq!(pool.future_len(), 1);

		// The provider readies the gated transaction.
		pool.submit(&validator, vec![2], 0).unwrap();
		assert_eq!(pool.ready_len(), 2);
		assert_eq!(pool.pop().unwrap().extrinsic, vec![1], "gated has the higher priority");
	}

	#[test]
	fn popped_provides_keep_dependants_ready() {
		let mut provider = validity(9);
		provider.provides = vec![b"nonce-1".to_vec()];
		let mut gated = validity(5);
		gated.requires = vec![b"nonce-1".to_vec()];

		let validator = validator(vec![(vec![1], provider), (vec![2], gated)]);
		let pool = TransactionPool::new();
		pool.submit(&validator, vec![1], 0).unwrap();
		pool.submit(&validator, vec![2], 0).unwrap();

		assert_eq!(pool.pop().unwrap().extrinsic, vec![1]);
		// The dependant is still poppable after its provider left the pool.
		assert_eq!(pool.pop().unwrap().extrinsic, vec![2]);
	}

	#[test]
	fn duplicate_submission_is_rejected() {
		let validator = validator(vec![(vec![1], validity(1))]);
		let pool = TransactionPool::new();
		let hash = pool.submit(&validator, vec![1], 0).unwrap();
		assert_eq!(pool.submit(&validator, vec![1], 0), Err(PoolError::AlreadyImported(hash)));
	}

	#[test]
	fn expired_transactions_are_evicted_and_banned() {
		let mut short = validity(1);
		short.longevity = 3;
		let validator = validator(vec![(vec![1], short)]);
		let pool = TransactionPool::new();
		let hash = pool.submit(&validator, vec![1], 0).unwrap();

		pool.maintain(2);
		assert_eq!(pool.ready_len(), 1, "still valid at block 2");
		pool.maintain(10);
		assert_eq!(pool.ready_len(), 0);
		assert_eq!(
			pool.submit(&validator, vec![1], 10),
			Err(PoolError::TemporarilyBanned(hash)),
		);
	}

	#[test]
	fn requeue_restores_a_popped_transaction() {
		let validator = validator(vec![(vec![1], validity(1))]);
		let pool = TransactionPool::new();
		pool.submit(&validator, vec![1], 0).unwrap();
		let transaction = pool.pop().unwrap();
		pool.requeue(transaction);
		assert_eq!(pool.ready_len(), 1);
	}
}
