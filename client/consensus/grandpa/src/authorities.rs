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

//! Authority-set bookkeeping.
//!
//! The runtime schedules set changes through `FRNK` consensus digests: a
//! `ScheduledChange` in block `B` activates once a block numbered
//! `B.number + delay` is finalised; a `ForcedChange` activates as soon as
//! such a block is imported and overrides any pending scheduled change.
//! Every activation increments the set id.

use crate::types::{AuthorityId, AuthorityWeight, SetId, VoterSet};
use codec::{Decode, Encode};
use mp_core::ed25519;
use mp_runtime::{BlockNumber, Header, GRANDPA_ENGINE_ID};
use parking_lot::RwLock;

/// A change of authorities scheduled by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ScheduledChange {
	/// The incoming authority set.
	pub next_authorities: Vec<([u8; 32], AuthorityWeight)>,
	/// Blocks to wait after the signalling block.
	pub delay: BlockNumber,
}

/// The `FRNK` consensus digest payloads the gadget reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum ConsensusLog {
	/// Activate after finalising the signal block's number plus the delay.
	#[codec(index = 1)]
	ScheduledChange(ScheduledChange),
	/// Activate on import, overriding scheduled changes.
	#[codec(index = 2)]
	ForcedChange(BlockNumber, ScheduledChange),
}

#[derive(Debug, Clone)]
struct PendingChange {
	authorities: Vec<(AuthorityId, AuthorityWeight)>,
	effective_at: BlockNumber,
	forced: bool,
}

/// The live authority set plus at most one pending change.
pub struct SharedAuthoritySet {
	inner: RwLock<Inner>,
}

struct Inner {
	current: VoterSet,
	pending: Option<PendingChange>,
}

impl SharedAuthoritySet {
	/// Start from the genesis voter set (set id 0).
	pub fn new(authorities: Vec<(AuthorityId, AuthorityWeight)>) -> Self {
		Self {
			inner: RwLock::new(Inner {
				current: VoterSet::new(authorities, 0),
				pending: None,
			}),
		}
	}

	/// The active voter set.
	pub fn current(&self) -> VoterSet {
		self.inner.read().current.clone()
	}

	/// The active set id.
	pub fn set_id(&self) -> SetId {
		self.inner.read().current.set_id
	}

	/// Scan an imported header for change digests. Forced changes may
	/// activate immediately.
	pub fn note_header(&self, header: &Header) {
		for payload in header.digest.consensus(GRANDPA_ENGINE_ID) {
			let Ok(log) = ConsensusLog::decode(&mut &*payload) else { continue };
			match log {
				ConsensusLog::ScheduledChange(change) => {
					let effective_at = header.number + change.delay;
					let mut inner = self.inner.write();
					// A forced change in flight wins over new schedules.
					if inner.pending.as_ref().map(|pending| pending.forced).unwrap_or(false) {
						continue
					}
					log::info!(
						target: crate::LOG_TARGET,
						"authority change scheduled in block #{} effective at #{effective_at}",
						header.number,
					);
					inner.pending = Some(PendingChange {
						authorities: decode_authorities(&change.next_authorities),
						effective_at,
						forced: false,
					});
				},
				ConsensusLog::ForcedChange(_median, change) => {
					let effective_at = header.number + change.delay;
					log::warn!(
						target: crate::LOG_TARGET,
						"forced authority change in block #{} effective at #{effective_at}",
						header.number,
					);
					self.inner.write().pending = Some(PendingChange {
						authorities: decode_authorities(&change.next_authorities),
						effective_at,
						forced: true,
					});
				},
			}
		}
		self.apply_forced(header.number);
	}

	/// Activate a pending scheduled change once `finalized` reaches its
	/// effective number. Returns the new set if one activated.
	pub fn note_finalized(&self, finalized: BlockNumber) -> Option<VoterSet> {
		let mut inner = self.inner.write();
		let pending = inner.pending.as_ref()?;
		if pending.forced || finalized < pending.effective_at {
			return None
		}
		let pending = inner.pending.take().expect("checked above; qed");
		let set_id = inner.current.set_id + 1;
		inner.current = VoterSet::new(pending.authorities, set_id);
		log::info!(target: crate::LOG_TARGET, "authority set {set_id} active (scheduled change)");
		Some(inner.current.clone())
	}

	fn apply_forced(&self, imported: BlockNumber) {
		let mut inner = self.inner.write();
		let Some(pending) = inner.pending.as_ref() else { return };
		if !pending.forced || imported < pending.effective_at {
			return
		}
		let pending = inner.pending.take().expect("checked above; qed");
		let set_id = inner.current.set_id + 1;
		inner.current = VoterSet::new(pending.authorities, set_id);
		log::warn!(target: crate::LOG_TARGET, "authority set {set_id} active (forced change)");
	}
}

fn decode_authorities(raw: &[([u8; 32], AuthorityWeight)]) -> Vec<(AuthorityId, AuthorityWeight)> {
	raw.iter().map(|(key, weight)| (ed25519::Public(*key), *weight)).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use mp_runtime::{DigestItem, Hash};
	use pretty_assertions::assert_eq;

	fn header_with(number: BlockNumber, log: ConsensusLog) -> Header {
		let mut header = Header::new(Hash::zero(), number);
		header
			.digest
			.push(DigestItem::Consensus(GRANDPA_ENGINE_ID, log.encode()));
		header
	}

	fn genesis_set() -> SharedAuthoritySet {
		SharedAuthoritySet::new(vec![(ed25519::Public([1; 32]), 1)])
	}

	#[test]
	fn scheduled_change_waits_for_finality() {
		let set = genesis_set();
		let change =
			ScheduledChange { next_authorities: vec![([2; 32], 1)], delay: 5 };
		set.note_header(&header_with(10, ConsensusLog::ScheduledChange(change)));

		assert_eq!(set.set_id(), 0, "not active before finality");
		assert_eq!(set.note_finalized(14), None);
		let activated = set.note_finalized(15).expect("activates at #15");
		assert_eq!(activated.set_id, 1);
		assert_eq!(activated.authorities, vec![(ed25519::Public([2; 32]), 1)]);
		// Activation is one-shot.
		assert_eq!(set.note_finalized(20), None);
	}

	#[test]
	fn forced_change_applies_on_import() {
		let set = genesis_set();
		let change =
			ScheduledChange { next_authorities: vec![([3; 32], 1)], delay: 0 };
		set.note_header(&header_with(7, ConsensusLog::ForcedChange(0, change)));
		assert_eq!(set.set_id(), 1);
		assert_eq!(set.current().authorities, vec![(ed25519::Public([3; 32]), 1)]);
	}

	#[test]
	fn forced_change_overrides_scheduled() {
		let set = genesis_set();
		set.note_header(&header_with(
			5,
			ConsensusLog::ScheduledChange(ScheduledChange {
				next_authorities: vec![([2; 32], 1)],
				delay: 10,
			}),
		));
		set.note_header(&header_with(
			6,
			ConsensusLog::ForcedChange(
				0,
				ScheduledChange { next_authorities: vec![([3; 32], 1)], delay: 0 },
			),
		));
		assert_eq!(set.set_id(), 1);
		assert_eq!(set.current().authorities, vec![(ed25519::Public([3; 32]), 1)]);
		// The stale scheduled change is gone.
		assert_eq!(set.note_finalized(100), None);
	}
}
