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

//! The voter task.
//!
//! Each round runs prevote and precommit phases. The voter prevotes once
//! the prior round's ghost conditions hold or a start delay elapses,
//! precommits on the observed prevote ghost, and finalises when the
//! precommit ghost reaches the two-thirds bound, emitting a commit with the
//! supporting precommits. Peers more than [`CATCHUP_THRESHOLD`] rounds
//! ahead trigger a catch-up request; a valid response jumps the voter
//! forward.

use crate::{
	authorities::SharedAuthoritySet,
	justification::verify_justification,
	round::{Chain, Round},
	types::{
		Commit, EquivocationProof, GrandpaJustification, GrandpaMessage, Message, PeerId,
		RoundNumber, SignedMessage,
	},
	LOG_TARGET,
};
use codec::Encode;
use mc_blockchain::{BlockState, Column, Database, DatabasePtr};
use mp_core::{
	crypto::KeyTypeId,
	ed25519,
	keystore::{Keystore, KeystorePtr},
};
use mp_runtime::{BlockNumber, Hash};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, watch};

/// Rounds a peer may be ahead before we request a catch-up.
pub const CATCHUP_THRESHOLD: u64 = 2;

/// Delay before prevoting without the ghost condition.
const PREVOTE_DELAY: Duration = Duration::from_secs(2);

/// Maximum wait for each collection phase.
const PHASE_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval of unsolicited neighbour packets.
const NEIGHBOUR_INTERVAL: Duration = Duration::from_secs(300);

/// Outgoing message transport, provided by the network collaborator.
pub trait GrandpaNetwork: Send + Sync {
	/// Gossip to all peers on the `FRNK` protocol.
	fn broadcast(&self, message: GrandpaMessage);
	/// Send to one peer.
	fn send_to(&self, peer: PeerId, message: GrandpaMessage);
}

/// [`Chain`] view over the canonical block state.
pub struct BlockStateChain(pub Arc<BlockState>);

impl Chain for BlockStateChain {
	fn number(&self, hash: &Hash) -> Option<BlockNumber> {
		self.0.header(hash).map(|header| header.number)
	}

	fn is_descendant(&self, ancestor: &Hash, descendant: &Hash) -> bool {
		self.0.is_descendant(ancestor, descendant)
	}

	fn ancestry(&self, hash: &Hash) -> Option<Vec<Hash>> {
		let root = self.0.finalized().0;
		let mut chain = self.0.subchain(&root, hash)?;
		chain.reverse();
		Some(chain)
	}

	fn best_head(&self) -> (Hash, BlockNumber) {
		let header = self.0.best_header();
		(header.hash(), header.number)
	}
}

/// One replayed completed round, kept for catch-up responses.
struct CompletedRound {
	number: RoundNumber,
	prevotes: Vec<SignedMessage>,
	precommits: Vec<SignedMessage>,
}

/// The finality voter service.
pub struct GrandpaVoter {
	keystore: KeystorePtr,
	authorities: Arc<SharedAuthoritySet>,
	chain: Arc<dyn Chain>,
	block_state: Arc<BlockState>,
	network: Arc<dyn GrandpaNetwork>,
	round_number: RoundNumber,
	best_final_candidate: (Hash, BlockNumber),
	completed: Option<CompletedRound>,
	equivocations: Vec<EquivocationProof>,
	/// Auxiliary store for equivocation evidence, if persistence is wired.
	aux_db: Option<DatabasePtr>,
}

/// Result of processing one incoming message.
enum Outcome {
	/// Nothing to act on beyond vote import.
	Continue,
	/// Jump to the given round (a catch-up succeeded).
	JumpTo(RoundNumber),
}

impl GrandpaVoter {
	/// Assemble the voter from its collaborators.
	pub fn new(
		keystore: KeystorePtr,
		authorities: Arc<SharedAuthoritySet>,
		block_state: Arc<BlockState>,
		network: Arc<dyn GrandpaNetwork>,
	) -> Self {
		let finalized = block_state.finalized();
		Self {
			keystore,
			authorities,
			chain: Arc::new(BlockStateChain(block_state.clone())),
			block_state,
			network,
			round_number: 1,
			best_final_candidate: finalized,
			completed: None,
			equivocations: Vec::new(),
			aux_db: None,
		}
	}

	/// Persist equivocation evidence into the given auxiliary store.
	pub fn with_database(mut self, db: DatabasePtr) -> Self {
		self.aux_db = Some(db);
		self
	}

	/// Equivocation evidence gathered so far, for runtime reporting.
	pub fn equivocations(&self) -> &[EquivocationProof] {
		&self.equivocations
	}

	/// Drive rounds until shutdown; the round in progress finishes first.
	pub async fn run(
		mut self,
		mut incoming: mpsc::Receiver<(PeerId, GrandpaMessage)>,
		mut shutdown: watch::Receiver<bool>,
	) {
		log::info!(target: LOG_TARGET, "finality voter started at round {}", self.round_number);
		let mut last_neighbour = tokio::time::Instant::now();
		self.broadcast_neighbour();
		loop {
			if *shutdown.borrow() {
				log::info!(target: LOG_TARGET, "finality voter stopping");
				return
			}
			if last_neighbour.elapsed() >= NEIGHBOUR_INTERVAL {
				self.broadcast_neighbour();
				last_neighbour = tokio::time::Instant::now();
			}
			if let Err(_closed) = self.run_round(&mut incoming, &mut shutdown).await {
				return
			}
		}
	}

	/// One full round. `Err` means the message channel or shutdown closed.
	async fn run_round(
		&mut self,
		incoming: &mut mpsc::Receiver<(PeerId, GrandpaMessage)>,
		shutdown: &mut watch::Receiver<bool>,
	) -> Result<(), ()> {
		let voters = self.authorities.current();
		let mut round = Round::new(self.round_number, voters.clone());
		log::debug!(
			target: LOG_TARGET,
			"starting round {} under set {}",
			round.number,
			voters.set_id,
		);

		// Phase 1: wait for the ghost condition or the start delay.
		let prevote_deadline = tokio::time::Instant::now() + PREVOTE_DELAY;
		loop {
			if self.prevote_condition(&round) {
				break
			}
			match self.collect_one(incoming, shutdown, &mut round, prevote_deadline).await? {
				Some(Outcome::JumpTo(next)) => return self.jump_to(next),
				Some(Outcome::Continue) => {},
				None => break,
			}
		}
		self.cast_prevote(&mut round);

		// Phase 2: gather prevotes until a ghost emerges, then precommit.
		let deadline = tokio::time::Instant::now() + PHASE_TIMEOUT;
		loop {
			if round.prevote_ghost(self.chain.as_ref()).is_some() {
				break
			}
			match self.collect_one(incoming, shutdown, &mut round, deadline).await? {
				Some(Outcome::JumpTo(next)) => return self.jump_to(next),
				Some(Outcome::Continue) => {},
				None => break,
			}
		}
		self.cast_precommit(&mut round);

		// Phase 3: gather precommits until the round is completable.
		let deadline = tokio::time::Instant::now() + PHASE_TIMEOUT;
		loop {
			if round.completable(self.chain.as_ref()) {
				break
			}
			match self.collect_one(incoming, shutdown, &mut round, deadline).await? {
				Some(Outcome::JumpTo(next)) => return self.jump_to(next),
				Some(Outcome::Continue) => {},
				None => break,
			}
		}
		self.complete_round(round);
		Ok(())
	}

	/// Wait for one message until `deadline`. `Ok(None)` is a timeout;
	/// `Err` means shutdown.
	async fn collect_one(
		&mut self,
		incoming: &mut mpsc::Receiver<(PeerId, GrandpaMessage)>,
		shutdown: &mut watch::Receiver<bool>,
		round: &mut Round,
		deadline: tokio::time::Instant,
	) -> Result<Option<Outcome>, ()> {
		tokio::select! {
			_ = shutdown.changed() => Err(()),
			_ = tokio::time::sleep_until(deadline) => Ok(None),
			message = incoming.recv() => match message {
				None => Err(()),
				Some((peer, message)) => Ok(Some(self.handle_message(peer, message, round))),
			},
		}
	}

	fn handle_message(
		&mut self,
		peer: PeerId,
		message: GrandpaMessage,
		round: &mut Round,
	) -> Outcome {
		match message {
			GrandpaMessage::Vote { round: vote_round, set_id, message } => {
				if set_id != round.voters.set_id {
					return Outcome::Continue
				}
				if vote_round == round.number {
					match round.import(message) {
						Ok(()) => {},
						Err(error) => {
							log::debug!(target: LOG_TARGET, "discarding vote from peer {peer}: {error}");
						},
					}
					self.harvest_equivocations(round);
				} else if vote_round > round.number + CATCHUP_THRESHOLD {
					self.request_catch_up(peer, vote_round, set_id);
				}
				Outcome::Continue
			},
			GrandpaMessage::Commit { round: commit_round, set_id, commit } => {
				self.handle_commit(commit_round, set_id, commit);
				Outcome::Continue
			},
			GrandpaMessage::Neighbour { round: peer_round, set_id, .. } => {
				if set_id == round.voters.set_id && peer_round > round.number + CATCHUP_THRESHOLD {
					self.request_catch_up(peer, peer_round, set_id);
				}
				Outcome::Continue
			},
			GrandpaMessage::CatchUpRequest { round: requested, set_id } => {
				self.answer_catch_up(peer, requested, set_id);
				Outcome::Continue
			},
			GrandpaMessage::CatchUpResponse { set_id, round: replayed, prevotes, precommits } =>
				self.handle_catch_up_response(set_id, replayed, prevotes, precommits, round),
		}
	}

	/// Condition (a) for prevoting: a prevote ghost at or above the last
	/// finalised block that descends from the previous round's candidate.
	fn prevote_condition(&self, round: &Round) -> bool {
		let Some((ghost_hash, ghost_number)) = round.prevote_ghost(self.chain.as_ref()) else {
			return false
		};
		ghost_number >= self.block_state.finalized().1 &&
			self.chain.is_descendant(&self.best_final_candidate.0, &ghost_hash)
	}

	fn cast_prevote(&mut self, round: &mut Round) {
		let (best_hash, best_number) = self.chain.best_head();
		let target = match round.prevote_ghost(self.chain.as_ref()) {
			Some((ghost_hash, ghost_number)) if ghost_number > best_number =>
				(ghost_hash, ghost_number),
			_ => (best_hash, best_number),
		};
		self.sign_and_send(round, Round::prevote(target.0, target.1));
	}

	fn cast_precommit(&mut self, round: &mut Round) {
		let Some((target_hash, target_number)) = round.prevote_ghost(self.chain.as_ref()) else {
			log::debug!(
				target: LOG_TARGET,
				"no prevote ghost in round {}, skipping precommit",
				round.number,
			);
			return
		};
		self.sign_and_send(round, Round::precommit(target_hash, target_number));
	}

	/// Sign `message` with our authority key, gossip it, and count it in
	/// our own round state. A node without a voter key just observes.
	fn sign_and_send(&mut self, round: &mut Round, message: Message) {
		let local_keys = self.keystore.ed25519_public_keys(KeyTypeId::GRANDPA);
		let Some(public) = local_keys
			.into_iter()
			.find(|public| round.voters.contains(public))
		else {
			return
		};
		let payload = crate::types::signing_payload(&message, round.number, round.voters.set_id);
		let Some(signature) = self.keystore.ed25519_sign(KeyTypeId::GRANDPA, &public, &payload)
		else {
			return
		};
		let signed = SignedMessage { message, signature, id: public };
		if let Err(error) = round.import(signed.clone()) {
			log::warn!(target: LOG_TARGET, "own vote rejected: {error}");
			return
		}
		self.network.broadcast(GrandpaMessage::Vote {
			round: round.number,
			set_id: round.voters.set_id,
			message: signed,
		});
	}

	/// Finalise on the precommit ghost, emit the commit, and advance.
	fn complete_round(&mut self, round: Round) {
		if let Some((ghost_hash, ghost_number)) = round.precommit_ghost(self.chain.as_ref()) {
			self.best_final_candidate = (ghost_hash, ghost_number);
			if ghost_number > self.block_state.finalized().1 {
				let commit = Commit {
					target_hash: ghost_hash,
					target_number: ghost_number,
					precommits: round.commit_precommits(&ghost_hash, self.chain.as_ref()),
				};
				let justification =
					GrandpaJustification { round: round.number, commit: commit.clone() };
				match self.block_state.finalize(ghost_hash, Some(justification.encode())) {
					Ok(_) => {
						self.network.broadcast(GrandpaMessage::Commit {
							round: round.number,
							set_id: round.voters.set_id,
							commit,
						});
						if self.authorities.note_finalized(ghost_number).is_some() {
							// A new voter-set generation restarts rounds.
							self.finish_round(round, 0);
							return
						}
					},
					Err(error) => {
						log::warn!(
							target: LOG_TARGET,
							"could not finalise {ghost_hash} from round {}: {error}",
							round.number,
						);
					},
				}
			}
		}
		let next = round.number + 1;
		self.finish_round(round, next);
	}

	fn finish_round(&mut self, round: Round, next: RoundNumber) {
		self.harvest_equivocations(&round);
		self.completed = Some(CompletedRound {
			number: round.number,
			prevotes: round.signed_prevotes(),
			precommits: round.signed_precommits(),
		});
		self.round_number = next.max(1);
		self.broadcast_neighbour();
	}

	fn harvest_equivocations(&mut self, round: &Round) {
		for proof in round.equivocations() {
			if self.equivocations.contains(proof) {
				continue
			}
			if let Some(db) = &self.aux_db {
				let mut key = b"equivocation:".to_vec();
				key.extend_from_slice(&proof.round.to_le_bytes());
				key.extend_from_slice(proof.id.as_ref());
				db.insert(Column::Grandpa, &key, proof.encode());
			}
			self.equivocations.push(proof.clone());
		}
	}

	/// An incoming commit may finalise a block without us completing the
	/// round ourselves.
	fn handle_commit(&mut self, commit_round: RoundNumber, set_id: u64, commit: Commit) {
		let voters = self.authorities.current();
		if set_id != voters.set_id {
			return
		}
		if commit.target_number <= self.block_state.finalized().1 {
			return
		}
		let justification = GrandpaJustification { round: commit_round, commit };
		let target_hash = justification.commit.target_hash;
		let target_number = justification.commit.target_number;
		if let Err(error) = verify_justification(
			&justification,
			&target_hash,
			target_number,
			&voters,
			self.chain.as_ref(),
		) {
			log::debug!(target: LOG_TARGET, "bad commit for {target_hash}: {error}");
			return
		}
		match self.block_state.finalize(target_hash, Some(justification.encode())) {
			Ok(_) => {
				self.best_final_candidate = (target_hash, target_number);
				self.authorities.note_finalized(target_number);
			},
			Err(error) => {
				log::debug!(target: LOG_TARGET, "commit target {target_hash} not finalisable: {error}");
			},
		}
	}

	fn request_catch_up(&mut self, peer: PeerId, round: RoundNumber, set_id: u64) {
		log::debug!(
			target: LOG_TARGET,
			"peer {peer} is at round {round}, requesting catch-up from round {}",
			self.round_number,
		);
		self.network
			.send_to(peer, GrandpaMessage::CatchUpRequest { round, set_id });
	}

	fn answer_catch_up(&self, peer: PeerId, _requested: RoundNumber, set_id: u64) {
		let voters = self.authorities.current();
		if set_id != voters.set_id {
			return
		}
		let Some(completed) = &self.completed else { return };
		self.network.send_to(
			peer,
			GrandpaMessage::CatchUpResponse {
				set_id,
				round: completed.number,
				prevotes: completed.prevotes.clone(),
				precommits: completed.precommits.clone(),
			},
		);
	}

	/// Replay a catch-up response; with two-thirds participation in both
	/// phases we jump past the replayed round.
	fn handle_catch_up_response(
		&mut self,
		set_id: u64,
		replayed: RoundNumber,
		prevotes: Vec<SignedMessage>,
		precommits: Vec<SignedMessage>,
		current: &mut Round,
	) -> Outcome {
		let voters = self.authorities.current();
		if set_id != voters.set_id || replayed < current.number {
			return Outcome::Continue
		}
		let mut replay = Round::new(replayed, voters.clone());
		for signed in prevotes.into_iter().chain(precommits) {
			if let Err(error) = replay.import(signed) {
				log::debug!(target: LOG_TARGET, "catch-up vote rejected: {error}");
			}
		}
		if !voters.is_supermajority(replay.prevote_participation()) ||
			!voters.is_supermajority(replay.precommit_participation())
		{
			log::debug!(target: LOG_TARGET, "catch-up for round {replayed} lacks participation");
			return Outcome::Continue
		}

		if let Some((ghost_hash, ghost_number)) = replay.precommit_ghost(self.chain.as_ref()) {
			self.best_final_candidate = (ghost_hash, ghost_number);
			if ghost_number > self.block_state.finalized().1 {
				let justification = GrandpaJustification {
					round: replayed,
					commit: Commit {
						target_hash: ghost_hash,
						target_number: ghost_number,
						precommits: replay.commit_precommits(&ghost_hash, self.chain.as_ref()),
					},
				};
				let _ = self.block_state.finalize(ghost_hash, Some(justification.encode()));
				self.authorities.note_finalized(ghost_number);
			}
		}
		self.completed = Some(CompletedRound {
			number: replay.number,
			prevotes: replay.signed_prevotes(),
			precommits: replay.signed_precommits(),
		});
		log::info!(target: LOG_TARGET, "caught up to round {}", replayed + 1);
		Outcome::JumpTo(replayed + 1)
	}

	fn jump_to(&mut self, next: RoundNumber) -> Result<(), ()> {
		self.round_number = next.max(1);
		self.broadcast_neighbour();
		Ok(())
	}

	fn broadcast_neighbour(&self) {
		self.network.broadcast(GrandpaMessage::Neighbour {
			round: self.round_number,
			set_id: self.authorities.set_id(),
			last_finalized: self.block_state.finalized().1,
		});
	}
}

/// Sign a vote for tests and tooling.
pub fn sign_message(
	pair: &ed25519::Pair,
	message: Message,
	round: RoundNumber,
	set_id: u64,
) -> SignedMessage {
	SignedMessage {
		message,
		signature: pair.sign(&crate::types::signing_payload(&message, round, set_id)),
		id: pair.public(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mc_blockchain::{BlockOrigin, MemoryDb};
	use mp_core::crypto::dev_seed;
	use mp_runtime::Header;
	use parking_lot::Mutex;
	use pretty_assertions::assert_eq;

	struct RecordingNetwork {
		sent: Mutex<Vec<GrandpaMessage>>,
	}

	impl GrandpaNetwork for RecordingNetwork {
		fn broadcast(&self, message: GrandpaMessage) {
			self.sent.lock().push(message);
		}

		fn send_to(&self, _peer: PeerId, message: GrandpaMessage) {
			self.sent.lock().push(message);
		}
	}

	fn chain_of_three() -> (Arc<BlockState>, Vec<Header>) {
		let genesis = Header::new(Hash::zero(), 0);
		let state = Arc::new(BlockState::new(Arc::new(MemoryDb::new()), genesis.clone()));
		let mut headers = vec![genesis];
		for tag in 1..=3u8 {
			let parent = headers.last().expect("seeded with genesis; qed");
			let mut header = Header::new(parent.hash(), parent.number + 1);
			header.extrinsics_root = Hash::repeat_byte(tag);
			state.add_block(header.clone(), None, BlockOrigin::NetworkSync).unwrap();
			headers.push(header);
		}
		(state, headers)
	}

	fn voter_setup(
		count: u8,
	) -> (Vec<ed25519::Pair>, Arc<SharedAuthoritySet>, Arc<BlockState>, Vec<Header>) {
		let pairs: Vec<ed25519::Pair> = (0..count)
			.map(|i| ed25519::Pair::from_seed(&dev_seed(&format!("//voter{i}"))))
			.collect();
		let authorities = Arc::new(SharedAuthoritySet::new(
			pairs.iter().map(|pair| (pair.public(), 1)).collect(),
		));
		let (state, headers) = chain_of_three();
		(pairs, authorities, state, headers)
	}

	#[test]
	fn spec_scenario_finalises_c_with_two_thirds() {
		// Chain G <- A <- B <- C; voters 0 and 1 vote C, voter 2 votes B.
		let (pairs, authorities, state, headers) = voter_setup(3);
		let chain = BlockStateChain(state.clone());
		let voters = authorities.current();
		let mut round = Round::new(1, voters);
		let b = (headers[2].hash(), 2);
		let c = (headers[3].hash(), 3);

		for (pair, target) in pairs.iter().zip([c, c, b]) {
			round
				.import(sign_message(pair, Round::prevote(target.0, target.1), 1, 0))
				.unwrap();
			round
				.import(sign_message(pair, Round::precommit(target.0, target.1), 1, 0))
				.unwrap();
		}

		assert_eq!(round.prevote_ghost(&chain), Some(c));
		assert_eq!(round.precommit_ghost(&chain), Some(c));

		// Completing the round finalises C and prunes nothing (linear chain).
		let network = Arc::new(RecordingNetwork { sent: Mutex::new(Vec::new()) });
		let keystore = Arc::new(mp_core::keystore::MemoryKeystore::new());
		let mut voter = GrandpaVoter::new(keystore, authorities, state.clone(), network.clone());
		voter.complete_round(round);

		assert_eq!(state.finalized(), c);
		assert!(state.justification(&c.0).is_some());
		assert!(network
			.sent
			.lock()
			.iter()
			.any(|message| matches!(message, GrandpaMessage::Commit { .. })));
		assert_eq!(voter.round_number, 2);
	}

	#[test]
	fn commits_from_peers_finalise_directly() {
		let (pairs, authorities, state, headers) = voter_setup(3);
		let network = Arc::new(RecordingNetwork { sent: Mutex::new(Vec::new()) });
		let keystore = Arc::new(mp_core::keystore::MemoryKeystore::new());
		let mut voter =
			GrandpaVoter::new(keystore, authorities, state.clone(), network);

		let c = (headers[3].hash(), 3);
		let precommits = pairs
			.iter()
			.take(2)
			.map(|pair| {
				let signed = sign_message(pair, Round::precommit(c.0, c.1), 4, 0);
				let Message::Precommit(precommit) = signed.message else { unreachable!() };
				crate::types::SignedPrecommit {
					precommit,
					signature: signed.signature,
					id: signed.id,
				}
			})
			.collect();
		voter.handle_commit(4, 0, Commit { target_hash: c.0, target_number: c.1, precommits });
		assert_eq!(state.finalized(), c);
	}

	#[test]
	fn forged_commits_are_ignored() {
		let (pairs, authorities, state, headers) = voter_setup(3);
		let network = Arc::new(RecordingNetwork { sent: Mutex::new(Vec::new()) });
		let keystore = Arc::new(mp_core::keystore::MemoryKeystore::new());
		let mut voter =
			GrandpaVoter::new(keystore, authorities, state.clone(), network);

		let c = (headers[3].hash(), 3);
		// Only one honest signature: weight below the bound.
		let precommits = pairs
			.iter()
			.take(1)
			.map(|pair| {
				let signed = sign_message(pair, Round::precommit(c.0, c.1), 4, 0);
				let Message::Precommit(precommit) = signed.message else { unreachable!() };
				crate::types::SignedPrecommit {
					precommit,
					signature: signed.signature,
					id: signed.id,
				}
			})
			.collect();
		voter.handle_commit(4, 0, Commit { target_hash: c.0, target_number: c.1, precommits });
		assert_eq!(state.finalized().1, 0, "nothing finalised");
	}

	#[test]
	fn catch_up_response_jumps_rounds() {
		let (pairs, authorities, state, headers) = voter_setup(3);
		let network = Arc::new(RecordingNetwork { sent: Mutex::new(Vec::new()) });
		let keystore = Arc::new(mp_core::keystore::MemoryKeystore::new());
		let mut voter =
			GrandpaVoter::new(keystore, authorities.clone(), state.clone(), network);

		let c = (headers[3].hash(), 3);
		let replayed = 9;
		let prevotes: Vec<SignedMessage> = pairs
			.iter()
			.map(|pair| sign_message(pair, Round::prevote(c.0, c.1), replayed, 0))
			.collect();
		let precommits: Vec<SignedMessage> = pairs
			.iter()
			.map(|pair| sign_message(pair, Round::precommit(c.0, c.1), replayed, 0))
			.collect();

		let mut current = Round::new(1, authorities.current());
		let outcome = voter.handle_catch_up_response(0, replayed, prevotes, precommits, &mut current);
		assert!(matches!(outcome, Outcome::JumpTo(10)));
		assert_eq!(state.finalized(), c);
	}

	#[test]
	fn underpowered_catch_up_is_ignored() {
		let (pairs, authorities, state, headers) = voter_setup(3);
		let network = Arc::new(RecordingNetwork { sent: Mutex::new(Vec::new()) });
		let keystore = Arc::new(mp_core::keystore::MemoryKeystore::new());
		let mut voter =
			GrandpaVoter::new(keystore, authorities.clone(), state.clone(), network);

		let c = (headers[3].hash(), 3);
		let prevotes: Vec<SignedMessage> = pairs
			.iter()
			.take(1)
			.map(|pair| sign_message(pair, Round::prevote(c.0, c.1), 9, 0))
			.collect();
		let mut current = Round::new(1, authorities.current());
		let outcome = voter.handle_catch_up_response(0, 9, prevotes, Vec::new(), &mut current);
		assert!(matches!(outcome, Outcome::Continue));
		assert_eq!(state.finalized().1, 0);
	}
}
