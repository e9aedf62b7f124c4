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

//! GRANDPA: GHOST-based finality over the block tree.
//!
//! Voting proceeds in rounds of two phases, prevote then precommit. A
//! block is final once precommits reaching two thirds of the voter weight
//! land on it or its descendants; the resulting commit doubles as the
//! persisted justification. Authority sets change only through
//! runtime-emitted consensus digests, each change bumping the set id that
//! all vote signatures are bound to.

pub mod authorities;
pub mod justification;
pub mod round;
pub mod types;
pub mod voter;

pub use authorities::{ConsensusLog, ScheduledChange, SharedAuthoritySet};
pub use justification::{decode_and_verify, verify_justification, JustificationError};
pub use round::{Chain, Round, VoteError};
pub use types::{
	AuthorityId, AuthorityWeight, Commit, EquivocationProof, GrandpaJustification,
	GrandpaMessage, Message, PeerId, Precommit, Prevote, RoundNumber, SetId, SignedMessage,
	SignedPrecommit, VoterSet,
};
pub use voter::{sign_message, BlockStateChain, GrandpaNetwork, GrandpaVoter, CATCHUP_THRESHOLD};

/// Log target of the finality gadget.
pub const LOG_TARGET: &str = "grandpa";
