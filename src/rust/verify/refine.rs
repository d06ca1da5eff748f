// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Bounded feedback loop state

use crate::core::Outcome;

/// Progress of one unit through generate / verify / feedback rounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// Nothing requested yet
    Pending,
    /// Candidate of round `round` failed and may be refined
    Attempted { round: u32 },
    /// Terminal
    Done(Outcome),
}

impl AttemptState {
    /// Round number of the next request, if another request is allowed
    pub fn next_round(self) -> Option<u32> {
        match self {
            AttemptState::Pending => Some(0),
            AttemptState::Attempted { round } => Some(round + 1),
            AttemptState::Done(_) => None,
        }
    }

    /// Transition after round `round` was verified with `outcome`.
    ///
    /// Only proof and syntax failures can be refined, and at most
    /// `max_rounds` feedback rounds follow the initial request.
    pub fn after(self, outcome: Outcome, max_rounds: u32) -> Self {
        let Some(round) = self.next_round() else {
            return self;
        };
        if outcome.accepts_feedback() && round < max_rounds {
            AttemptState::Attempted { round }
        } else {
            AttemptState::Done(outcome)
        }
    }

    pub fn is_done(self) -> bool {
        matches!(self, AttemptState::Done(_))
    }
}
