use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::consensus::message::Term;

/// The three roles a node can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleKind::Follower => write!(f, "follower"),
            RoleKind::Candidate => write!(f, "candidate"),
            RoleKind::Leader => write!(f, "leader"),
        }
    }
}

/// Current role plus its role-specific fields. Role instances are
/// transient; the shared [`ConsensusState`] is carried across
/// transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate {
        /// Granted ballots this round, self-vote included.
        votes: u64,
    },
    Leader,
}

impl Role {
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Follower => RoleKind::Follower,
            Role::Candidate { .. } => RoleKind::Candidate,
            Role::Leader => RoleKind::Leader,
        }
    }
}

/// Role-independent consensus bookkeeping, carried across transitions.
#[derive(Debug, Clone, Default)]
pub struct ConsensusState {
    /// Monotonic non-decreasing, starts at 0.
    pub term: Term,
    /// Who we voted for, scoped to the current term.
    pub voted_for: Option<String>,
    /// Placeholder index into the unimplemented replicated log.
    pub log_position: u64,
    /// term -> "did I vote this term". Set at most once per term.
    pub vote_record: HashMap<Term, bool>,
}

impl ConsensusState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a higher term seen in a peer message. Clears the vote
    /// scope when the term actually advances; never decreases.
    pub fn observe_term(&mut self, term: Term) {
        if term > self.term {
            self.term = term;
            self.voted_for = None;
        }
    }

    pub fn has_voted(&self, term: Term) -> bool {
        self.vote_record.get(&term).copied().unwrap_or(false)
    }

    /// Cast our single vote for `term`. Callers must check
    /// [`has_voted`](Self::has_voted) first.
    pub fn record_vote(&mut self, term: Term, candidate: &str) {
        debug_assert!(!self.has_voted(term));
        self.voted_for = Some(candidate.to_string());
        self.vote_record.insert(term, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_at_term_zero() {
        let state = ConsensusState::new();
        assert_eq!(state.term, 0);
        assert_eq!(state.voted_for, None);
        assert_eq!(state.log_position, 0);
        assert!(state.vote_record.is_empty());
    }

    #[test]
    fn observe_term_never_decreases() {
        let mut state = ConsensusState::new();
        state.observe_term(5);
        assert_eq!(state.term, 5);

        state.observe_term(3);
        assert_eq!(state.term, 5);

        state.observe_term(5);
        assert_eq!(state.term, 5);
    }

    #[test]
    fn observe_higher_term_clears_vote_scope() {
        let mut state = ConsensusState::new();
        state.observe_term(2);
        state.record_vote(2, "beta");
        assert_eq!(state.voted_for.as_deref(), Some("beta"));

        state.observe_term(3);
        assert_eq!(state.voted_for, None);
        // The per-term record survives: term 2's vote stays spent.
        assert!(state.has_voted(2));
        assert!(!state.has_voted(3));
    }

    #[test]
    fn record_vote_marks_term_spent() {
        let mut state = ConsensusState::new();
        assert!(!state.has_voted(1));

        state.observe_term(1);
        state.record_vote(1, "gamma");
        assert!(state.has_voted(1));
        assert_eq!(state.voted_for.as_deref(), Some("gamma"));
    }

    #[test]
    fn role_kind_display() {
        assert_eq!(Role::Follower.kind().to_string(), "follower");
        assert_eq!(Role::Candidate { votes: 1 }.kind().to_string(), "candidate");
        assert_eq!(Role::Leader.kind().to_string(), "leader");
    }
}
