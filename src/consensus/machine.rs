use crate::consensus::message::{Ballot, Message, NodeMeta, Term};
use crate::consensus::state::{ConsensusState, Role, RoleKind};

/// Everything the orchestrator feeds into the state machine: inbound
/// peer messages and timer expiries.
#[derive(Debug)]
pub enum Event {
    Message(Message),
    ElectionTimeout,
    HeartbeatTick,
}

/// Side effects requested by a handler. The orchestrator executes them
/// in order; arming a timer cancels the previously active one first, so
/// at most one timer is live at any instant.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send { to: String, message: Message },
    Broadcast(Message),
    ArmElectionTimer,
    ArmHeartbeatTimer,
}

/// The Follower/Candidate/Leader state machine.
///
/// Pure with respect to I/O and time: every event is handled to
/// completion and returns the actions it wants performed. All consensus
/// bookkeeping lives in [`ConsensusState`] and is carried across role
/// transitions.
#[derive(Debug)]
pub struct StateMachine {
    name: String,
    /// Total cluster size, participants plus self.
    cluster_size: usize,
    pub state: ConsensusState,
    pub role: Role,
}

impl StateMachine {
    pub fn new(name: impl Into<String>, cluster_size: usize) -> Self {
        Self {
            name: name.into(),
            cluster_size,
            state: ConsensusState::new(),
            role: Role::Follower,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn term(&self) -> Term {
        self.state.term
    }

    pub fn role_kind(&self) -> RoleKind {
        self.role.kind()
    }

    /// Minimum ballots needed to take leadership: floor(N/2) + 1.
    pub fn quorum(&self) -> u64 {
        (self.cluster_size / 2 + 1) as u64
    }

    fn meta(&self) -> NodeMeta {
        NodeMeta {
            name: self.name.clone(),
            term: self.state.term,
            log_position: self.state.log_position,
        }
    }

    /// Enter the initial Follower role.
    pub fn start(&mut self) -> Vec<Action> {
        tracing::info!(node = %self.name, "starting as follower");
        self.role = Role::Follower;
        vec![Action::ArmElectionTimer]
    }

    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::Message(Message::Heartbeat { meta_info, .. }) => self.on_heartbeat(meta_info),
            Event::Message(Message::LogEntry { meta_info, .. }) => self.on_log_entry(meta_info),
            Event::Message(Message::Election { meta_info, .. }) => self.on_vote_request(meta_info),
            Event::Message(Message::ElectionResponse {
                data_body,
                meta_info,
            }) => self.on_vote_response(data_body, meta_info),
            Event::ElectionTimeout => self.on_election_timeout(),
            Event::HeartbeatTick => self.on_heartbeat_tick(),
        }
    }

    fn on_heartbeat(&mut self, meta: NodeMeta) -> Vec<Action> {
        match self.role {
            Role::Follower => {
                if meta.term >= self.state.term {
                    self.state.observe_term(meta.term);
                    vec![Action::ArmElectionTimer]
                } else {
                    tracing::debug!(leader = %meta.name, term = meta.term, "stale heartbeat ignored");
                    vec![]
                }
            }
            Role::Candidate { .. } => {
                if meta.term >= self.state.term {
                    tracing::info!(
                        leader = %meta.name,
                        term = meta.term,
                        "another leader is active, abandoning candidacy"
                    );
                    self.state.observe_term(meta.term);
                    self.transition(RoleKind::Follower)
                } else {
                    vec![]
                }
            }
            // An elected leader does not react to peer heartbeats.
            Role::Leader => vec![],
        }
    }

    fn on_log_entry(&mut self, meta: NodeMeta) -> Vec<Action> {
        // Placeholder message type; replication is not implemented.
        tracing::debug!(from = %meta.name, log_position = meta.log_position, "log entry ignored");
        vec![]
    }

    fn on_vote_request(&mut self, meta: NodeMeta) -> Vec<Action> {
        match self.role {
            Role::Follower => {
                if self.state.has_voted(meta.term) {
                    tracing::debug!(
                        candidate = %meta.name,
                        term = meta.term,
                        "vote exhausted this term, denying"
                    );
                    return vec![self.deny(&meta)];
                }
                if meta.term >= self.state.term {
                    self.state.observe_term(meta.term);
                    self.state.record_vote(meta.term, &meta.name);
                    tracing::info!(candidate = %meta.name, term = meta.term, "granting vote");
                    vec![
                        Action::ArmElectionTimer,
                        Action::Send {
                            to: meta.name.clone(),
                            message: Message::vote_response(self.meta(), true),
                        },
                    ]
                } else {
                    tracing::debug!(candidate = %meta.name, term = meta.term, "stale vote request");
                    vec![self.deny(&meta)]
                }
            }
            // A campaigning candidate does not grant votes.
            Role::Candidate { .. } => vec![self.deny(&meta)],
            Role::Leader => {
                if meta.term > self.state.term {
                    // A higher term proves a newer election is in
                    // progress and this leader is stale.
                    tracing::info!(
                        candidate = %meta.name,
                        term = meta.term,
                        "higher-term election in progress, stepping down"
                    );
                    self.state.observe_term(meta.term);
                    self.state.record_vote(meta.term, &meta.name);
                    let mut actions = vec![Action::Send {
                        to: meta.name.clone(),
                        message: Message::vote_response(self.meta(), true),
                    }];
                    actions.extend(self.transition(RoleKind::Follower));
                    actions
                } else {
                    vec![self.deny(&meta)]
                }
            }
        }
    }

    fn on_vote_response(&mut self, ballot: Ballot, meta: NodeMeta) -> Vec<Action> {
        let Role::Candidate { votes } = &mut self.role else {
            // Followers never requested votes; leaders ignore strays.
            tracing::debug!(from = %meta.name, "unexpected vote response ignored");
            return vec![];
        };
        if !ballot.granted {
            tracing::debug!(from = %meta.name, term = meta.term, "vote denied");
            return vec![];
        }
        if meta.term != self.state.term {
            tracing::debug!(
                from = %meta.name,
                ballot_term = meta.term,
                current_term = self.state.term,
                "ballot from a stale round ignored"
            );
            return vec![];
        }

        *votes += 1;
        let votes = *votes;
        tracing::debug!(from = %meta.name, votes, needed = self.quorum(), "vote granted");
        if votes >= self.quorum() {
            tracing::info!(term = self.state.term, votes, "won election");
            return self.transition(RoleKind::Leader);
        }
        vec![]
    }

    fn on_election_timeout(&mut self) -> Vec<Action> {
        match self.role {
            Role::Follower => {
                tracing::info!(term = self.state.term, "election timeout, becoming candidate");
                self.transition(RoleKind::Candidate)
            }
            // A stalled election retries with a fresh, higher-term round.
            Role::Candidate { .. } => {
                tracing::info!(term = self.state.term, "election round stalled, retrying");
                self.transition(RoleKind::Candidate)
            }
            Role::Leader => {
                tracing::debug!("stale election timer fired on leader, ignoring");
                vec![]
            }
        }
    }

    fn on_heartbeat_tick(&mut self) -> Vec<Action> {
        match self.role {
            Role::Leader => vec![
                Action::Broadcast(Message::heartbeat(self.meta())),
                Action::ArmHeartbeatTimer,
            ],
            _ => {
                tracing::debug!("stale heartbeat timer fired, ignoring");
                vec![]
            }
        }
    }

    /// Tear down the current role and enter `to`, carrying the shared
    /// state forward. The returned actions include the new role's timer,
    /// which the orchestrator arms after cancelling the old one.
    fn transition(&mut self, to: RoleKind) -> Vec<Action> {
        let from = self.role.kind();
        tracing::info!(node = %self.name, %from, %to, term = self.state.term, "role transition");
        match to {
            RoleKind::Follower => {
                self.role = Role::Follower;
                vec![Action::ArmElectionTimer]
            }
            RoleKind::Candidate => self.enter_candidate(),
            RoleKind::Leader => {
                self.role = Role::Leader;
                // First heartbeat goes out immediately so followers are
                // suppressed without waiting one interval.
                vec![
                    Action::Broadcast(Message::heartbeat(self.meta())),
                    Action::ArmHeartbeatTimer,
                ]
            }
        }
    }

    fn enter_candidate(&mut self) -> Vec<Action> {
        self.state.term += 1;
        let term = self.state.term;
        let name = self.name.clone();
        self.state.record_vote(term, &name);
        self.role = Role::Candidate { votes: 1 };
        tracing::info!(term, "requesting votes");

        if 1 >= self.quorum() {
            // Single-node cluster: the self-vote already carries quorum.
            return self.transition(RoleKind::Leader);
        }
        vec![
            Action::Broadcast(Message::vote_request(self.meta())),
            Action::ArmElectionTimer,
        ]
    }

    fn deny(&self, meta: &NodeMeta) -> Action {
        Action::Send {
            to: meta.name.clone(),
            message: Message::vote_response(self.meta(), false),
        }
    }
}
