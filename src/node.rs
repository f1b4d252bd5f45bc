use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::consensus::machine::{Action, Event, StateMachine};
use crate::consensus::message::{Message, Term};
use crate::consensus::state::RoleKind;
use crate::consensus::timer::{self, random_election_timeout, TimerHandle};
use crate::error::{QuorumError, Result};
use crate::net::{self, PeerMesh};

/// Observable snapshot of the node, published after every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStatus {
    pub role: RoleKind,
    pub term: Term,
}

/// The composition root: owns configuration, the state machine, the
/// peer mesh, and the single active timer. All state mutation happens
/// on the one task running [`Node::run`].
pub struct Node {
    config: NodeConfig,
    status_tx: watch::Sender<NodeStatus>,
    status_rx: watch::Receiver<NodeStatus>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        let (status_tx, status_rx) = watch::channel(NodeStatus {
            role: RoleKind::Follower,
            term: 0,
        });
        Self {
            config,
            status_tx,
            status_rx,
        }
    }

    /// Subscribe to role/term changes. Used by operators and the test
    /// harness; the consensus path never reads it.
    pub fn watch_status(&self) -> watch::Receiver<NodeStatus> {
        self.status_rx.clone()
    }

    /// Bind the listener, start the peer mesh, then serve the event
    /// loop until `shutdown` fires. Bind failure is fatal.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let config = self.config;
        std::fs::create_dir_all(&config.dbpath)?;

        let listener = TcpListener::bind(config.listen_addr.as_str())
            .await
            .map_err(|source| QuorumError::Bind {
                addr: config.listen_addr.clone(),
                source,
            })?;
        tracing::info!(node = %config.name, addr = %config.listen_addr, "listening");

        let (inbound_tx, mut inbound_rx) = mpsc::channel::<Message>(128);
        let (event_tx, mut event_rx) = mpsc::channel::<Event>(128);

        let _accept_loop = net::spawn_inbound(listener, inbound_tx, shutdown.clone());

        let mesh = Arc::new(PeerMesh::new(config.participants.clone()));
        {
            let mesh = mesh.clone();
            let interval = Duration::from_millis(config.reconnect_interval_ms);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { mesh.reconnect_cycle(interval, shutdown).await });
        }

        let mut event_loop = EventLoop {
            machine: StateMachine::new(config.name.clone(), config.cluster_size()),
            mesh,
            events: event_tx,
            active_timer: None,
            status: self.status_tx,
            election_timeout_min_ms: config.election_timeout_min_ms,
            election_timeout_max_ms: config.election_timeout_max_ms,
            heartbeat_interval_ms: config.heartbeat_interval_ms,
        };

        let actions = event_loop.machine.start();
        event_loop.apply(actions).await;

        loop {
            tokio::select! {
                Some(message) = inbound_rx.recv() => {
                    event_loop.dispatch(Event::Message(message)).await;
                }
                Some(event) = event_rx.recv() => {
                    event_loop.dispatch(event).await;
                }
                _ = shutdown.cancelled() => {
                    event_loop.cancel_timer();
                    tracing::info!(node = %config.name, "node stopped");
                    return Ok(());
                }
            }
        }
    }
}

/// Single-owner dispatch loop state. Every inbound message and timer
/// firing is handled to completion before the next, so consensus state
/// needs no locking.
struct EventLoop {
    machine: StateMachine,
    mesh: Arc<PeerMesh>,
    events: mpsc::Sender<Event>,
    /// The one live timer; the previous role's timer is always
    /// cancelled before the next is armed.
    active_timer: Option<TimerHandle>,
    status: watch::Sender<NodeStatus>,
    election_timeout_min_ms: u64,
    election_timeout_max_ms: u64,
    heartbeat_interval_ms: u64,
}

impl EventLoop {
    async fn dispatch(&mut self, event: Event) {
        let actions = self.machine.handle(event);
        self.apply(actions).await;
    }

    async fn apply(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send { to, message } => {
                    self.mesh.send(&to, &message).await;
                }
                Action::Broadcast(message) => {
                    self.mesh.broadcast(&message).await;
                }
                Action::ArmElectionTimer => self.arm_election_timer(),
                Action::ArmHeartbeatTimer => self.arm_heartbeat_timer(),
            }
        }
        self.status.send_replace(NodeStatus {
            role: self.machine.role_kind(),
            term: self.machine.term(),
        });
    }

    fn arm_election_timer(&mut self) {
        self.cancel_timer();
        let delay = random_election_timeout(
            self.election_timeout_min_ms,
            self.election_timeout_max_ms,
        );
        let events = self.events.clone();
        self.active_timer = Some(timer::after(delay, move || {
            let _ = events.try_send(Event::ElectionTimeout);
        }));
    }

    fn arm_heartbeat_timer(&mut self) {
        self.cancel_timer();
        let delay = Duration::from_millis(self.heartbeat_interval_ms);
        let events = self.events.clone();
        self.active_timer = Some(timer::after(delay, move || {
            let _ = events.try_send(Event::HeartbeatTick);
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.active_timer.take() {
            timer.cancel();
        }
    }
}
