use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

use crate::consensus::message::Message;
use crate::error::{QuorumError, Result};

/// Ceiling for per-peer reconnect backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

type PeerLink = FramedWrite<TcpStream, LengthDelimitedCodec>;

#[derive(Debug)]
struct Backoff {
    failures: u32,
    next_attempt: Instant,
}

/// Maintains outbound framed TCP links to every other cluster member.
///
/// Outbound links are write-only; inbound connections are accepted
/// separately and only read from. Delivery is best-effort and
/// at-most-once: a failed write drops the link and reports the message
/// as undelivered, and only the connection itself is retried.
pub struct PeerMesh {
    /// participant name -> host:port
    roster: HashMap<String, String>,
    links: Mutex<HashMap<String, PeerLink>>,
    backoff: Mutex<HashMap<String, Backoff>>,
}

impl PeerMesh {
    pub fn new(roster: HashMap<String, String>) -> Self {
        Self {
            roster,
            links: Mutex::new(HashMap::new()),
            backoff: Mutex::new(HashMap::new()),
        }
    }

    /// Establish an outbound link to `peer` unless one already exists.
    /// The membership check doubles as duplicate-attempt suppression.
    pub async fn connect(&self, peer: &str) -> Result<()> {
        if self.links.lock().await.contains_key(peer) {
            return Ok(());
        }
        let addr = self
            .roster
            .get(peer)
            .ok_or_else(|| QuorumError::PeerUnavailable(peer.to_string()))?;

        let stream = TcpStream::connect(addr.as_str()).await?;
        let link = FramedWrite::new(stream, LengthDelimitedCodec::new());
        self.links.lock().await.insert(peer.to_string(), link);
        tracing::info!(peer, addr = %addr, "connected to peer");
        Ok(())
    }

    /// Send one framed message to `peer`. Returns whether the message
    /// was handed to the transport; `false` means dropped (absent or
    /// broken link). A failed write removes the link, making the peer
    /// eligible for the next reconnect cycle.
    pub async fn send(&self, peer: &str, message: &Message) -> bool {
        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(peer, %error, "failed to encode message");
                return false;
            }
        };

        let mut links = self.links.lock().await;
        let Some(link) = links.get_mut(peer) else {
            tracing::debug!(peer, tag = message.tag(), "peer not connected, message dropped");
            return false;
        };
        if let Err(error) = link.send(Bytes::from(payload)).await {
            tracing::warn!(peer, %error, "peer link lost");
            links.remove(peer);
            return false;
        }
        true
    }

    /// Send to every participant. Returns how many deliveries succeeded.
    pub async fn broadcast(&self, message: &Message) -> usize {
        let mut delivered = 0;
        let peers: Vec<String> = self.roster.keys().cloned().collect();
        for peer in peers {
            if self.send(&peer, message).await {
                delivered += 1;
            }
        }
        delivered
    }

    pub async fn connected_peers(&self) -> Vec<String> {
        self.links.lock().await.keys().cloned().collect()
    }

    /// Background reconnection cycle: every `interval`, attempt to
    /// connect to each participant currently absent from the link map,
    /// subject to that peer's backoff window. Runs until `shutdown`.
    pub async fn reconnect_cycle(&self, interval: Duration, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.cancelled() => {
                    tracing::debug!("reconnect cycle stopped");
                    return;
                }
            }
            self.connect_absent(interval).await;
        }
    }

    async fn connect_absent(&self, interval: Duration) {
        let absent: Vec<String> = {
            let links = self.links.lock().await;
            self.roster
                .keys()
                .filter(|name| !links.contains_key(*name))
                .cloned()
                .collect()
        };

        for peer in absent {
            let now = Instant::now();
            {
                let backoff = self.backoff.lock().await;
                if let Some(entry) = backoff.get(&peer) {
                    if now < entry.next_attempt {
                        continue;
                    }
                }
            }

            match self.connect(&peer).await {
                Ok(()) => {
                    self.backoff.lock().await.remove(&peer);
                }
                Err(error) => {
                    let mut backoff = self.backoff.lock().await;
                    let failures = backoff.get(&peer).map_or(0, |b| b.failures) + 1;
                    let delay = next_backoff(interval, failures);
                    tracing::debug!(
                        peer = %peer,
                        %error,
                        failures,
                        retry_in_ms = delay.as_millis() as u64,
                        "peer unreachable"
                    );
                    backoff.insert(
                        peer,
                        Backoff {
                            failures,
                            next_attempt: now + delay,
                        },
                    );
                }
            }
        }
    }
}

/// Bounded exponential backoff: interval * 2^(failures-1), capped.
fn next_backoff(interval: Duration, failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(5);
    std::cmp::min(interval * 2u32.pow(exp), MAX_BACKOFF)
}

/// Accept inbound connections and forward every decoded message to the
/// `inbound` handler channel. Malformed frames close the offending
/// connection; the node keeps running.
pub fn spawn_inbound(
    listener: TcpListener,
    inbound: mpsc::Sender<Message>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let stream = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tracing::debug!(%addr, "inbound connection");
                        stream
                    }
                    Err(error) => {
                        tracing::warn!(%error, "accept failed");
                        continue;
                    }
                },
                _ = shutdown.cancelled() => return,
            };
            tokio::spawn(read_link(stream, inbound.clone()));
        }
    })
}

async fn read_link(stream: TcpStream, inbound: mpsc::Sender<Message>) {
    let mut frames = FramedRead::new(stream, LengthDelimitedCodec::new());
    while let Some(frame) = frames.next().await {
        let bytes = match frame {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(%error, "framing error, closing connection");
                return;
            }
        };
        match serde_json::from_slice::<Message>(&bytes) {
            Ok(message) => {
                if inbound.send(message).await.is_err() {
                    return;
                }
            }
            Err(error) => {
                tracing::warn!(%error, "malformed message dropped, closing connection");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::message::NodeMeta;

    fn meta(name: &str, term: u64) -> NodeMeta {
        NodeMeta {
            name: name.to_string(),
            term,
            log_position: 0,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let interval = Duration::from_secs(2);
        assert_eq!(next_backoff(interval, 1), Duration::from_secs(2));
        assert_eq!(next_backoff(interval, 2), Duration::from_secs(4));
        assert_eq!(next_backoff(interval, 3), Duration::from_secs(8));
        assert_eq!(next_backoff(interval, 10), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn send_to_absent_peer_is_dropped() {
        let mesh = PeerMesh::new(HashMap::from([(
            "beta".to_string(),
            "127.0.0.1:1".to_string(),
        )]));
        assert!(!mesh.send("beta", &Message::heartbeat(meta("alpha", 1))).await);
        assert!(!mesh.send("nobody", &Message::heartbeat(meta("alpha", 1))).await);
    }

    #[tokio::test]
    async fn broadcast_with_no_links_delivers_nothing() {
        let mesh = PeerMesh::new(HashMap::from([
            ("beta".to_string(), "127.0.0.1:1".to_string()),
            ("gamma".to_string(), "127.0.0.1:2".to_string()),
        ]));
        assert_eq!(mesh.broadcast(&Message::heartbeat(meta("alpha", 1))).await, 0);
    }

    #[tokio::test]
    async fn connect_to_unknown_peer_fails() {
        let mesh = PeerMesh::new(HashMap::new());
        assert!(mesh.connect("ghost").await.is_err());
    }

    #[tokio::test]
    async fn framed_send_reaches_inbound_handler() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let _accept_loop = spawn_inbound(listener, tx, shutdown.clone());

        let mesh = PeerMesh::new(HashMap::from([("beta".to_string(), addr.to_string())]));
        mesh.connect("beta").await.unwrap();

        let sent = Message::vote_request(meta("alpha", 4));
        assert!(mesh.send("beta", &sent).await);
        // A second message on the same stream must survive framing.
        let sent2 = Message::heartbeat(meta("alpha", 4));
        assert!(mesh.send("beta", &sent2).await);

        assert_eq!(rx.recv().await.unwrap(), sent);
        assert_eq!(rx.recv().await.unwrap(), sent2);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn malformed_frame_closes_connection_but_keeps_listener() {
        use tokio::io::AsyncWriteExt;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let _accept_loop = spawn_inbound(listener, tx, shutdown.clone());

        // A well-formed frame carrying garbage JSON.
        let mut bad = TcpStream::connect(addr).await.unwrap();
        let garbage = b"not json";
        bad.write_all(&(garbage.len() as u32).to_be_bytes()).await.unwrap();
        bad.write_all(garbage).await.unwrap();
        bad.flush().await.unwrap();

        // The listener must still accept fresh connections afterwards.
        let mesh = PeerMesh::new(HashMap::from([("beta".to_string(), addr.to_string())]));
        mesh.connect("beta").await.unwrap();
        let sent = Message::heartbeat(meta("alpha", 9));
        assert!(mesh.send("beta", &sent).await);

        assert_eq!(rx.recv().await.unwrap(), sent);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn duplicate_connect_is_suppressed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let _accept_loop = spawn_inbound(listener, tx, shutdown.clone());

        let mesh = PeerMesh::new(HashMap::from([("beta".to_string(), addr.to_string())]));
        mesh.connect("beta").await.unwrap();
        mesh.connect("beta").await.unwrap();
        assert_eq!(mesh.connected_peers().await, vec!["beta".to_string()]);
        shutdown.cancel();
    }
}
