//! quorumd: a single-leader cluster-coordination node.
//!
//! Each process runs a Raft-style consensus state machine
//! (Follower/Candidate/Leader) that elects a leader among a fixed set of
//! named peers and keeps the cluster informed of leadership via
//! heartbeats. Log replication is out of scope; the `log_entry` message
//! type exists as a placeholder only.

pub mod bloom;
pub mod config;
pub mod consensus;
pub mod error;
pub mod net;
pub mod node;
pub mod shutdown;
