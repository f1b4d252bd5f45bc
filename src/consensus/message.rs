use serde::{Deserialize, Serialize};

/// Monotonically increasing logical clock partitioning time into
/// leadership epochs.
pub type Term = u64;

/// Sender metadata attached to every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub name: String,
    pub term: Term,
    /// Last known index into the (unimplemented) replicated log.
    pub log_position: u64,
}

/// Body of an `election_response` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub granted: bool,
}

/// The wire-level message envelope.
///
/// Serialized shape is `{data_type, data_body, meta_info}` with
/// `data_type` one of `heartbeat`, `log_entry`, `election`,
/// `election_response`. Unknown tags fail to decode and are dropped at
/// the transport boundary as protocol errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "data_type", rename_all = "snake_case")]
pub enum Message {
    Heartbeat {
        #[serde(default)]
        data_body: serde_json::Value,
        meta_info: NodeMeta,
    },
    /// Placeholder for replicated log entries. Decoded but not acted on.
    LogEntry {
        #[serde(default)]
        data_body: serde_json::Value,
        meta_info: NodeMeta,
    },
    /// A candidate requesting votes for the term in its metadata.
    Election {
        #[serde(default)]
        data_body: serde_json::Value,
        meta_info: NodeMeta,
    },
    ElectionResponse {
        data_body: Ballot,
        meta_info: NodeMeta,
    },
}

impl Message {
    pub fn heartbeat(meta: NodeMeta) -> Self {
        Message::Heartbeat {
            data_body: serde_json::Value::Null,
            meta_info: meta,
        }
    }

    pub fn vote_request(meta: NodeMeta) -> Self {
        Message::Election {
            data_body: serde_json::Value::Null,
            meta_info: meta,
        }
    }

    pub fn vote_response(meta: NodeMeta, granted: bool) -> Self {
        Message::ElectionResponse {
            data_body: Ballot { granted },
            meta_info: meta,
        }
    }

    /// Sender metadata, regardless of variant.
    pub fn meta(&self) -> &NodeMeta {
        match self {
            Message::Heartbeat { meta_info, .. }
            | Message::LogEntry { meta_info, .. }
            | Message::Election { meta_info, .. }
            | Message::ElectionResponse { meta_info, .. } => meta_info,
        }
    }

    /// Wire tag name, used for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::Heartbeat { .. } => "heartbeat",
            Message::LogEntry { .. } => "log_entry",
            Message::Election { .. } => "election",
            Message::ElectionResponse { .. } => "election_response",
        }
    }
}
