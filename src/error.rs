use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuorumError {
    #[error("invalid cluster config: {0}")]
    Config(String),

    #[error("node {0} not present in cluster config")]
    UnknownNode(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("peer {0} is not connected")]
    PeerUnavailable(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("message encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QuorumError>;
