//! Typed errors at the seams where callers branch on the failure kind.
//! The application boundary (supervisor, config, persistence) uses
//! `anyhow::Result` with `.context(..)`; these variants exist only where
//! a match on the kind matters (§7 of the design).

use thiserror::Error;

/// Why a normalizer dropped or failed to parse a frame (§4.3 drop conditions).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("unparseable number in field `{0}`")]
    BadNumber(&'static str),

    #[error("event not a top-of-book update")]
    NotAnUpdate,

    #[error("gzip decompression failed: {0}")]
    Gzip(#[from] std::io::Error),
}

/// Why a session's connection attempt or stream ended (§4.4, §7).
#[derive(Debug, Error)]
pub enum SessionFault {
    #[error("connect failed: {0}")]
    Connect(#[source] anyhow::Error),

    #[error("bootstrap failed: {0}")]
    Bootstrap(#[source] anyhow::Error),

    #[error("subscription failed: {0}")]
    Subscribe(#[source] anyhow::Error),

    #[error("websocket read error: {0}")]
    Read(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("server closed the connection")]
    ServerClose,

    #[error("pong not received within timeout")]
    PongTimeout,

    #[error("no market data received within timeout")]
    DataStale,

    #[error("update channel closed")]
    ChannelClosed,
}
