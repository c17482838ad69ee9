/*!
    Error types shared by every crate in the workspace.
*/

use thiserror::Error;

/**
    Errors produced while configuring streams, encoding frames and muxing packets.

    All of these are reported synchronously to the caller of the failing
    operation. None of them are retried internally.
*/
#[derive(Debug, Error)]
pub enum Error {
    // ── Time ───────────────────────────────────────────────────────────
    #[error("invalid rational {num}/{den}")]
    InvalidRational { num: i64, den: i64 },
    #[error("timestamp {value} does not fit after rescaling")]
    TimestampOverflow { value: i64 },

    // ── Stream setup ───────────────────────────────────────────────────
    #[error("unknown codec '{0}'")]
    UnknownCodec(String),
    #[error("stream parameter '{0}' cannot change after the first frame")]
    StreamLocked(&'static str),
    #[error("stream parameter '{0}' is not set")]
    MissingParameter(&'static str),
    #[error("invalid stream parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    // ── Encoding ───────────────────────────────────────────────────────
    #[error("frame does not match stream format: {0}")]
    FormatMismatch(String),
    #[error("stream is flushing and accepts no more frames")]
    EndOfStream,

    // ── Muxing ─────────────────────────────────────────────────────────
    #[error("muxer is closed")]
    MuxerClosed,
    #[error("stream index {0} is not owned by this muxer")]
    UnknownStream(usize),
    #[error("stream {stream}: decode timestamp {current} precedes {previous}")]
    NonMonotonicTimestamp {
        stream: usize,
        previous: i64,
        current: i64,
    },

    // ── Backends and I/O ───────────────────────────────────────────────
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    pub fn format_mismatch(msg: impl Into<String>) -> Self {
        Self::FormatMismatch(msg.into())
    }

    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/**
    Type alias for results that may return an [`Error`].
*/
pub type Result<T> = std::result::Result<T, Error>;
