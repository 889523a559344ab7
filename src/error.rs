//! Error taxonomy for the session handler.

use thiserror::Error;

/// Errors surfaced by [`crate::handler::SessionHandler`] and its collaborators.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Construction-time failure establishing the Redis connection (direct or
    /// via Sentinel). Non-recoverable; carries the last underlying cause.
    #[error("failed to connect to redis: {0}")]
    ConnectionFailed(String),

    /// Admission control tripped in the lock acquisition loop: `wait` already
    /// reached `maxConcurrency` for this session. The caller's framework is
    /// expected to translate this into an HTTP 503.
    #[error("concurrent connection limit exceeded for this session")]
    ConcurrentConnectionsExceeded,

    /// A tagged payload could not be decompressed by the algorithm its tag
    /// names.
    #[error("failed to decode session payload: {0}")]
    DecodeError(String),

    /// Any Redis-level failure during read/write/destroy that isn't one of
    /// the above. `write` catches this locally and returns `false`; `read`
    /// and `destroy` propagate it.
    #[error("redis backend error: {0}")]
    Backend(String),
}

impl From<deadpool_redis::PoolError> for SessionError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::ConnectionFailed(e.to_string())
    }
}

impl From<deadpool_redis::CreatePoolError> for SessionError {
    fn from(e: deadpool_redis::CreatePoolError) -> Self {
        Self::ConnectionFailed(e.to_string())
    }
}

impl From<redis::RedisError> for SessionError {
    fn from(e: redis::RedisError) -> Self {
        Self::Backend(e.to_string())
    }
}
