//! Error types for the Redis backend.

use thiserror::Error;

use fedlink_connector::ConnectorError;

#[derive(Debug, Error)]
pub enum RedisError {
    /// Client or server failure
    #[error("Redis client error: {0}")]
    Client(String),

    /// Query text the translator does not understand
    #[error("Redis query error: {0}")]
    Query(String),

    /// Reply of an unexpected shape
    #[error("Unexpected Redis reply: {0}")]
    Reply(String),

    /// Unknown type name in a description
    #[error("Unsupported Redis type: {0}")]
    UnsupportedType(String),
}

impl RedisError {
    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn reply(msg: impl Into<String>) -> Self {
        Self::Reply(msg.into())
    }
}

impl From<RedisError> for ConnectorError {
    fn from(err: RedisError) -> Self {
        match err {
            RedisError::Client(msg) => ConnectorError::Transport(msg),
            RedisError::Query(msg) => ConnectorError::Query(msg),
            RedisError::Reply(msg) => ConnectorError::CursorProtocol(msg),
            RedisError::UnsupportedType(msg) => ConnectorError::UnsupportedType(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, RedisError>;
