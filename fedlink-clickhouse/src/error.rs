//! Error types for the ClickHouse backend.

use thiserror::Error;

use fedlink_connector::ConnectorError;

#[derive(Debug, Error)]
pub enum ClickHouseError {
    /// HTTP request failed before a response arrived
    #[error("ClickHouse HTTP error: {0}")]
    Http(String),

    /// Server answered with an exception
    #[error("ClickHouse server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Response body is not in the expected format
    #[error("ClickHouse response decode error: {0}")]
    Decode(String),

    /// Type name the connector cannot represent
    #[error("Unsupported ClickHouse type: {0}")]
    UnsupportedType(String),

    /// Client configuration problem
    #[error("ClickHouse client configuration error: {0}")]
    Config(String),
}

impl ClickHouseError {
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedType(msg.into())
    }
}

impl From<ClickHouseError> for ConnectorError {
    fn from(err: ClickHouseError) -> Self {
        match err {
            ClickHouseError::Http(msg) => ConnectorError::Transport(msg),
            e @ ClickHouseError::Server { .. } => ConnectorError::Transport(e.to_string()),
            ClickHouseError::Decode(msg) => ConnectorError::MalformedRow(msg),
            ClickHouseError::UnsupportedType(msg) => ConnectorError::UnsupportedType(msg),
            ClickHouseError::Config(msg) => ConnectorError::Config(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClickHouseError>;
