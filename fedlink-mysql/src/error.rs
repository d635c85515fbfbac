//! Error types for the MySQL backend.

use thiserror::Error;

use fedlink_connector::ConnectorError;

#[derive(Debug, Error)]
pub enum MySqlError {
    /// Network, TLS or protocol failure
    #[error("MySQL driver error: {0}")]
    Driver(String),

    /// Server rejected the statement
    #[error("MySQL server error {code}: {message}")]
    Server { code: u16, message: String },

    /// Value that does not fit its column
    #[error("MySQL value decode error: {0}")]
    Decode(String),

    /// Column type the connector cannot represent
    #[error("Unsupported MySQL type: {0}")]
    UnsupportedType(String),
}

impl MySqlError {
    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedType(msg.into())
    }
}

impl From<mysql_async::Error> for MySqlError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Server(e) => Self::Server {
                code: e.code,
                message: e.message,
            },
            other => Self::Driver(other.to_string()),
        }
    }
}

impl From<MySqlError> for ConnectorError {
    fn from(err: MySqlError) -> Self {
        match err {
            MySqlError::Driver(msg) => ConnectorError::Transport(msg),
            e @ MySqlError::Server { .. } => ConnectorError::Query(e.to_string()),
            MySqlError::Decode(msg) => ConnectorError::MalformedRow(msg),
            MySqlError::UnsupportedType(msg) => ConnectorError::UnsupportedType(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, MySqlError>;
