use arrow_schema::ArrowError;
use thiserror::Error;
use tonic::Code;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for Flightline crates.
///
/// Transport status codes are mapped into these variants once, at the session
/// boundary (see the `From<tonic::Status>` impl). Nothing in the workspace retries.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Failed to establish channel: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("SQL command failed: {0}")]
    SqlCommand(String),

    /// Any status code without a dedicated variant. `code` is the numeric gRPC code.
    #[error("RPC failed with status {code}: {message}")]
    Status { code: String, message: String },

    #[error("Failed to decode columnar data: {0}")]
    Decode(#[from] ArrowError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn connection(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Connection {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// True for the variants the command layer passes through without re-wrapping.
    pub fn is_typed(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::Authentication(_)
                | Error::Connection { .. }
                | Error::Protocol(_)
                | Error::ServiceUnavailable(_)
                | Error::SqlCommand(_)
        )
    }

    /// Wraps untyped failures into [`Error::SqlCommand`], keeping typed ones as they are.
    pub fn into_command_error(self) -> Self {
        if self.is_typed() {
            self
        } else {
            Error::SqlCommand(self.to_string())
        }
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            Code::Unauthenticated => Error::Authentication(status.message().to_string()),
            Code::Unavailable => Error::ServiceUnavailable(status.message().to_string()),
            code => Error::Status {
                code: (code as i32).to_string(),
                message: status.message().to_string(),
            },
        }
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        Error::Connection {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}
