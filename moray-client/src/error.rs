/// Error types for the Moray client
use crate::unary::Cardinality;
use thiserror::Error;
use tonic::Status;

/// Failure reported by the RPC context.
///
/// Passed through to callers unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Server unavailable: {0}")]
    Unavailable(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    /// Error reported by the server itself, e.g. `ObjectNotFoundError`
    #[error("{name}: {message}")]
    Remote { name: String, message: String },
}

impl TransportError {
    pub fn remote(name: impl Into<String>, message: impl Into<String>) -> Self {
        TransportError::Remote {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Server-side error name, if the server reported one
    pub fn remote_name(&self) -> Option<&str> {
        match self {
            TransportError::Remote { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Convert gRPC Status to TransportError
impl From<Status> for TransportError {
    fn from(status: Status) -> Self {
        let msg = status.message().to_string();

        match status.code() {
            tonic::Code::Unavailable => TransportError::Unavailable(msg),
            tonic::Code::DeadlineExceeded => TransportError::Timeout(msg),
            tonic::Code::Cancelled => TransportError::Cancelled(msg),
            tonic::Code::NotFound => TransportError::remote("ObjectNotFoundError", msg),
            tonic::Code::FailedPrecondition => TransportError::remote("EtagConflictError", msg),
            tonic::Code::InvalidArgument => TransportError::remote("InvalidQueryError", msg),
            tonic::Code::ResourceExhausted => TransportError::remote("OverloadedError", msg),
            tonic::Code::Unimplemented => TransportError::remote("NotImplementedError", msg),
            code => TransportError::remote(format!("{:?}", code), msg),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{method}: expected {expected} response message(s), received {received}")]
    ProtocolCardinality {
        method: &'static str,
        expected: Cardinality,
        received: usize,
    },

    #[error("Server did not handle requested options: {}", .0.join(", "))]
    UnhandledOptions(Vec<String>),

    #[error("{method}: malformed response: {reason}")]
    MalformedResponse { method: &'static str, reason: String },
}

impl ClientError {
    /// Returns a stable error code for this error variant.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ClientError::Transport(_) => "TRANSPORT_ERROR",
            ClientError::ProtocolCardinality { .. } => "PROTOCOL_CARDINALITY",
            ClientError::UnhandledOptions(_) => "UNHANDLED_OPTIONS",
            ClientError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
        }
    }

    /// Returns true if repeating the call could succeed.
    ///
    /// Only transient transport failures qualify; whether to retry is up to
    /// the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(TransportError::Connection(_)) => true,
            ClientError::Transport(TransportError::Unavailable(_)) => true,
            ClientError::Transport(TransportError::Timeout(_)) => true,
            ClientError::Transport(_) => false,
            ClientError::InvalidArgument(_) => false,
            ClientError::ProtocolCardinality { .. } => false,
            ClientError::UnhandledOptions(_) => false,
            ClientError::MalformedResponse { .. } => false,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ClientError::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
