use thiserror::Error;

/// The closed set of ways a remote invocation, or the local dispatch path
/// standing in for one, can fail.
///
/// `linearise` treats every variant identically: the targeted reference is
/// dropped from `N` (or never added). `timeout`'s outbound `linearise` calls
/// log-and-swallow every variant instead of propagating it.
#[derive(Debug, Error, Clone)]
pub enum CallError {
    #[error("transport error reaching {0}: {1}")]
    Transport(std::net::SocketAddr, String),

    #[error("peer raised during dispatch of {method}: {message}")]
    RemoteMethod { method: String, message: String },

    #[error("method {0} is not registered on the peer")]
    UnknownMethod(String),

    #[error("value is outside the serialisable universe: {0}")]
    UnknownType(String),

    #[error("node is not Running")]
    Stopped,

    #[error("reference used as a Skip+ peer has no rs")]
    MissingRs,
}

pub type CallResult<T> = Result<T, CallError>;
