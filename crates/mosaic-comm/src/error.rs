use thiserror::Error;

/// Fatal communication-layer failures.
///
/// Nothing here is retried or recovered internally: the protocol assumes a
/// reliable, ordered transport, and every violation of the messenger
/// lifecycle indicates a synchronization bug in the calling algorithm.
#[derive(Debug, Error)]
pub enum CommError {
    /// The messenger/terminator lifecycle was violated: double
    /// registration, send on a closed messenger, send to self, reuse of a
    /// finished terminator, a message arriving for the wrong phase.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The underlying transport is gone (disconnected queue or token
    /// ring). The termination protocol has no tolerance for message loss;
    /// this is fatal.
    #[error("transport failure: {0}")]
    TransportFailure(String),
}
