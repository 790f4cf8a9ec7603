use thiserror::Error;

/// Errors raised by the pure state machine and its driven wrapper.
/// These are programmer errors and are always surfaced synchronously.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MachineError {
    #[error("unknown state: {0}")]
    UnknownState(String),
    #[error("no transitions possible from terminal state: {0}")]
    Terminal(String),
    #[error("cannot transition from {from} to {to}, possible: {possible:?}")]
    Unreachable {
        from: String,
        to: String,
        possible: Vec<String>,
    },
    #[error("machine description is empty")]
    EmptyDescription,
}

/// Errors raised by streams, sources and operators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream is disposed: {reason}")]
    Disposed { reason: String },
    #[error("no event target registered under name: {0}")]
    UnknownTarget(String),
    #[error("unknown field path: {0}")]
    UnknownField(String),
    #[error("value failed to serialize: {0}")]
    Serialize(String),
}
