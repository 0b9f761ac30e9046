use thiserror::Error;

/// Local, synchronous errors raised at the call site before any I/O.
///
/// Remote outcomes never show up here; they reach the caller as a
/// [`Failure`](crate::Failure) through the reply callback.
#[derive(Error, Debug)]
pub enum Error {
    /// The supplied call shape does not match any accepted form.
    #[error("function invoked with invalid arguments")]
    InvalidArguments,

    #[error("Proxy is closed")]
    ProxyClosed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
