//! Courier Core - shared message and failure types
//!
//! Everything the bus and proxy layers exchange: messages and delivery
//! options, the reply failure taxonomy, and the local error type raised at
//! call sites.

pub mod error;
pub mod failure;
pub mod message;

// Re-exports for convenience
pub use error::{Error, Result};
pub use failure::{Failure, FailureType, Reply, ReplyError, TIMEOUT_MESSAGE};
pub use message::{DeliveryOptions, Headers, Message, ReplyMessage, DEFAULT_REPLY_TIMEOUT};
