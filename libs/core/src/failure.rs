//! Failure taxonomy for remote calls.
//!
//! Transports report a [`ReplyError`] describing why an exchange failed. The
//! caller never sees that cause directly: it is unwrapped into a [`Failure`]
//! record, which is the only thing failure callbacks receive. The record's
//! `failureType` strings are matched verbatim by callers, so they must not
//! change.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::message::ReplyMessage;

/// Message carried by every timeout failure
pub const TIMEOUT_MESSAGE: &str = "Timed out waiting for reply";

/// Failure code used when the cause carries none of its own
pub const UNSPECIFIED_FAILURE_CODE: i32 = -1;

/// Outcome of a request as reported by a transport
pub type Reply = std::result::Result<ReplyMessage, ReplyError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    /// No consumer registered at the destination address
    NoHandlers,
    /// The remote handler failed the request
    RecipientFailure,
    /// No reply arrived before the deadline
    Timeout,
    Other,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::NoHandlers => "NO_HANDLERS",
            FailureType::RecipientFailure => "RECIPIENT_FAILURE",
            FailureType::Timeout => "TIMEOUT",
            FailureType::Other => "OTHER",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level cause of a failed exchange
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplyError {
    #[error("No handlers for address {address}")]
    NoHandlers { address: String },

    #[error("{message}")]
    RecipientFailure {
        code: i32,
        message: String,
        debug_info: Option<Value>,
    },

    #[error("Timed out waiting for reply")]
    Timeout { address: String, after: Duration },

    #[error("{0}")]
    Other(String),
}

impl ReplyError {
    pub fn recipient(code: i32, message: impl Into<String>) -> Self {
        Self::RecipientFailure {
            code,
            message: message.into(),
            debug_info: None,
        }
    }

    /// A recipient failure carrying structured debug data
    pub fn recipient_with_debug_info(
        code: i32,
        message: impl Into<String>,
        debug_info: Option<Value>,
    ) -> Self {
        Self::RecipientFailure {
            code,
            message: message.into(),
            debug_info,
        }
    }
}

/// The stable `{failureType, failureCode, message}` record handed to callers.
///
/// Recipient failures may also carry `debugInfo`, which is left out of the
/// serialized form when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub failure_type: FailureType,
    pub failure_code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<Value>,
}

impl Failure {
    pub fn new(failure_type: FailureType, failure_code: i32, message: impl Into<String>) -> Self {
        Self {
            failure_type,
            failure_code,
            message: message.into(),
            debug_info: None,
        }
    }

    pub fn with_debug_info(mut self, debug_info: Value) -> Self {
        self.debug_info = Some(debug_info);
        self
    }

    /// Unwrap a transport failure cause into its record.
    ///
    /// Recipient failures keep their code and message untouched.
    pub fn from_cause(cause: &ReplyError) -> Self {
        match cause {
            ReplyError::NoHandlers { .. } => Self::new(
                FailureType::NoHandlers,
                UNSPECIFIED_FAILURE_CODE,
                cause.to_string(),
            ),
            ReplyError::RecipientFailure {
                code,
                message,
                debug_info,
            } => Self {
                debug_info: debug_info.clone(),
                ..Self::new(FailureType::RecipientFailure, *code, message.clone())
            },
            ReplyError::Timeout { .. } => Self::new(
                FailureType::Timeout,
                UNSPECIFIED_FAILURE_CODE,
                TIMEOUT_MESSAGE,
            ),
            ReplyError::Other(message) => {
                Self::new(FailureType::Other, UNSPECIFIED_FAILURE_CODE, message.clone())
            }
        }
    }
}

impl From<ReplyError> for Failure {
    fn from(cause: ReplyError) -> Self {
        Self::from_cause(&cause)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.failure_type, self.failure_code, self.message
        )
    }
}

impl std::error::Error for Failure {}
