//! Reply correlation for a single outstanding exchange.
//!
//! A [`PendingCall`] is created when a request leaves and consumed when the
//! transport reports back, so each call completes exactly once.

use std::time::Instant;

use serde_json::Value;

use courier_core::{Failure, FailureType, Reply, ReplyError};

use crate::call::ReplyHandler;
use crate::codec::Codec;

/// An exchange waiting for its reply
#[derive(Debug)]
pub struct PendingCall {
    address: String,
    handler: ReplyHandler,
    started: Instant,
}

impl PendingCall {
    pub fn new(address: impl Into<String>, handler: ReplyHandler) -> Self {
        Self {
            address: address.into(),
            handler,
            started: Instant::now(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Turn the transport acknowledgement into an outcome and deliver it
    pub fn complete<C: Codec>(self, codec: &C, reply: Reply) {
        let outcome = decode(codec, reply);
        let elapsed = self.started.elapsed();

        match &outcome {
            Ok(_) => tracing::debug!(address = %self.address, ?elapsed, "reply received"),
            Err(failure) => tracing::debug!(
                address = %self.address,
                ?elapsed,
                failure_type = %failure.failure_type,
                failure_code = failure.failure_code,
                "request failed"
            ),
        }

        if !self.handler.deliver(outcome) {
            tracing::debug!(address = %self.address, "failure dropped, no failure callback");
        }
    }
}

fn decode<C: Codec>(codec: &C, reply: Reply) -> Result<Value, Failure> {
    match reply {
        Ok(message) => codec.marshal(&message.body).map_err(|err| {
            Failure::new(
                FailureType::Other,
                courier_core::failure::UNSPECIFIED_FAILURE_CODE,
                err.to_string(),
            )
        }),
        Err(cause) => Err(unwrap_cause(cause)),
    }
}

fn unwrap_cause(cause: ReplyError) -> Failure {
    Failure::from_cause(&cause)
}
