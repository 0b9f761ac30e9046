use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use courier_core::failure::UNSPECIFIED_FAILURE_CODE;
use courier_core::{DeliveryOptions, Error, Failure, FailureType, Result};
use courier_fabric::{Bus, Call, ResultHandler};

use crate::builder::ProxyBuilder;
use crate::signature::MethodSignature;

/// Action sent when a proxy is closed
pub const CLOSE_ACTION: &str = "close";

/// Runtime behind a generated service proxy.
///
/// Bound to one destination address. Each invocation becomes a message
/// `{action: <method>, <param>: value, ...}` carrying the proxy's fixed
/// delivery options. Once [`close`](Self::close) succeeds the proxy stays
/// closed and refuses every further call without sending anything.
pub struct ServiceProxy {
    bus: Bus,
    address: String,
    options: DeliveryOptions,
    // Held across check-and-dispatch. The bus keeps dispatch order, so no
    // call accepted before close can reach the service after it.
    closed: Mutex<bool>,
}

impl ServiceProxy {
    pub fn new(bus: &Bus, address: impl Into<String>) -> Self {
        Self::with_options(bus, address, DeliveryOptions::new())
    }

    /// Create a proxy whose calls all carry `options`
    pub fn with_options(bus: &Bus, address: impl Into<String>, options: DeliveryOptions) -> Self {
        Self {
            bus: bus.clone(),
            address: address.into(),
            options,
            closed: Mutex::new(false),
        }
    }

    pub fn builder(bus: &Bus) -> ProxyBuilder {
        ProxyBuilder::new(bus)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The bus this proxy sends through
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn options(&self) -> &DeliveryOptions {
        &self.options
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Invoke a remote operation.
    ///
    /// Fails synchronously when the arguments do not match `method` or the
    /// proxy is closed. Returns the proxy itself for fluent stubs.
    pub fn invoke(
        &self,
        method: &MethodSignature,
        args: Vec<Value>,
        on_result: Option<ResultHandler>,
    ) -> Result<&Self> {
        method.validate(&args, on_result.is_some())?;

        let closed = self.closed.lock();
        if *closed {
            tracing::debug!(address = %self.address, action = method.name, "call on closed proxy");
            return Err(Error::ProxyClosed);
        }

        let mut call =
            Call::new(self.address.as_str(), method.body(args)).options(self.options.clone());
        if let Some(handler) = on_result {
            call = call.on_result_boxed(handler);
        }
        tracing::debug!(address = %self.address, action = method.name, "invoke");
        self.bus.dispatch(call)?;
        drop(closed);

        Ok(self)
    }

    /// Close the proxy and tell the remote side, without waiting for a reply
    pub fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock();
        if *closed {
            return Err(Error::ProxyClosed);
        }

        let body = json!({ "action": CLOSE_ACTION });
        self.bus
            .dispatch(Call::new(self.address.as_str(), body).options(self.options.clone()))?;
        *closed = true;
        tracing::debug!(address = %self.address, "proxy closed");
        Ok(())
    }
}

impl std::fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("address", &self.address)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Adapt a callback expecting a typed result.
///
/// A reply body that does not decode into `T` arrives as an `OTHER`
/// failure.
pub fn typed_handler<T, F>(handler: F) -> ResultHandler
where
    T: DeserializeOwned,
    F: FnOnce(std::result::Result<T, Failure>) + Send + 'static,
{
    Box::new(move |outcome: std::result::Result<Value, Failure>| {
        handler(outcome.and_then(|value| {
            serde_json::from_value(value).map_err(|err| {
                Failure::new(FailureType::Other, UNSPECIFIED_FAILURE_CODE, err.to_string())
            })
        }))
    })
}
