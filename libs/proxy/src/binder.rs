//! Service side of the proxy contract.
//!
//! A [`ServiceBinder`] registers a [`ServiceHandler`] at an address on a
//! [`LocalBus`]. Incoming bodies are `{action, ...params}`; the action picks
//! the operation and the remaining fields are its named parameters. Errors
//! returned by the handler travel back as recipient failures.
//!
//! Each bound service handles its messages one at a time, in arrival order.
//! Interceptors run before every message, the `close` action included, and
//! may reject it.
//!
//! A `close` action unregisters the service, after which the address has no
//! consumer. Services that are not top level (connection-like objects handed
//! out by another service) are also closed after a period without traffic.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;

use courier_core::failure::UNSPECIFIED_FAILURE_CODE;
use courier_core::{Error, ReplyError, Result};
use courier_fabric::{Envelope, LocalBus, Registration};

use crate::interceptor::{InterceptorContext, ServiceInterceptor, ServiceRequest};
use crate::proxy::CLOSE_ACTION;

/// How long a non top-level service may stay idle before it is closed
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Failure code for malformed or unknown actions
pub const INVALID_ACTION_CODE: i32 = 500;

/// Error returned by a service operation, sent back verbatim.
///
/// `debug_info` set by the service always travels with the failure. Errors
/// converted from other error types also record where they came from; that
/// record is only sent by binders built with
/// [`include_debug_info`](ServiceBinder::include_debug_info).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ServiceError {
    pub code: i32,
    pub message: String,
    pub debug_info: Option<Value>,
    cause: Option<Value>,
}

impl ServiceError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            debug_info: None,
            cause: None,
        }
    }

    /// A failure without a specific code
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(UNSPECIFIED_FAILURE_CODE, message)
    }

    pub fn invalid_action(action: &str) -> Self {
        Self::new(INVALID_ACTION_CODE, format!("Invalid action: {action}"))
    }

    /// Attach structured data for the caller
    pub fn with_debug_info(mut self, debug_info: Value) -> Self {
        self.debug_info = Some(debug_info);
        self
    }

    /// Wrap an arbitrary error, remembering its type and source chain
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(Value::String(cause.to_string()));
            source = cause.source();
        }

        let mut service_error = Self::message(err.to_string());
        service_error.cause = Some(json!({
            "causeName": std::any::type_name::<E>(),
            "causeMessage": err.to_string(),
            "causeChain": chain,
        }));
        service_error
    }

    /// The recipient failure sent back to the caller
    pub fn into_reply_error(self, include_debug_info: bool) -> ReplyError {
        let debug_info = match (self.debug_info, include_debug_info) {
            (Some(debug_info), _) => Some(debug_info),
            (None, true) => self.cause,
            (None, false) => None,
        };
        ReplyError::recipient_with_debug_info(self.code, self.message, debug_info)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_error(&err)
    }
}

/// A service exposed on the bus
#[async_trait::async_trait]
pub trait ServiceHandler: Send + Sync + 'static {
    /// Run `action` with its named parameters
    async fn handle(
        &self,
        action: &str,
        params: Map<String, Value>,
    ) -> std::result::Result<Value, ServiceError>;

    /// Called once when the service is closed
    async fn close(&self) {}
}

/// Registers services on a local bus
pub struct ServiceBinder {
    bus: LocalBus,
    address: Option<String>,
    top_level: bool,
    idle_timeout: Duration,
    include_debug_info: bool,
    interceptors: Vec<Arc<dyn ServiceInterceptor>>,
}

impl ServiceBinder {
    pub fn new(bus: &LocalBus) -> Self {
        Self {
            bus: bus.clone(),
            address: None,
            top_level: true,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            include_debug_info: false,
            interceptors: Vec::new(),
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Top-level services live until closed; others expire when idle
    pub fn top_level(mut self, top_level: bool) -> Self {
        self.top_level = top_level;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Send the origin of converted errors along with their failures
    pub fn include_debug_info(mut self, include: bool) -> Self {
        self.include_debug_info = include;
        self
    }

    /// Run `interceptor` before every message, after those added earlier.
    ///
    /// Authentication must come before authorization, and both before any
    /// other interceptor.
    pub fn interceptor(mut self, interceptor: impl ServiceInterceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Register `service` and start dispatching to it
    pub fn register<S: ServiceHandler>(self, service: S) -> Result<Registration> {
        let address = self
            .address
            .ok_or_else(|| Error::Custom("Address not set".to_string()))?;
        let runtime = Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;
        check_interceptor_order(&self.interceptors)?;

        let binding = Arc::new(Binding {
            service,
            interceptors: self.interceptors,
            include_debug_info: self.include_debug_info,
            registration: OnceLock::new(),
            last_access: Mutex::new(Instant::now()),
        });

        let (inbox, incoming) = mpsc::unbounded_channel::<Envelope>();
        let touched = Arc::clone(&binding);
        let registration = self.bus.register_handler(address.clone(), move |envelope| {
            *touched.last_access.lock() = Instant::now();
            if let Err(unserved) = inbox.send(envelope) {
                unserved.0.reject_unrouted();
            }
        });
        let _ = binding.registration.set(registration.clone());

        // Queued messages wait until the registration is in place
        runtime.spawn(Arc::clone(&binding).serve(incoming));
        if !self.top_level {
            runtime.spawn(expire_when_idle(binding, self.idle_timeout));
        }
        tracing::debug!(%address, top_level = self.top_level, "service registered");

        Ok(registration)
    }

    /// Remove a registered service. Returns false if it was already gone.
    pub fn unregister(registration: &Registration) -> bool {
        registration.unregister()
    }
}

fn check_interceptor_order(interceptors: &[Arc<dyn ServiceInterceptor>]) -> Result<()> {
    for pair in interceptors.windows(2) {
        let (before, after) = (pair[0].priority(), pair[1].priority());
        if before > after {
            return Err(Error::Custom(format!(
                "Cannot add {after} interceptor after {before} interceptor"
            )));
        }
    }
    Ok(())
}

struct Binding<S> {
    service: S,
    interceptors: Vec<Arc<dyn ServiceInterceptor>>,
    include_debug_info: bool,
    registration: OnceLock<Registration>,
    last_access: Mutex<Instant>,
}

impl<S: ServiceHandler> Binding<S> {
    async fn serve(self: Arc<Self>, mut incoming: mpsc::UnboundedReceiver<Envelope>) {
        while let Some(envelope) = incoming.recv().await {
            if self.is_closed() {
                envelope.reject_unrouted();
                continue;
            }
            self.dispatch(envelope).await;
        }
    }

    fn is_closed(&self) -> bool {
        !self
            .registration
            .get()
            .is_some_and(Registration::is_active)
    }

    async fn dispatch(&self, envelope: Envelope) {
        if let Err(err) = self.intercept(&envelope).await {
            tracing::warn!(
                address = envelope.address(),
                code = err.code,
                "message rejected by interceptor"
            );
            envelope.fail_with(err.into_reply_error(self.include_debug_info));
            return;
        }

        let mut params = match envelope.body() {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        let action = match params.remove("action") {
            Some(Value::String(action)) => action,
            _ => {
                tracing::warn!(address = envelope.address(), "message without action");
                envelope.fail(INVALID_ACTION_CODE, "action not specified");
                return;
            }
        };

        if action == CLOSE_ACTION {
            self.close().await;
            return;
        }

        match self.service.handle(&action, params).await {
            Ok(value) => envelope.reply(value),
            Err(err) if err.code == INVALID_ACTION_CODE => {
                tracing::warn!(address = envelope.address(), %action, "unknown action");
                envelope.fail_with(err.into_reply_error(self.include_debug_info));
            }
            Err(err) => {
                tracing::debug!(
                    address = envelope.address(),
                    %action,
                    code = err.code,
                    "service operation failed"
                );
                envelope.fail_with(err.into_reply_error(self.include_debug_info));
            }
        }
    }

    async fn intercept(&self, envelope: &Envelope) -> std::result::Result<(), ServiceError> {
        let request = ServiceRequest::new(envelope.address(), envelope.headers(), envelope.body());
        let mut context = InterceptorContext::new();
        for interceptor in &self.interceptors {
            interceptor.intercept(&request, &mut context).await?;
        }
        Ok(())
    }

    async fn close(&self) {
        let Some(registration) = self.registration.get() else {
            return;
        };
        if registration.unregister() {
            self.service.close().await;
            tracing::debug!(address = registration.address(), "service closed");
        }
    }
}

async fn expire_when_idle<S: ServiceHandler>(binding: Arc<Binding<S>>, timeout: Duration) {
    loop {
        let deadline = *binding.last_access.lock() + timeout;
        tokio::time::sleep_until(deadline).await;

        if binding.is_closed() {
            return;
        }
        if binding.last_access.lock().elapsed() >= timeout {
            tracing::debug!(?timeout, "service idle, closing");
            binding.close().await;
            return;
        }
    }
}
