use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use courier_core::{Error, Failure, Headers, Message, Result, DEFAULT_REPLY_TIMEOUT};

use crate::call::{Call, CallArg, ResolvedCall};
use crate::codec::{Codec, JsonCodec};
use crate::correlator::PendingCall;
use crate::transport::Transport;

/// Shared handle to a message bus.
///
/// Every send returns as soon as the message is queued. One driver task per
/// bus hands queued messages to the transport in the order they were
/// dispatched; replies are delivered later, in completion order, to the
/// callbacks given with the call. Cloning is cheap and all clones share the
/// same queue.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

struct BusInner {
    queue: mpsc::UnboundedSender<Outbound>,
    codec: JsonCodec,
    default_timeout: Duration,
}

/// A message waiting for the driver
enum Outbound {
    Send(Message),
    Request {
        message: Message,
        timeout: Duration,
        pending: PendingCall,
    },
}

impl Bus {
    /// Create a bus over `transport` using the current tokio runtime
    pub fn new(transport: impl Transport + 'static) -> Result<Self> {
        Self::builder(transport).build()
    }

    /// Create a builder for configuring the bus
    pub fn builder(transport: impl Transport + 'static) -> BusBuilder {
        BusBuilder::new(Arc::new(transport))
    }

    /// Reply timeout used when a call does not set its own
    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Fire-and-forget send
    pub fn send<T: Serialize>(&self, address: &str, body: &T) -> Result<()> {
        self.dispatch(Call::new(address, serde_json::to_value(body)?))
    }

    /// Fire-and-forget send with headers
    pub fn send_with_headers<T: Serialize>(
        &self,
        address: &str,
        body: &T,
        headers: Headers,
    ) -> Result<()> {
        self.dispatch(Call::new(address, serde_json::to_value(body)?).headers(headers))
    }

    /// Send and receive either outcome in one callback
    pub fn request<T, F>(&self, address: &str, body: &T, on_result: F) -> Result<()>
    where
        T: Serialize,
        F: FnOnce(std::result::Result<Value, Failure>) + Send + 'static,
    {
        self.dispatch(Call::new(address, serde_json::to_value(body)?).on_result(on_result))
    }

    /// Send with separate success and failure callbacks
    pub fn request_with_failure<T, S, F>(
        &self,
        address: &str,
        body: &T,
        on_success: S,
        on_failure: F,
    ) -> Result<()>
    where
        T: Serialize,
        S: FnOnce(Value) + Send + 'static,
        F: FnOnce(Failure) + Send + 'static,
    {
        self.dispatch(
            Call::new(address, serde_json::to_value(body)?)
                .on_success(on_success)
                .on_failure(on_failure),
        )
    }

    /// Send with headers and a success callback only.
    ///
    /// Failures of this form are dropped without notice. Use
    /// [`Bus::request_full`] to observe them.
    pub fn request_with_headers<T, S>(
        &self,
        address: &str,
        body: &T,
        headers: Headers,
        on_success: S,
    ) -> Result<()>
    where
        T: Serialize,
        S: FnOnce(Value) + Send + 'static,
    {
        self.dispatch(
            Call::new(address, serde_json::to_value(body)?)
                .headers(headers)
                .on_success(on_success),
        )
    }

    /// Send with headers and both callbacks
    pub fn request_full<T, S, F>(
        &self,
        address: &str,
        body: &T,
        headers: Headers,
        on_success: S,
        on_failure: F,
    ) -> Result<()>
    where
        T: Serialize,
        S: FnOnce(Value) + Send + 'static,
        F: FnOnce(Failure) + Send + 'static,
    {
        self.dispatch(
            Call::new(address, serde_json::to_value(body)?)
                .headers(headers)
                .on_success(on_success)
                .on_failure(on_failure),
        )
    }

    /// Send using the positional calling convention
    pub fn send_args(&self, args: Vec<CallArg>) -> Result<()> {
        self.dispatch(Call::from_args(args)?)
    }

    /// Validate, marshal and queue a call for the transport.
    ///
    /// Everything that can fail locally fails here, before the transport
    /// sees the message. Calls reach the transport in dispatch order.
    pub fn dispatch(&self, call: Call) -> Result<()> {
        let ResolvedCall {
            mut message,
            timeout,
            reply,
        } = call.resolve()?;
        message.body = self.inner.codec.marshal(&message.body)?;

        let outbound = match reply {
            None => {
                tracing::debug!(address = %message.address, "send");
                Outbound::Send(message)
            }
            Some(handler) => {
                let timeout = timeout.unwrap_or(self.inner.default_timeout);
                tracing::debug!(address = %message.address, ?timeout, "request");
                let pending = PendingCall::new(message.address.clone(), handler);
                Outbound::Request {
                    message,
                    timeout,
                    pending,
                }
            }
        };
        self.inner
            .queue
            .send(outbound)
            .map_err(|_| Error::Runtime("bus driver has stopped".to_string()))
    }
}

/// Hand queued messages to the transport one at a time.
///
/// Each request is awaited only until the transport has taken it; waiting
/// for the reply happens in a task of its own.
async fn drive(
    transport: Arc<dyn Transport>,
    codec: JsonCodec,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(outbound) = queue.recv().await {
        match outbound {
            Outbound::Send(message) => {
                let address = message.address.clone();
                if let Err(cause) = transport.send(message).await {
                    tracing::warn!(%address, %cause, "fire-and-forget message dropped");
                }
            }
            Outbound::Request {
                message,
                timeout,
                pending,
            } => {
                let reply = transport.request(message, timeout).await;
                tokio::spawn(async move {
                    pending.complete(&codec, reply.await);
                });
            }
        }
    }
    tracing::debug!("bus driver stopped");
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("default_timeout", &self.inner.default_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a bus
pub struct BusBuilder {
    transport: Arc<dyn Transport>,
    default_timeout: Duration,
    runtime: Option<Handle>,
}

impl BusBuilder {
    /// Create a new builder
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            default_timeout: DEFAULT_REPLY_TIMEOUT,
            runtime: None,
        }
    }

    /// Set the reply timeout used when a call does not set one
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Run the driver and reply handling on this runtime instead of the
    /// current one
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Bus> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?,
        };

        let (queue, outbound) = mpsc::unbounded_channel();
        runtime.spawn(drive(self.transport, JsonCodec, outbound));

        Ok(Bus {
            inner: Arc::new(BusInner {
                queue,
                codec: JsonCodec,
                default_timeout: self.default_timeout,
            }),
        })
    }
}
