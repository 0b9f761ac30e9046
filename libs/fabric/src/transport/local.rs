use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use courier_core::{Headers, Message, Reply, ReplyError, ReplyMessage};

use crate::transport::{ReplyFuture, Transport};

type Handler = dyn Fn(Envelope) + Send + Sync;

/// In-process message bus.
///
/// Consumers register at an address; each point-to-point message goes to
/// one of them, chosen round-robin. Cloning yields another handle to the
/// same bus.
#[derive(Clone, Default)]
pub struct LocalBus {
    registry: Arc<Registry>,
}

#[derive(Default)]
struct Registry {
    consumers: RwLock<HashMap<String, Vec<Consumer>>>,
    next_id: AtomicU64,
    cursor: AtomicUsize,
}

struct Consumer {
    id: u64,
    handler: Arc<Handler>,
}

impl Registry {
    fn remove(&self, address: &str, id: u64) -> bool {
        let mut consumers = self.consumers.write();
        let Some(list) = consumers.get_mut(address) else {
            return false;
        };
        let before = list.len();
        list.retain(|consumer| consumer.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            consumers.remove(address);
        }
        removed
    }

    fn contains(&self, address: &str, id: u64) -> bool {
        self.consumers
            .read()
            .get(address)
            .is_some_and(|list| list.iter().any(|consumer| consumer.id == id))
    }
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer at `address`
    pub fn register_handler<F>(&self, address: impl Into<String>, handler: F) -> Registration
    where
        F: Fn(Envelope) + Send + Sync + 'static,
    {
        let address = address.into();
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .consumers
            .write()
            .entry(address.clone())
            .or_default()
            .push(Consumer {
                id,
                handler: Arc::new(handler),
            });
        tracing::debug!(%address, id, "consumer registered");

        Registration {
            address,
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Whether any consumer is registered at `address`
    pub fn has_handlers(&self, address: &str) -> bool {
        self.registry.consumers.read().contains_key(address)
    }

    fn pick(&self, address: &str) -> Option<Arc<Handler>> {
        let consumers = self.registry.consumers.read();
        let list = consumers.get(address)?;
        let index = self.registry.cursor.fetch_add(1, Ordering::Relaxed) % list.len();
        Some(Arc::clone(&list[index].handler))
    }

    fn no_handlers(address: &str) -> ReplyError {
        ReplyError::NoHandlers {
            address: address.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Transport for LocalBus {
    async fn send(&self, message: Message) -> Result<(), ReplyError> {
        let handler = self
            .pick(&message.address)
            .ok_or_else(|| Self::no_handlers(&message.address))?;
        handler(Envelope {
            message,
            reply_to: None,
        });
        Ok(())
    }

    async fn request(&self, message: Message, timeout: Duration) -> ReplyFuture {
        let deadline = Instant::now() + timeout;
        let address = message.address.clone();
        let Some(handler) = self.pick(&address) else {
            return Box::pin(std::future::ready(Err(Self::no_handlers(&address))));
        };

        let (tx, rx) = oneshot::channel();
        handler(Envelope {
            message,
            reply_to: Some(tx),
        });

        Box::pin(async move {
            match tokio::time::timeout_at(deadline, rx).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(_)) => {
                    // The consumer dropped the message without answering, so
                    // nothing can arrive before the deadline.
                    tokio::time::sleep_until(deadline).await;
                    Err(ReplyError::Timeout {
                        address,
                        after: timeout,
                    })
                }
                Err(_) => Err(ReplyError::Timeout {
                    address,
                    after: timeout,
                }),
            }
        })
    }
}

/// Handle to a registered consumer
#[derive(Clone)]
pub struct Registration {
    address: String,
    id: u64,
    registry: Weak<Registry>,
}

impl Registration {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether the consumer is still registered
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(&self.address, self.id))
    }

    /// Remove the consumer. Returns false if it was already gone.
    pub fn unregister(&self) -> bool {
        let removed = self
            .registry
            .upgrade()
            .is_some_and(|registry| registry.remove(&self.address, self.id));
        if removed {
            tracing::debug!(address = %self.address, id = self.id, "consumer unregistered");
        }
        removed
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("address", &self.address)
            .field("id", &self.id)
            .finish()
    }
}

/// A message as seen by a consumer, together with its reply channel
pub struct Envelope {
    message: Message,
    reply_to: Option<oneshot::Sender<Reply>>,
}

impl Envelope {
    pub fn address(&self) -> &str {
        &self.message.address
    }

    pub fn body(&self) -> &Value {
        &self.message.body
    }

    pub fn headers(&self) -> &Headers {
        &self.message.headers
    }

    /// Whether the sender is waiting for an answer
    pub fn expects_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// Answer with a body. No-op for fire-and-forget messages.
    pub fn reply(self, body: Value) {
        self.respond(Ok(ReplyMessage::new(body)));
    }

    pub fn reply_with(self, reply: ReplyMessage) {
        self.respond(Ok(reply));
    }

    /// Fail the request as a recipient failure
    pub fn fail(self, code: i32, message: impl Into<String>) {
        self.respond(Err(ReplyError::recipient(code, message)));
    }

    /// Fail the request with an arbitrary cause
    pub fn fail_with(self, cause: ReplyError) {
        self.respond(Err(cause));
    }

    /// Answer as if nobody had been listening at the address
    pub fn reject_unrouted(self) {
        let address = self.message.address.clone();
        self.respond(Err(LocalBus::no_handlers(&address)));
    }

    fn respond(self, reply: Reply) {
        if let Some(tx) = self.reply_to {
            // The requester may have timed out already
            let _ = tx.send(reply);
        }
    }
}
