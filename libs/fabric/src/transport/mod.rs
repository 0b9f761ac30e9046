use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use courier_core::{Message, Reply, ReplyError};

pub mod local;

pub use self::local::{Envelope, LocalBus, Registration};

/// Reply to a request that has already left
pub type ReplyFuture = Pin<Box<dyn Future<Output = Reply> + Send>>;

/// The send primitive of the underlying message bus.
///
/// Delivery, routing and deadlines belong to the implementation. This layer
/// only invokes it. Both methods return once the message is handed off, so
/// a caller that awaits each in turn keeps its messages in send order.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a message without expecting a reply
    async fn send(&self, message: Message) -> Result<(), ReplyError>;

    /// Deliver a message. The returned future waits up to `timeout` for
    /// its reply.
    async fn request(&self, message: Message, timeout: Duration) -> ReplyFuture;
}
