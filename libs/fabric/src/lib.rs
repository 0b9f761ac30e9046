//! Courier Fabric - call marshalling and reply correlation over a message bus
//!
//! Turns sends into messages for a [`Transport`](transport::Transport),
//! correlates the asynchronous replies and hands each outcome to exactly one
//! callback. Ships an in-process transport, [`LocalBus`].
//!
//! # Example
//!
//! ```no_run
//! use courier_fabric::{Bus, LocalBus};
//! use serde_json::json;
//!
//! # async fn example() -> courier_core::Result<()> {
//! let local = LocalBus::new();
//! local.register_handler("greeter", |envelope| envelope.reply(json!({"r": 2})));
//!
//! let bus = Bus::new(local)?;
//! bus.send("greeter", &json!({"a": 1}))?;
//! bus.request_with_failure(
//!     "greeter",
//!     &json!({"a": 1}),
//!     |reply| println!("got {reply}"),
//!     |failure| eprintln!("failed: {failure}"),
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod call;
pub mod codec;
pub mod correlator;
pub mod transport;

// Re-exports for convenience
pub use bus::{Bus, BusBuilder};
pub use call::{Call, CallArg, ReplyHandler, ResultHandler};
pub use transport::{Envelope, LocalBus, Registration, ReplyFuture, Transport};
