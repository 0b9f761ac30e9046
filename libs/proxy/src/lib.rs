//! Courier Proxy - service proxies over the courier bus
//!
//! [`ServiceProxy`] is the runtime behind generated proxy types: it checks
//! each invocation against a [`MethodSignature`], refuses calls once closed
//! and sends `{action, ...params}` messages through a
//! [`Bus`](courier_fabric::Bus). [`ServiceBinder`] is the other end, exposing
//! a [`ServiceHandler`] at an address behind optional
//! [`ServiceInterceptor`]s.
//!
//! # Example
//!
//! ```no_run
//! use courier_fabric::{Bus, LocalBus};
//! use courier_core::Failure;
//! use courier_proxy::{typed_handler, MethodSignature, Param, ParamKind, ServiceProxy};
//! use serde_json::json;
//!
//! const GREET: MethodSignature =
//!     MethodSignature::new("greet", &[Param::new("name", ParamKind::String)]).with_reply();
//!
//! # async fn example() -> courier_core::Result<()> {
//! let bus = Bus::new(LocalBus::new())?;
//! let proxy = ServiceProxy::builder(&bus).address("greeter").token("secret").build()?;
//!
//! proxy.invoke(
//!     &GREET,
//!     vec![json!("world")],
//!     Some(typed_handler(|outcome: Result<String, Failure>| {
//!         println!("{outcome:?}")
//!     })),
//! )?;
//! proxy.close()?;
//! # Ok(())
//! # }
//! ```

pub mod binder;
pub mod builder;
pub mod interceptor;
pub mod proxy;
pub mod signature;

// Re-exports for convenience
pub use binder::{ServiceBinder, ServiceError, ServiceHandler};
pub use builder::{ProxyBuilder, AUTH_TOKEN_HEADER};
pub use interceptor::{
    AuthenticationInterceptor, Authenticator, AuthorizationInterceptor, InterceptorContext,
    InterceptorPriority, ServiceInterceptor, ServiceRequest,
};
pub use proxy::{typed_handler, ServiceProxy, CLOSE_ACTION};
pub use signature::{MethodSignature, Param, ParamKind};
