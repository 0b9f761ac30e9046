//! Proxy stubs and service implementations shared by the proxy tests.
//!
//! The stubs are written the way generated proxies look: one signature
//! constant and one thin method per remote operation.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use courier_core::{Failure, Result};
use courier_fabric::{Bus, LocalBus};
use courier_proxy::{
    typed_handler, Authenticator, MethodSignature, Param, ParamKind, ServiceBinder, ServiceError,
    ServiceHandler, ServiceProxy,
};
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, oneshot};

pub const SERVICE_ADDRESS: &str = "someaddress";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A callback that forwards its argument, and where to read it
pub fn capture<T: Send + 'static>() -> (impl FnOnce(T) + Send + 'static, oneshot::Receiver<T>) {
    let (tx, rx) = oneshot::channel();
    (
        move |value| {
            let _ = tx.send(value);
        },
        rx,
    )
}

// Proxy stubs

pub const NO_PARAMS: MethodSignature = MethodSignature::new("noParams", &[]);
pub const FLUENT_METHOD: MethodSignature =
    MethodSignature::new("fluentMethod", &[Param::new("str", ParamKind::String)])
        .with_reply()
        .fluent();
pub const FLUENT_NO_PARAMS: MethodSignature =
    MethodSignature::new("fluentNoParams", &[]).fluent();
pub const FAILING_METHOD: MethodSignature = MethodSignature::new("failingMethod", &[]).with_reply();
pub const CREATE_CONNECTION: MethodSignature =
    MethodSignature::new("createConnection", &[Param::new("str", ParamKind::String)]).with_reply();
pub const LONG_DELIVERY: MethodSignature =
    MethodSignature::new("longDelivery", &[]).with_reply();
pub const ECHO: MethodSignature = MethodSignature::new(
    "echo",
    &[
        Param::new("object", ParamKind::Object),
        Param::new("count", ParamKind::Integer).nullable(),
    ],
)
.with_reply();

pub struct TestService {
    proxy: ServiceProxy,
}

impl From<ServiceProxy> for TestService {
    fn from(proxy: ServiceProxy) -> Self {
        Self { proxy }
    }
}

impl TestService {
    pub fn new(bus: &Bus, address: impl Into<String>) -> Self {
        ServiceProxy::new(bus, address).into()
    }

    pub fn proxy(&self) -> &ServiceProxy {
        &self.proxy
    }

    pub fn no_params(&self) -> Result<()> {
        self.proxy.invoke(&NO_PARAMS, vec![], None)?;
        Ok(())
    }

    pub fn fluent_method<F>(&self, s: &str, on_result: F) -> Result<&Self>
    where
        F: FnOnce(std::result::Result<String, Failure>) + Send + 'static,
    {
        self.proxy
            .invoke(&FLUENT_METHOD, vec![json!(s)], Some(typed_handler(on_result)))?;
        Ok(self)
    }

    pub fn fluent_no_params(&self) -> Result<&Self> {
        self.proxy.invoke(&FLUENT_NO_PARAMS, vec![], None)?;
        Ok(self)
    }

    pub fn failing_method<F>(&self, on_result: F) -> Result<()>
    where
        F: FnOnce(std::result::Result<Value, Failure>) + Send + 'static,
    {
        self.proxy
            .invoke(&FAILING_METHOD, vec![], Some(Box::new(on_result)))?;
        Ok(())
    }

    pub fn create_connection<F>(&self, s: &str, on_result: F) -> Result<()>
    where
        F: FnOnce(std::result::Result<TestConnection, Failure>) + Send + 'static,
    {
        let bus = self.proxy.bus().clone();
        let handler = typed_handler(move |outcome: std::result::Result<String, Failure>| {
            on_result(outcome.map(|address| TestConnection::new(&bus, address)))
        });
        self.proxy
            .invoke(&CREATE_CONNECTION, vec![json!(s)], Some(handler))?;
        Ok(())
    }

    pub fn long_delivery<F>(&self, on_result: F) -> Result<()>
    where
        F: FnOnce(std::result::Result<Value, Failure>) + Send + 'static,
    {
        self.proxy
            .invoke(&LONG_DELIVERY, vec![], Some(Box::new(on_result)))?;
        Ok(())
    }

    pub fn echo<F>(&self, object: Value, count: Option<i64>, on_result: F) -> Result<()>
    where
        F: FnOnce(std::result::Result<Value, Failure>) + Send + 'static,
    {
        self.proxy
            .invoke(&ECHO, vec![object, json!(count)], Some(Box::new(on_result)))?;
        Ok(())
    }
}

pub const START_TRANSACTION: MethodSignature =
    MethodSignature::new("startTransaction", &[]).with_reply().fluent();
pub const INSERT: MethodSignature = MethodSignature::new(
    "insert",
    &[
        Param::new("name", ParamKind::String),
        Param::new("data", ParamKind::Object),
    ],
)
.with_reply()
.fluent();
pub const COMMIT: MethodSignature = MethodSignature::new("commit", &[]).with_reply().fluent();
pub const ROLLBACK: MethodSignature = MethodSignature::new("rollback", &[]).with_reply().fluent();

pub struct TestConnection {
    proxy: ServiceProxy,
}

impl TestConnection {
    pub fn new(bus: &Bus, address: impl Into<String>) -> Self {
        Self {
            proxy: ServiceProxy::new(bus, address),
        }
    }

    pub fn address(&self) -> &str {
        self.proxy.address()
    }

    pub fn start_transaction<F>(&self, on_result: F) -> Result<&Self>
    where
        F: FnOnce(std::result::Result<String, Failure>) + Send + 'static,
    {
        self.proxy
            .invoke(&START_TRANSACTION, vec![], Some(typed_handler(on_result)))?;
        Ok(self)
    }

    pub fn insert<F>(&self, name: &str, data: Value, on_result: F) -> Result<&Self>
    where
        F: FnOnce(std::result::Result<String, Failure>) + Send + 'static,
    {
        self.proxy.invoke(
            &INSERT,
            vec![json!(name), data],
            Some(typed_handler(on_result)),
        )?;
        Ok(self)
    }

    pub fn commit<F>(&self, on_result: F) -> Result<&Self>
    where
        F: FnOnce(std::result::Result<String, Failure>) + Send + 'static,
    {
        self.proxy
            .invoke(&COMMIT, vec![], Some(typed_handler(on_result)))?;
        Ok(self)
    }

    pub fn rollback<F>(&self, on_result: F) -> Result<&Self>
    where
        F: FnOnce(std::result::Result<String, Failure>) + Send + 'static,
    {
        self.proxy
            .invoke(&ROLLBACK, vec![], Some(typed_handler(on_result)))?;
        Ok(self)
    }

    pub fn close(&self) -> Result<()> {
        self.proxy.close()
    }
}

// Service implementations

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(0);

/// Service behind `TestService`; reports notable calls on `events`
pub struct TestServiceImpl {
    pub bus: LocalBus,
    pub events: mpsc::UnboundedSender<String>,
    pub connection_idle_timeout: Duration,
    pub long_delivery: Duration,
}

#[async_trait::async_trait]
impl ServiceHandler for TestServiceImpl {
    async fn handle(
        &self,
        action: &str,
        params: Map<String, Value>,
    ) -> std::result::Result<Value, ServiceError> {
        match action {
            "noParams" | "fluentNoParams" => {
                let _ = self.events.send(action.to_string());
                Ok(Value::Null)
            }
            "fluentMethod" => match params.get("str").and_then(Value::as_str) {
                Some("foo") => Ok(json!("bar")),
                other => Err(ServiceError::message(format!("unexpected str {other:?}"))),
            },
            "failingMethod" => Err(ServiceError::message("wibble")),
            "failWithDetails" => {
                Err(ServiceError::new(42, "details").with_debug_info(json!({"field": "name"})))
            }
            "createConnection" => {
                let s: String = serde_json::from_value(params.get("str").cloned().unwrap_or_default())?;
                let address = format!(
                    "connection-{}",
                    NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed)
                );
                ServiceBinder::new(&self.bus)
                    .address(address.clone())
                    .top_level(false)
                    .idle_timeout(self.connection_idle_timeout)
                    .register(TestConnectionImpl {
                        s,
                        events: self.events.clone(),
                    })
                    .map_err(|err| ServiceError::message(err.to_string()))?;
                Ok(json!(address))
            }
            "longDelivery" => {
                tokio::time::sleep(self.long_delivery).await;
                Ok(json!("late"))
            }
            "echo" => Ok(Value::Object(params)),
            other => Err(ServiceError::invalid_action(other)),
        }
    }
}

/// Per-connection service created by `createConnection`
pub struct TestConnectionImpl {
    s: String,
    events: mpsc::UnboundedSender<String>,
}

impl TestConnectionImpl {
    pub fn new(s: impl Into<String>, events: mpsc::UnboundedSender<String>) -> Self {
        Self {
            s: s.into(),
            events,
        }
    }
}

#[async_trait::async_trait]
impl ServiceHandler for TestConnectionImpl {
    async fn handle(
        &self,
        action: &str,
        _params: Map<String, Value>,
    ) -> std::result::Result<Value, ServiceError> {
        match action {
            "startTransaction" | "insert" | "commit" | "rollback" => Ok(json!(self.s)),
            other => Err(ServiceError::invalid_action(other)),
        }
    }

    async fn close(&self) {
        let _ = self.events.send(format!("closeCalled:{}", self.s));
    }
}

/// Local bus with `TestServiceImpl` bound at [`SERVICE_ADDRESS`]
pub struct Fixture {
    pub local: LocalBus,
    pub bus: Bus,
    pub events: mpsc::UnboundedReceiver<String>,
}

pub fn fixture() -> Fixture {
    fixture_with(Duration::from_secs(300), Duration::from_secs(5))
}

pub fn fixture_with(connection_idle_timeout: Duration, long_delivery: Duration) -> Fixture {
    fixture_configured(connection_idle_timeout, long_delivery, |binder| binder)
}

/// Like [`fixture`], with extra binder settings for the top-level service
pub fn secured_fixture(configure: impl FnOnce(ServiceBinder) -> ServiceBinder) -> Fixture {
    fixture_configured(Duration::from_secs(300), Duration::from_secs(5), configure)
}

fn fixture_configured(
    connection_idle_timeout: Duration,
    long_delivery: Duration,
    configure: impl FnOnce(ServiceBinder) -> ServiceBinder,
) -> Fixture {
    init_tracing();
    let local = LocalBus::new();
    let (tx, events) = mpsc::unbounded_channel();
    configure(ServiceBinder::new(&local))
        .address(SERVICE_ADDRESS)
        .register(TestServiceImpl {
            bus: local.clone(),
            events: tx,
            connection_idle_timeout,
            long_delivery,
        })
        .unwrap();
    let bus = Bus::new(local.clone()).unwrap();
    Fixture { local, bus, events }
}

/// Consumer that records every message it sees and answers `null`
pub fn recording_consumer(
    local: &LocalBus,
    address: &str,
) -> mpsc::UnboundedReceiver<(Value, courier_core::Headers)> {
    let (tx, rx) = mpsc::unbounded_channel();
    local.register_handler(address, move |envelope| {
        let _ = tx.send((envelope.body().clone(), envelope.headers().clone()));
        envelope.reply(Value::Null);
    });
    rx
}

/// Accepts the token `good` for a reader, and `admin` for an administrator
pub struct StaticTokens;

#[async_trait::async_trait]
impl Authenticator for StaticTokens {
    async fn authenticate(&self, token: &str) -> std::result::Result<Option<Value>, ServiceError> {
        Ok(match token {
            "good" => Some(json!({"name": "ada", "authorities": ["read"]})),
            "admin" => Some(json!({"name": "root", "authorities": ["read", "admin"]})),
            _ => None,
        })
    }
}
