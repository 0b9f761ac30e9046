use std::time::Duration;

use courier_core::{DeliveryOptions, Error, Result};
use courier_fabric::Bus;

use crate::proxy::ServiceProxy;

/// Header carrying the proxy's auth token
pub const AUTH_TOKEN_HEADER: &str = "auth-token";

/// Builder for configuring a service proxy
pub struct ProxyBuilder {
    bus: Bus,
    address: Option<String>,
    options: DeliveryOptions,
    token: Option<String>,
}

impl ProxyBuilder {
    /// Create a new builder
    pub fn new(bus: &Bus) -> Self {
        Self {
            bus: bus.clone(),
            address: None,
            options: DeliveryOptions::new(),
            token: None,
        }
    }

    /// Set the destination address
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Replace the delivery options applied to every call
    pub fn options(mut self, options: DeliveryOptions) -> Self {
        self.options = options;
        self
    }

    /// Add a header sent with every call
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options = self.options.header(name, value);
        self
    }

    /// Set the reply timeout for every call
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.timeout(timeout);
        self
    }

    /// Set the token sent as the `auth-token` header
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn build(self) -> Result<ServiceProxy> {
        let address = self
            .address
            .ok_or_else(|| Error::Custom("Address not set".to_string()))?;

        let options = match self.token {
            Some(token) => self.options.header(AUTH_TOKEN_HEADER, token),
            None => self.options,
        };

        Ok(ServiceProxy::with_options(&self.bus, address, options))
    }

    /// Build and wrap the runtime in a generated proxy type
    pub fn build_into<P: From<ServiceProxy>>(self) -> Result<P> {
        self.build().map(P::from)
    }
}
