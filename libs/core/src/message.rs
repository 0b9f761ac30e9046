use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

/// Out-of-band metadata attached to a send. Never embedded in the body.
pub type Headers = HashMap<String, String>;

/// Reply timeout applied when neither the call nor the bus configures one.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// A message addressed to a consumer on the bus
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub address: String,
    pub body: Value,
    pub headers: Headers,
}

impl Message {
    pub fn new(address: impl Into<String>, body: Value) -> Self {
        Self {
            address: address.into(),
            body,
            headers: Headers::new(),
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}

/// A successful reply as handed back by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyMessage {
    pub body: Value,
    pub headers: Headers,
}

impl ReplyMessage {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            headers: Headers::new(),
        }
    }
}

/// Per-send delivery settings: extra headers and an optional reply timeout.
///
/// The default value is empty but valid; building options from "no headers"
/// never fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryOptions {
    headers: Headers,
    timeout: Option<Duration>,
}

impl DeliveryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize options from headers the caller may or may not have supplied
    pub fn from_headers(headers: Option<Headers>) -> Self {
        Self {
            headers: headers.unwrap_or_default(),
            timeout: None,
        }
    }

    /// Add a single header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the reply timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn into_headers(self) -> Headers {
        self.headers
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.timeout.is_none()
    }

    /// Layer `other` on top of `self`. Headers and timeout from `other` win.
    pub fn merged_with(&self, other: &DeliveryOptions) -> DeliveryOptions {
        let mut headers = self.headers.clone();
        headers.extend(other.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        DeliveryOptions {
            headers,
            timeout: other.timeout.or(self.timeout),
        }
    }
}

impl From<Headers> for DeliveryOptions {
    fn from(headers: Headers) -> Self {
        Self::from_headers(Some(headers))
    }
}
