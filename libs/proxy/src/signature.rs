//! Declared shapes of proxy methods.
//!
//! Generated stubs describe each remote operation with a
//! [`MethodSignature`]; the runtime checks every invocation against it
//! before anything is sent.

use serde_json::{Map, Value};

use courier_core::{Error, Result};

/// Accepted JSON shape of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    /// Any JSON number
    Number,
    /// A number without fractional part
    Integer,
    Boolean,
    Object,
    Array,
    Any,
}

impl ParamKind {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Object => value.is_object(),
            ParamKind::Array => value.is_array(),
            ParamKind::Any => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
    pub nullable: bool,
}

impl Param {
    pub const fn new(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
        }
    }

    /// Also accept `null`
    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        (self.nullable && value.is_null()) || self.kind.accepts(value)
    }
}

/// One remote operation of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: &'static str,
    pub params: &'static [Param],
    /// The last argument is a result callback
    pub with_reply: bool,
    /// The stub returns the proxy itself
    pub fluent: bool,
}

impl MethodSignature {
    pub const fn new(name: &'static str, params: &'static [Param]) -> Self {
        Self {
            name,
            params,
            with_reply: false,
            fluent: false,
        }
    }

    pub const fn with_reply(self) -> Self {
        Self {
            with_reply: true,
            ..self
        }
    }

    pub const fn fluent(self) -> Self {
        Self {
            fluent: true,
            ..self
        }
    }

    /// Check an invocation against the declared signature
    pub fn validate(&self, args: &[Value], has_handler: bool) -> Result<()> {
        let matches = args.len() == self.params.len()
            && has_handler == self.with_reply
            && self
                .params
                .iter()
                .zip(args)
                .all(|(param, value)| param.accepts(value));

        if matches {
            Ok(())
        } else {
            tracing::debug!(
                method = self.name,
                expected = self.params.len(),
                given = args.len(),
                has_handler,
                "invalid proxy invocation"
            );
            Err(Error::InvalidArguments)
        }
    }

    /// Build the `{action, <param>: value, ...}` body
    pub fn body(&self, args: Vec<Value>) -> Value {
        let mut body = Map::with_capacity(self.params.len() + 1);
        body.insert("action".to_string(), Value::String(self.name.to_string()));
        for (param, value) in self.params.iter().zip(args) {
            body.insert(param.name.to_string(), value);
        }
        Value::Object(body)
    }
}
