//! Call marshalling.
//!
//! A [`Call`] collects everything needed for one send: the address, the
//! body, optional headers and the reply callbacks. [`Call::resolve`] checks
//! that the combination is one the bus knows how to deliver and turns it
//! into a [`ResolvedCall`].
//!
//! The accepted combinations are those of the positional calling
//! convention, also available through [`Call::from_args`]:
//!
//! | arguments                                        | meaning                          |
//! |--------------------------------------------------|----------------------------------|
//! | `address, body`                                  | fire-and-forget                  |
//! | `address, body, callback`                        | one callback for both outcomes   |
//! | `address, body, headers`                         | fire-and-forget with headers     |
//! | `address, body, on_success, on_failure`          | separate callbacks               |
//! | `address, body, headers, on_success`             | failures are dropped             |
//! | `address, body, headers, on_success, on_failure` | fully specified                  |

use std::time::Duration;

use serde_json::Value;

use courier_core::{DeliveryOptions, Error, Failure, Headers, Message, Result};

/// Callback receiving either outcome of a call
pub type ResultHandler = Box<dyn FnOnce(std::result::Result<Value, Failure>) + Send>;

/// Callback receiving the decoded reply body
pub type SuccessHandler = Box<dyn FnOnce(Value) + Send>;

/// Callback receiving the failure record
pub type FailureHandler = Box<dyn FnOnce(Failure) + Send>;

/// Callback in the positional `(error, result)` convention.
///
/// Exactly one of the two arguments is `Some` when it runs.
pub type LegacyHandler = Box<dyn FnOnce(Option<Failure>, Option<Value>) + Send>;

/// Where the outcome of a call goes
pub enum ReplyHandler {
    /// One callback for both outcomes. With `ignore_failures` only
    /// successes reach it.
    Combined {
        handler: ResultHandler,
        ignore_failures: bool,
    },
    /// Separate callbacks. Failures are dropped when `on_failure` is `None`.
    Split {
        on_success: SuccessHandler,
        on_failure: Option<FailureHandler>,
    },
}

impl ReplyHandler {
    /// Hand the outcome to the matching callback.
    ///
    /// Returns false when the outcome was a failure nobody asked for.
    pub fn deliver(self, outcome: std::result::Result<Value, Failure>) -> bool {
        match (self, outcome) {
            (ReplyHandler::Combined { handler, .. }, Ok(value)) => {
                handler(Ok(value));
                true
            }
            (
                ReplyHandler::Combined {
                    handler,
                    ignore_failures: false,
                },
                Err(failure),
            ) => {
                handler(Err(failure));
                true
            }
            (ReplyHandler::Combined { .. }, Err(_)) => false,
            (ReplyHandler::Split { on_success, .. }, Ok(value)) => {
                on_success(value);
                true
            }
            (ReplyHandler::Split { on_failure, .. }, Err(failure)) => match on_failure {
                Some(on_failure) => {
                    on_failure(failure);
                    true
                }
                None => false,
            },
        }
    }
}

impl std::fmt::Debug for ReplyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyHandler::Combined {
                ignore_failures, ..
            } => f
                .debug_struct("Combined")
                .field("ignore_failures", ignore_failures)
                .finish_non_exhaustive(),
            ReplyHandler::Split { on_failure, .. } => f
                .debug_struct("Split")
                .field("on_failure", &on_failure.is_some())
                .finish_non_exhaustive(),
        }
    }
}

/// A call validated and ready for the transport
#[derive(Debug)]
pub struct ResolvedCall {
    pub message: Message,
    pub timeout: Option<Duration>,
    /// `None` for fire-and-forget sends
    pub reply: Option<ReplyHandler>,
}

/// Builder for a single send
pub struct Call {
    address: String,
    body: Value,
    headers: Option<Headers>,
    timeout: Option<Duration>,
    on_result: Option<ResultHandler>,
    on_success: Option<SuccessHandler>,
    on_failure: Option<FailureHandler>,
    ignore_failures: bool,
}

impl Call {
    pub fn new(address: impl Into<String>, body: Value) -> Self {
        Self {
            address: address.into(),
            body,
            headers: None,
            timeout: None,
            on_result: None,
            on_success: None,
            on_failure: None,
            ignore_failures: false,
        }
    }

    /// Attach headers. Repeated calls accumulate.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers.get_or_insert_with(Headers::new).extend(headers);
        self
    }

    /// Apply delivery options. Empty header sets leave the call header-less.
    pub fn options(mut self, options: DeliveryOptions) -> Self {
        if let Some(timeout) = options.reply_timeout() {
            self.timeout = Some(timeout);
        }
        let headers = options.into_headers();
        if !headers.is_empty() {
            self = self.headers(headers);
        }
        self
    }

    /// Set the reply timeout for this call only
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Receive both outcomes in one callback
    pub fn on_result<F>(self, handler: F) -> Self
    where
        F: FnOnce(std::result::Result<Value, Failure>) + Send + 'static,
    {
        self.on_result_boxed(Box::new(handler))
    }

    pub fn on_result_boxed(mut self, handler: ResultHandler) -> Self {
        self.on_result = Some(handler);
        self
    }

    pub fn on_success<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Value) + Send + 'static,
    {
        self.on_success = Some(Box::new(handler));
        self
    }

    pub fn on_failure<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Failure) + Send + 'static,
    {
        self.on_failure = Some(Box::new(handler));
        self
    }

    /// Drop failures instead of delivering them.
    ///
    /// Needed to send with only a success callback and no headers, and
    /// makes a combined callback see successes only.
    pub fn ignore_failures(mut self) -> Self {
        self.ignore_failures = true;
        self
    }

    /// Validate the combination of callbacks and headers
    pub fn resolve(self) -> Result<ResolvedCall> {
        if self.address.is_empty() {
            return Err(invalid("empty address"));
        }

        let has_headers = self.headers.is_some();
        let reply = match (self.on_result, self.on_success, self.on_failure) {
            (None, None, None) => None,
            (Some(handler), None, None) => Some(ReplyHandler::Combined {
                handler,
                ignore_failures: self.ignore_failures,
            }),
            (None, Some(on_success), Some(on_failure)) => Some(ReplyHandler::Split {
                on_success,
                on_failure: if self.ignore_failures {
                    None
                } else {
                    Some(on_failure)
                },
            }),
            // Success-only is the headers form, where failures are dropped
            (None, Some(on_success), None) if has_headers || self.ignore_failures => {
                Some(ReplyHandler::Split {
                    on_success,
                    on_failure: None,
                })
            }
            (None, Some(_), None) => {
                return Err(invalid("success callback without failure callback"))
            }
            (None, None, Some(_)) => {
                return Err(invalid("failure callback without success callback"))
            }
            (Some(_), _, _) => return Err(invalid("combined and separate callbacks")),
        };

        let message = Message::new(self.address, self.body)
            .with_headers(self.headers.unwrap_or_default());
        Ok(ResolvedCall {
            message,
            timeout: self.timeout,
            reply,
        })
    }

    /// Classify positional arguments by position and shape.
    ///
    /// Headers may be given as [`CallArg::Headers`] or as a JSON object of
    /// strings; a JSON `null` in the headers position means no headers.
    pub fn from_args(args: Vec<CallArg>) -> Result<Call> {
        let arity = args.len();
        if !(2..=5).contains(&arity) {
            return Err(invalid("expected 2 to 5 arguments"));
        }

        let mut args = args.into_iter();
        let address = match args.next() {
            Some(CallArg::Value(Value::String(address))) => address,
            _ => return Err(invalid("address must be a string")),
        };
        let body = match args.next() {
            Some(CallArg::Value(body)) => body,
            _ => return Err(invalid("body must be a JSON value")),
        };
        let call = Call::new(address, body);

        match (args.next(), args.next(), args.next()) {
            (None, None, None) => Ok(call),
            (Some(CallArg::Callback(handler)), None, None) => Ok(call.on_result(move |outcome| {
                match outcome {
                    Ok(value) => handler(None, Some(value)),
                    Err(failure) => handler(Some(failure), None),
                }
            })),
            (Some(headers), None, None) => attach_headers(call, headers),
            (Some(CallArg::Callback(on_success)), Some(CallArg::Callback(on_failure)), None) => Ok(call
                .on_success(move |value| on_success(None, Some(value)))
                .on_failure(move |failure| on_failure(Some(failure), None))),
            (Some(headers), Some(CallArg::Callback(on_success)), None) => {
                Ok(attach_headers(call, headers)?
                    .on_success(move |value| on_success(None, Some(value)))
                    .ignore_failures())
            }
            (
                Some(headers),
                Some(CallArg::Callback(on_success)),
                Some(CallArg::Callback(on_failure)),
            ) => Ok(attach_headers(call, headers)?
                .on_success(move |value| on_success(None, Some(value)))
                .on_failure(move |failure| on_failure(Some(failure), None))),
            _ => Err(invalid("callbacks out of position")),
        }
    }
}

fn attach_headers(call: Call, arg: CallArg) -> Result<Call> {
    match arg {
        CallArg::Headers(headers) => Ok(call.headers(headers)),
        CallArg::Value(Value::Null) => Ok(call),
        CallArg::Value(Value::Object(map)) => {
            let mut headers = Headers::with_capacity(map.len());
            for (name, value) in map {
                match value {
                    Value::String(value) => {
                        headers.insert(name, value);
                    }
                    _ => return Err(invalid("header values must be strings")),
                }
            }
            Ok(call.headers(headers))
        }
        _ => Err(invalid("headers must be an object of strings")),
    }
}

/// One positional argument of a send
pub enum CallArg {
    Value(Value),
    Headers(Headers),
    Callback(LegacyHandler),
}

impl CallArg {
    pub fn callback<F>(handler: F) -> Self
    where
        F: FnOnce(Option<Failure>, Option<Value>) + Send + 'static,
    {
        CallArg::Callback(Box::new(handler))
    }
}

impl From<Value> for CallArg {
    fn from(value: Value) -> Self {
        CallArg::Value(value)
    }
}

impl From<Headers> for CallArg {
    fn from(headers: Headers) -> Self {
        CallArg::Headers(headers)
    }
}

fn invalid(reason: &'static str) -> Error {
    tracing::debug!(reason, "rejected call shape");
    Error::InvalidArguments
}
