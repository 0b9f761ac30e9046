//! Checks run on the service side before a message reaches its service.
//!
//! Interceptors see the address, headers and body of every incoming
//! message and share an [`InterceptorContext`] for the duration of that
//! message. Returning an error fails the call as a recipient failure with
//! the error's code and message.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Map, Value};

use courier_core::Headers;

use crate::binder::ServiceError;
use crate::builder::AUTH_TOKEN_HEADER;

/// Context key under which authentication stores the caller's principal
pub const USER_KEY: &str = "user";

/// Failure code for missing or unknown credentials
pub const UNAUTHORIZED_CODE: i32 = 401;

/// Failure code for a principal lacking a required authority
pub const FORBIDDEN_CODE: i32 = 403;

/// Failure code for an authenticator that could not decide
pub const AUTHENTICATION_ERROR_CODE: i32 = 500;

/// Values shared between the interceptors of one message
pub type InterceptorContext = Map<String, Value>;

/// Where an interceptor may sit in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InterceptorPriority {
    Authentication,
    Authorization,
    User,
}

impl fmt::Display for InterceptorPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InterceptorPriority::Authentication => "AUTHENTICATION",
            InterceptorPriority::Authorization => "AUTHORIZATION",
            InterceptorPriority::User => "USER",
        })
    }
}

/// An incoming message as seen by interceptors
#[derive(Debug, Clone, Copy)]
pub struct ServiceRequest<'a> {
    address: &'a str,
    headers: &'a Headers,
    body: &'a Value,
}

impl<'a> ServiceRequest<'a> {
    pub fn new(address: &'a str, headers: &'a Headers, body: &'a Value) -> Self {
        Self {
            address,
            headers,
            body,
        }
    }

    pub fn address(&self) -> &'a str {
        self.address
    }

    pub fn headers(&self) -> &'a Headers {
        self.headers
    }

    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn body(&self) -> &'a Value {
        self.body
    }

    /// The requested action, if the body names one
    pub fn action(&self) -> Option<&'a str> {
        self.body.get("action").and_then(Value::as_str)
    }
}

/// A check run before every message of a bound service
#[async_trait::async_trait]
pub trait ServiceInterceptor: Send + Sync + 'static {
    fn priority(&self) -> InterceptorPriority {
        InterceptorPriority::User
    }

    /// Let the message through, or reject it
    async fn intercept(
        &self,
        request: &ServiceRequest<'_>,
        context: &mut InterceptorContext,
    ) -> Result<(), ServiceError>;
}

/// Resolves auth tokens to principals
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// The principal for `token`, or `None` if the token is not recognised
    async fn authenticate(&self, token: &str) -> Result<Option<Value>, ServiceError>;
}

/// Requires a valid `auth-token` header and records its principal
pub struct AuthenticationInterceptor<A> {
    authenticator: A,
}

impl<A: Authenticator> AuthenticationInterceptor<A> {
    pub fn new(authenticator: A) -> Self {
        Self { authenticator }
    }
}

#[async_trait::async_trait]
impl<A: Authenticator> ServiceInterceptor for AuthenticationInterceptor<A> {
    fn priority(&self) -> InterceptorPriority {
        InterceptorPriority::Authentication
    }

    async fn intercept(
        &self,
        request: &ServiceRequest<'_>,
        context: &mut InterceptorContext,
    ) -> Result<(), ServiceError> {
        let token = request
            .header(AUTH_TOKEN_HEADER)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ServiceError::new(UNAUTHORIZED_CODE, "Missing auth token"))?;

        let user = self
            .authenticator
            .authenticate(token)
            .await
            .map_err(|err| ServiceError::new(AUTHENTICATION_ERROR_CODE, err.message))?
            .ok_or_else(|| ServiceError::new(UNAUTHORIZED_CODE, "Unauthorized"))?;

        context.insert(USER_KEY.to_string(), user);
        Ok(())
    }
}

/// Requires the authenticated principal to hold every listed authority.
///
/// Authorities are read from the principal's `authorities` array. Messages
/// without an authenticated principal pass untouched.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationInterceptor {
    required: BTreeSet<String>,
}

impl AuthorizationInterceptor {
    pub fn new<I, S>(authorities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: authorities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.required.insert(authority.into());
        self
    }

    fn allows(&self, user: &Value) -> bool {
        let granted: BTreeSet<&str> = user
            .get("authorities")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        self.required
            .iter()
            .all(|authority| granted.contains(authority.as_str()))
    }
}

#[async_trait::async_trait]
impl ServiceInterceptor for AuthorizationInterceptor {
    fn priority(&self) -> InterceptorPriority {
        InterceptorPriority::Authorization
    }

    async fn intercept(
        &self,
        _request: &ServiceRequest<'_>,
        context: &mut InterceptorContext,
    ) -> Result<(), ServiceError> {
        match context.get(USER_KEY) {
            Some(user) if !self.allows(user) => {
                Err(ServiceError::new(FORBIDDEN_CODE, "Forbidden"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request<'a>(headers: &'a Headers, body: &'a Value) -> ServiceRequest<'a> {
        ServiceRequest::new("svc", headers, body)
    }

    struct Tokens;

    #[async_trait::async_trait]
    impl Authenticator for Tokens {
        async fn authenticate(&self, token: &str) -> Result<Option<Value>, ServiceError> {
            match token {
                "good" => Ok(Some(json!({"name": "ada", "authorities": ["read"]}))),
                "broken" => Err(ServiceError::message("directory offline")),
                _ => Ok(None),
            }
        }
    }

    #[tokio::test]
    async fn authentication_stores_the_principal() {
        let mut headers = Headers::new();
        headers.insert(AUTH_TOKEN_HEADER.to_string(), "good".to_string());
        let body = json!({"action": "get"});
        let mut context = InterceptorContext::new();

        AuthenticationInterceptor::new(Tokens)
            .intercept(&request(&headers, &body), &mut context)
            .await
            .unwrap();

        assert_eq!(context[USER_KEY]["name"], json!("ada"));
    }

    #[tokio::test]
    async fn authentication_failures_carry_their_codes() {
        let interceptor = AuthenticationInterceptor::new(Tokens);
        let body = json!({"action": "get"});

        let missing = interceptor
            .intercept(&request(&Headers::new(), &body), &mut InterceptorContext::new())
            .await
            .unwrap_err();
        assert_eq!(missing.code, UNAUTHORIZED_CODE);

        let mut headers = Headers::new();
        headers.insert(AUTH_TOKEN_HEADER.to_string(), "broken".to_string());
        let broken = interceptor
            .intercept(&request(&headers, &body), &mut InterceptorContext::new())
            .await
            .unwrap_err();
        assert_eq!(broken.code, AUTHENTICATION_ERROR_CODE);
        assert_eq!(broken.message, "directory offline");
    }

    #[tokio::test]
    async fn authorization_checks_every_required_authority() {
        let headers = Headers::new();
        let body = json!({});
        let mut context = InterceptorContext::new();
        context.insert(
            USER_KEY.to_string(),
            json!({"authorities": ["read", "write"]}),
        );

        let reader = AuthorizationInterceptor::new(["read"]);
        assert!(reader
            .intercept(&request(&headers, &body), &mut context)
            .await
            .is_ok());

        let admin = reader.authority("admin");
        let denied = admin
            .intercept(&request(&headers, &body), &mut context)
            .await
            .unwrap_err();
        assert_eq!(denied.code, FORBIDDEN_CODE);

        // Nothing to check without a principal
        assert!(admin
            .intercept(&request(&headers, &body), &mut InterceptorContext::new())
            .await
            .is_ok());
    }

    #[test]
    fn request_exposes_the_action() {
        let headers = Headers::new();
        let body = json!({"action": "commit", "x": 1});
        assert_eq!(request(&headers, &body).action(), Some("commit"));
        assert_eq!(request(&headers, &json!(3)).action(), None);
    }
}
