//! Route registration contract and response helpers.
//!
//! The config service never runs a listener of its own; it hands a set of
//! [`Route`]s to whatever HTTP daemon hosts the management API and takes
//! them back on shutdown. Handlers speak plain `http` request/response
//! types so they can be driven by any server, or directly by tests.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use serde::Serialize;
use thiserror::Error;

/// Error returned by an HTTP daemon when routes cannot be registered.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RouteError {
    pub message: String,
}

impl RouteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Handles requests matched to one route.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes>;
}

/// One registered route. `pattern` is either an exact path or, when it
/// ends with `/`, an anchored prefix.
#[derive(Clone)]
pub struct Route {
    pub name: &'static str,
    pub method: Method,
    pub pattern: &'static str,
    pub handler: Arc<dyn RouteHandler>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .finish()
    }
}

/// The HTTP daemon hosting the management API. Consumed, not provided, by
/// this crate.
pub trait HttpService: Send + Sync {
    fn add_routes(&self, routes: Vec<Route>) -> Result<(), RouteError>;
    fn del_routes(&self, routes: &[Route]);
}

/// A JSON response with the given status.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Bytes> {
    match serde_json::to_vec(body) {
        Ok(encoded) => build(status, Bytes::from(encoded)),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("failed to encode response: {e}"),
        ),
    }
}

/// A `{"error": "..."}` response with the given status.
pub fn error_response(status: StatusCode, message: &str) -> Response<Bytes> {
    let body = serde_json::json!({ "error": message });
    build(status, Bytes::from(body.to_string()))
}

/// An empty 204 response.
pub fn no_content() -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

fn build(status: StatusCode, body: Bytes) -> Response<Bytes> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}
