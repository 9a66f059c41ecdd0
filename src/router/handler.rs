// src/router/handler.rs
use async_trait::async_trait;
use hyper::{Body, Request, Response, StatusCode};
use std::future::Future;

/// Something a routing surface can hand a request to.
///
/// Implemented for any `Fn(Request<Body>) -> impl Future<Output = Result<Response<Body>, SurfaceError>>`,
/// so plain async closures can be registered directly.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, req: Request<Body>) -> Result<Response<Body>, SurfaceError>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Body>, SurfaceError>> + Send + 'static,
{
    async fn call(&self, req: Request<Body>) -> Result<Response<Body>, SurfaceError> {
        (self)(req).await
    }
}

/// Outcome of a middleware step.
pub enum Flow {
    /// Hand the (possibly rewritten) request to the next step.
    Continue(Request<Body>),
    /// Stop here and answer with this response.
    Respond(Response<Body>),
}

/// Runs before route lookup, in registration order.
pub trait Middleware: Send + Sync + 'static {
    fn before(&self, req: Request<Body>) -> Flow;
}

impl<F> Middleware for F
where
    F: Fn(Request<Body>) -> Flow + Send + Sync + 'static,
{
    fn before(&self, req: Request<Body>) -> Flow {
        (self)(req)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Upgrade failed: {0}")]
    Upgrade(#[from] hyper::Error),
}

impl SurfaceError {
    pub fn status(&self) -> StatusCode {
        match self {
            SurfaceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            SurfaceError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SurfaceError::Upgrade(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<SurfaceError> for Response<Body> {
    fn from(err: SurfaceError) -> Self {
        let status = err.status();
        let message = match &err {
            SurfaceError::BadRequest(detail) => detail.clone(),
            SurfaceError::Handler(_) => "Internal server error".to_string(),
            SurfaceError::Upgrade(_) => "Upgrade failed".to_string(),
        };

        text_response(status, message)
    }
}

/// Plain-text response with the given status.
pub fn text_response(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
}
