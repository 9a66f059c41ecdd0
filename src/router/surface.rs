// src/router/surface.rs
use super::handler::{text_response, Flow, Handler, Middleware};
use arc_swap::{ArcSwap, ArcSwapOption};
use dashmap::DashMap;
use hyper::{Body, Method, Request, Response, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteKey {
    /// `None` matches any method.
    method: Option<Method>,
    path: String,
}

struct Registry {
    name: &'static str,
    routes: DashMap<RouteKey, Arc<dyn Handler>>,
    middleware: ArcSwap<Vec<Arc<dyn Middleware>>>,
    fallback: ArcSwapOption<Box<dyn Handler>>,
    handled: AtomicU64,
}

/// An independent request-handling registry.
///
/// Cloning a `Router` yields another handle to the same registry; two routers
/// created with [`Router::new`] never share anything.
#[derive(Clone)]
pub struct Router {
    inner: Arc<Registry>,
}

impl Router {
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(Registry {
                name,
                routes: DashMap::new(),
                middleware: ArcSwap::from_pointee(Vec::new()),
                fallback: ArcSwapOption::empty(),
                handled: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Register `handler` for exact `method` + `path`. Replaces any previous one.
    pub fn route<H: Handler>(&self, method: Method, path: impl Into<String>, handler: H) -> &Self {
        self.insert(Some(method), path.into(), handler);
        self
    }

    pub fn get<H: Handler>(&self, path: impl Into<String>, handler: H) -> &Self {
        self.route(Method::GET, path, handler)
    }

    pub fn post<H: Handler>(&self, path: impl Into<String>, handler: H) -> &Self {
        self.route(Method::POST, path, handler)
    }

    /// Register `handler` for `path` regardless of method.
    pub fn any<H: Handler>(&self, path: impl Into<String>, handler: H) -> &Self {
        self.insert(None, path.into(), handler);
        self
    }

    /// Handler used when no route matches.
    pub fn fallback<H: Handler>(&self, handler: H) -> &Self {
        self.inner
            .fallback
            .store(Some(Arc::new(Box::new(handler) as Box<dyn Handler>)));
        self
    }

    pub fn middleware<M: Middleware>(&self, middleware: M) -> &Self {
        let middleware: Arc<dyn Middleware> = Arc::new(middleware);
        self.inner.middleware.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(middleware.clone());
            next
        });
        self
    }

    /// Number of requests this surface has been asked to handle.
    pub fn requests_handled(&self) -> u64 {
        self.inner.handled.load(Ordering::Relaxed)
    }

    /// Whether both handles point at the same registry.
    pub fn ptr_eq(&self, other: &Router) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        self.inner.handled.fetch_add(1, Ordering::Relaxed);

        let mut req = req;
        let middleware = self.inner.middleware.load_full();
        for middleware in middleware.iter() {
            match middleware.before(req) {
                Flow::Continue(next) => req = next,
                Flow::Respond(response) => return response,
            }
        }

        let result = if let Some(handler) = self.lookup(req.method(), req.uri().path()) {
            handler.call(req).await
        } else if let Some(fallback) = self.inner.fallback.load_full() {
            fallback.call(req).await
        } else {
            return text_response(StatusCode::NOT_FOUND, "Not Found");
        };

        result.unwrap_or_else(|err| {
            tracing::debug!(surface = self.name(), %err, "handler returned an error");
            Response::from(err)
        })
    }

    fn insert<H: Handler>(&self, method: Option<Method>, path: String, handler: H) {
        let key = RouteKey { method, path };
        if self.inner.routes.insert(key.clone(), Arc::new(handler)).is_some() {
            tracing::debug!(surface = self.name(), path = %key.path, "route replaced");
        }
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<Arc<dyn Handler>> {
        let exact = RouteKey {
            method: Some(method.clone()),
            path: path.to_string(),
        };
        if let Some(entry) = self.inner.routes.get(&exact) {
            return Some(entry.value().clone());
        }

        let any = RouteKey {
            method: None,
            path: exact.path,
        };
        self.inner.routes.get(&any).map(|entry| entry.value().clone())
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("name", &self.inner.name)
            .field("routes", &self.inner.routes.len())
            .field("handled", &self.requests_handled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::SurfaceError;

    async fn body_text(response: Response<Body>) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn request(method: Method, path: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    fn reply(text: &'static str) -> impl Handler {
        move |_req: Request<Body>| async move { Ok::<_, SurfaceError>(Response::new(Body::from(text))) }
    }

    #[tokio::test]
    async fn test_exact_method_beats_any() {
        let router = Router::new("test");
        router.any("/thing", reply("any"));
        router.get("/thing", reply("get"));

        assert_eq!(body_text(router.handle(request(Method::GET, "/thing")).await).await, "get");
        assert_eq!(body_text(router.handle(request(Method::DELETE, "/thing")).await).await, "any");
        assert_eq!(router.requests_handled(), 2);
    }

    #[tokio::test]
    async fn test_fallback_then_not_found() {
        let router = Router::new("test");
        let response = router.handle(request(Method::GET, "/missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        router.fallback(reply("fallback"));
        let response = router.handle(request(Method::GET, "/missing")).await;
        assert_eq!(body_text(response).await, "fallback");
    }

    #[tokio::test]
    async fn test_middleware_runs_in_order_and_short_circuits() {
        let router = Router::new("test");
        router.get("/private", reply("secret"));
        router.middleware(|mut req: Request<Body>| {
            req.headers_mut().insert("x-seen", "1".parse().unwrap());
            Flow::Continue(req)
        });
        router.middleware(|req: Request<Body>| {
            if req.headers().contains_key("authorization") {
                Flow::Continue(req)
            } else {
                assert!(req.headers().contains_key("x-seen"));
                Flow::Respond(text_response(StatusCode::UNAUTHORIZED, "denied"))
            }
        });

        let response = router.handle(request(Method::GET, "/private")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut req = request(Method::GET, "/private");
        req.headers_mut().insert("authorization", "token".parse().unwrap());
        assert_eq!(body_text(router.handle(req).await).await, "secret");
    }

    #[tokio::test]
    async fn test_handler_error_becomes_response() {
        let router = Router::new("test");
        router.post("/fail", |_req: Request<Body>| async {
            Err::<Response<Body>, _>(SurfaceError::BadRequest("missing field".into()))
        });

        let response = router.handle(request(Method::POST, "/fail")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "missing field");
    }

    #[test]
    fn test_clones_share_registry_but_new_routers_do_not() {
        let first = Router::new("primary");
        let second = Router::new("primary");
        assert!(first.ptr_eq(&first.clone()));
        assert!(!first.ptr_eq(&second));

        first.get("/only-first", reply("x"));
        assert!(first.lookup(&Method::GET, "/only-first").is_some());
        assert!(second.lookup(&Method::GET, "/only-first").is_none());
    }
}
