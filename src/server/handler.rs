// src/server/handler.rs
use arc_swap::ArcSwapOption;
use hyper::{Body, Request, Response};
use std::sync::Arc;
use tower::Service;

use crate::metrics::{MetricsCollector, Timer};
use crate::router::{is_upgrade_request, Router};

/// Which slot of the listener a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Standard,
    Upgrade,
}

impl RequestKind {
    pub fn of<B>(req: &Request<B>) -> Self {
        if is_upgrade_request(req) {
            RequestKind::Upgrade
        } else {
            RequestKind::Standard
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RequestKind::Standard => "primary",
            RequestKind::Upgrade => "upgrade",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no {0} surface attached to the listener")]
    NoSurface(&'static str),
}

/// The listener's two named handler slots plus optional metrics.
#[derive(Default)]
pub(crate) struct HandlerSlots {
    on_request: ArcSwapOption<Router>,
    on_upgrade: ArcSwapOption<Router>,
    metrics: ArcSwapOption<MetricsCollector>,
}

impl HandlerSlots {
    pub(crate) fn set(&self, kind: RequestKind, router: Router) {
        let previous = self.slot(kind).swap(Some(Arc::new(router)));
        if previous.is_some() {
            tracing::debug!(slot = kind.label(), "surface replaced");
        }
    }

    pub(crate) fn get(&self, kind: RequestKind) -> Option<Arc<Router>> {
        self.slot(kind).load_full()
    }

    pub(crate) fn set_metrics(&self, metrics: Arc<MetricsCollector>) {
        self.metrics.store(Some(metrics));
    }

    pub(crate) fn metrics(&self) -> Option<Arc<MetricsCollector>> {
        self.metrics.load_full()
    }

    fn slot(&self, kind: RequestKind) -> &ArcSwapOption<Router> {
        match kind {
            RequestKind::Standard => &self.on_request,
            RequestKind::Upgrade => &self.on_upgrade,
        }
    }
}

/// Per-connection service: sends each request to exactly one slot.
#[derive(Clone)]
pub struct Dispatcher {
    slots: Arc<HandlerSlots>,
}

impl Dispatcher {
    pub(crate) fn new(slots: Arc<HandlerSlots>) -> Self {
        Self { slots }
    }

    pub(crate) fn metrics(&self) -> Option<Arc<MetricsCollector>> {
        self.slots.metrics()
    }
}

impl Service<Request<Body>> for Dispatcher {
    type Response = Response<Body>;
    type Error = Box<dyn std::error::Error + Send + Sync>;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let kind = RequestKind::of(&req);
        let router = self.slots.get(kind);
        let metrics = self.slots.metrics();

        Box::pin(async move {
            let Some(router) = router else {
                if let Some(metrics) = &metrics {
                    metrics.record_unhandled(kind.label());
                }
                // Dropping the connection matches a server with no listener for this kind.
                return Err(Box::new(DispatchError::NoSurface(kind.label()))
                    as Box<dyn std::error::Error + Send + Sync>);
            };

            let timer = Timer::new();
            let response = router.handle(req).await;
            if let Some(metrics) = &metrics {
                metrics.record_request(kind.label(), response.status().as_u16(), timer.elapsed());
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::SurfaceError;
    use tower::ServiceExt;

    fn plain() -> Request<Body> {
        Request::get("/").body(Body::empty()).unwrap()
    }

    fn upgrade() -> Request<Body> {
        Request::get("/ws")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .body(Body::empty())
            .unwrap()
    }

    fn surface(name: &'static str) -> Router {
        let router = Router::new(name);
        router.fallback(move |_req: Request<Body>| async move {
            Ok::<_, SurfaceError>(Response::new(Body::from(name)))
        });
        router
    }

    #[tokio::test]
    async fn test_each_kind_reaches_only_its_slot() {
        let slots = Arc::new(HandlerSlots::default());
        let primary = surface("primary");
        let upgrade_surface = surface("upgrade");
        slots.set(RequestKind::Standard, primary.clone());
        slots.set(RequestKind::Upgrade, upgrade_surface.clone());

        let dispatcher = Dispatcher::new(slots);
        dispatcher.clone().oneshot(plain()).await.unwrap();
        dispatcher.clone().oneshot(plain()).await.unwrap();
        dispatcher.oneshot(upgrade()).await.unwrap();

        assert_eq!(primary.requests_handled(), 2);
        assert_eq!(upgrade_surface.requests_handled(), 1);
    }

    #[tokio::test]
    async fn test_empty_slot_is_an_error() {
        let slots = Arc::new(HandlerSlots::default());
        slots.set(RequestKind::Standard, surface("primary"));

        let err = Dispatcher::new(slots).oneshot(upgrade()).await.unwrap_err();
        assert_eq!(err.to_string(), "no upgrade surface attached to the listener");
    }

    #[tokio::test]
    async fn test_records_metrics_per_surface() {
        let registry = crate::metrics::MetricsRegistry::new().unwrap();
        let slots = Arc::new(HandlerSlots::default());
        slots.set(RequestKind::Standard, surface("primary"));
        slots.set_metrics(registry.collector());

        let dispatcher = Dispatcher::new(slots);
        dispatcher.clone().oneshot(plain()).await.unwrap();
        assert!(dispatcher.oneshot(upgrade()).await.is_err());

        let metrics = registry.collector();
        assert_eq!(
            metrics
                .requests_total
                .with_label_values(&["primary", "200"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .unhandled_requests_total
                .with_label_values(&["upgrade"])
                .get(),
            1
        );
    }
}
