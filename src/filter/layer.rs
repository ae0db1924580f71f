use crate::error::RecourseError;
use crate::event::{BoxError, Failure};
use crate::filter::signal::{RaisedError, RedirectTo};
use crate::filter::{ErrorFilter, FilterChain};
use crate::response::{BufferedResponse, HttpResponse};
use crate::state::ErrorRequest;
use async_trait::async_trait;
use axum::{body::Body, http::Request, response::IntoResponse, response::Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower Layer running the inner service behind an [`ErrorFilter`]
///
/// Failures no handler takes are returned as the service error, so an axum router
/// needs `HandleErrorLayer` in front of it.
///
/// # Example
/// ```rust,ignore
/// let handlers = Arc::new(HandlerSet::new());
/// handlers.register(JsonErrorHandler::catch_all());
///
/// let app = Router::new().route("/orders/{id}", get(show_order)).layer(
///     ServiceBuilder::new()
///         .layer(HandleErrorLayer::new(|e: BoxError| async move {
///             (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
///         }))
///         .layer(ErrorFilterLayer::new(ErrorFilter::new(handlers))),
/// );
/// ```
#[derive(Clone)]
pub struct ErrorFilterLayer {
    filter: Arc<ErrorFilter>,
}

impl ErrorFilterLayer {
    pub fn new(filter: ErrorFilter) -> Self {
        Self {
            filter: Arc::new(filter),
        }
    }
}

impl<S> Layer<S> for ErrorFilterLayer {
    type Service = ErrorFilterService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorFilterService {
            inner,
            filter: Arc::clone(&self.filter),
        }
    }
}

#[derive(Clone)]
pub struct ErrorFilterService<S> {
    inner: S,
    filter: Arc<ErrorFilter>,
}

impl<S> Service<Request<Body>> for ErrorFilterService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError> + Send,
{
    type Response = Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let filter = Arc::clone(&self.filter);

        // The service polled ready moves into the future; the clone stays behind.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let error_request = ErrorRequest::from_parts(parts.clone());
            let mut chain = ServiceChain {
                inner,
                request: Some(Request::from_parts(parts, body)),
            };

            let mut response = BufferedResponse::new();
            filter
                .process(&error_request, &mut response, &mut chain)
                .await?;
            Ok(response.into_response())
        })
    }
}

/// Runs the inner service once and writes its response through the filter
struct ServiceChain<S> {
    inner: S,
    request: Option<Request<Body>>,
}

#[async_trait]
impl<S> FilterChain for ServiceChain<S>
where
    S: Service<Request<Body>, Response = Response> + Send,
    S::Future: Send,
    S::Error: Into<BoxError> + Send,
{
    async fn proceed(
        &mut self,
        _request: &ErrorRequest,
        response: &mut dyn HttpResponse,
    ) -> Result<(), Failure> {
        let request = self
            .request
            .take()
            .ok_or_else(|| Failure::runtime(RecourseError::ChainConsumed))?;
        let downstream = self
            .inner
            .call(request)
            .await
            .map_err(|e| Failure::from_boxed(e.into()))?;
        forward(downstream, response).await
    }
}

async fn forward(downstream: Response, response: &mut dyn HttpResponse) -> Result<(), Failure> {
    let (parts, body) = downstream.into_parts();
    for (name, value) in &parts.headers {
        response.append_header(name.clone(), value.clone());
    }

    if let Some(raised) = parts.extensions.get::<RaisedError>().cloned() {
        return response
            .send_error(raised.status(), raised.message().map(str::to_string))
            .await
            .map_err(Failure::runtime);
    }
    if let Some(redirect) = parts.extensions.get::<RedirectTo>() {
        return response
            .send_redirect(redirect.location())
            .map_err(Failure::runtime);
    }

    response.set_status(parts.status);
    response.set_body(body).map_err(Failure::runtime)
}
