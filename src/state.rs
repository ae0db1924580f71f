//! Request-scoped error state

use crate::error::Result;
use crate::event::{ErrorEvent, Failure};
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri, request::Parts};
use std::sync::{Arc, Mutex, PoisonError};

/// Resolves the component currently producing content for a request
///
/// Consulted for the `handler_name` attribute only; failures are logged and ignored.
pub trait ContentResolver: Send + Sync {
    fn active_component_name(&self) -> Result<Option<String>>;
}

/// Error attributes of one request
///
/// Once `in_progress` is set it stays set for the rest of the request.
#[derive(Debug, Clone, Default)]
pub struct RequestErrorState {
    in_progress: bool,
    request_uri: Option<String>,
    handler_name: Option<String>,
    status: Option<StatusCode>,
    message: Option<String>,
    exception: Option<Failure>,
    exception_type: Option<&'static str>,
}

impl RequestErrorState {
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Path of the request whose failure is being handled
    pub fn request_uri(&self) -> Option<&str> {
        self.request_uri.as_deref()
    }

    pub fn handler_name(&self) -> Option<&str> {
        self.handler_name.as_deref()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn exception(&self) -> Option<&Failure> {
        self.exception.as_ref()
    }

    pub fn exception_type(&self) -> Option<&'static str> {
        self.exception_type
    }

    pub(crate) fn record_event(&mut self, event: &ErrorEvent) {
        match event {
            ErrorEvent::Status { status, message } => {
                self.status = Some(*status);
                self.message = message.clone();
            }
            ErrorEvent::Exception { failure } => {
                self.exception_type = Some(failure.type_name());
                self.message = Some(failure.message());
                self.exception = Some(failure.clone());
            }
        }
    }

    /// A `None` name keeps the one recorded for the last candidate
    pub(crate) fn begin(&mut self, request_uri: String, handler_name: Option<String>) {
        self.request_uri = Some(request_uri);
        if handler_name.is_some() {
            self.handler_name = handler_name;
        }
        self.in_progress = true;
    }
}

/// The request as seen by the error filter and by error handlers
pub struct ErrorRequest {
    parts: Parts,
    content: Option<Arc<dyn ContentResolver>>,
    state: Mutex<RequestErrorState>,
}

impl ErrorRequest {
    pub fn from_parts(parts: Parts) -> Self {
        Self {
            parts,
            content: None,
            state: Mutex::new(RequestErrorState::default()),
        }
    }

    /// Build a bodiless request, mostly useful in tests
    pub fn get(uri: &str) -> std::result::Result<Self, axum::http::Error> {
        let (parts, ()) = Request::get(uri).body(())?.into_parts();
        Ok(Self::from_parts(parts))
    }

    pub fn with_content_resolver(mut self, resolver: Arc<dyn ContentResolver>) -> Self {
        self.content = Some(resolver);
        self
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn extensions(&self) -> &axum::http::Extensions {
        &self.parts.extensions
    }

    /// A snapshot of the error attributes
    pub fn error_state(&self) -> RequestErrorState {
        self.update_error_state(|state| state.clone())
    }

    pub fn is_error_in_progress(&self) -> bool {
        self.update_error_state(|state| state.in_progress)
    }

    pub(crate) fn update_error_state<R>(&self, f: impl FnOnce(&mut RequestErrorState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub(crate) fn active_component_name(&self) -> Result<Option<String>> {
        match &self.content {
            Some(resolver) => resolver.active_component_name(),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecourseError;

    struct BrokenResolver;

    impl ContentResolver for BrokenResolver {
        fn active_component_name(&self) -> Result<Option<String>> {
            Err(RecourseError::ContentResolution("wrong request type".into()))
        }
    }

    #[test]
    fn test_record_status_event() {
        let request = ErrorRequest::get("/orders/7?full=1").unwrap();
        assert!(!request.is_error_in_progress());

        request.update_error_state(|state| {
            state.record_event(&ErrorEvent::status(
                StatusCode::NOT_FOUND,
                Some("no such order".into()),
            ))
        });
        let state = request.error_state();
        assert_eq!(state.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(state.message(), Some("no such order"));
        assert!(state.exception().is_none());
        assert!(!state.in_progress());
    }

    #[test]
    fn test_begin_sets_guard() {
        let request = ErrorRequest::get("/orders/7").unwrap();
        request.update_error_state(|state| state.begin("/orders/7".into(), None));
        assert!(request.is_error_in_progress());
        assert_eq!(request.error_state().request_uri(), Some("/orders/7"));
    }

    #[test]
    fn test_begin_without_name_keeps_previous() {
        let request = ErrorRequest::get("/orders/7").unwrap();
        request.update_error_state(|state| state.begin("/orders/7".into(), Some("broken".into())));
        request.update_error_state(|state| state.begin("/orders/7".into(), None));
        assert_eq!(request.error_state().handler_name(), Some("broken"));
    }

    #[test]
    fn test_resolver_errors_surface() {
        let request = ErrorRequest::get("/").unwrap();
        assert!(request.active_component_name().unwrap().is_none());

        let request = request.with_content_resolver(Arc::new(BrokenResolver));
        assert!(request.active_component_name().is_err());
    }
}
