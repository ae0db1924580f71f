//! Error resolution
//!
//! The [`ErrorDispatcher`] walks the levels of an [`ErrorEvent`] from most to least
//! specific and hands the error to the first live handler that accepts the level and
//! completes without failing.
//!
//! ```text
//! status 404        →  404 → 400 → 0
//! failure OrderGone →  app::OrderGone → app::NotFound → std::error::Error
//! ```
//!
//! The first dispatch of a request marks it as in progress, whatever the result. Any
//! later dispatch for the same request returns [`Outcome::Unhandled`] untouched, so a
//! failing error page cannot trigger another round of error handling.

use crate::event::{ErrorEvent, Level, panic_message};
use crate::handler::{ErrorHandler, HandlerRegistry};
use crate::response::HttpResponse;
use crate::state::ErrorRequest;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Result of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Outcome {
    Handled,
    Unhandled,
}

#[derive(Clone)]
pub struct ErrorDispatcher {
    registry: Arc<dyn HandlerRegistry>,
}

impl ErrorDispatcher {
    pub fn new(registry: Arc<dyn HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Route `event` to the most specific handler willing to take it
    ///
    /// Handlers render into `response`, which must be the transport response and not
    /// an intercepting wrapper.
    pub async fn dispatch(
        &self,
        event: &ErrorEvent,
        request: &ErrorRequest,
        response: &mut dyn HttpResponse,
    ) -> Outcome {
        if request.is_error_in_progress() {
            tracing::debug!(
                uri = %request.uri(),
                "Error handling already in progress, not dispatching"
            );
            return Outcome::Unhandled;
        }

        for level in event.levels() {
            for handler in self.registry.live_handlers() {
                if !accepts(handler.as_ref(), level) {
                    continue;
                }

                request.update_error_state(|state| state.record_event(event));
                if self.invoke(Some(handler.as_ref()), request, response).await {
                    tracing::debug!(
                        handler = handler.identify(),
                        ?level,
                        "Error handled"
                    );
                    return Outcome::Handled;
                }
            }
        }

        // keeps the guard for the rest of the request
        self.invoke(None, request, response).await;
        tracing::debug!(?event, "No error handler took the error");
        Outcome::Unhandled
    }

    async fn invoke(
        &self,
        handler: Option<&dyn ErrorHandler>,
        request: &ErrorRequest,
        response: &mut dyn HttpResponse,
    ) -> bool {
        let component = request.active_component_name().unwrap_or_else(|e| {
            tracing::warn!("Cannot resolve active component, ignoring: {}", e);
            None
        });
        let handler_name = component.or_else(|| handler.map(|h| h.identify().to_string()));
        let request_uri = request.uri().path().to_string();
        request.update_error_state(|state| state.begin(request_uri, handler_name));

        let Some(handler) = handler else {
            return false;
        };

        match AssertUnwindSafe(handler.handle(request, response))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(handler = handler.identify(), "Cannot handle error: {:#}", e);
                false
            }
            Err(payload) => {
                tracing::error!(
                    handler = handler.identify(),
                    "Error handler panicked: {}",
                    panic_message(payload.as_ref())
                );
                false
            }
        }
    }
}

fn accepts(handler: &dyn ErrorHandler, level: Level) -> bool {
    match level {
        Level::Status(status) => handler.can_handle_status(status),
        Level::Type(type_name) => handler.can_handle_exception(type_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RecourseError, Result};
    use crate::event::{Classify, Failure, ROOT_FAILURE_TYPE};
    use crate::handler::HandlerSet;
    use crate::response::BufferedResponse;
    use crate::state::ContentResolver;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::Mutex;

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Behavior {
        Succeed,
        Fail,
        Panic,
    }

    /// Records its invocations into a shared journal
    struct Recording {
        name: &'static str,
        statuses: Vec<u16>,
        types: Vec<&'static str>,
        behavior: Behavior,
        journal: Arc<Mutex<Vec<String>>>,
    }

    impl Recording {
        fn new(name: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                statuses: Vec::new(),
                types: Vec::new(),
                behavior: Behavior::Succeed,
                journal: Arc::clone(journal),
            }
        }

        fn status(mut self, status: u16) -> Self {
            self.statuses.push(status);
            self
        }

        fn exception(mut self, type_name: &'static str) -> Self {
            self.types.push(type_name);
            self
        }

        fn behave(mut self, behavior: Behavior) -> Self {
            self.behavior = behavior;
            self
        }
    }

    #[async_trait]
    impl ErrorHandler for Recording {
        fn can_handle_status(&self, status: u16) -> bool {
            self.statuses.contains(&status)
        }

        fn can_handle_exception(&self, type_name: &str) -> bool {
            self.types.contains(&type_name)
        }

        fn identify(&self) -> &str {
            self.name
        }

        async fn handle(
            &self,
            request: &ErrorRequest,
            response: &mut dyn HttpResponse,
        ) -> anyhow::Result<()> {
            self.journal.lock().unwrap().push(self.name.to_string());
            assert!(request.is_error_in_progress());
            match self.behavior {
                Behavior::Succeed => {
                    response.write(self.name.as_bytes())?;
                    response.flush()?;
                    Ok(())
                }
                Behavior::Fail => anyhow::bail!("{} is broken", self.name),
                Behavior::Panic => panic!("{} exploded", self.name),
            }
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("order gone")]
    struct OrderGone;

    impl Classify for OrderGone {
        fn ancestry(&self) -> &'static [&'static str] {
            &["app::NotFound"]
        }
    }

    fn journal() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    async fn run(handlers: HandlerSet, event: ErrorEvent) -> (Outcome, ErrorRequest) {
        let dispatcher = ErrorDispatcher::new(Arc::new(handlers));
        let request = ErrorRequest::get("/orders/7").unwrap();
        let mut response = BufferedResponse::new();
        let outcome = dispatcher.dispatch(&event, &request, &mut response).await;
        (outcome, request)
    }

    fn not_found() -> ErrorEvent {
        ErrorEvent::status(StatusCode::NOT_FOUND, Some("missing".into()))
    }

    #[tokio::test]
    async fn test_exact_status_beats_catch_all() {
        let journal = journal();
        let handlers = HandlerSet::new();
        handlers.register(Recording::new("catch-all", &journal).status(0));
        handlers.register(Recording::new("not-found", &journal).status(404));

        let (outcome, request) = run(handlers, not_found()).await;

        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(*journal.lock().unwrap(), vec!["not-found"]);
        let state = request.error_state();
        assert_eq!(state.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(state.message(), Some("missing"));
        assert_eq!(state.handler_name(), Some("not-found"));
        assert_eq!(state.request_uri(), Some("/orders/7"));
    }

    #[tokio::test]
    async fn test_truncated_status_levels() {
        let journal = journal();
        let handlers = HandlerSet::new();
        handlers.register(Recording::new("catch-all", &journal).status(0));
        handlers.register(Recording::new("client-errors", &journal).status(400));

        let (outcome, _) = run(handlers, not_found()).await;

        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(*journal.lock().unwrap(), vec!["client-errors"]);
    }

    #[tokio::test]
    async fn test_only_catch_all() {
        let journal = journal();
        let handlers = HandlerSet::new();
        handlers.register(Recording::new("catch-all", &journal).status(0));

        let (outcome, _) = run(handlers, not_found()).await;

        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(*journal.lock().unwrap(), vec!["catch-all"]);
    }

    #[tokio::test]
    async fn test_no_handlers_still_sets_guard() {
        let (outcome, request) = run(HandlerSet::new(), not_found()).await;

        assert_eq!(outcome, Outcome::Unhandled);
        let state = request.error_state();
        assert!(state.in_progress());
        assert_eq!(state.request_uri(), Some("/orders/7"));
        assert!(state.handler_name().is_none());
    }

    #[tokio::test]
    async fn test_unhandled_dispatch_keeps_last_candidate_name() {
        let journal = journal();
        let handlers = HandlerSet::new();
        handlers.register(Recording::new("broken", &journal).status(404).behave(Behavior::Fail));

        let (outcome, request) = run(handlers, not_found()).await;

        assert_eq!(outcome, Outcome::Unhandled);
        assert_eq!(*journal.lock().unwrap(), vec!["broken"]);
        let state = request.error_state();
        assert!(state.in_progress());
        assert_eq!(state.handler_name(), Some("broken"));
    }

    #[tokio::test]
    async fn test_base_type_handler() {
        let journal = journal();
        let handlers = HandlerSet::new();
        handlers.register(Recording::new("root", &journal).exception(ROOT_FAILURE_TYPE));
        handlers.register(Recording::new("not-found", &journal).exception("app::NotFound"));

        let failure = Failure::classified(OrderGone);
        let (outcome, request) = run(handlers, ErrorEvent::exception(failure.clone())).await;

        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(*journal.lock().unwrap(), vec!["not-found"]);
        let state = request.error_state();
        assert!(state.exception().unwrap().ptr_eq(&failure));
        assert_eq!(state.exception_type(), Some(std::any::type_name::<OrderGone>()));
        assert_eq!(state.message(), Some("order gone"));
    }

    #[tokio::test]
    async fn test_failing_handlers_are_skipped() {
        let journal = journal();
        let handlers = HandlerSet::new();
        handlers.register(Recording::new("broken", &journal).status(404).behave(Behavior::Fail));
        handlers.register(Recording::new("exploding", &journal).status(404).behave(Behavior::Panic));
        handlers.register(Recording::new("second", &journal).status(404));
        handlers.register(Recording::new("catch-all", &journal).status(0));

        let (outcome, request) = run(handlers, not_found()).await;

        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(*journal.lock().unwrap(), vec!["broken", "exploding", "second"]);
        assert_eq!(request.error_state().handler_name(), Some("second"));
    }

    #[tokio::test]
    async fn test_failure_falls_through_to_coarser_level() {
        let journal = journal();
        let handlers = HandlerSet::new();
        handlers.register(Recording::new("broken", &journal).status(404).behave(Behavior::Fail));
        handlers.register(Recording::new("catch-all", &journal).status(0));

        let (outcome, _) = run(handlers, not_found()).await;

        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(*journal.lock().unwrap(), vec!["broken", "catch-all"]);
    }

    #[tokio::test]
    async fn test_only_failing_handler_is_unhandled() {
        let journal = journal();
        let handlers = HandlerSet::new();
        handlers.register(Recording::new("broken", &journal).status(404).behave(Behavior::Fail));

        let (outcome, request) = run(handlers, not_found()).await;

        assert_eq!(outcome, Outcome::Unhandled);
        assert!(request.is_error_in_progress());
    }

    #[tokio::test]
    async fn test_second_dispatch_is_short_circuited() {
        let journal = journal();
        let handlers = HandlerSet::new();
        handlers.register(Recording::new("catch-all", &journal).status(0));
        let dispatcher = ErrorDispatcher::new(Arc::new(handlers));

        let request = ErrorRequest::get("/orders/7").unwrap();
        let mut response = BufferedResponse::new();
        let first = dispatcher.dispatch(&not_found(), &request, &mut response).await;
        let mut other = BufferedResponse::new();
        let second = dispatcher
            .dispatch(
                &ErrorEvent::status(StatusCode::INTERNAL_SERVER_ERROR, None),
                &request,
                &mut other,
            )
            .await;

        assert_eq!(first, Outcome::Handled);
        assert_eq!(second, Outcome::Unhandled);
        assert_eq!(journal.lock().unwrap().len(), 1);
        assert_eq!(request.error_state().status(), Some(StatusCode::NOT_FOUND));
    }

    struct Resolver(Result<Option<String>>);

    impl ContentResolver for Resolver {
        fn active_component_name(&self) -> Result<Option<String>> {
            match &self.0 {
                Ok(name) => Ok(name.clone()),
                Err(_) => Err(RecourseError::ContentResolution("unsupported request".into())),
            }
        }
    }

    #[tokio::test]
    async fn test_handler_name_prefers_active_component() {
        let journal = journal();
        let handlers = HandlerSet::new();
        handlers.register(Recording::new("catch-all", &journal).status(0));
        let dispatcher = ErrorDispatcher::new(Arc::new(handlers));

        let request = ErrorRequest::get("/orders/7")
            .unwrap()
            .with_content_resolver(Arc::new(Resolver(Ok(Some("order-view".into())))));
        let mut response = BufferedResponse::new();
        dispatcher.dispatch(&not_found(), &request, &mut response).await;
        assert_eq!(request.error_state().handler_name(), Some("order-view"));

        let request = ErrorRequest::get("/orders/7")
            .unwrap()
            .with_content_resolver(Arc::new(Resolver(Err(RecourseError::ChainConsumed))));
        let mut response = BufferedResponse::new();
        let outcome = dispatcher.dispatch(&not_found(), &request, &mut response).await;
        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(request.error_state().handler_name(), Some("catch-all"));
    }
}
