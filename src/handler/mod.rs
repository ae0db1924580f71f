//! Error handlers and the registry they are drawn from

use crate::response::HttpResponse;
use crate::state::ErrorRequest;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod json;

/// A component able to render an error
///
/// A handler declares which status levels and failure type names it accepts. The
/// request's error state (see [`ErrorRequest::error_state`]) carries the details of
/// the error being handled.
///
/// # Example
/// ```rust,ignore
/// struct NotFoundPage;
///
/// #[async_trait]
/// impl ErrorHandler for NotFoundPage {
///     fn can_handle_status(&self, status: u16) -> bool {
///         status == 404
///     }
///
///     fn identify(&self) -> &str {
///         "not-found-page"
///     }
///
///     async fn handle(&self, _request: &ErrorRequest, response: &mut dyn HttpResponse) -> anyhow::Result<()> {
///         response.set_status(StatusCode::NOT_FOUND);
///         response.write(b"nothing here")?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ErrorHandler: Send + Sync + 'static {
    /// Whether this handler accepts the given status level (0 is the catch-all level)
    fn can_handle_status(&self, _status: u16) -> bool {
        false
    }

    /// Whether this handler accepts the given failure type name
    fn can_handle_exception(&self, _type_name: &str) -> bool {
        false
    }

    /// Stable display name
    fn identify(&self) -> &str;

    async fn handle(
        &self,
        request: &ErrorRequest,
        response: &mut dyn HttpResponse,
    ) -> anyhow::Result<()>;
}

/// Source of the currently live error handlers
pub trait HandlerRegistry: Send + Sync {
    /// A snapshot of the live handlers, in the registry's current order
    fn live_handlers(&self) -> Vec<Arc<dyn ErrorHandler>>;
}

/// Identifies a registration in a [`HandlerSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Concurrent set of error handlers
///
/// Handlers may be added and removed while requests are dispatched; snapshots are
/// yielded in registration order.
#[derive(Default)]
pub struct HandlerSet {
    handlers: DashMap<HandlerId, Arc<dyn ErrorHandler>>,
    next_id: AtomicU64,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: ErrorHandler>(&self, handler: H) -> HandlerId {
        self.register_arc(Arc::new(handler))
    }

    pub fn register_arc(&self, handler: Arc<dyn ErrorHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!("Error handler bound: {}", handler.identify());
        self.handlers.insert(id, handler);
        id
    }

    pub fn unregister(&self, id: HandlerId) -> Option<Arc<dyn ErrorHandler>> {
        let (_, handler) = self.handlers.remove(&id)?;
        tracing::debug!("Error handler unbound: {}", handler.identify());
        Some(handler)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl HandlerRegistry for HandlerSet {
    fn live_handlers(&self) -> Vec<Arc<dyn ErrorHandler>> {
        let mut entries: Vec<_> = self
            .handlers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, handler)| handler).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl ErrorHandler for Named {
        fn identify(&self) -> &str {
            self.0
        }

        async fn handle(
            &self,
            _request: &ErrorRequest,
            _response: &mut dyn HttpResponse,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn names(set: &HandlerSet) -> Vec<String> {
        set.live_handlers()
            .iter()
            .map(|h| h.identify().to_string())
            .collect()
    }

    #[test]
    fn test_snapshot_in_registration_order() {
        let set = HandlerSet::new();
        for name in ["a", "b", "c", "d"] {
            set.register(Named(name));
        }
        assert_eq!(names(&set), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_unregister() {
        let set = HandlerSet::new();
        set.register(Named("a"));
        let b = set.register(Named("b"));
        set.register(Named("c"));

        let removed = set.unregister(b).unwrap();
        assert_eq!(removed.identify(), "b");
        assert!(set.unregister(b).is_none());
        assert_eq!(names(&set), vec!["a", "c"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_snapshot_is_detached_from_later_changes() {
        let set = HandlerSet::new();
        let a = set.register(Named("a"));
        let snapshot = set.live_handlers();
        set.unregister(a);
        set.register(Named("b"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].identify(), "a");
        assert_eq!(names(&set), vec!["b"]);
    }
}
