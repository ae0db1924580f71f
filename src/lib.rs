//! # Recourse
//!
//! Error handler dispatch for axum/tower HTTP pipelines.
//!
//! Recourse sits in front of downstream request handling and routes every failure to
//! the most specific registered error handler:
//!
//! - **Status errors** raised through the response (`send_error`) are matched against
//!   the status itself, then its decimal truncations, then the catch-all level `0`
//!   (404 → 400 → 0).
//! - **Failures** returned by downstream code (or panics) are matched along their type
//!   chain, from the concrete type to [`ROOT_FAILURE_TYPE`](event::ROOT_FAILURE_TYPE).
//!
//! Error handling happens at most once per request: a handler that fails, or an error
//! raised while handling another one, never starts a second round. Responses that are
//! already committed reject further error sends.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use recourse::prelude::*;
//!
//! struct NotFoundPage;
//!
//! #[error_handler(name = "not-found-page", status = [404])]
//! #[async_trait]
//! impl ErrorHandler for NotFoundPage {
//!     async fn handle(&self, request: &ErrorRequest, response: &mut dyn HttpResponse) -> anyhow::Result<()> {
//!         let state = request.error_state();
//!         response.set_status(StatusCode::NOT_FOUND);
//!         response.write(format!("nothing at {}", state.request_uri().unwrap_or("/")).as_bytes())?;
//!         response.flush()?;
//!         Ok(())
//!     }
//! }
//!
//! let handlers = Arc::new(HandlerSet::new());
//! handlers.register(NotFoundPage);
//! handlers.register(JsonErrorHandler::catch_all());
//!
//! let filter = ErrorFilter::new(handlers).with_settings(FilterSettings::from_env()?);
//! let service = ErrorFilterLayer::new(filter).layer(inner_service);
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod filter;
pub mod handler;
pub mod response;
pub mod state;

// Re-export core types
pub use dispatch::{ErrorDispatcher, Outcome};
pub use error::{RecourseError, Result};
pub use event::{Classify, ErrorEvent, Failure, PropagationKind};
pub use filter::{ErrorFilter, ErrorFilterLayer, FilterChain, RaisedError, RedirectTo};
pub use handler::{ErrorHandler, HandlerRegistry, HandlerSet};
pub use response::{BufferedResponse, ErrorHandlerResponse, HttpResponse};
pub use state::{ErrorRequest, RequestErrorState};

// Re-export macros
pub use recourse_macro::error_handler;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use recourse::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ConfigService, FilterSettings};
    pub use crate::dispatch::{ErrorDispatcher, Outcome};
    pub use crate::error::{RecourseError, Result};
    pub use crate::event::{
        Classify, ErrorEvent, Failure, PropagationKind, PANIC_FAILURE_TYPE, ROOT_FAILURE_TYPE,
    };
    pub use crate::filter::{
        ErrorFilter, ErrorFilterLayer, ErrorFilterService, FilterChain, RaisedError, RedirectTo,
    };
    pub use crate::handler::json::JsonErrorHandler;
    pub use crate::handler::{ErrorHandler, HandlerRegistry, HandlerSet};
    pub use crate::response::{BufferedResponse, ErrorHandlerResponse, HttpResponse};
    pub use crate::state::{ContentResolver, ErrorRequest, RequestErrorState};
    pub use crate::error_handler;
    pub use async_trait::async_trait;
    pub use axum::http::StatusCode;
    pub use std::sync::Arc;
}
