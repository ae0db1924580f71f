//! The error filter: pipeline entry point of error handling
//!
//! ```text
//! ErrorFilter::process
//!   └─ chain.proceed(request, ErrorHandlerResponse)
//!        ├─ send_error(status)   → ErrorDispatcher (status levels)
//!        └─ Err(failure) / panic → ErrorDispatcher (failure type chain)
//! ```

use crate::config::FilterSettings;
use crate::dispatch::{ErrorDispatcher, Outcome};
use crate::event::{ErrorEvent, Failure};
use crate::handler::HandlerRegistry;
use crate::response::{ErrorHandlerResponse, HttpResponse};
use crate::state::ErrorRequest;
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

mod layer;
mod signal;

pub use layer::{ErrorFilterLayer, ErrorFilterService};
pub use signal::{RaisedError, RedirectTo};

/// The rest of the pipeline behind the error filter
#[async_trait]
pub trait FilterChain: Send {
    async fn proceed(
        &mut self,
        request: &ErrorRequest,
        response: &mut dyn HttpResponse,
    ) -> Result<(), Failure>;
}

#[derive(Clone)]
pub struct ErrorFilter {
    dispatcher: ErrorDispatcher,
    settings: FilterSettings,
}

impl ErrorFilter {
    pub fn new(registry: Arc<dyn HandlerRegistry>) -> Self {
        Self {
            dispatcher: ErrorDispatcher::new(registry),
            settings: FilterSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: FilterSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn dispatcher(&self) -> &ErrorDispatcher {
        &self.dispatcher
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    /// Run `chain` with error interception
    ///
    /// Errors sent by downstream code are dispatched through the intercepted response.
    /// A failure returned by the chain is dispatched here; if no handler takes it, it
    /// is returned as [`Failure::into_propagated`] makes it. A caught panic that no
    /// handler takes is resumed with its original payload.
    pub async fn process(
        &self,
        request: &ErrorRequest,
        response: &mut dyn HttpResponse,
        chain: &mut dyn FilterChain,
    ) -> Result<(), Failure> {
        let result = {
            let mut intercepted = ErrorHandlerResponse::new(request, &mut *response, &self.dispatcher)
                .with_redirect_status(self.settings.redirect_status);
            let downstream = chain.proceed(request, &mut intercepted);
            if self.settings.catch_panics {
                AssertUnwindSafe(downstream).catch_unwind().await
            } else {
                Ok(downstream.await)
            }
        };

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(failure)) => {
                tracing::error!(
                    kind = %failure.kind(),
                    "Error during request processing: {}",
                    failure
                );
                let event = ErrorEvent::exception(failure.clone());
                match self.dispatcher.dispatch(&event, request, response).await {
                    Outcome::Handled => Ok(()),
                    Outcome::Unhandled => Err(failure.into_propagated()),
                }
            }
            Err(payload) => {
                let failure = Failure::from_panic(payload.as_ref());
                tracing::error!("Panic during request processing: {}", failure);
                let event = ErrorEvent::exception(failure);
                match self.dispatcher.dispatch(&event, request, response).await {
                    Outcome::Handled => Ok(()),
                    Outcome::Unhandled => std::panic::resume_unwind(payload),
                }
            }
        }
    }
}
