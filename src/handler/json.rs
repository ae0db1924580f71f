use crate::event::ROOT_FAILURE_TYPE;
use crate::handler::ErrorHandler;
use crate::response::HttpResponse;
use crate::state::ErrorRequest;
use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use serde::Serialize;

/// Renders the request's error attributes as a JSON document
///
/// # Example
/// ```rust,ignore
/// let handlers = HandlerSet::new();
/// handlers.register(JsonErrorHandler::catch_all());
/// handlers.register(JsonErrorHandler::new("api-not-found").for_status(404));
/// ```
#[derive(Debug, Clone)]
pub struct JsonErrorHandler {
    name: String,
    statuses: Vec<u16>,
    type_names: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    handler: Option<&'a str>,
    timestamp: String,
}

impl JsonErrorHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            statuses: Vec::new(),
            type_names: Vec::new(),
        }
    }

    /// Handles every status and every failure
    pub fn catch_all() -> Self {
        Self::new("json-error-handler")
            .for_status(0)
            .for_type_name(ROOT_FAILURE_TYPE)
    }

    pub fn for_status(mut self, status: u16) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn for_exception<E: 'static>(self) -> Self {
        self.for_type_name(std::any::type_name::<E>())
    }

    pub fn for_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_names.push(type_name.into());
        self
    }
}

#[async_trait]
impl ErrorHandler for JsonErrorHandler {
    fn can_handle_status(&self, status: u16) -> bool {
        self.statuses.contains(&status)
    }

    fn can_handle_exception(&self, type_name: &str) -> bool {
        self.type_names.iter().any(|name| name == type_name)
    }

    fn identify(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        request: &ErrorRequest,
        response: &mut dyn HttpResponse,
    ) -> anyhow::Result<()> {
        let state = request.error_state();
        let status = state
            .status()
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = serde_json::to_vec(&ErrorBody {
            status_code: status.as_u16(),
            message: state.message(),
            request_uri: state.request_uri(),
            exception_type: state.exception_type(),
            handler: state.handler_name(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        })?;

        response.set_status(status);
        response.set_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response.write(&body)?;
        response.flush()?;
        Ok(())
    }
}
