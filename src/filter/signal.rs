use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// An error raised by a handler behind [`ErrorFilterLayer`](super::ErrorFilterLayer)
///
/// The layer routes it to the error handlers like a `send_error` call.
///
/// # Example
/// ```rust,ignore
/// async fn show_order(Path(id): Path<u64>) -> Result<Json<Order>, RaisedError> {
///     let order = find(id).ok_or_else(|| RaisedError::new(StatusCode::NOT_FOUND).with_message("no such order"))?;
///     Ok(Json(order))
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaisedError {
    status: StatusCode,
    message: Option<String>,
}

impl RaisedError {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl IntoResponse for RaisedError {
    fn into_response(self) -> Response {
        let mut response = self.status.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// A redirect issued by a handler behind [`ErrorFilterLayer`](super::ErrorFilterLayer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTo {
    location: String,
}

impl RedirectTo {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl IntoResponse for RedirectTo {
    fn into_response(self) -> Response {
        let mut response = StatusCode::FOUND.into_response();
        response.extensions_mut().insert(self);
        response
    }
}
