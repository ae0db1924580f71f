use crate::dispatch::{ErrorDispatcher, Outcome};
use crate::error::{RecourseError, Result};
use crate::event::ErrorEvent;
use crate::response::HttpResponse;
use crate::state::ErrorRequest;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

/// Response decorator routing error sends into the [`ErrorDispatcher`]
///
/// Handlers are invoked against the wrapped response, never against the decorator,
/// so an error raised by a handler goes straight to the transport.
pub struct ErrorHandlerResponse<'a> {
    request: &'a ErrorRequest,
    inner: &'a mut dyn HttpResponse,
    dispatcher: &'a ErrorDispatcher,
    redirect_status: StatusCode,
}

impl<'a> ErrorHandlerResponse<'a> {
    pub fn new(
        request: &'a ErrorRequest,
        inner: &'a mut dyn HttpResponse,
        dispatcher: &'a ErrorDispatcher,
    ) -> Self {
        Self {
            request,
            inner,
            dispatcher,
            redirect_status: StatusCode::FOUND,
        }
    }

    pub fn with_redirect_status(mut self, status: StatusCode) -> Self {
        self.redirect_status = status;
        self
    }

    fn check_committed(&self) -> Result<()> {
        if self.inner.is_committed() {
            return Err(RecourseError::ResponseCommitted);
        }
        Ok(())
    }
}

#[async_trait]
impl<'a> HttpResponse for ErrorHandlerResponse<'a> {
    fn status(&self) -> StatusCode {
        self.inner.status()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.inner.set_status(status);
    }

    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.inner.set_header(name, value);
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.inner.append_header(name, value);
    }

    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.inner.write(chunk)
    }

    fn set_body(&mut self, body: Body) -> Result<()> {
        self.inner.set_body(body)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn is_committed(&self) -> bool {
        self.inner.is_committed()
    }

    async fn send_error(&mut self, status: StatusCode, message: Option<String>) -> Result<()> {
        self.check_committed()?;

        let event = ErrorEvent::status(status, message.clone());
        match self
            .dispatcher
            .dispatch(&event, self.request, &mut *self.inner)
            .await
        {
            Outcome::Handled => Ok(()),
            Outcome::Unhandled => self.inner.send_error(status, message).await,
        }
    }

    fn send_redirect(&mut self, location: &str) -> Result<()> {
        self.check_committed()?;

        let location = resolve_location(self.request.uri().path(), location);
        let value = HeaderValue::try_from(location)
            .map_err(|e| RecourseError::invalid_header(LOCATION.as_str(), e))?;
        self.inner.set_status(self.redirect_status);
        self.inner.set_header(LOCATION, value);
        Ok(())
    }
}

/// Resolve a relative redirect target against the request path
///
/// Absolute paths and locations carrying a scheme are kept as is. Query and fragment
/// targets stay on the current path; anything else replaces its last segment.
fn resolve_location(request_path: &str, location: &str) -> String {
    if location.starts_with('/') || has_scheme(location) {
        return location.to_string();
    }
    if location.starts_with('?') || location.starts_with('#') {
        let path = if request_path.is_empty() { "/" } else { request_path };
        return format!("{path}{location}");
    }
    let base = match request_path.rfind('/') {
        Some(idx) => &request_path[..=idx],
        None => "/",
    };
    format!("{base}{location}")
}

/// `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) ":"`, RFC 3986 section 3.1
fn has_scheme(location: &str) -> bool {
    let Some((scheme, _)) = location.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
