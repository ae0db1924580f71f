//! Response capability and the in-memory transport response

use crate::error::{RecourseError, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

mod intercept;

pub use intercept::ErrorHandlerResponse;

/// The response operations available to downstream code and error handlers
///
/// Once a response is committed its status and headers can no longer change, and
/// `send_error` / `send_redirect` fail with [`RecourseError::ResponseCommitted`].
#[async_trait]
pub trait HttpResponse: Send {
    fn status(&self) -> StatusCode;

    fn set_status(&mut self, status: StatusCode);

    fn headers(&self) -> &HeaderMap;

    /// Replace all values of a header
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    fn append_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Append bytes to the buffered body
    fn write(&mut self, chunk: &[u8]) -> Result<()>;

    /// Hand over a complete body; commits the response
    fn set_body(&mut self, body: Body) -> Result<()>;

    /// Commit the response
    fn flush(&mut self) -> Result<()>;

    fn is_committed(&self) -> bool;

    /// Send an error page for `status` and commit
    async fn send_error(&mut self, status: StatusCode, message: Option<String>) -> Result<()>;

    /// Send a temporary redirect to `location` and commit
    fn send_redirect(&mut self, location: &str) -> Result<()>;
}

#[derive(Debug)]
enum ResponseBody {
    Buffered(Vec<u8>),
    Streaming(Body),
}

/// A response assembled in memory and converted into an axum [`Response`] at the end
#[derive(Debug)]
pub struct BufferedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
    committed: bool,
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: ResponseBody::Buffered(Vec::new()),
            committed: false,
        }
    }

    /// The buffered body, `None` once a streaming body was set
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            ResponseBody::Buffered(bytes) => Some(bytes),
            ResponseBody::Streaming(_) => None,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.committed {
            return Err(RecourseError::ResponseCommitted);
        }
        Ok(())
    }

    fn header_change_allowed(&self, name: &HeaderName) -> bool {
        if self.committed {
            tracing::warn!(header = %name, "Ignoring header change on committed response");
            return false;
        }
        true
    }
}

#[async_trait]
impl HttpResponse for BufferedResponse {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn set_status(&mut self, status: StatusCode) {
        if self.committed {
            tracing::warn!(%status, "Ignoring status change on committed response");
            return;
        }
        self.status = status;
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.header_change_allowed(&name) {
            self.headers.insert(name, value);
        }
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.header_change_allowed(&name) {
            self.headers.append(name, value);
        }
    }

    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        match &mut self.body {
            ResponseBody::Buffered(bytes) => {
                bytes.extend_from_slice(chunk);
                Ok(())
            }
            ResponseBody::Streaming(_) => Err(RecourseError::BodyStreaming),
        }
    }

    fn set_body(&mut self, body: Body) -> Result<()> {
        self.ensure_open()?;
        self.body = ResponseBody::Streaming(body);
        self.committed = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.committed = true;
        Ok(())
    }

    fn is_committed(&self) -> bool {
        self.committed
    }

    async fn send_error(&mut self, status: StatusCode, message: Option<String>) -> Result<()> {
        self.ensure_open()?;

        let mut page = format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Error")
        );
        if let Some(message) = message {
            page.push_str("\n\n");
            page.push_str(&message);
        }

        self.status = status;
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.body = ResponseBody::Buffered(page.into_bytes());
        self.committed = true;
        Ok(())
    }

    fn send_redirect(&mut self, location: &str) -> Result<()> {
        self.ensure_open()?;
        let value = HeaderValue::try_from(location)
            .map_err(|e| RecourseError::invalid_header(LOCATION.as_str(), e))?;
        self.status = StatusCode::FOUND;
        self.headers.insert(LOCATION, value);
        self.committed = true;
        Ok(())
    }
}

impl IntoResponse for BufferedResponse {
    fn into_response(self) -> Response {
        let body = match self.body {
            ResponseBody::Buffered(bytes) => Body::from(bytes),
            ResponseBody::Streaming(body) => body,
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
