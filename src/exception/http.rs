use axum::http::StatusCode;
use thiserror::Error;

use super::{Exception, HTTP_EXCEPTION};

/// An exception that maps directly to an HTTP response status.
///
/// Converting into [`Exception`] classifies it under the built-in
/// `http_exception` category with the status code attached, which makes it
/// eligible for status-table handler lookup.
///
/// # Example
/// ```
/// use ashgate::exception::{Exception, HttpException};
/// use axum::http::StatusCode;
///
/// let exc: Exception = HttpException::not_found("no such user").into();
/// assert_eq!(exc.status_code(), Some(StatusCode::NOT_FOUND));
/// ```
#[derive(Debug, Error)]
#[error("{status}: {detail}")]
pub struct HttpException {
    pub status: StatusCode,
    pub detail: String,
}

impl HttpException {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// Build from a status code alone, using its canonical reason phrase.
    pub fn from_status(status: StatusCode) -> Self {
        let detail = status.canonical_reason().unwrap_or("Unknown Error");
        Self::new(status, detail)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn internal_server_error(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

impl From<HttpException> for Exception {
    fn from(exc: HttpException) -> Self {
        Exception::new(&HTTP_EXCEPTION, exc.detail).with_status(exc.status)
    }
}
