//! Concrete response writers.
//!
//! A [`Response`] is a fully materialized HTTP response that implements
//! [`App`]: calling it emits `http.response.start` followed by a single
//! final `http.response.body`. Exception handlers on HTTP scopes return one
//! of these (boxed) as their response writer.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::json;

use crate::app::{App, Receive, Sender};
use crate::exception::{Exception, Result};
use crate::message::Message;
use crate::scope::Scope;

/// An in-memory HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body,
        }
    }

    pub fn plain_text(status: StatusCode, text: impl Into<String>) -> Self {
        Self::new(status, "text/plain; charset=utf-8", text.into().into_bytes())
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|err| Exception::internal("failed to serialize response body").with_source(err))?;
        Ok(Self::new(status, "application/json", body))
    }

    /// The standard JSON error envelope for an exception: status code,
    /// detail and an RFC 3339 timestamp. Falls back to 500 when the
    /// exception carries no status.
    pub fn from_exception(exc: &Exception) -> Self {
        let status = exc.status_code().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let payload = json!({
            "status_code": status.as_u16(),
            "detail": exc.detail(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        Self::new(status, "application/json", payload.to_string().into_bytes())
    }

    /// Append a response header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

#[async_trait]
impl App for Response {
    async fn call(&self, _scope: Arc<Scope>, _receive: Receive, send: Sender) -> Result<()> {
        let mut headers = self.headers.clone();
        headers.push(("content-length".to_string(), self.body.len().to_string()));
        send.send(Message::ResponseStart {
            status: self.status.as_u16(),
            headers,
        })
        .await?;
        send.send(Message::final_body(self.body.clone())).await
    }
}
