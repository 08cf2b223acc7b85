//! # Ashgate
//!
//! ASGI-style exception dispatch middleware for async Rust web stacks.
//!
//! Ashgate sits between a server transport and a downstream application and
//! routes exceptions raised during request handling to user-registered
//! handlers, while preserving the invariants of the streaming response
//! protocol: once `http.response.start` has been forwarded, the response can
//! no longer be replaced and a late exception becomes a programmer error.
//!
//! ## Features
//!
//! - **Transport-neutral contract**: applications are `(scope, receive, send)`
//!   callables exchanging tagged protocol messages
//! - **Two handler tables**: register by HTTP status code or by exception
//!   category; status lookup wins, category lookup walks the classification
//!   ancestry most-specific-first
//! - **Sync and async handlers**: async handlers are awaited in place,
//!   synchronous handlers are offloaded to a shared worker pool
//! - **Streaming-safe**: a per-request response-started flag guards against
//!   garbled responses after headers are in flight
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ashgate::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> ashgate::Result<()> {
//!     // Downstream application: raises a 404 for every request.
//!     let app: Arc<dyn App> = Arc::new(app_fn(|_scope, _receive, _send| async {
//!         Err(HttpException::not_found("no such page").into())
//!     }));
//!
//!     // Route 404s to a handler that writes the JSON error envelope.
//!     let tables = HandlerTables::new().on_status(
//!         StatusCode::NOT_FOUND,
//!         ExceptionHandler::async_fn(|_conn, exc| async move {
//!             let writer: ResponseWriter = Box::new(Response::from_exception(&exc));
//!             Ok(Some(writer))
//!         }),
//!     );
//!
//!     let scope = Arc::new(Scope::http("/missing"));
//!     scope.install_handlers(Arc::new(tables));
//!
//!     let conn = Connection::new(Arc::clone(&scope));
//!     let wrapped = wrap_app_handling_exceptions(app, conn);
//!
//!     // `receive` and `send` come from your transport.
//!     let receive = Receive::new(|| {
//!         Box::pin(async { Err(Exception::internal("receive channel closed")) })
//!     });
//!     let send = Sender::new(|message| {
//!         Box::pin(async move {
//!             println!("-> {}", message.kind());
//!             Ok(())
//!         })
//!     });
//!
//!     wrapped.call(scope, receive, send).await
//! }
//! ```

pub mod app;
pub mod dispatch;
pub mod exception;
pub mod handler;
pub mod message;
pub mod response;
pub mod scope;
pub mod worker;

// Re-export core types
pub use app::{App, BoxFuture, FnApp, Receive, ResponseWriter, Sender, app_fn};
pub use dispatch::{ExceptionMiddleware, wrap_app_handling_exceptions};
pub use exception::{Category, EXCEPTION, Exception, HTTP_EXCEPTION, HttpException, Result};
pub use handler::{CloseOwner, ExceptionHandler, HandlerFn, HandlerOutcome, HandlerTables};
pub use message::Message;
pub use response::Response;
pub use scope::{Connection, EXCEPTION_HANDLERS_SCOPE_KEY, Scope, ScopeKind};
pub use worker::WorkerPool;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use ashgate::prelude::*;
/// ```
pub mod prelude {
    pub use crate::app::{App, BoxFuture, FnApp, Receive, ResponseWriter, Sender, app_fn};
    pub use crate::dispatch::{ExceptionMiddleware, wrap_app_handling_exceptions};
    pub use crate::exception::{
        Category, EXCEPTION, Exception, HTTP_EXCEPTION, HttpException, Result,
    };
    pub use crate::handler::{CloseOwner, ExceptionHandler, HandlerOutcome, HandlerTables};
    pub use crate::message::Message;
    pub use crate::response::Response;
    pub use crate::scope::{Connection, Scope, ScopeKind};
    pub use crate::worker::WorkerPool;
    pub use async_trait::async_trait;
    pub use axum::http::StatusCode;
    pub use std::sync::Arc;
}
