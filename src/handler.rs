//! Exception handler registration and lookup.
//!
//! Handlers come in two flavours, synchronous and asynchronous, registered
//! either against a [`Category`] or against an HTTP status code. Lookup
//! follows a strict order: the status table is consulted first (only for
//! exceptions carrying a status code), then the category table is walked
//! along the exception's ancestry, most specific first.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::http::StatusCode;
use strum_macros::Display;

use crate::app::{BoxFuture, ResponseWriter};
use crate::exception::{Category, Exception, Result};
use crate::scope::Connection;
use crate::worker::WorkerPool;

/// What a handler produces: `Some(writer)` for HTTP handlers, `None` for
/// websocket handlers (whose return value is ignored).
pub type HandlerOutcome = Result<Option<ResponseWriter>>;

type SyncHandlerFn = dyn Fn(Connection, Exception) -> HandlerOutcome + Send + Sync;
type AsyncHandlerFn =
    dyn Fn(Connection, Exception) -> BoxFuture<'static, HandlerOutcome> + Send + Sync;

/// The tagged handler variant: synchronous handlers are dispatched to the
/// shared worker pool, asynchronous handlers are awaited in place.
#[derive(Clone)]
pub enum HandlerFn {
    Sync(Arc<SyncHandlerFn>),
    Async(Arc<AsyncHandlerFn>),
}

/// Who closes the websocket after an exception: the handler itself, or the
/// downstream application re-invoked by the wrapper. Only consulted for
/// asynchronous handlers on websocket scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CloseOwner {
    #[strum(serialize = "handler")]
    Handler,
    #[strum(serialize = "app")]
    App,
}

/// A registered exception handler.
///
/// # Example
/// ```
/// use ashgate::handler::ExceptionHandler;
/// use ashgate::response::Response;
/// use ashgate::app::ResponseWriter;
///
/// let handler = ExceptionHandler::async_fn(|_conn, exc| async move {
///     let writer: ResponseWriter = Box::new(Response::from_exception(&exc));
///     Ok(Some(writer))
/// });
/// ```
#[derive(Clone)]
pub struct ExceptionHandler {
    f: HandlerFn,
    close_owner: CloseOwner,
}

impl ExceptionHandler {
    /// Register a synchronous handler. It will run on the shared worker
    /// pool, never on the async scheduler.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Connection, Exception) -> HandlerOutcome + Send + Sync + 'static,
    {
        Self {
            f: HandlerFn::Sync(Arc::new(f)),
            close_owner: CloseOwner::Handler,
        }
    }

    /// Register an asynchronous handler, awaited on the current task.
    pub fn async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Connection, Exception) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerOutcome> + Send + 'static,
    {
        Self {
            f: HandlerFn::Async(Arc::new(move |conn, exc| Box::pin(f(conn, exc)))),
            close_owner: CloseOwner::Handler,
        }
    }

    /// Set who owns closing the websocket when this handler fires.
    pub fn with_close_owner(mut self, owner: CloseOwner) -> Self {
        self.close_owner = owner;
        self
    }

    pub fn is_async(&self) -> bool {
        matches!(self.f, HandlerFn::Async(_))
    }

    pub fn close_owner(&self) -> CloseOwner {
        self.close_owner
    }

    /// Invoke the handler: async handlers in place, sync handlers via the
    /// shared worker pool.
    pub async fn invoke(&self, conn: Connection, exc: Exception) -> HandlerOutcome {
        match &self.f {
            HandlerFn::Async(f) => f(conn, exc).await,
            HandlerFn::Sync(f) => {
                let f = Arc::clone(f);
                WorkerPool::shared().execute(move || f(conn, exc)).await
            }
        }
    }
}

impl fmt::Debug for ExceptionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_async() { "async" } else { "sync" };
        f.debug_struct("ExceptionHandler")
            .field("kind", &kind)
            .field("close_owner", &self.close_owner)
            .finish()
    }
}

/// The pair of handler tables installed on a connection scope.
#[derive(Default)]
pub struct HandlerTables {
    exception_handlers: HashMap<&'static str, ExceptionHandler>,
    status_handlers: HashMap<u16, ExceptionHandler>,
}

impl HandlerTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an exception category and everything
    /// classified below it.
    pub fn on_category(mut self, category: &'static Category, handler: ExceptionHandler) -> Self {
        self.exception_handlers.insert(category.name(), handler);
        self
    }

    /// Register a handler for a specific HTTP status code. Status handlers
    /// take precedence over category handlers for HTTP exceptions.
    pub fn on_status(mut self, status: StatusCode, handler: ExceptionHandler) -> Self {
        self.status_handlers.insert(status.as_u16(), handler);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.exception_handlers.is_empty() && self.status_handlers.is_empty()
    }

    /// Select the handler for a raised exception, or `None` if nothing
    /// matches and the exception must be re-raised.
    pub fn lookup(&self, exc: &Exception) -> Option<ExceptionHandler> {
        if let Some(status) = exc.status_code() {
            if let Some(handler) = self.status_handlers.get(&status.as_u16()) {
                return Some(handler.clone());
            }
        }
        exc.category()
            .ancestry()
            .find_map(|category| self.exception_handlers.get(category.name()).cloned())
    }
}

impl fmt::Debug for HandlerTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTables")
            .field("exception_handlers", &self.exception_handlers.len())
            .field("status_handlers", &self.status_handlers.len())
            .finish()
    }
}
