//! Per-connection scope and the connection view handed to handlers.

use std::sync::{Arc, RwLock};

use strum_macros::Display;

use crate::handler::HandlerTables;

/// Name under which the handler tables travel when the scope is projected
/// into an untyped context bag (debug output, interop with map-shaped
/// scopes). Within this crate the tables live in a typed slot instead.
pub const EXCEPTION_HANDLERS_SCOPE_KEY: &str = "ashgate.exception_handlers";

/// The `type` discriminant of a connection scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ScopeKind {
    #[strum(serialize = "http")]
    Http,
    #[strum(serialize = "websocket")]
    WebSocket,
}

/// Per-connection context shared by the transport, the wrapper and the
/// downstream application.
///
/// The outer framework installs the exception handler tables during request
/// dispatch with [`Scope::install_handlers`]; the wrapper factory reads them
/// exactly once. The slot is read-only for the rest of the request.
#[derive(Debug)]
pub struct Scope {
    kind: ScopeKind,
    path: String,
    handlers: RwLock<Option<Arc<HandlerTables>>>,
}

impl Scope {
    pub fn new(kind: ScopeKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            handlers: RwLock::new(None),
        }
    }

    pub fn http(path: impl Into<String>) -> Self {
        Self::new(ScopeKind::Http, path)
    }

    pub fn websocket(path: impl Into<String>) -> Self {
        Self::new(ScopeKind::WebSocket, path)
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Install the handler tables for this connection. Called by the outer
    /// framework once routing has decided which tables apply.
    pub fn install_handlers(&self, tables: Arc<HandlerTables>) {
        let mut slot = self
            .handlers
            .write()
            .expect("handler table slot poisoned");
        *slot = Some(tables);
    }

    /// The installed handler tables, if any.
    pub fn handler_tables(&self) -> Option<Arc<HandlerTables>> {
        self.handlers
            .read()
            .expect("handler table slot poisoned")
            .clone()
    }
}

/// A cheap clonable view over the connection scope, passed to exception
/// handlers as their first argument.
#[derive(Debug, Clone)]
pub struct Connection {
    scope: Arc<Scope>,
}

impl Connection {
    pub fn new(scope: Arc<Scope>) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    pub fn kind(&self) -> ScopeKind {
        self.scope.kind()
    }

    pub fn path(&self) -> &str {
        self.scope.path()
    }
}
