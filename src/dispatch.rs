//! The exception dispatch wrapper.
//!
//! [`wrap_app_handling_exceptions`] wraps a downstream application with
//! identical external shape but augmented exception semantics: exceptions
//! raised while the request is being driven are classified against the
//! handler tables installed on the connection scope and routed to at most
//! one handler, unless the response has already started, in which case a
//! programmer error is raised instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::app::{App, Receive, Sender};
use crate::exception::{Exception, Result};
use crate::handler::{CloseOwner, HandlerTables};
use crate::scope::{Connection, Scope, ScopeKind};

/// Wrap `app` so that exceptions it raises are routed to the handlers
/// installed on the connection's scope.
///
/// The handler tables are read once, here, at factory time; tables installed
/// afterwards are not consulted for this request. A scope without tables is
/// treated as two empty tables.
pub fn wrap_app_handling_exceptions(app: Arc<dyn App>, conn: Connection) -> ExceptionMiddleware {
    let tables = conn.scope().handler_tables().unwrap_or_default();
    ExceptionMiddleware { app, conn, tables }
}

/// The wrapped application returned by [`wrap_app_handling_exceptions`].
pub struct ExceptionMiddleware {
    app: Arc<dyn App>,
    conn: Connection,
    tables: Arc<HandlerTables>,
}

#[async_trait]
impl App for ExceptionMiddleware {
    async fn call(&self, scope: Arc<Scope>, receive: Receive, send: Sender) -> Result<()> {
        let started = Arc::new(AtomicBool::new(false));
        let sender = intercepting_sender(send.clone(), Arc::clone(&started));

        match self
            .app
            .call(Arc::clone(&scope), receive.clone(), sender.clone())
            .await
        {
            Ok(()) => Ok(()),
            Err(exc) => {
                self.dispatch(exc, &started, scope, receive, send, sender)
                    .await
            }
        }
    }
}

impl ExceptionMiddleware {
    async fn dispatch(
        &self,
        exc: Exception,
        started: &AtomicBool,
        scope: Arc<Scope>,
        receive: Receive,
        send: Sender,
        sender: Sender,
    ) -> Result<()> {
        let Some(handler) = self.tables.lookup(&exc) else {
            tracing::debug!("No handler registered for '{}'; re-raising", exc.category());
            return Err(exc);
        };

        if started.load(Ordering::Acquire) {
            tracing::error!("Handler matched '{}' but the response already started", exc.category());
            return Err(Exception::response_already_started(exc));
        }

        match scope.kind() {
            ScopeKind::Http => {
                tracing::debug!("Dispatching '{}' to an HTTP exception handler", exc.category());
                let writer = handler
                    .invoke(self.conn.clone(), exc)
                    .await?
                    .ok_or_else(|| Exception::internal("exception handler returned no response writer"))?;
                writer.call(scope, receive, sender).await
            }
            ScopeKind::WebSocket => {
                // Close ownership only matters for async handlers; sync
                // handlers always run on the worker pool with (conn, exc).
                if handler.is_async() && handler.close_owner() == CloseOwner::App {
                    tracing::debug!("Close owned by the app; re-invoking the downstream application");
                    return self.app.call(scope, receive, send).await;
                }
                tracing::debug!("Dispatching '{}' to a websocket exception handler", exc.category());
                handler.invoke(self.conn.clone(), exc).await.map(|_writer| ())
            }
        }
    }
}

/// Interpose on the outbound channel: flip the response-started flag when
/// `http.response.start` passes through, forward everything verbatim and in
/// order. This runs on the hot path of every emitted message.
fn intercepting_sender(send: Sender, started: Arc<AtomicBool>) -> Sender {
    Sender::new(move |message| {
        let send = send.clone();
        let started = Arc::clone(&started);
        Box::pin(async move {
            if message.starts_response() {
                started.store(true, Ordering::Release);
            }
            send.send(message).await
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::thread::ThreadId;
    use std::time::Duration;

    use axum::http::StatusCode;

    use crate::app::{ResponseWriter, app_fn};
    use crate::exception::{Category, EXCEPTION, HttpException};
    use crate::handler::ExceptionHandler;
    use crate::message::Message;
    use crate::response::Response;

    static PARSE_ERROR: Category = Category::new("parse_error", Some(&EXCEPTION));

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn collector() -> (Sender, Arc<Mutex<Vec<Message>>>) {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&sink);
        let sender = Sender::new(move |message| {
            let captured = Arc::clone(&captured);
            Box::pin(async move {
                captured.lock().unwrap().push(message);
                Ok(())
            })
        });
        (sender, sink)
    }

    fn closed_receive() -> Receive {
        Receive::new(|| Box::pin(async { Err(Exception::internal("receive channel closed")) }))
    }

    fn wrap(app: Arc<dyn App>, scope: &Arc<Scope>) -> ExceptionMiddleware {
        wrap_app_handling_exceptions(app, Connection::new(Arc::clone(scope)))
    }

    fn writer_for(exc: &Exception) -> Option<ResponseWriter> {
        Some(Box::new(Response::from_exception(exc)))
    }

    #[tokio::test]
    async fn test_happy_path_forwards_messages_without_dispatch() {
        init_tracing();
        let app: Arc<dyn App> = Arc::new(app_fn(|_scope, _receive, send| async move {
            send.send(Message::response_start(200)).await?;
            send.send(Message::final_body(b"ok".to_vec())).await
        }));
        let invoked = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&invoked);
        let tables = HandlerTables::new().on_category(
            &EXCEPTION,
            ExceptionHandler::async_fn(move |_conn, _exc| {
                let count = Arc::clone(&count);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            }),
        );

        let scope = Arc::new(Scope::http("/"));
        scope.install_handlers(Arc::new(tables));
        let wrapped = wrap(app, &scope);
        let (sender, sink) = collector();
        wrapped.call(scope, closed_receive(), sender).await.unwrap();

        let messages = sink.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_response());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_status_handler_writes_the_final_response() {
        init_tracing();
        let app: Arc<dyn App> = Arc::new(app_fn(|_scope, _receive, _send| async {
            Err(HttpException::not_found("no such item").into())
        }));
        let tables = HandlerTables::new().on_status(
            StatusCode::NOT_FOUND,
            ExceptionHandler::async_fn(|_conn, exc| async move { Ok(writer_for(&exc)) }),
        );

        let scope = Arc::new(Scope::http("/items/9"));
        scope.install_handlers(Arc::new(tables));
        let wrapped = wrap(app, &scope);
        let (sender, sink) = collector();
        wrapped.call(scope, closed_receive(), sender).await.unwrap();

        let messages = sink.lock().unwrap();
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            Message::ResponseStart { status, .. } => assert_eq!(*status, 404),
            other => panic!("expected response start, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_category_handler_covers_non_http_exceptions() {
        init_tracing();
        let app: Arc<dyn App> = Arc::new(app_fn(|_scope, _receive, _send| async {
            Err(Exception::new(&PARSE_ERROR, "unexpected token"))
        }));
        let tables = HandlerTables::new().on_category(
            &PARSE_ERROR,
            ExceptionHandler::async_fn(|_conn, exc| async move { Ok(writer_for(&exc)) }),
        );

        let scope = Arc::new(Scope::http("/parse"));
        scope.install_handlers(Arc::new(tables));
        let wrapped = wrap(app, &scope);
        let (sender, sink) = collector();
        wrapped.call(scope, closed_receive(), sender).await.unwrap();

        let messages = sink.lock().unwrap();
        match &messages[0] {
            Message::ResponseStart { status, .. } => assert_eq!(*status, 500),
            other => panic!("expected response start, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_unmatched_exception_is_reraised_unchanged() {
        init_tracing();
        let app: Arc<dyn App> = Arc::new(app_fn(|_scope, _receive, _send| async {
            Err(Exception::new(&PARSE_ERROR, "unexpected token"))
        }));

        let scope = Arc::new(Scope::http("/parse"));
        let wrapped = wrap(app, &scope);
        let (sender, sink) = collector();
        let err = wrapped
            .call(scope, closed_receive(), sender)
            .await
            .unwrap_err();

        assert_eq!(err.category(), &PARSE_ERROR);
        assert_eq!(err.detail(), "unexpected token");
        assert!(sink.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_start_exception_becomes_programmer_error() {
        init_tracing();
        let app: Arc<dyn App> = Arc::new(app_fn(|_scope, _receive, send| async move {
            send.send(Message::response_start(200)).await?;
            Err(HttpException::internal_server_error("mid-stream failure").into())
        }));
        let invoked = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&invoked);
        let tables = HandlerTables::new().on_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            ExceptionHandler::async_fn(move |_conn, exc| {
                let count = Arc::clone(&count);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(writer_for(&exc))
                }
            }),
        );

        let scope = Arc::new(Scope::http("/stream"));
        scope.install_handlers(Arc::new(tables));
        let wrapped = wrap(app, &scope);
        let (sender, sink) = collector();
        let err = wrapped
            .call(scope, closed_receive(), sender)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Caught handled exception, but response already started."
        );
        let cause = err.source().expect("original exception must be chained");
        assert_eq!(cause.to_string(), "mid-stream failure");
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        // Nothing after the start message the app itself emitted.
        assert_eq!(sink.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_websocket_app_owned_close_reinvokes_downstream() {
        init_tracing();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let app: Arc<dyn App> = Arc::new(app_fn(move |_scope, _receive, send| {
            let seen = Arc::clone(&seen);
            async move {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(Exception::new(&PARSE_ERROR, "bad frame"));
                }
                send.send(Message::WebSocketClose {
                    code: 1003,
                    reason: None,
                })
                .await
            }
        }));
        let tables = HandlerTables::new().on_category(
            &PARSE_ERROR,
            ExceptionHandler::async_fn(|_conn, _exc| async { Ok(None) })
                .with_close_owner(CloseOwner::App),
        );

        let scope = Arc::new(Scope::websocket("/feed"));
        scope.install_handlers(Arc::new(tables));
        let wrapped = wrap(app, &scope);
        let (sender, sink) = collector();
        wrapped.call(scope, closed_receive(), sender).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let messages = sink.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0],
            Message::WebSocketClose {
                code: 1003,
                reason: None,
            }
        );
    }

    #[tokio::test]
    async fn test_websocket_handler_owned_close_awaits_handler() {
        init_tracing();
        let app_calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&app_calls);
        let app: Arc<dyn App> = Arc::new(app_fn(move |_scope, _receive, _send| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Err(Exception::new(&PARSE_ERROR, "bad frame"))
            }
        }));
        let handled = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&handled);
        let tables = HandlerTables::new().on_category(
            &PARSE_ERROR,
            ExceptionHandler::async_fn(move |_conn, _exc| {
                let count = Arc::clone(&count);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            }),
        );

        let scope = Arc::new(Scope::websocket("/feed"));
        scope.install_handlers(Arc::new(tables));
        let wrapped = wrap(app, &scope);
        let (sender, _sink) = collector();
        wrapped.call(scope, closed_receive(), sender).await.unwrap();

        assert_eq!(app_calls.load(Ordering::SeqCst), 1);
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sync_handler_runs_on_a_worker_thread() {
        init_tracing();
        let app: Arc<dyn App> = Arc::new(app_fn(|_scope, _receive, _send| async {
            Err(HttpException::bad_request("bad payload").into())
        }));
        let handler_thread: Arc<Mutex<Option<ThreadId>>> = Arc::new(Mutex::new(None));
        let recorded = Arc::clone(&handler_thread);
        let tables = HandlerTables::new().on_status(
            StatusCode::BAD_REQUEST,
            ExceptionHandler::sync(move |_conn, exc| {
                *recorded.lock().unwrap() = Some(std::thread::current().id());
                Ok(writer_for(&exc))
            }),
        );

        let scope = Arc::new(Scope::http("/submit"));
        scope.install_handlers(Arc::new(tables));
        let wrapped = wrap(app, &scope);
        let (sender, sink) = collector();
        let caller = std::thread::current().id();
        wrapped.call(scope, closed_receive(), sender).await.unwrap();

        let worker = handler_thread.lock().unwrap().expect("handler must run");
        assert_ne!(caller, worker);
        assert_eq!(sink.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_does_not_reach_the_dispatch_branch() {
        init_tracing();
        let app: Arc<dyn App> = Arc::new(app_fn(|_scope, _receive, _send| async {
            std::future::pending::<Result<()>>().await
        }));
        let invoked = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&invoked);
        let tables = HandlerTables::new().on_category(
            &EXCEPTION,
            ExceptionHandler::async_fn(move |_conn, _exc| {
                let count = Arc::clone(&count);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            }),
        );

        let scope = Arc::new(Scope::http("/hang"));
        scope.install_handlers(Arc::new(tables));
        let wrapped = wrap(app, &scope);
        let (sender, sink) = collector();

        let outcome =
            tokio::time::timeout(Duration::from_millis(20), wrapped.call(scope, closed_receive(), sender))
                .await;
        assert!(outcome.is_err());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert!(sink.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tables_are_read_at_factory_time() {
        init_tracing();
        let app: Arc<dyn App> = Arc::new(app_fn(|_scope, _receive, _send| async {
            Err(HttpException::not_found("missing").into())
        }));

        let scope = Arc::new(Scope::http("/late"));
        let wrapped = wrap(app, &scope);

        // Installed after wrapping: must not be consulted for this request.
        scope.install_handlers(Arc::new(HandlerTables::new().on_status(
            StatusCode::NOT_FOUND,
            ExceptionHandler::async_fn(|_conn, exc| async move { Ok(writer_for(&exc)) }),
        )));

        let (sender, sink) = collector();
        let err = wrapped
            .call(scope, closed_receive(), sender)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::NOT_FOUND));
        assert!(sink.lock().unwrap().is_empty());
    }
}
