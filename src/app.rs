//! The transport contract: applications and message channels.
//!
//! An [`App`] is any callable accepting `(scope, receive, send)` and driving
//! the connection to completion by emitting [`Message`]s through `send`. The
//! channels are clonable wrappers around boxed async closures so that a
//! wrapper can interpose on `send` without the downstream noticing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::exception::Result;
use crate::message::Message;
use crate::scope::Scope;

/// Boxed future, the currency of the channel closures.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An application in the `(scope, receive, send)` shape.
///
/// Raising an exception means returning `Err`; the dispatch wrapper decides
/// whether a registered handler recovers it.
#[async_trait]
pub trait App: Send + Sync + 'static {
    async fn call(&self, scope: Arc<Scope>, receive: Receive, send: Sender) -> Result<()>;
}

/// The application-shaped value an HTTP exception handler returns; it owns
/// emitting the complete response message sequence.
pub type ResponseWriter = Box<dyn App>;

type SendFn = dyn Fn(Message) -> BoxFuture<'static, Result<()>> + Send + Sync;
type RecvFn = dyn Fn() -> BoxFuture<'static, Result<Message>> + Send + Sync;

/// The outbound message channel.
#[derive(Clone)]
pub struct Sender {
    send: Arc<SendFn>,
}

impl Sender {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Message) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        Self { send: Arc::new(f) }
    }

    pub async fn send(&self, message: Message) -> Result<()> {
        (self.send)(message).await
    }
}

/// The inbound message channel.
#[derive(Clone)]
pub struct Receive {
    recv: Arc<RecvFn>,
}

impl Receive {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Message>> + Send + Sync + 'static,
    {
        Self { recv: Arc::new(f) }
    }

    pub async fn recv(&self) -> Result<Message> {
        (self.recv)().await
    }
}

/// An [`App`] built from an async closure.
///
/// # Example
/// ```
/// use ashgate::app::app_fn;
/// use ashgate::message::Message;
///
/// let app = app_fn(|_scope, _receive, send| async move {
///     send.send(Message::response_start(204)).await?;
///     send.send(Message::final_body(Vec::new())).await
/// });
/// ```
pub struct FnApp {
    f: Arc<dyn Fn(Arc<Scope>, Receive, Sender) -> BoxFuture<'static, Result<()>> + Send + Sync>,
}

/// Adapt an async closure into an [`App`].
pub fn app_fn<F, Fut>(f: F) -> FnApp
where
    F: Fn(Arc<Scope>, Receive, Sender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnApp {
        f: Arc::new(move |scope, receive, send| Box::pin(f(scope, receive, send))),
    }
}

#[async_trait]
impl App for FnApp {
    async fn call(&self, scope: Arc<Scope>, receive: Receive, send: Sender) -> Result<()> {
        (self.f)(scope, receive, send).await
    }
}
