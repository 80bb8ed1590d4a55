//! Typed handler adapters.
//!
//! These wrap ordinary async functions over serde types behind the erased
//! handler traits. Streaming procedures run in their own tokio task and talk
//! to the executor through capacity-1 channels, so at most one message is in
//! flight per direction. A panic in the backend task becomes
//! `CallError::Fault`; dropping the executor's side aborts the task.

use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::backend::{
    BidiCall, BidiStreamHandler, ClientStreamCall, ClientStreamHandler, MessageSink,
    MessageSource, ServerStreamHandler, UnaryHandler,
};
use crate::codec::{decode_into, encode_value};
use crate::context::CallContext;
use crate::error::CallError;

type Outbound = Result<Value, CallError>;

/// Incoming messages of a client-streaming or bidirectional call.
#[derive(Debug)]
pub struct RequestStream<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> RequestStream<T> {
    /// Next message, or `None` once the client has finished sending.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

/// Outgoing messages of a server-streaming or bidirectional call.
#[derive(Debug)]
pub struct ResponseSink<T> {
    tx: mpsc::Sender<Outbound>,
    _message: PhantomData<fn(T)>,
}

impl<T> Clone for ResponseSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            _message: PhantomData,
        }
    }
}

impl<T: Serialize> ResponseSink<T> {
    fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            tx,
            _message: PhantomData,
        }
    }

    /// Send one message to the client. Waits while the previous message is
    /// still in flight.
    ///
    /// # Errors
    ///
    /// Returns `CallError::Encode` if the message cannot be serialized and
    /// `CallError::StreamClosed` once the client side is gone.
    pub async fn send(&self, message: T) -> Result<(), CallError> {
        let value = encode_value(&message)?;
        self.tx
            .send(Ok(value))
            .await
            .map_err(|_| CallError::StreamClosed)
    }
}

/// Aborts the backend task when the last executor-side handle goes away.
#[derive(Debug)]
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn run_guarded<Fut, T, E>(fut: Fut) -> Result<T, CallError>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<CallError>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result.map_err(Into::into),
        Err(panic) => Err(CallError::from_panic(&*panic)),
    }
}

struct ChannelSource {
    rx: mpsc::Receiver<Outbound>,
    _task: Arc<TaskGuard>,
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<Value>, CallError> {
        self.rx.recv().await.transpose()
    }
}

struct ChannelSink<Req> {
    tx: Option<mpsc::Sender<Req>>,
    _task: Arc<TaskGuard>,
}

#[async_trait]
impl<Req> MessageSink for ChannelSink<Req>
where
    Req: DeserializeOwned + Serialize + Default + Send + 'static,
{
    async fn send(&mut self, message: Value) -> Result<(), CallError> {
        let message = decode_into::<Req>(message)?;
        let tx = self.tx.as_ref().ok_or(CallError::StreamClosed)?;
        tx.send(message).await.map_err(|_| CallError::StreamClosed)
    }

    async fn close_send(&mut self) -> Result<(), CallError> {
        self.tx = None;
        Ok(())
    }
}

struct ChannelClientCall<Req> {
    tx: mpsc::Sender<Req>,
    done: oneshot::Receiver<Outbound>,
    task: TaskGuard,
}

#[async_trait]
impl<Req> ClientStreamCall for ChannelClientCall<Req>
where
    Req: DeserializeOwned + Serialize + Default + Send + 'static,
{
    async fn send(&mut self, message: Value) -> Result<(), CallError> {
        let message = decode_into::<Req>(message)?;
        self.tx
            .send(message)
            .await
            .map_err(|_| CallError::StreamClosed)
    }

    async fn close_and_recv(self: Box<Self>) -> Result<Value, CallError> {
        let Self { tx, done, task } = *self;
        drop(tx);
        let outcome = done.await.unwrap_or_else(|_| {
            Err(CallError::Fault(
                "backend task ended without a response".to_string(),
            ))
        });
        drop(task);
        outcome
    }
}

// =============================================================================
// Handler adapters
// =============================================================================

pub(crate) struct TypedUnary<F, Req, Res> {
    f: F,
    _types: PhantomData<fn(Req) -> Res>,
}

impl<F, Req, Res> TypedUnary<F, Req, Res> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, Req, Res, E> UnaryHandler for TypedUnary<F, Req, Res>
where
    F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Res, E>> + Send + 'static,
    Req: DeserializeOwned + Serialize + Default + Send + 'static,
    Res: Serialize + Send + 'static,
    E: Into<CallError> + Send + 'static,
{
    async fn call(&self, ctx: CallContext, request: Value) -> Result<Value, CallError> {
        let request = decode_into::<Req>(request)?;
        let response = (self.f)(ctx, request).await.map_err(Into::into)?;
        encode_value(&response)
    }
}

pub(crate) struct TypedServerStream<F, Req, Res> {
    f: F,
    _types: PhantomData<fn(Req) -> Res>,
}

impl<F, Req, Res> TypedServerStream<F, Req, Res> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, Req, Res, E> ServerStreamHandler for TypedServerStream<F, Req, Res>
where
    F: Fn(CallContext, Req, ResponseSink<Res>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    Req: DeserializeOwned + Serialize + Default + Send + 'static,
    Res: Serialize + Send + 'static,
    E: Into<CallError> + Send + 'static,
{
    async fn open(
        &self,
        ctx: CallContext,
        request: Value,
    ) -> Result<Box<dyn MessageSource>, CallError> {
        let request = decode_into::<Req>(request)?;
        let (tx, rx) = mpsc::channel(1);
        let fut = (self.f)(ctx, request, ResponseSink::new(tx.clone()));
        let task = tokio::spawn(async move {
            if let Err(err) = run_guarded(fut).await {
                let _ = tx.send(Err(err)).await;
            }
        });
        Ok(Box::new(ChannelSource {
            rx,
            _task: Arc::new(TaskGuard(task)),
        }))
    }
}

pub(crate) struct TypedClientStream<F, Req, Res> {
    f: F,
    _types: PhantomData<fn(Req) -> Res>,
}

impl<F, Req, Res> TypedClientStream<F, Req, Res> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, Req, Res, E> ClientStreamHandler for TypedClientStream<F, Req, Res>
where
    F: Fn(CallContext, RequestStream<Req>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Res, E>> + Send + 'static,
    Req: DeserializeOwned + Serialize + Default + Send + 'static,
    Res: Serialize + Send + 'static,
    E: Into<CallError> + Send + 'static,
{
    async fn open(&self, ctx: CallContext) -> Result<Box<dyn ClientStreamCall>, CallError> {
        let (tx, rx) = mpsc::channel(1);
        let (done_tx, done) = oneshot::channel();
        let fut = (self.f)(ctx, RequestStream { rx });
        let task = tokio::spawn(async move {
            let outcome = run_guarded(fut)
                .await
                .and_then(|response| encode_value(&response));
            let _ = done_tx.send(outcome);
        });
        Ok(Box::new(ChannelClientCall {
            tx,
            done,
            task: TaskGuard(task),
        }))
    }
}

pub(crate) struct TypedBidiStream<F, Req, Res> {
    f: F,
    _types: PhantomData<fn(Req) -> Res>,
}

impl<F, Req, Res> TypedBidiStream<F, Req, Res> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, Req, Res, E> BidiStreamHandler for TypedBidiStream<F, Req, Res>
where
    F: Fn(CallContext, RequestStream<Req>, ResponseSink<Res>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    Req: DeserializeOwned + Serialize + Default + Send + 'static,
    Res: Serialize + Send + 'static,
    E: Into<CallError> + Send + 'static,
{
    async fn open(&self, ctx: CallContext) -> Result<BidiCall, CallError> {
        let (req_tx, req_rx) = mpsc::channel(1);
        let (res_tx, res_rx) = mpsc::channel(1);
        let fut = (self.f)(
            ctx,
            RequestStream { rx: req_rx },
            ResponseSink::new(res_tx.clone()),
        );
        let task = Arc::new(TaskGuard(tokio::spawn(async move {
            if let Err(err) = run_guarded(fut).await {
                let _ = res_tx.send(Err(err)).await;
            }
        })));
        Ok(BidiCall {
            sink: Box::new(ChannelSink::<Req> {
                tx: Some(req_tx),
                _task: Arc::clone(&task),
            }),
            source: Box::new(ChannelSource {
                rx: res_rx,
                _task: task,
            }),
        })
    }
}
