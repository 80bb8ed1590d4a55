//! The bidirectional stream bridge.
//!
//! Two tasks run per duplex stream. The upstream task moves frames from the
//! transport into the backend; the downstream task moves backend messages
//! onto the transport. Each reports once through its own oneshot signal.
//!
//! The coordinator waits for whichever signal fires first. A clean finish
//! lets the other direction drain and waits for it too. An error is
//! returned at once and the other task is left to wind down on its own.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::oneshot;

use verbgate_core::StreamedFrame;

use crate::backend::{MessageSink, MessageSource};
use crate::codec::{encode_frame, parse_payload};
use crate::context::CallContext;
use crate::error::{CallError, ProxyError};
use crate::transport::{FrameSink, FrameSource};

type Signal = Result<Result<(), ProxyError>, oneshot::error::RecvError>;

enum First {
    Upstream(Signal),
    Downstream(Signal),
}

/// Bridge a duplex transport stream to a duplex backend call.
///
/// # Errors
///
/// Returns the first error reported by either direction, or
/// `ProxyError::Cancelled` if the context is cancelled first.
pub async fn bridge<S, K>(
    ctx: &CallContext,
    transport_in: S,
    backend_out: Box<dyn MessageSink>,
    backend_in: Box<dyn MessageSource>,
    transport_out: K,
) -> Result<(), ProxyError>
where
    S: FrameSource + 'static,
    K: FrameSink + 'static,
{
    let (up_tx, mut up_rx) = oneshot::channel();
    let (down_tx, mut down_rx) = oneshot::channel();

    let up_ctx = ctx.clone();
    tokio::spawn(async move {
        let outcome = guarded(upstream(&up_ctx, transport_in, backend_out)).await;
        let _ = up_tx.send(outcome);
    });

    let down_ctx = ctx.clone();
    tokio::spawn(async move {
        let outcome = guarded(downstream(&down_ctx, backend_in, transport_out)).await;
        let _ = down_tx.send(outcome);
    });

    let first = tokio::select! {
        signal = &mut up_rx => First::Upstream(signal),
        signal = &mut down_rx => First::Downstream(signal),
        () = ctx.cancellation().cancelled() => return Err(ProxyError::Cancelled),
    };

    match first {
        First::Upstream(signal) => {
            settle("upstream", signal)?;
            tracing::trace!(request_id = %ctx.request_id(), "Upstream done, draining downstream");
            settle("downstream", ctx.run(down_rx).await?)
        }
        First::Downstream(signal) => {
            settle("downstream", signal)?;
            tracing::trace!(request_id = %ctx.request_id(), "Downstream done, draining upstream");
            settle("upstream", ctx.run(up_rx).await?)
        }
    }
}

fn settle(direction: &str, signal: Signal) -> Result<(), ProxyError> {
    signal.unwrap_or_else(|_| {
        Err(ProxyError::Internal(format!(
            "{direction} task ended without reporting"
        )))
    })
}

async fn guarded<F>(fut: F) -> Result<(), ProxyError>
where
    F: Future<Output = Result<(), ProxyError>>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(CallError::from_panic(&*panic).into()))
}

async fn upstream<S: FrameSource>(
    ctx: &CallContext,
    mut frames: S,
    mut backend: Box<dyn MessageSink>,
) -> Result<(), ProxyError> {
    loop {
        match ctx.run(frames.next_frame()).await?? {
            None => {
                ctx.run(backend.close_send()).await??;
                return Ok(());
            }
            Some(StreamedFrame::Init(_)) => {
                return Err(ProxyError::Protocol(
                    "unexpected routing message after stream start".to_string(),
                ));
            }
            Some(StreamedFrame::Data(payload)) => {
                let message = parse_payload(Some(&payload[..]))?;
                match ctx.run(backend.send(message)).await? {
                    Ok(()) => {}
                    // The backend finished reading; downstream reports its outcome.
                    Err(CallError::StreamClosed) => return Ok(()),
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }
}

async fn downstream<K: FrameSink>(
    ctx: &CallContext,
    mut backend: Box<dyn MessageSource>,
    mut frames: K,
) -> Result<(), ProxyError> {
    while let Some(message) = ctx.run(backend.recv()).await?? {
        let frame = encode_frame(&message)?;
        ctx.run(frames.send_frame(frame)).await??;
    }
    Ok(())
}
