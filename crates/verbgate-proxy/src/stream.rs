//! Streaming executors.
//!
//! Every stream opens with a routing handshake: the first frame must be an
//! `Init` frame naming the verb and procedure. The binding's shape then
//! picks the executor.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use verbgate_core::StreamedFrame;

use crate::backend::{ClientStreamHandler, Handler, ServerStreamHandler};
use crate::bridge::bridge;
use crate::codec::{encode_frame, parse_payload};
use crate::context::CallContext;
use crate::error::{CallError, ProxyError};
use crate::service::{log_failure, wrong_shape, Proxy};
use crate::transport::{FrameSink, FrameSource};

impl Proxy {
    /// Serve one stream.
    ///
    /// Returns `Ok(())` when both sides finished cleanly. Errors, including
    /// a panic in the backend, are returned for the transport adapter to
    /// report as a terminal error.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Protocol` for a broken handshake, the catalogue
    /// error for an unknown route, and any backend or transport failure.
    pub async fn proxy_stream<S, K>(
        &self,
        ctx: CallContext,
        source: S,
        sink: K,
    ) -> Result<(), ProxyError>
    where
        S: FrameSource + 'static,
        K: FrameSink + 'static,
    {
        let request_id = ctx.request_id().to_string();
        let result = AssertUnwindSafe(self.dispatch_stream(ctx, source, sink))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(CallError::from_panic(&*panic).into()));

        if let Err(err) = &result {
            log_failure(&request_id, "stream", err);
        }
        result
    }

    async fn dispatch_stream<S, K>(
        &self,
        ctx: CallContext,
        mut source: S,
        mut sink: K,
    ) -> Result<(), ProxyError>
    where
        S: FrameSource + 'static,
        K: FrameSink + 'static,
    {
        let init = match ctx.run(source.next_frame()).await?? {
            Some(StreamedFrame::Init(init)) => init,
            Some(StreamedFrame::Data(_)) => {
                return Err(ProxyError::Protocol(
                    "first message in stream must be Init".to_string(),
                ));
            }
            None => {
                return Err(ProxyError::Protocol(
                    "stream closed before the initial routing message".to_string(),
                ));
            }
        };

        let binding = self.catalogue.resolve(init.verb, &init.procedure)?;
        let ctx = self.outbound_context(ctx, &init.headers);

        tracing::debug!(
            request_id = %ctx.request_id(),
            verb = %init.verb,
            procedure = %init.procedure,
            shape = %binding.shape(),
            "Dispatching stream"
        );

        match binding.handler() {
            Handler::Unary(_) => Err(wrong_shape(binding, "a stream")),
            Handler::ServerStream(handler) => {
                server_stream(&ctx, handler.as_ref(), source, &mut sink).await
            }
            Handler::ClientStream(handler) => {
                client_stream(&ctx, handler.as_ref(), &mut source, &mut sink).await
            }
            Handler::BidiStream(handler) => {
                let call = ctx.run(handler.open(ctx.clone())).await??;
                bridge(&ctx, source, call.sink, call.source, sink).await
            }
        }
    }
}

/// One request frame in, backend messages out until the backend is done.
async fn server_stream<S: FrameSource, K: FrameSink>(
    ctx: &CallContext,
    handler: &dyn ServerStreamHandler,
    mut source: S,
    sink: &mut K,
) -> Result<(), ProxyError> {
    let payload = match ctx.run(source.next_frame()).await?? {
        Some(StreamedFrame::Data(payload)) => Some(payload),
        Some(StreamedFrame::Init(_)) => {
            return Err(ProxyError::Protocol(
                "unexpected routing message after stream start".to_string(),
            ));
        }
        // Client closed without a request: the backend gets the default one.
        None => None,
    };
    // Nothing more is read from the client.
    drop(source);
    let request = parse_payload(payload.as_deref())?;

    let mut messages = ctx.run(handler.open(ctx.clone(), request)).await??;
    while let Some(message) = ctx.run(messages.recv()).await?? {
        let frame = encode_frame(&message)?;
        ctx.run(sink.send_frame(frame)).await??;
    }
    Ok(())
}

/// Request frames in until the client is done, then exactly one frame out.
async fn client_stream<S: FrameSource, K: FrameSink>(
    ctx: &CallContext,
    handler: &dyn ClientStreamHandler,
    source: &mut S,
    sink: &mut K,
) -> Result<(), ProxyError> {
    let mut call = ctx.run(handler.open(ctx.clone())).await??;

    loop {
        let payload = match ctx.run(source.next_frame()).await?? {
            None => break,
            Some(StreamedFrame::Data(payload)) => payload,
            Some(StreamedFrame::Init(_)) => {
                return Err(ProxyError::Protocol(
                    "unexpected routing message after stream start".to_string(),
                ));
            }
        };
        let message = parse_payload(Some(&payload[..]))?;
        match ctx.run(call.send(message)).await? {
            Ok(()) => {}
            // The backend answered early; its response is collected below.
            Err(CallError::StreamClosed) => break,
            Err(err) => return Err(err.into()),
        }
    }

    let response = ctx.run(call.close_and_recv()).await??;
    let frame = encode_frame(&response)?;
    ctx.run(sink.send_frame(frame)).await??;
    Ok(())
}
