//! WebSocket stream handler.
//!
//! The upgrade request carries the routing information: the path names the
//! procedure and the `verb` query parameter (default `GET`) the verb. After
//! the upgrade every text or binary message is one data frame. A text
//! message equal to the end-of-stream sentinel, or a close frame, ends the
//! client's side of the stream.
//!
//! The client leaving, by a failed read or write, cancels the call even
//! when no executor is reading from the socket at the time.
//!
//! When the proxy finishes cleanly the gateway sends the sentinel and a
//! normal close. On failure it sends the JSON error body followed by a close
//! frame with code `4000 + status`.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use verbgate_core::{is_eof_sentinel, RoutingInfo, StreamedFrame, Verb, EOF_SENTINEL};
use verbgate_proxy::{
    CallContext, CancelHandle, Cancellation, FrameSink, FrameSource, Proxy, ProxyError,
    TransportError,
};

use crate::error::ApiError;
use crate::handlers::unary::header_multimap;
use crate::state::GatewayState;

/// Longest close reason that fits in a control frame.
const MAX_CLOSE_REASON: usize = 123;

/// Base of the application close codes; the HTTP status is added to it.
const CLOSE_CODE_BASE: u16 = 4000;

/// Query parameters of the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Routing verb, `GET` when absent.
    pub verb: Option<String>,
}

/// WebSocket upgrade handler.
///
/// # Errors
///
/// Returns `ApiError::MethodNotAllowed` if the `verb` query parameter is not
/// a routing verb.
pub async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Path(procedure): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let verb = match query.verb.as_deref() {
        None => Verb::Get,
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::MethodNotAllowed(raw.to_string()))?,
    };

    let mut init = RoutingInfo::new(verb, procedure);
    init.headers = header_multimap(&headers);

    tracing::info!(
        verb = %init.verb,
        procedure = %init.procedure,
        "WebSocket stream initiated"
    );

    let proxy = state.proxy.clone();
    let timeout = state.config.stream_timeout();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, proxy, init, timeout)))
}

/// Serve one stream over an upgraded socket.
///
/// A reader task owns the socket stream and a writer task owns the socket
/// sink. Either one cancels the call when the client goes away, whichever
/// executor happens to be running.
async fn handle_socket(socket: WebSocket, proxy: Proxy, init: RoutingInfo, timeout: Duration) {
    let procedure = init.procedure.clone();
    let (socket_tx, socket_rx) = socket.split();

    let (handle, cancellation) = Cancellation::new();
    let ctx = CallContext::new().with_cancellation(cancellation.with_deadline(Instant::now() + timeout));

    // Frames cross both tasks one at a time.
    let (out_tx, out_rx) = mpsc::channel(1);
    let (in_tx, in_rx) = mpsc::channel(1);
    let writer = tokio::spawn(write_socket(socket_tx, out_rx, handle.clone()));
    let reader = tokio::spawn(read_socket(socket_rx, in_tx, handle.clone()));

    let source = SocketSource {
        init: Some(init),
        rx: in_rx,
    };
    let sink = SocketSink { tx: out_tx.clone() };

    let result = proxy.proxy_stream(ctx, source, sink).await;
    handle.cancel();

    for message in terminal_messages(result.as_ref().err()) {
        if out_tx.send(message).await.is_err() {
            break;
        }
    }
    drop(out_tx);
    let _ = writer.await;
    reader.abort();

    match result {
        Ok(()) => tracing::info!(procedure = %procedure, "WebSocket stream finished"),
        Err(err) => tracing::debug!(
            procedure = %procedure,
            status = err.status_code(),
            error = %err,
            "WebSocket stream failed"
        ),
    }
}

/// The messages that end a stream: sentinel or error body, then a close.
fn terminal_messages(err: Option<&ProxyError>) -> [Message; 2] {
    match err {
        None => [
            Message::Text(EOF_SENTINEL.to_string()),
            Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: Cow::Borrowed(""),
            })),
        ],
        Some(err) => [
            Message::Text(String::from_utf8_lossy(&err.to_body()).into_owned()),
            Message::Close(Some(CloseFrame {
                code: CLOSE_CODE_BASE + err.status_code(),
                reason: Cow::Owned(truncate(err.to_string(), MAX_CLOSE_REASON)),
            })),
        ],
    }
}

fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

/// Forward queued messages to the client until a close is written.
async fn write_socket(
    mut socket: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    cancel: CancelHandle,
) {
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = socket.send(message).await {
            tracing::debug!(error = %e, "Failed to write to client socket");
            cancel.cancel();
            break;
        }
        if closing {
            break;
        }
    }
}

/// Read client messages until the socket goes away, then cancel the call.
///
/// Data messages are handed to the stream source one at a time. Once the
/// client's side has ended, or the source is no longer read, further data
/// is discarded but the socket is still read so a disconnect is noticed.
async fn read_socket(
    mut socket: SplitStream<WebSocket>,
    tx: mpsc::Sender<Result<Bytes, TransportError>>,
    cancel: CancelHandle,
) {
    let mut inbound = Some(tx);

    loop {
        let payload: Bytes = match socket.next().await {
            None => break,
            // The close handshake ends the client's side; the socket ends next.
            Some(Ok(Message::Close(_))) => {
                inbound = None;
                continue;
            }
            Some(Ok(Message::Text(text))) => text.into(),
            Some(Ok(Message::Binary(data))) => data.into(),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "Failed to read from client socket");
                if let Some(tx) = inbound.take() {
                    let _ = tx.try_send(Err(TransportError::Io(e.to_string())));
                }
                break;
            }
        };

        let Some(tx) = &inbound else {
            continue;
        };
        if is_eof_sentinel(&payload) || tx.send(Ok(payload)).await.is_err() {
            inbound = None;
        }
    }

    cancel.cancel();
}

/// Inbound half of a socket stream.
struct SocketSource {
    init: Option<RoutingInfo>,
    rx: mpsc::Receiver<Result<Bytes, TransportError>>,
}

#[async_trait]
impl FrameSource for SocketSource {
    async fn next_frame(&mut self) -> Result<Option<StreamedFrame>, TransportError> {
        if let Some(init) = self.init.take() {
            return Ok(Some(StreamedFrame::Init(init)));
        }
        match self.rx.recv().await {
            Some(Ok(payload)) => Ok(Some(StreamedFrame::Data(payload))),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Outbound half of a socket stream.
struct SocketSink {
    tx: mpsc::Sender<Message>,
}

#[async_trait]
impl FrameSink for SocketSink {
    async fn send_frame(&mut self, payload: Bytes) -> Result<(), TransportError> {
        let message = String::from_utf8(payload.to_vec())
            .map_or_else(|e| Message::Binary(e.into_bytes()), Message::Text);
        self.tx
            .send(message)
            .await
            .map_err(|_| TransportError::Closed)
    }
}
