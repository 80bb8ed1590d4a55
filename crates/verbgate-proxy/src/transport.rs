//! Frame transport abstraction.
//!
//! Streaming executors read [`StreamedFrame`]s from a [`FrameSource`] and
//! write encoded messages to a [`FrameSink`]. Transport adapters own the
//! mapping to their wire format, including stripping an in-band
//! end-of-stream sentinel where the wire has no native half-close.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use verbgate_core::StreamedFrame;

use crate::error::TransportError;

/// Inbound side of a transport stream.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the client has finished sending.
    async fn next_frame(&mut self) -> Result<Option<StreamedFrame>, TransportError>;
}

/// Outbound side of a transport stream.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one encoded message.
    async fn send_frame(&mut self, payload: Bytes) -> Result<(), TransportError>;
}

#[async_trait]
impl FrameSource for Box<dyn FrameSource> {
    async fn next_frame(&mut self) -> Result<Option<StreamedFrame>, TransportError> {
        (**self).next_frame().await
    }
}

#[async_trait]
impl FrameSink for Box<dyn FrameSink> {
    async fn send_frame(&mut self, payload: Bytes) -> Result<(), TransportError> {
        (**self).send_frame(payload).await
    }
}

/// An in-process framed transport.
///
/// The `client_*` halves are held by the caller; `source` and `sink` are
/// handed to [`crate::Proxy::proxy_stream`]. Every direction holds at most
/// one frame.
#[derive(Debug)]
pub struct FrameChannel {
    /// Sends frames towards the proxy.
    pub client_tx: ClientSender,
    /// Receives frames written by the proxy.
    pub client_rx: ClientReceiver,
    /// Proxy-side inbound frames.
    pub source: ChannelFrameSource,
    /// Proxy-side outbound frames.
    pub sink: ChannelFrameSink,
}

/// Create an in-process framed transport.
#[must_use]
pub fn frame_channel() -> FrameChannel {
    let (in_tx, in_rx) = mpsc::channel(1);
    let (out_tx, out_rx) = mpsc::channel(1);
    FrameChannel {
        client_tx: ClientSender { tx: Some(in_tx) },
        client_rx: ClientReceiver { rx: out_rx },
        source: ChannelFrameSource { rx: in_rx },
        sink: ChannelFrameSink { tx: out_tx },
    }
}

/// Client-side writer of a [`FrameChannel`].
#[derive(Debug)]
pub struct ClientSender {
    tx: Option<mpsc::Sender<StreamedFrame>>,
}

impl ClientSender {
    /// Send a frame.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Closed` if the proxy side is gone or this
    /// side was already closed.
    pub async fn send(&self, frame: StreamedFrame) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    /// Send a data frame.
    ///
    /// # Errors
    ///
    /// See [`ClientSender::send`].
    pub async fn send_data(&self, payload: impl Into<Bytes>) -> Result<(), TransportError> {
        self.send(StreamedFrame::data(payload)).await
    }

    /// Half-close: the proxy sees end-of-stream after the frames already sent.
    pub fn close(&mut self) {
        self.tx = None;
    }
}

/// Client-side reader of a [`FrameChannel`].
#[derive(Debug)]
pub struct ClientReceiver {
    rx: mpsc::Receiver<Bytes>,
}

impl ClientReceiver {
    /// Next frame written by the proxy, or `None` once the proxy side is done.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// Proxy-side [`FrameSource`] of a [`FrameChannel`].
#[derive(Debug)]
pub struct ChannelFrameSource {
    rx: mpsc::Receiver<StreamedFrame>,
}

#[async_trait]
impl FrameSource for ChannelFrameSource {
    async fn next_frame(&mut self) -> Result<Option<StreamedFrame>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

/// Proxy-side [`FrameSink`] of a [`FrameChannel`].
#[derive(Debug)]
pub struct ChannelFrameSink {
    tx: mpsc::Sender<Bytes>,
}

#[async_trait]
impl FrameSink for ChannelFrameSink {
    async fn send_frame(&mut self, payload: Bytes) -> Result<(), TransportError> {
        self.tx
            .send(payload)
            .await
            .map_err(|_| TransportError::Closed)
    }
}
