//! End-to-end tests of the dispatch engine over in-process frame channels.
//!
//! Run with:
//!   cargo test -p verbgate-proxy --test streaming

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tonic::Status;

use verbgate_proxy::{
    frame_channel, Backend, CallContext, CallError, Cancellation, ExposedInterface, FrameChannel,
    MismatchReason, Proxy, ProxyError, RequestEnvelope, RequestStream, ResponseSink, RoutingInfo,
    SetupError, StreamedFrame, Verb,
};

/// Timeout for any single receive in these tests.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Fixture backend
// =============================================================================

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Line {
    author: String,
    text: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Upload {
    name: String,
    bytes: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Receipt {
    files: u64,
    bytes: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Topic {
    name: String,
    count: u32,
}

fn backend() -> Backend {
    Backend::builder("Room")
        .unary("Say", |_ctx, line: Line| async move {
            if line.text.is_empty() {
                return Err(Status::invalid_argument("empty line"));
            }
            Ok(line)
        })
        .unary("Crash", |_ctx, _line: Line| async move {
            if true {
                panic!("backend bug");
            }
            Ok::<_, Status>(Line::default())
        })
        .server_streaming("Broadcast", |_ctx, topic: Topic, sink: ResponseSink<Line>| async move {
            for i in 0..topic.count {
                sink.send(Line {
                    author: topic.name.clone(),
                    text: format!("message {i}"),
                })
                .await?;
            }
            Ok::<_, CallError>(())
        })
        .server_streaming("Flaky", |_ctx, _topic: Topic, sink: ResponseSink<Line>| async move {
            sink.send(Line::default()).await?;
            Err::<(), _>(CallError::Status(Status::unavailable("feed dropped")))
        })
        .client_streaming("Upload", |_ctx, mut uploads: RequestStream<Upload>| async move {
            let mut receipt = Receipt::default();
            while let Some(upload) = uploads.recv().await {
                receipt.files += 1;
                receipt.bytes += upload.bytes;
            }
            Ok::<_, Status>(receipt)
        })
        .bidi_streaming(
            "Chat",
            |_ctx, mut lines: RequestStream<Line>, sink: ResponseSink<Line>| async move {
                while let Some(line) = lines.recv().await {
                    sink.send(Line {
                        author: "echo".to_string(),
                        text: line.text,
                    })
                    .await?;
                }
                sink.send(Line {
                    author: "room".to_string(),
                    text: "bye".to_string(),
                })
                .await?;
                Ok::<_, CallError>(())
            },
        )
        .client_streaming("Jam", |_ctx, mut uploads: RequestStream<Upload>| async move {
            let _ = uploads.recv().await;
            if true {
                panic!("upload jammed");
            }
            Ok::<_, Status>(Receipt::default())
        })
        .bidi_streaming(
            "Rant",
            |_ctx, mut lines: RequestStream<Line>, _sink: ResponseSink<Line>| async move {
                let _ = lines.recv().await;
                if true {
                    panic!("rant got out of hand");
                }
                Ok::<_, CallError>(())
            },
        )
        .bidi_streaming(
            "Shout",
            |_ctx, mut lines: RequestStream<Line>, _sink: ResponseSink<Line>| async move {
                let _ = lines.recv().await;
                Err::<(), _>(CallError::Status(Status::permission_denied("too loud")))
            },
        )
        .build()
}

fn interface() -> ExposedInterface {
    ExposedInterface::builder("RoomApi")
        .unary::<Line, Line>("PostSay")
        .unary::<Line, Line>("GetCrash")
        .server_streaming::<Topic, Line>("GetBroadcast")
        .server_streaming::<Topic, Line>("GetFlaky")
        .client_streaming::<Upload, Receipt>("PostUpload")
        .bidi_streaming::<Line, Line>("GetChat")
        .bidi_streaming::<Line, Line>("GetShout")
        .client_streaming::<Upload, Receipt>("PostJam")
        .bidi_streaming::<Line, Line>("GetRant")
        .build()
}

fn proxy() -> Proxy {
    Proxy::builder()
        .backend(backend())
        .interface(interface())
        .build()
        .expect("fixture interface is valid")
}

/// Run a two-message broadcast through `proxy` and check it completes.
async fn assert_broadcast_works(proxy: &Proxy) {
    let FrameChannel {
        client_tx,
        mut client_rx,
        source,
        sink,
    } = frame_channel();
    let proxy = proxy.clone();
    let task = tokio::spawn(async move { proxy.proxy_stream(CallContext::new(), source, sink).await });

    client_tx
        .send(StreamedFrame::Init(RoutingInfo::new(Verb::Get, "Broadcast")))
        .await
        .unwrap();
    client_tx
        .send_data(r#"{"name": "news", "count": 2}"#)
        .await
        .unwrap();

    for i in 0..2 {
        let frame = timeout(RECV_TIMEOUT, client_rx.recv()).await.unwrap().unwrap();
        assert_eq!(line(&frame).text, format!("message {i}"));
    }
    timeout(RECV_TIMEOUT, task).await.unwrap().unwrap().unwrap();
}

fn line(frame: &Bytes) -> Line {
    serde_json::from_slice(frame).expect("frame is a line")
}

// =============================================================================
// Streams
// =============================================================================

#[tokio::test]
async fn bidi_chat_echoes_and_finishes_after_half_close() {
    let FrameChannel {
        mut client_tx,
        mut client_rx,
        source,
        sink,
    } = frame_channel();
    let proxy = proxy();
    let task = tokio::spawn(async move { proxy.proxy_stream(CallContext::new(), source, sink).await });

    client_tx
        .send(StreamedFrame::Init(RoutingInfo::new(Verb::Get, "Chat")))
        .await
        .unwrap();

    for text in ["hello", "world"] {
        client_tx
            .send_data(format!(r#"{{"author": "me", "text": "{text}"}}"#))
            .await
            .unwrap();
        let frame = timeout(RECV_TIMEOUT, client_rx.recv()).await.unwrap().unwrap();
        assert_eq!(line(&frame).text, text);
        assert_eq!(line(&frame).author, "echo");
    }

    client_tx.close();
    let frame = timeout(RECV_TIMEOUT, client_rx.recv()).await.unwrap().unwrap();
    assert_eq!(line(&frame).text, "bye");

    task.await.unwrap().unwrap();
    assert_eq!(client_rx.recv().await, None);
}

#[tokio::test]
async fn bidi_backend_error_terminates_stream() {
    let FrameChannel {
        client_tx,
        client_rx: _client_rx,
        source,
        sink,
    } = frame_channel();
    let proxy = proxy();
    let task = tokio::spawn(async move { proxy.proxy_stream(CallContext::new(), source, sink).await });

    client_tx
        .send(StreamedFrame::Init(RoutingInfo::new(Verb::Get, "Shout")))
        .await
        .unwrap();
    client_tx.send_data(r#"{"text": "HI"}"#).await.unwrap();

    let err = timeout(RECV_TIMEOUT, task).await.unwrap().unwrap().unwrap_err();
    assert_eq!(err.status_code(), 403);
    assert_eq!(err.code(), "permission_denied");
}

#[tokio::test]
async fn server_stream_error_after_messages() {
    let FrameChannel {
        client_tx,
        mut client_rx,
        source,
        sink,
    } = frame_channel();
    let proxy = proxy();
    let task = tokio::spawn(async move { proxy.proxy_stream(CallContext::new(), source, sink).await });

    client_tx
        .send(StreamedFrame::Init(RoutingInfo::new(Verb::Get, "Flaky")))
        .await
        .unwrap();
    client_tx.send_data("{}").await.unwrap();

    assert!(timeout(RECV_TIMEOUT, client_rx.recv()).await.unwrap().is_some());
    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.status_code(), 503);
}

#[tokio::test]
async fn server_stream_broadcast() {
    let FrameChannel {
        client_tx,
        mut client_rx,
        source,
        sink,
    } = frame_channel();
    let proxy = proxy();
    let task = tokio::spawn(async move { proxy.proxy_stream(CallContext::new(), source, sink).await });

    client_tx
        .send(StreamedFrame::Init(RoutingInfo::new(Verb::Get, "Broadcast")))
        .await
        .unwrap();
    client_tx
        .send_data(r#"{"name": "news", "count": 2}"#)
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Some(frame) = timeout(RECV_TIMEOUT, client_rx.recv()).await.unwrap() {
        received.push(line(&frame));
    }
    assert_eq!(received.len(), 2);
    assert!(received.iter().all(|l| l.author == "news"));
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn client_stream_upload() {
    let FrameChannel {
        mut client_tx,
        mut client_rx,
        source,
        sink,
    } = frame_channel();
    let proxy = proxy();
    let task = tokio::spawn(async move { proxy.proxy_stream(CallContext::new(), source, sink).await });

    client_tx
        .send(StreamedFrame::Init(RoutingInfo::new(Verb::Post, "Upload")))
        .await
        .unwrap();
    client_tx.send_data(r#"{"name": "a.png", "bytes": 10}"#).await.unwrap();
    client_tx.send_data(r#"{"name": "b.png", "bytes": 32}"#).await.unwrap();
    client_tx.close();

    let frame = timeout(RECV_TIMEOUT, client_rx.recv()).await.unwrap().unwrap();
    let receipt: Receipt = serde_json::from_slice(&frame).unwrap();
    assert_eq!(receipt.files, 2);
    assert_eq!(receipt.bytes, 42);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn cancelled_stream_reports_cancellation() {
    let FrameChannel {
        client_tx,
        client_rx: _client_rx,
        source,
        sink,
    } = frame_channel();
    let (handle, cancellation) = Cancellation::new();
    let ctx = CallContext::new().with_cancellation(cancellation);
    let proxy = proxy();
    let task = tokio::spawn(async move { proxy.proxy_stream(ctx, source, sink).await });

    client_tx
        .send(StreamedFrame::Init(RoutingInfo::new(Verb::Get, "Chat")))
        .await
        .unwrap();
    handle.cancel();

    let err = timeout(RECV_TIMEOUT, task).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(err, ProxyError::Cancelled));
    assert_eq!(err.status_code(), 504);
}

// =============================================================================
// Failure containment
// =============================================================================

#[tokio::test]
async fn panicking_backend_does_not_take_down_the_proxy() {
    let proxy = proxy();

    let res = proxy
        .proxy_unary(CallContext::new(), RequestEnvelope::new(Verb::Get, "Crash"))
        .await;
    assert_eq!(res.status_code, 500);

    let req = RequestEnvelope::new(Verb::Post, "Say").with_payload(r#"{"author": "a", "text": "still here"}"#);
    let res = proxy.proxy_unary(CallContext::new(), req).await;
    assert_eq!(res.status_code, 200);

    let req = RequestEnvelope::new(Verb::Post, "Say").with_payload(r#"{"author": "a"}"#);
    let res = proxy.proxy_unary(CallContext::new(), req).await;
    assert_eq!(res.status_code, 400);

    assert_broadcast_works(&proxy).await;
}

#[tokio::test]
async fn panicking_client_stream_is_an_internal_error() {
    let proxy = proxy();
    let FrameChannel {
        mut client_tx,
        client_rx: _client_rx,
        source,
        sink,
    } = frame_channel();
    let stream_proxy = proxy.clone();
    let task =
        tokio::spawn(async move { stream_proxy.proxy_stream(CallContext::new(), source, sink).await });

    client_tx
        .send(StreamedFrame::Init(RoutingInfo::new(Verb::Post, "Jam")))
        .await
        .unwrap();
    client_tx
        .send_data(r#"{"name": "a.txt", "bytes": 1}"#)
        .await
        .unwrap();
    client_tx.close();

    let err = timeout(RECV_TIMEOUT, task).await.unwrap().unwrap().unwrap_err();
    assert_eq!(err.status_code(), 500);
    assert!(err.to_string().contains("upload jammed"));

    assert_broadcast_works(&proxy).await;
}

#[tokio::test]
async fn panicking_bidi_stream_is_an_internal_error() {
    let proxy = proxy();
    let FrameChannel {
        client_tx,
        client_rx: _client_rx,
        source,
        sink,
    } = frame_channel();
    let stream_proxy = proxy.clone();
    let task =
        tokio::spawn(async move { stream_proxy.proxy_stream(CallContext::new(), source, sink).await });

    client_tx
        .send(StreamedFrame::Init(RoutingInfo::new(Verb::Get, "Rant")))
        .await
        .unwrap();
    client_tx.send_data(r#"{"text": "well actually"}"#).await.unwrap();

    let err = timeout(RECV_TIMEOUT, task).await.unwrap().unwrap().unwrap_err();
    assert_eq!(err.status_code(), 500);
    assert!(err.to_string().contains("rant got out of hand"));

    assert_broadcast_works(&proxy).await;
}

// =============================================================================
// Catalogue construction
// =============================================================================

#[test]
fn missing_backend_method_is_fatal() {
    let api = ExposedInterface::builder("RoomApi")
        .unary::<Line, Line>("GetWhisper")
        .build();
    let err = Proxy::builder()
        .backend(backend())
        .interface(api)
        .build()
        .unwrap_err();
    assert_eq!(err, SetupError::MissingMethod("Whisper".to_string()));
}

#[test]
fn invalid_verb_prefix_is_fatal() {
    let api = ExposedInterface::builder("RoomApi")
        .unary::<Line, Line>("FetchSay")
        .build();
    let err = Proxy::builder()
        .backend(backend())
        .interface(api)
        .build()
        .unwrap_err();
    assert!(matches!(err, SetupError::InvalidVerbPrefix(name) if name == "FetchSay"));
}

#[test]
fn signature_mismatch_is_fatal() {
    let api = ExposedInterface::builder("RoomApi")
        .server_streaming::<Topic, Line>("GetChat")
        .build();
    let err = Proxy::builder()
        .backend(backend())
        .interface(api)
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        SetupError::SignatureMismatch {
            reason: MismatchReason::LengthMismatch { .. } | MismatchReason::KindMismatch { .. },
            ..
        }
    ));
}

#[test]
fn same_procedure_under_two_verbs() {
    let api = ExposedInterface::builder("RoomApi")
        .unary::<Line, Line>("PostSay")
        .unary::<Line, Line>("PutSay")
        .build();
    let proxy = Proxy::builder()
        .backend(backend())
        .interface(api)
        .build()
        .unwrap();
    assert_eq!(proxy.catalogue().len(), 2);
    assert!(proxy.catalogue().resolve(Verb::Put, "Say").is_ok());
    assert!(proxy.catalogue().resolve(Verb::Get, "Say").is_err());
}
