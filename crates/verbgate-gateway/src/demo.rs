//! Demo backend.
//!
//! A small service with one procedure of every call shape, used by the
//! binary and by the integration tests. `Fibonacci` is registered on the
//! backend but left out of the exposed interface, so it is unreachable over
//! HTTP.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tonic::Status;

use verbgate_proxy::{
    Backend, CallError, ExposedInterface, Proxy, ProxyConfig, RequestStream, ResponseSink,
    SetupError,
};

/// Most messages a single broadcast will send.
pub const MAX_BROADCAST: u32 = 16;

/// Request for the nth Fibonacci number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FibonacciRequest {
    /// One-based index.
    pub n: u64,
}

/// A Fibonacci number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FibonacciResponse {
    /// The number.
    pub number: u64,
}

/// Request for a random number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RandomRequest {}

/// A random number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RandomResponse {
    /// The number.
    pub number: i64,
}

/// A photo upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadPhotoRequest {
    /// Base64 image bytes.
    pub data: String,
}

/// Result of a photo upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadPhotoResponse {
    /// Content hash identifying the stored photo.
    pub uuid: String,
}

/// One item of a feed upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedData {
    /// Item id.
    pub id: String,
    /// Caller-defined type tag.
    pub data_type: i32,
    /// Base64 payload.
    pub raw_data: String,
}

/// Acknowledgement of a whole feed upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedResponse {
    /// Number of items received.
    pub received: u32,
}

/// Request to broadcast a number of messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastRequest {
    /// Broadcast id.
    pub id: String,
    /// Messages to send, capped at [`MAX_BROADCAST`].
    pub count: u32,
}

/// One broadcast message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastData {
    /// Base64 payload.
    pub raw_data: String,
}

/// A chat line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Sender.
    pub author: String,
    /// Text.
    pub text: String,
}

/// Build the demo backend.
#[must_use]
pub fn backend() -> Backend {
    let photos: Arc<Mutex<HashMap<String, usize>>> = Arc::default();

    Backend::builder("App")
        .unary("Fibonacci", |_ctx, req: FibonacciRequest| async move {
            fibonacci(req.n).map(|number| FibonacciResponse { number })
        })
        .unary("Random", |_ctx, _req: RandomRequest| async move {
            // Chosen by fair dice roll.
            Ok::<_, Status>(RandomResponse { number: 4 })
        })
        .unary("UploadPhoto", move |_ctx, req: UploadPhotoRequest| {
            let photos = Arc::clone(&photos);
            async move { store_photo(&photos, &req.data) }
        })
        .client_streaming("Feed", |ctx, mut feed: RequestStream<FeedData>| async move {
            let mut received = 0;
            while let Some(item) = feed.recv().await {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    id = %item.id,
                    data_type = item.data_type,
                    "Received feed item"
                );
                received += 1;
            }
            Ok::<_, Status>(FeedResponse { received })
        })
        .server_streaming(
            "Broadcast",
            |_ctx, req: BroadcastRequest, sink: ResponseSink<BroadcastData>| async move {
                for i in 0..req.count.min(MAX_BROADCAST) {
                    sink.send(BroadcastData {
                        raw_data: STANDARD.encode(i.to_string()),
                    })
                    .await
                    .map_err(|e| Status::aborted(format!("failed to send all data: {e}")))?;
                }
                Ok::<_, Status>(())
            },
        )
        .bidi_streaming(
            "Chat",
            |_ctx, mut lines: RequestStream<ChatMessage>, sink: ResponseSink<ChatMessage>| async move {
                while let Some(line) = lines.recv().await {
                    sink.send(ChatMessage {
                        author: "echo".to_string(),
                        text: line.text,
                    })
                    .await?;
                }
                Ok::<_, CallError>(())
            },
        )
        .build()
}

/// Build the demo's exposed interface.
#[must_use]
pub fn interface() -> ExposedInterface {
    ExposedInterface::builder("ExposedApp")
        .unary::<RandomRequest, RandomResponse>("GetRandom")
        .unary::<UploadPhotoRequest, UploadPhotoResponse>("PostUploadPhoto")
        .client_streaming::<FeedData, FeedResponse>("PostFeed")
        .server_streaming::<BroadcastRequest, BroadcastData>("GetBroadcast")
        .bidi_streaming::<ChatMessage, ChatMessage>("GetChat")
        .build()
}

/// Build a proxy over the demo backend.
///
/// # Errors
///
/// Returns a `SetupError` if the interface does not match the backend.
pub fn proxy(config: ProxyConfig) -> Result<Proxy, SetupError> {
    Proxy::builder()
        .backend(backend())
        .interface(interface())
        .config(config)
        .build()
}

fn fibonacci(n: u64) -> Result<u64, Status> {
    if n == 0 {
        return Err(Status::invalid_argument("n must be greater than zero"));
    }
    let (mut prev, mut current) = (0u64, 1u64);
    for _ in 1..n {
        let next = prev
            .checked_add(current)
            .ok_or_else(|| Status::out_of_range(format!("fibonacci({n}) overflows u64")))?;
        prev = current;
        current = next;
    }
    Ok(current)
}

fn store_photo(
    photos: &Mutex<HashMap<String, usize>>,
    data: &str,
) -> Result<UploadPhotoResponse, Status> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| Status::invalid_argument(format!("photo data is not base64: {e}")))?;
    let hash = blake3::hash(&bytes).to_hex().to_string();

    let mut photos = photos.lock();
    if photos.contains_key(&hash) {
        return Err(Status::failed_precondition("photo already exists"));
    }
    photos.insert(hash.clone(), bytes.len());
    Ok(UploadPhotoResponse { uuid: hash })
}
