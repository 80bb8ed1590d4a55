//! Call context and cancellation.
//!
//! Every backend call receives a [`CallContext`] carrying the correlation id,
//! the outbound metadata and a cancellation signal. Executors race each
//! suspension point against [`Cancellation::cancelled`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use verbgate_core::MultiMap;

use crate::error::ProxyError;

/// Owner side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Cancel every context derived from this handle.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observer side of a cancellation signal, with an optional deadline.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
    // Keeps the channel open for signals created without an external handle.
    _tx: Option<Arc<watch::Sender<bool>>>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// Create a linked handle and signal.
    #[must_use]
    pub fn new() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        let handle = CancelHandle { tx: Arc::new(tx) };
        let signal = Self {
            rx,
            _tx: None,
            deadline: None,
        };
        (handle, signal)
    }

    /// A signal that is only cancelled by its deadline, if any.
    #[must_use]
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _tx: Some(Arc::new(tx)),
            deadline: None,
        }
    }

    /// Attach a deadline; the earlier of the existing and new deadline wins.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    /// Returns true if cancelled or past the deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the signal is cancelled or the deadline passes.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let deadline = self.deadline;
        let signalled = async move {
            let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
            if closed {
                // Every handle is gone, so only the deadline can fire.
                std::future::pending::<()>().await;
            }
        };
        match deadline {
            Some(deadline) => {
                tokio::select! {
                    () = signalled => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => signalled.await,
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::never()
    }
}

/// Per-call context passed to every backend invocation.
#[derive(Debug, Clone)]
pub struct CallContext {
    request_id: String,
    metadata: MultiMap,
    cancellation: Cancellation,
}

impl CallContext {
    /// A context with a fresh request id, no metadata and no cancellation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            metadata: MultiMap::new(),
            cancellation: Cancellation::never(),
        }
    }

    /// Replace the request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Replace the outbound metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: MultiMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replace the cancellation signal.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Correlation id for logs and outbound metadata.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Outbound metadata.
    #[must_use]
    pub fn metadata(&self) -> &MultiMap {
        &self.metadata
    }

    /// The cancellation signal.
    #[must_use]
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Returns true if the call was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Run `fut` unless the context is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Cancelled` if cancellation wins the race.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ProxyError> {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(ProxyError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}
