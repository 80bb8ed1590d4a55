//! The proxy service and its unary executor.
//!
//! A [`Proxy`] owns the validated catalogue and dispatches transport
//! requests into backend calls. It is cheap to clone and safe to share
//! across tasks; nothing in it is mutated after [`ProxyBuilder::build`].

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

use verbgate_core::{MultiMap, RequestEnvelope, ResponseEnvelope};

use crate::backend::{Backend, ExposedInterface, Handler};
use crate::catalogue::{Catalogue, MethodBinding};
use crate::codec::{encode_unary, parse_payload};
use crate::config::ProxyConfig;
use crate::context::CallContext;
use crate::error::{CallError, ProxyError, SetupError};
use crate::payload::request_payload;

/// Hook that may answer a unary request before normal dispatch.
#[async_trait]
pub trait ExceptionHandler: Send + Sync {
    /// Return `Some` to answer the request; `None` to dispatch normally.
    async fn handle(&self, ctx: &CallContext, request: &RequestEnvelope)
        -> Option<ResponseEnvelope>;
}

/// The dispatch engine.
#[derive(Clone)]
pub struct Proxy {
    pub(crate) catalogue: Arc<Catalogue>,
    pub(crate) backend: Arc<Backend>,
    pub(crate) config: ProxyConfig,
    exception_handler: Option<Arc<dyn ExceptionHandler>>,
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("backend", &self.backend.name())
            .field("routes", &self.catalogue.len())
            .field("config", &self.config)
            .field("exception_handler", &self.exception_handler.is_some())
            .finish()
    }
}

impl Proxy {
    /// Start building a proxy.
    #[must_use]
    pub fn builder() -> ProxyBuilder {
        ProxyBuilder::default()
    }

    /// The routing catalogue.
    #[must_use]
    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// The backend this proxy dispatches to.
    #[must_use]
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve one unary request.
    ///
    /// Never fails: every error, including a panic in the backend, becomes
    /// an error response.
    pub async fn proxy_unary(&self, ctx: CallContext, request: RequestEnvelope) -> ResponseEnvelope {
        let request_id = ctx.request_id().to_string();
        tracing::debug!(
            request_id = %request_id,
            verb = %request.verb,
            procedure = %request.procedure,
            "Dispatching unary call"
        );

        let outcome = AssertUnwindSafe(self.dispatch_unary(ctx, &request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(CallError::from_panic(&*panic).into()));

        match outcome {
            Ok(response) => response,
            Err(err) => {
                log_failure(&request_id, &request.procedure, &err);
                err.to_response()
            }
        }
    }

    async fn dispatch_unary(
        &self,
        ctx: CallContext,
        request: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, ProxyError> {
        if let Some(handler) = &self.exception_handler {
            if let Some(response) = handler.handle(&ctx, request).await {
                tracing::debug!(procedure = %request.procedure, "Request answered by exception handler");
                return Ok(response);
            }
        }

        let binding = self.catalogue.resolve(request.verb, &request.procedure)?;
        let Handler::Unary(handler) = binding.handler() else {
            return Err(wrong_shape(binding, "unary"));
        };

        let payload = request_payload(request)?;
        let message = parse_payload(payload.as_deref())?;
        let ctx = self.outbound_context(ctx, &request.headers);

        let value = ctx.run(handler.call(ctx.clone(), message)).await??;
        let payload = encode_unary(&value)?;
        Ok(ResponseEnvelope::ok(payload))
    }

    /// Apply the request id and, if enabled, metadata forwarding.
    pub(crate) fn outbound_context(&self, ctx: CallContext, headers: &MultiMap) -> CallContext {
        let header = self.config.request_id_header.as_str();
        let ctx = match headers.last(header) {
            Some(id) if !id.is_empty() => ctx.with_request_id(id),
            _ => ctx,
        };
        if !self.config.forward_metadata {
            return ctx;
        }
        let mut metadata = headers.clone();
        if metadata.get_all(header).is_empty() {
            metadata.append(header, ctx.request_id());
        }
        ctx.with_metadata(metadata)
    }
}

pub(crate) fn wrong_shape(binding: &MethodBinding, expected: &'static str) -> ProxyError {
    ProxyError::WrongShape {
        procedure: binding.procedure().to_string(),
        expected,
        found: binding.shape(),
    }
}

pub(crate) fn log_failure(request_id: &str, procedure: &str, err: &ProxyError) {
    if err.status_code() >= 500 {
        tracing::warn!(
            request_id = %request_id,
            procedure = %procedure,
            status = err.status_code(),
            error = %err,
            "Call failed"
        );
    } else {
        tracing::debug!(
            request_id = %request_id,
            procedure = %procedure,
            status = err.status_code(),
            error = %err,
            "Call rejected"
        );
    }
}

/// Builder for [`Proxy`].
#[derive(Default)]
pub struct ProxyBuilder {
    backend: Option<Arc<Backend>>,
    interface: Option<ExposedInterface>,
    config: ProxyConfig,
    exception_handler: Option<Arc<dyn ExceptionHandler>>,
}

impl fmt::Debug for ProxyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyBuilder")
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("interface", &self.interface.as_ref().map(ExposedInterface::name))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProxyBuilder {
    /// The backend to dispatch to.
    #[must_use]
    pub fn backend(mut self, backend: impl Into<Arc<Backend>>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// The exposed interface to validate and serve.
    #[must_use]
    pub fn interface(mut self, interface: ExposedInterface) -> Self {
        self.interface = Some(interface);
        self
    }

    /// Replace the configuration.
    #[must_use]
    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    /// Install a unary exception handler.
    #[must_use]
    pub fn exception_handler(mut self, handler: impl ExceptionHandler + 'static) -> Self {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    /// Validate the interface against the backend and build the proxy.
    ///
    /// # Errors
    ///
    /// Returns `SetupError::MissingBackend` or `SetupError::MissingInterface`
    /// if either was not supplied, or the first validation error.
    pub fn build(self) -> Result<Proxy, SetupError> {
        let backend = self.backend.ok_or(SetupError::MissingBackend)?;
        let interface = self.interface.ok_or(SetupError::MissingInterface)?;
        let catalogue = Catalogue::build(&interface, &backend)?;

        tracing::info!(
            interface = %interface.name(),
            backend = %backend.name(),
            routes = catalogue.len(),
            "Proxy catalogue built"
        );

        Ok(Proxy {
            catalogue: Arc::new(catalogue),
            backend,
            config: self.config,
            exception_handler: self.exception_handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use tonic::Status;
    use verbgate_core::Verb;

    use super::*;
    use crate::context::Cancellation;
    use crate::typed::ResponseSink;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Numbers {
        a: i64,
        b: i64,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Sum {
        total: i64,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Empty {}

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Echo {
        request_id: String,
        trace: Vec<String>,
    }

    fn proxy() -> Proxy {
        let backend = Backend::builder("Calc")
            .unary("Add", |_ctx, req: Numbers| async move {
                Ok::<_, Status>(Sum { total: req.a + req.b })
            })
            .unary("Nothing", |_ctx, _req: Numbers| async move { Ok::<_, Status>(Empty {}) })
            .unary("Fail", |_ctx, _req: Numbers| async move {
                Err::<Sum, _>(Status::not_found("no such thing"))
            })
            .unary("Opaque", |_ctx, _req: Numbers| async move {
                Err::<Sum, _>(CallError::Other("disk on fire".into()))
            })
            .unary("Explode", |_ctx, req: Numbers| async move {
                if req.a == 0 {
                    panic!("division by zero");
                }
                Ok::<_, Status>(Sum::default())
            })
            .unary("Whoami", |ctx: CallContext, _req: Numbers| async move {
                Ok::<_, Status>(Echo {
                    request_id: ctx.request_id().to_string(),
                    trace: ctx.metadata().get_all("x-trace").to_vec(),
                })
            })
            .unary("Slow", |_ctx, _req: Numbers| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, Status>(Sum::default())
            })
            .server_streaming("Count", |_ctx, _req: Numbers, _sink: ResponseSink<Sum>| async move {
                Ok::<_, Status>(())
            })
            .build();
        let api = ExposedInterface::builder("CalcApi")
            .unary::<Numbers, Sum>("PostAdd")
            .unary::<Numbers, Sum>("GetAdd")
            .unary::<Numbers, Empty>("GetNothing")
            .unary::<Numbers, Sum>("GetFail")
            .unary::<Numbers, Sum>("GetOpaque")
            .unary::<Numbers, Sum>("GetExplode")
            .unary::<Numbers, Echo>("GetWhoami")
            .unary::<Numbers, Sum>("GetSlow")
            .server_streaming::<Numbers, Sum>("GetCount")
            .build();
        Proxy::builder().backend(backend).interface(api).build().unwrap()
    }

    fn body(res: &ResponseEnvelope) -> Value {
        serde_json::from_slice(res.payload.as_deref().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn unary_decodes_body_and_encodes_response() {
        let req = RequestEnvelope::new(Verb::Post, "Add").with_payload(r#"{"a": 1, "b": 2}"#);
        let res = proxy().proxy_unary(CallContext::new(), req).await;
        assert_eq!(res.status_code, 200);
        assert_eq!(body(&res), json!({"total": 3}));
    }

    #[tokio::test]
    async fn empty_response_has_no_payload() {
        let res = proxy()
            .proxy_unary(CallContext::new(), RequestEnvelope::new(Verb::Get, "Nothing"))
            .await;
        assert_eq!(res.status_code, 200);
        assert_eq!(res.payload, None);
    }

    #[tokio::test]
    async fn backend_status_is_translated() {
        let res = proxy()
            .proxy_unary(CallContext::new(), RequestEnvelope::new(Verb::Get, "Fail"))
            .await;
        assert_eq!(res.status_code, 404);
        assert_eq!(body(&res)["error"]["code"], "not_found");
        assert_eq!(body(&res)["error"]["message"], "no such thing");
    }

    #[tokio::test]
    async fn non_status_backend_error_is_bad_gateway() {
        let res = proxy()
            .proxy_unary(CallContext::new(), RequestEnvelope::new(Verb::Get, "Opaque"))
            .await;
        assert_eq!(res.status_code, 502);
        assert_eq!(body(&res)["error"]["code"], "bad_gateway");
    }

    #[tokio::test]
    async fn panic_is_contained_and_proxy_keeps_serving() {
        let proxy = proxy();
        let res = proxy
            .proxy_unary(CallContext::new(), RequestEnvelope::new(Verb::Get, "Explode"))
            .await;
        assert_eq!(res.status_code, 500);
        assert_eq!(body(&res)["error"]["code"], "internal_error");

        let req = RequestEnvelope::new(Verb::Get, "Explode").with_param("a", "x");
        let res = proxy.proxy_unary(CallContext::new(), req).await;
        assert_eq!(res.status_code, 400);

        let req = RequestEnvelope::new(Verb::Post, "Add").with_payload(r#"{"a": 2, "b": 2}"#);
        let res = proxy.proxy_unary(CallContext::new(), req).await;
        assert_eq!(body(&res), json!({"total": 4}));
    }

    #[tokio::test]
    async fn unknown_route_and_wrong_shape() {
        let proxy = proxy();
        let res = proxy
            .proxy_unary(CallContext::new(), RequestEnvelope::new(Verb::Delete, "Add"))
            .await;
        assert_eq!(res.status_code, 501);

        let res = proxy
            .proxy_unary(CallContext::new(), RequestEnvelope::new(Verb::Get, "Count"))
            .await;
        assert_eq!(res.status_code, 400);
        assert_eq!(body(&res)["error"]["code"], "wrong_shape");
    }

    #[tokio::test]
    async fn malformed_body_is_client_error() {
        let req = RequestEnvelope::new(Verb::Post, "Add").with_payload("{oops");
        let res = proxy().proxy_unary(CallContext::new(), req).await;
        assert_eq!(res.status_code, 400);
        assert_eq!(body(&res)["error"]["code"], "bad_payload");
    }

    #[tokio::test]
    async fn metadata_and_request_id_are_forwarded() {
        let req = RequestEnvelope::new(Verb::Get, "Whoami")
            .with_header("x-request-id", "abc-123")
            .with_header("x-trace", "t1");
        let res = proxy().proxy_unary(CallContext::new(), req).await;
        assert_eq!(body(&res), json!({"request_id": "abc-123", "trace": ["t1"]}));
    }

    #[tokio::test]
    async fn metadata_forwarding_can_be_disabled() {
        let mut proxy = proxy();
        proxy.config.forward_metadata = false;
        let req = RequestEnvelope::new(Verb::Get, "Whoami").with_header("x-trace", "t1");
        let res = proxy.proxy_unary(CallContext::new(), req).await;
        assert_eq!(body(&res)["trace"], json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_times_out_the_call() {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        let ctx = CallContext::new().with_cancellation(Cancellation::never().with_deadline(deadline));
        let res = proxy()
            .proxy_unary(ctx, RequestEnvelope::new(Verb::Get, "Slow"))
            .await;
        assert_eq!(res.status_code, 504);
    }

    struct Maintenance;

    #[async_trait]
    impl ExceptionHandler for Maintenance {
        async fn handle(
            &self,
            _ctx: &CallContext,
            request: &RequestEnvelope,
        ) -> Option<ResponseEnvelope> {
            (request.procedure == "Add").then(|| ResponseEnvelope::with_status(503, None))
        }
    }

    #[tokio::test]
    async fn exception_handler_preempts_dispatch() {
        let backend = Backend::builder("Calc")
            .unary("Add", |_ctx, req: Numbers| async move {
                Ok::<_, Status>(Sum { total: req.a + req.b })
            })
            .build();
        let api = ExposedInterface::builder("CalcApi")
            .unary::<Numbers, Sum>("PostAdd")
            .build();
        let proxy = Proxy::builder()
            .backend(backend)
            .interface(api)
            .exception_handler(Maintenance)
            .build()
            .unwrap();
        let res = proxy
            .proxy_unary(CallContext::new(), RequestEnvelope::new(Verb::Post, "Add"))
            .await;
        assert_eq!(res.status_code, 503);
    }

    #[test]
    fn builder_requires_backend_and_interface() {
        let api = ExposedInterface::builder("Api").build();
        assert_eq!(
            Proxy::builder().interface(api).build().unwrap_err(),
            SetupError::MissingBackend
        );
        assert_eq!(
            Proxy::builder()
                .backend(Backend::builder("Server").build())
                .build()
                .unwrap_err(),
            SetupError::MissingInterface
        );
    }
}
