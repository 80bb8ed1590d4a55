//! Backend registration.
//!
//! A [`Backend`] is a named table of procedures. Each procedure carries its
//! structural [`MethodSignature`] and a type-erased [`Handler`] whose variant
//! says which call shape it can serve. The typed helpers on
//! [`BackendBuilder`] generate both from ordinary async functions over serde
//! types; [`Procedure::new`] registers hand-built handlers.
//!
//! The [`ExposedInterface`] is the operator's declaration of which
//! procedures are reachable and under which verb.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::context::CallContext;
use crate::error::CallError;
use crate::shape::CallShape;
use crate::signature::{short_type_name, MethodSignature, TypeRef};
use crate::typed::{
    RequestStream, ResponseSink, TypedBidiStream, TypedClientStream, TypedServerStream,
    TypedUnary,
};

// =============================================================================
// Backend stream halves
// =============================================================================

/// Receiving half of a backend stream.
#[async_trait]
pub trait MessageSource: Send {
    /// Next message, or `None` once the backend has finished sending.
    async fn recv(&mut self) -> Result<Option<Value>, CallError>;
}

/// Sending half of a backend stream.
#[async_trait]
pub trait MessageSink: Send {
    /// Forward one message to the backend.
    ///
    /// Returns `CallError::StreamClosed` once the backend stopped reading.
    async fn send(&mut self, message: Value) -> Result<(), CallError>;

    /// Half-close: tell the backend no more messages will arrive.
    async fn close_send(&mut self) -> Result<(), CallError>;
}

/// An open client-streaming call.
#[async_trait]
pub trait ClientStreamCall: Send {
    /// Forward one message to the backend.
    ///
    /// Returns `CallError::StreamClosed` once the backend stopped reading.
    async fn send(&mut self, message: Value) -> Result<(), CallError>;

    /// Half-close and wait for the single response.
    async fn close_and_recv(self: Box<Self>) -> Result<Value, CallError>;
}

/// Both halves of an open bidirectional call.
pub struct BidiCall {
    /// Messages towards the backend.
    pub sink: Box<dyn MessageSink>,
    /// Messages from the backend.
    pub source: Box<dyn MessageSource>,
}

impl fmt::Debug for BidiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BidiCall").finish_non_exhaustive()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// One request, one response.
#[async_trait]
pub trait UnaryHandler: Send + Sync {
    /// Invoke the procedure.
    async fn call(&self, ctx: CallContext, request: Value) -> Result<Value, CallError>;
}

/// One request, many responses.
#[async_trait]
pub trait ServerStreamHandler: Send + Sync {
    /// Invoke the procedure and return the response stream.
    async fn open(
        &self,
        ctx: CallContext,
        request: Value,
    ) -> Result<Box<dyn MessageSource>, CallError>;
}

/// Many requests, one response.
#[async_trait]
pub trait ClientStreamHandler: Send + Sync {
    /// Open the call.
    async fn open(&self, ctx: CallContext) -> Result<Box<dyn ClientStreamCall>, CallError>;
}

/// Many requests and many responses.
#[async_trait]
pub trait BidiStreamHandler: Send + Sync {
    /// Open the call.
    async fn open(&self, ctx: CallContext) -> Result<BidiCall, CallError>;
}

/// A type-erased procedure implementation, tagged by call shape.
#[derive(Clone)]
pub enum Handler {
    /// Unary handler.
    Unary(Arc<dyn UnaryHandler>),
    /// Server-streaming handler.
    ServerStream(Arc<dyn ServerStreamHandler>),
    /// Client-streaming handler.
    ClientStream(Arc<dyn ClientStreamHandler>),
    /// Bidirectional handler.
    BidiStream(Arc<dyn BidiStreamHandler>),
}

impl Handler {
    /// The call shape this handler serves.
    #[must_use]
    pub const fn shape(&self) -> CallShape {
        match self {
            Self::Unary(_) => CallShape::Unary,
            Self::ServerStream(_) => CallShape::ServerStream,
            Self::ClientStream(_) => CallShape::ClientStream,
            Self::BidiStream(_) => CallShape::BidiStream,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({})", self.shape())
    }
}

// =============================================================================
// Backend
// =============================================================================

/// A named backend procedure.
#[derive(Debug, Clone)]
pub struct Procedure {
    name: String,
    signature: MethodSignature,
    handler: Handler,
}

impl Procedure {
    /// Create a procedure from a hand-built signature and handler.
    #[must_use]
    pub fn new(name: impl Into<String>, signature: MethodSignature, handler: Handler) -> Self {
        Self {
            name: name.into(),
            signature,
            handler,
        }
    }

    /// Procedure name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Structural signature, receiver first.
    #[must_use]
    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// The handler.
    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

/// The real implementation object behind the gateway.
///
/// Owned by whoever builds the gateway; the gateway only reads it.
#[derive(Debug, Clone)]
pub struct Backend {
    name: String,
    receiver: TypeRef,
    procedures: BTreeMap<String, Procedure>,
}

impl Backend {
    /// Start building a backend.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> BackendBuilder {
        let name = name.into();
        BackendBuilder {
            receiver: TypeRef::message(name.clone()),
            name,
            procedures: BTreeMap::new(),
        }
    }

    /// Backend name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receiver type shared by every procedure.
    #[must_use]
    pub fn receiver(&self) -> &TypeRef {
        &self.receiver
    }

    /// Look up a procedure by name.
    #[must_use]
    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures.get(name)
    }

    /// All procedures, ordered by name.
    pub fn procedures(&self) -> impl Iterator<Item = &Procedure> {
        self.procedures.values()
    }
}

/// Builder for [`Backend`].
#[derive(Debug)]
pub struct BackendBuilder {
    name: String,
    receiver: TypeRef,
    procedures: BTreeMap<String, Procedure>,
}

impl BackendBuilder {
    /// Override the receiver type used by the typed helpers.
    #[must_use]
    pub fn receiver(mut self, receiver: TypeRef) -> Self {
        self.receiver = receiver;
        self
    }

    /// Register a procedure. A later registration with the same name
    /// replaces the earlier one.
    #[must_use]
    pub fn procedure(mut self, procedure: Procedure) -> Self {
        self.procedures.insert(procedure.name.clone(), procedure);
        self
    }

    /// Register a unary procedure.
    #[must_use]
    pub fn unary<Req, Res, E, F, Fut>(self, name: &str, f: F) -> Self
    where
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, E>> + Send + 'static,
        Req: DeserializeOwned + Serialize + Default + Send + 'static,
        Res: Serialize + Send + 'static,
        E: Into<CallError> + Send + 'static,
    {
        let signature = MethodSignature::unary(
            &self.receiver,
            short_type_name::<Req>(),
            short_type_name::<Res>(),
        );
        let handler = Handler::Unary(Arc::new(TypedUnary::new(f)));
        self.procedure(Procedure::new(name, signature, handler))
    }

    /// Register a server-streaming procedure.
    #[must_use]
    pub fn server_streaming<Req, Res, E, F, Fut>(self, name: &str, f: F) -> Self
    where
        F: Fn(CallContext, Req, ResponseSink<Res>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        Req: DeserializeOwned + Serialize + Default + Send + 'static,
        Res: Serialize + Send + 'static,
        E: Into<CallError> + Send + 'static,
    {
        let signature = MethodSignature::server_streaming(
            &self.receiver,
            name,
            short_type_name::<Req>(),
            short_type_name::<Res>(),
        );
        let handler = Handler::ServerStream(Arc::new(TypedServerStream::new(f)));
        self.procedure(Procedure::new(name, signature, handler))
    }

    /// Register a client-streaming procedure.
    #[must_use]
    pub fn client_streaming<Req, Res, E, F, Fut>(self, name: &str, f: F) -> Self
    where
        F: Fn(CallContext, RequestStream<Req>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, E>> + Send + 'static,
        Req: DeserializeOwned + Serialize + Default + Send + 'static,
        Res: Serialize + Send + 'static,
        E: Into<CallError> + Send + 'static,
    {
        let signature = MethodSignature::client_streaming(
            &self.receiver,
            name,
            short_type_name::<Req>(),
            short_type_name::<Res>(),
        );
        let handler = Handler::ClientStream(Arc::new(TypedClientStream::new(f)));
        self.procedure(Procedure::new(name, signature, handler))
    }

    /// Register a bidirectional procedure.
    #[must_use]
    pub fn bidi_streaming<Req, Res, E, F, Fut>(self, name: &str, f: F) -> Self
    where
        F: Fn(CallContext, RequestStream<Req>, ResponseSink<Res>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        Req: DeserializeOwned + Serialize + Default + Send + 'static,
        Res: Serialize + Send + 'static,
        E: Into<CallError> + Send + 'static,
    {
        let signature = MethodSignature::bidi_streaming(
            &self.receiver,
            name,
            short_type_name::<Req>(),
            short_type_name::<Res>(),
        );
        let handler = Handler::BidiStream(Arc::new(TypedBidiStream::new(f)));
        self.procedure(Procedure::new(name, signature, handler))
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Backend {
        Backend {
            name: self.name,
            receiver: self.receiver,
            procedures: self.procedures,
        }
    }
}

// =============================================================================
// Exposed interface
// =============================================================================

/// One exposed method: a verb-prefixed name and its structural signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Verb-prefixed name, e.g. `PostUploadPhoto`.
    pub name: String,
    /// Structural signature, receiver first.
    pub signature: MethodSignature,
}

impl MethodDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, signature: MethodSignature) -> Self {
        Self {
            name: name.into(),
            signature,
        }
    }
}

/// The externally reachable subset of a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedInterface {
    name: String,
    methods: Vec<MethodDescriptor>,
}

impl ExposedInterface {
    /// Start building an interface.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> InterfaceBuilder {
        let name = name.into();
        InterfaceBuilder {
            receiver: TypeRef::message(name.clone()),
            name,
            methods: Vec::new(),
        }
    }

    /// Interface name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared methods, in declaration order.
    #[must_use]
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }
}

/// Builder for [`ExposedInterface`].
#[derive(Debug)]
pub struct InterfaceBuilder {
    name: String,
    receiver: TypeRef,
    methods: Vec<MethodDescriptor>,
}

impl InterfaceBuilder {
    /// Declare a method with a hand-built signature.
    #[must_use]
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    /// Declare a unary method.
    #[must_use]
    pub fn unary<Req, Res>(self, name: &str) -> Self {
        let signature = MethodSignature::unary(
            &self.receiver,
            short_type_name::<Req>(),
            short_type_name::<Res>(),
        );
        self.method(MethodDescriptor::new(name, signature))
    }

    /// Declare a server-streaming method.
    #[must_use]
    pub fn server_streaming<Req, Res>(self, name: &str) -> Self {
        let signature = MethodSignature::server_streaming(
            &self.receiver,
            name,
            short_type_name::<Req>(),
            short_type_name::<Res>(),
        );
        self.method(MethodDescriptor::new(name, signature))
    }

    /// Declare a client-streaming method.
    #[must_use]
    pub fn client_streaming<Req, Res>(self, name: &str) -> Self {
        let signature = MethodSignature::client_streaming(
            &self.receiver,
            name,
            short_type_name::<Req>(),
            short_type_name::<Res>(),
        );
        self.method(MethodDescriptor::new(name, signature))
    }

    /// Declare a bidirectional method.
    #[must_use]
    pub fn bidi_streaming<Req, Res>(self, name: &str) -> Self {
        let signature = MethodSignature::bidi_streaming(
            &self.receiver,
            name,
            short_type_name::<Req>(),
            short_type_name::<Res>(),
        );
        self.method(MethodDescriptor::new(name, signature))
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> ExposedInterface {
        ExposedInterface {
            name: self.name,
            methods: self.methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Ping {
        n: i64,
    }

    #[test]
    fn typed_helpers_tag_handlers_by_shape() {
        let backend = Backend::builder("Echo")
            .unary("Ping", |_ctx, req: Ping| async move { Ok::<_, CallError>(req) })
            .server_streaming("Many", |_ctx, _req: Ping, _sink: ResponseSink<Ping>| async move {
                Ok::<_, CallError>(())
            })
            .build();

        let ping = backend.procedure("Ping").unwrap();
        assert_eq!(ping.handler().shape(), CallShape::Unary);
        assert_eq!(ping.signature().params[2].name, "*Ping");
        assert_eq!(backend.receiver().name, "*Echo");

        let many = backend.procedure("Many").unwrap();
        assert_eq!(many.handler().shape(), CallShape::ServerStream);
        assert!(backend.procedure("Missing").is_none());
    }

    #[test]
    fn interface_keeps_declaration_order() {
        let api = ExposedInterface::builder("EchoApi")
            .unary::<Ping, Ping>("GetPing")
            .bidi_streaming::<Ping, Ping>("PostChat")
            .build();
        let names: Vec<_> = api.methods().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["GetPing", "PostChat"]);
        assert_eq!(api.methods()[0].signature.params[0].name, "*EchoApi");
    }
}
