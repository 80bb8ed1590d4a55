//! Structural method signatures.
//!
//! The gateway never sees generated bindings for the backend, so every
//! procedure is described by a structural signature: an ordered parameter
//! list (receiver first) and an ordered return list. Types are described by
//! their kind and, for interfaces and pointers, their method sets. The predicates
//! in this module are duck-typed: a type "is a context" if it has the
//! context method set, whatever its name.

use std::fmt;

/// Structural kind of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// `bool`
    Bool,
    /// `int`
    Int,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `uint`
    Uint,
    /// `uint32`
    Uint32,
    /// `uint64`
    Uint64,
    /// `float32`
    Float32,
    /// `float64`
    Float64,
    /// `string`
    String,
    /// Byte slice.
    Bytes,
    /// Pointer-like handle.
    Ptr,
    /// Structured value.
    Struct,
    /// Method-set only type.
    Interface,
    /// Sequence.
    Slice,
    /// Key/value map.
    Map,
    /// Callable.
    Func,
    /// Channel.
    Chan,
}

impl Kind {
    /// Lowercase kind name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint => "uint",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Ptr => "ptr",
            Self::Struct => "struct",
            Self::Interface => "interface",
            Self::Slice => "slice",
            Self::Map => "map",
            Self::Func => "func",
            Self::Chan => "chan",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural type description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// Display name, e.g. `*RandomRequest`.
    pub name: String,
    /// Structural kind.
    pub kind: Kind,
    /// Pointee for `Ptr`, element for `Slice`.
    pub elem: Option<Box<TypeRef>>,
    /// Method set.
    pub methods: Vec<MethodSpec>,
}

/// A named method in a type's method set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpec {
    /// Method name.
    pub name: String,
    /// Parameters, excluding the receiver.
    pub params: Vec<TypeRef>,
    /// Return values.
    pub returns: Vec<TypeRef>,
}

impl MethodSpec {
    /// Create a method description.
    #[must_use]
    pub fn new(name: impl Into<String>, params: Vec<TypeRef>, returns: Vec<TypeRef>) -> Self {
        Self {
            name: name.into(),
            params,
            returns,
        }
    }
}

impl TypeRef {
    /// A scalar or otherwise method-less type of the given kind.
    #[must_use]
    pub fn scalar(kind: Kind) -> Self {
        Self {
            name: kind.as_str().to_string(),
            kind,
            elem: None,
            methods: Vec::new(),
        }
    }

    /// A named structured type.
    #[must_use]
    pub fn structure(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Kind::Struct,
            elem: None,
            methods: Vec::new(),
        }
    }

    /// A pointer to `elem`.
    #[must_use]
    pub fn pointer(elem: Self) -> Self {
        Self {
            name: format!("*{}", elem.name),
            kind: Kind::Ptr,
            elem: Some(Box::new(elem)),
            methods: Vec::new(),
        }
    }

    /// A pointer to a named structured type; the usual message shape.
    #[must_use]
    pub fn message(name: impl Into<String>) -> Self {
        Self::pointer(Self::structure(name))
    }

    /// An interface with the given method set.
    #[must_use]
    pub fn interface(name: impl Into<String>, methods: Vec<MethodSpec>) -> Self {
        Self {
            name: name.into(),
            kind: Kind::Interface,
            elem: None,
            methods,
        }
    }

    /// Attach extra methods to this type's method set.
    #[must_use]
    pub fn with_methods(mut self, methods: impl IntoIterator<Item = MethodSpec>) -> Self {
        self.methods.extend(methods);
        self
    }

    /// The `error` interface.
    #[must_use]
    pub fn error() -> Self {
        Self::interface(
            "error",
            vec![MethodSpec::new(
                "Error",
                vec![],
                vec![Self::scalar(Kind::String)],
            )],
        )
    }

    /// A cancellation/deadline context.
    #[must_use]
    pub fn context() -> Self {
        Self::interface(
            "context.Context",
            vec![
                MethodSpec::new(
                    "Deadline",
                    vec![],
                    vec![Self::structure("time.Time"), Self::scalar(Kind::Bool)],
                ),
                MethodSpec::new(
                    "Done",
                    vec![],
                    vec![Self::scalar(Kind::Chan).named("<-chan struct{}")],
                ),
                MethodSpec::new("Err", vec![], vec![Self::error()]),
                MethodSpec::new(
                    "Value",
                    vec![Self::interface("any", vec![])],
                    vec![Self::interface("any", vec![])],
                ),
            ],
        )
    }

    /// An RPC stream interface with the common stream methods plus `extra`.
    #[must_use]
    pub fn stream(name: impl Into<String>, extra: impl IntoIterator<Item = MethodSpec>) -> Self {
        let any = || Self::interface("any", vec![]);
        let mut methods = vec![
            MethodSpec::new("Context", vec![], vec![Self::context()]),
            MethodSpec::new("SendMsg", vec![any()], vec![Self::error()]),
            MethodSpec::new("RecvMsg", vec![any()], vec![Self::error()]),
        ];
        methods.extend(extra);
        Self::interface(name, methods)
    }

    /// `Send(*msg) error`
    #[must_use]
    pub fn send_method(message: &str) -> MethodSpec {
        MethodSpec::new("Send", vec![Self::message(message)], vec![Self::error()])
    }

    /// `Recv() (*msg, error)`
    #[must_use]
    pub fn recv_method(message: &str) -> MethodSpec {
        MethodSpec::new(
            "Recv",
            vec![],
            vec![Self::message(message), Self::error()],
        )
    }

    /// `SendAndClose(*msg) error`
    #[must_use]
    pub fn send_and_close_method(message: &str) -> MethodSpec {
        MethodSpec::new(
            "SendAndClose",
            vec![Self::message(message)],
            vec![Self::error()],
        )
    }

    /// Rename this type, keeping its structure.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Look up a method by name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|m| m.name == name)
    }

    fn has_method(&self, name: &str) -> bool {
        self.method(name).is_some()
    }

    /// True if this is a pointer chain that resolves to a structured type.
    #[must_use]
    pub fn is_struct_ptr(&self) -> bool {
        let mut current = self;
        while current.kind == Kind::Ptr {
            match current.elem.as_deref() {
                Some(elem) if elem.kind == Kind::Struct => return true,
                Some(elem) => current = elem,
                None => return false,
            }
        }
        false
    }

    /// True if the method set carries the cancellation/deadline capability.
    #[must_use]
    pub fn is_context(&self) -> bool {
        ["Deadline", "Done", "Err", "Value"]
            .iter()
            .all(|name| self.has_method(name))
    }

    /// True if this type behaves as an error value.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.method("Error").is_some_and(|m| {
            m.params.is_empty() && m.returns.len() == 1 && m.returns[0].kind == Kind::String
        })
    }

    /// True if the method set carries the common RPC stream methods.
    #[must_use]
    pub fn is_stream(&self) -> bool {
        ["Context", "SendMsg", "RecvMsg"]
            .iter()
            .all(|name| self.has_method(name))
    }

    /// Stream with `Send(*T) error`.
    #[must_use]
    pub fn is_out_stream(&self) -> bool {
        self.is_stream()
            && self.method("Send").is_some_and(|m| {
                m.params.len() == 1
                    && m.returns.len() == 1
                    && m.params[0].is_struct_ptr()
                    && m.returns[0].is_error()
            })
    }

    /// Stream with `Recv() (*T, error)`.
    #[must_use]
    pub fn is_in_stream(&self) -> bool {
        self.is_stream()
            && self.method("Recv").is_some_and(|m| {
                m.params.is_empty()
                    && m.returns.len() == 2
                    && m.returns[0].is_struct_ptr()
                    && m.returns[1].is_error()
            })
    }

    /// Has the terminal `SendAndClose(*T) error` capability.
    #[must_use]
    pub fn has_send_and_close(&self) -> bool {
        self.method("SendAndClose").is_some_and(|m| {
            m.params.len() == 1
                && m.returns.len() == 1
                && m.params[0].is_struct_ptr()
                && m.returns[0].is_error()
        })
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The structural signature of a method, receiver first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// Parameters; position 0 is the receiver.
    pub params: Vec<TypeRef>,
    /// Return values.
    pub returns: Vec<TypeRef>,
}

impl MethodSignature {
    /// Create a signature.
    #[must_use]
    pub fn new(params: Vec<TypeRef>, returns: Vec<TypeRef>) -> Self {
        Self { params, returns }
    }

    /// `(ctx, *Req) (*Res, error)`
    #[must_use]
    pub fn unary(receiver: &TypeRef, request: &str, response: &str) -> Self {
        Self::new(
            vec![receiver.clone(), TypeRef::context(), TypeRef::message(request)],
            vec![TypeRef::message(response), TypeRef::error()],
        )
    }

    /// `(*Req, stream{Send(*Res)}) error`
    #[must_use]
    pub fn server_streaming(receiver: &TypeRef, procedure: &str, request: &str, response: &str) -> Self {
        let stream = TypeRef::stream(
            format!("{}_{procedure}Server", receiver_base(receiver)),
            [TypeRef::send_method(response)],
        );
        Self::new(
            vec![receiver.clone(), TypeRef::message(request), stream],
            vec![TypeRef::error()],
        )
    }

    /// `(stream{Recv() *Req, SendAndClose(*Res)}) error`
    #[must_use]
    pub fn client_streaming(receiver: &TypeRef, procedure: &str, request: &str, response: &str) -> Self {
        let stream = TypeRef::stream(
            format!("{}_{procedure}Server", receiver_base(receiver)),
            [
                TypeRef::recv_method(request),
                TypeRef::send_and_close_method(response),
            ],
        );
        Self::new(vec![receiver.clone(), stream], vec![TypeRef::error()])
    }

    /// `(stream{Recv() *Req, Send(*Res)}) error`
    #[must_use]
    pub fn bidi_streaming(receiver: &TypeRef, procedure: &str, request: &str, response: &str) -> Self {
        let stream = TypeRef::stream(
            format!("{}_{procedure}Server", receiver_base(receiver)),
            [TypeRef::recv_method(request), TypeRef::send_method(response)],
        );
        Self::new(vec![receiver.clone(), stream], vec![TypeRef::error()])
    }
}

fn receiver_base(receiver: &TypeRef) -> &str {
    receiver.name.trim_start_matches('*')
}

/// The last path segment of a Rust type name, without generics.
#[must_use]
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_ptr_predicate() {
        assert!(TypeRef::message("Req").is_struct_ptr());
        assert!(TypeRef::pointer(TypeRef::message("Req")).is_struct_ptr());
        assert!(!TypeRef::structure("Req").is_struct_ptr());
        assert!(!TypeRef::pointer(TypeRef::scalar(Kind::Int)).is_struct_ptr());
        assert!(!TypeRef::scalar(Kind::Ptr).is_struct_ptr());
    }

    #[test]
    fn context_and_error_predicates_are_structural() {
        assert!(TypeRef::context().is_context());
        assert!(TypeRef::context().named("myctx").is_context());
        assert!(!TypeRef::error().is_context());
        assert!(TypeRef::error().is_error());
        assert!(!TypeRef::scalar(Kind::String).is_error());
    }

    #[test]
    fn stream_capabilities() {
        let out = TypeRef::stream("Out", [TypeRef::send_method("Res")]);
        assert!(out.is_out_stream());
        assert!(!out.is_in_stream());

        let client = TypeRef::stream(
            "In",
            [TypeRef::recv_method("Req"), TypeRef::send_and_close_method("Res")],
        );
        assert!(client.is_in_stream());
        assert!(client.has_send_and_close());
        assert!(!client.is_out_stream());

        let bare = TypeRef::interface("Bare", vec![TypeRef::send_method("Res")]);
        assert!(!bare.is_out_stream());
    }

    #[test]
    fn short_names() {
        assert_eq!(short_type_name::<String>(), "String");
        assert_eq!(short_type_name::<Vec<u8>>(), "Vec");
    }
}
