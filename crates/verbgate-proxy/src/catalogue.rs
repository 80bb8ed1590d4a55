//! The routing catalogue.
//!
//! Built once from the exposed interface and the backend, then shared
//! read-only. Construction is all-or-nothing: any invalid method aborts the
//! whole build.

use std::collections::HashMap;

use verbgate_core::Verb;

use crate::backend::{Backend, ExposedInterface, Handler};
use crate::error::{ProxyError, SetupError};
use crate::shape::CallShape;
use crate::validate::validate_method;

/// A resolved route.
#[derive(Debug, Clone)]
pub struct MethodBinding {
    verb: Verb,
    procedure: String,
    shape: CallShape,
    handler: Handler,
}

impl MethodBinding {
    /// Routing verb.
    #[must_use]
    pub const fn verb(&self) -> Verb {
        self.verb
    }

    /// Backend procedure name.
    #[must_use]
    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    /// Call shape.
    #[must_use]
    pub const fn shape(&self) -> CallShape {
        self.shape
    }

    /// Backend handler.
    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

/// Immutable routing table from `(verb, procedure)` to binding.
#[derive(Debug, Default)]
pub struct Catalogue {
    routes: HashMap<Verb, HashMap<String, MethodBinding>>,
}

impl Catalogue {
    /// Validate every exposed method and bind it.
    ///
    /// # Errors
    ///
    /// Returns the first setup error. Besides validation failures, two
    /// methods resolving to the same route and a handler whose shape
    /// disagrees with the classified signature are rejected.
    pub fn build(interface: &ExposedInterface, backend: &Backend) -> Result<Self, SetupError> {
        let mut routes: HashMap<Verb, HashMap<String, MethodBinding>> = HashMap::new();

        for method in interface.methods() {
            let validated = validate_method(method, backend)?;
            let handler = validated.target.handler();

            if handler.shape() != validated.shape {
                return Err(SetupError::HandlerMismatch {
                    procedure: validated.procedure.to_string(),
                    shape: validated.shape,
                    handler: handler.shape(),
                });
            }

            let bucket = routes.entry(validated.verb).or_default();
            if bucket.contains_key(validated.procedure) {
                return Err(SetupError::DuplicateRoute {
                    verb: validated.verb,
                    procedure: validated.procedure.to_string(),
                });
            }

            tracing::debug!(
                verb = %validated.verb,
                procedure = validated.procedure,
                shape = %validated.shape,
                "Bound exposed method"
            );

            bucket.insert(
                validated.procedure.to_string(),
                MethodBinding {
                    verb: validated.verb,
                    procedure: validated.procedure.to_string(),
                    shape: validated.shape,
                    handler: handler.clone(),
                },
            );
        }

        Ok(Self { routes })
    }

    /// Look up the binding for a routing key.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::RouteNotFound` if nothing is bound.
    pub fn resolve(&self, verb: Verb, procedure: &str) -> Result<&MethodBinding, ProxyError> {
        self.routes
            .get(&verb)
            .and_then(|bucket| bucket.get(procedure))
            .ok_or_else(|| ProxyError::RouteNotFound {
                verb,
                procedure: procedure.to_string(),
            })
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All bindings, in no particular order.
    pub fn bindings(&self) -> impl Iterator<Item = &MethodBinding> {
        self.routes.values().flat_map(HashMap::values)
    }
}
