//! Exposed-method validation.
//!
//! Each exposed method must strip to a backend procedure whose signature
//! classifies into a supported shape and matches the exposed signature kind
//! for kind, position by position. Receivers are excluded from the
//! comparison; they only have to be pointers to structured types.

use verbgate_core::{parse_exposed_name, Verb};

use crate::backend::{Backend, MethodDescriptor, Procedure};
use crate::error::{MismatchReason, SetupError};
use crate::shape::{classify, CallShape};
use crate::signature::{MethodSignature, TypeRef};

/// An exposed method that passed validation.
#[derive(Debug)]
pub struct ValidatedMethod<'a> {
    /// Routing verb.
    pub verb: Verb,
    /// Backend procedure name.
    pub procedure: &'a str,
    /// Shape classified from the backend signature.
    pub shape: CallShape,
    /// The backend procedure.
    pub target: &'a Procedure,
}

/// Validate one exposed method against the backend.
///
/// # Errors
///
/// Returns the first setup error found: a missing verb prefix, a missing
/// backend procedure, an unsupported backend shape or a signature mismatch.
pub fn validate_method<'a>(
    method: &'a MethodDescriptor,
    backend: &'a Backend,
) -> Result<ValidatedMethod<'a>, SetupError> {
    let (verb, procedure) = parse_exposed_name(&method.name)
        .ok_or_else(|| SetupError::InvalidVerbPrefix(method.name.clone()))?;

    let target = backend
        .procedure(procedure)
        .ok_or_else(|| SetupError::MissingMethod(procedure.to_string()))?;

    let shape = classify(target.signature())
        .ok_or_else(|| SetupError::UnsupportedShape(procedure.to_string()))?;

    compare_signatures(&method.signature, target.signature()).map_err(|reason| {
        SetupError::SignatureMismatch {
            exposed: method.name.clone(),
            procedure: procedure.to_string(),
            reason,
        }
    })?;

    Ok(ValidatedMethod {
        verb,
        procedure,
        shape,
        target,
    })
}

/// Compare two signatures structurally, ignoring receivers.
///
/// # Errors
///
/// Returns the first difference found.
pub fn compare_signatures(
    expected: &MethodSignature,
    found: &MethodSignature,
) -> Result<(), MismatchReason> {
    if expected.params.len() < 2 || found.params.len() < 2 {
        return Err(MismatchReason::TooFewArguments {
            expected: expected.params.len(),
            found: found.params.len(),
        });
    }
    if !expected.params[0].is_struct_ptr() || !found.params[0].is_struct_ptr() {
        return Err(MismatchReason::NoReceiver);
    }
    kinds_match("argument", &expected.params[1..], &found.params[1..])?;
    kinds_match("return", &expected.returns, &found.returns)
}

fn kinds_match(
    list: &'static str,
    expected: &[TypeRef],
    found: &[TypeRef],
) -> Result<(), MismatchReason> {
    if expected.len() != found.len() {
        return Err(MismatchReason::LengthMismatch {
            list,
            expected: expected.len(),
            found: found.len(),
        });
    }
    match expected
        .iter()
        .zip(found)
        .position(|(e, f)| e.kind != f.kind)
    {
        Some(position) => Err(MismatchReason::KindMismatch {
            list,
            position,
            expected: expected[position].kind,
            found: found[position].kind,
        }),
        None => Ok(()),
    }
}
