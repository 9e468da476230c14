//! Parameter validation against binding type schemas
//!
//! `validate_parameters` reports every violation without failing, for advisory
//! callers. `resolve_parameters` is the strict form used when constructing a
//! binding: it fails on the first violation and fills unset optional
//! parameters with the type's defaults.

use crate::errors::{DiscoveryError, Result};
use crate::types::{BindingType, Parameters};
use std::sync::Arc;

/// A single mismatch between supplied parameters and a type's schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterViolation {
    NoSuchParameter { name: Arc<str> },
    MissingParameter { name: Arc<str> },
}

impl ParameterViolation {
    pub fn name(&self) -> &str {
        match self {
            ParameterViolation::NoSuchParameter { name }
            | ParameterViolation::MissingParameter { name } => name,
        }
    }

    fn into_error(self, binding_type: &BindingType) -> DiscoveryError {
        let type_name = binding_type.name().to_string();
        match self {
            ParameterViolation::NoSuchParameter { name } => DiscoveryError::NoSuchParameter {
                parameter: name.to_string(),
                type_name,
            },
            ParameterViolation::MissingParameter { name } => DiscoveryError::MissingParameter {
                parameter: name.to_string(),
                type_name,
            },
        }
    }
}

/// List every violation of `parameters` against `binding_type`
///
/// Unknown parameters come first (in supplied-name order), followed by missing
/// required parameters (in declared-name order).
pub fn validate_parameters(
    parameters: &Parameters,
    binding_type: &BindingType,
) -> Vec<ParameterViolation> {
    let mut violations = Vec::new();

    for name in parameters.keys() {
        if !binding_type.has_parameter(name) {
            violations.push(ParameterViolation::NoSuchParameter { name: name.clone() });
        }
    }

    for declared in binding_type.parameters() {
        if declared.is_required() && !parameters.contains_key(declared.name().as_ref()) {
            violations.push(ParameterViolation::MissingParameter {
                name: declared.name().clone(),
            });
        }
    }

    violations
}

/// Validate and complete `parameters`, failing on the first violation
pub fn resolve_parameters(parameters: Parameters, binding_type: &BindingType) -> Result<Parameters> {
    if let Some(violation) = validate_parameters(&parameters, binding_type)
        .into_iter()
        .next()
    {
        return Err(violation.into_error(binding_type));
    }

    Ok(fill_defaults(parameters, binding_type))
}

/// Complete `parameters` with defaults when every name is declared on the type
///
/// Returns `None` if a supplied name is unknown. Missing required parameters are
/// left absent, so the result never equals a fully resolved binding parameter map
/// in that case.
pub fn complete_parameters(parameters: &Parameters, binding_type: &BindingType) -> Option<Parameters> {
    if parameters.keys().any(|name| !binding_type.has_parameter(name)) {
        return None;
    }
    Some(fill_defaults(parameters.clone(), binding_type))
}

fn fill_defaults(mut parameters: Parameters, binding_type: &BindingType) -> Parameters {
    for declared in binding_type.parameters() {
        if declared.is_optional() && !parameters.contains_key(declared.name().as_ref()) {
            parameters.insert(declared.name().clone(), declared.default_value().clone());
        }
    }
    parameters
}
