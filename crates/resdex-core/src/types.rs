//! Binding types and their parameter schemas
//!
//! This module provides:
//! - `ParamValue`, the dynamically typed value carried by binding parameters
//! - `BindingParameter`, one declared parameter (required or optional with default)
//! - `BindingType`, a named schema with parameters kept sorted by name
//!
//! Types are immutable once built and shared between bindings through `Arc`.

use crate::errors::{DiscoveryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Resolved parameter values of a binding, sorted by parameter name
pub type Parameters = BTreeMap<Arc<str>, ParamValue>;

// =============================================================================
// PARAM VALUE
// =============================================================================

/// Value of a binding parameter
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a command-line style value: JSON when it parses, a plain string otherwise
    pub fn parse_lenient(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|_| ParamValue::Str(Arc::from(raw)))
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Str(s) => write!(f, "{}", s),
            other => match serde_json::to_string(other) {
                Ok(json) => write!(f, "{}", json),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(Arc::from(value))
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(Arc::from(value))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

/// Check that a type or parameter name starts with a letter
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(DiscoveryError::InvalidName(name.to_string()))
    }
}

// =============================================================================
// BINDING PARAMETER
// =============================================================================

/// A parameter declared by a binding type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParameterRecord", into = "ParameterRecord")]
pub struct BindingParameter {
    name: Arc<str>,
    required: bool,
    default: ParamValue,
}

impl BindingParameter {
    /// Build a parameter, rejecting required parameters that carry a default
    pub fn new(name: impl Into<Arc<str>>, required: bool, default: ParamValue) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        if required && !default.is_null() {
            return Err(DiscoveryError::InvalidParameter {
                parameter: name.to_string(),
                reason: "required parameters must not have a default value".to_string(),
            });
        }
        Ok(BindingParameter {
            name,
            required,
            default,
        })
    }

    pub fn required(name: impl Into<Arc<str>>) -> Result<Self> {
        Self::new(name, true, ParamValue::Null)
    }

    pub fn optional(name: impl Into<Arc<str>>) -> Result<Self> {
        Self::new(name, false, ParamValue::Null)
    }

    pub fn optional_with_default(
        name: impl Into<Arc<str>>,
        default: impl Into<ParamValue>,
    ) -> Result<Self> {
        Self::new(name, false, default.into())
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_optional(&self) -> bool {
        !self.required
    }

    pub fn default_value(&self) -> &ParamValue {
        &self.default
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct ParameterRecord {
    name: String,
    #[serde(default)]
    required: bool,
    #[serde(default, skip_serializing_if = "ParamValue::is_null")]
    default: ParamValue,
}

impl TryFrom<ParameterRecord> for BindingParameter {
    type Error = DiscoveryError;

    fn try_from(record: ParameterRecord) -> Result<Self> {
        BindingParameter::new(record.name, record.required, record.default)
    }
}

impl From<BindingParameter> for ParameterRecord {
    fn from(parameter: BindingParameter) -> Self {
        ParameterRecord {
            name: parameter.name.to_string(),
            required: parameter.required,
            default: parameter.default,
        }
    }
}

// =============================================================================
// BINDING TYPE
// =============================================================================

/// Named schema that bindings are validated against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TypeRecord", into = "TypeRecord")]
pub struct BindingType {
    name: Arc<str>,
    parameters: BTreeMap<Arc<str>, BindingParameter>,
}

impl BindingType {
    pub fn new(
        name: impl Into<Arc<str>>,
        parameters: impl IntoIterator<Item = BindingParameter>,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;

        let mut by_name = BTreeMap::new();
        for parameter in parameters {
            let key = parameter.name.clone();
            if by_name.insert(key.clone(), parameter).is_some() {
                return Err(DiscoveryError::InvalidParameter {
                    parameter: key.to_string(),
                    reason: format!("declared twice on type '{}'", name),
                });
            }
        }

        Ok(BindingType {
            name,
            parameters: by_name,
        })
    }

    /// A type without parameters
    pub fn named(name: impl Into<Arc<str>>) -> Result<Self> {
        Self::new(name, std::iter::empty())
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Declared parameters in name order
    pub fn parameters(&self) -> impl Iterator<Item = &BindingParameter> {
        self.parameters.values()
    }

    pub fn parameter(&self, name: &str) -> Result<&BindingParameter> {
        self.parameters
            .get(name)
            .ok_or_else(|| DiscoveryError::NoSuchParameter {
                parameter: name.to_string(),
                type_name: self.name.to_string(),
            })
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }

    pub fn has_required_parameters(&self) -> bool {
        self.parameters.values().any(BindingParameter::is_required)
    }

    pub fn has_optional_parameters(&self) -> bool {
        self.parameters.values().any(BindingParameter::is_optional)
    }

    /// Default values of the optional parameters
    pub fn parameter_values(&self) -> Parameters {
        self.parameters
            .values()
            .filter(|p| p.is_optional())
            .map(|p| (p.name.clone(), p.default.clone()))
            .collect()
    }

    /// Default value of one parameter (`Null` for required parameters)
    pub fn parameter_value(&self, name: &str) -> Result<&ParamValue> {
        self.parameter(name).map(BindingParameter::default_value)
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct TypeRecord {
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    parameters: Vec<BindingParameter>,
}

impl TryFrom<TypeRecord> for BindingType {
    type Error = DiscoveryError;

    fn try_from(record: TypeRecord) -> Result<Self> {
        BindingType::new(record.name, record.parameters)
    }
}

impl From<BindingType> for TypeRecord {
    fn from(binding_type: BindingType) -> Self {
        TypeRecord {
            name: binding_type.name.to_string(),
            parameters: binding_type.parameters.into_values().collect(),
        }
    }
}
