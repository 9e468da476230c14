//! `define`, `undefine` and `types`

use crate::common::GlobalOpts;
use crate::errors::{CliError, CliResult};
use crate::session::open_discovery;
use colored::Colorize;
use resdex_core::{BindingParameter, BindingType, ParamValue};
use resdex_logger as logger;

/// Define a binding type
///
/// `optional` entries are `NAME` or `NAME=DEFAULT`; `required` entries are names.
pub fn define_type(
    name: &str,
    optional: &[String],
    required: &[String],
    opts: &GlobalOpts,
) -> CliResult<()> {
    let mut parameters = Vec::with_capacity(optional.len() + required.len());
    for required_name in required {
        parameters.push(BindingParameter::required(required_name.as_str())?);
    }
    for entry in optional {
        let parameter = match entry.split_once('=') {
            Some((optional_name, default)) => BindingParameter::optional_with_default(
                optional_name.trim(),
                ParamValue::parse_lenient(default),
            )?,
            None => BindingParameter::optional(entry.as_str())?,
        };
        parameters.push(parameter);
    }
    let binding_type = BindingType::new(name, parameters)?;

    let mut discovery = open_discovery(opts)?;
    discovery.define_type(binding_type)?;
    logger::success(&format!("Defined binding type {}", name));
    Ok(())
}

pub fn undefine_type(name: &str, opts: &GlobalOpts) -> CliResult<()> {
    let mut discovery = open_discovery(opts)?;
    if !discovery.has_binding_type(name)? {
        return Err(CliError::Discovery(resdex_core::DiscoveryError::NoSuchType(
            name.to_string(),
        )));
    }
    let removed = discovery.find_by_type(name)?.len();
    discovery.undefine_type(name)?;
    logger::success(&format!(
        "Removed binding type {} and {} binding(s)",
        name, removed
    ));
    Ok(())
}

pub fn list_types(opts: &GlobalOpts) -> CliResult<()> {
    let discovery = open_discovery(opts)?;
    let types = discovery.binding_types()?;
    if types.is_empty() {
        logger::info("No binding types defined");
        return Ok(());
    }

    for binding_type in types {
        println!("{}", binding_type.name().bold());
        for parameter in binding_type.parameters() {
            if parameter.is_required() {
                println!("  {} {}", parameter.name().cyan(), "(required)".yellow());
            } else if parameter.default_value().is_null() {
                println!("  {}", parameter.name().cyan());
            } else {
                println!("  {} = {}", parameter.name().cyan(), parameter.default_value());
            }
        }
    }
    Ok(())
}
