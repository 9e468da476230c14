//! `bind`, `unbind`, `find` and `list`

use crate::common::{parse_parameters, GlobalOpts};
use crate::errors::CliResult;
use crate::session::open_discovery;
use colored::Colorize;
use resdex_core::{BindRequest, Binding, BindingKind, BindingRecord, UnbindRequest};
use resdex_logger as logger;

pub struct BindArgs {
    pub key: String,
    pub type_name: String,
    pub params: Vec<String>,
    pub class: bool,
}

pub struct UnbindArgs {
    pub key: String,
    pub type_name: Option<String>,
    pub params: Vec<String>,
    pub class: bool,
}

pub fn bind(args: BindArgs, opts: &GlobalOpts) -> CliResult<()> {
    let parameters = parse_parameters(&args.params)?;
    let request = if args.class {
        BindRequest::class(args.key.as_str(), args.type_name.as_str())
    } else {
        BindRequest::resource(args.key.as_str(), args.type_name.as_str())
    }
    .parameters(parameters);

    let mut discovery = open_discovery(opts)?;
    if discovery.bind(request)? {
        logger::success(&format!("Bound {} to {}", args.key, args.type_name));
    } else {
        logger::info(&format!(
            "{} is already bound to {} with these parameters",
            args.key, args.type_name
        ));
    }
    Ok(())
}

pub fn unbind(args: UnbindArgs, opts: &GlobalOpts) -> CliResult<()> {
    let mut request = if args.class {
        UnbindRequest::class(args.key.as_str())
    } else {
        UnbindRequest::resource(args.key.as_str())
    };
    if let Some(type_name) = &args.type_name {
        request = request.of_type(type_name.as_str());
    }
    if !args.params.is_empty() {
        request = request.parameters(parse_parameters(&args.params)?);
    }

    let mut discovery = open_discovery(opts)?;
    let removed = discovery.unbind(request)?;
    if removed == 0 {
        logger::warn(&format!("No binding stored under {}", args.key));
    } else {
        logger::success(&format!("Removed {} binding(s) of {}", removed, args.key));
    }
    Ok(())
}

pub fn find(type_name: &str, json: bool, opts: &GlobalOpts) -> CliResult<()> {
    let discovery = open_discovery(opts)?;
    let bindings = discovery.find_by_type(type_name)?;
    if json {
        print_json(&bindings)
    } else {
        print_bindings(&bindings, opts);
        Ok(())
    }
}

pub fn list(
    path: Option<&str>,
    type_name: Option<&str>,
    json: bool,
    opts: &GlobalOpts,
) -> CliResult<()> {
    let discovery = open_discovery(opts)?;
    let bindings = discovery.get_bindings(path, type_name)?;
    if json {
        print_json(&bindings)
    } else {
        print_bindings(&bindings, opts);
        Ok(())
    }
}

fn print_json(bindings: &[&Binding]) -> CliResult<()> {
    let records: Vec<BindingRecord> = bindings
        .iter()
        .map(|binding| BindingRecord::from_binding(binding))
        .collect();
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

fn print_bindings(bindings: &[&Binding], opts: &GlobalOpts) {
    if bindings.is_empty() {
        logger::info("No bindings found");
        return;
    }
    for binding in bindings {
        let marker = match binding.kind() {
            BindingKind::Resource => "resource".green(),
            BindingKind::Class => "class".magenta(),
        };
        if opts.verbosity_level() > 0 {
            println!("{} {} {}", marker, binding, binding.uuid().to_string().dimmed());
        } else {
            println!("{} {}", marker, binding);
        }
    }
}
