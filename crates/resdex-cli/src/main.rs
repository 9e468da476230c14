use clap::{Parser, Subcommand};
use resdex_cli::{
    commands::{
        bindings::{self, BindArgs, UnbindArgs},
        clear,
        config::{self, ConfigAction},
        types,
    },
    init_tracing, CliResult, GlobalOpts,
};
use resdex_logger as logger;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "resdex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Resource discovery index",
    long_about = "resdex binds resource queries and class names to typed, parameterized bindings and answers lookups by type and by resource path."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure resdex
    #[command(subcommand_required = false, arg_required_else_help = false)]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    /// Define a binding type
    Define {
        name: String,
        /// Optional parameter, NAME or NAME=DEFAULT
        #[arg(short, long = "param", value_name = "NAME[=DEFAULT]")]
        params: Vec<String>,
        /// Required parameter
        #[arg(short, long = "required", value_name = "NAME")]
        required: Vec<String>,
    },
    /// Remove a binding type and all of its bindings
    Undefine { name: String },
    /// List the defined binding types
    Types,
    /// Bind a glob query (or a class name with --class) to a binding type
    Bind {
        query: String,
        #[arg(value_name = "TYPE")]
        type_name: String,
        /// Parameter value, NAME=VALUE (JSON values are parsed)
        #[arg(short, long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,
        /// Bind a class name instead of a resource query
        #[arg(long)]
        class: bool,
    },
    /// Remove the bindings stored under a query or class name
    Unbind {
        query: String,
        /// Only remove bindings of this type
        #[arg(short, long = "type", value_name = "TYPE")]
        type_name: Option<String>,
        /// Only remove bindings with these parameters, NAME=VALUE
        #[arg(short, long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,
        #[arg(long)]
        class: bool,
    },
    /// List the bindings of a type
    Find {
        #[arg(value_name = "TYPE")]
        type_name: String,
        /// Print binding records as JSON
        #[arg(long)]
        json: bool,
    },
    /// List bindings, optionally those matching a resource path
    List {
        path: Option<String>,
        #[arg(short, long = "type", value_name = "TYPE")]
        type_name: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Remove every binding type and binding
    Clear {
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_file = cli
        .global
        .load_config()
        .ok()
        .and_then(|config| config.log_file)
        .map(PathBuf::from);
    if let Err(e) = logger::init(cli.global.verbosity_level(), cli.global.quiet, log_file) {
        eprintln!("Warning: Failed to initialize logger: {}", e);
    }
    init_tracing();

    if let Err(e) = dispatch(cli.command, &cli.global) {
        logger::error(&e.to_string());
        std::process::exit(1);
    }
}

fn dispatch(command: Commands, global: &GlobalOpts) -> CliResult<()> {
    match command {
        Commands::Config { action } => config::handle_config(action, global),
        Commands::Define {
            name,
            params,
            required,
        } => types::define_type(&name, &params, &required, global),
        Commands::Undefine { name } => types::undefine_type(&name, global),
        Commands::Types => types::list_types(global),
        Commands::Bind {
            query,
            type_name,
            params,
            class,
        } => bindings::bind(
            BindArgs {
                key: query,
                type_name,
                params,
                class,
            },
            global,
        ),
        Commands::Unbind {
            query,
            type_name,
            params,
            class,
        } => bindings::unbind(
            UnbindArgs {
                key: query,
                type_name,
                params,
                class,
            },
            global,
        ),
        Commands::Find { type_name, json } => bindings::find(&type_name, json, global),
        Commands::List {
            path,
            type_name,
            json,
        } => bindings::list(path.as_deref(), type_name.as_deref(), json, global),
        Commands::Clear { yes } => clear::clear(yes, global),
    }
}
