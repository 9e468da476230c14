//! resdex CLI library - exposes modules for testing

pub mod commands;
pub mod common;
pub mod errors;
pub mod session;

pub use common::GlobalOpts;
pub use errors::{CliError, CliResult};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable overriding the tracing filter
pub const LOG_ENV: &str = "RESDEX_LOG";

/// Route `tracing` events from the library crates to stderr
///
/// Call after `resdex_logger::init` so the default filter follows the verbosity.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(resdex_logger::verbosity_to_filter()));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .try_init();
}
