use crate::common::GlobalOpts;
use crate::errors::CliResult;
use crate::session::open_discovery;
use resdex_logger as logger;
use std::io::{self, BufRead, Write};

/// Remove every binding type and binding, asking first unless `yes`
pub fn clear(yes: bool, opts: &GlobalOpts) -> CliResult<()> {
    let mut discovery = open_discovery(opts)?;
    let types = discovery.binding_types()?.len();
    let bindings = discovery.get_bindings(None, None)?.len();
    if types == 0 && bindings == 0 {
        logger::info("Discovery is already empty");
        return Ok(());
    }

    if !yes && !confirm(&format!(
        "Remove {} binding type(s) and {} binding(s)? [y/N] ",
        types, bindings
    ))? {
        logger::warn("Aborted");
        return Ok(());
    }

    discovery.clear()?;
    logger::success(&format!(
        "Removed {} binding type(s) and {} binding(s)",
        types, bindings
    ));
    Ok(())
}

fn confirm(prompt: &str) -> io::Result<bool> {
    eprint!("{}", prompt);
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
