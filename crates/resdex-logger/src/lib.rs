//! Console and log-file output for the resdex CLI
//!
//! Everything is appended to a log file with a timestamp. The console only
//! shows what the verbosity allows: warnings, errors and successes always,
//! info/debug with `-v`, steps with `-vv`. `--quiet` silences successes.

use colored::Colorize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

static LOG_FILE: Mutex<Option<PathBuf>> = Mutex::new(None);
static VERBOSITY: Mutex<u8> = Mutex::new(0);
static QUIET: Mutex<bool> = Mutex::new(false);

pub fn get_verbosity() -> u8 {
    VERBOSITY.lock().ok().map(|v| *v).unwrap_or(0)
}

pub fn is_quiet() -> bool {
    QUIET.lock().ok().map(|v| *v).unwrap_or(false)
}

/// Tracing filter directive matching the verbosity
/// 0 = warn only, 1 = debug (-v), 2 = trace (-vv)
pub fn verbosity_to_filter() -> String {
    match get_verbosity() {
        0 => "resdex=warn".to_string(),
        1 => "resdex=debug".to_string(),
        _ => "resdex=trace".to_string(),
    }
}

/// Initialize verbosity and the log file
///
/// `log_file` overrides the default location under the user data dir. The
/// file is truncated on each run.
pub fn init(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<(), String> {
    if let Ok(mut v) = VERBOSITY.lock() {
        *v = if quiet { 0 } else { verbosity };
    }
    if let Ok(mut q) = QUIET.lock() {
        *q = quiet;
    }

    let log_file = match log_file {
        Some(path) => path,
        None => default_log_dir()?.join("resdex.log"),
    };
    if let Some(parent) = log_file.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create log directory: {}", e))?;
        }
    }

    if log_file.exists() {
        let _ = fs::remove_file(&log_file);
    }

    let mut guard = LOG_FILE
        .lock()
        .map_err(|e| format!("Failed to lock log file: {}", e))?;
    *guard = Some(log_file);
    Ok(())
}

fn default_log_dir() -> Result<PathBuf, String> {
    dirs::data_local_dir()
        .map(|dir| dir.join("resdex"))
        .ok_or_else(|| "Could not determine data directory".to_string())
}

fn write_to_log(message: &str) {
    if let Ok(guard) = LOG_FILE.lock() {
        if let Some(ref log_path) = *guard {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(log_path) {
                let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                let _ = writeln!(file, "[{}] {}", timestamp, message);
            }
        }
    }
}

/// Log an informational message (to console if verbose >= 1, always to file)
pub fn info(message: &str) {
    write_to_log(&format!("INFO {}", message));
    if get_verbosity() >= 1 {
        eprintln!("{}", message);
    }
}

/// Log a debug message (to console if verbose >= 1, always to file)
pub fn debug(message: &str) {
    write_to_log(&format!("DEBUG {}", message));
    if get_verbosity() >= 1 {
        eprintln!("{} {}", "DEBUG:".blue().bold(), message);
    }
}

pub fn warn(message: &str) {
    write_to_log(&format!("WARN {}", message));
    eprintln!("{} {}", "warning:".yellow().bold(), message);
}

pub fn error(message: &str) {
    write_to_log(&format!("ERROR {}", message));
    eprintln!("{} {}", "Error:".red().bold(), message);
}

pub fn success(message: &str) {
    write_to_log(&format!("SUCCESS {}", message));
    if !is_quiet() {
        eprintln!("{} {}", "\u{2714}".green().bold(), message);
    }
}

/// Log a step of a longer operation (console only with -vv)
pub fn step(message: &str) {
    if get_verbosity() >= 2 {
        eprintln!("TRACE: {}", message);
    }
    write_to_log(&format!("STEP: {}", message));
}

pub fn get_log_path() -> Option<PathBuf> {
    LOG_FILE.lock().ok().and_then(|guard| guard.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // Logger state is process-wide, so everything is checked in one test
    #[test]
    fn test_init_and_write() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join("logs").join("resdex.log");

        assert!(init(2, true, Some(path.clone())).is_ok());
        assert_eq!(get_verbosity(), 0);
        assert!(is_quiet());
        assert_eq!(verbosity_to_filter(), "resdex=warn");
        assert_eq!(get_log_path(), Some(path.clone()));

        info("bound /app/* to catalog");
        error("no such type");
        let content = fs::read_to_string(&path).unwrap_or_default();
        assert!(content.contains("INFO bound /app/* to catalog"));
        assert!(content.contains("ERROR no such type"));

        assert!(init(1, false, Some(path.clone())).is_ok());
        assert_eq!(verbosity_to_filter(), "resdex=debug");
        assert!(fs::read_to_string(&path).unwrap_or_default().is_empty());
    }
}
