use crate::common::GlobalOpts;
use crate::errors::CliResult;
use clap::Subcommand;
use colored::Colorize;
use resdex_config::Config;
use resdex_logger as logger;

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print the configured values
    Show,
    /// Print the path of the config file
    Path,
    /// Set a value (discovery-path, repository-root, backend, log-file)
    Set { key: String, value: String },
}

pub fn handle_config(action: Option<ConfigAction>, opts: &GlobalOpts) -> CliResult<()> {
    let path = opts.config_path();
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let config = opts.load_config()?;
            println!("{}", "Configuration:".bold().green());
            if config.is_empty() {
                if opts.verbosity_level() > 0 {
                    println!("  {}", "(empty)".yellow());
                }
            } else {
                for (key, value) in config.values_iter() {
                    println!("  {}: {}", key.cyan(), value);
                }
            }
        }
        ConfigAction::Path => {
            logger::debug(&format!("Reading config from: {}", path.display()));
            println!("{}", path.display());
        }
        ConfigAction::Set { key, value } => {
            let mut config = opts.load_config()?;
            config.set(&key, value.clone())?;
            config.save_to(&path)?;
            logger::success(&format!("Set {} = {}", key, value));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_set_writes_file() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join("resdex.toml");
        let opts = GlobalOpts {
            config: Some(path.clone()),
            ..Default::default()
        };

        let action = ConfigAction::Set {
            key: "backend".to_string(),
            value: "kv".to_string(),
        };
        assert!(handle_config(Some(action), &opts).is_ok());
        assert!(Config::load_from(&path).is_ok_and(|c| c.get("backend").as_deref() == Some("kv")));

        let action = ConfigAction::Set {
            key: "unknown".to_string(),
            value: "x".to_string(),
        };
        assert!(handle_config(Some(action), &opts).is_err());
        assert!(handle_config(None, &opts).is_ok());
    }
}
