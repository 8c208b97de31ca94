//! Config subcommand handlers. None of them talk to the panel.

use std::io::BufRead;

use secrecy::SecretString;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::{settings, sources};

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let resolved = settings(global)?;
            let rendered = resolved.to_toml()?;
            output::print_output(rendered.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&sources(global).config_file().display().to_string(), false);
            Ok(())
        }

        ConfigCommand::SetPin => {
            let resolved = settings(global)?;
            if resolved.host.trim().is_empty() {
                return Err(lares_config::ConfigError::MissingHost.into());
            }
            if !global.quiet {
                eprintln!("PIN for {} (one line on stdin):", resolved.host);
            }
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            let pin = line.trim();
            if pin.is_empty() || !pin.chars().all(|c| c.is_ascii_digit()) {
                return Err(CliError::Validation {
                    field: "pin".into(),
                    reason: "expected digits".into(),
                });
            }
            lares_config::store_pin(resolved.host.trim(), &SecretString::from(pin.to_owned()))?;
            if !global.quiet {
                eprintln!("PIN stored in the system keyring");
            }
            Ok(())
        }
    }
}
