//! Command dispatch: bridges CLI args -> panel session -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod status;
pub mod watch;

use lares_config::{Overrides, Settings, Sources};
use lares_core::{Panel, PanelBuilder, PanelConfig, SecurityMode};
use secrecy::SecretString;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Config file locations from the global flags.
pub fn sources(global: &GlobalOpts) -> Sources {
    Sources {
        config: global.config.clone(),
        options: global.options.clone(),
    }
}

/// Merge every configuration layer with the command-line overrides.
pub fn settings(global: &GlobalOpts) -> Result<Settings, CliError> {
    let overrides = Overrides {
        host: global.host.clone(),
        port: global.port,
        secure: global.secure.then_some(true),
    };
    Ok(lares_config::load(&sources(global), &overrides)?)
}

pub fn panel_config(global: &GlobalOpts) -> Result<PanelConfig, CliError> {
    Ok(settings(global)?.into_panel_config()?)
}

/// PIN override for security-sensitive commands.
pub fn command_pin(global: &GlobalOpts) -> Option<SecretString> {
    global.pin.clone().map(SecretString::from)
}

/// Build, connect and wait for the bootstrap data.
pub async fn connect(builder: PanelBuilder) -> Result<Panel, CliError> {
    let panel = builder.build();
    let config = panel.config();
    let connected = match config.security {
        SecurityMode::Secure => panel.connect_secure().await,
        SecurityMode::Plain => panel.connect().await,
    };
    if let Err(e) = connected {
        return Err(CliError::connect(&config.host, e));
    }

    let limit = config.initial_data_timeout;
    if !panel.wait_for_initial_data(limit).await {
        panel.shutdown().await;
        return Err(CliError::Timeout {
            seconds: limit.as_secs(),
        });
    }
    Ok(panel)
}

/// Dispatch a panel-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let config = panel_config(global)?;
    match cmd {
        Command::Watch(args) => watch::handle(config, args, global).await,
        Command::Status(args) => status::handle(config, args, global).await,
        other => {
            let panel = connect(Panel::builder(config)).await?;
            let result = control::handle(&panel, other, global).await;
            panel.shutdown().await;
            result
        }
    }
}
