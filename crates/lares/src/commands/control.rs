//! Handlers for commands that change panel state.

use serde_json::{Map, Value, json};

use lares_core::{ClearKind, Panel};

use crate::cli::{
    AccountCommand, BypassCommand, ClearTarget, Command, CoverCommand, GlobalOpts, OutputCommand,
    PartitionCommand, SchedulerArgs, ThermostatArgs,
};
use crate::error::CliError;
use crate::output;

use super::command_pin;

pub async fn handle(panel: &Panel, cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let pin = command_pin(global);
    let (action, accepted) = match cmd {
        Command::Output(args) => match args.command {
            OutputCommand::On { id, level } => {
                (format!("output {id} on"), panel.turn_on_output(&id, level).await)
            }
            OutputCommand::Off { id } => (format!("output {id} off"), panel.turn_off_output(&id).await),
        },

        Command::Cover(args) => match args.command {
            CoverCommand::Up { id } => (format!("cover {id} up"), panel.raise_cover(&id).await),
            CoverCommand::Down { id } => (format!("cover {id} down"), panel.lower_cover(&id).await),
            CoverCommand::Stop { id } => (format!("cover {id} stop"), panel.stop_cover(&id).await),
            CoverCommand::Position { id, position } => (
                format!("cover {id} to {position}%"),
                panel.set_cover_position(&id, position).await,
            ),
        },

        Command::Scenario(args) => (
            format!("scenario {}", args.id),
            panel.execute_scenario(&args.id, pin).await,
        ),

        Command::Partition(args) => match args.command {
            PartitionCommand::Arm { id, instant: false } => {
                (format!("partition {id} armed"), panel.arm_partition(&id, pin).await)
            }
            PartitionCommand::Arm { id, instant: true } => (
                format!("partition {id} armed (instant)"),
                panel.arm_partition_instant(&id, pin).await,
            ),
            PartitionCommand::Disarm { id } => {
                (format!("partition {id} disarmed"), panel.disarm_partition(&id, pin).await)
            }
            PartitionCommand::Mode { id, mode } => (
                format!("partition {id} mode {mode}"),
                panel.set_partition_mode(&id, &mode, pin).await,
            ),
        },

        Command::Bypass(args) => match args.command {
            BypassCommand::On { id } => (format!("zone {id} bypassed"), panel.bypass_zone_on(&id, pin).await),
            BypassCommand::Off { id } => {
                (format!("zone {id} included"), panel.bypass_zone_off(&id, pin).await)
            }
            BypassCommand::Toggle { id } => {
                (format!("zone {id} bypass toggled"), panel.bypass_zone_toggle(&id, pin).await)
            }
        },

        Command::Thermostat(args) => {
            let patch = thermostat_patch(panel, &args).await?;
            (
                format!("thermostat {} updated", args.id),
                panel.update_thermostat(&args.id, patch).await,
            )
        }

        Command::Scheduler(args) => {
            let patch = scheduler_patch(&args)?;
            (
                format!("scheduler {} updated", args.id),
                panel.update_scheduler(&args.id, patch).await,
            )
        }

        Command::Account(args) => match args.command {
            AccountCommand::Enable { id } => (
                format!("account {id} enabled"),
                panel.set_account_enabled(&id, true, pin).await,
            ),
            AccountCommand::Disable { id } => (
                format!("account {id} disabled"),
                panel.set_account_enabled(&id, false, pin).await,
            ),
        },

        Command::Clear(args) => {
            let kind = clear_kind(args.target);
            (format!("cleared {kind}"), panel.clear_panel(kind, pin).await)
        }

        // Handled before a session is opened
        Command::Watch(_) | Command::Status(_) | Command::Config(_) | Command::Completions(_) => {
            return Err(CliError::Validation {
                field: "command".into(),
                reason: "not a panel command".into(),
            });
        }
    };

    if !accepted {
        return Err(CliError::Rejected { action });
    }
    output::print_output(&output::done(&action, output::should_color(global.color)), global.quiet);
    Ok(())
}

fn clear_kind(target: ClearTarget) -> ClearKind {
    match target {
        ClearTarget::Cycles => ClearKind::CyclesOrMemories,
        ClearTarget::Communications => ClearKind::Communications,
        ClearTarget::Faults => ClearKind::FaultsMemory,
    }
}

fn parse_patch(raw: Option<&str>) -> Result<Map<String, Value>, CliError> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(CliError::Validation {
            field: "patch".into(),
            reason: "expected a JSON object".into(),
        }),
    }
}

/// Flags first, then the raw patch on top. A setpoint goes to the
/// season being set, else the thermostat's active season.
async fn thermostat_patch(panel: &Panel, args: &ThermostatArgs) -> Result<Map<String, Value>, CliError> {
    let mut patch = Map::new();
    if let Some(mode) = args.mode {
        patch.insert("ACT_MODE".into(), json!(mode.code()));
    }
    if let Some(season) = args.season {
        patch.insert("ACT_SEA".into(), json!(season.code()));
    }
    if let Some(target) = args.target {
        let season = match args.season {
            Some(season) => season.code().to_owned(),
            None => panel
                .thermostats()
                .await
                .into_iter()
                .find(|t| t.id == args.id)
                .and_then(|t| t.config)
                .and_then(|c| c.act_sea)
                .unwrap_or_else(|| "WIN".to_owned()),
        };
        patch.insert(season, json!({"TM": format!("{target:.1}")}));
    }
    patch.extend(parse_patch(args.patch.as_deref())?);
    if patch.is_empty() {
        return Err(CliError::Validation {
            field: "thermostat".into(),
            reason: "nothing to change; pass --mode, --season, --target or --patch".into(),
        });
    }
    Ok(patch)
}

fn scheduler_patch(args: &SchedulerArgs) -> Result<Map<String, Value>, CliError> {
    let mut patch = Map::new();
    if args.enable {
        patch.insert("EN".into(), json!("T"));
    }
    if args.disable {
        patch.insert("EN".into(), json!("F"));
    }
    patch.extend(parse_patch(args.patch.as_deref())?);
    if patch.is_empty() {
        return Err(CliError::Validation {
            field: "scheduler".into(),
            reason: "nothing to change; pass --enable, --disable or --patch".into(),
        });
    }
    Ok(patch)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_flags_and_patch_merge() {
        let args = SchedulerArgs {
            id: "1".into(),
            enable: true,
            disable: false,
            patch: Some(r#"{"DES": "Morning"}"#.into()),
        };
        let patch = scheduler_patch(&args).unwrap();
        assert_eq!(patch.get("EN"), Some(&json!("T")));
        assert_eq!(patch.get("DES"), Some(&json!("Morning")));
    }

    #[test]
    fn patch_must_be_an_object() {
        let err = parse_patch(Some("[1, 2]")).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }
}
