//! `lares status`: one snapshot of the panel, then disconnect.

use serde::Serialize;
use serde_json::{Map, Value};

use lares_core::{Panel, PanelConfig, SensorKind};

use crate::cli::{GlobalOpts, StatusArgs, StatusTarget};
use crate::error::CliError;
use crate::output;

use super::connect;

const SECTIONS: &[StatusTarget] = &[
    StatusTarget::System,
    StatusTarget::Partitions,
    StatusTarget::Zones,
    StatusTarget::Lights,
    StatusTarget::Covers,
    StatusTarget::Switches,
    StatusTarget::Domus,
    StatusTarget::Powerlines,
    StatusTarget::Thermostats,
    StatusTarget::Scenarios,
    StatusTarget::Schedulers,
];

fn section_name(target: StatusTarget) -> &'static str {
    match target {
        StatusTarget::All => "all",
        StatusTarget::Lights => "lights",
        StatusTarget::Covers => "covers",
        StatusTarget::Switches => "switches",
        StatusTarget::Domus => "domus",
        StatusTarget::Zones => "zones",
        StatusTarget::Partitions => "partitions",
        StatusTarget::Powerlines => "powerlines",
        StatusTarget::Scenarios => "scenarios",
        StatusTarget::Schedulers => "schedulers",
        StatusTarget::Thermostats => "thermostats",
        StatusTarget::System => "system",
        StatusTarget::Version => "version",
    }
}

fn to_value<T: Serialize>(data: &T) -> Result<Value, CliError> {
    Ok(serde_json::to_value(data)?)
}

async fn collect(panel: &Panel, target: StatusTarget) -> Result<Value, CliError> {
    match target {
        StatusTarget::Lights => to_value(&panel.lights().await),
        StatusTarget::Covers => to_value(&panel.rolls().await),
        StatusTarget::Switches => to_value(&panel.switches().await),
        StatusTarget::Domus => to_value(&panel.domus().await),
        StatusTarget::Zones => to_value(&panel.sensors(SensorKind::Zones).await),
        StatusTarget::Partitions => to_value(&panel.sensors(SensorKind::Partitions).await),
        StatusTarget::Powerlines => to_value(&panel.sensors(SensorKind::PowerLines).await),
        StatusTarget::Scenarios => to_value(&panel.scenarios().await),
        StatusTarget::Schedulers => to_value(&panel.schedulers().await),
        StatusTarget::Thermostats => to_value(&panel.thermostats().await),
        StatusTarget::System => to_value(&panel.system().await),
        StatusTarget::Version => Ok(panel
            .store()
            .version()
            .map_or(Value::Null, |v| Value::Object((*v).clone()))),
        StatusTarget::All => {
            let mut all = Map::new();
            for &section in SECTIONS {
                all.insert(section_name(section).into(), Box::pin(collect(panel, section)).await?);
            }
            Ok(Value::Object(all))
        }
    }
}

pub async fn handle(config: PanelConfig, args: StatusArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let panel = connect(Panel::builder(config)).await?;
    let collected = collect(&panel, args.target).await;
    panel.shutdown().await;

    let rendered = match collected? {
        Value::Object(map) if args.target == StatusTarget::All => output::render_sections(global.output, &map)?,
        Value::Object(map) => output::render_object(global.output, &map)?,
        Value::Array(items) => output::render_list(global.output, &items)?,
        Value::Null => String::new(),
        other => other.to_string(),
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}
