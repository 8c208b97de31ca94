// ── Listener streams ──

use serde::Serialize;
use strum::{Display, EnumIter, EnumString};

use super::log::LogEntry;
use super::realtime::{
    ClimateStatus, ConnectionStatus, DomusStatus, OutputStatus, PartitionStatus, PowerLineStatus,
    SystemStatus, ZoneStatus,
};
use super::static_config::SchedulerTimer;
use super::thermostat::ThermostatConfig;

/// Entity-type tag a listener subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum StreamKind {
    Lights,
    Covers,
    Switches,
    Domus,
    Powerlines,
    Partitions,
    Zones,
    Systems,
    Connection,
    Thermostats,
    ThermostatsCfg,
    Logs,
    Schedulers,
}

/// A batch of updated records delivered to listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stream", content = "records", rename_all = "snake_case")]
pub enum StreamUpdate {
    Outputs(Vec<OutputStatus>),
    Domus(Vec<DomusStatus>),
    PowerLines(Vec<PowerLineStatus>),
    Partitions(Vec<PartitionStatus>),
    Zones(Vec<ZoneStatus>),
    Systems(Vec<SystemStatus>),
    Connection(Vec<ConnectionStatus>),
    /// Temperature and humidity readings keyed by thermostat id.
    Climate(Vec<ClimateStatus>),
    ThermostatConfigs(Vec<ThermostatConfig>),
    /// New log entries, oldest first.
    Logs(Vec<LogEntry>),
    Schedulers(Vec<SchedulerTimer>),
}

impl StreamUpdate {
    /// Listener lists this update fans out to.
    pub fn kinds(&self) -> &'static [StreamKind] {
        match self {
            Self::Outputs(_) => &[StreamKind::Lights, StreamKind::Switches, StreamKind::Covers],
            Self::Domus(_) => &[StreamKind::Domus],
            Self::PowerLines(_) => &[StreamKind::Powerlines],
            Self::Partitions(_) => &[StreamKind::Partitions],
            Self::Zones(_) => &[StreamKind::Zones],
            Self::Systems(_) => &[StreamKind::Systems],
            Self::Connection(_) => &[StreamKind::Connection],
            Self::Climate(_) => &[StreamKind::Thermostats],
            Self::ThermostatConfigs(_) => &[StreamKind::ThermostatsCfg],
            Self::Logs(_) => &[StreamKind::Logs],
            Self::Schedulers(_) => &[StreamKind::Schedulers],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Outputs(v) => v.len(),
            Self::Domus(v) => v.len(),
            Self::PowerLines(v) => v.len(),
            Self::Partitions(v) => v.len(),
            Self::Zones(v) => v.len(),
            Self::Systems(v) => v.len(),
            Self::Connection(v) => v.len(),
            Self::Climate(v) => v.len(),
            Self::ThermostatConfigs(v) => v.len(),
            Self::Logs(v) => v.len(),
            Self::Schedulers(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn tags_use_snake_case() {
        assert_eq!(StreamKind::ThermostatsCfg.to_string(), "thermostats_cfg");
        assert_eq!(StreamKind::from_str("powerlines").unwrap(), StreamKind::Powerlines);
        assert_eq!(StreamKind::iter().count(), 13);
    }

    #[test]
    fn outputs_fan_out_to_three_lists() {
        let update = StreamUpdate::Outputs(Vec::new());
        assert_eq!(update.kinds().len(), 3);
        assert!(update.is_empty());
    }
}
