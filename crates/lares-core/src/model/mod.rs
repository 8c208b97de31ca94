// ── Panel domain model ──
//
// Typed records for everything the panel sends. Each record names the
// fields the bridge reads and keeps the rest in a flattened `extra` map.

pub mod log;
pub mod partition;
pub mod realtime;
pub mod record;
pub mod static_config;
pub mod stream;
pub mod thermostat;
pub mod view;

// ── Re-exports ──────────────────────────────────────────────────────

pub use log::LogEntry;
pub use partition::{HeuristicPartitionDecoder, PartitionDecoder};
pub use realtime::{
    ClimateStatus, ConnectionStatus, DomusStatus, OutputStatus, PartitionStatus, PowerLineStatus,
    RealtimeSnapshot, SystemStatus, ZoneStatus,
};
pub use record::Record;
pub use static_config::{
    Account, BusDevice, ClimateSensor, Holiday, OutputConfig, PartitionConfig, PowerLineConfig,
    ScenarioConfig, SchedulerTimer, StaticConfig, ZoneConfig,
};
pub use stream::{StreamKind, StreamUpdate};
pub use thermostat::{SeasonProfile, ThermostatConfig};
pub use view::{
    Joined, OutputView, SchedulerView, SensorKind, SensorList, SystemView, ThermostatView,
};
