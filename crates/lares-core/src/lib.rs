// lares-core: session manager between lares-api and consumers (bridge, CLI).

pub mod command;
pub mod config;
pub mod error;
pub mod listeners;
pub mod model;
pub mod panel;
pub mod pending;
pub mod poller;
pub mod reconnect;
pub mod router;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{ClearKind, CommandKind, OutputValue, PanelCommand};
pub use config::{DEFAULT_PORT, PanelConfig};
pub use error::CoreError;
pub use listeners::{BoxError, ListenerRegistry};
pub use panel::{Panel, PanelBuilder, ReconnectHook, SessionState};
pub use reconnect::ReconnectConfig;
pub use store::PanelStore;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Streams
    StreamKind, StreamUpdate,
    // Static configuration
    Account, BusDevice, ClimateSensor, Holiday, OutputConfig, PartitionConfig, PowerLineConfig,
    ScenarioConfig, SchedulerTimer, StaticConfig, ThermostatConfig, ZoneConfig,
    // Realtime state
    ClimateStatus, ConnectionStatus, DomusStatus, OutputStatus, PartitionStatus,
    PowerLineStatus, RealtimeSnapshot, SystemStatus, ZoneStatus,
    // Logs
    LogEntry,
    // Accessor views
    Joined, OutputView, SchedulerView, SensorKind, SensorList, SystemView, ThermostatView,
    // Partition decoding
    HeuristicPartitionDecoder, PartitionDecoder,
};
// Wire-level types consumers need to wire up a session.
pub use lares_api::{Connector, SecurityMode};
