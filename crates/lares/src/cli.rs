//! Clap derive structures for the `lares` CLI.
//!
//! Defines the command tree, global flags and shared value enums. Only
//! depends on clap so `build.rs` can include it for man page generation.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// lares -- watch and control Ksenia Lares alarm panels
#[derive(Debug, Parser)]
#[command(
    name = "lares",
    version,
    about = "Watch and control Ksenia Lares alarm panels",
    long_about = "Talks to a Ksenia Lares 4.0 panel over its WebSocket API.\n\n\
        Keeps one logged-in session, follows realtime updates, and sends\n\
        output, scenario, partition, zone and thermostat commands.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (TOML)
    #[arg(long, env = "LARES_CONFIG", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Add-on options file (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub options: Option<PathBuf>,

    /// Panel host name or address
    #[arg(long, short = 'H', global = true)]
    pub host: Option<String>,

    /// Panel WebSocket port
    #[arg(long, short = 'P', global = true)]
    pub port: Option<u16>,

    /// Connect with wss:// instead of ws://
    #[arg(long, short = 's', global = true)]
    pub secure: bool,

    /// PIN for this command, instead of the session PIN
    #[arg(long, global = true, hide_env = true, env = "LARES_COMMAND_PIN")]
    pub pin: Option<String>,

    /// Output format
    #[arg(long, short = 'o', env = "LARES_OUTPUT", default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow realtime updates until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Print the current state of the panel
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Switch outputs (lights, relays)
    #[command(alias = "out")]
    Output(OutputArgs),

    /// Move shutters and covers
    Cover(CoverArgs),

    /// Run a scenario
    #[command(alias = "sce")]
    Scenario(ScenarioArgs),

    /// Arm or disarm partitions
    #[command(alias = "part")]
    Partition(PartitionArgs),

    /// Bypass zones
    Bypass(BypassArgs),

    /// Change thermostat mode, season or setpoint
    #[command(alias = "thermo")]
    Thermostat(ThermostatArgs),

    /// Edit a scheduler timer
    Scheduler(SchedulerArgs),

    /// Enable or disable a user account
    Account(AccountArgs),

    /// Clear panel memories
    Clear(ClearArgs),

    /// Inspect configuration and store the PIN
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH & STATUS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only show these streams (repeatable), e.g. lights, zones, logs
    #[arg(long = "stream", short = 'S', value_name = "STREAM")]
    pub streams: Vec<String>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// What to show
    #[arg(default_value = "all")]
    pub target: StatusTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusTarget {
    All,
    Lights,
    Covers,
    Switches,
    Domus,
    Zones,
    Partitions,
    Powerlines,
    Scenarios,
    Schedulers,
    Thermostats,
    System,
    Version,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMMANDS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct OutputArgs {
    #[command(subcommand)]
    pub command: OutputCommand,
}

#[derive(Debug, Subcommand)]
pub enum OutputCommand {
    /// Turn an output on, optionally at a dimmer level
    On {
        /// Output ID
        id: String,

        /// Dimmer level (0-100)
        #[arg(long, short = 'l', value_parser = clap::value_parser!(u32).range(0..=100))]
        level: Option<u32>,
    },

    /// Turn an output off
    Off {
        /// Output ID
        id: String,
    },
}

#[derive(Debug, Args)]
pub struct CoverArgs {
    #[command(subcommand)]
    pub command: CoverCommand,
}

#[derive(Debug, Subcommand)]
pub enum CoverCommand {
    /// Raise (open)
    Up { id: String },

    /// Lower (close)
    Down { id: String },

    /// Stop moving
    Stop { id: String },

    /// Move to a position (0 = closed, 100 = open)
    Position {
        id: String,

        #[arg(value_parser = clap::value_parser!(u32).range(0..=100))]
        position: u32,
    },
}

#[derive(Debug, Args)]
pub struct ScenarioArgs {
    /// Scenario ID
    pub id: String,
}

#[derive(Debug, Args)]
pub struct PartitionArgs {
    #[command(subcommand)]
    pub command: PartitionCommand,
}

#[derive(Debug, Subcommand)]
pub enum PartitionCommand {
    /// Arm a partition
    Arm {
        id: String,

        /// Arm without entry/exit delay
        #[arg(long, short = 'i')]
        instant: bool,
    },

    /// Disarm a partition
    Disarm { id: String },

    /// Send a raw mode code (A, DA, I, IA, D)
    Mode { id: String, mode: String },
}

#[derive(Debug, Args)]
pub struct BypassArgs {
    #[command(subcommand)]
    pub command: BypassCommand,
}

#[derive(Debug, Subcommand)]
pub enum BypassCommand {
    /// Exclude a zone
    On { id: String },

    /// Include a zone again
    Off { id: String },

    /// Flip the bypass state
    Toggle { id: String },
}

#[derive(Debug, Args)]
pub struct ThermostatArgs {
    /// Thermostat ID
    pub id: String,

    /// Operating mode
    #[arg(long, short = 'm')]
    pub mode: Option<ThermostatMode>,

    /// Active season
    #[arg(long)]
    pub season: Option<Season>,

    /// Manual setpoint in °C, written to the active season
    #[arg(long, short = 't')]
    pub target: Option<f64>,

    /// Raw JSON patch merged over the flags
    #[arg(long, value_name = "JSON")]
    pub patch: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ThermostatMode {
    Off,
    Man,
    ManTmr,
    Weekly,
    Sd1,
    Sd2,
}

impl ThermostatMode {
    pub fn code(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Man => "MAN",
            Self::ManTmr => "MAN_TMR",
            Self::Weekly => "WEEKLY",
            Self::Sd1 => "SD1",
            Self::Sd2 => "SD2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Season {
    Win,
    Sum,
}

impl Season {
    pub fn code(self) -> &'static str {
        match self {
            Self::Win => "WIN",
            Self::Sum => "SUM",
        }
    }
}

#[derive(Debug, Args)]
pub struct SchedulerArgs {
    /// Scheduler timer ID
    pub id: String,

    /// Enable the timer
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    /// Disable the timer
    #[arg(long)]
    pub disable: bool,

    /// Raw JSON patch merged over the flags
    #[arg(long, value_name = "JSON")]
    pub patch: Option<String>,
}

#[derive(Debug, Args)]
pub struct AccountArgs {
    #[command(subcommand)]
    pub command: AccountCommand,
}

#[derive(Debug, Subcommand)]
pub enum AccountCommand {
    /// Allow the account to log in
    Enable { id: String },

    /// Block the account
    Disable { id: String },
}

#[derive(Debug, Args)]
pub struct ClearArgs {
    /// Memory to clear
    pub target: ClearTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClearTarget {
    /// Alarm cycles and memories
    Cycles,
    /// Communication failures
    Communications,
    /// Fault memory
    Faults,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG & COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved configuration (PIN omitted)
    Show,

    /// Print the config file path
    Path,

    /// Store the panel PIN in the system keyring (read from stdin)
    SetPin,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
