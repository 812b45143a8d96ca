use crate::domain::config::{BridgeConfig, FlowControlConfig, ParityConfig, SerialConfig};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command line arguments for serbridge
#[derive(Parser, Debug)]
#[command(
    name = "serbridge",
    version = env!("CARGO_PKG_VERSION"),
    about = "USB-serial to TCP/IP bridge",
    long_about = "Relays raw bytes between a USB serial device and a TCP server, with optional reconnect after a transport fault."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file path (replaces the global and project files)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bridge a serial device to a TCP server until Ctrl-C
    Bridge(BridgeArgs),
    /// List available serial ports
    Ports,
    /// Send one request to the serial device and print the first response
    Transact(TransactArgs),
    /// Query the attached crypto module for its version
    Identify(IdentifyArgs),
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
}

/// Serial port overrides shared by `bridge` and `transact`
#[derive(ClapArgs, Debug, Default)]
pub struct SerialFlags {
    /// Serial device path, or `auto` for the first USB serial port
    #[arg(short, long)]
    pub device: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Data bits (5-8)
    #[arg(long)]
    pub data_bits: Option<u8>,

    /// Stop bits (1 or 2)
    #[arg(long)]
    pub stop_bits: Option<u8>,

    /// Parity (none, even, odd)
    #[arg(long, value_enum)]
    pub parity: Option<ParityArg>,

    /// Flow control (none, software, hardware)
    #[arg(long, value_enum)]
    pub flow_control: Option<FlowControlArg>,
}

/// Bridge arguments
#[derive(ClapArgs, Debug, Default)]
pub struct BridgeArgs {
    #[command(flatten)]
    pub serial: SerialFlags,

    /// TCP server host
    #[arg(long)]
    pub host: Option<String>,

    /// TCP server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// TCP connect timeout in milliseconds
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Reconnect after a transport fault
    #[arg(short, long)]
    pub reconnect: bool,

    /// Reconnect attempts before giving up
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Relay buffer size per direction in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Hex-dump relayed traffic at debug level
    #[arg(long)]
    pub log_traffic: bool,
}

/// Request/response arguments
#[derive(ClapArgs, Debug)]
pub struct TransactArgs {
    /// Request payload
    pub data: String,

    /// Payload format (text, hex, base64)
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: DataFormat,

    /// Response timeout in milliseconds
    #[arg(short, long, default_value = "2000")]
    pub timeout: u64,

    #[command(flatten)]
    pub serial: SerialFlags,
}

/// Module version query arguments
#[derive(ClapArgs, Debug)]
pub struct IdentifyArgs {
    /// Response timeout in milliseconds
    #[arg(short, long, default_value = "2000")]
    pub timeout: u64,

    #[command(flatten)]
    pub serial: SerialFlags,
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Validate configuration
    Validate {
        /// Configuration file path
        file: Option<PathBuf>,
    },
    /// Create default configuration
    Init {
        /// Project directory to create `.serbridge/config.toml` in
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Global configuration
        #[arg(short, long)]
        global: bool,
    },
}

/// Parity configuration argument
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ParityArg {
    None,
    Even,
    Odd,
}

/// Flow control configuration argument
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum FlowControlArg {
    None,
    Software,
    Hardware,
}

/// Data format argument
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum DataFormat {
    Text,
    Hex,
    Base64,
}

impl From<ParityArg> for ParityConfig {
    fn from(parity: ParityArg) -> Self {
        match parity {
            ParityArg::None => Self::None,
            ParityArg::Even => Self::Even,
            ParityArg::Odd => Self::Odd,
        }
    }
}

impl From<FlowControlArg> for FlowControlConfig {
    fn from(flow_control: FlowControlArg) -> Self {
        match flow_control {
            FlowControlArg::None => Self::None,
            FlowControlArg::Software => Self::Software,
            FlowControlArg::Hardware => Self::Hardware,
        }
    }
}

impl SerialFlags {
    /// Overlay the given flags onto `config`
    pub fn apply(&self, config: &mut SerialConfig) {
        if let Some(device) = &self.device {
            config.device = device.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(data_bits) = self.data_bits {
            config.data_bits = data_bits;
        }
        if let Some(stop_bits) = self.stop_bits {
            config.stop_bits = stop_bits;
        }
        if let Some(parity) = self.parity {
            config.parity = parity.into();
        }
        if let Some(flow_control) = self.flow_control {
            config.flow_control = flow_control.into();
        }
    }
}

impl BridgeArgs {
    /// Overlay the given flags onto `config`
    pub fn apply(&self, config: &mut BridgeConfig) {
        self.serial.apply(&mut config.serial);

        if let Some(host) = &self.host {
            config.network.host = host.clone();
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(timeout) = self.connect_timeout {
            config.network.connect_timeout_ms = timeout;
        }
        if self.reconnect {
            config.reconnect.enabled = true;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.reconnect.max_attempts = max_attempts;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.options.buffer_size = buffer_size;
        }
        if self.log_traffic {
            config.options.log_traffic = true;
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Table => write!(f, "table"),
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataFormat::Text => write!(f, "text"),
            DataFormat::Hex => write!(f, "hex"),
            DataFormat::Base64 => write!(f, "base64"),
        }
    }
}
