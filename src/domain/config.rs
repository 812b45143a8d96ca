use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Device selector that picks the first USB serial port found.
pub const AUTO_DEVICE: &str = "auto";

/// serbridge configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global configuration
    #[serde(default)]
    pub global: GlobalConfig,
    /// Bridge connection configuration
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Everything needed to open one serial-to-network connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    #[serde(default)]
    pub options: BridgeOptions,
}

/// Serial device parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path (`/dev/ttyUSB0`, `COM3`) or `auto`
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: ParityConfig,
    #[serde(default)]
    pub flow_control: FlowControlConfig,
    /// Upper bound of a single blocking read, keeps shutdown responsive
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

/// TCP peer parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_no_delay")]
    pub no_delay: bool,
}

/// Reconnect behaviour after a transport fault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

/// Relay tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeOptions {
    /// Chunk buffer size per direction
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Hex-dump every relayed chunk at debug level
    #[serde(default)]
    pub log_traffic: bool,
}

/// Parity configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    #[default]
    None,
    Odd,
    Even,
}

/// Flow control configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControlConfig {
    #[default]
    None,
    Hardware,
    Software,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_device() -> String {
    AUTO_DEVICE.to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_read_timeout() -> u64 {
    50
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_connect_timeout() -> u64 {
    3000
}

fn default_no_delay() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> u64 {
    100
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_buffer_size() -> usize {
    4096
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: ParityConfig::default(),
            flow_control: FlowControlConfig::default(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout(),
            no_delay: default_no_delay(),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            log_traffic: false,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Short framing notation such as `8N1`
    pub fn framing(&self) -> String {
        let parity = match self.parity {
            ParityConfig::None => 'N',
            ParityConfig::Odd => 'O',
            ParityConfig::Even => 'E',
        };
        format!("{}{}{}", self.data_bits, parity, self.stop_bits)
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl BridgeConfig {
    /// Reject values that cannot be opened or relayed
    pub fn validate(&self) -> Result<(), String> {
        if self.serial.device.trim().is_empty() {
            return Err("serial device must not be empty".to_string());
        }
        if self.serial.baud_rate == 0 {
            return Err("baud rate must be positive".to_string());
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(format!("invalid data bits: {}", self.serial.data_bits));
        }
        if !(1..=2).contains(&self.serial.stop_bits) {
            return Err(format!("invalid stop bits: {}", self.serial.stop_bits));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err("serial read timeout must be positive".to_string());
        }
        if self.network.host.trim().is_empty() {
            return Err("network host must not be empty".to_string());
        }
        if self.network.port == 0 {
            return Err("network port must be positive".to_string());
        }
        if self.options.buffer_size == 0 {
            return Err("buffer size must be positive".to_string());
        }
        if self.reconnect.enabled && self.reconnect.max_attempts == 0 {
            return Err("reconnect enabled with zero max attempts".to_string());
        }
        Ok(())
    }
}
