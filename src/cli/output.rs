use crate::cli::args::OutputFormat;
use crate::core::{bridge::BridgeStats, supervisor::ConnectionStatus};
use crate::domain::config::AppConfig;
use crate::infrastructure::serial::PortInfo;
use serde::Serialize;
use std::io;
use tabled::{Table, Tabled};

/// Output writer trait for different formats
pub trait OutputWriter {
    fn write_ports(&self, ports: &[PortInfo]) -> Result<(), OutputError>;
    fn write_config(&self, config: &AppConfig) -> Result<(), OutputError>;
    fn write_status(&self, status: &ConnectionStatus) -> Result<(), OutputError>;
    fn write_stats(&self, stats: &BridgeStats) -> Result<(), OutputError>;
    fn write_response(&self, response: &[u8]) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("TOML serialization error: {0}")]
    TomlError(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<OutputError> for crate::domain::error::BridgeError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn render_ports(&self, ports: &[PortInfo]) -> Result<String, OutputError> {
        Ok(match self.format {
            OutputFormat::Text => {
                if ports.is_empty() {
                    return Ok("No serial ports found".to_string());
                }
                let mut text = String::new();
                for port in ports {
                    text.push_str(&format!("{} ({})", port.name, port.kind));
                    if let Some(id) = port.usb_id() {
                        text.push_str(&format!(" [{}]", id));
                    }
                    if let Some(product) = &port.product {
                        text.push_str(&format!(" {}", product));
                    }
                    text.push('\n');
                }
                text.trim_end().to_string()
            }
            OutputFormat::Json => serde_json::to_string_pretty(ports)?,
            OutputFormat::Table => Table::new(ports.iter().map(PortTableRow::from)).to_string(),
        })
    }

    pub fn render_stats(&self, stats: &BridgeStats) -> Result<String, OutputError> {
        Ok(match self.format {
            OutputFormat::Text => format!(
                "serial -> network: {} bytes in {} chunks\nnetwork -> serial: {} bytes in {} chunks\nreconnects: {}",
                stats.serial_to_network_bytes,
                stats.serial_to_network_chunks,
                stats.network_to_serial_bytes,
                stats.network_to_serial_chunks,
                stats.reconnects
            ),
            OutputFormat::Json => serde_json::to_string_pretty(stats)?,
            OutputFormat::Table => Table::new([
                StatsTableRow {
                    direction: "serial -> network",
                    bytes: stats.serial_to_network_bytes,
                    chunks: stats.serial_to_network_chunks,
                },
                StatsTableRow {
                    direction: "network -> serial",
                    bytes: stats.network_to_serial_bytes,
                    chunks: stats.network_to_serial_chunks,
                },
            ])
            .to_string(),
        })
    }

    pub fn render_response(&self, response: &[u8]) -> Result<String, OutputError> {
        let hex = hex::encode_upper(response);
        if self.format != OutputFormat::Json {
            return Ok(format!("<< [{}] {}", response.len(), hex));
        }

        let text = String::from_utf8_lossy(response);
        let output = ResponseOutput {
            length: response.len(),
            hex: &hex,
            text: &text,
        };
        Ok(serde_json::to_string_pretty(&output)?)
    }

    fn render_json_message(&self, key: &str, value: &str, level: &str) -> Result<String, OutputError> {
        let mut output = serde_json::Map::new();
        output.insert(key.to_string(), value.into());
        output.insert("level".to_string(), level.into());
        Ok(serde_json::to_string_pretty(&output)?)
    }
}

impl OutputWriter for ConsoleWriter {
    fn write_ports(&self, ports: &[PortInfo]) -> Result<(), OutputError> {
        println!("{}", self.render_ports(ports)?);
        Ok(())
    }

    fn write_config(&self, config: &AppConfig) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
            _ => print!("{}", toml::to_string_pretty(config)?),
        }
        Ok(())
    }

    fn write_status(&self, status: &ConnectionStatus) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string(status)?),
            _ => println!("status: {}", status),
        }
        Ok(())
    }

    fn write_stats(&self, stats: &BridgeStats) -> Result<(), OutputError> {
        println!("{}", self.render_stats(stats)?);
        Ok(())
    }

    fn write_response(&self, response: &[u8]) -> Result<(), OutputError> {
        println!("{}", self.render_response(response)?);
        Ok(())
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => println!("{}", self.render_json_message("message", message, "info")?),
            _ => println!("{}", message),
        }
        Ok(())
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => eprintln!("{}", self.render_json_message("error", error, "error")?),
            _ => eprintln!("Error: {}", error),
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    length: usize,
    hex: &'a str,
    text: &'a str,
}

/// Table row for serial port listing
#[derive(Tabled)]
struct PortTableRow {
    port: String,
    kind: String,
    id: String,
    product: String,
}

impl From<&PortInfo> for PortTableRow {
    fn from(port: &PortInfo) -> Self {
        Self {
            port: port.name.clone(),
            kind: port.kind.to_string(),
            id: port.usb_id().unwrap_or_default(),
            product: port.product.clone().unwrap_or_default(),
        }
    }
}

/// Table row for relay statistics
#[derive(Tabled)]
struct StatsTableRow {
    direction: &'static str,
    bytes: u64,
    chunks: u64,
}
