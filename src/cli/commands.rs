use crate::cli::args::{
    Args, BridgeArgs, Command, ConfigArgs, ConfigCommand, DataFormat, IdentifyArgs, TransactArgs,
};
use crate::cli::output::{ConsoleWriter, OutputWriter};
use crate::core::{
    supervisor::{ConnectionStatus, Supervisor},
    transaction::{query_version, request_response},
    transport::Transport,
};
use crate::domain::{
    config::AppConfig,
    error::{BridgeError, BridgeResult},
};
use crate::infrastructure::{
    config::ConfigManager,
    connector::SystemConnector,
    logging::{init_logging, Verbosity},
    serial::{list_ports, SerialTransport},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Execute CLI command
pub async fn execute_command(args: Args) -> BridgeResult<()> {
    let writer = ConsoleWriter::new(args.output);

    // Load configuration using ConfigManager
    let config_manager = ConfigManager::new()?;
    let config = match &args.config {
        Some(config_path) => config_manager.load_config_from_path(config_path)?,
        None => config_manager.load_config()?,
    };

    let verbosity = if args.quiet {
        Verbosity::Quiet
    } else if args.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };
    init_logging(&config.global.log_level, verbosity)?;

    match args.command {
        Command::Bridge(bridge_args) => execute_bridge_command(bridge_args, &writer, &config).await,
        Command::Ports => {
            writer.write_ports(&list_ports()?)?;
            Ok(())
        }
        Command::Transact(transact_args) => execute_transact_command(transact_args, &writer, &config).await,
        Command::Identify(identify_args) => execute_identify_command(identify_args, &writer, &config).await,
        Command::Config(config_args) => execute_config_command(config_args, &writer, &config, &config_manager),
        Command::Version => {
            writer.write_message(&format!("serbridge {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

async fn execute_bridge_command(args: BridgeArgs, writer: &ConsoleWriter, config: &AppConfig) -> BridgeResult<()> {
    let mut bridge_config = config.bridge.clone();
    args.apply(&mut bridge_config);

    writer.write_message(&format!(
        "Bridging {} ({} baud, {}) <-> {} (Ctrl-C to stop)",
        bridge_config.serial.device,
        bridge_config.serial.baud_rate,
        bridge_config.serial.framing(),
        bridge_config.network.address()
    ))?;

    let supervisor = Supervisor::new(Arc::new(SystemConnector));
    let mut status_rx = supervisor.subscribe();
    supervisor.connect(bridge_config).await?;

    let outcome = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    break Err(BridgeError::Io(e));
                }
                info!("Interrupted, shutting down");
                break Ok(());
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let status = status_rx.borrow_and_update().clone();
                writer.write_status(&status)?;
                if let ConnectionStatus::Error { kind, message } = status {
                    break Err(BridgeError::ConnectionLost { kind, message });
                }
            }
        }
    };

    supervisor.disconnect().await?;
    writer.write_stats(&supervisor.stats().await)?;
    outcome
}

async fn execute_transact_command(args: TransactArgs, writer: &ConsoleWriter, config: &AppConfig) -> BridgeResult<()> {
    let request = parse_data(&args.data, args.format)?;
    let mut serial_config = config.bridge.serial.clone();
    args.serial.apply(&mut serial_config);

    let transport = SerialTransport::open(&serial_config).await?;
    writer.write_message(&format!(">> [{}] {}", request.len(), hex::encode_upper(&request)))?;

    let result = request_response(
        &transport,
        &request,
        Duration::from_millis(args.timeout),
        config.bridge.options.buffer_size,
    )
    .await;

    if let Err(e) = transport.close().await {
        warn!("Closing {} failed: {}", transport.describe(), e);
    }

    writer.write_response(&result?)?;
    Ok(())
}

async fn execute_identify_command(args: IdentifyArgs, writer: &ConsoleWriter, config: &AppConfig) -> BridgeResult<()> {
    let mut serial_config = config.bridge.serial.clone();
    args.serial.apply(&mut serial_config);

    let transport = SerialTransport::open(&serial_config).await?;
    let result = query_version(
        &transport,
        Duration::from_millis(args.timeout),
        config.bridge.options.buffer_size,
    )
    .await;

    if let Err(e) = transport.close().await {
        warn!("Closing {} failed: {}", transport.describe(), e);
    }

    let version = result?;
    writer.write_message(&format!(
        "Module version [{}] {}",
        version.len(),
        hex::encode_upper(&version)
    ))?;
    Ok(())
}

fn execute_config_command(
    args: ConfigArgs,
    writer: &ConsoleWriter,
    config: &AppConfig,
    config_manager: &ConfigManager,
) -> BridgeResult<()> {
    match args.command {
        ConfigCommand::Show => {
            writer.write_config(config)?;
            Ok(())
        }
        ConfigCommand::Validate { file } => {
            let (label, loaded) = match file {
                Some(config_path) => (
                    format!("Configuration file '{}'", config_path.display()),
                    config_manager.load_config_from_path(&config_path),
                ),
                None => ("Current configuration".to_string(), Ok(config.clone())),
            };

            match loaded.and_then(|loaded| loaded.bridge.validate().map_err(BridgeError::config)) {
                Ok(()) => writer.write_message(&format!("{} is valid", label))?,
                Err(e) => {
                    writer.write_error(&format!("Configuration validation failed: {}", e))?;
                    return Err(e);
                }
            }
            Ok(())
        }
        ConfigCommand::Init { dir, global } => {
            let path = if global {
                config_manager.init_global_config()?
            } else {
                let dir = match dir {
                    Some(dir) => dir,
                    None => std::env::current_dir()
                        .map_err(|e| BridgeError::config(format!("Failed to get current directory: {}", e)))?,
                };
                config_manager.init_project_config(&dir)?
            };
            writer.write_message(&format!("Configuration initialized at '{}'", path.display()))?;
            Ok(())
        }
    }
}

fn parse_data(data: &str, format: DataFormat) -> BridgeResult<Vec<u8>> {
    match format {
        DataFormat::Text => Ok(unescape(data).into_bytes()),
        DataFormat::Hex => {
            let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
            hex::decode(&cleaned).map_err(|e| BridgeError::InvalidInput(format!("Invalid hex data: {}", e)))
        }
        DataFormat::Base64 => {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD
                .decode(data.trim())
                .map_err(|e| BridgeError::InvalidInput(format!("Invalid base64 data: {}", e)))
        }
    }
}

/// Expand `\r`, `\n`, `\t` and `\\` so line endings can be typed on a shell.
fn unescape(data: &str) -> String {
    let mut out = String::with_capacity(data.len());
    let mut chars = data.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
