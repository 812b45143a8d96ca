use crate::domain::{
    config::AUTO_DEVICE,
    error::{BridgeError, BridgeResult},
};
use serde::Serialize;
use serialport::SerialPortType;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Usb,
    Pci,
    Bluetooth,
    Unknown,
}

impl std::fmt::Display for PortKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortKind::Usb => write!(f, "usb"),
            PortKind::Pci => write!(f, "pci"),
            PortKind::Bluetooth => write!(f, "bluetooth"),
            PortKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// An enumerated serial port
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub kind: PortKind,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let mut port = PortInfo {
            name: info.port_name,
            kind: PortKind::Unknown,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        };

        match info.port_type {
            SerialPortType::UsbPort(usb) => {
                port.kind = PortKind::Usb;
                port.vid = Some(usb.vid);
                port.pid = Some(usb.pid);
                port.manufacturer = usb.manufacturer;
                port.product = usb.product;
                port.serial_number = usb.serial_number;
            }
            SerialPortType::PciPort => port.kind = PortKind::Pci,
            SerialPortType::BluetoothPort => port.kind = PortKind::Bluetooth,
            SerialPortType::Unknown => {}
        }
        port
    }
}

impl PortInfo {
    /// `VID:PID` in the usual four-digit hex notation, if known
    pub fn usb_id(&self) -> Option<String> {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => Some(format!("{:04X}:{:04X}", vid, pid)),
            _ => None,
        }
    }
}

/// Enumerate the serial ports of this host.
pub fn list_ports() -> BridgeResult<Vec<PortInfo>> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(PortInfo::from).collect())
}

/// First USB serial port of the list.
pub fn select_auto(ports: &[PortInfo]) -> Option<&PortInfo> {
    ports.iter().find(|port| port.kind == PortKind::Usb)
}

/// Turn a device selector into a concrete path.
///
/// Explicit paths pass through untouched; `auto` enumerates the host.
pub fn resolve_device(selector: &str) -> BridgeResult<String> {
    if !selector.eq_ignore_ascii_case(AUTO_DEVICE) {
        return Ok(selector.to_string());
    }

    let ports = list_ports()?;
    let port = select_auto(&ports)
        .ok_or_else(|| BridgeError::DeviceUnavailable("USB serial device not found".to_string()))?;

    info!(
        "Auto-selected {} ({})",
        port.name,
        port.usb_id().unwrap_or_else(|| "unknown id".to_string())
    );
    Ok(port.name.clone())
}
