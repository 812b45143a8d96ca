// Serial module - serial side of the bridge
pub mod client;
pub mod discovery;

pub use client::SerialTransport;
pub use discovery::{list_ports, resolve_device, PortInfo, PortKind};
