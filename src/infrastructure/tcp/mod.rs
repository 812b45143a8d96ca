// TCP module - network side of the bridge
pub mod client;

pub use client::{connect, TcpTransport};
