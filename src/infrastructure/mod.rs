// Infrastructure module - transports, configuration files and logging
pub mod config;
pub mod connector;
pub mod logging;
pub mod memory;
pub mod serial;
pub mod stream;
pub mod tcp;
