// Core module - bridge engine and connection lifecycle
pub mod bridge;
pub mod cancel;
pub mod pump;
pub mod supervisor;
pub mod transaction;
pub mod transport;
