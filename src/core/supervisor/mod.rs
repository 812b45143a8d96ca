// Supervisor module - connection lifecycle
pub mod backoff;
pub mod state;
pub mod supervisor;

pub use backoff::retry_delay;
pub use state::ConnectionStatus;
pub use supervisor::Supervisor;
