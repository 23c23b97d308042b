pub mod client;
pub mod error;

pub use client::{MigrationClient, StartAck};
pub use error::TransportError;
pub use migration_monitor_api_types;
