//! dialEye to MQTT bridge
//!
//! Reads a water meter dial through the external dialEye tool, turns the raw
//! litre reading into a cumulative cubic-meter value and a flow rate, keeps
//! the running state on disk and republishes the values over MQTT.

pub mod config;
pub mod dial_eye;
pub mod error;
pub mod home_assistant;
pub mod meter;
pub mod publisher;
pub mod snapshot;
pub mod status_page;
pub mod update_coordinator;
pub mod update_orchestrator;

#[cfg(test)]
mod test_support;

// Re-export commonly used types for easier access
pub use config::Config;
pub use dial_eye::{DialEye, DialReader};
pub use home_assistant::HomeAssistantAPI;
pub use meter::{DialProfile, MeterState};
pub use publisher::Publisher;
pub use snapshot::{MeterSnapshot, SnapshotStore};
pub use update_coordinator::{TriggerSource, UpdateCoordinator};
pub use update_orchestrator::UpdateOrchestrator;
