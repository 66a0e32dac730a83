//! Platform-agnostic types for the Fieldgate BLE link core.
//!
//! This crate provides the value types shared between the link core
//! (`fieldgate-core`) and its consumers (CLI, menu/UI code on the device):
//!
//! - Scan results and device profile classification labels
//! - Link status snapshots and audio capture summaries
//! - BLE UUID and appearance constants

pub mod types;
pub mod uuid;

pub use types::{
    AudioEndpoint, CaptureSummary, DeviceProfile, LinkStatus, ScanResult, SignalQuality,
};
pub use uuid as uuids;
