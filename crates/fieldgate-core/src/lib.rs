//! Core BLE link library for the Fieldgate handheld gateway.
//!
//! This crate owns the lifecycle of a single BLE central connection:
//! discovering nearby peripherals, connecting, classifying the connected
//! device's capabilities, decoding HID keyboard input into a text buffer,
//! and capturing a BLE audio notification stream to a WAV file.
//!
//! # Features
//!
//! - **Device discovery**: bounded-time scan with deduplicated,
//!   signal-sorted results
//! - **Classification**: keyboard / HID / audio-like labels from
//!   appearance codes, service UUIDs and names
//! - **Audio endpoint resolution**: tiered heuristics from Nordic UART
//!   down to a proprietary-service fallback
//! - **Keyboard decoding**: boot-protocol reports to text, tolerant of
//!   vendor report framing
//! - **Audio capture**: bounded ring buffer drained to a 16-bit mono
//!   PCM WAV file with startup/inactivity failure detection
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use fieldgate_core::{BtleCentral, LinkManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stack = Arc::new(BtleCentral::new().await?);
//!     let link = LinkManager::new(stack);
//!     link.begin();
//!
//!     for device in link.scan_devices().await? {
//!         println!("{} {} ({})", device.rssi_dbm, device.name, device.profile);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The [`LinkManager`] is generic over the [`CentralStack`] trait;
//! [`mock::MockCentral`] drives the same code paths without hardware.

pub mod capture;
pub mod central;
pub mod classify;
pub mod error;
pub mod keyboard;
pub mod link;
pub mod mock;
pub mod platform;
pub mod resolve;
pub mod ring;

pub use capture::{CaptureOptions, SampleAligner, WAV_HEADER_SIZE};
pub use central::{
    AddressKind, Advertisement, CentralConnection, CentralStack, GattCharacteristic, GattService,
    NotificationHandler,
};
pub use classify::{classify, classify_advertisement, Classification};
pub use error::{Error, Result};
pub use keyboard::{extract_boot_report, BootReport, KeyboardState};
pub use link::{ConnectionGuard, LinkConfig, LinkManager};
pub use mock::{MockCentral, MockPeripheral};
pub use platform::BtleCentral;
pub use resolve::{resolve_audio_endpoint, ResolverOverride};
pub use ring::{AudioRing, RingStats, RING_CAPACITY};

pub use fieldgate_types::{
    AudioEndpoint, CaptureSummary, DeviceProfile, LinkStatus, ScanResult, SignalQuality,
};
