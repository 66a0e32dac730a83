//! Bluetooth UUIDs and appearance codes used by the Fieldgate link core.
//!
//! All 16-bit SIG identifiers are expressed as full 128-bit UUIDs on the
//! Bluetooth base UUID so they compare directly against discovery results.

use uuid::{Uuid, uuid};

// --- Standard BLE service UUIDs ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");

/// Generic Attribute Profile (GATT) service.
pub const GATT_SERVICE: Uuid = uuid!("00001801-0000-1000-8000-00805f9b34fb");

/// Current Time service.
pub const CURRENT_TIME_SERVICE: Uuid = uuid!("00001805-0000-1000-8000-00805f9b34fb");

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

/// Human Interface Device service.
pub const HID_SERVICE: Uuid = uuid!("00001812-0000-1000-8000-00805f9b34fb");

// --- HID characteristic UUIDs ---

/// Boot Keyboard Input Report characteristic.
pub const HID_BOOT_KEYBOARD_INPUT: Uuid = uuid!("00002a22-0000-1000-8000-00805f9b34fb");

/// HID Report characteristic (report protocol).
pub const HID_REPORT: Uuid = uuid!("00002a4d-0000-1000-8000-00805f9b34fb");

// --- Nordic UART Service (NUS) ---

/// Nordic UART Service UUID, the de facto serial bridge on nRF peripherals.
pub const NUS_SERVICE: Uuid = uuid!("6e400001-b5a3-f393-e0a9-e50e24dcca9e");

/// NUS TX characteristic (peripheral-to-central notifications).
pub const NUS_TX: Uuid = uuid!("6e400003-b5a3-f393-e0a9-e50e24dcca9e");

// --- Bluetooth SIG audio-domain 16-bit UUID fragments ---

/// 16-bit UUID fragments of the SIG audio services, matched as substrings
/// against discovered UUID strings: Audio Input Control, Volume Control,
/// Microphone Control, Audio Stream Control, Broadcast Audio Scan,
/// Published Audio Capabilities, Basic Audio Announcement.
pub const AUDIO_UUID_FRAGMENTS: [&str; 7] =
    ["1843", "1844", "184d", "184e", "184f", "1850", "1851"];

/// Services that are never an audio stream source: the well-known system
/// services plus HID (keyboard input must not be captured as audio).
pub const SYSTEM_SERVICES: [Uuid; 6] = [
    GAP_SERVICE,
    GATT_SERVICE,
    CURRENT_TIME_SERVICE,
    DEVICE_INFO_SERVICE,
    BATTERY_SERVICE,
    HID_SERVICE,
];

// --- GAP appearance codes ---

/// Appearance code advertised by HID keyboards.
pub const APPEARANCE_HID_KEYBOARD: u16 = 0x03C1;

/// First appearance code of the generic-HID category.
pub const APPEARANCE_HID_MIN: u16 = 0x03C0;

/// Last appearance code of the generic-HID category.
pub const APPEARANCE_HID_MAX: u16 = 0x03FF;
