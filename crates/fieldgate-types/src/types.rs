//! Core value types for the Fieldgate link core.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification label for a peripheral, in priority order.
///
/// The first matching label wins: a keyboard is reported as a keyboard even
/// when its name also sounds audio-like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceProfile {
    /// HID device with keyboard appearance or a keyboard-like name.
    HidKeyboard,
    /// HID device that is not identifiably a keyboard.
    HidDevice,
    /// Name suggests an audio peripheral (earbuds, headset, mic, ...).
    AudioLike,
    /// Nothing recognizable advertised.
    Generic,
}

impl DeviceProfile {
    /// Human-readable label shown in scan lists and status output.
    pub fn label(&self) -> &'static str {
        match self {
            DeviceProfile::HidKeyboard => "HID Keyboard",
            DeviceProfile::HidDevice => "HID Device",
            DeviceProfile::AudioLike => "Audio-like BLE",
            DeviceProfile::Generic => "Generic BLE",
        }
    }
}

impl std::fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One discovered peripheral, produced once per unique address per scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Advertised name, or an empty string when the peripheral is unnamed.
    pub name: String,
    /// Platform device identifier (MAC address on Linux/Windows, UUID on macOS).
    pub address: String,
    /// Signal strength in dBm; more negative means weaker.
    pub rssi_dbm: i16,
    /// Advertises the HID service, a HID appearance, or is a keyboard.
    pub is_hid: bool,
    /// Keyboard appearance code or HID service plus a keyboard-like name.
    pub is_keyboard: bool,
    /// Name contains an audio-peripheral hint.
    pub is_likely_audio: bool,
    /// Classification label.
    pub profile: DeviceProfile,
}

/// Resolved audio stream endpoint on a connected peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioEndpoint {
    /// Service containing the stream characteristic.
    pub service: Uuid,
    /// Notification/indication-capable characteristic carrying the stream.
    pub characteristic: Uuid,
    /// Attribute handle of the characteristic, for display/diagnostics.
    pub handle: u16,
}

/// Snapshot of the link manager's session state.
///
/// Returned by value; a disconnected manager reports `connected: false`
/// with the remaining fields cleared except `last_error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkStatus {
    /// Whether a session is currently established.
    pub connected: bool,
    /// Display name of the connected peripheral.
    pub name: String,
    /// Address of the connected peripheral.
    pub address: String,
    /// Signal strength at connect time, dBm.
    pub rssi_dbm: i16,
    /// Classification label, empty string when disconnected.
    pub profile_label: String,
    /// HID service present.
    pub is_hid: bool,
    /// Classified as a keyboard.
    pub is_keyboard: bool,
    /// Name suggests an audio peripheral.
    pub is_likely_audio: bool,
    /// An audio stream endpoint was resolved.
    pub has_audio_stream: bool,
    /// The resolved endpoint, if any.
    pub audio_endpoint: Option<AudioEndpoint>,
    /// Decoded keyboard input accumulated so far.
    pub keyboard_text: String,
    /// Bonding is likely required before notifications flow (HID devices).
    pub pairing_hint: bool,
    /// Most recent error text, if any.
    pub last_error: Option<String>,
}

/// Outcome of a successful audio capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSummary {
    /// Total bytes written to the output file, container header included.
    pub bytes_written: u64,
    /// Raw stream bytes accepted into the ring buffer.
    pub received_bytes: u64,
    /// Bytes discarded because the ring buffer was full.
    pub dropped_bytes: u64,
    /// Non-fatal data-quality note, e.g. when packets were dropped.
    pub note: Option<String>,
}

/// Signal strength quality levels based on RSSI values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalQuality {
    /// Signal too weak for reliable operation (< -85 dBm).
    Poor,
    /// Usable but may have issues (-85 to -75 dBm).
    Fair,
    /// Good signal strength (-75 to -60 dBm).
    Good,
    /// Excellent signal strength (> -60 dBm).
    Excellent,
}

impl SignalQuality {
    /// Bucket an RSSI value in dBm.
    pub fn from_rssi(rssi: i16) -> Self {
        match rssi {
            r if r > -60 => SignalQuality::Excellent,
            r if r > -75 => SignalQuality::Good,
            r if r > -85 => SignalQuality::Fair,
            _ => SignalQuality::Poor,
        }
    }

    /// Short human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            SignalQuality::Excellent => "Excellent signal",
            SignalQuality::Good => "Good signal",
            SignalQuality::Fair => "Fair signal - link may be unstable",
            SignalQuality::Poor => "Poor signal - consider moving closer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_labels() {
        assert_eq!(DeviceProfile::HidKeyboard.label(), "HID Keyboard");
        assert_eq!(DeviceProfile::HidDevice.label(), "HID Device");
        assert_eq!(DeviceProfile::AudioLike.label(), "Audio-like BLE");
        assert_eq!(DeviceProfile::Generic.label(), "Generic BLE");
    }

    #[test]
    fn test_profile_display_matches_label() {
        assert_eq!(DeviceProfile::AudioLike.to_string(), "Audio-like BLE");
    }

    #[test]
    fn test_signal_quality_buckets() {
        assert_eq!(SignalQuality::from_rssi(-45), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_rssi(-60), SignalQuality::Good);
        assert_eq!(SignalQuality::from_rssi(-75), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_rssi(-85), SignalQuality::Poor);
        assert_eq!(SignalQuality::from_rssi(-100), SignalQuality::Poor);
    }

    #[test]
    fn test_link_status_default_is_disconnected() {
        let status = LinkStatus::default();
        assert!(!status.connected);
        assert!(status.keyboard_text.is_empty());
        assert!(status.audio_endpoint.is_none());
        assert!(status.last_error.is_none());
    }

    #[test]
    fn test_scan_result_serialization_roundtrip() {
        let result = ScanResult {
            name: "Trail Kbd".to_string(),
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            rssi_dbm: -52,
            is_hid: true,
            is_keyboard: true,
            is_likely_audio: false,
            profile: DeviceProfile::HidKeyboard,
        };

        let json = serde_json::to_string(&result).unwrap();
        let back: ScanResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.address, result.address);
        assert_eq!(back.profile, DeviceProfile::HidKeyboard);
    }

    #[test]
    fn test_capture_summary_serialization() {
        let summary = CaptureSummary {
            bytes_written: 40044,
            received_bytes: 40000,
            dropped_bytes: 120,
            note: Some("120 bytes dropped during capture".to_string()),
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("40044"));
        assert!(json.contains("dropped"));
    }
}
