//! Device classification heuristics.
//!
//! Pure functions labelling a peripheral as keyboard / HID / likely-audio
//! from its advertised appearance, service set and name. Absence of data
//! never fails classification; it just yields `false` flags and the
//! generic label.

use uuid::Uuid;

use fieldgate_types::uuids::{
    APPEARANCE_HID_KEYBOARD, APPEARANCE_HID_MAX, APPEARANCE_HID_MIN, HID_SERVICE,
};
use fieldgate_types::{DeviceProfile, ScanResult};

use crate::central::Advertisement;

/// Name substrings that suggest an audio peripheral.
const AUDIO_NAME_HINTS: [&str; 6] = ["ear", "bud", "headset", "speaker", "audio", "mic"];

/// Name substrings that suggest a keyboard.
const KEYBOARD_NAME_HINTS: [&str; 2] = ["kbd", "keyboard"];

/// Classification flags for one peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Advertises the HID service, a HID appearance, or is a keyboard.
    pub is_hid: bool,
    /// Keyboard appearance, or HID service plus keyboard-like name.
    pub is_keyboard: bool,
    /// Name contains an audio hint.
    pub is_likely_audio: bool,
    /// Label, first match in priority order.
    pub profile: DeviceProfile,
}

/// Classify a peripheral from its advertised appearance, services and name.
pub fn classify(appearance: Option<u16>, services: &[Uuid], name: &str) -> Classification {
    let name_lower = name.to_lowercase();
    let advertises_hid = services.contains(&HID_SERVICE);

    let is_keyboard = appearance == Some(APPEARANCE_HID_KEYBOARD)
        || (advertises_hid && KEYBOARD_NAME_HINTS.iter().any(|h| name_lower.contains(h)));

    let hid_appearance = appearance
        .map(|a| (APPEARANCE_HID_MIN..=APPEARANCE_HID_MAX).contains(&a))
        .unwrap_or(false);
    let is_hid = advertises_hid || hid_appearance || is_keyboard;

    let is_likely_audio = AUDIO_NAME_HINTS.iter().any(|h| name_lower.contains(h));

    let profile = if is_keyboard {
        DeviceProfile::HidKeyboard
    } else if is_hid {
        DeviceProfile::HidDevice
    } else if is_likely_audio {
        DeviceProfile::AudioLike
    } else {
        DeviceProfile::Generic
    };

    Classification {
        is_hid,
        is_keyboard,
        is_likely_audio,
        profile,
    }
}

/// Build a scan result from an advertisement record.
pub fn classify_advertisement(adv: &Advertisement) -> ScanResult {
    let name = adv.name.clone().unwrap_or_default();
    let c = classify(adv.appearance, &adv.services, &name);
    ScanResult {
        name,
        address: adv.address.clone(),
        rssi_dbm: adv.rssi.unwrap_or(i16::MIN),
        is_hid: c.is_hid,
        is_keyboard: c.is_keyboard,
        is_likely_audio: c.is_likely_audio,
        profile: c.profile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldgate_types::uuids::{BATTERY_SERVICE, NUS_SERVICE};

    #[test]
    fn test_keyboard_appearance_wins() {
        let c = classify(Some(0x03C1), &[], "Mystery Device");
        assert!(c.is_keyboard);
        assert!(c.is_hid);
        assert_eq!(c.profile, DeviceProfile::HidKeyboard);
        assert_eq!(c.profile.label(), "HID Keyboard");
    }

    #[test]
    fn test_hid_service_plus_keyboard_name() {
        let c = classify(None, &[HID_SERVICE], "Trail KBD v2");
        assert!(c.is_keyboard);
        assert!(c.is_hid);
    }

    #[test]
    fn test_keyboard_name_without_hid_service_is_not_keyboard() {
        let c = classify(None, &[], "keyboard-ish gadget");
        assert!(!c.is_keyboard);
        assert!(!c.is_hid);
        assert_eq!(c.profile, DeviceProfile::Generic);
    }

    #[test]
    fn test_hid_service_alone_is_hid_device() {
        let c = classify(None, &[HID_SERVICE], "Presenter Remote");
        assert!(c.is_hid);
        assert!(!c.is_keyboard);
        assert_eq!(c.profile, DeviceProfile::HidDevice);
    }

    #[test]
    fn test_hid_appearance_range() {
        let c = classify(Some(0x03C2), &[], "");
        assert!(c.is_hid);
        assert!(!c.is_keyboard);
        // Just outside the range.
        let c = classify(Some(0x0400), &[], "");
        assert!(!c.is_hid);
    }

    #[test]
    fn test_audio_name_hints_case_insensitive() {
        for name in ["EarBuds Pro", "My HEADSET", "speakerbox", "USB Mic", "AUDIO-42"] {
            let c = classify(None, &[], name);
            assert!(c.is_likely_audio, "{name} should be audio-like");
            assert_eq!(c.profile, DeviceProfile::AudioLike);
        }
    }

    #[test]
    fn test_keyboard_beats_audio_label() {
        // "bud" in the name, but the appearance says keyboard.
        let c = classify(Some(0x03C1), &[], "KeyBuds");
        assert_eq!(c.profile, DeviceProfile::HidKeyboard);
        assert!(c.is_likely_audio);
    }

    #[test]
    fn test_no_data_yields_generic() {
        let c = classify(None, &[], "");
        assert!(!c.is_hid);
        assert!(!c.is_keyboard);
        assert!(!c.is_likely_audio);
        assert_eq!(c.profile, DeviceProfile::Generic);
    }

    #[test]
    fn test_keyboard_implies_hid() {
        // The invariant holds for every path that sets is_keyboard.
        for (appearance, services, name) in [
            (Some(0x03C1), vec![], ""),
            (None, vec![HID_SERVICE], "kbd"),
            (Some(0x03C1), vec![BATTERY_SERVICE, NUS_SERVICE], "earbud kbd"),
        ] {
            let c = classify(appearance, &services, name);
            if c.is_keyboard {
                assert!(c.is_hid);
            }
        }
    }

    #[test]
    fn test_classify_advertisement_unnamed() {
        let adv = Advertisement {
            address: "11:22:33:44:55:66".to_string(),
            name: None,
            rssi: Some(-70),
            appearance: None,
            services: vec![],
        };
        let result = classify_advertisement(&adv);
        assert_eq!(result.name, "");
        assert_eq!(result.rssi_dbm, -70);
        assert_eq!(result.profile, DeviceProfile::Generic);
    }
}
