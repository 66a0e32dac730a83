//! GATT audio-endpoint resolution.
//!
//! Peripherals that stream audio over plain GATT notifications rarely
//! advertise a standard audio profile, so the resolver runs a fixed
//! priority search over the discovered services:
//!
//! 1. Configured override pattern (when set, it either matches or the
//!    whole resolution fails; later tiers are not consulted)
//! 2. Nordic UART Service TX characteristic
//! 3. Audio-domain UUID heuristics (SIG audio 16-bit fragments, the
//!    literal substring "audio", or the NUS pattern)
//! 4. First eligible notifying characteristic outside the well-known
//!    system services
//!
//! The HID service is excluded from tiers 2-4 so keyboard input is never
//! misclassified as an audio stream. Only notify/indicate-capable
//! characteristics are considered at all. Given a fixed discovery order
//! the result is deterministic.

use tracing::debug;
use uuid::Uuid;

use fieldgate_types::AudioEndpoint;
use fieldgate_types::uuids::{AUDIO_UUID_FRAGMENTS, HID_SERVICE, NUS_SERVICE, NUS_TX, SYSTEM_SERVICES};

use crate::central::{GattCharacteristic, GattService};

/// Optional service/characteristic UUID patterns that short-circuit the
/// heuristic search. Patterns are matched as case-insensitive substrings
/// of the canonical UUID string; an empty pattern matches anything.
#[derive(Debug, Clone, Default)]
pub struct ResolverOverride {
    /// Service UUID pattern.
    pub service: Option<String>,
    /// Characteristic UUID pattern.
    pub characteristic: Option<String>,
}

impl ResolverOverride {
    /// Whether any pattern is configured.
    pub fn is_set(&self) -> bool {
        self.service.is_some() || self.characteristic.is_some()
    }

    fn matches(&self, service: Uuid, characteristic: Uuid) -> bool {
        let svc_ok = self
            .service
            .as_deref()
            .map(|p| uuid_contains(service, p))
            .unwrap_or(true);
        let chr_ok = self
            .characteristic
            .as_deref()
            .map(|p| uuid_contains(characteristic, p))
            .unwrap_or(true);
        svc_ok && chr_ok
    }
}

fn uuid_contains(uuid: Uuid, pattern: &str) -> bool {
    uuid.to_string().contains(&pattern.to_lowercase())
}

fn is_nus_tx(service: Uuid, characteristic: Uuid) -> bool {
    service == NUS_SERVICE && characteristic == NUS_TX
}

fn is_audio_flavored(service: Uuid, characteristic: Uuid) -> bool {
    let svc = service.to_string();
    let chr = characteristic.to_string();
    AUDIO_UUID_FRAGMENTS
        .iter()
        .any(|f| svc.contains(f) || chr.contains(f))
        || svc.contains("audio")
        || chr.contains("audio")
        || is_nus_tx(service, characteristic)
}

fn is_system_service(service: Uuid) -> bool {
    SYSTEM_SERVICES.contains(&service)
}

/// Find the first eligible (service, characteristic) pair satisfying a
/// predicate, walking services and characteristics in discovery order.
fn first_match<'a>(
    services: &'a [GattService],
    skip_hid: bool,
    pred: impl Fn(Uuid, &GattCharacteristic) -> bool,
) -> Option<(Uuid, &'a GattCharacteristic)> {
    services
        .iter()
        .filter(|s| !(skip_hid && s.uuid == HID_SERVICE))
        .flat_map(|s| s.characteristics.iter().map(move |c| (s.uuid, c)))
        .filter(|(_, c)| c.is_eligible())
        .find(|(svc, c)| pred(*svc, c))
}

/// Select the best audio stream endpoint among the discovered services,
/// or `None` if no candidate exists.
pub fn resolve_audio_endpoint(
    services: &[GattService],
    override_pattern: &ResolverOverride,
) -> Option<AudioEndpoint> {
    // Tier 1: a configured override wins outright or fails outright.
    if override_pattern.is_set() {
        let found = first_match(services, false, |svc, c| {
            override_pattern.matches(svc, c.uuid)
        });
        if found.is_none() {
            debug!(?override_pattern, "configured audio override matched nothing");
        }
        return found.map(|(svc, c)| endpoint(svc, c));
    }

    // Tiers 2-4, first match in each tier wins, HID always excluded.
    let tiers: [&dyn Fn(Uuid, &GattCharacteristic) -> bool; 3] = [
        &|svc, c| is_nus_tx(svc, c.uuid),
        &|svc, c| is_audio_flavored(svc, c.uuid),
        &|svc, _| !is_system_service(svc),
    ];

    for (tier, pred) in tiers.iter().enumerate() {
        if let Some((svc, c)) = first_match(services, true, |s, ch| pred(s, ch)) {
            debug!(tier = tier + 2, service = %svc, characteristic = %c.uuid,
                "resolved audio endpoint");
            return Some(endpoint(svc, c));
        }
    }

    None
}

fn endpoint(service: Uuid, c: &GattCharacteristic) -> AudioEndpoint {
    AudioEndpoint {
        service,
        characteristic: c.uuid,
        handle: c.handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::uuid;

    fn notify_char(uuid: Uuid, handle: u16) -> GattCharacteristic {
        GattCharacteristic {
            uuid,
            can_notify: true,
            can_indicate: false,
            handle,
        }
    }

    fn read_only_char(uuid: Uuid, handle: u16) -> GattCharacteristic {
        GattCharacteristic {
            uuid,
            can_notify: false,
            can_indicate: false,
            handle,
        }
    }

    fn service(uuid: Uuid, chars: Vec<GattCharacteristic>) -> GattService {
        GattService {
            uuid,
            characteristics: chars,
        }
    }

    const VENDOR_SERVICE: Uuid = uuid!("12345678-0000-0000-0000-0000deadbeef");
    const VENDOR_CHAR: Uuid = uuid!("12345678-0001-0000-0000-0000deadbeef");

    fn hid_service() -> GattService {
        service(
            HID_SERVICE,
            vec![notify_char(
                fieldgate_types::uuids::HID_BOOT_KEYBOARD_INPUT,
                10,
            )],
        )
    }

    fn nus_service() -> GattService {
        service(NUS_SERVICE, vec![notify_char(NUS_TX, 20)])
    }

    fn vendor_service() -> GattService {
        service(VENDOR_SERVICE, vec![notify_char(VENDOR_CHAR, 30)])
    }

    #[test]
    fn test_nus_preferred_over_vendor_and_hid() {
        let services = vec![hid_service(), vendor_service(), nus_service()];
        let ep = resolve_audio_endpoint(&services, &ResolverOverride::default()).unwrap();
        assert_eq!(ep.service, NUS_SERVICE);
        assert_eq!(ep.characteristic, NUS_TX);
        assert_eq!(ep.handle, 20);
    }

    #[test]
    fn test_fallback_picks_vendor_never_hid() {
        let services = vec![hid_service(), vendor_service()];
        let ep = resolve_audio_endpoint(&services, &ResolverOverride::default()).unwrap();
        assert_eq!(ep.service, VENDOR_SERVICE);
        assert_eq!(ep.characteristic, VENDOR_CHAR);
    }

    #[test]
    fn test_hid_only_yields_none() {
        let services = vec![hid_service()];
        assert!(resolve_audio_endpoint(&services, &ResolverOverride::default()).is_none());
    }

    #[test]
    fn test_sig_audio_fragment_beats_tier4() {
        // Volume Control (0x1844) on the SIG base UUID.
        let vcs = uuid!("00001844-0000-1000-8000-00805f9b34fb");
        let vcs_char = uuid!("00002b7d-0000-1000-8000-00805f9b34fb");
        // Vendor service listed first: tier 3 must still win over tier 4.
        let services = vec![vendor_service(), service(vcs, vec![notify_char(vcs_char, 40)])];
        let ep = resolve_audio_endpoint(&services, &ResolverOverride::default()).unwrap();
        assert_eq!(ep.service, vcs);
    }

    #[test]
    fn test_non_notifying_characteristics_are_skipped() {
        let services = vec![service(
            VENDOR_SERVICE,
            vec![read_only_char(VENDOR_CHAR, 30)],
        )];
        assert!(resolve_audio_endpoint(&services, &ResolverOverride::default()).is_none());
    }

    #[test]
    fn test_override_match_wins_outright() {
        let ov = ResolverOverride {
            service: Some("12345678".to_string()),
            characteristic: None,
        };
        let services = vec![nus_service(), vendor_service()];
        let ep = resolve_audio_endpoint(&services, &ov).unwrap();
        assert_eq!(ep.service, VENDOR_SERVICE);
    }

    #[test]
    fn test_override_without_match_fails_without_fallthrough() {
        let ov = ResolverOverride {
            service: Some("ffffffff".to_string()),
            characteristic: None,
        };
        // NUS is present and would normally win, but the override gates it.
        let services = vec![nus_service(), vendor_service()];
        assert!(resolve_audio_endpoint(&services, &ov).is_none());
    }

    #[test]
    fn test_override_requires_both_patterns_when_set() {
        let ov = ResolverOverride {
            service: Some("12345678".to_string()),
            characteristic: Some("6e40".to_string()),
        };
        // Service pattern matches the vendor service, characteristic
        // pattern only matches NUS; no pair satisfies both.
        let services = vec![nus_service(), vendor_service()];
        assert!(resolve_audio_endpoint(&services, &ov).is_none());
    }

    #[test]
    fn test_battery_and_gap_never_selected_by_tier4() {
        use fieldgate_types::uuids::{BATTERY_SERVICE, GAP_SERVICE};
        let batt_char = uuid!("00002a19-0000-1000-8000-00805f9b34fb");
        let gap_char = uuid!("00002a00-0000-1000-8000-00805f9b34fb");
        let services = vec![
            service(GAP_SERVICE, vec![notify_char(gap_char, 2)]),
            service(BATTERY_SERVICE, vec![notify_char(batt_char, 5)]),
        ];
        assert!(resolve_audio_endpoint(&services, &ResolverOverride::default()).is_none());
    }

    #[test]
    fn test_deterministic_first_match_within_tier() {
        let second_vendor = uuid!("87654321-0000-0000-0000-0000c0ffee00");
        let second_char = uuid!("87654321-0001-0000-0000-0000c0ffee00");
        let services = vec![
            vendor_service(),
            service(second_vendor, vec![notify_char(second_char, 50)]),
        ];
        let ep = resolve_audio_endpoint(&services, &ResolverOverride::default()).unwrap();
        assert_eq!(ep.service, VENDOR_SERVICE);
    }
}
