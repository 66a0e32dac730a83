//! Connection and session management.
//!
//! [`LinkManager`] owns the single central-role session: it drives scan,
//! connect and disconnect, classifies the connected peripheral, resolves
//! its audio endpoint, routes keyboard notifications into the decoder,
//! and runs audio captures. All public operations leave the manager in a
//! well-defined idle or connected state; nothing here is fatal.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fieldgate_types::uuids::{HID_BOOT_KEYBOARD_INPUT, HID_REPORT, HID_SERVICE};
use fieldgate_types::{AudioEndpoint, CaptureSummary, LinkStatus, ScanResult};

use crate::capture::{self, CaptureOptions};
use crate::central::{AddressKind, Advertisement, CentralConnection, CentralStack, GattService};
use crate::classify::{self, Classification};
use crate::error::{Error, Result};
use crate::keyboard::KeyboardState;
use crate::resolve::{resolve_audio_endpoint, ResolverOverride};
use crate::ring::AudioRing;

/// Minimum gap between automatic reconnect attempts from `tick`.
const AUTO_CONNECT_COOLDOWN: Duration = Duration::from_secs(10);

/// Link manager configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Previously saved peripheral address, target of auto-connect.
    pub saved_address: Option<String>,
    /// Display name saved alongside the address.
    pub saved_name: Option<String>,
    /// Whether `tick` should try to reconnect to the saved peripheral.
    pub auto_connect: bool,
    /// PCM sample rate written into capture file headers.
    pub sample_rate: u32,
    /// Scan window length.
    pub scan_duration: Duration,
    /// Optional audio endpoint override, matched before the heuristics.
    pub audio_override: ResolverOverride,
    /// Capture loop timing knobs.
    pub capture: CaptureOptions,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            saved_address: None,
            saved_name: None,
            auto_connect: false,
            sample_rate: 16_000,
            scan_duration: Duration::from_secs(5),
            audio_override: ResolverOverride::default(),
            capture: CaptureOptions::default(),
        }
    }
}

/// Owning handle for a live connection. Dropping the guard disconnects
/// as a best-effort background task; explicit [`ConnectionGuard::close`]
/// is the reliable path.
pub struct ConnectionGuard {
    conn: Option<Arc<dyn CentralConnection>>,
}

impl ConnectionGuard {
    fn new(conn: Arc<dyn CentralConnection>) -> Self {
        Self { conn: Some(conn) }
    }

    fn conn(&self) -> &Arc<dyn CentralConnection> {
        self.conn.as_ref().expect("guard not yet closed")
    }

    /// Disconnect and consume the guard.
    async fn close(mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(err) = conn.disconnect().await {
                debug!(error = %err, "Disconnect reported an error");
            }
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = conn.disconnect().await;
                });
            }
        }
    }
}

/// One established session. Replaced wholesale on each connect.
struct Session {
    guard: ConnectionGuard,
    address: String,
    name: String,
    rssi_dbm: i16,
    classification: Classification,
    audio_endpoint: Option<AudioEndpoint>,
    keyboard_characteristic: Option<Uuid>,
    pairing_hint: bool,
}

/// The central-role connection manager.
///
/// Generic over a [`CentralStack`], so the full session lifecycle runs
/// against [`crate::mock::MockCentral`] in tests and
/// [`crate::platform::BtleCentral`] in production.
pub struct LinkManager {
    stack: Arc<dyn CentralStack>,
    config: RwLock<LinkConfig>,
    session: RwLock<Option<Session>>,
    keyboard: Arc<StdMutex<KeyboardState>>,
    ring: Arc<AudioRing>,
    last_error: StdMutex<Option<String>>,
    /// Advertisements from the most recent scan, for appearance and
    /// signal data btleplug cannot provide at connect time.
    last_seen: RwLock<HashMap<String, Advertisement>>,
    last_auto_attempt: StdMutex<Option<Instant>>,
    started: AtomicBool,
}

impl std::fmt::Debug for LinkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkManager").finish_non_exhaustive()
    }
}

impl LinkManager {
    pub fn new(stack: Arc<dyn CentralStack>) -> Self {
        Self::with_config(stack, LinkConfig::default())
    }

    pub fn with_config(stack: Arc<dyn CentralStack>, config: LinkConfig) -> Self {
        Self {
            stack,
            config: RwLock::new(config),
            session: RwLock::new(None),
            keyboard: Arc::new(StdMutex::new(KeyboardState::new())),
            ring: Arc::new(AudioRing::new()),
            last_error: StdMutex::new(None),
            last_seen: RwLock::new(HashMap::new()),
            last_auto_attempt: StdMutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Mark the manager started. Idempotent; repeated calls are no-ops.
    pub fn begin(&self) {
        if !self.started.swap(true, Ordering::SeqCst) {
            info!("Link manager started");
        }
    }

    /// Update the saved peripheral and auto-connect flag.
    ///
    /// If the saved address changes away from the currently connected
    /// peripheral, the active session is torn down.
    pub async fn configure(
        &self,
        saved_address: Option<String>,
        saved_name: Option<String>,
        auto_connect: bool,
    ) {
        let connected_elsewhere = {
            let session = self.session.read().await;
            match (&*session, &saved_address) {
                (Some(s), Some(addr)) => s.address != *addr,
                (Some(_), None) => false,
                (None, _) => false,
            }
        };

        {
            let mut config = self.config.write().await;
            config.saved_address = saved_address;
            config.saved_name = saved_name;
            config.auto_connect = auto_connect;
        }

        if connected_elsewhere {
            info!("Saved peripheral changed while connected, disconnecting");
            self.disconnect_now().await;
        }
    }

    /// Read access to the configuration, mainly for callers rendering it.
    pub async fn config(&self) -> LinkConfig {
        self.config.read().await.clone()
    }

    /// Scan for peripherals. Results are deduplicated by address and
    /// sorted by signal strength descending, name ascending on ties.
    pub async fn scan_devices(&self) -> Result<Vec<ScanResult>> {
        let duration = self.config.read().await.scan_duration;
        let advertisements = self.stack.scan(duration).await?;

        let mut by_address: HashMap<String, Advertisement> = HashMap::new();
        for adv in advertisements {
            match by_address.get(&adv.address) {
                Some(existing) if !prefer(&adv, existing) => {}
                _ => {
                    by_address.insert(adv.address.clone(), adv);
                }
            }
        }

        let mut results: Vec<ScanResult> = by_address
            .values()
            .map(classify::classify_advertisement)
            .collect();
        results.sort_by(|a, b| {
            b.rssi_dbm
                .cmp(&a.rssi_dbm)
                .then_with(|| a.name.cmp(&b.name))
        });

        *self.last_seen.write().await = by_address;
        debug!(count = results.len(), "Scan produced results");
        Ok(results)
    }

    /// Connect to a peripheral by address, tearing down any prior
    /// session first. Tries the public address type, then random.
    pub async fn connect_to_device(&self, address: &str, name_hint: Option<&str>) -> Result<()> {
        if address.is_empty() {
            return Err(Error::invalid_config("Device address is empty"));
        }
        self.disconnect_now().await;

        let conn = match self.stack.connect(address, AddressKind::Public).await {
            Ok(conn) => conn,
            Err(first) => {
                debug!(address, error = %first, "Public address connect failed, retrying as random");
                match self.stack.connect(address, AddressKind::Random).await {
                    Ok(conn) => conn,
                    Err(second) => {
                        let msg = second.to_string();
                        self.set_error(&msg);
                        return Err(second);
                    }
                }
            }
        };

        let advertisement = self.last_seen.read().await.get(address).cloned();
        let name = name_hint
            .map(str::to_string)
            .or_else(|| advertisement.as_ref().and_then(|a| a.name.clone()))
            .unwrap_or_else(|| address.to_string());
        let rssi_dbm = conn
            .rssi()
            .await
            .ok()
            .flatten()
            .or_else(|| advertisement.as_ref().and_then(|a| a.rssi))
            .unwrap_or(i16::MIN);

        let services = match conn.services().await {
            Ok(services) => services,
            Err(err) => {
                let msg = err.to_string();
                self.set_error(&msg);
                let _ = conn.disconnect().await;
                return Err(err);
            }
        };

        let appearance = advertisement.as_ref().and_then(|a| a.appearance);
        let service_uuids: Vec<Uuid> = services.iter().map(|s| s.uuid).collect();
        let classification = classify::classify(appearance, &service_uuids, &name);

        let audio_override = self.config.read().await.audio_override.clone();
        let audio_endpoint = resolve_audio_endpoint(&services, &audio_override);

        let keyboard_characteristic = if classification.is_hid {
            match self.prime_keyboard(&conn, &services).await {
                Ok(uuid) => uuid,
                Err(err) => {
                    warn!(error = %err, "Keyboard subscription failed");
                    None
                }
            }
        } else {
            None
        };

        info!(
            address,
            name = %name,
            profile = %classification.profile,
            has_audio = audio_endpoint.is_some(),
            "Connected"
        );

        self.keyboard.lock().unwrap().clear();
        self.clear_error();
        *self.session.write().await = Some(Session {
            guard: ConnectionGuard::new(conn),
            address: address.to_string(),
            name,
            rssi_dbm,
            classification,
            audio_endpoint,
            keyboard_characteristic,
            pairing_hint: classification.is_hid,
        });
        Ok(())
    }

    /// Subscribe the keyboard decoder to the HID input characteristic,
    /// preferring boot keyboard input over the generic report, and
    /// notify over indicate.
    async fn prime_keyboard(
        &self,
        conn: &Arc<dyn CentralConnection>,
        services: &[GattService],
    ) -> Result<Option<Uuid>> {
        let Some(uuid) = select_keyboard_characteristic(services) else {
            return Ok(None);
        };
        let keyboard = Arc::clone(&self.keyboard);
        conn.subscribe(
            uuid,
            Box::new(move |data| keyboard.lock().unwrap().feed(data)),
        )
        .await?;
        debug!(characteristic = %uuid, "Keyboard input subscribed");
        Ok(Some(uuid))
    }

    /// Tear down the active session, if any. Idempotent.
    pub async fn disconnect_now(&self) {
        let session = self.session.write().await.take();
        if let Some(session) = session {
            info!(address = %session.address, "Disconnecting");
            session.guard.close().await;
        }
        self.ring.deactivate();
        self.keyboard.lock().unwrap().clear();
    }

    /// Scheduler hook: detect silent link loss, and drive auto-connect
    /// to the saved peripheral when enabled.
    pub async fn tick(&self) {
        let lost = {
            let session = self.session.read().await;
            match &*session {
                Some(s) => Some(!s.guard.conn().is_connected().await),
                None => None,
            }
        };
        let Some(lost) = lost else {
            return self.auto_connect_tick().await;
        };
        if lost {
            warn!("Link loss detected");
            *self.session.write().await = None;
            self.ring.deactivate();
            self.keyboard.lock().unwrap().clear();
            let mut last_error = self.last_error.lock().unwrap();
            if last_error.is_none() {
                *last_error = Some("Connection lost".to_string());
            }
        }
    }

    async fn auto_connect_tick(&self) {
        let target = {
            let config = self.config.read().await;
            if !config.auto_connect {
                return;
            }
            match &config.saved_address {
                Some(addr) => (addr.clone(), config.saved_name.clone()),
                None => return,
            }
        };

        {
            let mut last = self.last_auto_attempt.lock().unwrap();
            if last.is_some_and(|t| t.elapsed() < AUTO_CONNECT_COOLDOWN) {
                return;
            }
            *last = Some(Instant::now());
        }

        let (address, name) = target;
        debug!(address = %address, "Auto-connecting to saved peripheral");
        if let Err(err) = self.connect_to_device(&address, name.as_deref()).await {
            debug!(address = %address, error = %err, "Auto-connect attempt failed");
        }
    }

    /// Record the connected peripheral's audio stream to a WAV file.
    ///
    /// Blocks for up to `duration` plus a short grace period. Requires a
    /// session with a resolved audio endpoint; resolution is retried
    /// lazily if classification found none.
    pub async fn record_audio_to_wav(
        &self,
        path: &Path,
        duration: Duration,
        stop: CancellationToken,
    ) -> Result<CaptureSummary> {
        // Argument errors are rejected before any stack interaction,
        // including the lazy endpoint re-resolution below.
        capture::validate(path, duration, &self.config.read().await.capture)?;

        let (conn, endpoint, sample_rate, options) = {
            let mut session = self.session.write().await;
            let Some(session) = session.as_mut() else {
                return Err(Error::NotConnected);
            };
            let config = self.config.read().await;

            let endpoint = match session.audio_endpoint {
                Some(endpoint) => endpoint,
                None => {
                    // Lazy re-resolution in case discovery was incomplete
                    // at connect time.
                    let services = session.guard.conn().services().await?;
                    let endpoint = resolve_audio_endpoint(&services, &config.audio_override)
                        .ok_or(Error::NoAudioEndpoint)?;
                    session.audio_endpoint = Some(endpoint);
                    endpoint
                }
            };
            (
                Arc::clone(session.guard.conn()),
                endpoint,
                config.sample_rate,
                config.capture.clone(),
            )
        };

        let result = capture::record_to_wav(
            &conn,
            &endpoint,
            &self.ring,
            path,
            duration,
            sample_rate,
            &stop,
            &options,
        )
        .await;

        // A data-quality note travels in the summary, never through the
        // error field: a capture with drops is still a success.
        match &result {
            Ok(_) => self.clear_error(),
            Err(err) => self.set_error(&err.to_string()),
        }
        result
    }

    /// Decoded keyboard input accumulated since connect or last clear.
    pub fn keyboard_input_text(&self) -> String {
        self.keyboard.lock().unwrap().text()
    }

    pub fn clear_keyboard_input(&self) {
        self.keyboard.lock().unwrap().clear();
    }

    /// Snapshot the session state.
    pub async fn status(&self) -> LinkStatus {
        let last_error = self.last_error.lock().unwrap().clone();
        let session = self.session.read().await;
        match &*session {
            Some(s) => LinkStatus {
                connected: true,
                name: s.name.clone(),
                address: s.address.clone(),
                rssi_dbm: s.rssi_dbm,
                profile_label: s.classification.profile.label().to_string(),
                is_hid: s.classification.is_hid,
                is_keyboard: s.classification.is_keyboard,
                is_likely_audio: s.classification.is_likely_audio,
                has_audio_stream: s.audio_endpoint.is_some(),
                audio_endpoint: s.audio_endpoint,
                keyboard_text: self.keyboard_input_text(),
                pairing_hint: s.pairing_hint,
                last_error,
            },
            None => LinkStatus {
                last_error,
                ..LinkStatus::default()
            },
        }
    }

    /// UUID of the subscribed keyboard input characteristic, if any.
    pub async fn keyboard_characteristic(&self) -> Option<Uuid> {
        self.session
            .read()
            .await
            .as_ref()
            .and_then(|s| s.keyboard_characteristic)
    }

    fn set_error(&self, message: &str) {
        *self.last_error.lock().unwrap() = Some(message.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.lock().unwrap() = None;
    }
}

/// Dedup preference: stronger signal wins; on equal signal a named
/// advertisement beats an unnamed one.
fn prefer(candidate: &Advertisement, existing: &Advertisement) -> bool {
    let c = candidate.rssi.unwrap_or(i16::MIN);
    let e = existing.rssi.unwrap_or(i16::MIN);
    c > e || (c == e && existing.name.is_none() && candidate.name.is_some())
}

/// Pick the keyboard input characteristic inside the HID service:
/// boot keyboard input before the generic report, notify before
/// indicate, eligible characteristics only.
fn select_keyboard_characteristic(services: &[GattService]) -> Option<Uuid> {
    services
        .iter()
        .filter(|s| s.uuid == HID_SERVICE)
        .flat_map(|s| s.characteristics.iter())
        .filter(|c| c.is_eligible())
        .filter(|c| c.uuid == HID_BOOT_KEYBOARD_INPUT || c.uuid == HID_REPORT)
        .min_by_key(|c| {
            let kind = if c.uuid == HID_BOOT_KEYBOARD_INPUT { 0 } else { 1 };
            let transport = if c.can_notify { 0 } else { 1 };
            (kind, transport)
        })
        .map(|c| c.uuid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::central::GattCharacteristic;

    fn hid_char(uuid: Uuid, notify: bool, indicate: bool, handle: u16) -> GattCharacteristic {
        GattCharacteristic {
            uuid,
            can_notify: notify,
            can_indicate: indicate,
            handle,
        }
    }

    #[test]
    fn test_select_prefers_boot_input_over_report() {
        let services = vec![GattService {
            uuid: HID_SERVICE,
            characteristics: vec![
                hid_char(HID_REPORT, true, false, 1),
                hid_char(HID_BOOT_KEYBOARD_INPUT, true, false, 2),
            ],
        }];
        assert_eq!(
            select_keyboard_characteristic(&services),
            Some(HID_BOOT_KEYBOARD_INPUT)
        );
    }

    #[test]
    fn test_select_falls_back_to_report_indicate() {
        let services = vec![GattService {
            uuid: HID_SERVICE,
            characteristics: vec![hid_char(HID_REPORT, false, true, 1)],
        }];
        assert_eq!(select_keyboard_characteristic(&services), Some(HID_REPORT));
    }

    #[test]
    fn test_select_ignores_non_hid_services() {
        let services = vec![GattService {
            uuid: fieldgate_types::uuids::BATTERY_SERVICE,
            characteristics: vec![hid_char(HID_BOOT_KEYBOARD_INPUT, true, false, 1)],
        }];
        assert_eq!(select_keyboard_characteristic(&services), None);
    }

    #[test]
    fn test_select_ignores_write_only_characteristics() {
        let services = vec![GattService {
            uuid: HID_SERVICE,
            characteristics: vec![hid_char(HID_BOOT_KEYBOARD_INPUT, false, false, 1)],
        }];
        assert_eq!(select_keyboard_characteristic(&services), None);
    }

    #[test]
    fn test_prefer_stronger_signal() {
        let strong = Advertisement {
            address: "AA".into(),
            name: None,
            rssi: Some(-40),
            appearance: None,
            services: vec![],
        };
        let weak_named = Advertisement {
            address: "AA".into(),
            name: Some("Kbd".into()),
            rssi: Some(-70),
            appearance: None,
            services: vec![],
        };
        assert!(prefer(&strong, &weak_named));
        assert!(!prefer(&weak_named, &strong));
    }

    #[test]
    fn test_prefer_named_on_signal_tie() {
        let unnamed = Advertisement {
            address: "AA".into(),
            name: None,
            rssi: Some(-50),
            appearance: None,
            services: vec![],
        };
        let named = Advertisement {
            address: "AA".into(),
            name: Some("Kbd".into()),
            rssi: Some(-50),
            appearance: None,
            services: vec![],
        };
        assert!(prefer(&named, &unnamed));
        assert!(!prefer(&unnamed, &named));
    }
}
