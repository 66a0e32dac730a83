//! Mock central stack for testing.
//!
//! This module provides an in-memory BLE central that can be used for
//! unit and integration testing without requiring actual BLE hardware.
//!
//! The [`MockCentral`] implements the [`CentralStack`] trait and hands
//! out [`MockPeripheral`] connections, so it can be used interchangeably
//! with the real adapter in generic code.
//!
//! # Features
//!
//! - **Scripted advertisements**: every scan returns the configured set
//! - **GATT tables**: peripherals carry a full service/characteristic tree
//! - **Notification injection**: [`MockPeripheral::notify`] invokes the
//!   subscribed handler synchronously, as the notification path would
//! - **Failure injection**: refuse connections per address kind, fail
//!   subscribes, or drop the link mid-session

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::central::{
    AddressKind, Advertisement, CentralConnection, CentralStack, GattCharacteristic, GattService,
    NotificationHandler,
};
use crate::error::{Error, Result};

/// A scripted BLE peripheral.
///
/// Built once with the builder methods, then registered with a
/// [`MockCentral`]; connecting to its address yields an `Arc` clone of
/// the same instance, so tests keep a handle to drive notifications.
pub struct MockPeripheral {
    address: String,
    name: Option<String>,
    rssi: Option<i16>,
    appearance: Option<u16>,
    services: Vec<GattService>,
    accepts_public: bool,
    accepts_random: bool,
    connected: AtomicBool,
    fail_subscribe: AtomicBool,
    handlers: Mutex<HashMap<Uuid, NotificationHandler>>,
}

impl std::fmt::Debug for MockPeripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPeripheral")
            .field("address", &self.address)
            .field("name", &self.name)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockPeripheral {
    /// Create a peripheral with sensible defaults: decent signal, both
    /// address kinds accepted, no GATT table.
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            name: None,
            rssi: Some(-50),
            appearance: None,
            services: Vec::new(),
            accepts_public: true,
            accepts_random: true,
            connected: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    pub fn without_rssi(mut self) -> Self {
        self.rssi = None;
        self
    }

    pub fn with_appearance(mut self, appearance: u16) -> Self {
        self.appearance = Some(appearance);
        self
    }

    pub fn with_service(mut self, service: GattService) -> Self {
        self.services.push(service);
        self
    }

    /// Restrict which address kinds the peripheral accepts; connecting
    /// with a rejected kind fails, which exercises the retry path.
    pub fn accepting_only(mut self, kind: AddressKind) -> Self {
        self.accepts_public = kind == AddressKind::Public;
        self.accepts_random = kind == AddressKind::Random;
        self
    }

    /// Make subsequent subscribe calls fail.
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Simulate the link dropping out from under the session.
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.handlers.lock().unwrap().clear();
    }

    /// Deliver a notification payload to the handler subscribed on
    /// `characteristic`. Returns whether a handler was invoked.
    pub fn notify(&self, characteristic: Uuid, data: &[u8]) -> bool {
        let handlers = self.handlers.lock().unwrap();
        match handlers.get(&characteristic) {
            Some(handler) => {
                handler(data);
                true
            }
            None => false,
        }
    }

    /// The advertisement this peripheral would produce in a scan.
    fn advertisement(&self) -> Advertisement {
        Advertisement {
            address: self.address.clone(),
            name: self.name.clone(),
            rssi: self.rssi,
            appearance: self.appearance,
            services: self.services.iter().map(|s| s.uuid).collect(),
        }
    }

    fn has_characteristic(&self, uuid: Uuid) -> bool {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .any(|c| c.uuid == uuid)
    }
}

#[async_trait]
impl CentralConnection for MockPeripheral {
    fn address(&self) -> &str {
        &self.address
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn services(&self) -> Result<Vec<GattService>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        Ok(self.services.clone())
    }

    async fn subscribe(&self, characteristic: Uuid, handler: NotificationHandler) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Error::stream("Mock subscribe failure"));
        }
        if !self.has_characteristic(characteristic) {
            return Err(Error::stream(format!(
                "No such characteristic: {characteristic}"
            )));
        }
        self.handlers.lock().unwrap().insert(characteristic, handler);
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        self.handlers.lock().unwrap().remove(&characteristic);
        Ok(())
    }

    async fn rssi(&self) -> Result<Option<i16>> {
        Ok(self.rssi)
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.handlers.lock().unwrap().clear();
        Ok(())
    }
}

/// A mock BLE central whose scans and connects are fully scripted.
#[derive(Default)]
pub struct MockCentral {
    peripherals: Mutex<Vec<Arc<MockPeripheral>>>,
    fail_scan: AtomicBool,
    /// Extra advertisements returned by scans with no connectable
    /// peripheral behind them (e.g. duplicate-address entries).
    extra_advertisements: Mutex<Vec<Advertisement>>,
}

impl std::fmt::Debug for MockCentral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCentral")
            .field("peripherals", &self.peripherals.lock().unwrap().len())
            .finish()
    }
}

impl MockCentral {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peripheral, returning the handle tests use to drive it.
    pub fn add_peripheral(&self, peripheral: MockPeripheral) -> Arc<MockPeripheral> {
        let peripheral = Arc::new(peripheral);
        self.peripherals.lock().unwrap().push(Arc::clone(&peripheral));
        peripheral
    }

    /// Add a bare advertisement that scans report but connects cannot
    /// reach. Useful for duplicate-address scan scenarios.
    pub fn add_advertisement(&self, advertisement: Advertisement) {
        self.extra_advertisements.lock().unwrap().push(advertisement);
    }

    pub fn set_fail_scan(&self, fail: bool) {
        self.fail_scan.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CentralStack for MockCentral {
    async fn scan(&self, _duration: Duration) -> Result<Vec<Advertisement>> {
        if self.fail_scan.load(Ordering::SeqCst) {
            return Err(Error::stream("Mock scan failure"));
        }
        let mut results: Vec<Advertisement> = self
            .peripherals
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.advertisement())
            .collect();
        results.extend(self.extra_advertisements.lock().unwrap().iter().cloned());
        Ok(results)
    }

    async fn connect(&self, address: &str, kind: AddressKind) -> Result<Arc<dyn CentralConnection>> {
        let peripheral = {
            let peripherals = self.peripherals.lock().unwrap();
            peripherals
                .iter()
                .find(|p| p.address == address)
                .map(Arc::clone)
        };
        let Some(peripheral) = peripheral else {
            return Err(Error::connect_failed(address, "No such peripheral"));
        };
        let accepted = match kind {
            AddressKind::Public => peripheral.accepts_public,
            AddressKind::Random => peripheral.accepts_random,
        };
        if !accepted {
            return Err(Error::connect_failed(
                address,
                format!("{kind:?} address type rejected"),
            ));
        }
        peripheral.connected.store(true, Ordering::SeqCst);
        Ok(peripheral)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldgate_types::uuids::{HID_BOOT_KEYBOARD_INPUT, HID_SERVICE};

    fn keyboard_service() -> GattService {
        GattService {
            uuid: HID_SERVICE,
            characteristics: vec![GattCharacteristic {
                uuid: HID_BOOT_KEYBOARD_INPUT,
                can_notify: true,
                can_indicate: false,
                handle: 0x2A,
            }],
        }
    }

    #[tokio::test]
    async fn test_scan_reports_registered_peripherals() {
        let central = MockCentral::new();
        central.add_peripheral(MockPeripheral::new("AA:01").with_name("Kbd").with_rssi(-40));

        let results = central.scan(Duration::from_secs(1)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].address, "AA:01");
        assert_eq!(results[0].name.as_deref(), Some("Kbd"));
    }

    #[tokio::test]
    async fn test_connect_unknown_address_fails() {
        let central = MockCentral::new();
        let err = central.connect("ZZ:99", AddressKind::Public).await.unwrap_err();
        assert!(matches!(err, Error::ConnectFailed { .. }));
    }

    #[tokio::test]
    async fn test_address_kind_rejection() {
        let central = MockCentral::new();
        central.add_peripheral(MockPeripheral::new("AA:01").accepting_only(AddressKind::Random));

        assert!(central.connect("AA:01", AddressKind::Public).await.is_err());
        assert!(central.connect("AA:01", AddressKind::Random).await.is_ok());
    }

    #[tokio::test]
    async fn test_notify_reaches_subscribed_handler() {
        let central = MockCentral::new();
        let handle = central.add_peripheral(MockPeripheral::new("AA:01").with_service(keyboard_service()));
        let conn = central.connect("AA:01", AddressKind::Public).await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        conn.subscribe(
            HID_BOOT_KEYBOARD_INPUT,
            Box::new(move |data| sink.lock().unwrap().extend_from_slice(data)),
        )
        .await
        .unwrap();

        assert!(handle.notify(HID_BOOT_KEYBOARD_INPUT, &[1, 2, 3]));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);

        conn.unsubscribe(HID_BOOT_KEYBOARD_INPUT).await.unwrap();
        assert!(!handle.notify(HID_BOOT_KEYBOARD_INPUT, &[4]));
    }

    #[tokio::test]
    async fn test_drop_link_flips_liveness() {
        let central = MockCentral::new();
        let handle = central.add_peripheral(MockPeripheral::new("AA:01"));
        let conn = central.connect("AA:01", AddressKind::Public).await.unwrap();

        assert!(conn.is_connected().await);
        handle.drop_link();
        assert!(!conn.is_connected().await);
        assert!(matches!(conn.services().await, Err(Error::NotConnected)));
    }
}
