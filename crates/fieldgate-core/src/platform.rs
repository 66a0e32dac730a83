//! btleplug-backed implementation of the central stack.
//!
//! This is the only module that touches the OS Bluetooth stack. Everything
//! above it works against the [`CentralStack`] / [`CentralConnection`]
//! traits, so the rest of the crate is testable with [`crate::mock`].
//!
//! Platform notes:
//! - btleplug does not expose the advertised appearance value, so
//!   classification over this backend relies on service UUIDs and names.
//! - btleplug does not expose ATT handles; characteristic handles are
//!   synthesized from discovery order, which is stable for a connection.
//! - btleplug picks the address type itself, so the requested
//!   [`AddressKind`] is advisory here; the retry ladder still applies
//!   because some stacks only succeed after a fresh attempt.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, CharPropFlags, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::central::{
    AddressKind, Advertisement, CentralConnection, CentralStack, GattCharacteristic, GattService,
    NotificationHandler,
};
use crate::error::{Error, Result};

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters
        .into_iter()
        .next()
        .ok_or_else(|| Error::invalid_config("No Bluetooth adapter available"))
}

/// Stable identifier for a peripheral: the BLE address where the platform
/// reports one, otherwise the platform peripheral ID (macOS reports
/// all-zero addresses).
fn identifier(peripheral: &Peripheral, address: btleplug::api::BDAddr) -> String {
    let addr = address.to_string();
    if addr == "00:00:00:00:00:00" {
        format!("{:?}", peripheral.id())
            .trim_start_matches("PeripheralId(")
            .trim_end_matches(')')
            .to_string()
    } else {
        addr
    }
}

/// The real BLE central. Caches the peripherals seen by the most recent
/// scan so `connect` can find them by identifier.
pub struct BtleCentral {
    adapter: Adapter,
    seen: Mutex<HashMap<String, Peripheral>>,
}

impl std::fmt::Debug for BtleCentral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleCentral").finish_non_exhaustive()
    }
}

impl BtleCentral {
    /// Create a central over the first available adapter.
    pub async fn new() -> Result<Self> {
        Ok(Self {
            adapter: get_adapter().await?,
            seen: Mutex::new(HashMap::new()),
        })
    }

    /// Create a central over a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            seen: Mutex::new(HashMap::new()),
        }
    }

    async fn lookup(&self, address: &str) -> Option<Peripheral> {
        self.seen.lock().await.get(address).cloned()
    }
}

#[async_trait]
impl CentralStack for BtleCentral {
    async fn scan(&self, duration: Duration) -> Result<Vec<Advertisement>> {
        debug!(?duration, "Starting BLE scan");
        self.adapter.start_scan(ScanFilter::default()).await?;
        sleep(duration).await;
        self.adapter.stop_scan().await?;

        let peripherals = self.adapter.peripherals().await?;
        let mut seen = self.seen.lock().await;
        let mut results = Vec::with_capacity(peripherals.len());
        for peripheral in peripherals {
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };
            let address = identifier(&peripheral, props.address);
            seen.insert(address.clone(), peripheral);
            results.push(Advertisement {
                address,
                name: props.local_name,
                rssi: props.rssi,
                appearance: None,
                services: props.services,
            });
        }
        info!(count = results.len(), "Scan complete");
        Ok(results)
    }

    async fn connect(&self, address: &str, kind: AddressKind) -> Result<Arc<dyn CentralConnection>> {
        let peripheral = match self.lookup(address).await {
            Some(p) => p,
            None => {
                // Not cached from a prior scan; run a short one.
                debug!(address, "Peripheral not cached, rescanning");
                self.scan(Duration::from_secs(3)).await?;
                self.lookup(address)
                    .await
                    .ok_or_else(|| Error::connect_failed(address, "Device not found in scan"))?
            }
        };

        debug!(address, ?kind, "Connecting");
        peripheral
            .connect()
            .await
            .map_err(|e| Error::connect_failed(address, e.to_string()))?;
        peripheral.discover_services().await?;

        Ok(Arc::new(BtlePeripheral {
            address: address.to_string(),
            peripheral,
            subscriptions: Mutex::new(HashMap::new()),
        }))
    }
}

/// A connected btleplug peripheral.
pub struct BtlePeripheral {
    address: String,
    peripheral: Peripheral,
    /// Notification reader tasks, keyed by characteristic UUID so
    /// unsubscribe can abort the matching reader.
    subscriptions: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl std::fmt::Debug for BtlePeripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtlePeripheral")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl BtlePeripheral {
    fn find_characteristic(&self, uuid: Uuid) -> Result<btleplug::api::Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| Error::stream(format!("Characteristic {uuid} not found")))
    }
}

#[async_trait]
impl CentralConnection for BtlePeripheral {
    fn address(&self) -> &str {
        &self.address
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn services(&self) -> Result<Vec<GattService>> {
        let mut handle: u16 = 1;
        let services = self
            .peripheral
            .services()
            .into_iter()
            .map(|service| GattService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| {
                        let characteristic = GattCharacteristic {
                            uuid: c.uuid,
                            can_notify: c.properties.contains(CharPropFlags::NOTIFY),
                            can_indicate: c.properties.contains(CharPropFlags::INDICATE),
                            handle,
                        };
                        handle += 1;
                        characteristic
                    })
                    .collect(),
            })
            .collect();
        Ok(services)
    }

    async fn subscribe(&self, characteristic: Uuid, handler: NotificationHandler) -> Result<()> {
        let target = self.find_characteristic(characteristic)?;
        self.peripheral.subscribe(&target).await?;

        let mut stream = self.peripheral.notifications().await?;
        let reader = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid == characteristic {
                    handler(&notification.value);
                }
            }
        });

        if let Some(old) = self
            .subscriptions
            .lock()
            .await
            .insert(characteristic, reader)
        {
            old.abort();
        }
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        if let Some(reader) = self.subscriptions.lock().await.remove(&characteristic) {
            reader.abort();
        }
        let target = self.find_characteristic(characteristic)?;
        self.peripheral.unsubscribe(&target).await?;
        Ok(())
    }

    async fn rssi(&self) -> Result<Option<i16>> {
        match self.peripheral.properties().await {
            Ok(props) => Ok(props.and_then(|p| p.rssi)),
            Err(e) => {
                warn!(error = %e, "Failed to read RSSI");
                Ok(None)
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        for (_, reader) in self.subscriptions.lock().await.drain() {
            reader.abort();
        }
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
