//! Trait abstractions over the BLE central stack.
//!
//! The link manager drives the radio through [`CentralStack`] and
//! [`CentralConnection`], which abstract over the real btleplug backend
//! ([`crate::platform::BtleCentral`]) and the in-memory mock used in tests
//! ([`crate::mock::MockCentral`]).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// Address kind to attempt when connecting.
///
/// Embedded central stacks distinguish public from random (resolvable)
/// addresses and a connect attempt can fail on the wrong kind; the link
/// manager therefore tries `Public` first and retries with `Random`.
/// Backends where the platform resolves the address kind internally may
/// treat this parameter as advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// Fixed public device address.
    Public,
    /// Random (static or resolvable private) address.
    Random,
}

/// One advertisement record harvested during a scan.
///
/// The same address may be reported more than once per scan; deduplication
/// is the caller's job.
#[derive(Debug, Clone)]
pub struct Advertisement {
    /// Device address or platform identifier.
    pub address: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Signal strength in dBm, if reported.
    pub rssi: Option<i16>,
    /// GAP appearance code, if advertised.
    pub appearance: Option<u16>,
    /// Advertised service UUIDs.
    pub services: Vec<Uuid>,
}

/// A discovered GATT characteristic.
#[derive(Debug, Clone)]
pub struct GattCharacteristic {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Supports notifications.
    pub can_notify: bool,
    /// Supports indications.
    pub can_indicate: bool,
    /// Attribute handle, for display/diagnostics.
    pub handle: u16,
}

impl GattCharacteristic {
    /// Whether the peripheral can push values on this characteristic.
    pub fn is_eligible(&self) -> bool {
        self.can_notify || self.can_indicate
    }
}

/// A discovered GATT service and its characteristics.
#[derive(Debug, Clone)]
pub struct GattService {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics within the service, in discovery order.
    pub characteristics: Vec<GattCharacteristic>,
}

/// Callback invoked for each inbound notification.
///
/// Runs on the stack's own delivery context, concurrently with the caller;
/// implementations must be short and must not block.
pub type NotificationHandler = Box<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// The scanning/connecting half of the BLE central role.
#[async_trait]
pub trait CentralStack: Send + Sync {
    /// Run one bounded scan and return the harvested advertisements.
    async fn scan(&self, duration: Duration) -> Result<Vec<Advertisement>>;

    /// Connect to a peripheral by address, using the given address kind.
    async fn connect(
        &self,
        address: &str,
        kind: AddressKind,
    ) -> Result<Arc<dyn CentralConnection>>;
}

/// An established connection to one peripheral.
#[async_trait]
pub trait CentralConnection: Send + Sync + std::fmt::Debug {
    /// Address of the connected peripheral.
    fn address(&self) -> &str;

    /// Whether the link is still up, per the stack's view.
    async fn is_connected(&self) -> bool;

    /// Discovered services of the peripheral, in discovery order.
    async fn services(&self) -> Result<Vec<GattService>>;

    /// Subscribe a characteristic for notify-or-indicate delivery.
    ///
    /// The handler is invoked for every inbound value update until
    /// [`unsubscribe`](Self::unsubscribe) or disconnect.
    async fn subscribe(&self, characteristic: Uuid, handler: NotificationHandler) -> Result<()>;

    /// Stop delivery for a previously subscribed characteristic.
    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Current RSSI of the active connection, dBm, if the platform
    /// reports one.
    async fn rssi(&self) -> Result<Option<i16>>;

    /// Tear the link down. Idempotent.
    async fn disconnect(&self) -> Result<()>;
}
