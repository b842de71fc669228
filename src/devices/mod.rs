//! Discovered devices and their persistence.
//!
//! # Architecture
//!
//! * [`DeviceCollector`]: consumes drained discovery messages and turns them
//!   into [`DiscoveredDevice`]s.
//! * [`store`]: the JSON device store that remembers which connector owns
//!   which device, and decides which discoveries are new.

pub mod store;

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::discovery::{ConsumeError, DiscoveryMessage, MessageConsumer, TerminateSignal};

pub use store::{DeviceStore, StoredDevice, STORE_VERSION};

/// A device that answered a discovery probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Unique hardware identifier reported by the device
    pub identifier: String,
    /// Hardware model
    pub model: String,
    /// Human-readable name, if the device reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Firmware version, if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
    /// Address the response came from
    pub address: IpAddr,
    /// When the response was received
    pub discovered_at: DateTime<Utc>,
}

/// Body of a device's discovery response.
#[derive(Debug, Deserialize)]
struct ResponsePayload {
    id: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "firmware")]
    fw: Option<String>,
}

/// Collects devices from drained discovery messages.
///
/// Devices are keyed by identifier; a later response replaces an earlier
/// one from the same device.
#[derive(Debug)]
pub struct DeviceCollector {
    connector: String,
    device_filter: Option<String>,
    claims: HashMap<String, String>,
    devices: RefCell<BTreeMap<String, DiscoveredDevice>>,
}

impl DeviceCollector {
    /// Create a collector for devices found through `connector`.
    #[must_use]
    pub fn new(connector: impl Into<String>) -> Self {
        Self {
            connector: connector.into(),
            device_filter: None,
            claims: HashMap::new(),
            devices: RefCell::new(BTreeMap::new()),
        }
    }

    /// Only keep the device with this identifier.
    #[must_use]
    pub fn with_device_filter(mut self, identifier: Option<String>) -> Self {
        self.device_filter = identifier;
        self
    }

    /// Identifier to connector ownership of already stored devices.
    #[must_use]
    pub fn with_claims(mut self, claims: HashMap<String, String>) -> Self {
        self.claims = claims;
        self
    }

    /// Devices collected so far, ordered by identifier.
    #[must_use]
    pub fn devices(&self) -> Vec<DiscoveredDevice> {
        self.devices.borrow().values().cloned().collect()
    }

    /// Number of distinct devices collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.borrow().len()
    }

    /// Whether no device has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.borrow().is_empty()
    }

    fn parse(message: &DiscoveryMessage) -> Result<DiscoveredDevice, ConsumeError> {
        let malformed = |reason: String| ConsumeError::Malformed {
            sender: message.source,
            reason,
        };

        let payload: ResponsePayload =
            serde_json::from_str(message.payload.trim()).map_err(|e| malformed(e.to_string()))?;
        let identifier = payload.id.trim().to_string();
        if identifier.is_empty() {
            return Err(malformed("empty device identifier".to_string()));
        }

        Ok(DiscoveredDevice {
            identifier,
            model: payload.model.unwrap_or_else(|| "unknown".to_string()),
            name: payload.name.filter(|n| !n.is_empty()),
            firmware: payload.fw,
            address: message.source.ip(),
            discovered_at: message.received_at,
        })
    }
}

impl MessageConsumer for DeviceCollector {
    fn consume(&self, message: DiscoveryMessage) -> Result<(), ConsumeError> {
        let device = Self::parse(&message)?;

        if self
            .device_filter
            .as_deref()
            .is_some_and(|wanted| wanted != device.identifier)
        {
            log::trace!("Ignoring device {} (filtered)", device.identifier);
            return Ok(());
        }

        if let Some(owner) = self.claims.get(&device.identifier) {
            if *owner != self.connector {
                return Err(ConsumeError::Terminate(TerminateSignal::new(format!(
                    "device {} is already registered to connector {}",
                    device.identifier, owner
                ))));
            }
        }

        log::debug!(
            "Discovered {} ({}) at {}",
            device.identifier,
            device.model,
            device.address
        );
        self.devices
            .borrow_mut()
            .insert(device.identifier.clone(), device);
        Ok(())
    }
}
