//! JSON device store.
//!
//! Stores every device each connector has discovered. Each file is wrapped
//! in an envelope with a SHA-256 checksum, so a hand-edited or truncated
//! store is rejected instead of silently reassigning devices.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::DiscoveredDevice;

/// Current version of the store file format.
pub const STORE_VERSION: u32 = 1;

/// A device remembered across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDevice {
    /// Connector that owns the device
    pub connector: String,
    /// Last known state of the device
    #[serde(flatten)]
    pub device: DiscoveredDevice,
    /// First time any session saw the device
    pub first_seen: DateTime<Utc>,
    /// Most recent session that saw the device
    pub last_seen: DateTime<Utc>,
}

/// All known devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStore {
    /// Format version.
    pub version: u32,
    /// Last time the store changed.
    pub updated_at: DateTime<Utc>,
    /// Devices ordered by connector, then identifier.
    pub devices: Vec<StoredDevice>,
}

/// Envelope for store files to include integrity checks.
#[derive(Debug, Serialize, Deserialize)]
struct StoreEnvelope {
    checksum: String,
    store: DeviceStore,
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STORE_VERSION,
            updated_at: Utc::now(),
            devices: Vec::new(),
        }
    }

    /// Default platform-specific store location.
    ///
    /// # Errors
    ///
    /// Fails if no home directory can be determined.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "devprobe", "devprobe")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?;
        Ok(dirs.data_dir().join("devices.json"))
    }

    /// Load the store at `path`, or start empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// See [`DeviceStore::load`].
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No device store at {}, starting empty", path.display());
            Ok(Self::new())
        }
    }

    /// Load a store and verify its integrity.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, the checksum does not
    /// match, or the format version is unsupported.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read device store: {}", path.display()))?;

        let envelope: StoreEnvelope = serde_json::from_str(&content)
            .context("Failed to parse device store envelope. The file might be corrupted.")?;

        if checksum(&envelope.store)? != envelope.checksum {
            anyhow::bail!(
                "Device store integrity check failed: checksum mismatch in {}",
                path.display()
            );
        }

        let store = envelope.store;
        if store.version != STORE_VERSION {
            anyhow::bail!(
                "Unsupported device store version: {}. Current version is {}.",
                store.version,
                STORE_VERSION
            );
        }
        Ok(store)
    }

    /// Save the store, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = self.to_json()?;
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create device store: {}", path.display()))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write device store: {}", path.display()))?;
        Ok(())
    }

    /// Serialize the store with an integrity checksum.
    ///
    /// # Errors
    ///
    /// Fails only if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let envelope = StoreEnvelope {
            checksum: checksum(self)?,
            store: self.clone(),
        };
        serde_json::to_string_pretty(&envelope).context("Failed to serialize device store")
    }

    /// Identifier to owning connector for every stored device.
    #[must_use]
    pub fn claims(&self) -> HashMap<String, String> {
        self.devices
            .iter()
            .map(|d| (d.device.identifier.clone(), d.connector.clone()))
            .collect()
    }

    /// Devices owned by `connector`.
    pub fn devices_for<'a>(&'a self, connector: &'a str) -> impl Iterator<Item = &'a StoredDevice> {
        self.devices.iter().filter(move |d| d.connector == connector)
    }

    /// Record a session's discoveries for `connector`.
    ///
    /// Known devices are refreshed in place. Returns the devices that were
    /// not known to this connector before.
    pub fn record(
        &mut self,
        connector: &str,
        discovered: &[DiscoveredDevice],
    ) -> Vec<DiscoveredDevice> {
        let mut new_devices = Vec::new();

        for device in discovered {
            let existing = self.devices.iter_mut().find(|d| {
                d.connector == connector && d.device.identifier == device.identifier
            });
            match existing {
                Some(stored) => {
                    stored.device = device.clone();
                    stored.last_seen = device.discovered_at;
                }
                None => {
                    self.devices.push(StoredDevice {
                        connector: connector.to_string(),
                        device: device.clone(),
                        first_seen: device.discovered_at,
                        last_seen: device.discovered_at,
                    });
                    new_devices.push(device.clone());
                }
            }
        }

        if !discovered.is_empty() {
            self.devices.sort_by(|a, b| {
                (a.connector.as_str(), a.device.identifier.as_str())
                    .cmp(&(b.connector.as_str(), b.device.identifier.as_str()))
            });
            self.updated_at = Utc::now();
        }
        new_devices
    }
}

fn checksum(store: &DeviceStore) -> Result<String> {
    // Compact form; must match between save and load.
    let json = serde_json::to_string(store).context("Failed to serialize device store")?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn device(identifier: &str) -> DiscoveredDevice {
        DiscoveredDevice {
            identifier: identifier.to_string(),
            model: "SHSW-1".to_string(),
            name: None,
            firmware: Some("1.0".to_string()),
            address: "192.168.1.10".parse().unwrap(),
            discovered_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_reports_only_new_devices() {
        let mut store = DeviceStore::new();
        let first = store.record("lan", &[device("a"), device("b")]);
        assert_eq!(first.len(), 2);

        let second = store.record("lan", &[device("b"), device("c")]);
        let ids: Vec<_> = second.iter().map(|d| d.identifier.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
        assert_eq!(store.devices_for("lan").count(), 3);
    }

    #[test]
    fn test_record_refreshes_known_device() {
        let mut store = DeviceStore::new();
        store.record("lan", &[device("a")]);

        let mut updated = device("a");
        updated.firmware = Some("2.0".to_string());
        store.record("lan", &[updated]);

        assert_eq!(store.devices.len(), 1);
        assert_eq!(store.devices[0].device.firmware.as_deref(), Some("2.0"));
        assert!(store.devices[0].last_seen >= store.devices[0].first_seen);
    }

    #[test]
    fn test_claims_map_identifier_to_connector() {
        let mut store = DeviceStore::new();
        store.record("lan", &[device("a")]);
        store.record("garage", &[device("g")]);

        let claims = store.claims();
        assert_eq!(claims.get("a").map(String::as_str), Some("lan"));
        assert_eq!(claims.get("g").map(String::as_str), Some("garage"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("devices.json");

        let mut store = DeviceStore::new();
        store.record("lan", &[device("a")]);
        store.save(&path).unwrap();

        let loaded = DeviceStore::load(&path).unwrap();
        assert_eq!(loaded.devices, store.devices);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let store = DeviceStore::load_or_default(&dir.path().join("absent.json")).unwrap();
        assert!(store.devices.is_empty());
    }

    #[test]
    fn test_load_rejects_tampered_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("devices.json");
        let mut store = DeviceStore::new();
        store.record("lan", &[device("a")]);
        store.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replace("\"lan\"", "\"garage\"")).unwrap();

        let err = DeviceStore::load(&path).unwrap_err();
        assert!(err.to_string().contains("integrity check failed"));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("devices.json");
        let mut store = DeviceStore::new();
        store.version = 99;
        store.save(&path).unwrap();

        let err = DeviceStore::load(&path).unwrap_err();
        assert!(err.to_string().contains("Unsupported device store version"));
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("devices.json");
        fs::write(&path, "{ invalid json }").unwrap();

        let err = DeviceStore::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse device store envelope"));
    }
}
