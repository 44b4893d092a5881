//! Configuration, trust registries, and machine identity.
//!
//! Settings persist as YAML under the user config directory
//! (`transwacom/transwacom.yaml`). Absent keys assume their defaults, so
//! a partial file merges cleanly. Trust registry writes are saved
//! synchronously because they gate authorisation decisions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;
use transwacom_types::{DeviceType, MachineIdentity};
use uuid::Uuid;

use crate::error::DaemonError;

/// Top-level persisted settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub host: HostSettings,
    #[serde(default)]
    pub consumer: ConsumerSettings,
    #[serde(default)]
    pub general: GeneralSettings,
}

/// Host-side behaviour around a share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    #[serde(default = "default_true")]
    pub relative_mode: bool,
    #[serde(default = "default_true")]
    pub disable_local: bool,
    #[serde(default)]
    pub trusted_consumers: HashMap<String, TrustedConsumer>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            relative_mode: true,
            disable_local: true,
            trusted_consumers: HashMap::new(),
        }
    }
}

/// A consumer this host will share devices with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedConsumer {
    pub consumer_id: String,
    #[serde(default = "default_true")]
    pub auto_accept: bool,
    #[serde(default = "default_device_classes")]
    pub allowed_devices: Vec<String>,
}

/// Consumer-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerSettings {
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub devices: DeviceSettings,
    #[serde(default = "default_true")]
    pub auto_accept_trusted: bool,
    #[serde(default)]
    pub trusted_hosts: HashMap<String, TrustedHost>,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            network: NetworkSettings::default(),
            devices: DeviceSettings::default(),
            auto_accept_trusted: true,
            trusted_hosts: HashMap::new(),
        }
    }
}

/// A host this consumer will accept shares from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedHost {
    pub host_id: String,
    #[serde(default = "default_true")]
    pub auto_accept: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    /// mDNS instance name; the hostname when unset.
    #[serde(default)]
    pub mdns_name: Option<String>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            mdns_name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default = "default_true")]
    pub wacom_enabled: bool,
    #[serde(default = "default_true")]
    pub joystick_enabled: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            wacom_enabled: true,
            joystick_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub startup_mode: StartupMode,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            startup_mode: StartupMode::default(),
        }
    }
}

/// Which role(s) to assume when launched without flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupMode {
    Host,
    Consumer,
    Unified,
    #[default]
    None,
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    3333
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_device_classes() -> Vec<String> {
    vec!["wacom".to_string(), "joystick".to_string()]
}

/// Typed access to persisted settings plus the machine identity.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_file: PathBuf,
    settings: Settings,
    identity: MachineIdentity,
}

impl ConfigManager {
    /// Load from the default location
    /// (`<user config dir>/transwacom/transwacom.yaml`).
    pub fn load_default() -> Result<Self, DaemonError> {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("transwacom");
        Self::load_from(dir)
    }

    /// Load from an explicit config directory.
    pub fn load_from(config_dir: PathBuf) -> Result<Self, DaemonError> {
        let config_file = config_dir.join("transwacom.yaml");

        let settings = if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)
                .map_err(|e| DaemonError::Config(format!("failed to read config: {e}")))?;
            let settings: Settings = serde_yaml::from_str(&content)
                .map_err(|e| DaemonError::Config(format!("failed to parse config: {e}")))?;
            info!(path = %config_file.display(), "loaded config");
            settings
        } else {
            info!("no config file found, using defaults");
            Settings::default()
        };

        let identity = machine_identity(&config_dir)?;

        Ok(Self {
            config_dir,
            config_file,
            settings,
            identity,
        })
    }

    /// Persist the current settings. Writes are synchronous: trust
    /// decisions must be durable before the session proceeds.
    pub fn save(&self) -> Result<(), DaemonError> {
        std::fs::create_dir_all(&self.config_dir)
            .map_err(|e| DaemonError::Config(format!("failed to create config dir: {e}")))?;
        let content = serde_yaml::to_string(&self.settings)
            .map_err(|e| DaemonError::Config(format!("failed to serialise config: {e}")))?;
        std::fs::write(&self.config_file, content)
            .map_err(|e| DaemonError::Config(format!("failed to write config: {e}")))?;
        Ok(())
    }

    #[must_use]
    pub fn identity(&self) -> &MachineIdentity {
        &self.identity
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn consumer_port(&self) -> u16 {
        self.settings.consumer.network.port
    }

    /// mDNS instance name: the configured override or the hostname.
    #[must_use]
    pub fn mdns_name(&self) -> String {
        self.settings
            .consumer
            .network
            .mdns_name
            .clone()
            .unwrap_or_else(|| self.identity.machine_name.clone())
    }

    #[must_use]
    pub fn is_device_enabled(&self, device_type: DeviceType) -> bool {
        match device_type {
            DeviceType::Wacom => self.settings.consumer.devices.wacom_enabled,
            DeviceType::Joystick => self.settings.consumer.devices.joystick_enabled,
            DeviceType::Generic => false,
        }
    }

    #[must_use]
    pub fn relative_mode(&self) -> bool {
        self.settings.host.relative_mode
    }

    #[must_use]
    pub fn disable_local(&self) -> bool {
        self.settings.host.disable_local
    }

    #[must_use]
    pub fn log_level(&self) -> &str {
        &self.settings.general.log_level
    }

    #[must_use]
    pub fn startup_mode(&self) -> StartupMode {
        self.settings.general.startup_mode
    }

    // --- trusted hosts (consumer viewpoint) ---

    /// Trust applies only when both the name and the stored id match;
    /// a changed id invalidates prior trust.
    #[must_use]
    pub fn is_host_trusted(&self, host_name: &str, host_id: &str) -> bool {
        self.settings
            .consumer
            .trusted_hosts
            .get(host_name)
            .is_some_and(|h| h.host_id == host_id)
    }

    /// Whether a handshake from this host is accepted without prompting.
    #[must_use]
    pub fn should_auto_accept_host(&self, host_name: &str, host_id: &str) -> bool {
        self.settings.consumer.auto_accept_trusted
            && self
                .settings
                .consumer
                .trusted_hosts
                .get(host_name)
                .is_some_and(|h| h.host_id == host_id && h.auto_accept)
    }

    pub fn add_trusted_host(
        &mut self,
        host_name: &str,
        host_id: &str,
        auto_accept: bool,
    ) -> Result<(), DaemonError> {
        self.settings.consumer.trusted_hosts.insert(
            host_name.to_string(),
            TrustedHost {
                host_id: host_id.to_string(),
                auto_accept,
            },
        );
        self.save()
    }

    pub fn remove_trusted_host(&mut self, host_name: &str) -> Result<(), DaemonError> {
        if self
            .settings
            .consumer
            .trusted_hosts
            .remove(host_name)
            .is_some()
        {
            self.save()?;
        }
        Ok(())
    }

    // --- trusted consumers (host viewpoint) ---

    #[must_use]
    pub fn is_consumer_trusted(&self, consumer_name: &str, consumer_id: &str) -> bool {
        self.settings
            .host
            .trusted_consumers
            .get(consumer_name)
            .is_some_and(|c| c.consumer_id == consumer_id)
    }

    #[must_use]
    pub fn allowed_devices_for_consumer(&self, consumer_name: &str) -> Vec<String> {
        self.settings
            .host
            .trusted_consumers
            .get(consumer_name)
            .map_or_else(Vec::new, |c| c.allowed_devices.clone())
    }

    pub fn add_trusted_consumer(
        &mut self,
        consumer_name: &str,
        consumer_id: &str,
        allowed_devices: Vec<String>,
        auto_accept: bool,
    ) -> Result<(), DaemonError> {
        self.settings.host.trusted_consumers.insert(
            consumer_name.to_string(),
            TrustedConsumer {
                consumer_id: consumer_id.to_string(),
                auto_accept,
                allowed_devices,
            },
        );
        self.save()
    }

    pub fn remove_trusted_consumer(&mut self, consumer_name: &str) -> Result<(), DaemonError> {
        if self
            .settings
            .host
            .trusted_consumers
            .remove(consumer_name)
            .is_some()
        {
            self.save()?;
        }
        Ok(())
    }
}

/// Build the stable machine identity.
///
/// The fingerprint is the first 16 hex chars of
/// SHA-256("hostname:machine-uuid"), where the uuid persists in a
/// `machine-id` file next to the YAML config so the fingerprint
/// survives restarts.
fn machine_identity(config_dir: &Path) -> Result<MachineIdentity, DaemonError> {
    let machine_name = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "transwacom".to_string());

    let machine_uuid = load_or_create_machine_uuid(config_dir)?;

    let digest = ring::digest::digest(
        &ring::digest::SHA256,
        format!("{machine_name}:{machine_uuid}").as_bytes(),
    );
    let machine_id: String = digest
        .as_ref()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
        .chars()
        .take(16)
        .collect();

    Ok(MachineIdentity {
        machine_id,
        machine_name,
    })
}

fn load_or_create_machine_uuid(config_dir: &Path) -> Result<Uuid, DaemonError> {
    let id_path = config_dir.join("machine-id");

    if id_path.exists() {
        let content = std::fs::read_to_string(&id_path)
            .map_err(|e| DaemonError::Config(format!("failed to read machine-id: {e}")))?;
        content
            .trim()
            .parse()
            .map_err(|e| DaemonError::Config(format!("invalid machine-id: {e}")))
    } else {
        std::fs::create_dir_all(config_dir)
            .map_err(|e| DaemonError::Config(format!("failed to create config dir: {e}")))?;
        let id = Uuid::new_v4();
        std::fs::write(&id_path, id.to_string())
            .map_err(|e| DaemonError::Config(format!("failed to write machine-id: {e}")))?;
        info!(id = %id, "created new machine id");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("transwacom-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn defaults_without_file() {
        let dir = temp_config_dir();
        let config = ConfigManager::load_from(dir.clone()).unwrap();
        assert_eq!(config.consumer_port(), 3333);
        assert!(config.relative_mode());
        assert!(config.disable_local());
        assert!(config.is_device_enabled(DeviceType::Wacom));
        assert_eq!(config.startup_mode(), StartupMode::None);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn partial_file_merges_with_defaults() {
        let dir = temp_config_dir();
        std::fs::write(
            dir.join("transwacom.yaml"),
            "consumer:\n  network:\n    port: 4444\n",
        )
        .unwrap();

        let config = ConfigManager::load_from(dir.clone()).unwrap();
        assert_eq!(config.consumer_port(), 4444);
        // Everything unspecified keeps its default.
        assert!(config.relative_mode());
        assert!(config.is_device_enabled(DeviceType::Joystick));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn machine_id_stable_across_restarts() {
        let dir = temp_config_dir();
        let first = ConfigManager::load_from(dir.clone()).unwrap();
        let second = ConfigManager::load_from(dir.clone()).unwrap();
        assert_eq!(first.identity().machine_id, second.identity().machine_id);
        assert_eq!(first.identity().machine_id.len(), 16);
        assert!(first
            .identity()
            .machine_id
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn trust_requires_matching_id() {
        let dir = temp_config_dir();
        let mut config = ConfigManager::load_from(dir.clone()).unwrap();
        config.add_trusted_host("alpha", "id-one", true).unwrap();

        assert!(config.is_host_trusted("alpha", "id-one"));
        assert!(config.should_auto_accept_host("alpha", "id-one"));

        // Same name under a different id is not trusted (name squatting).
        assert!(!config.is_host_trusted("alpha", "id-two"));
        assert!(!config.should_auto_accept_host("alpha", "id-two"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn trust_persists_across_reload() {
        let dir = temp_config_dir();
        {
            let mut config = ConfigManager::load_from(dir.clone()).unwrap();
            config.add_trusted_host("alpha", "id-one", true).unwrap();
        }
        let config = ConfigManager::load_from(dir.clone()).unwrap();
        assert!(config.is_host_trusted("alpha", "id-one"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn global_auto_accept_gate() {
        let dir = temp_config_dir();
        std::fs::write(
            dir.join("transwacom.yaml"),
            "consumer:\n  auto_accept_trusted: false\n",
        )
        .unwrap();
        let mut config = ConfigManager::load_from(dir.clone()).unwrap();
        config.add_trusted_host("alpha", "id-one", true).unwrap();

        assert!(config.is_host_trusted("alpha", "id-one"));
        assert!(!config.should_auto_accept_host("alpha", "id-one"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn revoked_host_no_longer_trusted() {
        let dir = temp_config_dir();
        let mut config = ConfigManager::load_from(dir.clone()).unwrap();
        config.add_trusted_host("alpha", "id-one", true).unwrap();
        config.remove_trusted_host("alpha").unwrap();
        assert!(!config.is_host_trusted("alpha", "id-one"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn trusted_consumer_device_classes() {
        let dir = temp_config_dir();
        let mut config = ConfigManager::load_from(dir.clone()).unwrap();
        config
            .add_trusted_consumer("beta", "id-b", vec!["wacom".to_string()], true)
            .unwrap();

        assert!(config.is_consumer_trusted("beta", "id-b"));
        assert_eq!(config.allowed_devices_for_consumer("beta"), vec!["wacom"]);
        assert!(config.allowed_devices_for_consumer("unknown").is_empty());
        std::fs::remove_dir_all(dir).ok();
    }
}
