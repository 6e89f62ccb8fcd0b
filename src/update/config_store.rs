//! Persisted configuration documents and their versioned refresh.
//!
//! ```text
//!  GET <ctrl>/api/v1/<name>  (X-chip-id, version headers)
//!        │
//!        ├─ status != 200 ──────────────────────────▶ NotModified
//!        ├─ 200, body fails schema / version drops ─▶ Rejected
//!        └─ 200, body valid ── atomic write ────────▶ Updated
//! ```
//!
//! A download only ever replaces the file on disk after it parsed against
//! the expected schema, so a truncated or corrupt body can never clobber a
//! known-good document.

use log::{debug, info, warn};
use serde::de::DeserializeOwned;

use crate::app::ports::{StoragePort, TransportPort};
use crate::config::{
    ChipId, GLOBAL_CONFIG_PATH, GlobalConfig, LOCAL_CONFIG_PATH, LocalConfig, USER_AGENT,
};
use crate::error::{ConfigError, Error, StorageError};

/// Which document a refresh targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigName {
    Global,
    Local,
}

impl ConfigName {
    /// Path segment on the control server.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Global => "global_config",
            Self::Local => "local_config",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Self::Global => GLOBAL_CONFIG_PATH,
            Self::Local => LOCAL_CONFIG_PATH,
        }
    }
}

/// Result of a refresh that reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Non-success status; nothing changed.
    NotModified,
    /// Valid document written to storage.
    Updated,
    /// Success status but the body was unusable; nothing changed.
    Rejected,
}

/// Owns the in-memory copies of both documents for one wake cycle.
pub struct ConfigStore {
    chip_id: ChipId,
    global: GlobalConfig,
    global_needs_refresh: bool,
    local: Option<LocalConfig>,
}

impl ConfigStore {
    pub fn new(chip_id: ChipId) -> Self {
        Self {
            chip_id,
            global: GlobalConfig::default(),
            global_needs_refresh: true,
            local: None,
        }
    }

    /// Load the global document.  A missing or unparsable file yields the
    /// built-in defaults and sets [`global_needs_refresh`].
    ///
    /// [`global_needs_refresh`]: Self::global_needs_refresh
    pub fn load_global(&mut self, storage: &dyn StoragePort) -> &GlobalConfig {
        match read_doc::<GlobalConfig>(storage, GLOBAL_CONFIG_PATH) {
            Ok(mut cfg) => {
                cfg.normalize();
                info!(
                    "Config: global v{} loaded (ctrl={})",
                    cfg.global_config_version, cfg.ctrl_url
                );
                self.global = cfg;
                self.global_needs_refresh = false;
            }
            Err(e) => {
                warn!("Config: global document unusable ({}), using defaults", e);
                self.global = GlobalConfig::default();
                self.global_needs_refresh = true;
            }
        }
        &self.global
    }

    /// Load the local document; `None` on first boot or when corrupt.
    pub fn load_local(&mut self, storage: &dyn StoragePort) -> Option<&LocalConfig> {
        self.local = match read_doc::<LocalConfig>(storage, LOCAL_CONFIG_PATH) {
            Ok(cfg) => {
                info!(
                    "Config: local v{} loaded, {} sensor(s), sleep {}s",
                    cfg.config_version,
                    cfg.sensors.len(),
                    cfg.sleep_time_s
                );
                Some(cfg)
            }
            Err(e) => {
                warn!("Config: local document unusable ({})", e);
                None
            }
        };
        self.local.as_ref()
    }

    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    pub fn local(&self) -> Option<&LocalConfig> {
        self.local.as_ref()
    }

    /// Informational only: a missing global document does not by itself
    /// send the node online.
    pub fn global_needs_refresh(&self) -> bool {
        self.global_needs_refresh
    }

    pub fn chip_id(&self) -> &str {
        &self.chip_id
    }

    /// Version of `name` the device currently holds.
    pub fn known_version(&self, name: ConfigName) -> u32 {
        match name {
            ConfigName::Global => self.global.global_config_version,
            ConfigName::Local => self.local.as_ref().map_or(0, |l| l.config_version),
        }
    }

    /// Fetch `name` from the control server and replace the stored copy
    /// if the response is a valid, non-older document.
    ///
    /// Errors are reserved for failures that prevented a decision: an
    /// unusable control URL, a transport failure or a failed write.
    pub fn refresh(
        &mut self,
        name: ConfigName,
        storage: &mut dyn StoragePort,
        transport: &mut dyn TransportPort,
    ) -> Result<UpdateOutcome, Error> {
        let base = self
            .global
            .api_base()
            .ok_or(ConfigError::InvalidControlUrl)?;
        let url = format!("{}/{}", base, name.endpoint());

        let version = self.known_version(name).to_string();
        let mut headers: Vec<(&str, &str)> =
            vec![("User-Agent", USER_AGENT), ("X-chip-id", self.chip_id.as_str())];
        match name {
            ConfigName::Global => {
                headers.push(("X-global-config-version", version.as_str()));
                headers.push(("X-global-config-key", self.global.global_config_key.as_str()));
            }
            ConfigName::Local => headers.push(("X-config-version", version.as_str())),
        }

        debug!("Config: GET {}", url);
        let resp = transport.get(&url, &headers)?;
        if !resp.is_ok() {
            info!("Config: {} not modified (HTTP {})", name.endpoint(), resp.status);
            return Ok(UpdateOutcome::NotModified);
        }

        let known = self.known_version(name);
        match name {
            ConfigName::Global => {
                let Some(mut cfg) = validate::<GlobalConfig>(&resp.body, name) else {
                    return Ok(UpdateOutcome::Rejected);
                };
                if cfg.global_config_version < known {
                    warn!(
                        "Config: global v{} older than v{}, rejected",
                        cfg.global_config_version, known
                    );
                    return Ok(UpdateOutcome::Rejected);
                }
                storage.write(GLOBAL_CONFIG_PATH, &resp.body)?;
                cfg.normalize();
                info!("Config: global updated to v{}", cfg.global_config_version);
                self.global = cfg;
                self.global_needs_refresh = false;
            }
            ConfigName::Local => {
                let Some(cfg) = validate::<LocalConfig>(&resp.body, name) else {
                    return Ok(UpdateOutcome::Rejected);
                };
                if cfg.config_version < known {
                    warn!(
                        "Config: local v{} older than v{}, rejected",
                        cfg.config_version, known
                    );
                    return Ok(UpdateOutcome::Rejected);
                }
                storage.write(LOCAL_CONFIG_PATH, &resp.body)?;
                info!("Config: local updated to v{}", cfg.config_version);
                self.local = Some(cfg);
            }
        }
        Ok(UpdateOutcome::Updated)
    }
}

fn read_doc<T: DeserializeOwned>(storage: &dyn StoragePort, path: &str) -> Result<T, ConfigError> {
    let bytes = storage.read(path).map_err(|e| match e {
        StorageError::NotFound => ConfigError::NotFound,
        _ => ConfigError::Malformed,
    })?;
    serde_json::from_slice(&bytes).map_err(|_| ConfigError::Malformed)
}

fn validate<T: DeserializeOwned>(body: &[u8], name: ConfigName) -> Option<T> {
    match serde_json::from_slice(body) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!("Config: {} download rejected: {}", name.endpoint(), e);
            None
        }
    }
}
