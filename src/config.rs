//! Device configuration store
//!
//! Owns the broker address, device identity and the two optional topic
//! qualifiers. Mutated only through the explicit setters or the bulk
//! [`DeviceConfig::apply`] operation; everything else reads it through
//! cheap borrows. A TOML loader covers first-boot provisioning before the
//! broker can push configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::topics::TopicNamespace;

/// Well-known MQTT port, used whenever no port is supplied.
pub const DEFAULT_PORT: u16 = 1883;

/// Upper bound on the client identifier length.
pub const MAX_CLIENT_ID_LEN: usize = 48;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("invalid client id: {0}")]
    InvalidClientId(String),
}

/// Mutable device configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    broker: Option<String>,
    port: u16,
    client_id: String,
    username: Option<String>,
    password: Option<String>,
    topic_prefix: Option<String>,
    topic_suffix: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceConfig {
    pub fn new() -> Self {
        Self {
            broker: None,
            port: DEFAULT_PORT,
            client_id: String::new(),
            username: None,
            password: None,
            topic_prefix: None,
            topic_suffix: None,
        }
    }

    /// Load a bootstrap configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&content)?;

        let mut config = Self::new();
        if let Some(broker) = &file.broker {
            config.set_broker(broker, file.port.unwrap_or(DEFAULT_PORT));
        }
        if let Some(client_id) = &file.client_id {
            config.set_client_id(client_id)?;
        }
        config.set_auth(file.username.as_deref(), file.password.as_deref());
        config.set_topic_prefix(file.topic_prefix.as_deref());
        config.set_topic_suffix(file.topic_suffix.as_deref());
        Ok(config)
    }

    /// Point the device at a broker. An empty host clears the address,
    /// which suspends connect attempts until a broker is supplied again.
    pub fn set_broker(&mut self, host: &str, port: u16) {
        self.broker = (!host.is_empty()).then(|| host.to_string());
        self.port = port;
    }

    /// Set the device identity. Required before any topic can be derived.
    pub fn set_client_id(&mut self, id: &str) -> Result<(), ConfigError> {
        validate_client_id(id)?;
        self.client_id = id.to_string();
        Ok(())
    }

    /// Derive the device identity from a device type and the last three
    /// octets of its MAC address, e.g. `dev-ab12cd`.
    pub fn set_client_id_from_mac(
        &mut self,
        device_type: &str,
        mac: [u8; 6],
    ) -> Result<(), ConfigError> {
        let id = format!("{device_type}-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
        self.set_client_id(&id)
    }

    /// Set broker credentials. The pair is atomic: unless both a username
    /// and a password are supplied non-empty, both are cleared.
    pub fn set_auth(&mut self, username: Option<&str>, password: Option<&str>) {
        match (non_empty(username), non_empty(password)) {
            (Some(user), Some(pass)) => {
                self.username = Some(user.to_string());
                self.password = Some(pass.to_string());
            }
            _ => {
                self.username = None;
                self.password = None;
            }
        }
    }

    pub fn set_topic_prefix(&mut self, prefix: Option<&str>) {
        self.topic_prefix = non_empty(prefix).map(str::to_string);
    }

    pub fn set_topic_suffix(&mut self, suffix: Option<&str>) {
        self.topic_suffix = non_empty(suffix).map(str::to_string);
    }

    /// Apply a bulk configuration document.
    ///
    /// Recognized keys: `broker`, `port`, `clientId`, `username`,
    /// `password`, `topicPrefix`, `topicSuffix`. Key presence is
    /// authoritative: an absent key clears its field to the default,
    /// except `broker` and `clientId` which are sticky and keep their
    /// previous value when omitted.
    pub fn apply(&mut self, doc: &Value) {
        if let Some(host) = doc.get("broker").and_then(Value::as_str) {
            if !host.is_empty() {
                self.broker = Some(host.to_string());
            }
        }
        self.port = doc
            .get("port")
            .and_then(Value::as_u64)
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_PORT);

        if let Some(id) = doc.get("clientId").and_then(Value::as_str) {
            if let Err(err) = self.set_client_id(id) {
                warn!(error = %err, "ignoring invalid clientId in configuration");
            }
        }

        self.set_auth(
            doc.get("username").and_then(Value::as_str),
            doc.get("password").and_then(Value::as_str),
        );
        self.set_topic_prefix(doc.get("topicPrefix").and_then(Value::as_str));
        self.set_topic_suffix(doc.get("topicSuffix").and_then(Value::as_str));
    }

    pub fn broker(&self) -> Option<&str> {
        self.broker.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The device identity; empty until one has been set.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Username/password pair, present only as a pair.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }

    pub fn topic_prefix(&self) -> Option<&str> {
        self.topic_prefix.as_deref()
    }

    pub fn topic_suffix(&self) -> Option<&str> {
        self.topic_suffix.as_deref()
    }

    /// Namespace view over the current identity fields. `None` until a
    /// client id has been set.
    pub fn topics(&self) -> Option<TopicNamespace<'_>> {
        if self.client_id.is_empty() {
            return None;
        }
        Some(TopicNamespace::new(
            self.topic_prefix.as_deref(),
            &self.client_id,
            self.topic_suffix.as_deref(),
        ))
    }

    /// Read-only view for diagnostic exposure. The password is omitted.
    pub fn snapshot(&self) -> ConfigSnapshot {
        let topics = self.topics().map(|ns| TopicSet {
            config: ns.config(),
            command: ns.command(),
            status: ns.status(),
            telemetry: ns.telemetry(),
            lwt: ns.lwt(),
            adopt: ns.adopt(),
        });
        ConfigSnapshot {
            broker: self.broker.clone(),
            port: self.port,
            client_id: (!self.client_id.is_empty()).then(|| self.client_id.clone()),
            username: self.username.clone(),
            topic_prefix: self.topic_prefix.clone(),
            topic_suffix: self.topic_suffix.clone(),
            topics,
        }
    }
}

/// Serializable view of the configuration for diagnostics.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub broker: Option<String>,
    pub port: u16,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub topic_prefix: Option<String>,
    pub topic_suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<TopicSet>,
}

/// The six derived topics, included in the snapshot once a client id is set.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TopicSet {
    pub config: String,
    pub command: String,
    pub status: String,
    pub telemetry: String,
    pub lwt: String,
    pub adopt: String,
}

/// TOML file shape for first-boot provisioning.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    broker: Option<String>,
    port: Option<u16>,
    client_id: Option<String>,
    username: Option<String>,
    password: Option<String>,
    topic_prefix: Option<String>,
    topic_suffix: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Client ids must be non-empty, bounded and match `[a-zA-Z0-9._-]+`.
fn validate_client_id(id: &str) -> Result<(), ConfigError> {
    if id.is_empty() {
        return Err(ConfigError::InvalidClientId("must not be empty".into()));
    }
    if id.len() > MAX_CLIENT_ID_LEN {
        return Err(ConfigError::InvalidClientId(format!(
            "'{id}' exceeds {MAX_CLIENT_ID_LEN} characters"
        )));
    }
    let valid = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
    if !valid {
        return Err(ConfigError::InvalidClientId(format!(
            "'{id}' must match [a-zA-Z0-9._-]+"
        )));
    }
    Ok(())
}
