use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf};

/// What the host answers to new pairing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingPolicy {
    /// Trust every pairing request immediately.
    Approve,
    /// Answer `pending_approval` but accept the device's signed calls,
    /// for hosts that confirm out of band and approve quietly.
    Pending,
    /// Refuse all new pairings.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub bind_addr: SocketAddr,

    /// Name shown to paired devices in the health response.
    pub display_name: String,

    pub pairing_policy: PairingPolicy,

    /// Where the host's long-lived private key lives. Created on first
    /// start when missing. `None` means an ephemeral key per process,
    /// which invalidates all pairings on restart.
    pub key_path: Option<PathBuf>,

    /// Hostname devices should use to reach this host. Embedded in the
    /// pairing code; defaults to the machine's bind address host.
    pub advertised_hostname: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8765".parse().unwrap(),
            display_name: "Bridge Host".to_string(),
            pairing_policy: PairingPolicy::Approve,
            key_path: None,
            advertised_hostname: None,
        }
    }
}

impl HostConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BRIDGE_BIND_ADDR") {
            config.bind_addr = addr.parse()?;
        }

        if let Ok(name) = std::env::var("BRIDGE_DISPLAY_NAME") {
            config.display_name = name;
        }

        if let Ok(policy) = std::env::var("BRIDGE_PAIRING_POLICY") {
            config.pairing_policy = match policy.as_str() {
                "approve" => PairingPolicy::Approve,
                "pending" => PairingPolicy::Pending,
                "reject" => PairingPolicy::Reject,
                other => anyhow::bail!("unknown pairing policy: {}", other),
            };
        }

        if let Ok(path) = std::env::var("BRIDGE_KEY_PATH") {
            config.key_path = Some(PathBuf::from(path));
        }

        if let Ok(hostname) = std::env::var("BRIDGE_ADVERTISED_HOSTNAME") {
            config.advertised_hostname = Some(hostname);
        }

        Ok(config)
    }

    pub fn from_toml(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HostConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.display_name.is_empty() {
            anyhow::bail!("display_name must not be empty");
        }
        Ok(())
    }

    /// Hostname to embed in the pairing code.
    pub fn advertised_hostname(&self) -> String {
        self.advertised_hostname
            .clone()
            .unwrap_or_else(|| self.bind_addr.ip().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        assert!(HostConfig::default().validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = HostConfig {
            bind_addr: "127.0.0.1:9999".parse().unwrap(),
            display_name: "Office Mac".to_string(),
            pairing_policy: PairingPolicy::Pending,
            key_path: Some(PathBuf::from("/tmp/host.key")),
            advertised_hostname: Some("mac.local".to_string()),
        };
        let text = toml::to_string(&config).unwrap();
        let parsed: HostConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.pairing_policy, PairingPolicy::Pending);
        assert_eq!(parsed.advertised_hostname(), "mac.local");
    }

    #[test]
    fn test_empty_display_name_rejected() {
        let config = HostConfig {
            display_name: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
