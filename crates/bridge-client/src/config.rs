use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Name this device reports to the host when pairing.
    pub device_name: String,

    /// Directory holding the credential file.
    pub state_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            state_dir: default_state_dir(),
        }
    }
}

fn default_device_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "bridge-client".to_string())
}

fn default_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BRIDGE_STATE_DIR") {
        return PathBuf::from(dir);
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".talkie-bridge"),
        Err(_) => PathBuf::from(".talkie-bridge"),
    }
}

impl ClientConfig {
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn load_from_env() -> Self {
        let mut config = Self::default();
        if let Ok(name) = std::env::var("BRIDGE_DEVICE_NAME") {
            config.device_name = name;
        }
        config
    }

    /// Path of the credential file inside the state directory.
    pub fn credentials_path(&self) -> PathBuf {
        self.state_dir.join("credentials.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(
            &path,
            "device_name = \"my-phone\"\nstate_dir = \"/tmp/bridge\"\n",
        )
        .unwrap();

        let config = ClientConfig::load_from_file(&path).unwrap();
        assert_eq!(config.device_name, "my-phone");
        assert_eq!(
            config.credentials_path(),
            PathBuf::from("/tmp/bridge/credentials.json")
        );
    }

    #[test]
    fn test_malformed_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "device_name = 42\n").unwrap();
        assert!(ClientConfig::load_from_file(&path).is_err());
    }
}
