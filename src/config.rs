use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub ports: PortMap,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub user: UserConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Registry,
    Relay,
    User,
    /// Boot the whole overlay (registry, relays, users) in one process.
    #[default]
    Network,
}

/// The deterministic port numbering scheme. A relay listens on
/// `relay_base + node_id`, a user on `user_base + user_id`; hop addresses
/// are derived from these, never stored in the registry.
#[derive(Deserialize, Debug, Clone)]
pub struct PortMap {
    #[serde(default = "default_registry_port")]
    pub registry: u16,
    #[serde(default = "default_relay_base")]
    pub relay_base: u16,
    #[serde(default = "default_user_base")]
    pub user_base: u16,
}

impl Default for PortMap {
    fn default() -> Self {
        Self {
            registry: default_registry_port(),
            relay_base: default_relay_base(),
            user_base: default_user_base(),
        }
    }
}

impl PortMap {
    pub fn relay_port(&self, node_id: u32) -> u16 {
        self.relay_base + node_id as u16
    }

    pub fn user_port(&self, user_id: u32) -> u16 {
        self.user_base + user_id as u16
    }
}

fn default_registry_port() -> u16 {
    8080
}
fn default_relay_base() -> u16 {
    4000
}
fn default_user_base() -> u16 {
    19090
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub node_id: u32,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub user_id: u32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_relays")]
    pub relays: u32,
    #[serde(default = "default_users")]
    pub users: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            relays: default_relays(),
            users: default_users(),
        }
    }
}

fn default_relays() -> u32 {
    5
}
fn default_users() -> u32 {
    2
}

impl Config {
    pub fn registry_addr(&self) -> String {
        format!("127.0.0.1:{}", self.ports.registry)
    }
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: Config = toml::from_str(&config_str)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_port_numbering_scheme() {
        let cfg = Config::default();
        assert_eq!(cfg.ports.registry, 8080);
        assert_eq!(cfg.ports.relay_port(3), 4003);
        assert_eq!(cfg.ports.user_port(0), 19090);
        assert_eq!(cfg.mode, Mode::Network);
    }

    #[test]
    fn parses_a_minimal_relay_config() {
        let cfg: Config = toml::from_str(
            r#"
            mode = "relay"

            [relay]
            node_id = 4
            "#,
        )
        .unwrap();
        assert_eq!(cfg.mode, Mode::Relay);
        assert_eq!(cfg.relay.node_id, 4);
        assert_eq!(cfg.ports.relay_port(cfg.relay.node_id), 4004);
    }
}
