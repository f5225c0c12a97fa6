use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Wire constants shared by the hub, the upstream client and the gateway.
pub const CONFIRMATION_TOPIC: &str = "confirmation";
pub const DEFAULT_PORT: u16 = 28000;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_NODE_WS_ADDRESS: &str = "ws://127.0.0.1:7078";
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024; // hard cap per inbound client frame
pub const DEFAULT_CLIENT_QUEUE: usize = 256; // per-client outbound buffer
pub const DEFAULT_CONFIG_FILE: &str = "nanorelay.toml";
pub const ENV_PREFIX: &str = "NANORELAY_";

/// Top-level config (nanorelay.toml + NANORELAY_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub relay: RelaySettings,
}

/// Downstream listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Upstream node connection and its reconnect policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_ws_address")]
    pub ws_address: String,
    /// Give up on a single connect attempt after this long.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    #[serde(default = "default_min_reconnect_delay_ms")]
    pub min_reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
    /// Consecutive failed attempts before the client stops retrying.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ws_address: default_ws_address(),
            connection_timeout_ms: default_connection_timeout_ms(),
            min_reconnect_delay_ms: default_min_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

/// Relay behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Enables the unfiltered listen-all side channel and its second
    /// upstream connection.
    #[serde(default)]
    pub allow_listen_all: bool,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_client_queue")]
    pub client_queue: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            allow_listen_all: false,
            topic: default_topic(),
            client_queue: DEFAULT_CLIENT_QUEUE,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_ws_address() -> String {
    DEFAULT_NODE_WS_ADDRESS.to_string()
}
fn default_connection_timeout_ms() -> u64 {
    1_000
}
fn default_min_reconnect_delay_ms() -> u64 {
    10
}
fn default_max_reconnect_delay_ms() -> u64 {
    2_000
}
fn default_max_retries() -> u32 {
    100_000
}
fn default_topic() -> String {
    CONFIRMATION_TOPIC.to_string()
}
fn default_client_queue() -> usize {
    DEFAULT_CLIENT_QUEUE
}

impl RelayConfig {
    /// Load config from a TOML file with NANORELAY_* env var overrides.
    ///
    /// Nested keys use a double underscore:
    /// `NANORELAY_NODE__WS_ADDRESS=ws://node:7078`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or(DEFAULT_CONFIG_FILE);

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        figment
            .extract()
            .map_err(|e| crate::error::RelayError::Config(e.to_string()))
    }
}
