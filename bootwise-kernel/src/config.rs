use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, path::PathBuf};
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub http: HttpConf,
    pub mqtt: MqttConf,
    pub storage: StorageConf,
    pub profiles: ProfilesConf,
    pub server: ServerConf,
    pub proxy_headers: ProxyHeadersConf,
    /// Extra values exposed to every rendered profile.
    pub env: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConf {
    pub data_file: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProfilesConf {
    pub dir: PathBuf,
    pub boilerplate: String,
}

/// Address booting devices use to reach this API.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConf {
    pub address: String,
    pub port: u16,
    pub protocol: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProxyHeadersConf {
    pub ip: String,
    pub port: String,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "bootwise-kernel".into(),
            keep_alive_secs: 15,
            request_timeout_ms: 5000,
        }
    }
}

impl Default for StorageConf {
    fn default() -> Self {
        Self { data_file: PathBuf::from("./data/bootwise.json") }
    }
}

impl Default for ProfilesConf {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./profiles"),
            boilerplate: "boilerplate.ipxe".into(),
        }
    }
}

impl Default for ServerConf {
    fn default() -> Self {
        Self {
            address: "172.31.128.1".into(),
            port: 8080,
            protocol: "http".into(),
        }
    }
}

impl Default for ProxyHeadersConf {
    fn default() -> Self {
        Self {
            ip: "x-rackhd-api-proxy-ip".into(),
            port: "x-rackhd-api-proxy-port".into(),
        }
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, serde_yaml::Error> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    serde_yaml::from_str(txt)
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("BOOTWISE_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        parse_config(&txt).unwrap_or_else(|e| {
            warn!(%path, error = %e, "invalid config, using defaults");
            KernelConfig::default()
        })
    } else {
        info!(%path, "no config file, using defaults");
        KernelConfig::default()
    }
}
