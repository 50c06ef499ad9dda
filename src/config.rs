// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::car::reader::DEFAULT_MAX_FRAME_SIZE;

/// Environment variable pointing at a configuration file.
pub const CONFIG_ENV: &str = "IPFS_TRUSTLESS_CONFIG";

/// Where `ipfs://` URLs are resolved.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMethod {
    /// A public HTTP gateway.
    #[default]
    Gateway,
    /// The gateway of a node running on this machine.
    Local,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    pub resolve_method: ResolveMethod,
    pub public_gateway: Url,
    pub local_gateway: Url,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            resolve_method: ResolveMethod::default(),
            public_gateway: Url::parse("https://dweb.link").expect("Infallible"),
            local_gateway: Url::parse("http://localhost:48080").expect("Infallible"),
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Largest CAR frame accepted from a gateway.
    pub max_frame_size: usize,
    /// Largest entity assembled in memory.
    pub max_buffered_data: u64,
    /// Most node visits a single assembly may make. Nodes linked more than
    /// once count once per link.
    pub max_dag_nodes: u64,
    /// Body size of each response chunk handed to the caller.
    pub response_chunk_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_buffered_data: 512 * 1024 * 1024,
            max_dag_nodes: 1_000_000,
            response_chunk_size: 1024 * 1024,
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct LogValue {
    pub module: String,
    pub level: String,
}

impl LogValue {
    pub fn new(module: &str, level: &str) -> Self {
        Self {
            module: module.to_string(),
            level: level.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// Level of everything without a more specific filter.
    pub level: String,
    pub filters: Vec<LogValue>,
}

impl LogConfig {
    /// Directives in `RUST_LOG` syntax.
    pub fn to_filter_string(&self) -> String {
        std::iter::once(self.level.clone())
            .chain(
                self.filters
                    .iter()
                    .map(|f| format!("{}={}", f.module, f.level)),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            filters: vec![
                LogValue::new("hyper_util", "warn"),
                LogValue::new("reqwest", "warn"),
                LogValue::new("rustls", "warn"),
            ],
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Default, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub retrieval: RetrievalConfig,
    pub log: LogConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Loads `path`, else the file named by [`CONFIG_ENV`], else the defaults.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
