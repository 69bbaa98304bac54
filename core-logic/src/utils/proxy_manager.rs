use crate::config::ProxyConfig;
use crate::error::ConfigError;
use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub struct ProxyManager;

impl ProxyManager {
    /// Loads proxies from a list file.
    /// Format expected: independent lines of ip:port[:username:password]
    /// A missing file is not an error; the bot then runs without proxies.
    pub fn load_proxies(path: impl AsRef<Path>) -> Result<Vec<ProxyConfig>> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("{} not found. Running without proxy list.", path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            msg: e.to_string(),
        })?;

        let proxies = Self::parse_list(&content);
        info!("Loaded {} proxies from {}", proxies.len(), path.display());
        Ok(proxies)
    }

    pub fn parse_list(content: &str) -> Vec<ProxyConfig> {
        let mut proxies = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match ProxyConfig::parse(line) {
                Some(proxy) => proxies.push(proxy),
                None => warn!("Skipping invalid proxy line"),
            }
        }

        proxies
    }

    /// Single proxy from the environment (`HTTP_PROXY`), absent when unset or blank.
    pub fn from_env(var: &str) -> Option<ProxyConfig> {
        std::env::var(var)
            .ok()
            .and_then(|value| ProxyConfig::parse(&value))
    }
}
