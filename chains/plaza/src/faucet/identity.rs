use anyhow::{Context, Result};
use core_logic::ProxyConfig;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

pub const API_KEY_HEADER: &str = "x-plaza-api-key";

const CHROME_WINDOWS: &[(&str, &str)] = &[
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/121.0.0.0 Safari/537.36",
    ),
    ("accept", "application/json"),
    ("accept-language", "en-US,en;q=0.9"),
    ("accept-encoding", "gzip, deflate, br"),
    ("origin", "https://plaza.finance"),
    ("referer", "https://plaza.finance/"),
    ("connection", "keep-alive"),
    ("sec-ch-ua", "\"Not A(Brand\";v=\"99\", \"Google Chrome\";v=\"121\""),
];

const SAFARI_MAC: &[(&str, &str)] = &[
    (
        "user-agent",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) Safari/605.1.15",
    ),
    ("accept", "application/json"),
    ("accept-language", "en-US,en;q=0.9"),
    ("accept-encoding", "gzip, deflate, br"),
    ("origin", "https://plaza.finance"),
    ("referer", "https://plaza.finance/"),
    ("connection", "keep-alive"),
    ("sec-ch-ua", "\"Safari\";v=\"605.1.15\""),
];

/// Headers and egress used for one faucet attempt.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub headers: HeaderMap,
    pub proxy: Option<ProxyConfig>,
}

pub trait IdentityRotation: Send + Sync {
    fn next_identity(&self) -> RequestIdentity;
}

/// Random browser header set plus a random proxy, if any are configured.
pub struct BrowserIdentities {
    header_sets: Vec<HeaderMap>,
    proxies: Vec<ProxyConfig>,
}

impl BrowserIdentities {
    pub fn new(api_key: &str, proxies: Vec<ProxyConfig>) -> Result<Self> {
        let api_key = HeaderValue::from_str(api_key).context("Faucet API key is not a valid header")?;

        let header_sets = [CHROME_WINDOWS, SAFARI_MAC]
            .iter()
            .map(|set| {
                let mut headers = header_map(set);
                headers.insert(HeaderName::from_static(API_KEY_HEADER), api_key.clone());
                headers
            })
            .collect();

        Ok(Self {
            header_sets,
            proxies,
        })
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }
}

fn header_map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for &(name, value) in pairs {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    headers
}

impl IdentityRotation for BrowserIdentities {
    fn next_identity(&self) -> RequestIdentity {
        let mut rng = rand::thread_rng();
        RequestIdentity {
            headers: self.header_sets.choose(&mut rng).cloned().unwrap_or_default(),
            proxy: self.proxies.choose(&mut rng).cloned(),
        }
    }
}
