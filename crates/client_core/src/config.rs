use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use shared::domain::{Address, ChainId};
use tracing::warn;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "minter.toml";
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x5f106c84F473649Bf6F027c0bDf37D7C06225890";

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    pub rpc_url: String,
    pub contract_address: String,
    pub expected_chain_id: u64,
    pub poll_interval_ms: u64,
    pub receipt_poll_interval_ms: u64,
    pub account: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".into(),
            contract_address: DEFAULT_CONTRACT_ADDRESS.into(),
            expected_chain_id: ChainId::GOERLI.0,
            poll_interval_ms: 3_000,
            receipt_poll_interval_ms: 1_000,
            account: None,
        }
    }
}

impl ClientSettings {
    pub fn rpc_endpoint(&self) -> anyhow::Result<Url> {
        let url = Url::parse(self.rpc_url.trim())
            .with_context(|| format!("invalid rpc url '{}'", self.rpc_url))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(anyhow!(
                "rpc url '{}' must use http or https, not {other}",
                self.rpc_url
            )),
        }
    }

    pub fn contract(&self) -> anyhow::Result<Address> {
        self.contract_address
            .parse()
            .with_context(|| format!("invalid contract address '{}'", self.contract_address))
    }

    pub fn account(&self) -> anyhow::Result<Option<Address>> {
        self.account
            .as_deref()
            .map(|raw| {
                raw.parse()
                    .with_context(|| format!("invalid account address '{raw}'"))
            })
            .transpose()
    }

    pub fn expected_chain_id(&self) -> ChainId {
        ChainId(self.expected_chain_id)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms.max(1))
    }
}

/// Defaults, then the optional TOML file, then the environment. An
/// unreadable or malformed file is skipped with a warning.
pub fn load_settings(config_path: Option<&Path>) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Some((path, raw)) = read_config_file(config_path) {
        if let Err(err) = apply_file_overrides(&mut settings, &raw) {
            warn!(path = %path.display(), "config: ignoring malformed settings file: {err}");
        }
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
}

/// The default file may be absent; a path given explicitly must be readable.
fn read_config_file(config_path: Option<&Path>) -> Option<(&Path, String)> {
    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(path) {
        Ok(raw) => Some((path, raw)),
        Err(err) if config_path.is_some() => {
            warn!(path = %path.display(), "config: cannot read settings file: {err}");
            None
        }
        Err(_) => None,
    }
}

fn apply_file_overrides(
    settings: &mut ClientSettings,
    raw: &str,
) -> Result<(), toml::de::Error> {
    let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(raw)?;
    let get = |key: &str| -> Option<String> {
        file_cfg.get(key).map(|value| match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    };

    if let Some(v) = get("rpc_url") {
        settings.rpc_url = v;
    }
    if let Some(v) = get("contract_address") {
        settings.contract_address = v;
    }
    if let Some(v) = get("expected_chain_id").and_then(|v| v.parse().ok()) {
        settings.expected_chain_id = v;
    }
    if let Some(v) = get("poll_interval_ms").and_then(|v| v.parse().ok()) {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = get("receipt_poll_interval_ms").and_then(|v| v.parse().ok()) {
        settings.receipt_poll_interval_ms = v;
    }
    if let Some(v) = get("account") {
        settings.account = Some(v);
    }
    Ok(())
}

fn apply_env_overrides(settings: &mut ClientSettings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("RPC_URL") {
        settings.rpc_url = v;
    }
    if let Some(v) = env("APP__RPC_URL") {
        settings.rpc_url = v;
    }

    if let Some(v) = env("CONTRACT_ADDRESS") {
        settings.contract_address = v;
    }
    if let Some(v) = env("APP__CONTRACT_ADDRESS") {
        settings.contract_address = v;
    }

    if let Some(v) = env("APP__EXPECTED_CHAIN_ID").and_then(|v| v.parse().ok()) {
        settings.expected_chain_id = v;
    }
    if let Some(v) = env("APP__POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = env("APP__RECEIPT_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        settings.receipt_poll_interval_ms = v;
    }
    if let Some(v) = env("APP__ACCOUNT") {
        settings.account = Some(v);
    }
}
