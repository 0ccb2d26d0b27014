use std::fs::{read_to_string, File};
use std::io::Write;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use toml_edit::{value, Document};

use crate::rest_transport::RetryPolicy;
use crate::websocket::connection::WebSocketSettings;

pub static EXCHANGE_ACCOUNT_ID: &str = "exchange_account_id";
pub static API_KEY: &str = "api_key";
pub static SECRET_KEY: &str = "secret_key";
pub static CONFIG_PATH: &str = "config.toml";
pub static CREDENTIALS_PATH: &str = "credentials.toml";

/// Every setting the gateway needs to run (C12): which exchange account to
/// trade under, and how the HTTP ingress is bound. Deserialized from the
/// merged `config.toml` + `credentials.toml` document -- see
/// [`try_load_settings`].
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct GatewaySettings {
    pub exchange: ExchangeSettings,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExchangeSettings {
    pub exchange_account_id: String,
    pub api_key: String,
    pub secret_key: String,
    /// Futures (USD-M) trading when true, spot otherwise.
    pub is_margin_trading: bool,
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub rest: RestSettings,
    #[serde(default)]
    pub websocket: WebSocketSettingsToml,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            exchange_account_id: String::new(),
            api_key: String::new(),
            secret_key: String::new(),
            is_margin_trading: false,
            recv_window_ms: default_recv_window_ms(),
            rate_limit: RateLimitSettings::default(),
            rest: RestSettings::default(),
            websocket: WebSocketSettingsToml::default(),
        }
    }
}

fn default_recv_window_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RateLimitSettings {
    pub rate: f64,
    pub burst: f64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        // Binance spot weight limit is generous; a conservative default that
        // keeps a single gateway instance well under it.
        Self { rate: 10.0, burst: 20.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RestSettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
    pub request_timeout_ms: u64,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 2000,
            max_retries: 3,
            request_timeout_ms: 10_000,
        }
    }
}

impl RestSettings {
    pub fn to_retry_policy(self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_retries: self.max_retries,
        }
    }

    pub fn request_timeout(self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct WebSocketSettingsToml {
    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketSettingsToml {
    fn default() -> Self {
        let defaults = WebSocketSettings::default();
        Self {
            ping_interval_ms: defaults.ping_interval.as_millis() as u64,
            pong_timeout_ms: defaults.pong_timeout.as_millis() as u64,
            reconnect_interval_ms: defaults.reconnect_interval.as_millis() as u64,
            max_reconnect_attempts: defaults.max_reconnect_attempts,
        }
    }
}

impl WebSocketSettingsToml {
    pub fn to_connection_settings(self) -> WebSocketSettings {
        WebSocketSettings {
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            pong_timeout: Duration::from_millis(self.pong_timeout_ms),
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HttpSettings {
    pub bind_addr: String,
    /// Static `X-API-KEY` an inbound request must present. `None` disables
    /// the check -- used for local development against testnet.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_owned(),
            api_key: None,
        }
    }
}

/// Reads and merges `config_path` + `credentials_path`, returning fully
/// parsed settings. Mirrors the teacher's credential-merge-by-account-id
/// split: `config.toml` is safe to commit, `credentials.toml` never is.
/// `GATEWAY_API_KEY`/`GATEWAY_SECRET_KEY` env vars override the credentials
/// file when present (the path the testnet client factory uses in CI).
pub fn try_load_settings(config_path: &str, credentials_path: &str) -> Result<GatewaySettings> {
    let settings = read_to_string(config_path)
        .with_context(|| format!("unable to load settings file: {config_path}"))?;
    let credentials = read_to_string(credentials_path)
        .with_context(|| format!("unable to load credentials file: {credentials_path}"))?;

    let merged = merge_credentials(&settings, &credentials)?;
    let mut parsed: GatewaySettings = toml_edit::de::from_document(merged)
        .context("unable to parse combined gateway settings")?;

    if let Ok(api_key) = std::env::var("GATEWAY_API_KEY") {
        parsed.exchange.api_key = api_key;
    }
    if let Ok(secret_key) = std::env::var("GATEWAY_SECRET_KEY") {
        parsed.exchange.secret_key = secret_key;
    }

    if parsed.exchange.exchange_account_id.is_empty() {
        bail!("exchange.exchange_account_id must not be empty");
    }
    if parsed.exchange.api_key.is_empty() || parsed.exchange.secret_key.is_empty() {
        bail!("exchange api_key/secret_key must not be empty after merging credentials");
    }

    Ok(parsed)
}

/// Serializes `settings` back to `config_path`/`credentials_path`, splitting
/// the credential fields back out into the untracked credentials file.
/// `config.toml` never carries a secret after this call.
pub fn save_settings(settings: &GatewaySettings, config_path: &str, credentials_path: &str) -> Result<()> {
    let serialized = toml_edit::ser::to_string_pretty(settings)
        .context("unable to serialize gateway settings")?;
    let mut document: Document = serialized.parse().context("unable to parse serialized settings")?;

    let exchange_account_id = settings.exchange.exchange_account_id.clone();
    let exchange_table = document
        .as_table_mut()
        .get_mut("exchange")
        .and_then(|item| item.as_table_mut())
        .ok_or_else(|| anyhow!("serialized settings missing [exchange] table"))?;
    exchange_table.remove(API_KEY);
    exchange_table.remove(SECRET_KEY);

    let mut credentials_document = Document::new();
    credentials_document[exchange_account_id.as_str()][API_KEY] = value(settings.exchange.api_key.clone());
    credentials_document[exchange_account_id.as_str()][SECRET_KEY] = value(settings.exchange.secret_key.clone());

    File::create(credentials_path)
        .with_context(|| format!("unable to create credentials file: {credentials_path}"))?
        .write_all(credentials_document.to_string().as_bytes())?;
    File::create(config_path)
        .with_context(|| format!("unable to create config file: {config_path}"))?
        .write_all(document.to_string().as_bytes())?;

    Ok(())
}

fn merge_credentials(settings: &str, credentials: &str) -> Result<Document> {
    let mut document: Document = settings.parse().context("unable to parse config.toml")?;
    let credentials: Document = credentials.parse().context("unable to parse credentials.toml")?;
    let credentials = credentials.as_table();

    let exchange_table = document
        .as_table_mut()
        .get_mut("exchange")
        .and_then(|item| item.as_table_mut())
        .ok_or_else(|| anyhow!("config.toml is missing the [exchange] table"))?;

    let exchange_account_id = exchange_table
        .get(EXCHANGE_ACCOUNT_ID)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("config.toml [exchange] is missing exchange_account_id"))?
        .to_owned();

    let api_key = credentials
        .get(exchange_account_id.as_str())
        .and_then(|v| v.get(API_KEY))
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("credentials.toml is missing api_key for '{exchange_account_id}'"))?
        .to_owned();
    let secret_key = credentials
        .get(exchange_account_id.as_str())
        .and_then(|v| v.get(SECRET_KEY))
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("credentials.toml is missing secret_key for '{exchange_account_id}'"))?
        .to_owned();

    if api_key.is_empty() || secret_key.is_empty() {
        bail!("credentials.toml api_key/secret_key must not be empty");
    }

    exchange_table.insert(API_KEY, value(api_key));
    exchange_table.insert(SECRET_KEY, value(secret_key));

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[exchange]
exchange_account_id = "Binance_0"
is_margin_trading = false

[http]
bind_addr = "0.0.0.0:8080"
api_key = "operator-secret"
"#;

    const CREDENTIALS: &str = r#"
[Binance_0]
api_key = "my-api-key"
secret_key = "my-secret-key"
"#;

    #[test]
    fn merge_credentials_injects_api_and_secret_key() {
        let merged = merge_credentials(CONFIG, CREDENTIALS).expect("merge should succeed");
        let parsed: GatewaySettings =
            toml_edit::de::from_document(merged).expect("parse should succeed");

        assert_eq!(parsed.exchange.api_key, "my-api-key");
        assert_eq!(parsed.exchange.secret_key, "my-secret-key");
        assert_eq!(parsed.http.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn merge_credentials_rejects_unknown_account_id() {
        let credentials = r#"
[SomeOtherAccount]
api_key = "x"
secret_key = "y"
"#;
        let err = merge_credentials(CONFIG, credentials).expect_err("must fail");
        assert!(err.to_string().contains("Binance_0"));
    }

    #[test]
    fn merge_credentials_rejects_empty_secret() {
        let credentials = r#"
[Binance_0]
api_key = "my-api-key"
secret_key = ""
"#;
        assert!(merge_credentials(CONFIG, credentials).is_err());
    }

    #[test]
    fn save_settings_round_trips_without_leaking_secrets() {
        let dir = std::env::temp_dir().join(format!("gateway-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let config_path = dir.join("config.toml");
        let credentials_path = dir.join("credentials.toml");

        let settings = GatewaySettings {
            exchange: ExchangeSettings {
                exchange_account_id: "Binance_0".to_owned(),
                api_key: "secret-api-key".to_owned(),
                secret_key: "secret-secret-key".to_owned(),
                ..ExchangeSettings::default()
            },
            http: HttpSettings::default(),
        };

        save_settings(
            &settings,
            config_path.to_str().expect("utf8 path"),
            credentials_path.to_str().expect("utf8 path"),
        )
        .expect("save should succeed");

        let config_contents = read_to_string(&config_path).expect("read config");
        assert!(!config_contents.contains("secret-api-key"));
        assert!(!config_contents.contains("secret-secret-key"));

        let reloaded = try_load_settings(
            config_path.to_str().expect("utf8 path"),
            credentials_path.to_str().expect("utf8 path"),
        )
        .expect("reload should succeed");
        assert_eq!(reloaded.exchange.api_key, "secret-api-key");
        assert_eq!(reloaded.exchange.secret_key, "secret-secret-key");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
