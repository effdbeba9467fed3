use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

/// Sepolia chain identifier; the faucet refuses to start against anything else
/// unless explicitly reconfigured.
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;

/// 0.01 ETH in wei, the fixed payout per accepted request.
pub const DEFAULT_DISPENSE_AMOUNT_WEI: u64 = 10_000_000_000_000_000;

/// Minimum gas for a plain value transfer.
pub const DEFAULT_GAS_LIMIT: u64 = 21_000;

/// One dispensation per address per 24 hours.
pub const DEFAULT_COOLDOWN_SECS: i64 = 24 * 60 * 60;

const DEFAULT_SITEVERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub chain: ChainConfig,
    pub faucet: FaucetConfig,
    pub verification: VerificationConfig,
}

impl ApiConfig {
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var("FAUCET_API_CONFIG").unwrap_or_else(|_| "config/api.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("FAUCET_API_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/api.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        // Secrets (signing key, reCAPTCHA secret, database URL) are expected
        // to arrive via FAUCET_API__<SECTION>__<KEY> environment variables
        // layered over the file.
        builder = builder.add_source(Environment::with_prefix("FAUCET_API").separator("__"));

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize API configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            bail!("Database URL must be specified");
        }
        if self.chain.rpc_url.is_empty() {
            bail!("Chain RPC endpoint URL must be specified");
        }
        if self.faucet.private_key.is_empty() {
            bail!("Faucet signing key must be specified (faucet.private_key)");
        }
        if self.verification.secret.is_empty() {
            bail!("reCAPTCHA secret key must be specified (verification.secret)");
        }
        assert!(
            self.server.port > 0,
            "Server port must be greater than zero"
        );
        self.faucet.ensure_bounds()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        assert!(self.port < 65535, "HTTP port must be below 65535");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    #[serde(default = "ChainConfig::default_chain_id")]
    pub chain_id: u64,
    pub request_timeout_ms: Option<u64>,
}

impl ChainConfig {
    pub fn request_timeout(&self) -> Duration {
        let millis = self.request_timeout_ms.unwrap_or(5_000);
        assert!(millis >= 100, "RPC timeout must be at least 100ms");
        assert!(millis <= 60_000, "RPC timeout cannot exceed 60 seconds");
        Duration::from_millis(millis)
    }

    const fn default_chain_id() -> u64 {
        DEFAULT_CHAIN_ID
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaucetConfig {
    /// Hex-encoded secp256k1 signing key; never logged
    #[serde(default)]
    pub private_key: String,
    #[serde(default = "FaucetConfig::default_dispense_amount_wei")]
    pub dispense_amount_wei: u64,
    #[serde(default = "FaucetConfig::default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "FaucetConfig::default_cooldown_secs")]
    pub cooldown_secs: i64,
}

impl FaucetConfig {
    fn ensure_bounds(&self) -> Result<()> {
        assert!(
            self.dispense_amount_wei > 0,
            "Dispense amount must be positive"
        );
        assert!(
            self.dispense_amount_wei <= 1_000_000_000_000_000_000,
            "Dispense amount exceeds 1 ETH defensive limit"
        );
        assert!(
            self.gas_limit >= DEFAULT_GAS_LIMIT,
            "Gas limit below plain-transfer minimum"
        );
        assert!(self.cooldown_secs > 0, "Cooldown window must be positive");
        assert!(
            self.cooldown_secs <= 7 * 86_400,
            "Cooldown window exceeds one week"
        );
        Ok(())
    }

    const fn default_dispense_amount_wei() -> u64 {
        DEFAULT_DISPENSE_AMOUNT_WEI
    }

    const fn default_gas_limit() -> u64 {
        DEFAULT_GAS_LIMIT
    }

    const fn default_cooldown_secs() -> i64 {
        DEFAULT_COOLDOWN_SECS
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    /// Server-held reCAPTCHA secret; never logged
    #[serde(default)]
    pub secret: String,
    #[serde(default = "VerificationConfig::default_siteverify_url")]
    pub siteverify_url: String,
    pub request_timeout_ms: Option<u64>,
}

impl VerificationConfig {
    pub fn request_timeout(&self) -> Duration {
        let millis = self.request_timeout_ms.unwrap_or(5_000);
        assert!(millis >= 100, "Verification timeout must be at least 100ms");
        assert!(
            millis <= 30_000,
            "Verification timeout cannot exceed 30 seconds"
        );
        Duration::from_millis(millis)
    }

    fn default_siteverify_url() -> String {
        DEFAULT_SITEVERIFY_URL.to_string()
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}
