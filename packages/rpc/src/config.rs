#![allow(dead_code)]

use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;

/// Main configuration for the RPC facade
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ethereum: EthereumConfig,
    pub canton: CantonConfig,
    pub token: TokenConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Requests over this many concurrently queued Canton submissions get 429
    #[serde(default = "default_submission_queue_limit")]
    pub submission_queue_limit: usize,
    #[serde(default = "default_rate_limit_per_hour")]
    pub rate_limit_per_hour: u32,
}

#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

/// The EVM-side identity the facade presents to wallets
#[derive(Debug, Clone, Deserialize)]
pub struct EthereumConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Token contract address wallets send ERC-20 calls to
    pub token_contract: String,
}

#[derive(Clone, Deserialize)]
pub struct CantonConfig {
    pub rpc_url: String,
    pub relayer_party: String,
    pub bridge_package_id: String,
    pub core_package_id: String,
    pub cip56_package_id: String,
    #[serde(default)]
    pub auth: Option<CantonAuthConfig>,
}

impl fmt::Debug for CantonConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CantonConfig")
            .field("rpc_url", &self.rpc_url)
            .field("relayer_party", &self.relayer_party)
            .field("bridge_package_id", &self.bridge_package_id)
            .field("core_package_id", &self.core_package_id)
            .field("cip56_package_id", &self.cip56_package_id)
            .field("auth", &self.auth)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct CantonAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub audience: String,
    pub token_url: String,
}

impl fmt::Debug for CantonAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CantonAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("audience", &self.audience)
            .field("token_url", &self.token_url)
            .finish()
    }
}

impl CantonAuthConfig {
    pub fn to_auth_config(&self) -> canton_rs::AuthConfig {
        canton_rs::AuthConfig {
            token_url: self.token_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            audience: self.audience.clone(),
        }
    }
}

/// Token metadata and facade behaviour
#[derive(Clone, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    /// Cached balances older than this are refreshed from Canton on read
    #[serde(default = "default_balance_ttl")]
    pub balance_ttl_seconds: u64,
    /// 32-byte hex master secret for the custodial key store
    pub keystore_master_key: String,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("name", &self.name)
            .field("symbol", &self.symbol)
            .field("decimals", &self.decimals)
            .field("balance_ttl_seconds", &self.balance_ttl_seconds)
            .field("keystore_master_key", &"<redacted>")
            .finish()
    }
}

fn default_port() -> u16 {
    8545
}

fn default_submission_queue_limit() -> usize {
    64
}

fn default_rate_limit_per_hour() -> u32 {
    3600
}

fn default_decimals() -> u8 {
    18
}

fn default_balance_ttl() -> u64 {
    30
}

impl Config {
    /// Load configuration from environment variables.
    /// Loads .env file if present, then reads from environment.
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    fn load_from_env() -> Result<Self> {
        let server = ServerConfig {
            port: env::var("RPC_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_port),
            submission_queue_limit: env::var("RPC_SUBMISSION_QUEUE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_submission_queue_limit),
            rate_limit_per_hour: env::var("BRIDGE_RATE_LIMIT_PER_HOUR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_rate_limit_per_hour),
        };

        let database = DatabaseConfig {
            host: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("DB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5432),
            user: env::var("DB_USER")
                .map_err(|_| eyre!("DB_USER environment variable is required"))?,
            password: env::var("DB_PASSWORD")
                .map_err(|_| eyre!("DB_PASSWORD environment variable is required"))?,
            database: env::var("DB_NAME")
                .map_err(|_| eyre!("DB_NAME environment variable is required"))?,
            ssl_mode: env::var("DB_SSL_MODE").unwrap_or_else(|_| "disable".to_string()),
        };

        let ethereum = EthereumConfig {
            rpc_url: env::var("ETH_RPC_URL")
                .map_err(|_| eyre!("ETH_RPC_URL environment variable is required"))?,
            chain_id: env::var("ETH_CHAIN_ID")
                .map_err(|_| eyre!("ETH_CHAIN_ID environment variable is required"))?
                .parse()
                .wrap_err("ETH_CHAIN_ID must be a valid u64")?,
            token_contract: env::var("ETH_TOKEN_CONTRACT")
                .map_err(|_| eyre!("ETH_TOKEN_CONTRACT environment variable is required"))?,
        };

        let auth = match env::var("CANTON_AUTH_CLIENT_ID") {
            Ok(client_id) if !client_id.is_empty() => Some(CantonAuthConfig {
                client_id,
                client_secret: env::var("CANTON_AUTH_CLIENT_SECRET")
                    .map_err(|_| eyre!("CANTON_AUTH_CLIENT_SECRET is required with auth"))?,
                audience: env::var("CANTON_AUTH_AUDIENCE")
                    .map_err(|_| eyre!("CANTON_AUTH_AUDIENCE is required with auth"))?,
                token_url: env::var("CANTON_AUTH_TOKEN_URL")
                    .map_err(|_| eyre!("CANTON_AUTH_TOKEN_URL is required with auth"))?,
            }),
            _ => None,
        };

        let canton = CantonConfig {
            rpc_url: env::var("CANTON_RPC_URL")
                .map_err(|_| eyre!("CANTON_RPC_URL environment variable is required"))?,
            relayer_party: env::var("CANTON_RELAYER_PARTY")
                .map_err(|_| eyre!("CANTON_RELAYER_PARTY environment variable is required"))?,
            bridge_package_id: env::var("CANTON_BRIDGE_PACKAGE_ID")
                .map_err(|_| eyre!("CANTON_BRIDGE_PACKAGE_ID environment variable is required"))?,
            core_package_id: env::var("CANTON_CORE_PACKAGE_ID")
                .map_err(|_| eyre!("CANTON_CORE_PACKAGE_ID environment variable is required"))?,
            cip56_package_id: env::var("CANTON_CIP56_PACKAGE_ID")
                .map_err(|_| eyre!("CANTON_CIP56_PACKAGE_ID environment variable is required"))?,
            auth,
        };

        let token = TokenConfig {
            name: env::var("TOKEN_NAME").unwrap_or_else(|_| "Wayfinder".to_string()),
            symbol: env::var("BRIDGE_TOKEN_SYMBOL")
                .map_err(|_| eyre!("BRIDGE_TOKEN_SYMBOL environment variable is required"))?,
            decimals: env::var("BRIDGE_TOKEN_DECIMALS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_decimals),
            balance_ttl_seconds: env::var("BALANCE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_balance_ttl),
            keystore_master_key: env::var("KEYSTORE_MASTER_KEY")
                .map_err(|_| eyre!("KEYSTORE_MASTER_KEY environment variable is required"))?,
        };

        let config = Config {
            server,
            database,
            ethereum,
            canton,
            token,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ethereum.token_contract.len() != 42
            || !self.ethereum.token_contract.starts_with("0x")
        {
            return Err(eyre!(
                "ethereum.token_contract must be a valid hex address (42 chars with 0x prefix)"
            ));
        }

        if self.token.symbol.is_empty() {
            return Err(eyre!("token.symbol cannot be empty"));
        }

        let key = self.token.keystore_master_key.trim_start_matches("0x");
        if key.len() != 64 || hex::decode(key).is_err() {
            return Err(eyre!(
                "token.keystore_master_key must be 32 bytes of hex"
            ));
        }

        if self.server.submission_queue_limit == 0 {
            return Err(eyre!("server.submission_queue_limit must be positive"));
        }

        Ok(())
    }

    pub fn templates(&self) -> canton_rs::BridgeTemplates {
        canton_rs::BridgeTemplates::new(
            &self.canton.bridge_package_id,
            &self.canton.core_package_id,
            &self.canton.cip56_package_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig {
                port: 8545,
                submission_queue_limit: 64,
                rate_limit_per_hour: 3600,
            },
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                user: "bridge".to_string(),
                password: "pw".to_string(),
                database: "wayfinder".to_string(),
                ssl_mode: "disable".to_string(),
            },
            ethereum: EthereumConfig {
                rpc_url: "http://localhost:8545".to_string(),
                chain_id: 31337,
                token_contract: "0x0000000000000000000000000000000000000002".to_string(),
            },
            canton: CantonConfig {
                rpc_url: "http://localhost:7575".to_string(),
                relayer_party: "relayer::1220aa".to_string(),
                bridge_package_id: "pkg-bridge".to_string(),
                core_package_id: "pkg-core".to_string(),
                cip56_package_id: "pkg-cip56".to_string(),
                auth: None,
            },
            token: TokenConfig {
                name: "Wayfinder".to_string(),
                symbol: "PROMPT".to_string(),
                decimals: 18,
                balance_ttl_seconds: 30,
                keystore_master_key: "01".repeat(32),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_master_key_validation() {
        let mut config = valid_config();
        config.token.keystore_master_key = "abcd".to_string();
        assert!(config.validate().is_err());

        config.token.keystore_master_key = format!("0x{}", "02".repeat(32));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_master_key() {
        let debug = format!("{:?}", valid_config());
        assert!(!debug.contains(&"01".repeat(32)));
        assert!(debug.contains("<redacted>"));
    }
}
