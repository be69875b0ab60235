use std::path::{Path, PathBuf};
use std::time::Duration;

use cctp_evm::ConfirmationPolicy;
use serde::Deserialize;
use tracing::Level;
use url::Url;

use crate::accounts::{ANVIL_MNEMONIC, Side};
use crate::chain::ChainConfig;

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const ETHEREUM_DOMAIN: u32 = 0;
const AVALANCHE_DOMAIN: u32 = 1;

/// Settings deserialized from the TOML config file. Every field is
/// optional; omitted values fall back to a single local Anvil node.
#[derive(Debug, Deserialize)]
struct Config {
    log_level: Option<LogLevel>,
    contracts_root: Option<PathBuf>,
    mnemonic: Option<String>,
    fund_accounts: Option<bool>,
    confirmation: Option<ConfirmationConfig>,
    ethereum: Option<ChainConfig>,
    avalanche: Option<ChainConfig>,
}

#[derive(Debug, Deserialize)]
struct ConfirmationConfig {
    interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

/// Runtime context assembled from [`Config`] with defaults applied.
#[derive(Debug, Clone)]
pub struct Ctx {
    pub log_level: LogLevel,
    /// Checkout of the CCTP contracts repository. Source paths and
    /// remappings resolve relative to it.
    pub contracts_root: PathBuf,
    pub mnemonic: String,
    /// Top up every role with `anvil_setBalance` before deploying.
    pub fund_accounts: bool,
    pub confirmation: ConfirmationPolicy,
    pub ethereum: ChainConfig,
    pub avalanche: ChainConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML")]
    Toml(#[from] toml::de::Error),
    #[error("invalid RPC URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("{first} and {second} are both configured with domain {domain}")]
    DuplicateDomain {
        domain: u32,
        first: String,
        second: String,
    },
}

fn default_chain(name: &str, domain: u32) -> Result<ChainConfig, url::ParseError> {
    Ok(ChainConfig {
        name: name.to_owned(),
        rpc_url: Url::parse(DEFAULT_RPC_URL)?,
        domain,
    })
}

impl Ctx {
    pub fn load_file(config: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(config)?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(config_toml)?;
        let ctx = Self::assemble(config)?;

        if ctx.ethereum.domain == ctx.avalanche.domain {
            return Err(ConfigError::DuplicateDomain {
                domain: ctx.ethereum.domain,
                first: ctx.ethereum.name,
                second: ctx.avalanche.name,
            });
        }

        Ok(ctx)
    }

    /// Context for a single local Anvil node with the development
    /// mnemonic.
    pub fn local() -> Result<Self, ConfigError> {
        Self::from_toml("")
    }

    fn assemble(config: Config) -> Result<Self, ConfigError> {
        let defaults = ConfirmationPolicy::default();
        let confirmation = config.confirmation.map_or(defaults, |confirmation| {
            ConfirmationPolicy {
                interval: confirmation
                    .interval_secs
                    .map_or(defaults.interval, Duration::from_secs),
                timeout: confirmation
                    .timeout_secs
                    .map_or(defaults.timeout, Duration::from_secs),
            }
        });

        let ethereum = match config.ethereum {
            Some(chain) => chain,
            None => default_chain("ethereum", ETHEREUM_DOMAIN)?,
        };
        let avalanche = match config.avalanche {
            Some(chain) => chain,
            None => default_chain("avalanche", AVALANCHE_DOMAIN)?,
        };

        Ok(Self {
            log_level: config.log_level.unwrap_or(LogLevel::Info),
            contracts_root: config.contracts_root.unwrap_or_else(|| PathBuf::from(".")),
            mnemonic: config
                .mnemonic
                .unwrap_or_else(|| ANVIL_MNEMONIC.to_owned()),
            fund_accounts: config.fund_accounts.unwrap_or(true),
            confirmation,
            ethereum,
            avalanche,
        })
    }

    pub const fn chain(&self, side: Side) -> &ChainConfig {
        match side {
            Side::Ethereum => &self.ethereum,
            Side::Avalanche => &self.avalanche,
        }
    }

    pub fn chain_by_domain(&self, domain: u32) -> Option<&ChainConfig> {
        Side::BOTH
            .into_iter()
            .map(|side| self.chain(side))
            .find(|chain| chain.domain == domain)
    }
}

pub fn setup_tracing(log_level: LogLevel) {
    let level: Level = log_level.into();
    let default_filter = format!("cctp_harness={level},cctp_evm={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
