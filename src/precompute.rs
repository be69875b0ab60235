//! Predicts the remote TokenMessenger address before it is deployed.
//!
//! A TokenMessenger must be told the address of its counterpart on the
//! other domain at initialization. The counterpart's address follows
//! from its deployer's next nonce, so it can be written to the `.env`
//! file ahead of the remote deployment.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use alloy::hex;
use alloy::primitives::Address;
use alloy::providers::Provider;
use tracing::info;
use url::Url;

use crate::config::Ctx;

pub const REMOTE_TOKEN_MESSENGER_DEPLOYER: &str = "REMOTE_TOKEN_MESSENGER_DEPLOYER";
pub const REMOTE_DOMAIN: &str = "REMOTE_DOMAIN";
pub const REMOTE_TOKEN_MESSENGER_ADDRESS: &str = "REMOTE_TOKEN_MESSENGER_ADDRESS";

#[derive(Debug, thiserror::Error)]
pub enum PrecomputeError {
    #[error("failed to parse env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("failed to write env file: {0}")]
    Io(#[from] std::io::Error),
    #[error("{key} is not set in the environment or in {}", .path.display())]
    MissingVar { key: &'static str, path: PathBuf },
    #[error("{key}={value} is not an address: {source}")]
    InvalidAddress {
        key: &'static str,
        value: String,
        #[source]
        source: hex::FromHexError,
    },
    #[error("{key}={value} is not a domain: {source}")]
    InvalidDomain {
        key: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("no chain configured for domain {domain}")]
    UnknownDomain { domain: u32 },
    #[error("failed to fetch deployer nonce: {0}")]
    Rpc(#[from] alloy::transports::TransportError),
}

/// Address of the contract `sender` creates with `nonce`:
/// `keccak256(rlp([sender, nonce]))[12..]`.
pub fn compute_create_address(sender: Address, nonce: u64) -> Address {
    sender.create(nonce)
}

/// `KEY=VALUE` file read without touching the process environment.
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
    vars: BTreeMap<String, String>,
}

impl EnvFile {
    pub fn read(path: impl Into<PathBuf>) -> Result<Self, PrecomputeError> {
        let path = path.into();
        let vars = dotenvy::from_path_iter(&path)?.collect::<Result<_, _>>()?;

        Ok(Self { path, vars })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Looks `key` up in the process environment, then in the file. An
    /// exported variable takes precedence over the file's value.
    pub fn require(&self, key: &'static str) -> Result<String, PrecomputeError> {
        self.require_with(key, |key| std::env::var(key).ok())
    }

    fn require_with(
        &self,
        key: &'static str,
        process_env: impl FnOnce(&str) -> Option<String>,
    ) -> Result<String, PrecomputeError> {
        process_env(key)
            .or_else(|| self.get(key).map(str::to_owned))
            .ok_or_else(|| PrecomputeError::MissingVar {
                key,
                path: self.path.clone(),
            })
    }

    /// Appends `KEY=VALUE`, starting a new line if the file does not end
    /// with one.
    pub fn append(&mut self, key: &str, value: &str) -> Result<(), PrecomputeError> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)?;

        let needs_newline = if file.metadata()?.len() == 0 {
            false
        } else {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            last[0] != b'\n'
        };

        if needs_newline {
            writeln!(file)?;
        }
        writeln!(file, "{key}={value}")?;

        self.vars.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Picks the remote RPC endpoint: an explicit URL wins, otherwise
/// `REMOTE_DOMAIN` from the env file selects a configured chain.
pub fn resolve_remote_rpc_url(
    explicit: Option<Url>,
    env: &EnvFile,
    ctx: &Ctx,
) -> Result<Url, PrecomputeError> {
    if let Some(url) = explicit {
        return Ok(url);
    }

    let value = env.require(REMOTE_DOMAIN)?;
    let domain = value
        .parse::<u32>()
        .map_err(|source| PrecomputeError::InvalidDomain {
            key: REMOTE_DOMAIN,
            value: value.clone(),
            source,
        })?;

    ctx.chain_by_domain(domain)
        .map(|chain| chain.rpc_url.clone())
        .ok_or(PrecomputeError::UnknownDomain { domain })
}

/// Computes where `REMOTE_TOKEN_MESSENGER_DEPLOYER` will create its next
/// contract on the remote chain and appends it to the env file as
/// `REMOTE_TOKEN_MESSENGER_ADDRESS`.
pub async fn precompute_remote_token_messenger_address<P: Provider>(
    env: &mut EnvFile,
    remote: &P,
) -> Result<Address, PrecomputeError> {
    let value = env.require(REMOTE_TOKEN_MESSENGER_DEPLOYER)?;
    let deployer = value
        .parse::<Address>()
        .map_err(|source| PrecomputeError::InvalidAddress {
            key: REMOTE_TOKEN_MESSENGER_DEPLOYER,
            value: value.clone(),
            source,
        })?;

    let nonce = remote.get_transaction_count(deployer).await?;
    let address = compute_create_address(deployer, nonce);

    env.append(
        REMOTE_TOKEN_MESSENGER_ADDRESS,
        &format!("0x{}", hex::encode(address)),
    )?;
    info!(
        %deployer,
        nonce,
        %address,
        path = %env.path().display(),
        "Precomputed remote token messenger address"
    );

    Ok(address)
}
