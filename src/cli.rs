//! Command-line entry points for deploying CCTP, running the transfer
//! scenario and precomputing messenger addresses.

use std::io::Write;
use std::path::PathBuf;

use alloy::primitives::Address;
use alloy::providers::ProviderBuilder;
use clap::{Parser, Subcommand};
use tracing::info;
use url::Url;

use crate::chain::CctpChain;
use crate::config::Ctx;
use crate::precompute::{
    EnvFile, compute_create_address, precompute_remote_token_messenger_address,
    resolve_remote_rpc_url,
};
use crate::scenario::{CctpHarness, run_crosschain_transfer};

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Deploy and wire CCTP V2 on both chains, then print the addresses
    Deploy,
    /// Deploy both chains and run the round-trip USDC transfer scenario
    Transfer,
    /// Append the remote TokenMessenger's future address to an env file
    ///
    /// Reads REMOTE_TOKEN_MESSENGER_DEPLOYER from the environment or the env
    /// file. Without --remote-rpc-url, REMOTE_DOMAIN selects one of the
    /// configured chains.
    Precompute {
        /// RPC URL of the remote chain
        #[arg(long = "remote-rpc-url", alias = "REMOTE_RPC_URL")]
        remote_rpc_url: Option<Url>,
        /// Env file to read from and append to
        #[arg(long = "env-file", default_value = ".env")]
        env_file: PathBuf,
    },
    /// Print the address `sender` creates a contract at with `nonce`
    ComputeAddress {
        #[arg(long)]
        sender: Address,
        #[arg(long)]
        nonce: u64,
    },
}

#[derive(Debug, Parser)]
#[command(name = "cctp-harness")]
#[command(about = "Deploys CCTP V2 on local chains and exercises cross-chain USDC transfers")]
#[command(version)]
pub struct CliEnv {
    /// Path to TOML configuration file. Defaults to a local Anvil node.
    #[clap(long, env = "CCTP_CONFIG_FILE")]
    config_file: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

impl CliEnv {
    /// Parse CLI arguments, load config from file, and return with subcommand.
    pub fn parse_and_convert() -> anyhow::Result<(Ctx, Commands)> {
        Self::parse().load()
    }

    pub(crate) fn load(self) -> anyhow::Result<(Ctx, Commands)> {
        let ctx = match &self.config_file {
            Some(path) => Ctx::load_file(path)?,
            None => Ctx::local()?,
        };
        Ok((ctx, self.command))
    }
}

pub async fn run_command(ctx: Ctx, command: Commands) -> anyhow::Result<()> {
    run_command_with_writer(ctx, command, &mut std::io::stdout()).await
}

async fn run_command_with_writer<W: Write>(
    ctx: Ctx,
    command: Commands,
    stdout: &mut W,
) -> anyhow::Result<()> {
    match command {
        Commands::Deploy => {
            let harness = CctpHarness::setup(&ctx).await?;
            write_deployment(stdout, &harness.ethereum)?;
            write_deployment(stdout, &harness.avalanche)?;
        }
        Commands::Transfer => {
            let harness = CctpHarness::setup(&ctx).await?;
            run_crosschain_transfer(&harness).await?;

            let balances = harness.balances().await?;
            writeln!(stdout, "Cross-chain transfer completed")?;
            writeln!(
                stdout,
                "  {} user: {}, fees: {}",
                harness.ethereum.name(),
                balances.ethereum_user,
                balances.ethereum_fees
            )?;
            writeln!(
                stdout,
                "  {} user: {}, fees: {}",
                harness.avalanche.name(),
                balances.avalanche_user,
                balances.avalanche_fees
            )?;
        }
        Commands::Precompute {
            remote_rpc_url,
            env_file,
        } => {
            let mut env = EnvFile::read(env_file)?;
            let rpc_url = resolve_remote_rpc_url(remote_rpc_url, &env, &ctx)?;
            info!(%rpc_url, "Querying remote deployer nonce");

            let provider = ProviderBuilder::new().connect_http(rpc_url);
            let address = precompute_remote_token_messenger_address(&mut env, &provider).await?;
            writeln!(stdout, "REMOTE_TOKEN_MESSENGER_ADDRESS={address}")?;
        }
        Commands::ComputeAddress { sender, nonce } => {
            writeln!(stdout, "{}", compute_create_address(sender, nonce))?;
        }
    }

    Ok(())
}

fn write_deployment<W: Write>(stdout: &mut W, chain: &CctpChain) -> std::io::Result<()> {
    let contracts = &chain.contracts;

    writeln!(stdout, "{} (domain {})", chain.name(), chain.domain())?;
    writeln!(stdout, "  USDC:                 {}", contracts.usdc)?;
    writeln!(stdout, "  MessageTransmitterV2: {}", contracts.message_transmitter)?;
    writeln!(stdout, "  TokenMinterV2:        {}", contracts.token_minter)?;
    writeln!(stdout, "  TokenMessengerV2:     {}", contracts.token_messenger)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;
    use crate::precompute::PrecomputeError;

    #[test]
    fn compute_address_parses_sender_and_nonce() {
        let cli = CliEnv::try_parse_from([
            "cctp-harness",
            "compute-address",
            "--sender",
            "0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0",
            "--nonce",
            "1",
        ])
        .unwrap();

        assert!(matches!(
            cli.command,
            Commands::ComputeAddress { sender, nonce: 1 }
                if sender == address!("0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0")
        ));
    }

    #[test]
    fn precompute_accepts_uppercase_remote_rpc_url_flag() {
        let cli = CliEnv::try_parse_from([
            "cctp-harness",
            "precompute",
            "--REMOTE_RPC_URL",
            "http://127.0.0.1:9650/ext/bc/C/rpc",
        ])
        .unwrap();

        let Commands::Precompute {
            remote_rpc_url,
            env_file,
        } = cli.command
        else {
            panic!("expected precompute command");
        };
        assert_eq!(
            remote_rpc_url.map(String::from).as_deref(),
            Some("http://127.0.0.1:9650/ext/bc/C/rpc")
        );
        assert_eq!(env_file, PathBuf::from(".env"));
    }

    #[test]
    fn precompute_without_url_defers_to_env_file() {
        let cli = CliEnv::try_parse_from(["cctp-harness", "precompute", "--env-file", "remote.env"])
            .unwrap();

        assert!(matches!(
            cli.command,
            Commands::Precompute { remote_rpc_url: None, ref env_file }
                if env_file == &PathBuf::from("remote.env")
        ));
    }

    #[test]
    fn invalid_remote_rpc_url_is_rejected() {
        let result = CliEnv::try_parse_from([
            "cctp-harness",
            "precompute",
            "--remote-rpc-url",
            "not a url",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn subcommand_is_required() {
        assert!(CliEnv::try_parse_from(["cctp-harness"]).is_err());
    }

    #[test]
    fn load_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cctp.toml");
        std::fs::write(&path, "fund_accounts = false\n").unwrap();

        let (ctx, command) = CliEnv::try_parse_from([
            "cctp-harness",
            "--config-file",
            path.to_str().unwrap(),
            "deploy",
        ])
        .unwrap()
        .load()
        .unwrap();

        assert!(!ctx.fund_accounts);
        assert!(matches!(command, Commands::Deploy));
    }

    #[tokio::test]
    async fn compute_address_prints_create_address() {
        let mut stdout = Vec::new();
        let command = Commands::ComputeAddress {
            sender: address!("0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0"),
            nonce: 0,
        };

        run_command_with_writer(Ctx::local().unwrap(), command, &mut stdout)
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(stdout).unwrap(),
            "0xcd234a471B72ba2F1Ccf0A70FCABA648a5eeCD8d\n"
        );
    }

    #[tokio::test]
    async fn precompute_fails_without_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let command = Commands::Precompute {
            remote_rpc_url: None,
            env_file: dir.path().join(".env"),
        };

        let err = run_command_with_writer(Ctx::local().unwrap(), command, &mut Vec::new())
            .await
            .unwrap_err();

        assert!(
            matches!(
                err.downcast_ref::<PrecomputeError>(),
                Some(PrecomputeError::Dotenv(_))
            ),
            "got: {err:?}"
        );
    }
}
