//! End-to-end burn-and-mint scenario across the two simulated chains.

use alloy::primitives::U256;
use alloy::providers::ProviderBuilder;
use alloy::rpc::types::TransactionReceipt;
use tracing::info;

use crate::accounts::{Accounts, AccountsError, ChainRole, Role, Side};
use crate::attester::{Attester, AttesterError};
use crate::chain::{CctpChain, Chain, ChainError, RemoteTokenMessenger};
use crate::compiler::SolcCompiler;
use crate::config::Ctx;

pub const MINTER_ALLOWANCE: u64 = 1000;
pub const MINT_AMOUNT: u64 = 100;
pub const MAX_BURN_AMOUNT_PER_MESSAGE: u64 = 1_000_000;
pub const MAX_FEE: u64 = 10;
/// Fast transfer threshold requested by every burn.
pub const MIN_FINALITY_THRESHOLD: u32 = 1000;

const FUNDING_ETHER: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Accounts(#[from] AccountsError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Attester(#[from] AttesterError),
    #[error("{step}: expected {holder} to hold {expected}, found {actual}")]
    BalanceMismatch {
        step: &'static str,
        holder: &'static str,
        expected: U256,
        actual: U256,
    },
}

/// USDC held by each chain's user and fee recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balances {
    pub ethereum_user: U256,
    pub avalanche_user: U256,
    pub ethereum_fees: U256,
    pub avalanche_fees: U256,
}

impl Balances {
    pub fn new(
        ethereum_user: u64,
        avalanche_user: u64,
        ethereum_fees: u64,
        avalanche_fees: u64,
    ) -> Self {
        Self {
            ethereum_user: U256::from(ethereum_user),
            avalanche_user: U256::from(avalanche_user),
            ethereum_fees: U256::from(ethereum_fees),
            avalanche_fees: U256::from(avalanche_fees),
        }
    }

    fn labeled(&self) -> [(&'static str, U256); 4] {
        [
            ("ethereum user", self.ethereum_user),
            ("avalanche user", self.avalanche_user),
            ("ethereum fee recipient", self.ethereum_fees),
            ("avalanche fee recipient", self.avalanche_fees),
        ]
    }

    /// Fails on the first holder whose balance differs from `self`.
    pub fn check(&self, step: &'static str, actual: &Self) -> Result<(), ScenarioError> {
        for ((holder, expected), (_, found)) in self.labeled().into_iter().zip(actual.labeled()) {
            if expected != found {
                return Err(ScenarioError::BalanceMismatch {
                    step,
                    holder,
                    expected,
                    actual: found,
                });
            }
        }

        Ok(())
    }
}

/// Both chains deployed, wired to each other, plus the attester.
pub struct CctpHarness {
    pub ethereum: CctpChain,
    pub avalanche: CctpChain,
    attester: Attester,
}

impl CctpHarness {
    /// Deploys and wires CCTP on both chains.
    pub async fn setup(ctx: &Ctx) -> Result<Self, ScenarioError> {
        let accounts = Accounts::from_mnemonic(&ctx.mnemonic)?;

        if ctx.fund_accounts {
            let amount = U256::from(FUNDING_ETHER) * U256::from(10u64).pow(U256::from(18u64));
            for side in Side::BOTH {
                let provider = ProviderBuilder::new().connect_http(ctx.chain(side).rpc_url.clone());
                accounts.fund(&provider, amount).await?;
            }
        }

        let compiler = SolcCompiler::new(&ctx.contracts_root);
        let connect = |side| {
            Chain::connect(
                ctx.chain(side).clone(),
                side,
                &accounts,
                compiler.clone(),
                ctx.confirmation,
            )
        };

        let ethereum = connect(Side::Ethereum);
        let avalanche = connect(Side::Avalanche);

        // USDC exists on both chains before either CCTP stack.
        let ethereum_usdc = ethereum.deploy_usdc().await?;
        let avalanche_usdc = avalanche.deploy_usdc().await?;

        let ethereum = ethereum.deploy_cctp(ethereum_usdc, None).await?;
        let avalanche = avalanche
            .deploy_cctp(avalanche_usdc, Some(remote_messenger(&ethereum)))
            .await?;

        let harness = Self {
            ethereum,
            avalanche,
            attester: Attester::new(accounts.signer(Role::Attester).clone()),
        };
        harness.wire().await?;

        Ok(harness)
    }

    async fn wire(&self) -> Result<(), ScenarioError> {
        let allowance = U256::from(MINTER_ALLOWANCE);

        for chain in self.chains() {
            chain
                .configure_minter(chain.address(ChainRole::UsdcMasterMinter), allowance)
                .await?;
        }
        for chain in self.chains() {
            chain
                .configure_minter(chain.contracts.token_minter, allowance)
                .await?;
        }
        for chain in self.chains() {
            chain.add_local_token_messenger().await?;
        }
        for chain in self.chains() {
            chain
                .set_max_burn_amount_per_message(U256::from(MAX_BURN_AMOUNT_PER_MESSAGE))
                .await?;
        }

        self.ethereum
            .link_token_pair(self.avalanche.domain(), self.avalanche.contracts.usdc)
            .await?;
        self.avalanche
            .link_token_pair(self.ethereum.domain(), self.ethereum.contracts.usdc)
            .await?;

        // Avalanche learned about Ethereum's messenger at initialization.
        self.ethereum
            .add_remote_token_messenger(remote_messenger(&self.avalanche))
            .await?;

        info!("CCTP wired on both chains");
        Ok(())
    }

    const fn chains(&self) -> [&CctpChain; 2] {
        [&self.ethereum, &self.avalanche]
    }

    pub const fn chain(&self, side: Side) -> &CctpChain {
        match side {
            Side::Ethereum => &self.ethereum,
            Side::Avalanche => &self.avalanche,
        }
    }

    pub async fn mint(&self, side: Side, amount: U256) -> Result<(), ScenarioError> {
        let chain = self.chain(side);
        chain.mint(chain.user(), amount).await?;
        Ok(())
    }

    /// Approves and burns `amount` from the `source` user towards the
    /// user on the other chain.
    pub async fn burn(
        &self,
        source: Side,
        amount: U256,
        max_fee: U256,
        min_finality_threshold: u32,
    ) -> Result<TransactionReceipt, ScenarioError> {
        let from = self.chain(source);
        let to = self.chain(source.remote());

        from.approve(amount).await?;
        let receipt = from
            .deposit_for_burn(amount, to.domain(), to.user(), max_fee, min_finality_threshold)
            .await?;

        Ok(receipt)
    }

    /// Picks up the message a burn on `source` emitted, attests it and
    /// delivers it on the other chain.
    pub async fn relay(
        &self,
        source: Side,
        burn: &TransactionReceipt,
    ) -> Result<TransactionReceipt, ScenarioError> {
        let message = self.chain(source).message_sent_in(burn).await?;
        let attested = self.attester.attest(&message).await?;
        let receipt = self.chain(source.remote()).receive_message(&attested).await?;

        Ok(receipt)
    }

    /// One full leg with the default fee cap and finality.
    pub async fn transfer(
        &self,
        source: Side,
        amount: U256,
    ) -> Result<TransactionReceipt, ScenarioError> {
        let burn = self
            .burn(source, amount, U256::from(MAX_FEE), MIN_FINALITY_THRESHOLD)
            .await?;
        self.relay(source, &burn).await
    }

    pub async fn balances(&self) -> Result<Balances, ScenarioError> {
        Ok(Balances {
            ethereum_user: self.ethereum.usdc_balance(self.ethereum.user()).await?,
            avalanche_user: self.avalanche.usdc_balance(self.avalanche.user()).await?,
            ethereum_fees: self
                .ethereum
                .usdc_balance(self.ethereum.fee_recipient())
                .await?,
            avalanche_fees: self
                .avalanche
                .usdc_balance(self.avalanche.fee_recipient())
                .await?,
        })
    }

    async fn assert_balances(
        &self,
        step: &'static str,
        expected: Balances,
    ) -> Result<(), ScenarioError> {
        let actual = self.balances().await?;
        expected.check(step, &actual)?;
        info!(step, ?actual, "Balances match");
        Ok(())
    }
}

fn remote_messenger(chain: &CctpChain) -> RemoteTokenMessenger {
    RemoteTokenMessenger {
        domain: chain.domain(),
        address: chain.contracts.token_messenger,
    }
}

/// Mints on both chains, then moves the full amount from Avalanche to
/// Ethereum and back, checking balances and fees after every step.
pub async fn run_crosschain_transfer(harness: &CctpHarness) -> Result<(), ScenarioError> {
    let amount = U256::from(MINT_AMOUNT);
    let max_fee = U256::from(MAX_FEE);

    harness.mint(Side::Avalanche, amount).await?;
    harness.mint(Side::Ethereum, amount).await?;
    harness
        .assert_balances("mint", Balances::new(100, 100, 0, 0))
        .await?;

    let burn = harness
        .burn(Side::Avalanche, amount, max_fee, MIN_FINALITY_THRESHOLD)
        .await?;
    harness
        .assert_balances("burn on avalanche", Balances::new(100, 0, 0, 0))
        .await?;

    harness.relay(Side::Avalanche, &burn).await?;
    harness
        .assert_balances("receive on ethereum", Balances::new(195, 0, 5, 0))
        .await?;

    let burn = harness
        .burn(Side::Ethereum, amount, max_fee, MIN_FINALITY_THRESHOLD)
        .await?;
    harness
        .assert_balances("burn on ethereum", Balances::new(95, 0, 5, 0))
        .await?;

    harness.relay(Side::Ethereum, &burn).await?;
    harness
        .assert_balances("receive on avalanche", Balances::new(95, 95, 5, 5))
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_balances_pass() {
        let expected = Balances::new(195, 0, 5, 0);

        expected.check("receive", &Balances::new(195, 0, 5, 0)).unwrap();
    }

    #[test]
    fn mismatch_names_step_and_holder() {
        let expected = Balances::new(95, 95, 5, 5);
        let actual = Balances::new(95, 95, 5, 0);

        let err = expected.check("receive on avalanche", &actual).unwrap_err();

        assert!(
            matches!(
                err,
                ScenarioError::BalanceMismatch {
                    step: "receive on avalanche",
                    holder: "avalanche fee recipient",
                    expected,
                    actual,
                } if expected == U256::from(5) && actual == U256::ZERO
            ),
            "got: {err:?}"
        );
        assert_eq!(
            err.to_string(),
            "receive on avalanche: expected avalanche fee recipient to hold 5, found 0"
        );
    }

    #[test]
    fn first_mismatch_is_reported() {
        let err = Balances::new(100, 100, 0, 0)
            .check("mint", &Balances::new(0, 0, 0, 0))
            .unwrap_err();

        assert!(
            matches!(err, ScenarioError::BalanceMismatch { holder: "ethereum user", .. }),
            "got: {err:?}"
        );
    }

    #[test]
    fn fee_covers_executed_fee_within_cap() {
        // Each leg burns the full mint, the destination keeps the executed fee.
        let fee = U256::from(crate::attester::DEFAULT_FEE_EXECUTED);

        assert!(fee <= U256::from(MAX_FEE));
        assert_eq!(U256::from(MINT_AMOUNT) * U256::from(2) - fee, U256::from(195));
    }
}
