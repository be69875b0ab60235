//! Named test accounts for the two simulated chains.
//!
//! Every actor gets its own key derived from one mnemonic. A call made
//! by the wrong actor reverts on chain.

use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::providers::ext::AnvilApi as _;
use alloy::signers::local::coins_bip39::English;
use alloy::signers::local::{LocalSignerError, MnemonicBuilder, PrivateKeySigner};
use tracing::debug;

/// Mnemonic Anvil and Hardhat derive their development accounts from.
pub const ANVIL_MNEMONIC: &str = "test test test test test test test test test test test junk";

/// One of the two simulated chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Ethereum,
    Avalanche,
}

impl Side {
    pub const BOTH: [Self; 2] = [Self::Ethereum, Self::Avalanche];

    /// The chain on the other end of a transfer.
    pub const fn remote(self) -> Self {
        match self {
            Self::Ethereum => Self::Avalanche,
            Self::Avalanche => Self::Ethereum,
        }
    }
}

/// Actors that exist once per chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainRole {
    UsdcMasterMinter,
    MessageTransmitterDeployer,
    TokenMinterDeployer,
    TokenMessengerDeployer,
    TokenController,
    TokenMessengerUser,
}

impl ChainRole {
    pub const ALL: [Self; 6] = [
        Self::UsdcMasterMinter,
        Self::MessageTransmitterDeployer,
        Self::TokenMinterDeployer,
        Self::TokenMessengerDeployer,
        Self::TokenController,
        Self::TokenMessengerUser,
    ];

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::UsdcMasterMinter => 0,
            Self::MessageTransmitterDeployer => 1,
            Self::TokenMinterDeployer => 2,
            Self::TokenMessengerDeployer => 3,
            Self::TokenController => 4,
            Self::TokenMessengerUser => 5,
        }
    }
}

/// Every account the scenario signs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Default development account, kept funded for ad-hoc use.
    Funder,
    /// Off-chain attester whose signature the transmitters accept.
    Attester,
    Chain(Side, ChainRole),
}

impl Role {
    /// Mnemonic derivation index. Fixed so that addresses are stable
    /// across runs.
    pub const fn derivation_index(self) -> u32 {
        match self {
            Self::Funder => 0,
            Self::Attester => 1,
            Self::Chain(Side::Ethereum, role) => 2 + role.index() as u32,
            Self::Chain(Side::Avalanche, role) => 2 + (ChainRole::ALL.len() + role.index()) as u32,
        }
    }

    pub fn all() -> impl Iterator<Item = Self> {
        [Self::Funder, Self::Attester].into_iter().chain(
            Side::BOTH
                .into_iter()
                .flat_map(|side| ChainRole::ALL.map(|role| Self::Chain(side, role))),
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccountsError {
    #[error("failed to derive account {index} from mnemonic: {source}")]
    Derivation {
        index: u32,
        #[source]
        source: LocalSignerError,
    },
    #[error("failed to fund {address}: {source}")]
    Funding {
        address: Address,
        #[source]
        source: alloy::transports::TransportError,
    },
}

/// Signers for every [`Role`], derived from a single mnemonic and
/// stored by derivation index.
pub struct Accounts {
    signers: Vec<PrivateKeySigner>,
}

impl Accounts {
    pub fn from_mnemonic(phrase: &str) -> Result<Self, AccountsError> {
        let signers = Role::all()
            .map(|role| {
                let index = role.derivation_index();
                MnemonicBuilder::<English>::default()
                    .phrase(phrase)
                    .index(index)
                    .and_then(|builder| builder.build())
                    .map_err(|source| AccountsError::Derivation { index, source })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { signers })
    }

    pub fn signer(&self, role: Role) -> &PrivateKeySigner {
        &self.signers[role.derivation_index() as usize]
    }

    pub fn address(&self, role: Role) -> Address {
        self.signer(role).address()
    }

    /// Sets the native balance of every account on a development node.
    pub async fn fund<P: Provider>(&self, provider: &P, amount: U256) -> Result<(), AccountsError> {
        for role in Role::all() {
            let address = self.address(role);
            debug!(?role, %address, %amount, "Funding account");

            provider
                .anvil_set_balance(address, amount)
                .await
                .map_err(|source| AccountsError::Funding { address, source })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use alloy::node_bindings::Anvil;
    use alloy::primitives::address;
    use alloy::providers::ProviderBuilder;

    use super::*;

    #[test]
    fn derivation_indices_are_unique_and_contiguous() {
        let indices: HashSet<u32> = Role::all().map(Role::derivation_index).collect();

        assert_eq!(indices.len(), 14);
        assert_eq!(indices, (0..14).collect());
    }

    #[test]
    fn funder_and_attester_match_anvil_default_accounts() {
        let accounts = Accounts::from_mnemonic(ANVIL_MNEMONIC).unwrap();

        assert_eq!(
            accounts.address(Role::Funder),
            address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
        assert_eq!(
            accounts.address(Role::Attester),
            address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8")
        );
    }

    #[test]
    fn chain_roles_on_each_side_are_distinct_accounts() {
        let accounts = Accounts::from_mnemonic(ANVIL_MNEMONIC).unwrap();

        for role in ChainRole::ALL {
            assert_ne!(
                accounts.address(Role::Chain(Side::Ethereum, role)),
                accounts.address(Role::Chain(Side::Avalanche, role)),
                "{role:?} must differ between chains"
            );
        }
    }

    #[test]
    fn remote_side_is_the_other_chain() {
        assert_eq!(Side::Ethereum.remote(), Side::Avalanche);
        assert_eq!(Side::Avalanche.remote(), Side::Ethereum);
    }

    #[test]
    fn invalid_mnemonic_is_rejected() {
        let result = Accounts::from_mnemonic("not a real mnemonic");

        assert!(
            matches!(result, Err(AccountsError::Derivation { index: 0, .. })),
            "expected derivation failure"
        );
    }

    #[tokio::test]
    async fn fund_sets_balance_of_every_role() {
        let anvil = Anvil::new().spawn();
        let provider = ProviderBuilder::new().connect_http(anvil.endpoint_url());
        let accounts = Accounts::from_mnemonic(ANVIL_MNEMONIC).unwrap();
        let amount = U256::from(123_456_789u64);

        accounts.fund(&provider, amount).await.unwrap();

        for role in Role::all() {
            let balance = provider.get_balance(accounts.address(role)).await.unwrap();
            assert_eq!(balance, amount, "{role:?} should be funded");
        }
    }
}
