//! Local signer implementation for development nodes (anvil).
//!
//! `LocalWallet` wraps an alloy provider with an embedded `EthereumWallet`,
//! submits transactions directly and waits for their receipts with
//! [`confirm_transaction`].

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::{ConfirmationPolicy, Evm, EvmError, Wallet, confirm_transaction};

/// Local wallet that signs and submits transactions directly.
///
/// The provider must carry a wallet filler able to sign for `address`
/// (see [`LocalWallet::connect`]). Nonces are filled from the sender's
/// transaction count at submission time.
pub struct LocalWallet<P = DynProvider> {
    provider: P,
    address: Address,
    policy: ConfirmationPolicy,
}

impl LocalWallet {
    /// Connects to `rpc_url` with a provider that signs as `signer`.
    pub fn connect(rpc_url: Url, signer: PrivateKeySigner, policy: ConfirmationPolicy) -> Self {
        let address = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(rpc_url)
            .erased();

        Self::new(provider, address, policy)
    }
}

impl<P> LocalWallet<P> {
    pub const fn new(provider: P, address: Address, policy: ConfirmationPolicy) -> Self {
        Self {
            provider,
            address,
            policy,
        }
    }

    pub const fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }
}

impl<P> LocalWallet<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn submit(
        &self,
        tx: TransactionRequest,
        note: &str,
    ) -> Result<TransactionReceipt, EvmError> {
        info!(from = %self.address, note, "Submitting local transaction");

        let pending = self.provider.send_transaction(tx).await?;
        let tx_hash = *pending.tx_hash();

        info!(%tx_hash, note, "Transaction submitted");

        let receipt = confirm_transaction(&self.provider, tx_hash, &self.policy).await?;

        info!(%tx_hash, note, gas_used = receipt.gas_used, "Transaction confirmed");

        Ok(receipt)
    }
}

#[async_trait]
impl<P> Evm for LocalWallet<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    type Provider = P;

    fn provider(&self) -> &P {
        &self.provider
    }
}

#[async_trait]
impl<P> Wallet for LocalWallet<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    fn address(&self) -> Address {
        self.address
    }

    async fn send(
        &self,
        contract: Address,
        calldata: Bytes,
        note: &str,
    ) -> Result<TransactionReceipt, EvmError> {
        let tx = TransactionRequest::default()
            .from(self.address)
            .to(contract)
            .input(calldata.into());

        self.submit(tx, note).await
    }

    async fn deploy(&self, init_code: Bytes, note: &str) -> Result<Address, EvmError> {
        let tx = TransactionRequest::default()
            .from(self.address)
            .with_deploy_code(init_code);

        let receipt = self.submit(tx, note).await?;

        receipt
            .contract_address
            .ok_or(EvmError::MissingContractAddress {
                tx_hash: receipt.transaction_hash,
            })
    }
}
