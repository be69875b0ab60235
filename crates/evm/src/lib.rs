//! EVM chain interaction for the CCTP deployment scripts.
//!
//! This crate provides two traits for interacting with EVM chains:
//!
//! - [`Evm`] — read-only chain access. Provides the underlying provider
//!   and a typed `call` method that runs `eth_call` and decodes the
//!   return value.
//!
//! - [`Wallet`] — extends `Evm` with a signing identity, transaction
//!   submission and contract creation. Every write waits for its
//!   receipt through [`confirm_transaction`], which polls at a fixed
//!   interval under a hard wall-clock budget.
//!
//! [`LocalWallet`](local::LocalWallet) signs with a raw private key and
//! is what the scripts use against development nodes.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::Provider;
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::sol_types::SolCall;
use async_trait::async_trait;

mod confirm;
pub mod local;

pub use confirm::{ConfirmationPolicy, confirm_transaction};

/// Errors that can occur during EVM operations.
#[derive(Debug, thiserror::Error)]
pub enum EvmError {
    #[error("transport error: {0}")]
    Transport(#[from] alloy::transports::RpcError<alloy::transports::TransportErrorKind>),
    #[error("failed to decode call output: {0}")]
    AbiDecode(#[from] alloy::sol_types::Error),
    #[error("transaction reverted: {tx_hash}")]
    Reverted { tx_hash: TxHash },
    #[error("transaction {tx_hash} did not complete within {timeout:?}")]
    ConfirmationTimeout { tx_hash: TxHash, timeout: Duration },
    #[error("receipt for deployment {tx_hash} has no contract address")]
    MissingContractAddress { tx_hash: TxHash },
}

/// Read-only EVM chain access.
///
/// Implementations only need to supply the provider; `call` has a
/// default implementation that encodes the call, runs `eth_call` and
/// decodes the return data.
#[async_trait]
pub trait Evm: Send + Sync + 'static {
    /// The provider type used for chain access.
    type Provider: Provider + Clone + Send + Sync;

    /// Returns the underlying provider for direct chain queries.
    fn provider(&self) -> &Self::Provider;

    /// Execute a typed view call against `contract`.
    async fn call<C>(&self, contract: Address, call: C) -> Result<C::Return, EvmError>
    where
        C: SolCall + Send + 'static,
        C::Return: Send,
    {
        let tx = TransactionRequest::default()
            .to(contract)
            .input(Bytes::from(call.abi_encode()).into());

        let output = self.provider().call(tx).await?;

        Ok(C::abi_decode_returns(&output)?)
    }
}

/// Signing wallet on an EVM chain.
///
/// Both `send` and `deploy` return only once the transaction has a
/// successful receipt. A reverted receipt or an exhausted confirmation
/// budget is an error.
#[async_trait]
pub trait Wallet: Evm {
    /// Returns the address this wallet signs transactions from.
    fn address(&self) -> Address;

    /// Submit a signed contract call transaction.
    ///
    /// - `contract` — target contract address
    /// - `calldata` — ABI-encoded function call
    /// - `note` — human-readable operation description used for logging
    async fn send(
        &self,
        contract: Address,
        calldata: Bytes,
        note: &str,
    ) -> Result<TransactionReceipt, EvmError>;

    /// Submit a contract creation transaction and return the address of
    /// the created contract.
    async fn deploy(&self, init_code: Bytes, note: &str) -> Result<Address, EvmError>;
}

#[async_trait]
impl<T: Evm> Evm for Arc<T> {
    type Provider = T::Provider;

    fn provider(&self) -> &Self::Provider {
        (**self).provider()
    }
}

#[async_trait]
impl<T: Wallet> Wallet for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn send(
        &self,
        contract: Address,
        calldata: Bytes,
        note: &str,
    ) -> Result<TransactionReceipt, EvmError> {
        (**self).send(contract, calldata, note).await
    }

    async fn deploy(&self, init_code: Bytes, note: &str) -> Result<Address, EvmError> {
        (**self).deploy(init_code, note).await
    }
}
