//! Deployment, wiring and transfer calls against one simulated chain.
//!
//! [`Chain`] owns a signing wallet per [`ChainRole`] and deploys the CCTP
//! contracts. Once deployed it becomes a [`CctpChain`], which knows the
//! contract addresses and exposes the permission wiring and the
//! burn/receive calls the transfer scenario makes.

use alloy::primitives::{Address, Bytes, Selector, TxHash, U256, address};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, TransactionReceipt};
use alloy::sol_types::{SolCall, SolConstructor, SolEvent};
use async_trait::async_trait;
use cctp_evm::local::LocalWallet;
use cctp_evm::{ConfirmationPolicy, Evm, EvmError, Wallet};
use serde::Deserialize;
use tracing::{info, instrument};
use url::Url;

use crate::accounts::{Accounts, ChainRole, Role, Side};
use crate::attester::AttestedMessage;
use crate::compiler::{CompileError, SolcCompiler};
use crate::contracts::{
    ADMIN_UPGRADABLE_PROXY, AdminUpgradableProxy, ContractSource, FIAT_TOKEN,
    FIAT_TOKEN_SELECTORS, FiatTokenV2_1, MESSAGE_TRANSMITTER, MESSAGE_TRANSMITTER_SELECTORS,
    MessageTransmitterV2, TOKEN_MESSENGER, TOKEN_MESSENGER_SELECTORS, TOKEN_MINTER,
    TOKEN_MINTER_SELECTORS, TokenMessengerV2, TokenMinterV2, to_bytes32,
};

pub const MESSAGE_VERSION: u32 = 1;
pub const MESSAGE_BODY_VERSION: u32 = 1;
pub const MAX_MESSAGE_BODY_SIZE: u64 = 8192;
pub const SIGNATURE_THRESHOLD: u64 = 1;
pub const MIN_FEE: u64 = 1;

/// Receives USDC seized by `initializeV2_1`.
pub const LOST_AND_FOUND: Address = address!("0xb794f5ea0ba39494ce839613fffba74279579268");

const USDC_NAME: &str = "USDC";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_url: Url,
    pub domain: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error(transparent)]
    Evm(#[from] EvmError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("log query failed: {0}")]
    Logs(#[from] alloy::transports::TransportError),
    #[error("no MessageSent event emitted by transaction {tx_hash}")]
    MessageSentNotFound { tx_hash: TxHash },
}

/// Addresses of one chain's CCTP deployment. The transmitter and
/// messenger are the proxy addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployedCctpChain {
    pub usdc: Address,
    pub message_transmitter: Address,
    pub token_minter: Address,
    pub token_messenger: Address,
}

/// A token messenger on another domain, registered at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteTokenMessenger {
    pub domain: u32,
    pub address: Address,
}

pub struct Chain {
    config: ChainConfig,
    side: Side,
    attester: Address,
    reader: DynProvider,
    wallets: [LocalWallet; 6],
    compiler: SolcCompiler,
}

#[async_trait]
impl Evm for Chain {
    type Provider = DynProvider;

    fn provider(&self) -> &DynProvider {
        &self.reader
    }
}

impl Chain {
    pub fn connect(
        config: ChainConfig,
        side: Side,
        accounts: &Accounts,
        compiler: SolcCompiler,
        policy: ConfirmationPolicy,
    ) -> Self {
        let wallets = ChainRole::ALL.map(|role| {
            let signer = accounts.signer(Role::Chain(side, role)).clone();
            LocalWallet::connect(config.rpc_url.clone(), signer, policy)
        });
        let reader = ProviderBuilder::new()
            .connect_http(config.rpc_url.clone())
            .erased();

        Self {
            attester: accounts.address(Role::Attester),
            config,
            side,
            reader,
            wallets,
            compiler,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub const fn domain(&self) -> u32 {
        self.config.domain
    }

    pub const fn side(&self) -> Side {
        self.side
    }

    pub fn wallet(&self, role: ChainRole) -> &LocalWallet {
        &self.wallets[role.index()]
    }

    pub fn address(&self, role: ChainRole) -> Address {
        self.wallet(role).address()
    }

    async fn send<C: SolCall>(
        &self,
        role: ChainRole,
        contract: Address,
        call: C,
    ) -> Result<TransactionReceipt, ChainError> {
        let calldata = Bytes::from(call.abi_encode());
        let receipt = self.wallet(role).send(contract, calldata, C::SIGNATURE).await?;

        Ok(receipt)
    }

    async fn deploy_from_source(
        &self,
        role: ChainRole,
        source: &ContractSource,
        selectors: &[Selector],
        constructor_args: Vec<u8>,
    ) -> Result<Address, ChainError> {
        let compiled = self.compiler.compile(source).await?;
        compiled.ensure_selectors(selectors)?;
        let init_code = compiled.init_code(&constructor_args)?;

        let address = self.wallet(role).deploy(init_code, source.name).await?;
        info!(chain = self.name(), contract = source.name, %address, "Deployed contract");

        Ok(address)
    }

    /// Deploys an AdminUpgradableProxy in front of `logic` whose
    /// constructor delegates `init_data` to it.
    async fn deploy_proxy(
        &self,
        role: ChainRole,
        logic: Address,
        init_data: Vec<u8>,
    ) -> Result<Address, ChainError> {
        let args = AdminUpgradableProxy::constructorCall {
            logic,
            admin: self.address(role),
            data: init_data.into(),
        }
        .abi_encode();

        self.deploy_from_source(role, &ADMIN_UPGRADABLE_PROXY, &[], args)
            .await
    }

    /// Deploys FiatTokenV2_1 and runs all three initializers as the
    /// master minter.
    #[instrument(skip_all, fields(chain = %self.config.name))]
    pub async fn deploy_usdc(&self) -> Result<Address, ChainError> {
        let master_minter = self.address(ChainRole::UsdcMasterMinter);
        let usdc = self
            .deploy_from_source(
                ChainRole::UsdcMasterMinter,
                &FIAT_TOKEN,
                FIAT_TOKEN_SELECTORS,
                Vec::new(),
            )
            .await?;

        self.send(
            ChainRole::UsdcMasterMinter,
            usdc,
            FiatTokenV2_1::initializeCall {
                tokenName: USDC_NAME.to_owned(),
                tokenSymbol: USDC_NAME.to_owned(),
                tokenCurrency: USDC_NAME.to_owned(),
                tokenDecimals: 0,
                newMasterMinter: master_minter,
                newPauser: Address::random(),
                newBlacklister: Address::random(),
                newOwner: master_minter,
            },
        )
        .await?;
        self.send(
            ChainRole::UsdcMasterMinter,
            usdc,
            FiatTokenV2_1::initializeV2Call {
                newName: USDC_NAME.to_owned(),
            },
        )
        .await?;
        self.send(
            ChainRole::UsdcMasterMinter,
            usdc,
            FiatTokenV2_1::initializeV2_1Call {
                lostAndFound: LOST_AND_FOUND,
            },
        )
        .await?;

        Ok(usdc)
    }

    /// Deploys the transmitter implementation and a proxy initialized
    /// with the attester as the only enabled attester.
    #[instrument(skip_all, fields(chain = %self.config.name))]
    pub async fn deploy_message_transmitter(&self) -> Result<Address, ChainError> {
        let role = ChainRole::MessageTransmitterDeployer;
        let deployer = self.address(role);

        let args = MessageTransmitterV2::constructorCall {
            localDomain: self.domain(),
            messageVersion: MESSAGE_VERSION,
        }
        .abi_encode();
        let implementation = self
            .deploy_from_source(
                role,
                &MESSAGE_TRANSMITTER,
                MESSAGE_TRANSMITTER_SELECTORS,
                args,
            )
            .await?;

        let init_data = MessageTransmitterV2::initializeCall {
            owner_: deployer,
            pauser_: deployer,
            rescuer_: deployer,
            attesterManager_: deployer,
            attesters_: vec![self.attester],
            signatureThreshold_: U256::from(SIGNATURE_THRESHOLD),
            maxMessageBodySize_: U256::from(MAX_MESSAGE_BODY_SIZE),
        }
        .abi_encode();

        self.deploy_proxy(role, implementation, init_data).await
    }

    #[instrument(skip_all, fields(chain = %self.config.name))]
    pub async fn deploy_token_minter(&self) -> Result<Address, ChainError> {
        let args = TokenMinterV2::constructorCall {
            tokenController: self.address(ChainRole::TokenController),
        }
        .abi_encode();

        self.deploy_from_source(
            ChainRole::TokenMinterDeployer,
            &TOKEN_MINTER,
            TOKEN_MINTER_SELECTORS,
            args,
        )
        .await
    }

    /// Deploys the messenger implementation and a proxy initialized with
    /// the deployer in every administrative role.
    #[instrument(skip_all, fields(chain = %self.config.name, ?remote))]
    pub async fn deploy_token_messenger(
        &self,
        message_transmitter: Address,
        token_minter: Address,
        remote: Option<RemoteTokenMessenger>,
    ) -> Result<Address, ChainError> {
        let role = ChainRole::TokenMessengerDeployer;
        let deployer = self.address(role);

        let args = TokenMessengerV2::constructorCall {
            messageTransmitter: message_transmitter,
            messageBodyVersion: MESSAGE_BODY_VERSION,
        }
        .abi_encode();
        let implementation = self
            .deploy_from_source(role, &TOKEN_MESSENGER, TOKEN_MESSENGER_SELECTORS, args)
            .await?;

        let (remote_domains, remote_messengers) = remote
            .map(|remote| (vec![remote.domain], vec![to_bytes32(remote.address)]))
            .unwrap_or_default();

        let init_data = TokenMessengerV2::initializeCall {
            roles: TokenMessengerV2::TokenMessengerV2Roles {
                owner: deployer,
                rescuer: deployer,
                feeRecipient: deployer,
                denylister: deployer,
                tokenMinter: token_minter,
                minFeeController: deployer,
            },
            minFee_: U256::from(MIN_FEE),
            remoteDomains_: remote_domains,
            remoteTokenMessengers_: remote_messengers,
        }
        .abi_encode();

        self.deploy_proxy(role, implementation, init_data).await
    }

    /// Deploys the transmitter, the minter and the messenger, in that
    /// order, next to an already deployed `usdc`.
    pub async fn deploy_cctp(
        self,
        usdc: Address,
        remote: Option<RemoteTokenMessenger>,
    ) -> Result<CctpChain, ChainError> {
        let message_transmitter = self.deploy_message_transmitter().await?;
        let token_minter = self.deploy_token_minter().await?;
        let token_messenger = self
            .deploy_token_messenger(message_transmitter, token_minter, remote)
            .await?;

        let contracts = DeployedCctpChain {
            usdc,
            message_transmitter,
            token_minter,
            token_messenger,
        };
        info!(chain = self.name(), ?contracts, "CCTP contracts deployed");

        Ok(CctpChain {
            chain: self,
            contracts,
        })
    }
}

/// A chain with its CCTP contracts deployed.
pub struct CctpChain {
    pub chain: Chain,
    pub contracts: DeployedCctpChain,
}

impl CctpChain {
    pub fn name(&self) -> &str {
        self.chain.name()
    }

    pub const fn domain(&self) -> u32 {
        self.chain.domain()
    }

    pub fn address(&self, role: ChainRole) -> Address {
        self.chain.address(role)
    }

    /// The account receiving fees collected by the token messenger.
    pub fn fee_recipient(&self) -> Address {
        self.address(ChainRole::TokenMessengerDeployer)
    }

    pub fn user(&self) -> Address {
        self.address(ChainRole::TokenMessengerUser)
    }

    pub async fn configure_minter(
        &self,
        minter: Address,
        allowance: U256,
    ) -> Result<(), ChainError> {
        self.chain
            .send(
                ChainRole::UsdcMasterMinter,
                self.contracts.usdc,
                FiatTokenV2_1::configureMinterCall {
                    minter,
                    minterAllowedAmount: allowance,
                },
            )
            .await?;
        Ok(())
    }

    pub async fn add_local_token_messenger(&self) -> Result<(), ChainError> {
        self.chain
            .send(
                ChainRole::TokenMinterDeployer,
                self.contracts.token_minter,
                TokenMinterV2::addLocalTokenMessengerCall {
                    newLocalTokenMessenger: self.contracts.token_messenger,
                },
            )
            .await?;
        Ok(())
    }

    pub async fn set_max_burn_amount_per_message(&self, amount: U256) -> Result<(), ChainError> {
        self.chain
            .send(
                ChainRole::TokenController,
                self.contracts.token_minter,
                TokenMinterV2::setMaxBurnAmountPerMessageCall {
                    localToken: self.contracts.usdc,
                    burnLimitPerMessage: amount,
                },
            )
            .await?;
        Ok(())
    }

    pub async fn link_token_pair(
        &self,
        remote_domain: u32,
        remote_usdc: Address,
    ) -> Result<(), ChainError> {
        self.chain
            .send(
                ChainRole::TokenController,
                self.contracts.token_minter,
                TokenMinterV2::linkTokenPairCall {
                    localToken: self.contracts.usdc,
                    remoteDomain: remote_domain,
                    remoteToken: to_bytes32(remote_usdc),
                },
            )
            .await?;
        Ok(())
    }

    pub async fn add_remote_token_messenger(
        &self,
        remote: RemoteTokenMessenger,
    ) -> Result<(), ChainError> {
        self.chain
            .send(
                ChainRole::TokenMessengerDeployer,
                self.contracts.token_messenger,
                TokenMessengerV2::addRemoteTokenMessengerCall {
                    domain: remote.domain,
                    tokenMessenger: to_bytes32(remote.address),
                },
            )
            .await?;
        Ok(())
    }

    pub async fn mint(&self, to: Address, amount: U256) -> Result<(), ChainError> {
        self.chain
            .send(
                ChainRole::UsdcMasterMinter,
                self.contracts.usdc,
                FiatTokenV2_1::mintCall { to, amount },
            )
            .await?;
        Ok(())
    }

    /// Lets the token messenger pull `amount` from the user.
    pub async fn approve(&self, amount: U256) -> Result<(), ChainError> {
        self.chain
            .send(
                ChainRole::TokenMessengerUser,
                self.contracts.usdc,
                FiatTokenV2_1::approveCall {
                    spender: self.contracts.token_messenger,
                    value: amount,
                },
            )
            .await?;
        Ok(())
    }

    /// Burns `amount` of the user's USDC for `recipient` on
    /// `destination_domain`. The recipient is also the only account
    /// allowed to relay the message.
    pub async fn deposit_for_burn(
        &self,
        amount: U256,
        destination_domain: u32,
        recipient: Address,
        max_fee: U256,
        min_finality_threshold: u32,
    ) -> Result<TransactionReceipt, ChainError> {
        let receipt = self
            .chain
            .send(
                ChainRole::TokenMessengerUser,
                self.contracts.token_messenger,
                TokenMessengerV2::depositForBurnCall {
                    amount,
                    destinationDomain: destination_domain,
                    mintRecipient: to_bytes32(recipient),
                    burnToken: self.contracts.usdc,
                    destinationCaller: to_bytes32(recipient),
                    maxFee: max_fee,
                    minFinalityThreshold: min_finality_threshold,
                },
            )
            .await?;

        info!(
            chain = self.name(),
            tx_hash = %receipt.transaction_hash,
            %amount,
            destination_domain,
            %recipient,
            "Burned USDC"
        );

        Ok(receipt)
    }

    /// Returns the message the transmitter emitted in `receipt`'s
    /// transaction.
    pub async fn message_sent_in(&self, receipt: &TransactionReceipt) -> Result<Bytes, ChainError> {
        let tx_hash = receipt.transaction_hash;
        let block = receipt
            .block_number
            .ok_or(ChainError::MessageSentNotFound { tx_hash })?;

        let filter = Filter::new()
            .address(self.contracts.message_transmitter)
            .event_signature(MessageTransmitterV2::MessageSent::SIGNATURE_HASH)
            .from_block(block)
            .to_block(block);

        let logs = self.chain.provider().get_logs(&filter).await?;

        logs.iter()
            .filter(|log| log.transaction_hash == Some(tx_hash))
            .find_map(|log| MessageTransmitterV2::MessageSent::decode_log(log.as_ref()).ok())
            .map(|event| event.data.message)
            .ok_or(ChainError::MessageSentNotFound { tx_hash })
    }

    /// Relays an attested message as the user.
    pub async fn receive_message(
        &self,
        attested: &AttestedMessage,
    ) -> Result<TransactionReceipt, ChainError> {
        let receipt = self
            .chain
            .send(
                ChainRole::TokenMessengerUser,
                self.contracts.message_transmitter,
                MessageTransmitterV2::receiveMessageCall {
                    message: attested.message.clone(),
                    attestation: attested.attestation.clone(),
                },
            )
            .await?;

        info!(
            chain = self.name(),
            tx_hash = %receipt.transaction_hash,
            "Received message"
        );

        Ok(receipt)
    }

    pub async fn usdc_balance(&self, holder: Address) -> Result<U256, ChainError> {
        let balance = self
            .chain
            .call(
                self.contracts.usdc,
                FiatTokenV2_1::balanceOfCall { account: holder },
            )
            .await?;

        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use alloy::node_bindings::{Anvil, AnvilInstance};
    use alloy::providers::ext::AnvilApi as _;
    use alloy::rpc::types::TransactionRequest;

    use super::*;
    use crate::accounts::ANVIL_MNEMONIC;

    #[test]
    fn chain_config_deserializes_from_toml() {
        let config: ChainConfig = toml::from_str(
            r#"
            name = "avalanche"
            rpc_url = "http://127.0.0.1:8546"
            domain = 1
            "#,
        )
        .unwrap();

        assert_eq!(
            config,
            ChainConfig {
                name: "avalanche".to_owned(),
                rpc_url: Url::parse("http://127.0.0.1:8546").unwrap(),
                domain: 1,
            }
        );
    }

    #[test]
    fn chain_config_rejects_invalid_url() {
        let result = toml::from_str::<ChainConfig>(
            r#"
            name = "ethereum"
            rpc_url = "not a url"
            domain = 0
            "#,
        );

        assert!(result.is_err());
    }

    fn local_chain(anvil: &AnvilInstance) -> Chain {
        let accounts = Accounts::from_mnemonic(ANVIL_MNEMONIC).unwrap();
        let config = ChainConfig {
            name: "ethereum".to_owned(),
            rpc_url: anvil.endpoint_url(),
            domain: 0,
        };

        Chain::connect(
            config,
            Side::Ethereum,
            &accounts,
            SolcCompiler::new(PathBuf::from(".")),
            ConfirmationPolicy {
                interval: Duration::from_millis(50),
                timeout: Duration::from_secs(10),
            },
        )
    }

    /// Init code for a contract that emits `MessageSent` with its
    /// calldata as the ABI-encoded event data.
    fn message_sent_emitter() -> Bytes {
        // CALLDATASIZE PUSH1 0 PUSH1 0 CALLDATACOPY
        let mut runtime = vec![0x36, 0x60, 0x00, 0x60, 0x00, 0x37];
        // PUSH32 topic CALLDATASIZE PUSH1 0 LOG1 STOP
        runtime.push(0x7f);
        runtime.extend_from_slice(MessageTransmitterV2::MessageSent::SIGNATURE_HASH.as_slice());
        runtime.extend_from_slice(&[0x36, 0x60, 0x00, 0xa1, 0x00]);

        let length = u8::try_from(runtime.len()).unwrap();
        // PUSH1 len PUSH1 12 PUSH1 0 CODECOPY PUSH1 len PUSH1 0 RETURN
        let mut init_code = vec![
            0x60, length, 0x60, 0x0c, 0x60, 0x00, 0x39, 0x60, length, 0x60, 0x00, 0xf3,
        ];
        init_code.extend(runtime);

        init_code.into()
    }

    fn emit_request(
        from: Address,
        emitter: Address,
        message: &'static [u8],
    ) -> TransactionRequest {
        let data = MessageTransmitterV2::MessageSent {
            message: Bytes::from_static(message),
        }
        .encode_data();

        TransactionRequest::default()
            .from(from)
            .to(emitter)
            .input(Bytes::from(data).into())
    }

    #[tokio::test]
    async fn message_sent_in_picks_log_of_receipt_transaction() {
        let anvil = Anvil::new().spawn();
        let chain = local_chain(&anvil);

        let transmitter = chain
            .wallet(ChainRole::MessageTransmitterDeployer)
            .deploy(message_sent_emitter(), "transmitter stand-in")
            .await
            .unwrap();
        let other_emitter = chain
            .wallet(ChainRole::MessageTransmitterDeployer)
            .deploy(message_sent_emitter(), "unrelated emitter")
            .await
            .unwrap();

        let cctp = CctpChain {
            chain,
            contracts: DeployedCctpChain {
                usdc: Address::random(),
                message_transmitter: transmitter,
                token_minter: Address::random(),
                token_messenger: Address::random(),
            },
        };

        // Four transactions from distinct senders land in one block.
        let provider = cctp.chain.provider();
        provider.anvil_set_auto_mine(false).await.unwrap();

        let mut pending = Vec::new();
        for (role, request) in [
            (
                ChainRole::TokenMessengerUser,
                emit_request(cctp.address(ChainRole::TokenMessengerUser), transmitter, b"first"),
            ),
            (
                ChainRole::TokenController,
                emit_request(cctp.address(ChainRole::TokenController), transmitter, b"second"),
            ),
            (
                ChainRole::TokenMinterDeployer,
                emit_request(
                    cctp.address(ChainRole::TokenMinterDeployer),
                    other_emitter,
                    b"elsewhere",
                ),
            ),
            (
                ChainRole::UsdcMasterMinter,
                TransactionRequest::default()
                    .from(cctp.address(ChainRole::UsdcMasterMinter))
                    .to(Address::random()),
            ),
        ] {
            let tx = cctp
                .chain
                .wallet(role)
                .provider()
                .send_transaction(request)
                .await
                .unwrap();
            pending.push(*tx.tx_hash());
        }

        provider.evm_mine(None).await.unwrap();
        provider.anvil_set_auto_mine(true).await.unwrap();

        let mut receipts = Vec::new();
        for tx_hash in &pending {
            receipts.push(
                provider
                    .get_transaction_receipt(*tx_hash)
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }
        assert!(
            receipts
                .iter()
                .all(|receipt| receipt.block_number == receipts[0].block_number)
        );

        assert_eq!(
            cctp.message_sent_in(&receipts[0]).await.unwrap(),
            Bytes::from_static(b"first")
        );
        assert_eq!(
            cctp.message_sent_in(&receipts[1]).await.unwrap(),
            Bytes::from_static(b"second")
        );

        for receipt in &receipts[2..] {
            let err = cctp.message_sent_in(receipt).await.unwrap_err();
            assert!(
                matches!(
                    err,
                    ChainError::MessageSentNotFound { tx_hash }
                        if tx_hash == receipt.transaction_hash
                ),
                "got: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn wallets_sign_as_their_roles() {
        let anvil = Anvil::new().spawn();
        let accounts = Accounts::from_mnemonic(ANVIL_MNEMONIC).unwrap();
        let chain = local_chain(&anvil);

        for role in ChainRole::ALL {
            assert_eq!(
                chain.address(role),
                accounts.address(Role::Chain(Side::Ethereum, role))
            );
        }
        assert_eq!(chain.domain(), 0);
        assert_eq!(chain.provider().get_chain_id().await.unwrap(), anvil.chain_id());
    }
}
