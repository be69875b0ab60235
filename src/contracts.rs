//! Bindings and source locations for the contracts the scripts deploy.
//!
//! Only the calls the deployment and transfer steps make are declared.
//! The compiled ABI is checked against these selectors before each
//! deployment (see [`CompiledContract::ensure_selectors`]).
//!
//! [`CompiledContract::ensure_selectors`]: crate::compiler::CompiledContract::ensure_selectors

use alloy::primitives::{Address, FixedBytes, Selector};
use alloy::sol;
use alloy::sol_types::SolCall;
use semver::Version;

sol! {
    #[allow(clippy::too_many_arguments)]
    contract FiatTokenV2_1 {
        function initialize(
            string tokenName,
            string tokenSymbol,
            string tokenCurrency,
            uint8 tokenDecimals,
            address newMasterMinter,
            address newPauser,
            address newBlacklister,
            address newOwner
        ) external;
        function initializeV2(string newName) external;
        function initializeV2_1(address lostAndFound) external;
        function configureMinter(address minter, uint256 minterAllowedAmount) external returns (bool);
        function mint(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 value) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
    }
}

sol! {
    contract MessageTransmitterV2 {
        event MessageSent(bytes message);

        constructor(uint32 localDomain, uint32 messageVersion);

        function initialize(
            address owner_,
            address pauser_,
            address rescuer_,
            address attesterManager_,
            address[] attesters_,
            uint256 signatureThreshold_,
            uint256 maxMessageBodySize_
        ) external;
        function receiveMessage(bytes message, bytes attestation) external returns (bool success);
    }
}

sol! {
    contract TokenMinterV2 {
        constructor(address tokenController);

        function addLocalTokenMessenger(address newLocalTokenMessenger) external;
        function setMaxBurnAmountPerMessage(address localToken, uint256 burnLimitPerMessage) external;
        function linkTokenPair(address localToken, uint32 remoteDomain, bytes32 remoteToken) external;
    }
}

sol! {
    #[allow(clippy::too_many_arguments)]
    contract TokenMessengerV2 {
        struct TokenMessengerV2Roles {
            address owner;
            address rescuer;
            address feeRecipient;
            address denylister;
            address tokenMinter;
            address minFeeController;
        }

        constructor(address messageTransmitter, uint32 messageBodyVersion);

        function initialize(
            TokenMessengerV2Roles roles,
            uint256 minFee_,
            uint32[] remoteDomains_,
            bytes32[] remoteTokenMessengers_
        ) external;
        function depositForBurn(
            uint256 amount,
            uint32 destinationDomain,
            bytes32 mintRecipient,
            address burnToken,
            bytes32 destinationCaller,
            uint256 maxFee,
            uint32 minFinalityThreshold
        ) external;
        function addRemoteTokenMessenger(uint32 domain, bytes32 tokenMessenger) external;
    }
}

sol! {
    contract AdminUpgradableProxy {
        constructor(address logic, address admin, bytes data);
    }
}

/// Where a contract's source lives and which compiler builds it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContractSource {
    /// Path relative to the contracts root.
    pub path: &'static str,
    pub name: &'static str,
    pub solc_version: Version,
}

pub const FIAT_TOKEN: ContractSource = ContractSource {
    path: "lib/centre-tokens.git/contracts/v2/FiatTokenV2_1.sol",
    name: "FiatTokenV2_1",
    solc_version: Version::new(0, 6, 12),
};

pub const MESSAGE_TRANSMITTER: ContractSource = ContractSource {
    path: "src/v2/MessageTransmitterV2.sol",
    name: "MessageTransmitterV2",
    solc_version: Version::new(0, 7, 6),
};

pub const TOKEN_MINTER: ContractSource = ContractSource {
    path: "src/v2/TokenMinterV2.sol",
    name: "TokenMinterV2",
    solc_version: Version::new(0, 7, 6),
};

pub const TOKEN_MESSENGER: ContractSource = ContractSource {
    path: "src/v2/TokenMessengerV2.sol",
    name: "TokenMessengerV2",
    solc_version: Version::new(0, 7, 6),
};

pub const ADMIN_UPGRADABLE_PROXY: ContractSource = ContractSource {
    path: "src/proxy/AdminUpgradableProxy.sol",
    name: "AdminUpgradableProxy",
    solc_version: Version::new(0, 7, 6),
};

pub(crate) const FIAT_TOKEN_SELECTORS: &[Selector] = &[
    Selector::new(FiatTokenV2_1::initializeCall::SELECTOR),
    Selector::new(FiatTokenV2_1::initializeV2Call::SELECTOR),
    Selector::new(FiatTokenV2_1::initializeV2_1Call::SELECTOR),
    Selector::new(FiatTokenV2_1::configureMinterCall::SELECTOR),
    Selector::new(FiatTokenV2_1::mintCall::SELECTOR),
    Selector::new(FiatTokenV2_1::approveCall::SELECTOR),
    Selector::new(FiatTokenV2_1::balanceOfCall::SELECTOR),
];

pub(crate) const MESSAGE_TRANSMITTER_SELECTORS: &[Selector] = &[
    Selector::new(MessageTransmitterV2::initializeCall::SELECTOR),
    Selector::new(MessageTransmitterV2::receiveMessageCall::SELECTOR),
];

pub(crate) const TOKEN_MINTER_SELECTORS: &[Selector] = &[
    Selector::new(TokenMinterV2::addLocalTokenMessengerCall::SELECTOR),
    Selector::new(TokenMinterV2::setMaxBurnAmountPerMessageCall::SELECTOR),
    Selector::new(TokenMinterV2::linkTokenPairCall::SELECTOR),
];

pub(crate) const TOKEN_MESSENGER_SELECTORS: &[Selector] = &[
    Selector::new(TokenMessengerV2::initializeCall::SELECTOR),
    Selector::new(TokenMessengerV2::depositForBurnCall::SELECTOR),
    Selector::new(TokenMessengerV2::addRemoteTokenMessengerCall::SELECTOR),
];

/// Left-pads a 20-byte address into the `bytes32` form CCTP uses for
/// cross-domain identifiers.
pub fn to_bytes32(address: Address) -> FixedBytes<32> {
    FixedBytes::<32>::left_padding_from(address.as_slice())
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, b256};

    use super::*;

    #[test]
    fn to_bytes32_left_pads_with_zeros() {
        let padded = to_bytes32(address!("0xb794f5ea0ba39494ce839613fffba74279579268"));

        assert_eq!(
            padded,
            b256!("0x000000000000000000000000b794f5ea0ba39494ce839613fffba74279579268")
        );
    }

    #[test]
    fn selectors_match_canonical_signatures() {
        assert_eq!(
            TokenMessengerV2::depositForBurnCall::SIGNATURE,
            "depositForBurn(uint256,uint32,bytes32,address,bytes32,uint256,uint32)"
        );
        assert_eq!(
            MessageTransmitterV2::receiveMessageCall::SIGNATURE,
            "receiveMessage(bytes,bytes)"
        );
        assert_eq!(
            TokenMessengerV2::initializeCall::SIGNATURE,
            "initialize((address,address,address,address,address,address),uint256,uint32[],bytes32[])"
        );
        assert_eq!(FiatTokenV2_1::balanceOfCall::SELECTOR, [0x70, 0xa0, 0x82, 0x31]);
    }

    #[test]
    fn selector_lists_carry_binding_selectors() {
        assert!(FIAT_TOKEN_SELECTORS.contains(&Selector::from([0x70, 0xa0, 0x82, 0x31])));
        assert_eq!(
            TOKEN_MESSENGER_SELECTORS[1],
            Selector::from(TokenMessengerV2::depositForBurnCall::SELECTOR)
        );
        assert_eq!(MESSAGE_TRANSMITTER_SELECTORS.len(), 2);
        assert_eq!(TOKEN_MINTER_SELECTORS.len(), 3);
    }

    #[test]
    fn cctp_contracts_build_with_solc_0_7_6() {
        for source in [
            &MESSAGE_TRANSMITTER,
            &TOKEN_MINTER,
            &TOKEN_MESSENGER,
            &ADMIN_UPGRADABLE_PROXY,
        ] {
            assert_eq!(source.solc_version, Version::new(0, 7, 6), "{}", source.name);
        }
        assert_eq!(FIAT_TOKEN.solc_version, Version::new(0, 6, 12));
    }
}
