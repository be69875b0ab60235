//! Local stand-in for Circle's attestation service.
//!
//! `MessageSent` on the source chain carries a CCTP V2 message with empty
//! nonce, finality and fee fields. The attester fills them in and signs
//! the keccak256 hash of the result, which is what the destination
//! `MessageTransmitterV2.receiveMessage` verifies.

use alloy::primitives::{B256, Bytes, U256, keccak256};
use alloy::signers::Signer;
use alloy::signers::local::PrivateKeySigner;
use tracing::debug;

// CCTP V2 message layout (MessageV2.sol):
// - Bytes 12-43: nonce
// - Bytes 144-147: finalityThresholdExecuted
// - Bytes 148+: message body (BurnMessageV2), feeExecuted at body offset 164
const NONCE_INDEX: usize = 12;
const NONCE_SIZE: usize = 32;
const FINALITY_THRESHOLD_EXECUTED_INDEX: usize = 144;
const FINALITY_THRESHOLD_EXECUTED_SIZE: usize = 4;
const MESSAGE_BODY_INDEX: usize = 148;
const FEE_EXECUTED_INDEX: usize = MESSAGE_BODY_INDEX + 164;
const FEE_EXECUTED_SIZE: usize = 32;
const MIN_MESSAGE_LENGTH: usize = FEE_EXECUTED_INDEX + FEE_EXECUTED_SIZE;

/// Fast transfer finality, matching the `minFinalityThreshold` the burns
/// request.
pub const DEFAULT_FINALITY_THRESHOLD_EXECUTED: u32 = 1000;
pub const DEFAULT_FEE_EXECUTED: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum AttesterError {
    #[error("message too short to patch: got {length} bytes, need at least 344")]
    MessageTooShort { length: usize },
    #[error("failed to sign attestation: {0}")]
    Signing(#[from] alloy::signers::Error),
}

/// Patched message together with the attester's signature over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedMessage {
    pub message: Bytes,
    /// 65-byte `r || s || v` signature.
    pub attestation: Bytes,
}

#[derive(Debug, Clone)]
pub struct Attester {
    signer: PrivateKeySigner,
    nonce: B256,
    finality_threshold_executed: u32,
    fee_executed: U256,
}

impl Attester {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self {
            signer,
            nonce: keccak256("nonce"),
            finality_threshold_executed: DEFAULT_FINALITY_THRESHOLD_EXECUTED,
            fee_executed: U256::from(DEFAULT_FEE_EXECUTED),
        }
    }

    #[must_use]
    pub const fn with_nonce(mut self, nonce: B256) -> Self {
        self.nonce = nonce;
        self
    }

    #[must_use]
    pub const fn with_finality_threshold_executed(mut self, threshold: u32) -> Self {
        self.finality_threshold_executed = threshold;
        self
    }

    #[must_use]
    pub const fn with_fee_executed(mut self, fee: U256) -> Self {
        self.fee_executed = fee;
        self
    }

    pub fn address(&self) -> alloy::primitives::Address {
        self.signer.address()
    }

    /// Writes nonce, finalityThresholdExecuted and feeExecuted into a copy
    /// of `message`. Every other byte is left untouched.
    pub fn patch(&self, message: &[u8]) -> Result<Vec<u8>, AttesterError> {
        if message.len() < MIN_MESSAGE_LENGTH {
            return Err(AttesterError::MessageTooShort {
                length: message.len(),
            });
        }

        let mut patched = message.to_vec();

        patched[NONCE_INDEX..NONCE_INDEX + NONCE_SIZE].copy_from_slice(self.nonce.as_slice());
        patched[FINALITY_THRESHOLD_EXECUTED_INDEX
            ..FINALITY_THRESHOLD_EXECUTED_INDEX + FINALITY_THRESHOLD_EXECUTED_SIZE]
            .copy_from_slice(&self.finality_threshold_executed.to_be_bytes());
        patched[FEE_EXECUTED_INDEX..FEE_EXECUTED_INDEX + FEE_EXECUTED_SIZE]
            .copy_from_slice(&self.fee_executed.to_be_bytes::<32>());

        Ok(patched)
    }

    /// Patches `message` and signs its keccak256 hash.
    pub async fn attest(&self, message: &[u8]) -> Result<AttestedMessage, AttesterError> {
        let patched = self.patch(message)?;
        let hash = keccak256(&patched);
        let signature = self.signer.sign_hash(&hash).await?;

        debug!(%hash, attester = %self.signer.address(), "Attested message");

        Ok(AttestedMessage {
            message: Bytes::from(patched),
            attestation: Bytes::from(signature.as_bytes().to_vec()),
        })
    }
}
