//! Receipt polling with a fixed interval and a hard timeout.

use std::time::Duration;

use alloy::primitives::TxHash;
use alloy::providers::Provider;
use alloy::rpc::types::TransactionReceipt;
use alloy::transports::TransportError;
use backon::{ConstantBuilder, Retryable};
use tracing::debug;

use crate::EvmError;

/// How long to wait for a transaction receipt and how often to ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ConfirmationPolicy {
    /// Number of polls that fit in the budget, never fewer than one.
    pub fn max_attempts(&self) -> usize {
        if self.interval.is_zero() {
            return 1;
        }

        let attempts = self.timeout.as_nanos().div_ceil(self.interval.as_nanos());
        usize::try_from(attempts).unwrap_or(usize::MAX).max(1)
    }
}

enum ReceiptPoll {
    Pending,
    Rpc(TransportError),
    Reverted,
}

/// Waits until the receipt for `tx_hash` reports success.
///
/// A missing receipt and RPC failures are both treated as "not yet",
/// since development nodes can briefly reject receipt queries for
/// transactions still in the pool. A mined receipt with a failed
/// status ends polling immediately.
pub async fn confirm_transaction<P: Provider>(
    provider: &P,
    tx_hash: TxHash,
    policy: &ConfirmationPolicy,
) -> Result<TransactionReceipt, EvmError> {
    let backoff = ConstantBuilder::default()
        .with_delay(policy.interval)
        .with_max_times(policy.max_attempts() - 1);

    let fetch_receipt = || async {
        match provider.get_transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) if receipt.status() => Ok(receipt),
            Ok(Some(_)) => Err(ReceiptPoll::Reverted),
            Ok(None) => Err(ReceiptPoll::Pending),
            Err(err) => Err(ReceiptPoll::Rpc(err)),
        }
    };

    fetch_receipt
        .retry(backoff)
        .when(|poll| !matches!(poll, ReceiptPoll::Reverted))
        .notify(|poll, dur| match poll {
            ReceiptPoll::Rpc(err) => debug!(%tx_hash, %err, ?dur, "Receipt query failed, retrying"),
            _ => debug!(%tx_hash, ?dur, "Receipt not available yet"),
        })
        .await
        .map_err(|poll| match poll {
            ReceiptPoll::Reverted => EvmError::Reverted { tx_hash },
            ReceiptPoll::Pending | ReceiptPoll::Rpc(_) => EvmError::ConfirmationTimeout {
                tx_hash,
                timeout: policy.timeout,
            },
        })
}

#[cfg(test)]
mod tests {
    use alloy::node_bindings::Anvil;
    use alloy::providers::ProviderBuilder;

    use super::*;

    #[test]
    fn default_policy_polls_every_second_for_thirty_seconds() {
        let policy = ConfirmationPolicy::default();

        assert_eq!(policy.interval, Duration::from_secs(1));
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(policy.max_attempts(), 30);
    }

    #[test]
    fn max_attempts_rounds_up_partial_intervals() {
        let policy = ConfirmationPolicy {
            interval: Duration::from_millis(400),
            timeout: Duration::from_secs(1),
        };

        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn max_attempts_is_at_least_one() {
        let zero_timeout = ConfirmationPolicy {
            interval: Duration::from_secs(1),
            timeout: Duration::ZERO,
        };
        let zero_interval = ConfirmationPolicy {
            interval: Duration::ZERO,
            timeout: Duration::from_secs(5),
        };

        assert_eq!(zero_timeout.max_attempts(), 1);
        assert_eq!(zero_interval.max_attempts(), 1);
    }

    #[tokio::test]
    async fn unknown_transaction_times_out() {
        let anvil = Anvil::new().spawn();
        let provider = ProviderBuilder::new().connect_http(anvil.endpoint_url());

        let policy = ConfirmationPolicy {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(50),
        };
        let tx_hash = TxHash::random();

        let err = confirm_transaction(&provider, tx_hash, &policy)
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                EvmError::ConfirmationTimeout { tx_hash: hash, timeout }
                    if hash == tx_hash && timeout == policy.timeout
            ),
            "got: {err:?}"
        );
    }
}
