use crate::error::{AppError, AppResult};

use super::transaction::Transaction;

/// Minimum relay fee a transaction must pay before it is handed to a miner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeePolicy {
    pub sat_per_byte: f64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self { sat_per_byte: 0.5 }
    }
}

impl FeePolicy {
    pub fn new(sat_per_byte: f64) -> Self {
        Self { sat_per_byte }
    }

    pub fn expected_fee(&self, tx: &Transaction) -> u64 {
        (tx.size() as f64 * self.sat_per_byte).ceil() as u64
    }

    /// Reject transactions paying less than `expected_fee`
    pub fn check(&self, tx: &Transaction) -> AppResult<u64> {
        let fee = tx.fee()?;
        let expected = self.expected_fee(tx);

        if fee < expected {
            tracing::warn!(
                "Fee too low for tx {}: expected {}, got {} ({} bytes)",
                tx.txid(),
                expected,
                fee,
                tx.size()
            );
            return Err(AppError::InsufficientFee {
                expected,
                actual: fee,
            });
        }

        Ok(fee)
    }
}
