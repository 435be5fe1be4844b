//! Low-S sighash normalization
//!
//! Contracts that verify their own spending transaction with a fixed-nonce
//! signature (OP_PUSH_TX) only produce a low-S signature when the leading
//! byte of sha256d(preimage) is below `MSB_THRESHOLD`. The preimage commits
//! to every input's nSequence, so bumping the spent input's sequence number
//! re-rolls the digest without touching amounts or scripts.

use crate::blockchain::traits::{DigestFn, PreimageSource};
use crate::crypto::sha256d;
use crate::error::AppResult;

use super::sighash::{Bip143Preimage, SighashType};
use super::transaction::Transaction;

/// Leading digest bytes at or above this value are rejected
pub const MSB_THRESHOLD: u8 = 0x7e;

/// Number of sequence numbers tried before giving up
pub const MAX_LOW_S_ATTEMPTS: u32 = 25;

pub fn is_low_msb(byte: u8) -> bool {
    byte < MSB_THRESHOLD
}

/// Result of a normalization run
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowSOutcome {
    /// The digest is low after `increments` sequence bumps
    Normalized { increments: u32 },
    /// Every attempt produced a high digest; the transaction is left in its
    /// last-tried state and must not be broadcast as-is
    Exhausted { increments: u32 },
}

impl LowSOutcome {
    pub fn is_normalized(&self) -> bool {
        matches!(self, LowSOutcome::Normalized { .. })
    }

    pub fn increments(&self) -> u32 {
        match self {
            LowSOutcome::Normalized { increments } | LowSOutcome::Exhausted { increments } => {
                *increments
            }
        }
    }
}

pub struct LowSNormalizer<P = Bip143Preimage> {
    source: P,
    digest: DigestFn,
    max_attempts: u32,
}

impl Default for LowSNormalizer<Bip143Preimage> {
    fn default() -> Self {
        Self::new(Bip143Preimage::new(SighashType::ALL_FORKID))
    }
}

impl<P: PreimageSource> LowSNormalizer<P> {
    /// Normalizer over `source` using sha256d
    pub fn new(source: P) -> Self {
        Self::with_digest(source, sha256d)
    }

    pub fn with_digest(source: P, digest: DigestFn) -> Self {
        Self {
            source,
            digest,
            max_attempts: MAX_LOW_S_ATTEMPTS,
        }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn leading_byte(
        &self,
        tx: &Transaction,
        locking_script: &[u8],
        input_satoshis: u64,
        input_index: usize,
    ) -> AppResult<u8> {
        let preimage = self
            .source
            .preimage(tx, locking_script, input_satoshis, input_index)?;
        Ok((self.digest)(&preimage)[0])
    }

    /// Whether the current digest for `input_index` is low. Never mutates.
    pub fn check(
        &self,
        tx: &Transaction,
        locking_script: &[u8],
        input_satoshis: u64,
        input_index: usize,
    ) -> AppResult<bool> {
        tx.input(input_index)?;
        let msb = self.leading_byte(tx, locking_script, input_satoshis, input_index)?;
        Ok(is_low_msb(msb))
    }

    /// Bump the sequence number of `input_index` until the digest is low.
    ///
    /// Only that input's sequence changes, by exactly one per rejected
    /// attempt (wrapping at u32::MAX). Errors only for an out-of-range index
    /// or a failing preimage source.
    pub fn normalize(
        &self,
        tx: &mut Transaction,
        locking_script: &[u8],
        input_satoshis: u64,
        input_index: usize,
    ) -> AppResult<LowSOutcome> {
        tx.input(input_index)?;

        for attempt in 0..self.max_attempts {
            let msb = self.leading_byte(tx, locking_script, input_satoshis, input_index)?;
            if is_low_msb(msb) {
                tracing::debug!(
                    "Input #{} sighash low (msb 0x{:02x}) after {} increments",
                    input_index,
                    msb,
                    attempt
                );
                return Ok(LowSOutcome::Normalized {
                    increments: attempt,
                });
            }

            let input = tx.input_mut(input_index)?;
            tracing::trace!(
                "Input #{} sighash high (msb 0x{:02x}) at sequence 0x{:08x}",
                input_index,
                msb,
                input.sequence
            );
            input.sequence = input.sequence.wrapping_add(1);
        }

        // The last increment has not been looked at yet
        if self.check(tx, locking_script, input_satoshis, input_index)? {
            return Ok(LowSOutcome::Normalized {
                increments: self.max_attempts,
            });
        }

        tracing::warn!(
            "Input #{} sighash still high after {} attempts, sequence now 0x{:08x}",
            input_index,
            self.max_attempts,
            tx.inputs[input_index].sequence
        );

        Ok(LowSOutcome::Exhausted {
            increments: self.max_attempts,
        })
    }
}

/// Normalize with the BIP143/FORKID preimage (SIGHASH_ALL | FORKID)
pub fn fix_low_s(
    tx: &mut Transaction,
    locking_script: &[u8],
    input_satoshis: u64,
    input_index: usize,
) -> AppResult<LowSOutcome> {
    LowSNormalizer::<Bip143Preimage>::default().normalize(
        tx,
        locking_script,
        input_satoshis,
        input_index,
    )
}

/// Check with the BIP143/FORKID preimage (SIGHASH_ALL | FORKID)
pub fn check_low_s(
    tx: &Transaction,
    locking_script: &[u8],
    input_satoshis: u64,
    input_index: usize,
) -> AppResult<bool> {
    LowSNormalizer::<Bip143Preimage>::default().check(
        tx,
        locking_script,
        input_satoshis,
        input_index,
    )
}
