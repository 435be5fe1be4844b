use crate::blockchain::bsv::Transaction;
use crate::error::AppResult;

/// Digest applied to a preimage (double SHA-256 on BSV)
pub type DigestFn = fn(&[u8]) -> [u8; 32];

/// Produces the signable message for one input of a transaction.
///
/// Implementations must be deterministic over the transaction's current
/// serialized state, sequence numbers included.
pub trait PreimageSource {
    fn preimage(
        &self,
        tx: &Transaction,
        locking_script: &[u8],
        input_satoshis: u64,
        input_index: usize,
    ) -> AppResult<Vec<u8>>;
}

impl<F> PreimageSource for F
where
    F: Fn(&Transaction, &[u8], u64, usize) -> AppResult<Vec<u8>>,
{
    fn preimage(
        &self,
        tx: &Transaction,
        locking_script: &[u8],
        input_satoshis: u64,
        input_index: usize,
    ) -> AppResult<Vec<u8>> {
        self(tx, locking_script, input_satoshis, input_index)
    }
}
