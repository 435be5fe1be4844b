//! Bitcoin SV transaction building for sCrypt-style contracts
//!
//! This module builds, signs and checks transparent BSV transactions and
//! normalizes the OP_PUSH_TX sighash so contract-generated signatures stay
//! low-S.

pub mod builder;
pub mod encoding;
pub mod fee;
pub mod lows;
pub mod script;
pub mod sighash;
pub mod signer;
pub mod transaction;

pub use builder::Utxo;
pub use fee::FeePolicy;
pub use lows::{
    check_low_s, fix_low_s, LowSNormalizer, LowSOutcome, MAX_LOW_S_ATTEMPTS, MSB_THRESHOLD,
};
pub use sighash::{compute_preimage, Bip143Preimage, SighashType};
pub use signer::unlock_p2pkh_input;
pub use transaction::{FeeStrategy, Transaction, TxDecodeError, TxInput, TxOutput};

/// Shared constants for contract transactions
pub mod constants {
    /// Contract input index used by the single-input helpers
    pub const INPUT_INDEX: usize = 0;

    /// Value of the dummy input created by `new_tx`
    pub const INPUT_SATOSHIS: u64 = 100_000;

    /// Smallest output amount used for contract outputs
    pub const MIN_FEE: u64 = 546;

    /// Change below this is left to the miner
    pub const DUST_LIMIT: u64 = 546;

    pub const DEFAULT_FEE_PER_KB: u64 = 500;

    /// Number of bytes used to encode a numeric state value
    pub const DATA_LEN: usize = 1;

    /// Upper bound of a low-S P2PKH scriptSig: push(71 DER + 1 hashtype) + push(33)
    pub const P2PKH_UNLOCKING_SCRIPT_SIZE: usize = 107;

    pub const DUMMY_TX_ID: &str =
        "a477af6b2667c29670467e4e0728b685ee07b240235771862318e29ddbe58458";
    pub const REVERSED_DUMMY_TX_ID: &str =
        "5884e5db9de218238671572340b207ee85b628074e7e467096c267266baf77a4";

    /// Compressed-size all-zero public key placeholder
    pub const EMPTY_PUBLIC_KEY: &str =
        "000000000000000000000000000000000000000000000000000000000000000000";
}
