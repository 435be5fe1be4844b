//! BIP143 signature hash with SIGHASH_FORKID, as enforced on Bitcoin SV
//!
//! Preimage = nVersion || hashPrevouts || hashSequence || outpoint ||
//!            scriptCode || value || nSequence || hashOutputs ||
//!            nLockTime || sighashType
//!
//! References:
//! - BIP 143: Transaction Signature Verification for Version 0 Witness Program
//! - UAHF replay protected sighash (SIGHASH_FORKID)

use crate::blockchain::traits::PreimageSource;
use crate::crypto::sha256d;
use crate::error::{AppError, AppResult};

use super::encoding::write_compact_size;
use super::transaction::Transaction;

/// Sighash flags byte (carried as u32 in the preimage)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SighashType(pub u32);

impl SighashType {
    pub const ALL: u32 = 0x01;
    pub const NONE: u32 = 0x02;
    pub const SINGLE: u32 = 0x03;
    pub const FORKID: u32 = 0x40;
    pub const ANYONECANPAY: u32 = 0x80;

    /// SIGHASH_ALL | SIGHASH_FORKID (0x41)
    pub const ALL_FORKID: SighashType = SighashType(Self::ALL | Self::FORKID);
    pub const NONE_FORKID: SighashType = SighashType(Self::NONE | Self::FORKID);
    pub const SINGLE_FORKID: SighashType = SighashType(Self::SINGLE | Self::FORKID);

    pub fn with_anyone_can_pay(self) -> Self {
        SighashType(self.0 | Self::ANYONECANPAY)
    }

    pub fn base_type(&self) -> u32 {
        self.0 & 0x1f
    }

    pub fn anyone_can_pay(&self) -> bool {
        self.0 & Self::ANYONECANPAY != 0
    }

    pub fn has_fork_id(&self) -> bool {
        self.0 & Self::FORKID != 0
    }

    /// The byte appended to DER signatures
    pub fn as_byte(&self) -> u8 {
        self.0 as u8
    }
}

impl Default for SighashType {
    fn default() -> Self {
        Self::ALL_FORKID
    }
}

fn hash_prevouts(tx: &Transaction) -> [u8; 32] {
    let mut data = Vec::with_capacity(tx.inputs.len() * 36);
    for input in &tx.inputs {
        data.extend_from_slice(&input.outpoint());
    }
    sha256d(&data)
}

fn hash_sequence(tx: &Transaction) -> [u8; 32] {
    let mut data = Vec::with_capacity(tx.inputs.len() * 4);
    for input in &tx.inputs {
        data.extend_from_slice(&input.sequence.to_le_bytes());
    }
    sha256d(&data)
}

fn hash_outputs(tx: &Transaction) -> [u8; 32] {
    let mut data = Vec::new();
    for output in &tx.outputs {
        data.extend_from_slice(&output.serialize());
    }
    sha256d(&data)
}

/// Build the signable preimage for one input.
///
/// `script_code` is the locking script of the output being spent and
/// `satoshis` its value; neither is read from the transaction itself.
pub fn compute_preimage(
    tx: &Transaction,
    script_code: &[u8],
    satoshis: u64,
    input_index: usize,
    sighash_type: SighashType,
) -> AppResult<Vec<u8>> {
    if !sighash_type.has_fork_id() {
        return Err(AppError::ValidationError(format!(
            "Sighash type 0x{:02x} lacks SIGHASH_FORKID",
            sighash_type.0
        )));
    }

    let input = tx.input(input_index)?;
    let base_type = sighash_type.base_type();

    let zero = [0u8; 32];

    let prevouts_digest = if sighash_type.anyone_can_pay() {
        zero
    } else {
        hash_prevouts(tx)
    };

    let sequence_digest = if sighash_type.anyone_can_pay()
        || base_type == SighashType::SINGLE
        || base_type == SighashType::NONE
    {
        zero
    } else {
        hash_sequence(tx)
    };

    let outputs_digest = if base_type != SighashType::SINGLE && base_type != SighashType::NONE {
        hash_outputs(tx)
    } else if base_type == SighashType::SINGLE && input_index < tx.outputs.len() {
        sha256d(&tx.outputs[input_index].serialize())
    } else {
        zero
    };

    let mut preimage = Vec::with_capacity(157 + script_code.len() + 9);
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    preimage.extend_from_slice(&prevouts_digest);
    preimage.extend_from_slice(&sequence_digest);
    preimage.extend_from_slice(&input.outpoint());
    write_compact_size(&mut preimage, script_code.len() as u64);
    preimage.extend_from_slice(script_code);
    preimage.extend_from_slice(&satoshis.to_le_bytes());
    preimage.extend_from_slice(&input.sequence.to_le_bytes());
    preimage.extend_from_slice(&outputs_digest);
    preimage.extend_from_slice(&tx.lock_time.to_le_bytes());
    preimage.extend_from_slice(&sighash_type.0.to_le_bytes());

    tracing::trace!(
        "preimage input #{} seq 0x{:08x} type 0x{:02x}: {}",
        input_index,
        input.sequence,
        sighash_type.0,
        hex::encode(&preimage)
    );

    Ok(preimage)
}

/// Message digest that gets signed: sha256d(preimage)
pub fn sighash(
    tx: &Transaction,
    script_code: &[u8],
    satoshis: u64,
    input_index: usize,
    sighash_type: SighashType,
) -> AppResult<[u8; 32]> {
    let preimage = compute_preimage(tx, script_code, satoshis, input_index, sighash_type)?;
    Ok(sha256d(&preimage))
}

/// BIP143/FORKID preimages for a fixed sighash type
#[derive(Debug, Clone, Copy, Default)]
pub struct Bip143Preimage {
    pub sighash_type: SighashType,
}

impl Bip143Preimage {
    pub fn new(sighash_type: SighashType) -> Self {
        Self { sighash_type }
    }
}

impl PreimageSource for Bip143Preimage {
    fn preimage(
        &self,
        tx: &Transaction,
        locking_script: &[u8],
        input_satoshis: u64,
        input_index: usize,
    ) -> AppResult<Vec<u8>> {
        compute_preimage(tx, locking_script, input_satoshis, input_index, self.sighash_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::bsv::transaction::{TxInput, TxOutput};

    const P2PKH_HEX: &str = "76a914751e76e8199196d454941c45d1b3a323f1433bd688ac";

    fn two_in_two_out() -> Transaction {
        let mut tx = Transaction::new();
        tx.add_input(TxInput::new([0xaa; 32], 0));
        tx.add_input(TxInput::new([0xbb; 32], 3));
        tx.add_output(TxOutput::new(vec![0x51], 700));
        tx.add_output(TxOutput::new(vec![0x52], 800));
        tx.lock_time = 0x0102_0304;
        tx
    }

    #[test]
    fn test_preimage_layout_all_forkid() {
        let tx = two_in_two_out();
        let script = hex::decode(P2PKH_HEX).unwrap();
        let preimage = compute_preimage(&tx, &script, 100_000, 1, SighashType::ALL_FORKID).unwrap();

        // 4 + 32 + 32 + 36 + (1 + 25) + 8 + 4 + 32 + 4 + 4
        assert_eq!(preimage.len(), 182);
        assert_eq!(&preimage[..4], &1u32.to_le_bytes());
        assert_eq!(&preimage[4..36], &hash_prevouts(&tx));
        assert_eq!(&preimage[36..68], &hash_sequence(&tx));
        assert_eq!(&preimage[68..104], &tx.inputs[1].outpoint());
        assert_eq!(preimage[104], 25);
        assert_eq!(&preimage[105..130], script.as_slice());
        assert_eq!(&preimage[130..138], &100_000u64.to_le_bytes());
        assert_eq!(&preimage[138..142], &0xffff_ffffu32.to_le_bytes());
        assert_eq!(&preimage[142..174], &hash_outputs(&tx));
        assert_eq!(&preimage[174..178], &0x0102_0304u32.to_le_bytes());
        assert_eq!(&preimage[178..], &[0x41, 0, 0, 0]);
    }

    #[test]
    fn test_anyone_can_pay_zeroes_prevouts_and_sequences() {
        let tx = two_in_two_out();
        let sighash_type = SighashType::ALL_FORKID.with_anyone_can_pay();
        let preimage = compute_preimage(&tx, &[0x51], 1, 0, sighash_type).unwrap();

        assert_eq!(&preimage[4..68], &[0u8; 64]);
        // outputs still committed
        let outputs_at = 4 + 32 + 32 + 36 + 2 + 8 + 4;
        assert_eq!(&preimage[outputs_at..outputs_at + 32], &hash_outputs(&tx));
        assert_eq!(preimage[preimage.len() - 4], 0xc1);
    }

    #[test]
    fn test_single_commits_to_matching_output_only() {
        let tx = two_in_two_out();
        let outputs_at = 4 + 32 + 32 + 36 + 2 + 8 + 4;

        let preimage = compute_preimage(&tx, &[0x51], 1, 1, SighashType::SINGLE_FORKID).unwrap();
        assert_eq!(&preimage[36..68], &[0u8; 32]);
        assert_eq!(
            &preimage[outputs_at..outputs_at + 32],
            &sha256d(&tx.outputs[1].serialize())
        );

        // No output at the input's index
        let mut short = tx.clone();
        short.outputs.truncate(1);
        let preimage = compute_preimage(&short, &[0x51], 1, 1, SighashType::SINGLE_FORKID).unwrap();
        assert_eq!(&preimage[outputs_at..outputs_at + 32], &[0u8; 32]);
    }

    #[test]
    fn test_none_zeroes_outputs() {
        let tx = two_in_two_out();
        let preimage = compute_preimage(&tx, &[0x51], 1, 0, SighashType::NONE_FORKID).unwrap();
        let outputs_at = 4 + 32 + 32 + 36 + 2 + 8 + 4;
        assert_eq!(&preimage[outputs_at..outputs_at + 32], &[0u8; 32]);
    }

    #[test]
    fn test_sequence_changes_preimage() {
        let mut tx = two_in_two_out();
        let before = sighash(&tx, &[0x51], 1, 0, SighashType::ALL_FORKID).unwrap();
        tx.inputs[0].sequence -= 1;
        let after = sighash(&tx, &[0x51], 1, 0, SighashType::ALL_FORKID).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_rejects_missing_forkid_and_bad_index() {
        let tx = two_in_two_out();
        assert!(compute_preimage(&tx, &[0x51], 1, 0, SighashType(SighashType::ALL)).is_err());
        assert!(compute_preimage(&tx, &[0x51], 1, 2, SighashType::ALL_FORKID).is_err());
    }
}
