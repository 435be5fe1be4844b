//! Bitcoin SV transaction model and wire codec
//!
//! Inputs optionally carry the output they spend (`prev_output`), which the
//! sighash, fee and change calculations need but which is not part of the
//! serialized transaction.

use crate::crypto::sha256d;
use crate::error::{AppError, AppResult};

use super::constants::{DUST_LIMIT, P2PKH_UNLOCKING_SCRIPT_SIZE};
use super::encoding::{compact_size_len, write_compact_size};
use super::script;

pub const TX_VERSION: u32 = 1;
pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;

/// Errors raised while decoding raw transaction bytes
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TxDecodeError {
    #[error("Unexpected end of data: need {needed} bytes at offset {offset}")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("Declared length {0} exceeds remaining data")]
    LengthOverflow(u64),

    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub satoshis: u64,
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    pub fn new(script_pubkey: Vec<u8>, satoshis: u64) -> Self {
        Self {
            satoshis,
            script_pubkey,
        }
    }

    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.satoshis.to_le_bytes());
        write_compact_size(buf, self.script_pubkey.len() as u64);
        buf.extend_from_slice(&self.script_pubkey);
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(9 + self.script_pubkey.len());
        self.write(&mut buf);
        buf
    }
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Previous transaction hash (display byte order, reversed on the wire)
    pub prev_txid: [u8; 32],
    /// Output index in the previous transaction
    pub prev_vout: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    /// The output being spent, when known
    pub prev_output: Option<TxOutput>,
}

impl TxInput {
    pub fn new(prev_txid: [u8; 32], prev_vout: u32) -> Self {
        Self {
            prev_txid,
            prev_vout,
            script_sig: Vec::new(),
            sequence: DEFAULT_SEQUENCE,
            prev_output: None,
        }
    }

    pub fn with_prev_output(mut self, script_pubkey: Vec<u8>, satoshis: u64) -> Self {
        self.prev_output = Some(TxOutput::new(script_pubkey, satoshis));
        self
    }

    /// Serialized outpoint: txid (little-endian) + vout
    pub fn outpoint(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        let mut txid_le = self.prev_txid;
        txid_le.reverse();
        out[..32].copy_from_slice(&txid_le);
        out[32..].copy_from_slice(&self.prev_vout.to_le_bytes());
        out
    }

    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.outpoint());
        write_compact_size(buf, self.script_sig.len() as u64);
        buf.extend_from_slice(&self.script_sig);
        buf.extend_from_slice(&self.sequence.to_le_bytes());
    }
}

/// How the change output's fee is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeStrategy {
    /// Satoshis per 1000 bytes of estimated size
    PerKb(u64),
    /// Exact fee in satoshis
    Fixed(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            version: TX_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    pub fn add_input(&mut self, input: TxInput) -> &mut Self {
        self.inputs.push(input);
        self
    }

    pub fn add_output(&mut self, output: TxOutput) -> &mut Self {
        self.outputs.push(output);
        self
    }

    pub fn input(&self, index: usize) -> AppResult<&TxInput> {
        self.inputs.get(index).ok_or_else(|| {
            AppError::ValidationError(format!(
                "Input index {} out of range ({} inputs)",
                index,
                self.inputs.len()
            ))
        })
    }

    pub fn input_mut(&mut self, index: usize) -> AppResult<&mut TxInput> {
        let count = self.inputs.len();
        self.inputs.get_mut(index).ok_or_else(|| {
            AppError::ValidationError(format!(
                "Input index {} out of range ({} inputs)",
                index, count
            ))
        })
    }

    pub fn set_input_script(&mut self, index: usize, script_sig: Vec<u8>) -> AppResult<()> {
        self.input_mut(index)?.script_sig = script_sig;
        Ok(())
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut tx = Vec::new();

        tx.extend_from_slice(&self.version.to_le_bytes());

        write_compact_size(&mut tx, self.inputs.len() as u64);
        for input in &self.inputs {
            input.write(&mut tx);
        }

        write_compact_size(&mut tx, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write(&mut tx);
        }

        tx.extend_from_slice(&self.lock_time.to_le_bytes());
        tx
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    pub fn size(&self) -> usize {
        self.serialize().len()
    }

    /// Transaction id in display order
    pub fn txid_bytes(&self) -> [u8; 32] {
        let mut hash = sha256d(&self.serialize());
        hash.reverse();
        hash
    }

    pub fn txid(&self) -> String {
        hex::encode(self.txid_bytes())
    }

    pub fn from_hex(raw_hex: &str) -> AppResult<Self> {
        let bytes = hex::decode(raw_hex.trim())?;
        Ok(Self::parse(&bytes)?)
    }

    pub fn parse(data: &[u8]) -> Result<Self, TxDecodeError> {
        let mut reader = Reader::new(data);

        let version = reader.read_u32()?;

        let input_count = reader.read_count(41)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            let mut prev_txid = reader.read_array::<32>()?;
            prev_txid.reverse();
            let prev_vout = reader.read_u32()?;
            let script_sig = reader.read_var_bytes()?;
            let sequence = reader.read_u32()?;
            inputs.push(TxInput {
                prev_txid,
                prev_vout,
                script_sig,
                sequence,
                prev_output: None,
            });
        }

        let output_count = reader.read_count(9)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            let satoshis = reader.read_u64()?;
            let script_pubkey = reader.read_var_bytes()?;
            outputs.push(TxOutput {
                satoshis,
                script_pubkey,
            });
        }

        let lock_time = reader.read_u32()?;

        if reader.remaining() > 0 {
            return Err(TxDecodeError::TrailingBytes(reader.remaining()));
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// Sum of the spent outputs; every input must carry its `prev_output`
    pub fn input_amount(&self) -> AppResult<u64> {
        self.inputs.iter().enumerate().try_fold(0u64, |total, (i, input)| {
            let prev = input.prev_output.as_ref().ok_or_else(|| {
                AppError::ValidationError(format!("Input {} has no previous output attached", i))
            })?;
            total
                .checked_add(prev.satoshis)
                .ok_or_else(|| AppError::ValidationError("Input amount overflow".to_string()))
        })
    }

    pub fn output_amount(&self) -> AppResult<u64> {
        self.outputs.iter().try_fold(0u64, |total, output| {
            total
                .checked_add(output.satoshis)
                .ok_or_else(|| AppError::ValidationError("Output amount overflow".to_string()))
        })
    }

    pub fn fee(&self) -> AppResult<u64> {
        let input_amount = self.input_amount()?;
        let output_amount = self.output_amount()?;
        input_amount.checked_sub(output_amount).ok_or_else(|| {
            AppError::ValidationError(format!(
                "Outputs ({}) exceed inputs ({})",
                output_amount, input_amount
            ))
        })
    }

    /// Serialized size once unsigned P2PKH inputs get their unlocking scripts
    pub fn estimated_size(&self) -> usize {
        let pending_unlock: usize = self
            .inputs
            .iter()
            .filter(|input| input.script_sig.is_empty())
            .filter(|input| {
                input
                    .prev_output
                    .as_ref()
                    .is_some_and(|prev| script::is_p2pkh(&prev.script_pubkey))
            })
            .map(|_| {
                P2PKH_UNLOCKING_SCRIPT_SIZE + compact_size_len(P2PKH_UNLOCKING_SCRIPT_SIZE as u64)
                    - compact_size_len(0)
            })
            .sum();

        self.size() + pending_unlock
    }

    /// Append a change output paying `address`.
    ///
    /// Returns the index of the change output, or `None` when the change
    /// would be below the dust limit.
    fn required_fee(&self, fee: FeeStrategy) -> u64 {
        match fee {
            FeeStrategy::PerKb(rate) => (self.estimated_size() as u64 * rate).div_ceil(1000),
            FeeStrategy::Fixed(amount) => amount,
        }
    }

    /// Append a P2PKH change output to `address` holding whatever the fee leaves.
    ///
    /// Change below the dust limit is left to the miner and `None` is returned.
    /// Fails with `InsufficientFee` if the inputs cannot cover the fee even
    /// without a change output; the outputs are then left as they were.
    pub fn set_change(&mut self, address: &str, fee: FeeStrategy) -> AppResult<Option<usize>> {
        let change_script = script::p2pkh_locking_script_from_address(address)?;
        let available = self.fee()?;

        self.outputs.push(TxOutput::new(change_script, 0));
        let fee_amount = self.required_fee(fee);

        match available.checked_sub(fee_amount) {
            Some(change) if change >= DUST_LIMIT => {
                let index = self.outputs.len() - 1;
                self.outputs[index].satoshis = change;
                tracing::debug!("Change output #{}: {} satoshis, fee {}", index, change, fee_amount);
                Ok(Some(index))
            }
            _ => {
                self.outputs.pop();

                // A smaller tx without change may still be affordable
                let fee_amount = self.required_fee(fee);
                if available < fee_amount {
                    tracing::warn!(
                        "Inputs leave {} satoshis for fee, {} required",
                        available,
                        fee_amount
                    );
                    return Err(AppError::InsufficientFee {
                        expected: fee_amount,
                        actual: available,
                    });
                }

                tracing::debug!(
                    "Change {} below dust limit, no change output (fee {}, miner keeps {})",
                    available - fee_amount,
                    fee_amount,
                    available
                );
                Ok(None)
            }
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], TxDecodeError> {
        if self.remaining() < n {
            return Err(TxDecodeError::UnexpectedEof {
                offset: self.pos,
                needed: n,
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], TxDecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    fn read_u32(&mut self) -> Result<u32, TxDecodeError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_u64(&mut self) -> Result<u64, TxDecodeError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_compact_size(&mut self) -> Result<u64, TxDecodeError> {
        let n = match self.read_array::<1>()?[0] {
            0xfd => u16::from_le_bytes(self.read_array()?) as u64,
            0xfe => u32::from_le_bytes(self.read_array()?) as u64,
            0xff => u64::from_le_bytes(self.read_array()?),
            n => n as u64,
        };
        Ok(n)
    }

    /// Element count, bounded by how many minimum-size elements could still fit
    fn read_count(&mut self, min_element_size: usize) -> Result<usize, TxDecodeError> {
        let n = self.read_compact_size()?;
        if n > (self.remaining() / min_element_size) as u64 {
            return Err(TxDecodeError::LengthOverflow(n));
        }
        Ok(n as usize)
    }

    fn read_var_bytes(&mut self) -> Result<Vec<u8>, TxDecodeError> {
        let len = self.read_compact_size()?;
        if len > self.remaining() as u64 {
            return Err(TxDecodeError::LengthOverflow(len));
        }
        Ok(self.read_bytes(len as usize)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Network, PrivateKey};

    fn sample_tx() -> Transaction {
        let mut tx = Transaction::new();
        tx.add_input(TxInput::new([0x11; 32], 1).with_prev_output(vec![0x51], 5000));
        tx.add_output(TxOutput::new(vec![0x6a, 0x01, 0x02], 1200));
        tx.lock_time = 7;
        tx
    }

    #[test]
    fn test_serialize_layout() {
        let tx = sample_tx();
        let bytes = tx.serialize();

        assert_eq!(&bytes[..4], &1u32.to_le_bytes());
        assert_eq!(bytes[4], 1); // input count
        assert_eq!(&bytes[5..37], &[0x11; 32]);
        assert_eq!(&bytes[37..41], &1u32.to_le_bytes());
        assert_eq!(bytes[41], 0); // empty scriptSig
        assert_eq!(&bytes[42..46], &DEFAULT_SEQUENCE.to_le_bytes());
        assert_eq!(bytes[46], 1); // output count
        assert_eq!(&bytes[47..55], &1200u64.to_le_bytes());
        assert_eq!(&bytes[bytes.len() - 4..], &7u32.to_le_bytes());
        assert_eq!(bytes.len(), tx.size());
    }

    #[test]
    fn test_parse_drops_prev_output_only() {
        let tx = sample_tx();
        let parsed = Transaction::from_hex(&tx.to_hex()).unwrap();

        assert_eq!(parsed.inputs[0].prev_output, None);
        assert_eq!(parsed.inputs[0].prev_txid, tx.inputs[0].prev_txid);
        assert_eq!(parsed.outputs, tx.outputs);
        assert_eq!(parsed.txid(), tx.txid());
    }

    #[test]
    fn test_parse_rejects_trailing_and_truncated() {
        let mut bytes = sample_tx().serialize();
        bytes.push(0x00);
        assert_eq!(Transaction::parse(&bytes), Err(TxDecodeError::TrailingBytes(1)));

        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            Transaction::parse(&bytes),
            Err(TxDecodeError::UnexpectedEof { .. })
        ));

        // Absurd input count
        assert!(matches!(
            Transaction::parse(&[1, 0, 0, 0, 0xfe, 0xff, 0xff, 0xff, 0x7f]),
            Err(TxDecodeError::LengthOverflow(_))
        ));
    }

    #[test]
    fn test_txid_is_reversed_double_sha() {
        let tx = sample_tx();
        let mut expected = sha256d(&tx.serialize());
        expected.reverse();
        assert_eq!(tx.txid(), hex::encode(expected));
    }

    #[test]
    fn test_fee_requires_prev_outputs() {
        let mut tx = sample_tx();
        assert_eq!(tx.fee().unwrap(), 3800);

        tx.add_input(TxInput::new([0x22; 32], 0));
        assert!(tx.input_amount().is_err());
    }

    #[test]
    fn test_input_index_out_of_range() {
        let mut tx = sample_tx();
        assert!(tx.input(1).is_err());
        assert!(tx.set_input_script(3, vec![0x00]).is_err());
    }

    #[test]
    fn test_set_change_adds_output_above_dust() {
        let key = PrivateKey::generate(Network::Testnet).unwrap();
        let p2pkh = script::p2pkh_locking_script(&key.pubkey_hash());

        let mut tx = Transaction::new();
        tx.add_input(TxInput::new([0x33; 32], 0).with_prev_output(p2pkh, 100_000));
        tx.add_output(TxOutput::new(vec![0x51], 1000));

        let index = tx.set_change(&key.address(), FeeStrategy::PerKb(500)).unwrap();
        assert_eq!(index, Some(1));

        // 1 P2PKH input (unsigned) + 2 outputs
        let fee = tx.fee().unwrap();
        let expected = (tx.estimated_size() as u64 * 500).div_ceil(1000);
        assert_eq!(fee, expected);
        assert_eq!(tx.estimated_size(), tx.size() + P2PKH_UNLOCKING_SCRIPT_SIZE);
    }

    #[test]
    fn test_set_change_skips_dust() {
        let key = PrivateKey::generate(Network::Testnet).unwrap();

        let mut tx = Transaction::new();
        tx.add_input(TxInput::new([0x33; 32], 0).with_prev_output(vec![0x51], 2000));
        tx.add_output(TxOutput::new(vec![0x51], 1000));

        let index = tx.set_change(&key.address(), FeeStrategy::Fixed(500)).unwrap();
        assert_eq!(index, None);
        assert_eq!(tx.outputs.len(), 1);
    }

    #[test]
    fn test_set_change_rejects_fee_shortfall() {
        let key = PrivateKey::generate(Network::Testnet).unwrap();
        let p2pkh = script::p2pkh_locking_script(&key.pubkey_hash());

        // 1000 in, 900 out: a fixed 5000 sat fee cannot be paid
        let mut tx = Transaction::new();
        tx.add_input(TxInput::new([0x44; 32], 0).with_prev_output(vec![0x51], 1000));
        tx.add_output(TxOutput::new(vec![0x52], 900));
        let before = tx.clone();

        assert!(matches!(
            tx.set_change(&key.address(), FeeStrategy::Fixed(5_000)),
            Err(AppError::InsufficientFee {
                expected: 5_000,
                actual: 100
            })
        ));
        assert_eq!(tx, before);

        // 1010 in, 1000 locked: 10 sat is short of the 500 sat/kb rate
        let mut tx = Transaction::new();
        tx.add_input(TxInput::new([0x55; 32], 0).with_prev_output(p2pkh, 1010));
        tx.add_output(TxOutput::new(vec![0x51], 1000));
        let before = tx.clone();

        let expected = (tx.estimated_size() as u64 * 500).div_ceil(1000);
        match tx.set_change(&key.address(), FeeStrategy::PerKb(500)) {
            Err(AppError::InsufficientFee {
                expected: required,
                actual,
            }) => {
                assert_eq!(required, expected);
                assert_eq!(actual, 10);
            }
            other => panic!("expected InsufficientFee, got {:?}", other),
        }
        assert_eq!(tx, before);
    }

    #[test]
    fn test_output_amount_overflow_is_error() {
        let mut tx = sample_tx();
        tx.add_output(TxOutput::new(vec![0x51], u64::MAX));
        assert!(tx.output_amount().is_err());
        assert!(tx.fee().is_err());
    }
}
