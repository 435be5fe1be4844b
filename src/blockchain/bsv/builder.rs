//! Transaction assembly for contract deployment and spending
//!
//! UTXO lists come from a block explorer; fetching them and broadcasting
//! the result happen outside this crate.

use serde::{Deserialize, Serialize};

use crate::crypto::PrivateKey;
use crate::error::{AppError, AppResult};

use super::constants::{DEFAULT_FEE_PER_KB, DUMMY_TX_ID, INPUT_INDEX, INPUT_SATOSHIS};
use super::script;
use super::signer::sign_all_p2pkh;
use super::transaction::{FeeStrategy, Transaction, TxInput, TxOutput};

/// Unspent output as listed by the explorer's `address/{address}/unspent`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    #[serde(rename = "tx_hash")]
    pub txid: String,
    #[serde(rename = "tx_pos")]
    pub vout: u32,
    #[serde(rename = "value")]
    pub satoshis: u64,
    #[serde(default)]
    pub height: u64,
}

/// Decode a display-order txid hex string
pub fn parse_txid(txid: &str) -> AppResult<[u8; 32]> {
    let bytes = hex::decode(txid.trim())
        .map_err(|e| AppError::ValidationError(format!("Invalid txid hex: {}", e)))?;

    bytes.try_into().map_err(|bytes: Vec<u8>| {
        AppError::ValidationError(format!("Invalid txid length: {} bytes", bytes.len()))
    })
}

/// One input spending the well-known dummy outpoint, for local script tests
pub fn new_tx() -> Transaction {
    let mut tx = Transaction::new();
    let dummy_txid = parse_txid(DUMMY_TX_ID).unwrap_or([0u8; 32]);
    tx.add_input(TxInput::new(dummy_txid, 0).with_prev_output(Vec::new(), INPUT_SATOSHIS));
    tx
}

/// P2PKH inputs for every UTXO of `address`
pub fn p2pkh_inputs(address: &str, utxos: &[Utxo]) -> AppResult<Vec<TxInput>> {
    let locking_script = script::p2pkh_locking_script_from_address(address)?;

    utxos
        .iter()
        .map(|utxo| {
            Ok(TxInput::new(parse_txid(&utxo.txid)?, utxo.vout)
                .with_prev_output(locking_script.clone(), utxo.satoshis))
        })
        .collect()
}

/// Inputs only; the caller adds outputs and whoever pays signs
pub fn create_pay_by_others_tx(address: &str, utxos: &[Utxo]) -> AppResult<Transaction> {
    let mut tx = Transaction::new();
    tx.inputs = p2pkh_inputs(address, utxos)?;
    Ok(tx)
}

/// Lock `amount` into `locking_script`, funded by `address` with change back to it
pub fn create_locking_tx(
    address: &str,
    utxos: &[Utxo],
    amount: u64,
    locking_script: Vec<u8>,
    fee_per_kb: u64,
) -> AppResult<Transaction> {
    if utxos.is_empty() {
        return Err(AppError::ValidationError(format!(
            "No UTXOs available for {}",
            address
        )));
    }

    let mut tx = create_pay_by_others_tx(address, utxos)?;
    tx.add_output(TxOutput::new(locking_script, amount));
    tx.set_change(address, FeeStrategy::PerKb(fee_per_kb))?;

    tracing::info!(
        "Locking tx: {} inputs, {} satoshis into contract, fee {}",
        tx.inputs.len(),
        amount,
        tx.fee()?
    );

    Ok(tx)
}

/// Let `address` fund an existing transaction: append its UTXOs as inputs
/// and a change output, with an explicit fee or the default rate
pub fn any_one_pay_for_tx(
    tx: &mut Transaction,
    address: &str,
    utxos: &[Utxo],
    fee: Option<u64>,
) -> AppResult<Option<usize>> {
    tx.inputs.extend(p2pkh_inputs(address, utxos)?);

    let strategy = match fee {
        Some(amount) => FeeStrategy::Fixed(amount),
        None => FeeStrategy::PerKb(DEFAULT_FEE_PER_KB),
    };
    tx.set_change(address, strategy)
}

/// Spend output `INPUT_INDEX` of `prev_txid` into a single output
pub fn create_unlocking_tx(
    prev_txid: &str,
    input_amount: u64,
    input_locking_script: Vec<u8>,
    output_amount: u64,
    output_locking_script: Vec<u8>,
) -> AppResult<Transaction> {
    let mut tx = Transaction::new();
    tx.add_input(
        TxInput::new(parse_txid(prev_txid)?, INPUT_INDEX as u32)
            .with_prev_output(input_locking_script, input_amount),
    );
    tx.add_output(TxOutput::new(output_locking_script, output_amount));
    Ok(tx)
}

/// Input spending `tx`'s output `output_index`, with that output attached
pub fn create_input_from_tx(tx: &Transaction, output_index: u32) -> AppResult<TxInput> {
    let output = tx.outputs.get(output_index as usize).ok_or_else(|| {
        AppError::ValidationError(format!(
            "Output index {} out of range ({} outputs)",
            output_index,
            tx.outputs.len()
        ))
    })?;

    Ok(TxInput::new(tx.txid_bytes(), output_index)
        .with_prev_output(output.script_pubkey.clone(), output.satoshis))
}

/// Build the unlocking script of `input_index` from the output it spends
pub fn set_input_script_with<F>(tx: &mut Transaction, input_index: usize, build: F) -> AppResult<()>
where
    F: FnOnce(&Transaction, &[u8], u64) -> AppResult<Vec<u8>>,
{
    let prev_output = tx.input(input_index)?.prev_output.clone().ok_or_else(|| {
        AppError::ValidationError(format!(
            "Input {} has no previous output attached",
            input_index
        ))
    })?;

    let script_sig = build(tx, &prev_output.script_pubkey, prev_output.satoshis)?;
    tx.set_input_script(input_index, script_sig)
}

/// Signed transaction locking `amount` into `locking_script` from the key's UTXOs
pub fn build_deploy_tx(
    private_key: &PrivateKey,
    utxos: &[Utxo],
    locking_script: Vec<u8>,
    amount: u64,
    fee_per_kb: u64,
) -> AppResult<Transaction> {
    let address = private_key.address();
    let mut tx = create_locking_tx(&address, utxos, amount, locking_script, fee_per_kb)?;

    let signed = sign_all_p2pkh(private_key, &mut tx)?;
    tracing::info!("Deploy tx {} signed ({} inputs)", tx.txid(), signed);

    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::bsv::constants::REVERSED_DUMMY_TX_ID;
    use crate::blockchain::bsv::fee::FeePolicy;
    use crate::crypto::Network;

    fn utxos() -> Vec<Utxo> {
        serde_json::from_str(
            r#"[
                {"height": 1500000, "tx_pos": 1, "tx_hash": "ab00000000000000000000000000000000000000000000000000000000000001", "value": 60000},
                {"height": 1500001, "tx_pos": 0, "tx_hash": "cd00000000000000000000000000000000000000000000000000000000000002", "value": 40000}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_utxo_explorer_shape() {
        let utxos = utxos();
        assert_eq!(utxos[0].vout, 1);
        assert_eq!(utxos[1].satoshis, 40_000);
        assert!(utxos[0].txid.starts_with("ab"));
    }

    #[test]
    fn test_new_tx_spends_dummy_outpoint() {
        let tx = new_tx();
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(hex::encode(tx.inputs[0].prev_txid), DUMMY_TX_ID);
        assert_eq!(hex::encode(&tx.inputs[0].outpoint()[..32]), REVERSED_DUMMY_TX_ID);
        assert_eq!(tx.input_amount().unwrap(), INPUT_SATOSHIS);
    }

    #[test]
    fn test_parse_txid_rejects_wrong_length() {
        assert!(parse_txid("abcd").is_err());
        assert!(parse_txid("zz").is_err());
    }

    #[test]
    fn test_create_locking_tx() {
        let key = PrivateKey::generate(Network::Testnet).unwrap();
        let tx = create_locking_tx(&key.address(), &utxos(), 1000, vec![0x51], 500).unwrap();

        assert_eq!(tx.inputs.len(), 2);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].satoshis, 1000);
        assert!(script::is_p2pkh(&tx.outputs[1].script_pubkey));
        assert_eq!(tx.input_amount().unwrap(), 100_000);

        assert!(create_locking_tx(&key.address(), &[], 1000, vec![0x51], 500).is_err());
    }

    #[test]
    fn test_any_one_pay_for_tx_fixed_fee() {
        let key = PrivateKey::generate(Network::Testnet).unwrap();
        let mut tx = create_unlocking_tx(
            "ee00000000000000000000000000000000000000000000000000000000000003",
            1000,
            vec![0x51],
            900,
            vec![0x52],
        )
        .unwrap();

        let change = any_one_pay_for_tx(&mut tx, &key.address(), &utxos(), Some(2000)).unwrap();
        assert_eq!(change, Some(1));
        assert_eq!(tx.inputs.len(), 3);
        assert_eq!(tx.fee().unwrap(), 2000);
    }

    #[test]
    fn test_underfunded_builders_fail() {
        let key = PrivateKey::generate(Network::Testnet).unwrap();
        let mut tx =
            create_unlocking_tx(&"ee".repeat(32), 1000, vec![0x51], 900, vec![0x52]).unwrap();
        let small: Vec<Utxo> = serde_json::from_str(
            r#"[{"tx_hash": "ab00000000000000000000000000000000000000000000000000000000000009", "tx_pos": 0, "value": 500}]"#,
        )
        .unwrap();

        assert!(matches!(
            any_one_pay_for_tx(&mut tx, &key.address(), &small, Some(5_000)),
            Err(AppError::InsufficientFee { expected: 5_000, actual: 600 })
        ));

        let tiny: Vec<Utxo> = serde_json::from_str(
            r#"[{"tx_hash": "ab0000000000000000000000000000000000000000000000000000000000000a", "tx_pos": 0, "value": 1010}]"#,
        )
        .unwrap();
        assert!(matches!(
            create_locking_tx(&key.address(), &tiny, 1000, vec![0x51], 500),
            Err(AppError::InsufficientFee { actual: 10, .. })
        ));
    }

    #[test]
    fn test_create_input_from_tx() {
        let mut prev = Transaction::new();
        prev.add_output(TxOutput::new(vec![0x51], 1000));
        prev.add_output(TxOutput::new(vec![0x52], 2000));

        let input = create_input_from_tx(&prev, 1).unwrap();
        assert_eq!(input.prev_txid, prev.txid_bytes());
        assert_eq!(input.prev_vout, 1);
        assert_eq!(input.prev_output, Some(TxOutput::new(vec![0x52], 2000)));

        assert!(create_input_from_tx(&prev, 2).is_err());
    }

    #[test]
    fn test_set_input_script_with_sees_prev_output() {
        let mut tx = create_unlocking_tx(&"11".repeat(32), 5000, vec![0x53], 4000, vec![0x51])
            .unwrap();

        set_input_script_with(&mut tx, 0, |_, prev_script, satoshis| {
            assert_eq!(prev_script, &[0x53]);
            assert_eq!(satoshis, 5000);
            Ok(vec![0x00])
        })
        .unwrap();

        assert_eq!(tx.inputs[0].script_sig, vec![0x00]);
    }

    #[test]
    fn test_build_deploy_tx_is_signed_and_pays_fee() {
        let key = PrivateKey::generate(Network::Testnet).unwrap();
        let tx = build_deploy_tx(&key, &utxos(), vec![0x51], 1000, 500).unwrap();

        assert!(tx.inputs.iter().all(|input| !input.script_sig.is_empty()));
        // 500 sat/kb estimate covers the 0.5 sat/byte relay minimum
        assert!(FeePolicy::default().check(&tx).is_ok());
    }
}
