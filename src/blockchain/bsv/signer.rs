use secp256k1::Message;

use crate::crypto::{PrivateKey, SECP};
use crate::error::{AppError, AppResult};

use super::script;
use super::sighash::{sighash, SighashType};
use super::transaction::Transaction;

/// Sign a sighash digest; returns DER signature with the sighash byte appended
pub fn sign_digest(
    private_key: &PrivateKey,
    digest: &[u8; 32],
    sighash_type: SighashType,
) -> AppResult<Vec<u8>> {
    let message = Message::from_digest_slice(digest)
        .map_err(|e| AppError::InternalError(format!("Invalid sighash: {}", e)))?;

    // libsecp256k1 always produces low-S signatures
    let signature = SECP.sign_ecdsa(&message, private_key.secret_key());

    let mut sig_bytes = signature.serialize_der().to_vec();
    sig_bytes.push(sighash_type.as_byte());
    Ok(sig_bytes)
}

/// Sign a P2PKH input and install its `<sig> <pubkey>` unlocking script.
///
/// The input must carry the output it spends.
pub fn unlock_p2pkh_input(
    private_key: &PrivateKey,
    tx: &mut Transaction,
    input_index: usize,
    sighash_type: SighashType,
) -> AppResult<()> {
    let prev_output = tx.input(input_index)?.prev_output.clone().ok_or_else(|| {
        AppError::ValidationError(format!(
            "Input {} has no previous output attached",
            input_index
        ))
    })?;

    let public_key = private_key.public_key_bytes();
    if !script::pays_to_pubkey(&prev_output.script_pubkey, &public_key) {
        return Err(AppError::SigningError(format!(
            "Input {} is not a P2PKH output of {}",
            input_index,
            private_key.address()
        )));
    }

    let digest = sighash(
        tx,
        &prev_output.script_pubkey,
        prev_output.satoshis,
        input_index,
        sighash_type,
    )?;
    let signature = sign_digest(private_key, &digest, sighash_type)?;

    tracing::debug!(
        "Signed input #{} ({} satoshis) with sighash 0x{:02x}",
        input_index,
        prev_output.satoshis,
        sighash_type.0
    );

    tx.set_input_script(input_index, script::p2pkh_unlocking_script(&signature, &public_key))
}

/// Sign every input that spends a P2PKH output of `private_key`.
/// Returns the number of inputs signed.
pub fn sign_all_p2pkh(private_key: &PrivateKey, tx: &mut Transaction) -> AppResult<usize> {
    let public_key = private_key.public_key_bytes();
    let owned: Vec<usize> = tx
        .inputs
        .iter()
        .enumerate()
        .filter(|(_, input)| {
            input
                .prev_output
                .as_ref()
                .is_some_and(|prev| script::pays_to_pubkey(&prev.script_pubkey, &public_key))
        })
        .map(|(i, _)| i)
        .collect();

    for &index in &owned {
        unlock_p2pkh_input(private_key, tx, index, SighashType::ALL_FORKID)?;
    }

    Ok(owned.len())
}
