//! Standard script templates

use crate::crypto::{decode_address, hash160};
use crate::error::AppResult;

pub const OP_DUP: u8 = 0x76;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;

/// Append a minimal data push
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len < OP_PUSHDATA1 as usize {
        script.push(len as u8);
    } else if len <= 0xff {
        script.push(OP_PUSHDATA1);
        script.push(len as u8);
    } else if len <= 0xffff {
        script.push(OP_PUSHDATA2);
        script.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        script.push(OP_PUSHDATA4);
        script.extend_from_slice(&(len as u32).to_le_bytes());
    }
    script.extend_from_slice(data);
}

/// P2PKH: OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
pub fn p2pkh_locking_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(0x14);
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

pub fn p2pkh_locking_script_from_address(address: &str) -> AppResult<Vec<u8>> {
    let (_, pubkey_hash) = decode_address(address)?;
    Ok(p2pkh_locking_script(&pubkey_hash))
}

/// P2PKH scriptSig: <sig+hashtype> <pubkey>
pub fn p2pkh_unlocking_script(signature: &[u8], public_key: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(2 + signature.len() + public_key.len());
    push_data(&mut script, signature);
    push_data(&mut script, public_key);
    script
}

pub fn is_p2pkh(script: &[u8]) -> bool {
    script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

/// Whether `script` is the P2PKH script for this public key
pub fn pays_to_pubkey(script: &[u8], public_key: &[u8]) -> bool {
    is_p2pkh(script) && script[3..23] == hash160(public_key)
}

/// Split a script into its data pushes; `None` if it contains anything else
pub fn parse_pushes(script: &[u8]) -> Option<Vec<Vec<u8>>> {
    let mut pushes = Vec::new();
    let mut pos = 0;

    while pos < script.len() {
        let opcode = script[pos];
        pos += 1;

        let len = match opcode {
            0x01..=0x4b => opcode as usize,
            OP_PUSHDATA1 => {
                let len = *script.get(pos)? as usize;
                pos += 1;
                len
            }
            OP_PUSHDATA2 => {
                let bytes = script.get(pos..pos + 2)?;
                pos += 2;
                u16::from_le_bytes([bytes[0], bytes[1]]) as usize
            }
            OP_PUSHDATA4 => {
                let bytes = script.get(pos..pos + 4)?;
                pos += 4;
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
            }
            _ => return None,
        };

        pushes.push(script.get(pos..pos + len)?.to_vec());
        pos += len;
    }

    Some(pushes)
}
