//! Bitcoin wire integers and the small hex helpers used by contract scripts

use crate::error::{AppError, AppResult};

/// Append a compact size integer (Bitcoin varint)
pub fn write_compact_size(buf: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

/// Encoded length of a compact size integer
pub fn compact_size_len(n: u64) -> usize {
    if n < 0xfd {
        1
    } else if n <= 0xffff {
        3
    } else if n <= 0xffff_ffff {
        5
    } else {
        9
    }
}

/// Reverse the byte order of a hex number.
///
/// The value is treated as a big number first, so leading zero bytes are
/// dropped before reversing ("00ff01" -> "01ff"). Zero encodes as "00".
pub fn reverse_endian(hex_str: &str) -> AppResult<String> {
    let padded = pad_leading_zero(hex_str);
    let bytes = hex::decode(&padded)
        .map_err(|e| AppError::ValidationError(format!("Invalid hex number: {}", e)))?;

    let significant = match bytes.iter().position(|b| *b != 0) {
        Some(start) => bytes[start..].to_vec(),
        None => vec![0],
    };

    Ok(hex::encode(significant.into_iter().rev().collect::<Vec<u8>>()))
}

/// Left-pad an odd-length hex string with a single zero
pub fn pad_leading_zero(hex_str: &str) -> String {
    if hex_str.len() % 2 == 0 {
        hex_str.to_string()
    } else {
        format!("0{}", hex_str)
    }
}

/// Sighash flags as the lowercase hex string contracts embed ("41", "c3", ...)
pub fn sighash_type_to_hex(sighash_type: u32) -> String {
    format!("{:x}", sighash_type)
}
