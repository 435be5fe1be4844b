use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Double SHA-256
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// Hash160 = RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}

/// Base58Check encode: payload + first 4 bytes of sha256d(payload)
pub fn base58check_encode(payload: &[u8]) -> String {
    let checksum = sha256d(payload);
    let mut bytes = Vec::with_capacity(payload.len() + 4);
    bytes.extend_from_slice(payload);
    bytes.extend_from_slice(&checksum[..4]);
    bs58::encode(bytes).into_string()
}

/// Base58Check decode, returning the payload without checksum
pub fn base58check_decode(encoded: &str) -> Option<Vec<u8>> {
    let decoded = bs58::decode(encoded.trim()).into_vec().ok()?;
    if decoded.len() < 5 {
        return None;
    }

    let payload_len = decoded.len() - 4;
    let (payload, checksum) = decoded.split_at(payload_len);
    if sha256d(payload)[..4] != *checksum {
        return None;
    }

    Some(payload.to_vec())
}
