use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use rand::RngCore;
use secp256k1::{All, PublicKey, Secp256k1, SecretKey};

use super::hash::{base58check_decode, base58check_encode, hash160};
use crate::error::{AppError, AppResult};

/// Shared signing/verification context
pub static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// P2PKH address version byte
    pub fn address_prefix(&self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    /// WIF private key version byte
    pub fn wif_prefix(&self) -> u8 {
        match self {
            Network::Mainnet => 0x80,
            Network::Testnet => 0xef,
        }
    }

    fn from_address_prefix(prefix: u8) -> Option<Self> {
        match prefix {
            0x00 => Some(Network::Mainnet),
            0x6f => Some(Network::Testnet),
            _ => None,
        }
    }

    fn from_wif_prefix(prefix: u8) -> Option<Self> {
        match prefix {
            0x80 => Some(Network::Mainnet),
            0xef => Some(Network::Testnet),
            _ => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "livenet" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            other => Err(AppError::ValidationError(format!("Unknown network: {}", other))),
        }
    }
}

/// secp256k1 private key bound to a network
#[derive(Clone)]
pub struct PrivateKey {
    secret: SecretKey,
    network: Network,
    compressed: bool,
}

impl PrivateKey {
    pub fn new(secret: SecretKey, network: Network) -> Self {
        Self {
            secret,
            network,
            compressed: true,
        }
    }

    /// Generate a new random key
    pub fn generate(network: Network) -> AppResult<Self> {
        let mut rng = rand::thread_rng();
        let mut key_bytes = [0u8; 32];
        rng.fill_bytes(&mut key_bytes);

        let secret = SecretKey::from_slice(&key_bytes)
            .map_err(|e| AppError::InternalError(format!("Failed to generate secret key: {}", e)))?;

        Ok(Self::new(secret, network))
    }

    /// Parse either a WIF key or a raw 32-byte hex key.
    /// Hex keys take the given network; WIF keys carry their own.
    pub fn parse(private_key: &str, network: Network) -> AppResult<Self> {
        let key_hex = private_key.strip_prefix("0x").unwrap_or(private_key);
        if key_hex.len() == 64 && key_hex.chars().all(|c| c.is_ascii_hexdigit()) {
            tracing::debug!("Detected hex format private key");
            return Self::from_hex(key_hex, network);
        }

        tracing::debug!("Detected WIF format private key");
        Self::from_wif(private_key)
    }

    pub fn from_hex(private_key: &str, network: Network) -> AppResult<Self> {
        let key_hex = private_key.strip_prefix("0x").unwrap_or(private_key);
        let key_bytes = hex::decode(key_hex)
            .map_err(|e| AppError::ValidationError(format!("Invalid private key hex: {}", e)))?;

        if key_bytes.len() != 32 {
            return Err(AppError::ValidationError(format!(
                "Private key must be 32 bytes, got {} bytes",
                key_bytes.len()
            )));
        }

        let secret = SecretKey::from_slice(&key_bytes)
            .map_err(|e| AppError::ValidationError(format!("Invalid private key: {}", e)))?;

        Ok(Self::new(secret, network))
    }

    /// Decode a WIF (Wallet Import Format) private key
    /// WIF format: Base58Check(prefix + privkey + [compression flag])
    pub fn from_wif(wif: &str) -> AppResult<Self> {
        let payload = base58check_decode(wif)
            .ok_or_else(|| AppError::ValidationError("Invalid WIF encoding or checksum".to_string()))?;

        // Uncompressed: 1 byte prefix + 32 bytes key
        // Compressed: 1 byte prefix + 32 bytes key + 0x01
        let compressed = match payload.len() {
            33 => false,
            34 if payload[33] == 0x01 => true,
            len => {
                return Err(AppError::ValidationError(format!(
                    "Invalid WIF length: expected 33 or 34 bytes, got {}",
                    len
                )))
            }
        };

        let network = Network::from_wif_prefix(payload[0]).ok_or_else(|| {
            AppError::ValidationError(format!("Invalid WIF prefix: 0x{:02x}", payload[0]))
        })?;

        let secret = SecretKey::from_slice(&payload[1..33])
            .map_err(|e| AppError::ValidationError(format!("Invalid private key: {}", e)))?;

        Ok(Self {
            secret,
            network,
            compressed,
        })
    }

    pub fn to_wif(&self) -> String {
        let mut payload = Vec::with_capacity(34);
        payload.push(self.network.wif_prefix());
        payload.extend_from_slice(&self.secret.secret_bytes());
        if self.compressed {
            payload.push(0x01);
        }
        base58check_encode(&payload)
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_secret_key(&*SECP, &self.secret)
    }

    /// Serialized public key, compressed unless imported from an uncompressed WIF
    pub fn public_key_bytes(&self) -> Vec<u8> {
        let public_key = self.public_key();
        if self.compressed {
            public_key.serialize().to_vec()
        } else {
            public_key.serialize_uncompressed().to_vec()
        }
    }

    pub fn pubkey_hash(&self) -> [u8; 20] {
        hash160(&self.public_key_bytes())
    }

    pub fn address(&self) -> String {
        pubkey_hash_to_address(&self.pubkey_hash(), self.network)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("network", &self.network)
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Encode a 20-byte public key hash as a P2PKH address
pub fn pubkey_hash_to_address(pubkey_hash: &[u8; 20], network: Network) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(network.address_prefix());
    payload.extend_from_slice(pubkey_hash);
    base58check_encode(&payload)
}

/// Decode a P2PKH address into its network and public key hash
pub fn decode_address(address: &str) -> AppResult<(Network, [u8; 20])> {
    let payload = base58check_decode(address)
        .ok_or_else(|| AppError::ValidationError(format!("Invalid address: {}", address)))?;

    if payload.len() != 21 {
        return Err(AppError::ValidationError(format!(
            "Invalid address length: expected 21 bytes, got {}",
            payload.len()
        )));
    }

    let network = Network::from_address_prefix(payload[0]).ok_or_else(|| {
        AppError::ValidationError(format!("Unsupported address prefix: 0x{:02x}", payload[0]))
    })?;

    let mut pubkey_hash = [0u8; 20];
    pubkey_hash.copy_from_slice(&payload[1..]);
    Ok((network, pubkey_hash))
}

pub fn validate_address(address: &str, network: Network) -> bool {
    matches!(decode_address(address), Ok((n, _)) if n == network)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_ONE_HEX: &str = "0000000000000000000000000000000000000000000000000000000000000001";

    #[test]
    fn test_key_one_mainnet_address() {
        let key = PrivateKey::from_hex(KEY_ONE_HEX, Network::Mainnet).unwrap();
        assert_eq!(key.address(), "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
        assert_eq!(
            key.to_wif(),
            "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn"
        );
    }

    #[test]
    fn test_wif_roundtrip_keeps_network() {
        let key = PrivateKey::generate(Network::Testnet).unwrap();
        let imported = PrivateKey::from_wif(&key.to_wif()).unwrap();

        assert_eq!(imported.network(), Network::Testnet);
        assert_eq!(imported.address(), key.address());
        assert!(validate_address(&key.address(), Network::Testnet));
        assert!(!validate_address(&key.address(), Network::Mainnet));
    }

    #[test]
    fn test_parse_detects_format() {
        let from_hex = PrivateKey::parse(&format!("0x{}", KEY_ONE_HEX), Network::Mainnet).unwrap();
        let from_wif =
            PrivateKey::parse("KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn", Network::Testnet)
                .unwrap();

        // WIF carries its own network
        assert_eq!(from_wif.network(), Network::Mainnet);
        assert_eq!(from_hex.address(), from_wif.address());
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert!(PrivateKey::from_hex("abcd", Network::Mainnet).is_err());
        assert!(PrivateKey::from_hex(&"00".repeat(32), Network::Mainnet).is_err());
        assert!(PrivateKey::from_wif("not-a-wif").is_err());
    }

    #[test]
    fn test_decode_address() {
        let (network, hash) = decode_address("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH").unwrap();
        assert_eq!(network, Network::Mainnet);
        assert_eq!(
            pubkey_hash_to_address(&hash, Network::Mainnet),
            "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"
        );
        assert!(decode_address("").is_err());
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!("Mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("test".parse::<Network>().unwrap(), Network::Testnet);
        assert!("stn".parse::<Network>().is_err());
    }
}
