pub mod hash;
pub mod keys;

pub use hash::{hash160, sha256d};
pub use keys::{decode_address, validate_address, Network, PrivateKey, SECP};
