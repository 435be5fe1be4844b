pub mod blockchain;
pub mod config;
pub mod crypto;
pub mod error;
