use std::fmt;

use crate::blockchain::bsv::transaction::TxDecodeError;

#[derive(Debug)]
pub enum AppError {
    // Validation errors
    ValidationError(String),

    // Wire format errors
    DecodeError(String),

    // Fee errors
    InsufficientFee { expected: u64, actual: u64 },

    // Key and signature errors
    SigningError(String),

    // Internal errors
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::DecodeError(msg) => write!(f, "Decode error: {}", msg),
            AppError::InsufficientFee { expected, actual } => write!(
                f,
                "Transaction with fee is too low: expected Fee is {}, but got {}",
                expected, actual
            ),
            AppError::SigningError(msg) => write!(f, "Signing error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<TxDecodeError> for AppError {
    fn from(err: TxDecodeError) -> Self {
        AppError::DecodeError(err.to_string())
    }
}

impl From<hex::FromHexError> for AppError {
    fn from(err: hex::FromHexError) -> Self {
        AppError::DecodeError(format!("Invalid hex: {}", err))
    }
}

impl From<secp256k1::Error> for AppError {
    fn from(err: secp256k1::Error) -> Self {
        tracing::error!("secp256k1 error: {:?}", err);
        AppError::SigningError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
