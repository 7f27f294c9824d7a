//! Error types for the TrueLove records system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrueLoveError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("QR code {code} is already assigned")]
    AlreadyAssigned { code: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type TrueLoveResult<T> = Result<T, TrueLoveError>;
