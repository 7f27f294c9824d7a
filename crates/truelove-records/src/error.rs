//! Service error types.

use thiserror::Error;
use truelove_core::error::TrueLoveError;

#[derive(Debug, Error)]
pub enum RecordsError {
    #[error("QR code {code} is bound to another entity")]
    TokenTaken { code: String },

    #[error("no free QR code could be claimed after {attempts} attempts")]
    ClaimContention { attempts: u32 },

    #[error("no unique QR code could be minted after {attempts} attempts")]
    MintContention { attempts: u32 },

    #[error("only number and money fields can operate, got {field_type}")]
    NotOperable { field_type: String },
}

impl From<RecordsError> for TrueLoveError {
    fn from(err: RecordsError) -> Self {
        match err {
            RecordsError::TokenTaken { code } => TrueLoveError::AlreadyAssigned { code },
            RecordsError::ClaimContention { .. } | RecordsError::MintContention { .. } => {
                TrueLoveError::StoreUnavailable(err.to_string())
            }
            RecordsError::NotOperable { .. } => TrueLoveError::Validation {
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_taken_maps_to_already_assigned() {
        let err: TrueLoveError = RecordsError::TokenTaken {
            code: "QR007".into(),
        }
        .into();
        assert!(matches!(err, TrueLoveError::AlreadyAssigned { code } if code == "QR007"));
    }

    #[test]
    fn contention_maps_to_store_unavailable() {
        let err: TrueLoveError = RecordsError::MintContention { attempts: 3 }.into();
        assert!(matches!(err, TrueLoveError::StoreUnavailable(msg) if msg.contains("3 attempts")));
    }
}
