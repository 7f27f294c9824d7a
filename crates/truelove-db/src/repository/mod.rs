//! SurrealDB repository implementations.

mod field;
mod group;
mod qr_code;
mod section;

pub use field::SurrealFieldRepository;
pub use group::SurrealGroupRepository;
pub use qr_code::SurrealQrCodeRepository;
pub use section::SurrealSectionRepository;

use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_uuid(s: &str, what: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(s).map_err(|e| DbError::Decode(format!("invalid {what} UUID: {e}")))
}
