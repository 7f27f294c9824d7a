//! QR code (label token) domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TrueLoveError;

/// Prefix of every sequential label code.
pub const CODE_PREFIX: &str = "QR";

/// Kind of entity a QR code can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Group,
    Section,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Group => "group",
            EntityType::Section => "section",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = TrueLoveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(EntityType::Group),
            "section" => Ok(EntityType::Section),
            other => Err(TrueLoveError::Validation {
                message: format!("unknown entity type: {other}"),
            }),
        }
    }
}

/// A printable label token.
///
/// A token is either free (`available == true`, no assignee) or bound
/// to exactly one group or section. Tokens are never deleted, so the
/// sequential `code` stays unique for the life of the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrCode {
    pub id: Uuid,
    pub code: String,
    pub available: bool,
    pub assigned_to: Option<Uuid>,
    pub assigned_type: Option<EntityType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QrCode {
    pub fn is_bound_to(&self, entity_id: Uuid) -> bool {
        !self.available && self.assigned_to == Some(entity_id)
    }

    /// Label for the `n`-th token ever created: `QR001`, `QR002`, …
    ///
    /// Padding is a minimum width; `QR1000` follows `QR999`.
    pub fn sequential_code(n: u64) -> String {
        format!("{CODE_PREFIX}{n:03}")
    }
}

/// Who a newly created token is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQrCode {
    pub code: String,
    /// `None` creates a free, pre-provisioned token.
    pub assignment: Option<Assignment>,
}
