//! QR payload codec.
//!
//! The payload is the exact text embedded in a printed label. It is
//! compact JSON discriminated by `type`:
//!
//! ```text
//! {"type":"group","id":"<entityId>"}
//! {"type":"section","id":"<entityId>","groupId":"<parentGroupId>"}
//! ```
//!
//! Scanners must decode it with a generic JSON parser; key order and
//! whitespace carry no meaning.

use serde::{Deserialize, Serialize};

use crate::error::{TrueLoveError, TrueLoveResult};
use crate::models::qr_code::EntityType;

/// Payload emitted for an unknown entity tag.
pub const EMPTY_PAYLOAD: &str = "{}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QrPayload {
    Group {
        id: String,
    },
    Section {
        id: String,
        #[serde(rename = "groupId", default)]
        group_id: Option<String>,
    },
}

impl QrPayload {
    pub fn new(entity_type: EntityType, id: impl Into<String>, group_id: Option<String>) -> Self {
        match entity_type {
            EntityType::Group => QrPayload::Group { id: id.into() },
            EntityType::Section => QrPayload::Section {
                id: id.into(),
                group_id,
            },
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            QrPayload::Group { .. } => EntityType::Group,
            QrPayload::Section { .. } => EntityType::Section,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            QrPayload::Group { id } | QrPayload::Section { id, .. } => id,
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| EMPTY_PAYLOAD.to_string())
    }

    /// Parse scanned label text.
    pub fn decode(text: &str) -> TrueLoveResult<Self> {
        serde_json::from_str(text).map_err(|e| TrueLoveError::Validation {
            message: format!("unrecognized QR payload: {e}"),
        })
    }
}

/// Encode the payload for an entity given its wire tag.
///
/// `group_id` is only used for sections, where a missing value is
/// written as `null`. Any tag other than `group` or `section` yields
/// `"{}"`.
pub fn encode_payload(entity_type: &str, id: &str, group_id: Option<&str>) -> String {
    match entity_type.parse::<EntityType>() {
        Ok(kind) => QrPayload::new(kind, id, group_id.map(str::to_string)).encode(),
        Err(_) => EMPTY_PAYLOAD.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_payload_is_bit_exact() {
        assert_eq!(
            encode_payload("group", "g1", None),
            r#"{"type":"group","id":"g1"}"#
        );
        // groupId is ignored for groups.
        assert_eq!(
            encode_payload("group", "g1", Some("g0")),
            r#"{"type":"group","id":"g1"}"#
        );
    }

    #[test]
    fn section_payload_is_bit_exact() {
        assert_eq!(
            encode_payload("section", "s1", Some("g1")),
            r#"{"type":"section","id":"s1","groupId":"g1"}"#
        );
        assert_eq!(
            encode_payload("section", "s1", None),
            r#"{"type":"section","id":"s1","groupId":null}"#
        );
    }

    #[test]
    fn unknown_tag_yields_empty_object() {
        assert_eq!(encode_payload("bogus", "x", None), "{}");
    }

    #[test]
    fn decode_ignores_key_order_and_whitespace() {
        let payload = QrPayload::decode(r#"{ "groupId": "g1", "id": "s1", "type": "section" }"#)
            .unwrap();
        assert_eq!(
            payload,
            QrPayload::Section {
                id: "s1".into(),
                group_id: Some("g1".into()),
            }
        );
        assert_eq!(payload.entity_type(), EntityType::Section);
        assert_eq!(payload.id(), "s1");
    }

    #[test]
    fn decode_rejects_unknown_type() {
        assert!(matches!(
            QrPayload::decode(r#"{"type":"cow","id":"x"}"#),
            Err(TrueLoveError::Validation { .. })
        ));
        assert!(QrPayload::decode("{}").is_err());
    }
}
