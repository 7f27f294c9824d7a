//! Field domain model.
//!
//! A field is one typed value inside a section. Its `options` bag is
//! stored as a flexible object whose keys follow the mobile client's
//! wire names (`modo`, `valor`, `baseFields`, `op`, …).
//!
//! Reading the bag never fails on a known key with an unexpected shape
//! or an unrecognised value: such keys are left untyped in
//! [`FieldOptions::extra`] and written back exactly as they were read.

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "fecha")]
    Date,
    #[serde(rename = "fecha_regresiva")]
    CountdownDate,
    #[serde(rename = "número", alias = "numero")]
    Number,
    #[serde(rename = "dinero")]
    Money,
    #[serde(rename = "texto")]
    Text,
    #[serde(rename = "voz")]
    Voice,
    #[serde(rename = "foto")]
    Photo,
    #[serde(rename = "video")]
    Video,
}

impl FieldType {
    /// Wire tag, as shown in exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Date => "fecha",
            FieldType::CountdownDate => "fecha_regresiva",
            FieldType::Number => "número",
            FieldType::Money => "dinero",
            FieldType::Text => "texto",
            FieldType::Voice => "voz",
            FieldType::Photo => "foto",
            FieldType::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fecha" => Some(FieldType::Date),
            "fecha_regresiva" => Some(FieldType::CountdownDate),
            "número" | "numero" => Some(FieldType::Number),
            "dinero" => Some(FieldType::Money),
            "texto" => Some(FieldType::Text),
            "voz" => Some(FieldType::Voice),
            "foto" => Some(FieldType::Photo),
            "video" => Some(FieldType::Video),
            _ => None,
        }
    }

    pub fn is_money(&self) -> bool {
        matches!(self, FieldType::Money)
    }
}

/// Value of `options.modo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldMode {
    /// Plain recorded value.
    Documentar,
    /// Operand of a sibling result field.
    Operar,
    /// Computed from two base fields.
    Resultado,
    /// Fixed date.
    Fija,
    /// Countdown date.
    Regresiva,
    /// Text with a reminder.
    Recordatorio,
}

impl FieldMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldMode::Documentar => "documentar",
            FieldMode::Operar => "operar",
            FieldMode::Resultado => "resultado",
            FieldMode::Fija => "fija",
            FieldMode::Regresiva => "regresiva",
            FieldMode::Recordatorio => "recordatorio",
        }
    }
}

/// Binary operation of a result field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Suma,
    Resta,
    Multiplicar,
    Dividir,
}

impl Operation {
    /// Division by zero yields `0`.
    pub fn apply(&self, v1: f64, v2: f64) -> f64 {
        match self {
            Operation::Suma => v1 + v2,
            Operation::Resta => v1 - v2,
            Operation::Multiplicar => v1 * v2,
            Operation::Dividir => {
                if v2 != 0.0 {
                    v1 / v2
                } else {
                    0.0
                }
            }
        }
    }

    /// Symbol used in generated result titles.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operation::Suma => "+",
            Operation::Resta => "−",
            Operation::Multiplicar => "×",
            Operation::Dividir => "÷",
        }
    }
}

/// Operation chosen in the editor for a field in `operar` mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub op: Operation,
    #[serde(rename = "targetFieldId")]
    pub target_field_id: String,
}

/// The `options` bag of a field.
///
/// Typed keys hold values this build understands. Every other key, and
/// any known key whose value could not be read, is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldOptions {
    pub modo: Option<FieldMode>,
    pub valor: Option<Value>,
    /// `baseFields`
    pub base_fields: Option<Vec<String>>,
    pub op: Option<Operation>,
    /// `operación`
    pub operation: Option<PendingOperation>,
    /// `audioUri`
    pub audio_uri: Option<String>,
    pub extra: Map<String, Value>,
}

const MODO: &str = "modo";
const VALOR: &str = "valor";
const BASE_FIELDS: &str = "baseFields";
const OP: &str = "op";
const OPERATION: &str = "operación";
const AUDIO_URI: &str = "audioUri";

/// Move `key` out of `raw` if it reads as a `T`. Otherwise it stays.
fn take_typed<T: DeserializeOwned>(raw: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = T::deserialize(raw.get(key)?).ok()?;
    raw.remove(key);
    Some(value)
}

impl<'de> Deserialize<'de> for FieldOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut raw = match Value::deserialize(deserializer)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(D::Error::custom(format!(
                    "field options must be an object, got {other}"
                )));
            }
        };

        let valor = match raw.remove(VALOR) {
            Some(Value::Null) | None => None,
            Some(value) => Some(value),
        };

        Ok(FieldOptions {
            modo: take_typed(&mut raw, MODO),
            valor,
            base_fields: take_typed(&mut raw, BASE_FIELDS),
            op: take_typed(&mut raw, OP),
            operation: take_typed(&mut raw, OPERATION),
            audio_uri: take_typed(&mut raw, AUDIO_URI),
            extra: raw,
        })
    }
}

impl Serialize for FieldOptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error as _;

        fn put<S: Serializer, T: Serialize>(
            map: &mut Map<String, Value>,
            key: &str,
            value: &Option<T>,
        ) -> Result<(), S::Error> {
            if let Some(value) = value {
                let value = serde_json::to_value(value).map_err(S::Error::custom)?;
                map.insert(key.to_string(), value);
            }
            Ok(())
        }

        // Typed values win over a stale raw copy of the same key.
        let mut map = self.extra.clone();
        put::<S, _>(&mut map, MODO, &self.modo)?;
        put::<S, _>(&mut map, VALOR, &self.valor)?;
        put::<S, _>(&mut map, BASE_FIELDS, &self.base_fields)?;
        put::<S, _>(&mut map, OP, &self.op)?;
        put::<S, _>(&mut map, OPERATION, &self.operation)?;
        put::<S, _>(&mut map, AUDIO_URI, &self.audio_uri)?;
        map.serialize(serializer)
    }
}

impl FieldOptions {
    /// Numeric reading of `valor`, treating a missing value as `0`.
    ///
    /// Strings are read by their leading numeric prefix (`"12kg"` is
    /// `12`); anything non-numeric, including non-finite values, is `0`.
    pub fn numeric_value(&self) -> f64 {
        match &self.valor {
            Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
            Some(Value::String(s)) => parse_leading_number(s),
            _ => 0.0,
        }
    }

    /// `valor` if it is stored as a JSON number.
    pub fn stored_number(&self) -> Option<f64> {
        self.valor.as_ref().and_then(Value::as_f64)
    }

    pub fn text_value(&self) -> Option<&str> {
        self.valor.as_ref().and_then(Value::as_str)
    }

    pub fn is_result(&self) -> bool {
        self.modo == Some(FieldMode::Resultado)
    }
}

fn parse_leading_number(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    while let Some(&b) = bytes.get(end) {
        match b {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return 0.0;
    }

    // Optional exponent, only if followed by at least one digit.
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while matches!(bytes.get(exp_end), Some(b'0'..=b'9')) {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }

    s[..end]
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub id: Uuid,
    pub section_id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub options: FieldOptions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Field {
    /// The two base field ids of a result field, if well-formed.
    ///
    /// Ids that are not UUIDs make the pair malformed.
    pub fn base_pair(&self) -> Option<(Uuid, Uuid)> {
        match self.options.base_fields.as_deref() {
            Some([a, b]) => Some((Uuid::parse_str(a).ok()?, Uuid::parse_str(b).ok()?)),
            _ => None,
        }
    }

    /// First base id, regardless of whether the pair is complete.
    pub fn first_base(&self) -> Option<Uuid> {
        self.options
            .base_fields
            .as_ref()
            .and_then(|ids| ids.first())
            .and_then(|id| Uuid::parse_str(id).ok())
    }

    pub fn is_countdown(&self) -> bool {
        self.field_type == FieldType::CountdownDate
            || (self.field_type == FieldType::Date
                && self.options.modo == Some(FieldMode::Regresiva))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateField {
    pub section_id: Uuid,
    pub title: String,
    pub field_type: FieldType,
    pub options: FieldOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateField {
    pub title: Option<String>,
    pub field_type: Option<FieldType>,
    pub options: Option<FieldOptions>,
}
