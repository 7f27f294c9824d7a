//! Flatten a group into a spreadsheet-shaped [`Workbook`].
//!
//! Each section becomes one worksheet; every cell is a display string
//! already formatted the way the mobile client shows it (es-CO number
//! grouping, `d/m/yyyy` dates, countdown text). Turning the workbook
//! into xlsx bytes is left to the caller.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use truelove_core::error::TrueLoveResult;
use truelove_core::models::field::{Field, FieldType};
use truelove_core::repository::{FieldRepository, GroupRepository, SectionRepository};
use uuid::Uuid;

pub const HEADER: [&str; 4] = ["Título del Campo", "Tipo", "Valor", "Fecha de Creación"];

/// Sheet name used for a section without a title.
pub const DEFAULT_SHEET_NAME: &str = "Sección";

const SHEET_NAME_MAX_CHARS: usize = 30;
const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Workbook {
    pub sheets: Vec<Worksheet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Worksheet {
    pub name: String,
    /// Header row first, then one row per field.
    pub rows: Vec<Vec<String>>,
}

/// Build the workbook for a group as of `now`.
pub async fn export_group<G, S, F>(
    groups: &G,
    sections: &S,
    fields: &F,
    group_id: Uuid,
    now: DateTime<Utc>,
) -> TrueLoveResult<Workbook>
where
    G: GroupRepository,
    S: SectionRepository,
    F: FieldRepository,
{
    let group = groups.get_by_id(group_id).await?;

    let mut workbook = Workbook::default();
    for section in sections.list_by_group(group_id).await? {
        let section_fields = fields.list_by_section(section.id).await?;
        workbook
            .sheets
            .push(worksheet(&section.title, &section_fields, now));
    }

    info!(
        %group_id,
        title = %group.title,
        sheets = workbook.sheets.len(),
        "Group exported"
    );

    Ok(workbook)
}

pub fn worksheet(title: &str, fields: &[Field], now: DateTime<Utc>) -> Worksheet {
    let mut rows = Vec::with_capacity(fields.len() + 1);
    rows.push(HEADER.iter().map(|h| h.to_string()).collect());

    for field in fields {
        rows.push(vec![
            field.title.clone(),
            field.field_type.as_str().to_string(),
            format_field_value(field, now),
            field.created_at.format("%-d/%-m/%Y %H:%M:%S").to_string(),
        ]);
    }

    Worksheet {
        name: sheet_name(title),
        rows,
    }
}

fn sheet_name(title: &str) -> String {
    let name: String = title.chars().take(SHEET_NAME_MAX_CHARS).collect();
    if name.is_empty() {
        DEFAULT_SHEET_NAME.to_string()
    } else {
        name
    }
}

/// Display string for a field's value.
pub fn format_field_value(field: &Field, now: DateTime<Utc>) -> String {
    let options = &field.options;

    if field.is_countdown() {
        return parse_date(options.valor.as_ref())
            .map(|date| countdown_text(date, now))
            .unwrap_or_default();
    }

    match field.field_type {
        FieldType::Number => options.numeric_value().to_string(),
        FieldType::Money => format!("${}", format_es_co(options.numeric_value())),
        FieldType::Date => parse_date(options.valor.as_ref())
            .map(|date| date.format("%-d/%-m/%Y").to_string())
            .unwrap_or_default(),
        FieldType::Text => match &options.valor {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        },
        FieldType::Voice => {
            if options.audio_uri.as_deref().is_some_and(|uri| !uri.is_empty()) {
                "🎙️ Grabación guardada".to_string()
            } else {
                "🎤 Nota de voz".to_string()
            }
        }
        FieldType::CountdownDate | FieldType::Photo | FieldType::Video => String::new(),
    }
}

/// Whole days from `now` to `date`, rounded down, as countdown text.
pub fn countdown_text(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (date - now).num_milliseconds().div_euclid(MILLIS_PER_DAY);
    match days {
        d if d > 1 => format!("⏳ Faltan {d} días"),
        1 => "⏳ Falta 1 día".to_string(),
        0 => "📅 Hoy".to_string(),
        -1 => "✅ Pasó 1 día".to_string(),
        d => format!("✅ Pasaron {} días", d.abs()),
    }
}

/// RFC 3339 timestamps, or bare `yyyy-mm-dd` dates at midnight UTC.
fn parse_date(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let text = value?.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// es-CO grouping: `.` for thousands, `,` for decimals, at most three
/// decimals.
pub fn format_es_co(value: f64) -> String {
    let Some(decimal) = Decimal::from_f64(value) else {
        return value.to_string();
    };
    let text = decimal
        .round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string();

    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if frac_part.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped},{frac_part}")
    }
}
