//! SurrealDB implementation of [`FieldRepository`].
//!
//! The `options` bag is stored as a flexible object and decoded into
//! [`FieldOptions`] on read. Value and mode writes patch a single key so
//! the rest of the bag is left as the client wrote it.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use truelove_core::error::TrueLoveResult;
use truelove_core::models::field::{
    CreateField, Field, FieldMode, FieldOptions, FieldType, UpdateField,
};
use truelove_core::repository::FieldRepository;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct FieldRow {
    section_id: String,
    title: String,
    field_type: String,
    options: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct FieldRowWithId {
    record_id: String,
    section_id: String,
    title: String,
    field_type: String,
    options: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn decode_options(value: serde_json::Value) -> Result<FieldOptions, DbError> {
    serde_json::from_value(value).map_err(|e| DbError::Decode(format!("invalid field options: {e}")))
}

fn encode_options(options: &FieldOptions) -> Result<serde_json::Value, DbError> {
    serde_json::to_value(options).map_err(|e| DbError::Decode(format!("invalid field options: {e}")))
}

fn parse_field_type(s: &str) -> Result<FieldType, DbError> {
    FieldType::parse(s).ok_or_else(|| DbError::Decode(format!("unknown field type: {s}")))
}

impl FieldRow {
    fn into_field(self, id: Uuid) -> Result<Field, DbError> {
        Ok(Field {
            id,
            section_id: parse_uuid(&self.section_id, "section")?,
            title: self.title,
            field_type: parse_field_type(&self.field_type)?,
            options: decode_options(self.options)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl FieldRowWithId {
    fn try_into_field(self) -> Result<Field, DbError> {
        let id = parse_uuid(&self.record_id, "field")?;
        FieldRow {
            section_id: self.section_id,
            title: self.title,
            field_type: self.field_type,
            options: self.options,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_field(id)
    }
}

/// SurrealDB implementation of the Field repository.
#[derive(Clone)]
pub struct SurrealFieldRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealFieldRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Patch one key of `options`, failing with `NotFound` if the
    /// field does not exist.
    async fn patch_option(
        &self,
        id: Uuid,
        key: &'static str,
        value: serde_json::Value,
    ) -> TrueLoveResult<()> {
        let id_str = id.to_string();
        let query = format!(
            "UPDATE type::record('section_field', $id) SET \
             options.{key} = $value, updated_at = time::now()"
        );

        let result = self
            .db
            .query(&query)
            .bind(("id", id_str.clone()))
            .bind(("value", value))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<FieldRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "field".into(),
                id: id_str,
            }
            .into());
        }

        Ok(())
    }
}

impl<C: Connection> FieldRepository for SurrealFieldRepository<C> {
    async fn create(&self, input: CreateField) -> TrueLoveResult<Field> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let options = encode_options(&input.options)?;

        let result = self
            .db
            .query(
                "CREATE type::record('section_field', $id) SET \
                 section_id = $section_id, \
                 title = $title, \
                 field_type = $field_type, \
                 options = $options",
            )
            .bind(("id", id_str.clone()))
            .bind(("section_id", input.section_id.to_string()))
            .bind(("title", input.title))
            .bind(("field_type", input.field_type.as_str().to_string()))
            .bind(("options", options))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<FieldRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "field".into(),
            id: id_str,
        })?;

        Ok(row.into_field(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> TrueLoveResult<Field> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('section_field', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<FieldRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "field".into(),
            id: id_str,
        })?;

        Ok(row.into_field(id)?)
    }

    async fn update(&self, id: Uuid, input: UpdateField) -> TrueLoveResult<Field> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.title.is_some() {
            sets.push("title = $title");
        }
        if input.field_type.is_some() {
            sets.push("field_type = $field_type");
        }
        if input.options.is_some() {
            sets.push("options = $options");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('section_field', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(title) = input.title {
            builder = builder.bind(("title", title));
        }
        if let Some(field_type) = input.field_type {
            builder = builder.bind(("field_type", field_type.as_str().to_string()));
        }
        if let Some(ref options) = input.options {
            builder = builder.bind(("options", encode_options(options)?));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<FieldRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "field".into(),
            id: id_str,
        })?;

        Ok(row.into_field(id)?)
    }

    async fn delete(&self, id: Uuid) -> TrueLoveResult<()> {
        self.db
            .query("DELETE type::record('section_field', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_by_section(&self, section_id: Uuid) -> TrueLoveResult<Vec<Field>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM section_field \
                 WHERE section_id = $section_id \
                 ORDER BY created_at ASC",
            )
            .bind(("section_id", section_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<FieldRowWithId> = result.take(0).map_err(DbError::from)?;

        let fields = rows
            .into_iter()
            .map(FieldRowWithId::try_into_field)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(fields)
    }

    async fn delete_by_section(&self, section_id: Uuid) -> TrueLoveResult<()> {
        self.db
            .query("DELETE section_field WHERE section_id = $section_id")
            .bind(("section_id", section_id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }

    async fn set_value(&self, id: Uuid, value: f64) -> TrueLoveResult<()> {
        self.patch_option(id, "valor", serde_json::json!(value)).await
    }

    async fn set_mode(&self, id: Uuid, mode: FieldMode) -> TrueLoveResult<()> {
        self.patch_option(id, "modo", serde_json::json!(mode.as_str()))
            .await
    }
}
