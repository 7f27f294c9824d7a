//! SurrealDB implementation of [`QrCodeRepository`].
//!
//! `claim` is a conditional update (`WHERE available = true`) so two
//! callers racing for the same free token cannot both bind it. The
//! unique index on `code` rejects a second token minted with a code
//! that already exists.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use truelove_core::error::TrueLoveResult;
use truelove_core::models::qr_code::{Assignment, CreateQrCode, EntityType, QrCode};
use truelove_core::repository::QrCodeRepository;
use uuid::Uuid;

use super::{CountRow, parse_uuid};
use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct QrCodeRow {
    code: String,
    available: bool,
    assigned_to: Option<String>,
    assigned_type: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct QrCodeRowWithId {
    record_id: String,
    code: String,
    available: bool,
    assigned_to: Option<String>,
    assigned_type: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_entity_type(s: Option<&str>) -> Result<Option<EntityType>, DbError> {
    match s {
        None => Ok(None),
        Some("group") => Ok(Some(EntityType::Group)),
        Some("section") => Ok(Some(EntityType::Section)),
        Some(other) => Err(DbError::Decode(format!("unknown entity type: {other}"))),
    }
}

impl QrCodeRow {
    fn into_qr_code(self, id: Uuid) -> Result<QrCode, DbError> {
        let assigned_to = self
            .assigned_to
            .as_deref()
            .map(|s| parse_uuid(s, "assignee"))
            .transpose()?;
        Ok(QrCode {
            id,
            code: self.code,
            available: self.available,
            assigned_to,
            assigned_type: parse_entity_type(self.assigned_type.as_deref())?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl QrCodeRowWithId {
    fn try_into_qr_code(self) -> Result<QrCode, DbError> {
        let id = parse_uuid(&self.record_id, "qr_code")?;
        QrCodeRow {
            code: self.code,
            available: self.available,
            assigned_to: self.assigned_to,
            assigned_type: self.assigned_type,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_qr_code(id)
    }
}

/// SurrealDB implementation of the QR code repository.
#[derive(Clone)]
pub struct SurrealQrCodeRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealQrCodeRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn select_one(
        &self,
        query: &str,
        binds: Vec<(&'static str, String)>,
    ) -> TrueLoveResult<Option<QrCode>> {
        let mut builder = self.db.query(query);
        for bind in binds {
            builder = builder.bind(bind);
        }
        let mut result = builder.await.map_err(DbError::from)?;

        let rows: Vec<QrCodeRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(QrCodeRowWithId::try_into_qr_code)
            .transpose()?)
    }
}

impl<C: Connection> QrCodeRepository for SurrealQrCodeRepository<C> {
    async fn create(&self, input: CreateQrCode) -> TrueLoveResult<QrCode> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let code = input.code;

        let (assigned_to, assigned_type) = match input.assignment {
            Some(a) => (
                Some(a.entity_id.to_string()),
                Some(a.entity_type.as_str().to_string()),
            ),
            None => (None, None),
        };

        let result = self
            .db
            .query(
                "CREATE type::record('qr_code', $id) SET \
                 code = $code, \
                 available = $available, \
                 assigned_to = $assigned_to, \
                 assigned_type = $assigned_type",
            )
            .bind(("id", id_str.clone()))
            .bind(("code", code.clone()))
            .bind(("available", assigned_to.is_none()))
            .bind(("assigned_to", assigned_to))
            .bind(("assigned_type", assigned_type))
            .await
            .map_err(|e| DbError::from_statement(e, "qr_code", &code))?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement(e, "qr_code", &code))?;

        let rows: Vec<QrCodeRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "qr_code".into(),
            id: id_str,
        })?;

        Ok(row.into_qr_code(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> TrueLoveResult<QrCode> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('qr_code', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<QrCodeRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "qr_code".into(),
            id: id_str,
        })?;

        Ok(row.into_qr_code(id)?)
    }

    async fn find_by_assignee(&self, entity_id: Uuid) -> TrueLoveResult<Option<QrCode>> {
        self.select_one(
            "SELECT meta::id(id) AS record_id, * FROM qr_code \
             WHERE assigned_to = $entity_id \
             ORDER BY code ASC LIMIT 1",
            vec![("entity_id", entity_id.to_string())],
        )
        .await
    }

    async fn find_available(&self) -> TrueLoveResult<Option<QrCode>> {
        self.select_one(
            "SELECT meta::id(id) AS record_id, * FROM qr_code \
             WHERE available = true \
             ORDER BY code ASC LIMIT 1",
            Vec::new(),
        )
        .await
    }

    async fn list_available(&self) -> TrueLoveResult<Vec<QrCode>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM qr_code \
                 WHERE available = true \
                 ORDER BY code ASC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<QrCodeRowWithId> = result.take(0).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(QrCodeRowWithId::try_into_qr_code)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(items)
    }

    async fn count(&self) -> TrueLoveResult<u64> {
        let mut result = self
            .db
            .query("SELECT count() AS total FROM qr_code GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    async fn claim(&self, id: Uuid, assignment: Assignment) -> TrueLoveResult<Option<QrCode>> {
        let result = self
            .db
            .query(
                "UPDATE type::record('qr_code', $id) SET \
                 available = false, \
                 assigned_to = $assigned_to, \
                 assigned_type = $assigned_type, \
                 updated_at = time::now() \
                 WHERE available = true",
            )
            .bind(("id", id.to_string()))
            .bind(("assigned_to", assignment.entity_id.to_string()))
            .bind(("assigned_type", assignment.entity_type.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<QrCodeRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.into_qr_code(id))
            .transpose()?)
    }

    async fn release(&self, id: Uuid) -> TrueLoveResult<QrCode> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('qr_code', $id) SET \
                 available = true, \
                 assigned_to = NONE, \
                 assigned_type = NONE, \
                 updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<QrCodeRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "qr_code".into(),
            id: id_str,
        })?;

        Ok(row.into_qr_code(id)?)
    }
}
