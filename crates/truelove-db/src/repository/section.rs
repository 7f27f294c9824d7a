//! SurrealDB implementation of [`SectionRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use truelove_core::error::TrueLoveResult;
use truelove_core::models::section::{CreateSection, Section, UpdateSection};
use truelove_core::repository::SectionRepository;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct SectionRow {
    group_id: String,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct SectionRowWithId {
    record_id: String,
    group_id: String,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn row_to_section(row: SectionRow, id: Uuid) -> Result<Section, DbError> {
    Ok(Section {
        id,
        group_id: parse_uuid(&row.group_id, "group")?,
        title: row.title,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

impl SectionRowWithId {
    fn try_into_section(self) -> Result<Section, DbError> {
        Ok(Section {
            id: parse_uuid(&self.record_id, "section")?,
            group_id: parse_uuid(&self.group_id, "group")?,
            title: self.title,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Section repository.
#[derive(Clone)]
pub struct SurrealSectionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSectionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SectionRepository for SurrealSectionRepository<C> {
    async fn create(&self, input: CreateSection) -> TrueLoveResult<Section> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('section', $id) SET \
                 group_id = $group_id, title = $title",
            )
            .bind(("id", id_str.clone()))
            .bind(("group_id", input.group_id.to_string()))
            .bind(("title", input.title))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<SectionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "section".into(),
            id: id_str,
        })?;

        Ok(row_to_section(row, id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> TrueLoveResult<Section> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('section', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SectionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "section".into(),
            id: id_str,
        })?;

        Ok(row_to_section(row, id)?)
    }

    async fn update(&self, id: Uuid, input: UpdateSection) -> TrueLoveResult<Section> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.title.is_some() {
            sets.push("title = $title");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('section', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));
        if let Some(title) = input.title {
            builder = builder.bind(("title", title));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<SectionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "section".into(),
            id: id_str,
        })?;

        Ok(row_to_section(row, id)?)
    }

    async fn delete(&self, id: Uuid) -> TrueLoveResult<()> {
        self.db
            .query("DELETE type::record('section', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_by_group(&self, group_id: Uuid) -> TrueLoveResult<Vec<Section>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM section \
                 WHERE group_id = $group_id \
                 ORDER BY created_at ASC",
            )
            .bind(("group_id", group_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SectionRowWithId> = result.take(0).map_err(DbError::from)?;

        let sections = rows
            .into_iter()
            .map(SectionRowWithId::try_into_section)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(sections)
    }
}
