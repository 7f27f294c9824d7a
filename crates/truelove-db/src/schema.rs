//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as
//! strings. Enums are stored as strings with ASSERT constraints. The
//! field `options` bag is a FLEXIBLE object so the mobile client's
//! extra keys survive.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Groups (nestable through parent_id)
-- =======================================================================
DEFINE TABLE item_group SCHEMAFULL;
DEFINE FIELD parent_id ON TABLE item_group TYPE option<string>;
DEFINE FIELD title ON TABLE item_group TYPE string;
DEFINE FIELD emoji ON TABLE item_group TYPE option<string>;
DEFINE FIELD created_at ON TABLE item_group TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE item_group TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_group_parent ON TABLE item_group COLUMNS parent_id;

-- =======================================================================
-- Sections (scoped to group)
-- =======================================================================
DEFINE TABLE section SCHEMAFULL;
DEFINE FIELD group_id ON TABLE section TYPE string;
DEFINE FIELD title ON TABLE section TYPE string;
DEFINE FIELD created_at ON TABLE section TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE section TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_section_group ON TABLE section COLUMNS group_id;

-- =======================================================================
-- Fields (scoped to section)
-- =======================================================================
DEFINE TABLE section_field SCHEMAFULL;
DEFINE FIELD section_id ON TABLE section_field TYPE string;
DEFINE FIELD title ON TABLE section_field TYPE string;
DEFINE FIELD field_type ON TABLE section_field TYPE string \
    ASSERT $value IN ['fecha', 'fecha_regresiva', 'número', 'dinero', \
    'texto', 'voz', 'foto', 'video'];
DEFINE FIELD options ON TABLE section_field TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD created_at ON TABLE section_field TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE section_field TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_section_field_section ON TABLE section_field \
    COLUMNS section_id;

-- =======================================================================
-- QR code pool (tokens are never deleted)
-- =======================================================================
DEFINE TABLE qr_code SCHEMAFULL;
DEFINE FIELD code ON TABLE qr_code TYPE string;
DEFINE FIELD available ON TABLE qr_code TYPE bool DEFAULT true;
DEFINE FIELD assigned_to ON TABLE qr_code TYPE option<string>;
DEFINE FIELD assigned_type ON TABLE qr_code TYPE option<string> \
    ASSERT $value = NONE OR $value IN ['group', 'section'];
DEFINE FIELD created_at ON TABLE qr_code TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE qr_code TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_qr_code_code ON TABLE qr_code COLUMNS code UNIQUE;
DEFINE INDEX idx_qr_code_assigned_to ON TABLE qr_code COLUMNS assigned_to;
DEFINE INDEX idx_qr_code_available ON TABLE qr_code COLUMNS available;
";

/// Run all pending migrations against the given database.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
