//! Integration tests for Group, Section and Field repositories using
//! in-memory SurrealDB.

use serde_json::json;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use truelove_core::error::TrueLoveError;
use truelove_core::models::field::{
    CreateField, FieldMode, FieldOptions, FieldType, Operation, UpdateField,
};
use truelove_core::models::group::{CreateGroup, UpdateGroup};
use truelove_core::models::section::{CreateSection, UpdateSection};
use truelove_core::repository::{FieldRepository, GroupRepository, SectionRepository};
use truelove_db::repository::{
    SurrealFieldRepository, SurrealGroupRepository, SurrealSectionRepository,
};
use uuid::Uuid;

/// Helper: spin up in-memory DB, run migrations, create a group and a
/// section.
async fn setup() -> (Surreal<Db>, Uuid, Uuid) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    truelove_db::run_migrations(&db).await.unwrap();

    let group = SurrealGroupRepository::new(db.clone())
        .create(CreateGroup {
            parent_id: None,
            title: "Finca".into(),
            emoji: Some("🐄".into()),
        })
        .await
        .unwrap();

    let section = SurrealSectionRepository::new(db.clone())
        .create(CreateSection {
            group_id: group.id,
            title: "Vacas".into(),
        })
        .await
        .unwrap();

    (db, group.id, section.id)
}

fn number_options(valor: f64) -> FieldOptions {
    FieldOptions {
        modo: Some(FieldMode::Documentar),
        valor: Some(json!(valor)),
        ..Default::default()
    }
}

// -----------------------------------------------------------------------
// Groups
// -----------------------------------------------------------------------

#[tokio::test]
async fn create_update_and_list_groups() {
    let (db, root_id, _) = setup().await;
    let repo = SurrealGroupRepository::new(db);

    let child = repo
        .create(CreateGroup {
            parent_id: Some(root_id),
            title: "Lote 1".into(),
            emoji: None,
        })
        .await
        .unwrap();
    assert_eq!(child.parent_id, Some(root_id));

    let renamed = repo
        .update(
            child.id,
            UpdateGroup {
                title: Some("Lote A".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.title, "Lote A");
    assert_eq!(renamed.emoji, None);

    let top = repo.list_children(None).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].id, root_id);

    let children = repo.list_children(Some(root_id)).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].title, "Lote A");
}

#[tokio::test]
async fn deleted_group_is_not_found() {
    let (db, root_id, _) = setup().await;
    let repo = SurrealGroupRepository::new(db);

    repo.delete(root_id).await.unwrap();
    let err = repo.get_by_id(root_id).await.unwrap_err();
    assert!(matches!(err, TrueLoveError::NotFound { .. }));
}

// -----------------------------------------------------------------------
// Sections
// -----------------------------------------------------------------------

#[tokio::test]
async fn sections_are_listed_per_group_in_creation_order() {
    let (db, group_id, first_id) = setup().await;
    let repo = SurrealSectionRepository::new(db);

    let second = repo
        .create(CreateSection {
            group_id,
            title: "Terneros".into(),
        })
        .await
        .unwrap();
    repo.create(CreateSection {
        group_id: Uuid::new_v4(),
        title: "Otro grupo".into(),
    })
    .await
    .unwrap();

    let sections = repo.list_by_group(group_id).await.unwrap();
    let ids: Vec<Uuid> = sections.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![first_id, second.id]);

    let renamed = repo
        .update(
            second.id,
            UpdateSection {
                title: Some("Crías".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.title, "Crías");
    assert_eq!(renamed.group_id, group_id);
}

// -----------------------------------------------------------------------
// Fields
// -----------------------------------------------------------------------

#[tokio::test]
async fn field_options_round_trip_with_unknown_keys() {
    let (db, _, section_id) = setup().await;
    let repo = SurrealFieldRepository::new(db);

    let mut options = number_options(5.0);
    options.extra.insert("recordatorio".into(), json!(false));

    let field = repo
        .create(CreateField {
            section_id,
            title: "Peso".into(),
            field_type: FieldType::Number,
            options: options.clone(),
        })
        .await
        .unwrap();

    let fetched = repo.get_by_id(field.id).await.unwrap();
    assert_eq!(fetched.field_type, FieldType::Number);
    assert_eq!(fetched.options.stored_number(), Some(5.0));
    assert_eq!(fetched.options.extra.get("recordatorio"), Some(&json!(false)));
}

#[tokio::test]
async fn set_value_and_mode_patch_single_keys() {
    let (db, _, section_id) = setup().await;
    let repo = SurrealFieldRepository::new(db);

    let field = repo
        .create(CreateField {
            section_id,
            title: "Total".into(),
            field_type: FieldType::Money,
            options: FieldOptions {
                modo: Some(FieldMode::Resultado),
                base_fields: Some(vec!["a".into(), "b".into()]),
                op: Some(Operation::Suma),
                ..Default::default()
            },
        })
        .await
        .unwrap();

    repo.set_value(field.id, 12.5).await.unwrap();
    let fetched = repo.get_by_id(field.id).await.unwrap();
    assert_eq!(fetched.options.stored_number(), Some(12.5));
    assert_eq!(fetched.options.op, Some(Operation::Suma));
    assert_eq!(fetched.options.modo, Some(FieldMode::Resultado));

    repo.set_mode(field.id, FieldMode::Documentar).await.unwrap();
    let fetched = repo.get_by_id(field.id).await.unwrap();
    assert_eq!(fetched.options.modo, Some(FieldMode::Documentar));
    assert_eq!(fetched.options.stored_number(), Some(12.5));
}

#[tokio::test]
async fn set_value_on_missing_field_is_not_found() {
    let (db, _, _) = setup().await;
    let repo = SurrealFieldRepository::new(db);

    let err = repo.set_value(Uuid::new_v4(), 1.0).await.unwrap_err();
    assert!(matches!(err, TrueLoveError::NotFound { .. }));
}

#[tokio::test]
async fn client_written_options_are_read_leniently_and_kept() {
    let (db, _, section_id) = setup().await;
    let repo = SurrealFieldRepository::new(db.clone());

    let raw = json!({
        "modo": "archivado",
        "op": "potencia",
        "baseFields": "a,b",
        "valor": 4,
    });
    let id = Uuid::new_v4();
    db.query(
        "CREATE type::record('section_field', $id) SET \
         section_id = $section_id, title = 'Viejo', \
         field_type = 'número', options = $options",
    )
    .bind(("id", id.to_string()))
    .bind(("section_id", section_id.to_string()))
    .bind(("options", raw.clone()))
    .await
    .unwrap()
    .check()
    .unwrap();

    repo.create(CreateField {
        section_id,
        title: "Nuevo".into(),
        field_type: FieldType::Number,
        options: number_options(1.0),
    })
    .await
    .unwrap();

    let fields = repo.list_by_section(section_id).await.unwrap();
    assert_eq!(fields.len(), 2);
    let old = fields.iter().find(|f| f.id == id).unwrap();
    assert_eq!(old.options.modo, None);
    assert_eq!(old.options.op, None);
    assert_eq!(old.options.base_fields, None);

    // Writing the bag back does not rewrite the client's values.
    let updated = repo
        .update(
            id,
            UpdateField {
                title: Some("Renombrado".into()),
                options: Some(old.options.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(serde_json::to_value(&updated.options).unwrap(), raw);
}

#[tokio::test]
async fn update_list_and_delete_fields() {
    let (db, _, section_id) = setup().await;
    let repo = SurrealFieldRepository::new(db);

    let a = repo
        .create(CreateField {
            section_id,
            title: "A".into(),
            field_type: FieldType::Number,
            options: number_options(1.0),
        })
        .await
        .unwrap();
    let b = repo
        .create(CreateField {
            section_id,
            title: "B".into(),
            field_type: FieldType::Text,
            options: FieldOptions {
                valor: Some(json!("hola")),
                ..Default::default()
            },
        })
        .await
        .unwrap();

    let updated = repo
        .update(
            b.id,
            UpdateField {
                title: Some("Nota".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "Nota");
    assert_eq!(updated.options.text_value(), Some("hola"));

    let listed = repo.list_by_section(section_id).await.unwrap();
    let ids: Vec<Uuid> = listed.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![a.id, b.id]);

    repo.delete(a.id).await.unwrap();
    assert_eq!(repo.list_by_section(section_id).await.unwrap().len(), 1);

    repo.delete_by_section(section_id).await.unwrap();
    assert!(repo.list_by_section(section_id).await.unwrap().is_empty());
}
