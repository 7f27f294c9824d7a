//! Subcommand handlers.

use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use tokio::sync::mpsc;
use tracing::{info, warn};
use truelove_core::models::field::Field;
use truelove_core::models::group::CreateGroup;
use truelove_core::models::section::CreateSection;
use truelove_core::payload::{QrPayload, encode_payload};
use truelove_core::repository::FieldRepository;
use truelove_db::repository::{
    SurrealFieldRepository, SurrealGroupRepository, SurrealQrCodeRepository,
    SurrealSectionRepository,
};
use truelove_db::{DbManager, run_migrations};
use truelove_records::{Catalog, QrManager, RecordsConfig, ResultRecomputer};
use uuid::Uuid;

use crate::{Cli, Commands, GroupAction, QrAction, SectionAction};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    // Payload encoding is pure; no store needed.
    if let Commands::Qr {
        action:
            QrAction::Payload {
                entity_type,
                id,
                group_id,
            },
    } = &cli.command
    {
        println!("{}", encode_payload(entity_type, id, group_id.as_deref()));
        return Ok(());
    }

    let manager = DbManager::connect(&cli.db_config())
        .await
        .context("failed to connect to SurrealDB")?;
    let db = manager.client().clone();
    run_migrations(&db).await?;

    match cli.command {
        Commands::Migrate => print_json(&json!({ "migrated": true })),
        Commands::Group { action } => group(&db, action).await,
        Commands::Section { action } => section(&db, action).await,
        Commands::Qr { action } => qr(&db, action).await,
        Commands::Recompute { section } => {
            let fields = SurrealFieldRepository::new(db.clone());
            let snapshot = fields.list_by_section(section).await?;
            let report = ResultRecomputer::new(fields).recompute_all(&snapshot).await;
            print_json(&report)
        }
        Commands::Watch { section, interval } => watch(&db, section, interval).await,
        Commands::Export { group } => {
            let workbook = catalog(&db)
                .export_group(group, chrono::Utc::now())
                .await?;
            print_json(&workbook)
        }
    }
}

async fn group(db: &Surreal<Any>, action: GroupAction) -> anyhow::Result<()> {
    let catalog = catalog(db);
    match action {
        GroupAction::Create {
            title,
            emoji,
            parent,
        } => print_json(
            &catalog
                .create_group(CreateGroup {
                    parent_id: parent,
                    title,
                    emoji,
                })
                .await?,
        ),
        GroupAction::Delete { id } => {
            catalog.delete_group(id).await?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

async fn section(db: &Surreal<Any>, action: SectionAction) -> anyhow::Result<()> {
    let catalog = catalog(db);
    match action {
        SectionAction::Create { group, title } => print_json(
            &catalog
                .create_section(CreateSection {
                    group_id: group,
                    title,
                })
                .await?,
        ),
        SectionAction::Delete { id } => {
            catalog.delete_section(id).await?;
            print_json(&json!({ "deleted": id }))
        }
        SectionAction::Fields { id } => print_json(&catalog.section_fields(id).await?),
    }
}

async fn qr(db: &Surreal<Any>, action: QrAction) -> anyhow::Result<()> {
    let manager = QrManager::new(
        SurrealQrCodeRepository::new(db.clone()),
        RecordsConfig::default(),
    );

    match action {
        QrAction::Assign { entity_type, id } => print_json(&manager.assign(entity_type, id).await?),
        QrAction::Release { id } => print_json(&manager.release(id).await?),
        QrAction::Change {
            entity_type,
            id,
            token: Some(token),
        } => print_json(&manager.change_to(entity_type, id, token).await?),
        QrAction::Change {
            entity_type,
            id,
            token: None,
        } => print_json(&manager.change(entity_type, id).await?),
        QrAction::Free => print_json(&manager.available().await?),
        QrAction::Provision { count } => print_json(&manager.provision(count).await?),
        QrAction::Scan { text } => {
            let payload = QrPayload::decode(&text)?;
            let qr_code = match Uuid::parse_str(payload.id()) {
                Ok(id) => manager.current(id).await?,
                Err(_) => None,
            };
            print_json(&json!({ "payload": payload, "qr_code": qr_code }))
        }
        QrAction::Payload { .. } => Ok(()),
    }
}

/// Poll a section and recompute every snapshot until ctrl-c.
async fn watch(db: &Surreal<Any>, section: Uuid, interval: u64) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(1);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for ctrl-c, watching until killed");
            std::future::pending::<()>().await;
        }
    };
    let poller = tokio::spawn(poll_section(
        SurrealFieldRepository::new(db.clone()),
        section,
        Duration::from_secs(interval.max(1)),
        tx,
        shutdown,
    ));

    info!(%section, interval, "Watching section");
    let report = ResultRecomputer::new(SurrealFieldRepository::new(db.clone()))
        .run_on_snapshots(rx)
        .await;
    poller.await.context("snapshot poller panicked")?;

    print_json(&report)
}

/// Send a snapshot of the section every `period` until `shutdown`
/// resolves or the receiver is gone.
///
/// `shutdown` is polled across iterations, so a signal that arrives
/// while a snapshot is being loaded or sent is seen on the next turn.
async fn poll_section<F: FieldRepository>(
    fields: F,
    section: Uuid,
    period: Duration,
    tx: mpsc::Sender<Vec<Field>>,
    shutdown: impl Future<Output = ()>,
) {
    let mut ticker = tokio::time::interval(period);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!(%section, "Stopping watch");
                break;
            }
            _ = ticker.tick() => match fields.list_by_section(section).await {
                Ok(snapshot) => {
                    if tx.send(snapshot).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(%section, error = %e, "Failed to load section fields"),
            },
        }
    }
}

fn catalog(
    db: &Surreal<Any>,
) -> Catalog<
    SurrealGroupRepository<Any>,
    SurrealSectionRepository<Any>,
    SurrealFieldRepository<Any>,
    SurrealQrCodeRepository<Any>,
> {
    Catalog::new(
        SurrealGroupRepository::new(db.clone()),
        SurrealSectionRepository::new(db.clone()),
        SurrealFieldRepository::new(db.clone()),
        SurrealQrCodeRepository::new(db.clone()),
        RecordsConfig::default(),
    )
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
