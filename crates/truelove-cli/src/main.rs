//! `truelove`: command-line access to the record store.
//!
//! Every command prints its result as JSON on stdout; logs go to
//! stderr as JSON lines, filtered by `RUST_LOG`.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use truelove_core::models::qr_code::EntityType;
use truelove_db::DbConfig;
use uuid::Uuid;

/// TrueLove records CLI.
#[derive(Parser, Debug)]
#[command(name = "truelove", about = "TrueLove records CLI")]
struct Cli {
    /// SurrealDB endpoint (`ws://host:port` or `mem://`).
    #[arg(long, env = "TRUELOVE_DB_URL", default_value = "ws://127.0.0.1:8000", global = true)]
    db_url: String,

    #[arg(long, env = "TRUELOVE_DB_NAMESPACE", default_value = "truelove", global = true)]
    db_namespace: String,

    #[arg(long, env = "TRUELOVE_DB_DATABASE", default_value = "main", global = true)]
    db_database: String,

    /// Root username. Sign-in is skipped without username and password.
    #[arg(long, env = "TRUELOVE_DB_USERNAME", global = true)]
    db_username: Option<String>,

    #[arg(long, env = "TRUELOVE_DB_PASSWORD", hide_env_values = true, global = true)]
    db_password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending schema migrations.
    Migrate,

    /// Groups and their labels.
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },

    /// Sections and their labels.
    Section {
        #[command(subcommand)]
        action: SectionAction,
    },

    /// QR label pool.
    Qr {
        #[command(subcommand)]
        action: QrAction,
    },

    /// Recompute the result fields of a section once.
    Recompute {
        #[arg(long)]
        section: Uuid,
    },

    /// Keep recomputing a section's result fields until interrupted.
    Watch {
        #[arg(long)]
        section: Uuid,
        /// Seconds between snapshots.
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },

    /// Export a group as one worksheet per section.
    Export {
        #[arg(long)]
        group: Uuid,
    },
}

#[derive(Subcommand, Debug)]
enum GroupAction {
    /// Create a group and bind a label to it.
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        emoji: Option<String>,
        /// Parent group, for sub-groups.
        #[arg(long)]
        parent: Option<Uuid>,
    },
    /// Delete a group with its sections and free their labels.
    Delete { id: Uuid },
}

#[derive(Subcommand, Debug)]
enum SectionAction {
    /// Create a section and bind a label to it.
    Create {
        #[arg(long)]
        group: Uuid,
        #[arg(long)]
        title: String,
    },
    /// Delete a section with its fields and free its label.
    Delete { id: Uuid },
    /// List a section's fields.
    Fields { id: Uuid },
}

#[derive(Subcommand, Debug)]
enum QrAction {
    /// Bind a label to a group or section.
    Assign {
        #[arg(long = "type")]
        entity_type: EntityType,
        #[arg(long)]
        id: Uuid,
    },
    /// Free the label bound to an entity.
    Release {
        #[arg(long)]
        id: Uuid,
    },
    /// Give an entity a different label.
    Change {
        #[arg(long = "type")]
        entity_type: EntityType,
        #[arg(long)]
        id: Uuid,
        /// Pick this free label instead of any.
        #[arg(long)]
        token: Option<Uuid>,
    },
    /// List free labels.
    Free,
    /// Pre-provision free labels.
    Provision {
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Print the payload printed on a label.
    Payload {
        #[arg(long = "type")]
        entity_type: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        group_id: Option<String>,
    },
    /// Decode scanned label text and show the entity's label.
    Scan { text: String },
}

impl Cli {
    fn db_config(&self) -> DbConfig {
        DbConfig {
            url: self.db_url.clone(),
            namespace: self.db_namespace.clone(),
            database: self.db_database.clone(),
            username: self.db_username.clone(),
            password: self.db_password.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("truelove=info,truelove_db=info,truelove_records=info")
        }))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    commands::run(cli).await
}
