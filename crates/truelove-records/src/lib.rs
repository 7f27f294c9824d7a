//! Services over the record store: the QR label pool, derived field
//! recompute, record lifecycle and group export.

pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod qr;
pub mod recompute;

pub use catalog::{Catalog, FieldCreation, Labeled, Operate};
pub use config::RecordsConfig;
pub use error::RecordsError;
pub use export::{Workbook, Worksheet};
pub use qr::QrManager;
pub use recompute::{RecomputeReport, ResultRecomputer};
