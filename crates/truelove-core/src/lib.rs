//! TrueLove Core: domain models, QR payload codec, error taxonomy and
//! repository traits shared by the store and service crates.

pub mod error;
pub mod models;
pub mod payload;
pub mod repository;
