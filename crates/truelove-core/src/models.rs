//! Domain models for TrueLove.
//!
//! Groups own sections, sections own fields. Groups and sections can
//! each be bound to one printable QR code.

pub mod field;
pub mod group;
pub mod qr_code;
pub mod section;
