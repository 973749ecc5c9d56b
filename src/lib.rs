//! Collection Envelope Library
//!
//! This library lays out collection-envelope labels for a sports club
//! roster, one card per member with a monthly payment grid, and renders
//! them to a printable PDF. It also provides roster CSV import/export and
//! an HTTP service around an editable roster session.

pub mod error;
pub mod helpers;
pub mod models;
pub mod service;

pub use error::EnvelopeError;
pub use service::{EnvelopeConfig, EnvelopeService, RosterSession};

// Re-export key types for convenience
pub use helpers::font::{FontSettings, Typeface, resolve_typeface};
pub use helpers::pdf::{PDF_MIME, compose, suggested_filename};
pub use models::layout::{LayoutGeometry, LayoutPreset};
pub use models::roster::{MemberRecord, RosterConfiguration};
