//! Data model shared by the adapter, repository and request contract.
//!
//! # Responsibility
//! - Define the canonical Note, Template and Settings shapes.
//! - Keep one serialized shape (camelCase fields) for every caller.
//!
//! # Invariants
//! - Persisted note patterns are lowercase.
//! - Templates have one shape; synthesized defaults differ only by
//!   `id: None` and `is_default: true`.

pub mod note;
pub mod settings;
pub mod template;
