//! Metadata catalog layer.
//!
//! The catalog is the full metadata snapshot — every user record and
//! every file record — persisted as a single JSON document.
//! [`store::CatalogStore`] owns the load/save cycle and the write gate
//! that serializes mutations; [`model`] holds the record types.

pub mod model;
pub mod store;
