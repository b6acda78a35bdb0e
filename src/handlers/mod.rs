//! REST API handlers.
//!
//! Thin orchestration over [`crate::service::FileService`] and the
//! admin tooling; no storage logic lives here.

pub mod admin;
pub mod files;
