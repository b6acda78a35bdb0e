//! Blob storage layer.
//!
//! The [`store::BlobStore`] trait abstracts over where raw file bytes
//! physically live; [`local::LocalBlobStore`] keeps them on the local
//! filesystem. Blobs are addressed by opaque content refs and stored
//! independently of the metadata catalog — their presence on disk is the
//! ground truth catalog entries are audited against.

pub mod local;
pub mod store;
