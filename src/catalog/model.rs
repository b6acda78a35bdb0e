//! Catalog record types.
//!
//! A [`Catalog`] is one aggregate: a set of users and an ordered
//! sequence of file records.  File records are keyed by the composite
//! `(id, owner_id)` — `id` alone is never a lookup key, so two owners
//! may independently hold the same id.

use serde::{Deserialize, Serialize};

/// A registered user. Immutable after seeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Username; doubles as the identity token scoping all operations.
    pub username: String,
    /// Password for the flat credential lookup.
    pub password: String,
    /// Human-readable display name.
    pub display_name: String,
}

/// Metadata record for one stored file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Opaque unique identifier, generated when absent on create.
    pub id: String,
    /// Owning user's username; every catalog query is scoped by this.
    pub owner_id: String,
    /// File name as uploaded (e.g. "sprite.png").
    pub name: String,
    /// MIME content type.
    pub mime_type: String,
    /// Size of the content in bytes.
    pub size_bytes: u64,
    /// Display name of whoever uploaded the file.
    pub uploader_name: String,
    /// Ref under which the blob store holds this record's bytes.
    pub content_ref: String,
    /// ISO-8601 creation timestamp. Preserved across updates.
    pub created_at: String,
    /// ISO-8601 last-modified timestamp.
    pub modified_at: String,
}

/// The full metadata snapshot: users plus file records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Registered users.
    #[serde(default)]
    pub users: Vec<User>,
    /// File records, in insertion order.
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

impl Catalog {
    /// Look up a user by username.
    pub fn find_user(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    /// Look up a file record by its composite key.
    pub fn find_file(&self, id: &str, owner_id: &str) -> Option<&FileRecord> {
        self.files
            .iter()
            .find(|f| f.id == id && f.owner_id == owner_id)
    }

    /// Iterate over the records owned by `owner_id`.
    pub fn files_owned_by<'a>(
        &'a self,
        owner_id: &'a str,
    ) -> impl Iterator<Item = &'a FileRecord> {
        self.files.iter().filter(move |f| f.owner_id == owner_id)
    }

    /// Insert or replace a record under its `(id, owner_id)` key,
    /// preserving the record's position on replace.
    pub fn upsert_file(&mut self, record: FileRecord) {
        match self
            .files
            .iter_mut()
            .find(|f| f.id == record.id && f.owner_id == record.owner_id)
        {
            Some(slot) => *slot = record,
            None => self.files.push(record),
        }
    }

    /// Remove the record under `(id, owner_id)`, returning it if present.
    pub fn remove_file(&mut self, id: &str, owner_id: &str) -> Option<FileRecord> {
        let pos = self
            .files
            .iter()
            .position(|f| f.id == id && f.owner_id == owner_id)?;
        Some(self.files.remove(pos))
    }
}
