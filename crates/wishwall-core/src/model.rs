//! Wish records, insert payloads, and photo files

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Extension used for storage keys when the file name carries none.
pub const DEFAULT_PHOTO_EXTENSION: &str = "jpg";

/// Server-assigned identifier of a wish
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WishId(String);

impl WishId {
    /// Wrap an identifier issued by the store
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WishId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the submitter knows the hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    Friend,
    Cousin,
    Brother,
    Sister,
    Relative,
    Colleague,
    Neighbor,
    Other,
}

impl Relation {
    /// All relations, in the order they are offered to the submitter
    pub const ALL: [Relation; 8] = [
        Relation::Friend,
        Relation::Cousin,
        Relation::Brother,
        Relation::Sister,
        Relation::Relative,
        Relation::Colleague,
        Relation::Neighbor,
        Relation::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Friend => "Friend",
            Self::Cousin => "Cousin",
            Self::Brother => "Brother",
            Self::Sister => "Sister",
            Self::Relative => "Relative",
            Self::Colleague => "Colleague",
            Self::Neighbor => "Neighbor",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or(ValidationError::MissingRelation)
    }
}

/// A persisted guest message, immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wish {
    pub id: WishId,
    pub name: String,
    pub relation: Relation,
    pub wish: String,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for the `wishes` collection
///
/// Produced only from a validated draft; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWish {
    pub name: String,
    pub relation: Relation,
    pub wish: String,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewWish {
    /// Materialize the row once the store has assigned an id
    pub fn into_wish(self, id: WishId) -> Wish {
        Wish {
            id,
            name: self.name,
            relation: self.relation,
            wish: self.wish,
            photo_url: self.photo_url,
            created_at: self.created_at,
        }
    }
}

/// Key of an object in the photo bucket
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata of an uploaded photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: StorageKey,
    pub size: u64,
    pub content_type: String,
}

/// A locally selected file, not yet uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoFile {
    /// Original file name, used for the storage key extension
    pub name: String,
    /// Declared MIME type
    pub mime_type: String,
    pub bytes: Bytes,
}

impl PhotoFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lower-cased extension of the file name, `jpg` when there is none
    pub fn extension(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
            _ => DEFAULT_PHOTO_EXTENSION.to_string(),
        }
    }
}
