//! In-memory wish store
//!
//! Provides a complete in-process implementation of [`RemoteWishStore`] for
//! tests and the demo binary, without a hosted backend.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wishwall_core::{InMemoryWishStore, RemoteWishStore};
//!
//! let store = InMemoryWishStore::new();
//! let mut changes = store.subscribe()?;
//!
//! let wish = store.insert_wish(new_wish).await?;
//! // every subscriber sees WishChange::Inserted(wish)
//!
//! store.delete_wish(&wish.id);
//! // every subscriber sees WishChange::Deleted { id }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use crate::error::{SubscriptionError, TransportError};
use crate::model::{NewWish, StorageKey, StoredObject, Wish, WishId};
use crate::store::{
    ChangeStream, PHOTO_BUCKET, RemoteWishStore, WISHES_COLLECTION, WishChange, broadcast_to_stream,
};

/// Default base URL used to build public photo URLs
pub const DEFAULT_STORAGE_BASE_URL: &str = "http://localhost:54321";

/// A photo held by the in-memory bucket
#[derive(Debug, Clone)]
pub struct StoredPhoto {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Failures scheduled for the next call of each operation
#[derive(Debug, Default)]
struct ScriptedFailures {
    list: Option<String>,
    insert: Option<String>,
    upload: Option<String>,
}

/// In-process store for the `wishes` collection and the photo bucket
pub struct InMemoryWishStore {
    /// Rows in insertion order
    wishes: RwLock<Vec<Wish>>,
    /// Photo bucket contents
    photos: DashMap<StorageKey, StoredPhoto>,
    /// Push channel for insert/delete notifications
    changes_tx: broadcast::Sender<WishChange>,
    base_url: String,
    bucket: String,
    quota_bytes: Option<u64>,
    used_bytes: AtomicU64,
    failures: Mutex<ScriptedFailures>,
    shut_down: AtomicBool,
}

impl Default for InMemoryWishStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWishStore {
    /// Create an empty store with default settings
    pub fn new() -> Self {
        Self::with_channel_capacity(1024)
    }

    /// Create an empty store with a specific push channel capacity
    pub fn with_channel_capacity(capacity: usize) -> Self {
        let (changes_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            wishes: RwLock::new(Vec::new()),
            photos: DashMap::new(),
            changes_tx,
            base_url: DEFAULT_STORAGE_BASE_URL.to_string(),
            bucket: PHOTO_BUCKET.to_string(),
            quota_bytes: None,
            used_bytes: AtomicU64::new(0),
            failures: Mutex::new(ScriptedFailures::default()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Set the base URL public photo URLs are built from
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the bucket name
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Limit the total bytes the bucket accepts
    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    /// Load rows without emitting notifications
    pub fn seed(&self, wishes: impl IntoIterator<Item = Wish>) {
        self.wishes.write().extend(wishes);
    }

    /// Remove a wish externally (moderation) and notify subscribers
    ///
    /// Returns `false` if no row had that id.
    pub fn delete_wish(&self, id: &WishId) -> bool {
        let removed = {
            let mut wishes = self.wishes.write();
            let before = wishes.len();
            wishes.retain(|w| &w.id != id);
            wishes.len() != before
        };

        if removed {
            tracing::debug!(%id, "wish deleted");
            let _ = self.changes_tx.send(WishChange::Deleted { id: id.clone() });
        }
        removed
    }

    /// Fetch a stored photo by key
    pub fn photo(&self, key: &StorageKey) -> Option<StoredPhoto> {
        self.photos.get(key).map(|p| p.clone())
    }

    /// Number of objects in the bucket
    pub fn photo_count(&self) -> usize {
        self.photos.len()
    }

    /// Number of rows in the collection
    pub fn wish_count(&self) -> usize {
        self.wishes.read().len()
    }

    /// Number of open push subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.changes_tx.receiver_count()
    }

    /// Make the next `list_wishes` call fail with `message`
    pub fn fail_next_list(&self, message: impl Into<String>) {
        self.failures.lock().list = Some(message.into());
    }

    /// Make the next `insert_wish` call fail with `message`
    pub fn fail_next_insert(&self, message: impl Into<String>) {
        self.failures.lock().insert = Some(message.into());
    }

    /// Make the next `upload_photo` call fail with `message`
    pub fn fail_next_upload(&self, message: impl Into<String>) {
        self.failures.lock().upload = Some(message.into());
    }

    /// Stop serving: every later call fails and no new subscriptions open
    pub fn shut_down(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    fn ensure_running(&self) -> Result<(), TransportError> {
        if self.shut_down.load(Ordering::SeqCst) {
            Err(TransportError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteWishStore for InMemoryWishStore {
    async fn list_wishes(&self) -> Result<Vec<Wish>, TransportError> {
        self.ensure_running()?;
        if let Some(message) = self.failures.lock().list.take() {
            return Err(TransportError::List(message));
        }

        let mut wishes = self.wishes.read().clone();
        // Stable: equal timestamps keep insertion order
        wishes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(wishes)
    }

    async fn insert_wish(&self, wish: NewWish) -> Result<Wish, TransportError> {
        self.ensure_running()?;
        if let Some(message) = self.failures.lock().insert.take() {
            return Err(TransportError::Insert(message));
        }
        for (column, value) in [("name", &wish.name), ("wish", &wish.wish)] {
            if value.trim().is_empty() {
                return Err(TransportError::Insert(format!(
                    "null value in column \"{column}\" of relation \"{WISHES_COLLECTION}\" violates not-null constraint"
                )));
            }
        }

        let wish = wish.into_wish(WishId::generate());
        self.wishes.write().push(wish.clone());
        tracing::debug!(id = %wish.id, "wish inserted");

        // No subscribers is not an error
        let _ = self.changes_tx.send(WishChange::Inserted(wish.clone()));
        Ok(wish)
    }

    async fn upload_photo(
        &self,
        key: &StorageKey,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, TransportError> {
        self.ensure_running()?;
        if let Some(message) = self.failures.lock().upload.take() {
            return Err(TransportError::Upload(message));
        }

        let size = bytes.len() as u64;
        if let Some(quota) = self.quota_bytes {
            let used = self.used_bytes.load(Ordering::SeqCst);
            if used + size > quota {
                return Err(TransportError::QuotaExceeded { used, quota });
            }
        }

        match self.photos.entry(key.clone()) {
            Entry::Occupied(_) => return Err(TransportError::Conflict(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(StoredPhoto {
                    bytes,
                    content_type: content_type.to_string(),
                });
            }
        }
        self.used_bytes.fetch_add(size, Ordering::SeqCst);
        tracing::debug!(%key, size, "photo uploaded");

        Ok(StoredObject {
            bucket: self.bucket.clone(),
            key: key.clone(),
            size,
            content_type: content_type.to_string(),
        })
    }

    fn public_url_for(&self, key: &StorageKey) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, key
        )
    }

    fn subscribe(&self) -> Result<ChangeStream, SubscriptionError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(SubscriptionError::Unavailable("store shut down".into()));
        }
        Ok(broadcast_to_stream(self.changes_tx.subscribe()))
    }
}
