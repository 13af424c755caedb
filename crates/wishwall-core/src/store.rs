//! Remote wish store boundary
//!
//! The [`RemoteWishStore`] trait is the only way the client reaches durable
//! state. Any backend that can list, insert, and push changes for the
//! `wishes` collection and hold blobs in the `wish-photos` bucket satisfies
//! it.
//!
//! ## Implementations
//!
//! - [`InMemoryWishStore`](crate::InMemoryWishStore): in-process store for tests and demos

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{SubscriptionError, TransportError};
use crate::model::{NewWish, StorageKey, StoredObject, Wish, WishId};

/// Name of the remote collection holding wishes
pub const WISHES_COLLECTION: &str = "wishes";

/// Namespace of the blob store holding wish photos
pub const PHOTO_BUCKET: &str = "wish-photos";

/// A change notification pushed by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "record")]
pub enum WishChange {
    #[serde(rename = "INSERT")]
    Inserted(Wish),
    #[serde(rename = "DELETE")]
    Deleted { id: WishId },
}

impl WishChange {
    /// Identity of the affected wish
    pub fn id(&self) -> &WishId {
        match self {
            Self::Inserted(wish) => &wish.id,
            Self::Deleted { id } => id,
        }
    }
}

/// Stream of pushed changes
///
/// Ends when the store closes the channel. Dropping it releases the
/// underlying subscription.
pub type ChangeStream = Pin<Box<dyn Stream<Item = WishChange> + Send>>;

/// The authoritative remote collection and photo bucket
#[async_trait]
pub trait RemoteWishStore: Send + Sync {
    /// Fetch every wish, newest first
    async fn list_wishes(&self) -> Result<Vec<Wish>, TransportError>;

    /// Insert one wish and return the stored row
    async fn insert_wish(&self, wish: NewWish) -> Result<Wish, TransportError>;

    /// Store a photo under `key`
    ///
    /// Keys are never overwritten; uploading to an existing key fails.
    async fn upload_photo(
        &self,
        key: &StorageKey,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, TransportError>;

    /// Public, permanent URL of an uploaded object
    fn public_url_for(&self, key: &StorageKey) -> String;

    /// Open a push subscription for insert/delete notifications
    ///
    /// Delivery is best-effort and unordered relative to `list_wishes`.
    fn subscribe(&self) -> Result<ChangeStream, SubscriptionError>;
}

/// Convert a broadcast receiver into a change stream.
///
/// A lagging receiver skips the missed notifications and keeps going; the
/// next refresh repairs the gap.
pub fn broadcast_to_stream(mut rx: broadcast::Receiver<WishChange>) -> ChangeStream {
    Box::pin(async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(change) => yield change,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "change subscription lagged, notifications dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Relation;
    use futures::StreamExt;

    fn sample_wish(id: &str) -> Wish {
        Wish {
            id: WishId::new(id),
            name: "Ada".into(),
            relation: Relation::Friend,
            wish: "Congrats!!".into(),
            photo_url: None,
            created_at: "2026-01-25T10:00:00Z".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_to_stream() {
        let (tx, rx) = broadcast::channel(16);
        let stream = broadcast_to_stream(rx);

        tx.send(WishChange::Inserted(sample_wish("1"))).unwrap();
        tx.send(WishChange::Deleted { id: WishId::new("1") }).unwrap();
        drop(tx);

        let changes: Vec<WishChange> = stream.collect().await;
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].id().as_str(), "1");
        assert!(matches!(changes[1], WishChange::Deleted { .. }));
    }

    #[tokio::test]
    async fn test_lagged_stream_continues() {
        let (tx, rx) = broadcast::channel(1);
        let mut stream = broadcast_to_stream(rx);

        tx.send(WishChange::Deleted { id: WishId::new("a") }).unwrap();
        tx.send(WishChange::Deleted { id: WishId::new("b") }).unwrap();

        let next = stream.next().await.unwrap();
        assert_eq!(next.id().as_str(), "b");
    }

    #[test]
    fn test_change_wire_shape() {
        let change = WishChange::Deleted { id: WishId::new("7") };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["event"], "DELETE");
        assert_eq!(json["record"]["id"], "7");

        let back: WishChange = serde_json::from_value(json).unwrap();
        assert_eq!(back, change);
    }
}
