//! Submission form against the in-memory store

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, Semaphore};
use wishwall_client::{
    ClientConfig, PreviewRegistry, SubmissionForm, SubmissionState, SubmitError, SubmitOutcome,
    WishFeed,
};
use wishwall_core::{
    ChangeStream, InMemoryWishStore, ManualClock, NewWish, PhotoFile, Relation, RemoteWishStore,
    StorageKey, StoredObject, SubscriptionError, TransportError, ValidationError, Wish,
};

fn start_time() -> DateTime<Utc> {
    "2026-01-25T10:00:00Z".parse().unwrap()
}

fn png(size: usize) -> PhotoFile {
    PhotoFile::new("me.PNG", "image/png", vec![7u8; size])
}

struct Harness {
    store: Arc<InMemoryWishStore>,
    previews: Arc<PreviewRegistry>,
    form: SubmissionForm,
}

fn harness() -> Harness {
    wishwall_logging::init_testing();
    let store = Arc::new(InMemoryWishStore::new());
    let previews = PreviewRegistry::new();
    let form = SubmissionForm::new(
        store.clone(),
        previews.clone(),
        Arc::new(ManualClock::new(start_time())),
        ClientConfig::default(),
    );
    form.open();
    Harness {
        store,
        previews,
        form,
    }
}

fn fill(form: &SubmissionForm) {
    form.set_name("Ada");
    form.set_relation("Friend");
    form.set_wish("Congrats!!");
}

/// Holds every insert until the test releases it
struct GatedStore {
    inner: Arc<InMemoryWishStore>,
    entered: Notify,
    gate: Semaphore,
    inserts: AtomicUsize,
}

impl GatedStore {
    fn new(inner: Arc<InMemoryWishStore>) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            gate: Semaphore::new(0),
            inserts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RemoteWishStore for GatedStore {
    async fn list_wishes(&self) -> Result<Vec<Wish>, TransportError> {
        self.inner.list_wishes().await
    }

    async fn insert_wish(&self, wish: NewWish) -> Result<Wish, TransportError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.gate
            .acquire()
            .await
            .map_err(|_| TransportError::Unavailable)?
            .forget();
        self.inner.insert_wish(wish).await
    }

    async fn upload_photo(
        &self,
        key: &StorageKey,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, TransportError> {
        self.inner.upload_photo(key, bytes, content_type).await
    }

    fn public_url_for(&self, key: &StorageKey) -> String {
        self.inner.public_url_for(key)
    }

    fn subscribe(&self) -> Result<ChangeStream, SubscriptionError> {
        self.inner.subscribe()
    }
}

#[tokio::test]
async fn test_submit_without_photo() {
    let h = harness();
    fill(&h.form);

    let outcome = tokio_test::assert_ok!(h.form.submit().await);
    let SubmitOutcome::Submitted(wish) = outcome else {
        panic!("expected a stored wish");
    };
    assert_eq!(wish.name, "Ada");
    assert_eq!(wish.relation, Relation::Friend);
    assert_eq!(wish.wish, "Congrats!!");
    assert_eq!(wish.photo_url, None);
    assert_eq!(wish.created_at, start_time());

    assert_eq!(h.store.wish_count(), 1);
    assert_eq!(h.store.photo_count(), 0);
    assert!(!h.form.is_open());
    assert_eq!(h.form.draft().wish, "");
    assert_eq!(h.form.state(), SubmissionState::Idle);
    assert_eq!(h.form.error(), None);
}

#[tokio::test]
async fn test_submit_with_photo_releases_preview() {
    let h = harness();
    fill(&h.form);
    let preview = h.form.stage_photo(png(1024)).unwrap().unwrap();
    assert!(h.previews.resolve(&preview).is_some());

    let SubmitOutcome::Submitted(wish) = h.form.submit().await.unwrap() else {
        panic!("expected a stored wish");
    };

    let url = wish.photo_url.expect("photo url");
    let prefix = "http://localhost:54321/storage/v1/object/public/wish-photos/public/";
    assert!(url.starts_with(prefix), "unexpected url {url}");
    assert!(url.ends_with(".png"));

    let key = StorageKey::new(&url[prefix.len() - "public/".len()..]);
    let stored = h.store.photo(&key).expect("photo stored");
    assert_eq!(stored.content_type, "image/png");
    assert_eq!(stored.bytes.len(), 1024);

    assert!(!h.form.has_photo());
    assert_eq!(h.previews.live_count(), 0);
    assert_eq!(h.previews.revoked_count(), 1);
    assert!(h.previews.resolve(&preview).is_none());
}

#[tokio::test]
async fn test_validation_failure_touches_nothing() {
    let h = harness();
    h.form.set_name("Ada");
    h.form.set_relation("Friend");
    h.form.set_wish("   ");

    let err = h.form.submit().await.unwrap_err();
    assert!(matches!(err, SubmitError::Validation(ValidationError::MissingWish)));
    assert_eq!(h.form.error().as_deref(), Some("Please write your wish."));
    assert_eq!(h.store.wish_count(), 0);
    assert!(h.form.is_open());
    assert!(!h.form.is_submitting());
}

#[tokio::test]
async fn test_unknown_relation_is_rejected() {
    let h = harness();
    fill(&h.form);
    h.form.set_relation("Neighbour");

    let err = h.form.submit().await.unwrap_err();
    assert_eq!(err.user_message(), "Please select your relation.");
}

#[tokio::test]
async fn test_oversized_photo_is_not_staged() {
    let h = harness();
    let limit = ClientConfig::default().max_photo_bytes as usize;

    assert!(h.form.stage_photo(png(limit)).unwrap().is_some());
    let err = h.form.stage_photo(png(limit + 1)).unwrap_err();

    assert!(matches!(err, ValidationError::PhotoTooLarge { .. }));
    assert_eq!(
        h.form.error().as_deref(),
        Some("Image is too large. Please upload below 2MB.")
    );
    assert!(!h.form.has_photo());
    assert_eq!(h.previews.live_count(), 0);
}

#[tokio::test]
async fn test_upload_failure_keeps_draft() {
    let h = harness();
    fill(&h.form);
    h.form.stage_photo(png(64)).unwrap();
    h.store.fail_next_upload("bucket offline");

    let err = h.form.submit().await.unwrap_err();
    assert!(matches!(err, SubmitError::Transport(TransportError::Upload(_))));
    assert_eq!(
        h.form.error().as_deref(),
        Some("Failed to upload photo: bucket offline")
    );

    // Nothing was inserted and the user can retry as-is
    assert_eq!(h.store.wish_count(), 0);
    assert_eq!(h.form.draft().name, "Ada");
    assert!(h.form.has_photo());
    assert_eq!(h.form.state(), SubmissionState::Idle);

    assert!(matches!(
        h.form.submit().await.unwrap(),
        SubmitOutcome::Submitted(_)
    ));
    assert_eq!(h.store.wish_count(), 1);
}

#[tokio::test]
async fn test_insert_failure_after_upload_orphans_photo() {
    let h = harness();
    fill(&h.form);
    h.form.stage_photo(png(64)).unwrap();
    h.store.fail_next_insert("row-level security");

    let err = tokio_test::assert_err!(h.form.submit().await);
    assert!(matches!(err, SubmitError::Transport(TransportError::Insert(_))));
    assert_eq!(h.store.photo_count(), 1);
    assert_eq!(h.store.wish_count(), 0);
    assert!(h.form.has_photo());
    assert_eq!(h.form.draft().wish, "Congrats!!");
    assert!(h.form.is_open());
}

#[tokio::test]
async fn test_double_submit_inserts_once() {
    wishwall_logging::init_testing();
    let memory = Arc::new(InMemoryWishStore::new());
    let gated = Arc::new(GatedStore::new(memory.clone()));
    let form = Arc::new(SubmissionForm::new(
        gated.clone(),
        PreviewRegistry::new(),
        Arc::new(ManualClock::new(start_time())),
        ClientConfig::default(),
    ));
    fill(&form);

    let first = tokio::spawn({
        let form = form.clone();
        async move { form.submit().await }
    });
    gated.entered.notified().await;

    assert!(form.is_submitting());
    assert_eq!(form.state(), SubmissionState::Inserting);
    assert_eq!(form.submit().await.unwrap(), SubmitOutcome::AlreadyInFlight);
    // Inputs are locked while in flight
    assert!(!form.set_wish("changed mid-flight"));
    assert!(!form.close());
    assert_eq!(form.draft().wish, "Congrats!!");

    gated.gate.add_permits(1);
    let outcome = first.await.unwrap().unwrap();
    let SubmitOutcome::Submitted(wish) = outcome else {
        panic!("expected a stored wish");
    };
    assert_eq!(wish.wish, "Congrats!!");

    assert_eq!(gated.inserts.load(Ordering::SeqCst), 1);
    assert_eq!(memory.wish_count(), 1);
    assert!(!form.is_submitting());
}

#[tokio::test]
async fn test_successful_submit_refreshes_feed() {
    let h = harness();
    let feed = WishFeed::new(h.store.clone());
    let form = SubmissionForm::new(
        h.store.clone(),
        h.previews.clone(),
        Arc::new(ManualClock::new(start_time())),
        ClientConfig::default(),
    )
    .with_feed(feed.clone());
    fill(&form);

    // No subscription: only the post-submit refresh can populate the feed
    let SubmitOutcome::Submitted(wish) = form.submit().await.unwrap() else {
        panic!("expected a stored wish");
    };
    assert!(feed.contains(&wish.id));
    assert_eq!(feed.len(), 1);
}

#[tokio::test]
async fn test_close_discards_draft_and_preview() {
    let h = harness();
    fill(&h.form);
    h.form.stage_photo(png(16)).unwrap();

    assert!(h.form.close());
    assert!(!h.form.is_open());
    assert_eq!(h.form.draft().name, "");
    assert_eq!(h.previews.live_count(), 0);
    assert_eq!(h.form.wish_len(), 0);
}

#[tokio::test]
async fn test_silent_store_failure_shows_generic_message() {
    let h = harness();
    fill(&h.form);
    h.store.fail_next_insert("");

    let err = h.form.submit().await.unwrap_err();
    assert!(matches!(err, SubmitError::Transport(TransportError::Insert(_))));
    assert_eq!(
        h.form.error().as_deref(),
        Some("Something went wrong. Please try again.")
    );
}

#[tokio::test]
async fn test_submit_after_close_sees_discarded_draft() {
    let h = harness();
    fill(&h.form);
    assert!(h.form.close());

    let err = h.form.submit().await.unwrap_err();
    assert!(matches!(err, SubmitError::Validation(ValidationError::MissingName)));
    assert_eq!(h.store.wish_count(), 0);
}
