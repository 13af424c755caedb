//! Wish submission form
//!
//! The form validates a [`WishDraft`], uploads the staged photo (if any),
//! inserts the wish, and on success clears itself and asks the feed to
//! refresh. A single-flight guard makes overlapping submits no-ops.
//!
//! ```text
//! Idle -> Validating -> Uploading -> Inserting -> Idle
//!             |             |            |
//!             +-------------+------------+--> Idle (error, draft kept)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use wishwall_core::{
    Clock, NewWish, PhotoFile, Relation, RemoteWishStore, StorageKey, TransportError,
    ValidationError, Wish,
};

use crate::config::ClientConfig;
use crate::feed::WishFeed;
use crate::staging::{PhotoStagingArea, PreviewRegistry};

/// Shown when a transport failure carries no message of its own
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Where a submission currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    Validating,
    Uploading,
    Inserting,
}

/// Result of a submit attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The wish was stored
    Submitted(Wish),
    /// Another submission was already in flight; nothing happened
    AlreadyInFlight,
}

/// Why a submit attempt failed
#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SubmitError {
    /// The single message shown to the submitter
    ///
    /// A store failure without a message of its own falls back to
    /// [`GENERIC_FAILURE_MESSAGE`].
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(e) if e.detail().is_some_and(|d| d.trim().is_empty()) => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Working copy of the form fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WishDraft {
    pub name: String,
    /// Raw selection; empty until the submitter picks one
    pub relation: String,
    pub wish: String,
}

/// A draft that passed validation, trimmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDraft {
    pub name: String,
    pub relation: Relation,
    pub wish: String,
}

/// Validate a draft; the first failing rule wins
///
/// Order: name, relation, wish present, wish minimum, wish maximum.
/// Lengths count characters of the trimmed text.
pub fn validate_draft(
    draft: &WishDraft,
    min_chars: usize,
    max_chars: usize,
) -> Result<ValidDraft, ValidationError> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingName);
    }

    let relation: Relation = draft.relation.parse()?;

    let wish = draft.wish.trim();
    if wish.is_empty() {
        return Err(ValidationError::MissingWish);
    }
    let len = wish.chars().count();
    if len < min_chars {
        return Err(ValidationError::WishTooShort { len, min: min_chars });
    }
    if len > max_chars {
        return Err(ValidationError::WishTooLong { len, max: max_chars });
    }

    Ok(ValidDraft {
        name: name.to_string(),
        relation,
        wish: wish.to_string(),
    })
}

/// Build a collision-resistant storage key for an uploaded photo
///
/// `<prefix>/<unix millis>-<random hex>.<ext>`, keeping the file's
/// extension.
pub fn photo_storage_key(prefix: &str, file: &PhotoFile, now: DateTime<Utc>) -> StorageKey {
    let suffix = hex::encode(rand::random::<[u8; 6]>());
    let file_name = format!("{}-{}.{}", now.timestamp_millis(), suffix, file.extension());
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        StorageKey::new(file_name)
    } else {
        StorageKey::new(format!("{prefix}/{file_name}"))
    }
}

struct FormInner {
    draft: WishDraft,
    staging: PhotoStagingArea,
    state: SubmissionState,
    error: Option<String>,
    open: bool,
}

/// The wish composition surface
pub struct SubmissionForm {
    store: Arc<dyn RemoteWishStore>,
    clock: Arc<dyn Clock>,
    config: ClientConfig,
    feed: Option<WishFeed>,
    inner: Mutex<FormInner>,
    in_flight: AtomicBool,
}

/// Holds the single-flight flag; restores `Idle` on every exit path
struct InFlight<'a> {
    form: &'a SubmissionForm,
}

impl<'a> InFlight<'a> {
    fn try_acquire(form: &'a SubmissionForm) -> Option<Self> {
        form.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { form })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.form.inner.lock().state = SubmissionState::Idle;
        self.form.in_flight.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for SubmissionForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionForm")
            .field("state", &self.state())
            .field("in_flight", &self.is_submitting())
            .finish_non_exhaustive()
    }
}

impl SubmissionForm {
    pub fn new(
        store: Arc<dyn RemoteWishStore>,
        previews: Arc<PreviewRegistry>,
        clock: Arc<dyn Clock>,
        config: ClientConfig,
    ) -> Self {
        let staging = PhotoStagingArea::new(previews, &config);
        Self {
            store,
            clock,
            config,
            feed: None,
            inner: Mutex::new(FormInner {
                draft: WishDraft::default(),
                staging,
                state: SubmissionState::Idle,
                error: None,
                open: false,
            }),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Refresh `feed` after every successful submission
    pub fn with_feed(mut self, feed: WishFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Show the form, clearing any stale error
    pub fn open(&self) {
        let mut inner = self.inner.lock();
        inner.open = true;
        inner.error = None;
    }

    /// Close the form and discard the draft
    ///
    /// Refused (returns `false`) while a submission is in flight.
    pub fn close(&self) -> bool {
        let mut inner = self.inner.lock();
        if self.is_submitting() {
            return false;
        }
        inner.open = false;
        inner.error = None;
        inner.draft = WishDraft::default();
        inner.staging.clear();
        true
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    pub fn set_name(&self, name: impl Into<String>) -> bool {
        self.edit(|draft| draft.name = name.into())
    }

    pub fn set_relation(&self, relation: impl Into<String>) -> bool {
        self.edit(|draft| draft.relation = relation.into())
    }

    pub fn set_wish(&self, wish: impl Into<String>) -> bool {
        self.edit(|draft| draft.wish = wish.into())
    }

    // Inputs are disabled while submitting
    fn edit(&self, f: impl FnOnce(&mut WishDraft)) -> bool {
        let mut inner = self.inner.lock();
        if self.is_submitting() {
            return false;
        }
        f(&mut inner.draft);
        true
    }

    /// Stage a photo; returns its preview URL
    ///
    /// `Ok(None)` means the change was ignored because a submission is in
    /// flight.
    pub fn stage_photo(&self, file: PhotoFile) -> Result<Option<String>, ValidationError> {
        let mut inner = self.inner.lock();
        if self.is_submitting() {
            tracing::debug!(name = %file.name, "photo change ignored while submitting");
            return Ok(None);
        }
        inner.error = None;
        match inner.staging.stage(file) {
            Ok(url) => Ok(Some(url.to_string())),
            Err(e) => {
                inner.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn clear_photo(&self) {
        self.inner.lock().staging.clear();
    }

    pub fn draft(&self) -> WishDraft {
        self.inner.lock().draft.clone()
    }

    pub fn preview_url(&self) -> Option<String> {
        self.inner.lock().staging.preview_url().map(str::to_string)
    }

    pub fn has_photo(&self) -> bool {
        self.inner.lock().staging.is_staged()
    }

    /// Message of the last failed attempt
    pub fn error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    pub fn state(&self) -> SubmissionState {
        self.inner.lock().state
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Characters in the trimmed wish, for the `n/300` counter
    pub fn wish_len(&self) -> usize {
        self.inner.lock().draft.wish.trim().chars().count()
    }

    pub fn max_wish_len(&self) -> usize {
        self.config.wish_max_chars
    }

    // The flag only changes under the form lock, so close and edits never
    // interleave with a submit that has claimed it
    fn claim(&self) -> Option<InFlight<'_>> {
        let _inner = self.inner.lock();
        InFlight::try_acquire(self)
    }

    fn set_state(&self, state: SubmissionState) {
        self.inner.lock().state = state;
    }

    fn fail(&self, err: SubmitError) -> SubmitError {
        let message = err.user_message();
        tracing::warn!(error = %message, "wish submission failed");
        self.inner.lock().error = Some(message);
        err
    }

    /// Validate, upload, insert
    ///
    /// Returns [`SubmitOutcome::AlreadyInFlight`] without side effects if a
    /// submission is running. On failure the draft and staged photo are
    /// kept for a retry.
    pub async fn submit(&self) -> Result<SubmitOutcome, SubmitError> {
        let Some(_guard) = self.claim() else {
            tracing::debug!("submit ignored, already in flight");
            return Ok(SubmitOutcome::AlreadyInFlight);
        };

        let (valid, photo) = {
            let mut inner = self.inner.lock();
            inner.error = None;
            inner.state = SubmissionState::Validating;
            let valid = match validate_draft(
                &inner.draft,
                self.config.wish_min_chars,
                self.config.wish_max_chars,
            ) {
                Ok(valid) => valid,
                Err(e) => {
                    inner.error = Some(e.to_string());
                    return Err(e.into());
                }
            };
            (valid, inner.staging.file().cloned())
        };

        let photo_url = match photo {
            Some(file) => {
                self.set_state(SubmissionState::Uploading);
                match self.upload(&file).await {
                    Ok(url) => Some(url),
                    Err(e) => return Err(self.fail(e.into())),
                }
            }
            None => None,
        };

        self.set_state(SubmissionState::Inserting);
        let new_wish = NewWish {
            name: valid.name,
            relation: valid.relation,
            wish: valid.wish,
            photo_url,
            created_at: self.clock.now_utc(),
        };
        let orphan = new_wish.photo_url.clone();

        let wish = match self.store.insert_wish(new_wish).await {
            Ok(wish) => wish,
            Err(e) => {
                if let Some(url) = orphan {
                    tracing::warn!(%url, "insert failed after upload, photo left orphaned");
                }
                return Err(self.fail(e.into()));
            }
        };
        tracing::info!(id = %wish.id, relation = %wish.relation, "wish submitted");

        {
            let mut inner = self.inner.lock();
            inner.draft = WishDraft::default();
            inner.staging.clear();
            inner.open = false;
        }

        if let Some(feed) = &self.feed
            && let Err(e) = feed.refresh().await
        {
            tracing::warn!(error = %e, "feed refresh after submit failed");
        }

        Ok(SubmitOutcome::Submitted(wish))
    }

    async fn upload(&self, file: &PhotoFile) -> Result<String, TransportError> {
        let key = photo_storage_key(&self.config.photo_key_prefix, file, self.clock.now_utc());
        let stored = self
            .store
            .upload_photo(&key, file.bytes.clone(), &file.mime_type)
            .await?;
        tracing::debug!(key = %stored.key, size = stored.size, "photo uploaded");
        Ok(self.store.public_url_for(&stored.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, relation: &str, wish: &str) -> WishDraft {
        WishDraft {
            name: name.into(),
            relation: relation.into(),
            wish: wish.into(),
        }
    }

    fn check(wish: &str) -> Result<ValidDraft, ValidationError> {
        validate_draft(&draft("Ada", "Friend", wish), 5, 300)
    }

    #[test]
    fn test_wish_length_boundaries() {
        assert!(matches!(check("abcd"), Err(ValidationError::WishTooShort { len: 4, .. })));
        assert!(check("abcde").is_ok());
        assert!(check(&"x".repeat(300)).is_ok());
        assert!(matches!(
            check(&"x".repeat(301)),
            Err(ValidationError::WishTooLong { len: 301, .. })
        ));
    }

    #[test]
    fn test_length_is_measured_after_trim() {
        assert!(check("   abcd   ").is_err());
        let valid = check(&format!("  {}  ", "y".repeat(300))).unwrap();
        assert_eq!(valid.wish.len(), 300);
    }

    #[test]
    fn test_length_counts_characters() {
        assert!(check("ééééé").is_ok());
        assert!(check(&"é".repeat(300)).is_ok());
    }

    #[test]
    fn test_first_failure_wins() {
        assert_eq!(
            validate_draft(&draft(" ", "", ""), 5, 300),
            Err(ValidationError::MissingName)
        );
        assert_eq!(
            validate_draft(&draft("Ada", "", "no"), 5, 300),
            Err(ValidationError::MissingRelation)
        );
        assert_eq!(
            validate_draft(&draft("Ada", "Stranger", ""), 5, 300),
            Err(ValidationError::MissingRelation)
        );
        assert_eq!(
            validate_draft(&draft("Ada", "Sister", "   "), 5, 300),
            Err(ValidationError::MissingWish)
        );
    }

    #[test]
    fn test_valid_draft_is_trimmed() {
        let valid = validate_draft(&draft("  Ada ", "Friend", " Congrats!! "), 5, 300).unwrap();
        assert_eq!(valid.name, "Ada");
        assert_eq!(valid.relation, Relation::Friend);
        assert_eq!(valid.wish, "Congrats!!");
    }

    #[test]
    fn test_storage_key_shape() {
        let now: DateTime<Utc> = "2026-01-25T10:00:00Z".parse().unwrap();
        let file = PhotoFile::new("Us.PNG", "image/png", vec![1u8]);
        let key = photo_storage_key("public", &file, now);

        let expected_prefix = format!("public/{}-", now.timestamp_millis());
        assert!(key.as_str().starts_with(&expected_prefix));
        assert!(key.as_str().ends_with(".png"));

        let suffix = &key.as_str()[expected_prefix.len()..key.as_str().len() - 4];
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_storage_key_defaults_extension_and_differs() {
        let now: DateTime<Utc> = "2026-01-25T10:00:00Z".parse().unwrap();
        let file = PhotoFile::new("portrait", "image/jpeg", vec![1u8]);
        let a = photo_storage_key("public/", &file, now);
        let b = photo_storage_key("public/", &file, now);

        assert!(a.as_str().ends_with(".jpg"));
        assert!(!a.as_str().contains("//"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_user_message_falls_back_when_store_is_silent() {
        let silent = SubmitError::Transport(TransportError::Insert("  ".into()));
        assert_eq!(silent.user_message(), GENERIC_FAILURE_MESSAGE);

        let loud = SubmitError::Transport(TransportError::Upload("bucket offline".into()));
        assert_eq!(loud.user_message(), "Failed to upload photo: bucket offline");

        let invalid = SubmitError::Validation(ValidationError::MissingName);
        assert_eq!(invalid.user_message(), "Please enter your name.");
    }
}
