//! Photo staging and preview references
//!
//! A [`PhotoStagingArea`] holds at most one selected image together with a
//! [`PreviewHandle`] issued by a [`PreviewRegistry`]. Preview handles revoke
//! themselves on drop, so replacing, clearing, or dropping the staging area
//! releases the old reference exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use uuid::Uuid;
use wishwall_core::{PhotoFile, ValidationError};

use crate::config::ClientConfig;

/// Scheme prefix of preview URLs
const PREVIEW_URL_PREFIX: &str = "blob:wishwall/";

/// Issues and resolves preview references for staged photos
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    entries: DashMap<Uuid, Bytes>,
    issued: AtomicU64,
    revoked: AtomicU64,
}

impl PreviewRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Derive a preview reference for `file`
    pub fn acquire(self: &Arc<Self>, file: &PhotoFile) -> PreviewHandle {
        let id = Uuid::new_v4();
        self.entries.insert(id, file.bytes.clone());
        self.issued.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(%id, "preview acquired");

        PreviewHandle {
            id,
            url: format!("{PREVIEW_URL_PREFIX}{id}"),
            registry: Arc::clone(self),
        }
    }

    /// Bytes behind a live preview URL
    pub fn resolve(&self, url: &str) -> Option<Bytes> {
        let id = url.strip_prefix(PREVIEW_URL_PREFIX)?.parse::<Uuid>().ok()?;
        self.entries.get(&id).map(|bytes| bytes.clone())
    }

    /// Number of references acquired and not yet released
    pub fn live_count(&self) -> usize {
        self.entries.len()
    }

    pub fn issued_count(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn revoked_count(&self) -> u64 {
        self.revoked.load(Ordering::SeqCst)
    }

    fn release(&self, id: &Uuid) {
        if self.entries.remove(id).is_some() {
            self.revoked.fetch_add(1, Ordering::SeqCst);
            tracing::trace!(%id, "preview released");
        }
    }
}

/// A live preview reference; released when dropped
#[derive(Debug)]
pub struct PreviewHandle {
    id: Uuid,
    url: String,
    registry: Arc<PreviewRegistry>,
}

impl PreviewHandle {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry.release(&self.id);
    }
}

/// Check a candidate photo against the type and size limits
pub fn validate_photo(
    file: &PhotoFile,
    mime_prefix: &str,
    max_bytes: u64,
) -> Result<(), ValidationError> {
    if !file.mime_type.starts_with(mime_prefix) {
        return Err(ValidationError::NotAnImage {
            mime_type: file.mime_type.clone(),
        });
    }
    if file.size() > max_bytes {
        return Err(ValidationError::PhotoTooLarge {
            size: file.size(),
            max_bytes,
        });
    }
    Ok(())
}

#[derive(Debug)]
struct StagedPhoto {
    file: PhotoFile,
    preview: PreviewHandle,
}

/// Holds at most one selected photo and its preview
#[derive(Debug)]
pub struct PhotoStagingArea {
    registry: Arc<PreviewRegistry>,
    mime_prefix: String,
    max_bytes: u64,
    staged: Option<StagedPhoto>,
}

impl PhotoStagingArea {
    pub fn new(registry: Arc<PreviewRegistry>, config: &ClientConfig) -> Self {
        Self {
            registry,
            mime_prefix: config.accepted_mime_prefix.clone(),
            max_bytes: config.max_photo_bytes,
            staged: None,
        }
    }

    /// Stage `file`, replacing any current selection
    ///
    /// On rejection the current selection is cleared as well, so the
    /// preview never shows a file other than the last one chosen.
    pub fn stage(&mut self, file: PhotoFile) -> Result<&str, ValidationError> {
        if let Err(err) = validate_photo(&file, &self.mime_prefix, self.max_bytes) {
            tracing::debug!(name = %file.name, error = %err, "photo rejected");
            self.clear();
            return Err(err);
        }

        let preview = self.registry.acquire(&file);
        tracing::debug!(name = %file.name, size = file.size(), "photo staged");
        // Assigning drops the previous StagedPhoto and releases its preview
        let staged = self.staged.insert(StagedPhoto { file, preview });
        Ok(staged.preview.url())
    }

    /// Remove the staged photo, releasing its preview
    pub fn clear(&mut self) {
        if let Some(old) = self.staged.take() {
            tracing::debug!(name = %old.file.name, "staged photo cleared");
        }
    }

    pub fn file(&self) -> Option<&PhotoFile> {
        self.staged.as_ref().map(|s| &s.file)
    }

    pub fn preview_url(&self) -> Option<&str> {
        self.staged.as_ref().map(|s| s.preview.url())
    }

    pub fn is_staged(&self) -> bool {
        self.staged.is_some()
    }
}
