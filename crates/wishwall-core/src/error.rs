//! Error types for Wishwall

use thiserror::Error;

/// Local, pre-flight failures. These never reach the network.
///
/// The display strings are the user-facing messages shown next to the form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter your name.")]
    MissingName,

    #[error("Please select your relation.")]
    MissingRelation,

    #[error("Please write your wish.")]
    MissingWish,

    #[error("Wish is too short. Please write a little more.")]
    WishTooShort { len: usize, min: usize },

    #[error("Wish is too long. Max {max} characters.")]
    WishTooLong { len: usize, max: usize },

    #[error("Please upload an image file (JPG/PNG).")]
    NotAnImage { mime_type: String },

    #[error("Image is too large. Please upload below {}MB.", .max_bytes / (1024 * 1024))]
    PhotoTooLarge { size: u64, max_bytes: u64 },
}

/// Failures talking to the remote store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Failed to load wishes: {0}")]
    List(String),

    #[error("Failed to upload photo: {0}")]
    Upload(String),

    #[error("Failed to save wish: {0}")]
    Insert(String),

    #[error("Object already exists: {0}")]
    Conflict(String),

    #[error("Storage quota exceeded ({used} of {quota} bytes used)")]
    QuotaExceeded { used: u64, quota: u64 },

    #[error("Store unavailable")]
    Unavailable,
}

impl TransportError {
    /// The store's own message, for variants that carry one
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::List(m) | Self::Upload(m) | Self::Insert(m) | Self::Conflict(m) => Some(m),
            Self::QuotaExceeded { .. } | Self::Unavailable => None,
        }
    }
}

/// Failures of the push channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("Change channel closed")]
    Closed,

    #[error("Change subscription unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_too_large_message_uses_megabytes() {
        let err = ValidationError::PhotoTooLarge {
            size: 3 * 1024 * 1024,
            max_bytes: 2 * 1024 * 1024,
        };
        assert_eq!(err.to_string(), "Image is too large. Please upload below 2MB.");
    }

    #[test]
    fn test_wish_too_long_message() {
        let err = ValidationError::WishTooLong { len: 301, max: 300 };
        assert_eq!(err.to_string(), "Wish is too long. Max 300 characters.");
    }

    #[test]
    fn test_transport_detail() {
        assert_eq!(TransportError::Insert("rls".into()).detail(), Some("rls"));
        assert_eq!(TransportError::Upload(String::new()).detail(), Some(""));
        assert_eq!(TransportError::Unavailable.detail(), None);
    }
}
