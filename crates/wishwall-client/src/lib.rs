//! # Wishwall Client
//!
//! Wish submission and live feed for the Wishwall event page.
//!
//! ## Features
//!
//! - Photo staging with scoped preview references
//! - Single-flight submission: validate, upload photo, insert wish
//! - Live feed reconciling the initial fetch with pushed insert/delete events
//! - Carousel rendering and a countdown to the event
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wishwall_client::{ClientConfig, PreviewRegistry, SubmissionForm, WishFeed};
//! use wishwall_core::{InMemoryWishStore, SystemClock};
//!
//! let store = Arc::new(InMemoryWishStore::new());
//! let feed = WishFeed::new(store.clone());
//! let _subscription = feed.start().await?;
//!
//! let form = SubmissionForm::new(store, PreviewRegistry::new(), Arc::new(SystemClock), ClientConfig::default())
//!     .with_feed(feed.clone());
//! form.set_name("Ada");
//! form.set_relation("Friend");
//! form.set_wish("Congrats!!");
//! form.submit().await?;
//! ```

pub mod config;
pub mod countdown;
pub mod feed;
pub mod presentation;
pub mod staging;
pub mod submission;

// Re-exports
pub use config::{ClientConfig, ConfigError};
pub use countdown::{Countdown, CountdownState, CountdownTicker, TimeLeft};
pub use feed::{FeedEvent, FeedSnapshot, FeedState, FeedStatus, SubscriptionHandle, WishFeed};
pub use presentation::{Avatar, FeedView, PresentationPolicy, WishCard, render};
pub use staging::{PhotoStagingArea, PreviewHandle, PreviewRegistry, validate_photo};
pub use submission::{
    SubmissionForm, SubmissionState, SubmitError, SubmitOutcome, ValidDraft, WishDraft,
    photo_storage_key, validate_draft,
};
