//! # Wishwall Core
//!
//! Core types, errors, and the remote store boundary for the Wishwall
//! wish feed.
//!
//! This crate provides the foundational abstractions that allow the same
//! submission and feed logic to run against the in-memory store (for tests
//! and the demo binary) and against any hosted backend exposing the
//! `wishes` collection and the `wish-photos` bucket.
//!
//! ## Key Traits
//!
//! - [`RemoteWishStore`]: list/insert wishes, upload photos, subscribe to changes
//! - [`Clock`]: Time abstraction for testability
//!
//! ## Key Types
//!
//! - [`Wish`]: A persisted guest message with optional photo
//! - [`NewWish`]: The insert payload produced by a validated draft
//! - [`WishChange`]: Insert/delete notification pushed by the store
//! - [`PhotoFile`]: A locally selected image, before upload

pub mod clock;
pub mod error;
pub mod memory_store;
pub mod model;
pub mod store;

// Re-export main types
pub use clock::*;
pub use error::*;
pub use memory_store::*;
pub use model::*;
pub use store::*;
