//! Tangle Core Library
//!
//! This crate provides the shared value types for the tangle node: feed
//! identities, content-addressed blob references, graph-update messages and
//! the Ed25519 keypair a node identifies itself with.
//!
//! # Modules
//!
//! - [`types`]: Identity and reference types (FeedRef, BlobRef, ContactMessage)
//! - [`crypto`]: Keypair management and content hashing
//! - [`error`]: Error types

pub mod crypto;
pub mod error;
pub mod types;

pub use crypto::KeyPair;
pub use error::{Error, Result};
pub use types::*;
