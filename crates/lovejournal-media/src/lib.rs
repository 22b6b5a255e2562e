//! # lovejournal-media
//!
//! Clients for the external services the backend depends on:
//! - [`CloudinaryClient`]: image hosting (delete, list by folder prefix)
//! - [`HttpIdentityProvider`]: bearer token verification and account deletion
//!
//! Both implement the traits from `lovejournal-core`, so jobs and handlers
//! never depend on this crate directly.

pub mod cloudinary;
pub mod identity;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use cloudinary::{sign_params, CloudinaryClient, CloudinaryConfig};
pub use identity::{HttpIdentityProvider, IdentityConfig};
