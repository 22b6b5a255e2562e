//! # lovejournal-core
//!
//! Core types, traits, and abstractions for the Love Journal backend.
//!
//! This crate provides the data model shared by every other crate, the
//! repository and external-service traits that jobs and HTTP handlers are
//! written against, and the small amount of pure logic that sits between them
//! (image reference parsing and memory aggregation).

pub mod defaults;
pub mod environment;
pub mod error;
pub mod gallery;
pub mod image_ref;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use environment::{Collections, Environment};
pub use error::{Error, Result};
pub use gallery::{aggregate_memories, collect_all};
pub use image_ref::{belongs_to_user, public_id_from_reference, user_folder};
pub use models::*;
pub use traits::*;
