//! Core types and traits for the snip URL shortener.
//!
//! This crate provides the types shared by the storage backends, the
//! shortening service and the operator CLI.

pub mod error;
pub mod repository;
pub mod shortcode;
pub mod user;

pub use error::StorageError;
pub use repository::{ReadRepository, Repository, Stats, UrlRecord};
pub use shortcode::ShortCode;
pub use user::UserId;
