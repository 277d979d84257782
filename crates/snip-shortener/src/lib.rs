//! URL shortening service.
//!
//! [`ShortenerService`] ties a storage backend and a code generator together,
//! retries generator collisions, and reports successful shortens and follows
//! to the audit subsystem. Core types are re-exported from `snip_core`.

pub mod error;
pub mod model;
pub mod service;

pub use error::{Result, ShortenerError};
pub use model::{BatchItem, BatchRequest, UrlPair};
pub use service::{ServiceConfig, ShortenerService, DEFAULT_MAX_ATTEMPTS};
pub use snip_core::{ShortCode, Stats, UserId};
