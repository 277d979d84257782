//! Fire-and-forget audit notifications.
//!
//! The [`AuditManager`] keeps a list of [`Observer`]s and fans every
//! [`AuditEvent`] out to them on background tasks. Callers of
//! [`AuditManager::notify`] never wait for delivery and never see a delivery
//! error: audit is best-effort and not a correctness dependency.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use snip_audit::{AuditAction, AuditEvent, AuditManager, FileObserver, HttpObserver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = AuditManager::new();
//! manager.register(Arc::new(FileObserver::open("audit.log").await?));
//! manager.register(Arc::new(HttpObserver::new("https://audit.example/events")?));
//!
//! manager.notify(AuditEvent::new(AuditAction::Follow, None, "https://example.com"));
//!
//! manager.close().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod event;
pub mod manager;
pub mod observer;

pub use error::AuditError;
pub use event::{AuditAction, AuditEvent};
pub use manager::{AuditManager, ObserverId};
pub use observer::{FileObserver, HttpObserver, Observer, TracingObserver};
