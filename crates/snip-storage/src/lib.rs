//! Storage backends for the snip URL shortener.
//!
//! All three backends implement [`Repository`] with the same contract:
//!
//! - [`InMemoryRepository`]: process-local, lost on restart.
//! - [`FileRepository`]: append-only JSON file with an in-memory index.
//! - [`MySqlRepository`]: relational storage with schema-level uniqueness.

pub mod file;
pub mod memory;
pub mod mysql;

pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use mysql::MySqlRepository;
pub use snip_core::{ReadRepository, Repository, StorageError};
