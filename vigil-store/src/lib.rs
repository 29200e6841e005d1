//! Vigil Storage Layer
//!
//! Persists the position record and trade ledger between cycles.
//!
//! # Architecture
//!
//! - **Repository trait**: Defines the storage interface (port)
//! - **In-memory store**: Fast implementation for testing
//! - **JSON file store**: Production implementation, atomic replace on save
//!
//! # Usage
//!
//! ```rust
//! use vigil_store::{JsonFileStore, StateStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = JsonFileStore::new(std::env::temp_dir().join("vigil-doc-state.json"));
//!
//!     let state = store.load().await.unwrap();
//!     store.save(&state).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Modules
mod error;
mod file;
mod memory;
mod repository;

// Re-exports
pub use error::StoreError;
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use repository::StateStore;
