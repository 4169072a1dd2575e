//! crates/storage-adapters/src/lib.rs
//!
//! Adapters behind the `BoardRepo` and `MediaStore` ports.

pub mod memory;

#[cfg(feature = "media-local")]
pub mod media_local;

pub use memory::InMemoryBoardRepo;

#[cfg(feature = "media-local")]
pub use media_local::LocalMediaStore;
