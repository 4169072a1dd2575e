//! crates/domains/src/lib.rs
//!
//! Entities, errors, wire events and port traits for the board.
//! Nothing in this crate performs I/O.

pub mod clock;
pub mod error;
pub mod events;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use clock::*;
pub use error::*;
pub use events::*;
pub use models::*;
pub use ports::*;
