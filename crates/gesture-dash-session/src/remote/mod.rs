//! Remote control implementations.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::{InMemoryRemote, RemoteCall};
