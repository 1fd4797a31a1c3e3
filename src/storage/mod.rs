//! Durable storage for the serialized notification mapping.
//!
//! The store keeps its whole state in one blob under a fixed key. Backends
//! only need to read and overwrite that blob; they never see individual
//! notifications.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::Result;

/// A key/blob backend. Reads happen once at hydration, writes replace the
/// previous blob in full.
pub trait Persistence: Send + Sync {
    /// Read the blob under `key`, or `None` if nothing was ever written.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite the blob under `key`.
    fn write(&self, key: &str, blob: &str) -> Result<()>;
}

impl<P: Persistence + ?Sized> Persistence for Box<P> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, blob: &str) -> Result<()> {
        (**self).write(key, blob)
    }
}

impl<P: Persistence + ?Sized> Persistence for std::sync::Arc<P> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, blob: &str) -> Result<()> {
        (**self).write(key, blob)
    }
}
