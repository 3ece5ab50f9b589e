//! Memory record stores for Wayfarer.
//!
//! Both stores are append-only: a record is never updated or removed once
//! written.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;

use std::path::PathBuf;
use std::sync::Arc;
use wayfarer_core::memory::MemoryStore;

/// Build a store from a backend name (`in_memory` or `file`).
///
/// Unknown names fall back to the in-memory store.
pub fn build_store(backend: &str, path: Option<PathBuf>) -> Arc<dyn MemoryStore> {
    match backend {
        "file" => Arc::new(FileStore::new(path.unwrap_or_else(FileStore::default_path))),
        "in_memory" => Arc::new(InMemoryStore::new()),
        other => {
            tracing::warn!(backend = other, "Unknown memory backend, using in_memory");
            Arc::new(InMemoryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_named_backends() {
        assert_eq!(build_store("in_memory", None).name(), "in_memory");
        let dir = tempfile::tempdir().unwrap();
        let store = build_store("file", Some(dir.path().join("memory.jsonl")));
        assert_eq!(store.name(), "file");
        assert_eq!(build_store("redis", None).name(), "in_memory");
    }
}
