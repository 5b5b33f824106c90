//! Loaded-container registry and external-data resolution.
//!
//! Several Unity object kinds reference bytes in a different file than the
//! one being decoded (a `.resource` sidecar, another bundle node). The
//! [`Workspace`] keeps every opened container and satisfies those requests
//! from their entries, matching by path tail since stored paths often carry
//! `archive:/` style prefixes that no longer exist.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use veles_unity::ExternalResolver;

use crate::container::Container;

/// A shared set of opened containers.
#[derive(Default)]
pub struct Workspace {
    containers: RwLock<Vec<Arc<Container>>>,
}

/// The last path segment, for prefix-insensitive matching.
fn tail(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an opened container.
    pub fn add(&self, container: Container) -> Arc<Container> {
        let container = Arc::new(container);
        self.containers.write().push(Arc::clone(&container));
        container
    }

    /// All registered containers.
    pub fn containers(&self) -> Vec<Arc<Container>> {
        self.containers.read().clone()
    }

    /// Find an entry whose path tail matches, searching every container.
    fn find_entry_bytes(&self, path: &str) -> Option<Vec<u8>> {
        let wanted = tail(path);
        for container in self.containers.read().iter() {
            for entry in container.entries() {
                if tail(&entry.name) == wanted {
                    if let Ok(bytes) = container.entry_bytes(&entry.name) {
                        return Some(bytes);
                    }
                }
            }
        }
        None
    }
}

impl ExternalResolver for Workspace {
    fn resolve(&self, path: &str, offset: u64, size: Option<u64>) -> Option<Vec<u8>> {
        let bytes = self.find_entry_bytes(path)?;
        let start = offset as usize;
        if start > bytes.len() {
            debug!(path, offset, "external reference past end of entry");
            return None;
        }
        let end = match size {
            Some(size) => (start + size as usize).min(bytes.len()),
            None => bytes.len(),
        };
        Some(bytes[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_from_opaque_container() {
        let workspace = Workspace::new();
        let container =
            Container::open(b"0123456789".to_vec(), "textures.resource").unwrap();
        workspace.add(container);

        let bytes = workspace
            .resolve("archive:/bundle/textures.resource", 2, Some(4))
            .unwrap();
        assert_eq!(bytes, b"2345");

        // Open-ended size reads to the end of the entry.
        let bytes = workspace.resolve("textures.resource", 5, None).unwrap();
        assert_eq!(bytes, b"56789");

        assert!(workspace.resolve("missing.resource", 0, None).is_none());
        assert!(workspace
            .resolve("textures.resource", 99, Some(1))
            .is_none());
    }
}
