//! Virtual-to-real path mapping.
//!
//! Virtual paths are host paths such as `/docs/a.txt`, always `/`-separated
//! and rooted at the mount. The resolver joins them onto the mirrored root
//! without touching the file system.

use std::path::{Path, PathBuf};

/// The mount root marker of the virtual namespace.
pub const ROOT: &str = "/";

/// Maps virtual paths onto the mirrored root directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Creates a resolver for the given mirrored root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The mirrored root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins `virtual_path` onto the mirrored root.
    ///
    /// Pure: no validation and no existence check. `/` and the empty path
    /// both resolve to the root itself.
    pub fn resolve(&self, virtual_path: &str) -> PathBuf {
        let mut real = self.root.clone();
        for component in virtual_path.split('/').filter(|c| !c.is_empty()) {
            real.push(component);
        }
        real
    }
}

/// Parent directory of a virtual path.
///
/// `/a/b` → `/a`, `/a` → `/`, `/` → `/`.
pub fn parent(virtual_path: &str) -> &str {
    let trimmed = virtual_path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => ROOT,
        Some(idx) => &trimmed[..idx],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_joins_components() {
        let resolver = PathResolver::new("/srv/data");
        assert_eq!(
            resolver.resolve("/docs/a.txt"),
            Path::new("/srv/data").join("docs").join("a.txt")
        );
    }

    #[test]
    fn test_resolve_root() {
        let resolver = PathResolver::new("/srv/data");
        assert_eq!(resolver.resolve("/"), Path::new("/srv/data"));
        assert_eq!(resolver.resolve(""), Path::new("/srv/data"));
    }

    #[test]
    fn test_resolve_does_not_touch_disk() {
        let resolver = PathResolver::new("/definitely/not/here");
        assert_eq!(
            resolver.resolve("/missing"),
            Path::new("/definitely/not/here/missing")
        );
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("/a/b/c.txt"), "/a/b");
        assert_eq!(parent("/a/b"), "/a");
        assert_eq!(parent("/a"), "/");
        assert_eq!(parent("/"), "/");
        assert_eq!(parent("/a/b/"), "/a");
    }
}
