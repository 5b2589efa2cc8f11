//! Request path to handler file resolution
//!
//! `/foo/bar` maps to `<root>/foo/bar/index.js`, then `index.mjs`. Only
//! files that exist at resolution time are returned.

use std::path::{Path, PathBuf};

/// Handler file names tried in each directory, most preferred first
pub const CANDIDATES: [&str; 2] = ["index.js", "index.mjs"];

#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// First existing candidate for `path`, or `None`.
    ///
    /// Any query suffix is ignored. Paths with `..` segments or backslashes
    /// never resolve, and neither does a candidate whose real location falls
    /// outside the root.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        let clean = path.split('?').next().unwrap_or_default();
        if clean.contains('\\') {
            return None;
        }

        let mut dir = self.root.clone();
        for segment in clean.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if segment == ".." {
                return None;
            }
            dir.push(segment);
        }

        CANDIDATES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file() && self.contains(candidate))
    }

    fn contains(&self, candidate: &Path) -> bool {
        candidate
            .canonicalize()
            .is_ok_and(|real| real.starts_with(&self.root))
    }

    /// `./`-prefixed path relative to the root, for logs and error context
    pub fn display_relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root).map_or_else(
            |_| path.display().to_string(),
            |rel| format!("./{}", rel.display()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "export default () => new Response('');").unwrap();
        }
        dir
    }

    #[test]
    fn test_resolves_index_js() {
        let dir = tree(&["api/users/index.js"]);
        let resolver = PathResolver::new(dir.path());
        let found = resolver.resolve("/api/users").unwrap();
        assert!(found.ends_with("api/users/index.js"));
        assert_eq!(resolver.display_relative(&found), "./api/users/index.js");
    }

    #[test]
    fn test_candidate_order() {
        let dir = tree(&["a/index.mjs", "a/index.js", "b/index.mjs"]);
        let resolver = PathResolver::new(dir.path());
        assert!(resolver.resolve("/a").unwrap().ends_with("a/index.js"));
        assert!(resolver.resolve("/b").unwrap().ends_with("b/index.mjs"));
    }

    #[test]
    fn test_query_and_trailing_slash_ignored() {
        let dir = tree(&["api/items/index.js"]);
        let resolver = PathResolver::new(dir.path());
        assert!(resolver.resolve("/api/items/?page=2").is_some());
        assert!(resolver.resolve("/api/items?x=/../../etc").is_some());
    }

    #[test]
    fn test_missing_is_absent() {
        let dir = tree(&["api/items/index.js"]);
        let resolver = PathResolver::new(dir.path());
        assert!(resolver.resolve("/api/nothing").is_none());
        // a directory named like a candidate is not a file
        std::fs::create_dir_all(dir.path().join("api/dir/index.js")).unwrap();
        assert!(resolver.resolve("/api/dir").is_none());
    }

    #[test]
    fn test_traversal_rejected() {
        let outer = tree(&["secret/index.js", "root/api/index.js"]);
        let resolver = PathResolver::new(outer.path().join("root"));
        assert!(resolver.resolve("/../secret").is_none());
        assert!(resolver.resolve("/api/../../secret").is_none());
        assert!(resolver.resolve("/api\\..\\..\\secret").is_none());
        assert!(resolver.resolve("/api").is_some());
    }
}
