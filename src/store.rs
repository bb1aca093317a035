//! Template store – maps template names onto directories under a root and
//! enumerates the templates available there.

use std::path::{Path, PathBuf};

use crate::config::MAIN_DOCUMENT;
use crate::error::{ReportError, Result};

/// A directory tree of named template bundles.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate `name` and return the directory it refers to.
    ///
    /// Rejects the empty name, names containing `..`, absolute names, and names that are not
    /// already in normalized form (empty segments, `.` segments, trailing
    /// slashes). No filesystem access happens here.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        if !is_valid_name(name) {
            return Err(ReportError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    /// Path of the main document for `name`.
    pub fn main_document(&self, name: &str) -> Result<PathBuf> {
        Ok(self.resolve(name)?.join(MAIN_DOCUMENT))
    }

    /// Names of all directories under the root that contain a main document,
    /// sorted. A missing or unreadable root yields an empty list.
    pub async fn list(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!("Template root {} not readable: {e}", self.root.display());
                return names;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            if tokio::fs::try_exists(entry.path().join(MAIN_DOCUMENT))
                .await
                .unwrap_or(false)
            {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        names
    }
}

fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.contains("..") || name.contains('\0') {
        return false;
    }
    if name.starts_with('/') || name.starts_with('\\') || Path::new(name).is_absolute() {
        return false;
    }
    normalize(name) == name
}

/// Lexical normalization: drop empty and `.` segments.
fn normalize(name: &str) -> String {
    name.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TemplateStore {
        TemplateStore::new("/srv/templates")
    }

    #[test]
    fn valid_names_resolve_inside_root() {
        for name in ["invoice", "monthly-report", "group/invoice", "v1.2"] {
            let path = store().resolve(name).unwrap();
            assert!(path.starts_with("/srv/templates"), "{name} escaped: {path:?}");
            assert_eq!(path, Path::new("/srv/templates").join(name));
        }
    }

    #[test]
    fn traversal_is_rejected() {
        for name in ["..", "../secret", "a/../b", "a/..", "foo..bar"] {
            assert!(
                matches!(store().resolve(name), Err(ReportError::InvalidName(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn absolute_is_rejected() {
        for name in ["/etc/passwd", "/invoice", "\\invoice"] {
            assert!(matches!(store().resolve(name), Err(ReportError::InvalidName(_))));
        }
    }

    #[test]
    fn non_normalized_is_rejected() {
        for name in ["", ".", "./invoice", "invoice/", "a//b", "a/./b"] {
            assert!(
                matches!(store().resolve(name), Err(ReportError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn empty_name_never_resolves_to_root() {
        let err = store().resolve("").unwrap_err();
        assert!(matches!(err, ReportError::InvalidName(ref n) if n.is_empty()));
        assert!(store().main_document("").is_err());
    }

    #[tokio::test]
    async fn list_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta", "alpha", "draft"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("zeta").join(MAIN_DOCUMENT), "z").unwrap();
        std::fs::write(dir.path().join("alpha").join(MAIN_DOCUMENT), "a").unwrap();
        std::fs::write(dir.path().join("stray.hbs"), "x").unwrap();

        let names = TemplateStore::new(dir.path()).list().await;
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[tokio::test]
    async fn list_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let names = TemplateStore::new(dir.path().join("nope")).list().await;
        assert!(names.is_empty());
    }
}
