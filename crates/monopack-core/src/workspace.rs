//! The workspace set: every non-private package discovered in one run.

use crate::manifest::{ManifestError, PackageManifest, MANIFEST_FILE};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building the workspace set.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("failed to load manifest at {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    #[error("invalid version '{version}' for package '{name}': {source}")]
    InvalidVersion {
        name: String,
        version: String,
        #[source]
        source: semver::Error,
    },

    #[error("duplicate package name '{0}' in workspace")]
    DuplicateName(String),
}

/// One publishable workspace member.
#[derive(Debug)]
pub struct Package {
    /// Package name, unique within the set.
    pub name: String,

    /// Source directory of the member.
    pub dir: PathBuf,

    /// Version from the manifest.
    pub version: String,

    /// The parsed manifest.
    pub manifest: PackageManifest,

    /// Names of dependencies satisfied by other members of the set.
    /// Filled by [`crate::resolve_internal_dependencies`].
    pub internal_dependencies: Vec<String>,

    /// Path of the produced archive. Set once after archive creation.
    pub archive_path: Option<PathBuf>,
}

/// The complete collection of non-private packages discovered in one run.
#[derive(Debug, Default)]
pub struct WorkspaceSet {
    /// Discovered packages, in member-enumeration order.
    pub packages: Vec<Package>,
}

impl WorkspaceSet {
    /// Build the set by reading the manifest of every member directory.
    ///
    /// Private members are skipped entirely: they can neither be depended
    /// upon nor produce an archive. Versions are validated as semver up
    /// front so that bad metadata aborts before any archive work.
    ///
    /// # Errors
    ///
    /// Returns an error on an unreadable or invalid manifest, an invalid
    /// version, or a duplicate package name.
    pub async fn discover(member_dirs: &[PathBuf]) -> Result<Self, WorkspaceError> {
        let mut packages = Vec::new();
        let mut seen = HashSet::new();

        for dir in member_dirs {
            let manifest_path = dir.join(MANIFEST_FILE);
            let content = tokio::fs::read_to_string(&manifest_path)
                .await
                .map_err(|e| WorkspaceError::Manifest {
                    path: manifest_path.clone(),
                    source: e.into(),
                })?;
            let manifest =
                PackageManifest::parse(&content).map_err(|source| WorkspaceError::Manifest {
                    path: manifest_path.clone(),
                    source,
                })?;

            if manifest.private {
                continue;
            }

            semver::Version::parse(&manifest.version).map_err(|source| {
                WorkspaceError::InvalidVersion {
                    name: manifest.name.clone(),
                    version: manifest.version.clone(),
                    source,
                }
            })?;

            if !seen.insert(manifest.name.clone()) {
                return Err(WorkspaceError::DuplicateName(manifest.name));
            }

            packages.push(Package {
                name: manifest.name.clone(),
                dir: dir.clone(),
                version: manifest.version.clone(),
                manifest,
                internal_dependencies: Vec::new(),
                archive_path: None,
            });
        }

        Ok(Self { packages })
    }

    /// Look up a package by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Number of packages in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn member(root: &Path, dir: &str, json: &str) -> PathBuf {
        let path = root.join(dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(MANIFEST_FILE), json).unwrap();
        path
    }

    #[tokio::test]
    async fn discovers_public_members() {
        let tmp = TempDir::new().unwrap();
        let dirs = vec![
            member(tmp.path(), "a", r#"{"name": "a", "version": "1.0.0"}"#),
            member(tmp.path(), "b", r#"{"name": "b", "version": "2.0.0"}"#),
        ];

        let set = WorkspaceSet::discover(&dirs).await.unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("a").unwrap().version, "1.0.0");
        assert!(set.get("a").unwrap().archive_path.is_none());
    }

    #[tokio::test]
    async fn skips_private_members() {
        let tmp = TempDir::new().unwrap();
        let dirs = vec![
            member(tmp.path(), "a", r#"{"name": "a", "version": "1.0.0"}"#),
            member(
                tmp.path(),
                "p",
                r#"{"name": "p", "version": "0.1.0", "private": true}"#,
            ),
        ];

        let set = WorkspaceSet::discover(&dirs).await.unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.get("p").is_none());
    }

    #[tokio::test]
    async fn invalid_manifest_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let dirs = vec![member(tmp.path(), "broken", "{not json")];

        let err = WorkspaceSet::discover(&dirs).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Manifest { .. }));
    }

    #[tokio::test]
    async fn missing_manifest_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let empty = tmp.path().join("empty");
        fs::create_dir_all(&empty).unwrap();

        let err = WorkspaceSet::discover(&[empty]).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Manifest { .. }));
    }

    #[tokio::test]
    async fn duplicate_names_are_fatal() {
        let tmp = TempDir::new().unwrap();
        let dirs = vec![
            member(tmp.path(), "a1", r#"{"name": "a", "version": "1.0.0"}"#),
            member(tmp.path(), "a2", r#"{"name": "a", "version": "1.0.1"}"#),
        ];

        let err = WorkspaceSet::discover(&dirs).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::DuplicateName(name) if name == "a"));
    }

    #[tokio::test]
    async fn invalid_version_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let dirs = vec![member(
            tmp.path(),
            "a",
            r#"{"name": "a", "version": "not-semver"}"#,
        )];

        let err = WorkspaceSet::discover(&dirs).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidVersion { .. }));
    }
}
