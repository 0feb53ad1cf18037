//! The package-manager collaborator.
//!
//! Workspace enumeration and archive creation are delegated to the package
//! manager of the monorepo being packed. [`NodePackageManager`] drives the
//! real tool (`npm` or `pnpm`, detected from the lockfile); the trait exists
//! so the orchestrator can be exercised against a test double.

use crate::manifest::MANIFEST_FILE;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the package-manager collaborator.
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {path}: {source}")]
    RootManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no 'workspaces' field in root package.json")]
    NoWorkspaces,

    #[error("glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result of one `pack` invocation.
#[derive(Debug)]
pub struct PackOutput {
    /// Whether the tool exited successfully.
    pub success: bool,

    /// Captured standard output; on success the last non-empty line names
    /// the produced archive file.
    pub stdout: String,

    /// Captured diagnostic output.
    pub stderr: String,
}

impl PackOutput {
    /// The produced archive filename, if any.
    #[must_use]
    pub fn archive_file(&self) -> Option<&str> {
        self.stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
    }
}

/// Abstraction over the underlying package manager.
#[allow(async_fn_in_trait)]
pub trait PackageManager {
    /// Enumerate workspace member directories.
    async fn workspaces(&self) -> Result<Vec<PathBuf>, ManagerError>;

    /// Produce an archive for one member, writing it into `target_dir`.
    ///
    /// Tool failure is reported through [`PackOutput::success`], not as an
    /// `Err`; `Err` is reserved for not being able to run the tool at all.
    async fn pack(&self, workspace: &Path, target_dir: &Path) -> Result<PackOutput, ManagerError>;
}

/// Which Node package manager drives the monorepo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerKind {
    Npm,
    Pnpm,
}

impl ManagerKind {
    /// The executable name for this manager.
    #[must_use]
    pub fn command(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
        }
    }
}

/// A real Node package manager rooted at a monorepo directory.
#[derive(Debug)]
pub struct NodePackageManager {
    root: PathBuf,
    kind: ManagerKind,
}

/// Root `package.json` fields relevant to member enumeration.
#[derive(Deserialize)]
struct RootManifest {
    #[serde(default)]
    workspaces: Option<WorkspacesField>,
}

/// The `workspaces` field comes in two shapes.
#[derive(Deserialize)]
#[serde(untagged)]
enum WorkspacesField {
    Patterns(Vec<String>),
    Detailed { packages: Vec<String> },
}

impl WorkspacesField {
    fn into_patterns(self) -> Vec<String> {
        match self {
            Self::Patterns(patterns) | Self::Detailed { packages: patterns } => patterns,
        }
    }
}

impl NodePackageManager {
    /// Create a manager of a specific kind.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, kind: ManagerKind) -> Self {
        Self {
            root: root.into(),
            kind,
        }
    }

    /// Detect the package manager from the lockfile present at `root`.
    ///
    /// `pnpm-lock.yaml` selects pnpm; anything else falls back to npm.
    #[must_use]
    pub fn detect(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let kind = if root.join("pnpm-lock.yaml").exists() {
            ManagerKind::Pnpm
        } else {
            ManagerKind::Npm
        };
        Self { root, kind }
    }

    /// The detected manager kind.
    #[must_use]
    pub fn kind(&self) -> ManagerKind {
        self.kind
    }

    /// Root directory of the monorepo.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PackageManager for NodePackageManager {
    async fn workspaces(&self) -> Result<Vec<PathBuf>, ManagerError> {
        let manifest_path = self.root.join(MANIFEST_FILE);
        let content = tokio::fs::read_to_string(&manifest_path).await?;
        let root: RootManifest =
            serde_json::from_str(&content).map_err(|source| ManagerError::RootManifest {
                path: manifest_path,
                source,
            })?;
        let patterns = root
            .workspaces
            .ok_or(ManagerError::NoWorkspaces)?
            .into_patterns();

        let mut dirs = Vec::new();
        let mut seen = HashSet::new();
        // The root path is matched literally; only the member pattern
        // globs. A root containing '[' or '?' must not act as a pattern.
        let escaped_root = glob::Pattern::escape(&self.root.to_string_lossy());
        for pattern in patterns {
            let full_pattern = format!(
                "{escaped_root}{}{pattern}",
                std::path::MAIN_SEPARATOR
            );
            for entry in glob::glob(&full_pattern)? {
                let path = entry.map_err(|e| ManagerError::Io(e.into_error()))?;
                if !seen.insert(path.clone()) {
                    continue;
                }
                // Only directories that are actually packages count.
                if path.is_dir() && path.join(MANIFEST_FILE).exists() {
                    dirs.push(path);
                }
            }
        }

        dirs.sort();
        Ok(dirs)
    }

    async fn pack(&self, workspace: &Path, target_dir: &Path) -> Result<PackOutput, ManagerError> {
        let command = self.kind.command();
        let output = tokio::process::Command::new(command)
            .arg("pack")
            .arg("--pack-destination")
            .arg(target_dir)
            .current_dir(workspace)
            .output()
            .await
            .map_err(|source| ManagerError::Spawn {
                command: command.to_string(),
                source,
            })?;

        Ok(PackOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn member(root: &Path, dir: &str, name: &str) {
        let path = root.join(dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(
            path.join(MANIFEST_FILE),
            format!(r#"{{"name": "{name}", "version": "1.0.0"}}"#),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn expands_workspaces_array() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(MANIFEST_FILE),
            r#"{"name": "root", "version": "0.0.0", "workspaces": ["packages/*"]}"#,
        )
        .unwrap();
        member(tmp.path(), "packages/a", "a");
        member(tmp.path(), "packages/b", "b");
        // A directory without a manifest is not a member
        fs::create_dir_all(tmp.path().join("packages/docs")).unwrap();

        let manager = NodePackageManager::detect(tmp.path());
        let dirs = manager.workspaces().await.unwrap();
        assert_eq!(dirs.len(), 2);
        assert!(dirs[0].ends_with("packages/a"));
        assert!(dirs[1].ends_with("packages/b"));
    }

    #[tokio::test]
    async fn expands_workspaces_object_form() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(MANIFEST_FILE),
            r#"{"name": "root", "version": "0.0.0",
                "workspaces": {"packages": ["libs/*"]}}"#,
        )
        .unwrap();
        member(tmp.path(), "libs/core", "core");

        let manager = NodePackageManager::detect(tmp.path());
        let dirs = manager.workspaces().await.unwrap();
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].ends_with("libs/core"));
    }

    #[tokio::test]
    async fn root_path_metacharacters_match_literally() {
        let base = TempDir::new().unwrap();
        let root = base.path().join("mono[repo]");
        fs::create_dir_all(&root).unwrap();
        fs::write(
            root.join(MANIFEST_FILE),
            r#"{"name": "root", "version": "0.0.0", "workspaces": ["packages/*"]}"#,
        )
        .unwrap();
        member(&root, "packages/a", "a");

        let manager = NodePackageManager::detect(&root);
        let dirs = manager.workspaces().await.unwrap();
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].ends_with("packages/a"));
    }

    #[tokio::test]
    async fn missing_workspaces_field_is_an_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(MANIFEST_FILE),
            r#"{"name": "root", "version": "0.0.0"}"#,
        )
        .unwrap();

        let manager = NodePackageManager::detect(tmp.path());
        let err = manager.workspaces().await.unwrap_err();
        assert!(matches!(err, ManagerError::NoWorkspaces));
    }

    #[test]
    fn detects_pnpm_from_lockfile() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("pnpm-lock.yaml"), "lockfileVersion: 9").unwrap();
        assert_eq!(
            NodePackageManager::detect(tmp.path()).kind(),
            ManagerKind::Pnpm
        );

        let plain = TempDir::new().unwrap();
        assert_eq!(
            NodePackageManager::detect(plain.path()).kind(),
            ManagerKind::Npm
        );
    }

    #[test]
    fn archive_file_is_last_nonempty_stdout_line() {
        let output = PackOutput {
            success: true,
            stdout: "npm notice tarball details\na-1.0.0.tgz\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(output.archive_file(), Some("a-1.0.0.tgz"));

        let empty = PackOutput {
            success: true,
            stdout: "  \n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(empty.archive_file(), None);
    }
}
