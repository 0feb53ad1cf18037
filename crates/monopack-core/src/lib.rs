//! Core library for monopack: packing a monorepo's workspaces into local
//! tarballs that reference each other by `file:` path instead of registry
//! version ranges.
//!
//! This crate provides:
//! - Parsing and re-serialization of `package.json` manifests
//! - Workspace set discovery and internal dependency resolution
//! - In-place rewriting of archive-embedded manifests
//! - A bounded-concurrency packaging orchestrator
//! - Scratch space management with guaranteed cleanup

mod archive;
mod graph;
mod manager;
mod manifest;
mod pack;
mod scratch;
mod workspace;

pub use archive::{rewrite_manifest, ArchiveError, ARCHIVE_MANIFEST_PATH, ARCHIVE_ROOT_DIR};
pub use graph::resolve_internal_dependencies;
pub use manager::{ManagerError, ManagerKind, NodePackageManager, PackOutput, PackageManager};
pub use manifest::{ManifestError, PackageManifest, MANIFEST_FILE};
pub use pack::{run, PackError, PackOptions, ARCHIVE_EXT, CONCURRENCY_LIMIT, DEFAULT_OUTPUT_DIR};
pub use scratch::{ScratchDir, ScratchRoot};
pub use workspace::{Package, WorkspaceError, WorkspaceSet};
