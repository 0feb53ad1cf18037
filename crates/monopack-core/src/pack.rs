//! The packaging orchestrator.
//!
//! Sequences discovery, edge resolution, archive creation and manifest
//! rewriting. The two archive phases fan out one task per package, bounded
//! by [`CONCURRENCY_LIMIT`]; a phase must fully settle before the next one
//! starts, and the first failure in a phase aborts the run.

use crate::archive::{rewrite_manifest, ArchiveError};
use crate::graph::resolve_internal_dependencies;
use crate::manager::{ManagerError, PackageManager};
use crate::scratch::ScratchRoot;
use crate::workspace::{Package, WorkspaceError, WorkspaceSet};
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Maximum number of in-flight tasks per phase.
pub const CONCURRENCY_LIMIT: usize = 16;

/// Default output directory, relative to the current directory.
pub const DEFAULT_OUTPUT_DIR: &str = ".monopack";

/// Archive file extension.
pub const ARCHIVE_EXT: &str = "tgz";

/// Errors that can abort a packaging run.
#[derive(Error, Debug)]
pub enum PackError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error("failed to pack '{package}': {stderr}")]
    PackFailed { package: String, stderr: String },

    #[error("pack reported no archive path for '{package}'")]
    NoArchivePath { package: String },

    #[error("did not find workspace '{dependency}', required by '{package}'")]
    MissingDependency {
        dependency: String,
        package: String,
    },

    #[error("failed to rewrite archive of '{package}': {source}")]
    Archive {
        package: String,
        #[source]
        source: ArchiveError,
    },

    #[error("archive rewrite task for '{package}' did not complete: {source}")]
    RewriteTask {
        package: String,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options for a packaging run.
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Destination directory for produced archives.
    pub output_dir: PathBuf,

    /// Omit the version segment from archive filenames.
    pub strip_version: bool,

    /// Use absolute file paths in rewritten dependency references.
    pub absolute_paths: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            strip_version: false,
            absolute_paths: false,
        }
    }
}

/// Pack every workspace member and rewrite the archives to reference each
/// other via local `file:` paths.
///
/// # Errors
///
/// Returns the first fatal error of any phase. The run-scoped scratch
/// space is removed on every exit path.
pub async fn run<M: PackageManager>(manager: &M, options: &PackOptions) -> Result<(), PackError> {
    let output_dir = absolute_output_dir(&options.output_dir)?;

    println!("Parsing workspace...");
    let member_dirs = manager.workspaces().await?;
    let mut set = WorkspaceSet::discover(&member_dirs).await?;
    resolve_internal_dependencies(&mut set);

    std::fs::create_dir_all(&output_dir)?;
    // RAII: removed on early return and panic as well as on close() below
    let scratch_root = ScratchRoot::create(&output_dir)?;

    println!("Packing tarballs...");
    pack_all(manager, &mut set, &output_dir).await?;

    println!("Modifying workspaces...");
    rewrite_all(&set, scratch_root.path(), options).await?;

    scratch_root.close()?;
    println!("Done!");
    Ok(())
}

fn absolute_output_dir(output_dir: &Path) -> Result<PathBuf, std::io::Error> {
    if output_dir.is_absolute() {
        Ok(output_dir.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(output_dir))
    }
}

/// Phase 3: produce one archive per package, recording its path.
async fn pack_all<M: PackageManager>(
    manager: &M,
    set: &mut WorkspaceSet,
    output_dir: &Path,
) -> Result<(), PackError> {
    let tasks = set.packages.iter_mut().map(|package| async move {
        println!("  {}", package.name);
        let output = manager.pack(&package.dir, output_dir).await?;
        if !output.success {
            return Err(PackError::PackFailed {
                package: package.name.clone(),
                stderr: output.stderr,
            });
        }
        let file = output
            .archive_file()
            .ok_or_else(|| PackError::NoArchivePath {
                package: package.name.clone(),
            })?;
        package.archive_path = Some(output_dir.join(file));
        Ok(())
    });

    await_bounded(tasks).await
}

/// Phase 4: rewrite each archive's manifest to reference sibling archives.
async fn rewrite_all(
    set: &WorkspaceSet,
    scratch_base: &Path,
    options: &PackOptions,
) -> Result<(), PackError> {
    let tasks = set.packages.iter().map(|package| async move {
        println!("  {} starting...", package.name);

        let archive_path = produced_archive(package)?.clone();
        let replacements = dependency_replacements(package, set, options)?;

        // The transform is synchronous tar work with no await points; it
        // runs on the blocking pool so sibling tasks keep making progress.
        let rewrite_path = archive_path.clone();
        let task_scratch_base = scratch_base.to_path_buf();
        tokio::task::spawn_blocking(move || {
            rewrite_manifest(&rewrite_path, &task_scratch_base, move |manifest| {
                for (name, reference) in replacements {
                    manifest.dependencies.insert(name, reference);
                }
                // Avoid accidentally installing dev dependencies
                manifest.dev_dependencies = None;
            })
        })
        .await
        .map_err(|source| PackError::RewriteTask {
            package: package.name.clone(),
            source,
        })?
        .map_err(|source| PackError::Archive {
            package: package.name.clone(),
            source,
        })?;

        if options.strip_version {
            let stripped = strip_version(&archive_path, &package.version);
            if stripped != archive_path {
                tokio::fs::rename(&archive_path, &stripped).await?;
            }
        }

        println!("  {} done!", package.name);
        Ok(())
    });

    await_bounded(tasks).await
}

/// Drive up to [`CONCURRENCY_LIMIT`] tasks at once, stopping at the first
/// failure. Completion order within the bound is unconstrained.
async fn await_bounded<I, F>(tasks: I) -> Result<(), PackError>
where
    I: Iterator<Item = F>,
    F: std::future::Future<Output = Result<(), PackError>>,
{
    let mut results = stream::iter(tasks).buffer_unordered(CONCURRENCY_LIMIT);
    while let Some(result) = results.next().await {
        result?;
    }
    Ok(())
}

fn produced_archive(package: &Package) -> Result<&PathBuf, PackError> {
    package
        .archive_path
        .as_ref()
        .ok_or_else(|| PackError::NoArchivePath {
            package: package.name.clone(),
        })
}

/// Compute the `file:` reference for each internal dependency of `package`.
///
/// The set membership of every edge was established by the grapher, so a
/// miss here cannot happen in practice; it is still checked rather than
/// unwrapped.
fn dependency_replacements(
    package: &Package,
    set: &WorkspaceSet,
    options: &PackOptions,
) -> Result<BTreeMap<String, String>, PackError> {
    let mut replacements = BTreeMap::new();
    for dependency in &package.internal_dependencies {
        let dep_package = set
            .get(dependency)
            .ok_or_else(|| PackError::MissingDependency {
                dependency: dependency.clone(),
                package: package.name.clone(),
            })?;
        let dep_archive = produced_archive(dep_package)?;
        let target = if options.strip_version {
            strip_version(dep_archive, &dep_package.version)
        } else {
            dep_archive.clone()
        };
        replacements.insert(
            dependency.clone(),
            file_reference(&target, options.absolute_paths),
        );
    }
    Ok(replacements)
}

/// Drop the `-<version>` segment from an archive filename.
///
/// A filename that does not end in `-<version>.tgz` is returned unchanged,
/// so stripping an already-stripped name is a no-op.
fn strip_version(archive: &Path, version: &str) -> PathBuf {
    let suffix = format!("-{version}.{ARCHIVE_EXT}");
    match archive.file_name().and_then(OsStr::to_str) {
        Some(name) => match name.strip_suffix(&suffix) {
            Some(stem) => archive.with_file_name(format!("{stem}.{ARCHIVE_EXT}")),
            None => archive.to_path_buf(),
        },
        None => archive.to_path_buf(),
    }
}

/// Format a dependency value pointing at a local archive.
fn file_reference(target: &Path, absolute: bool) -> String {
    if absolute {
        format!("file:{}", target.display())
    } else {
        let basename = target
            .file_name()
            .map_or_else(|| target.to_string_lossy(), OsStr::to_string_lossy);
        format!("file:./{basename}")
    }
}
