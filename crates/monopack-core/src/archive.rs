//! In-place rewriting of a package archive's embedded manifest.
//!
//! Archives are gzipped tarballs laid out the way `npm pack` produces them:
//! every entry lives under a top-level `package/` directory, with the
//! manifest at `package/package.json`.

use crate::manifest::{ManifestError, PackageManifest};
use crate::scratch::ScratchDir;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Directory that roots every entry inside a package archive.
pub const ARCHIVE_ROOT_DIR: &str = "package";

/// Fixed path of the manifest inside a package archive.
pub const ARCHIVE_MANIFEST_PATH: &str = "package/package.json";

/// Errors that can occur while rewriting an archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("archive has no package/package.json entry")]
    MissingManifest,
}

/// Rewrite the manifest embedded in the archive at `archive_path`.
///
/// Materialize-on-disk strategy: the archive is extracted into a fresh
/// scratch directory under `scratch_base`, `mutate` is applied to the
/// extracted manifest, and the archive is rebuilt from the mutated tree.
/// The rebuilt archive is written next to the original and renamed over it
/// only once fully written, so the original is never left truncated. All
/// other entry contents round-trip byte-for-byte, recompressed at the
/// tightest ratio since archives are shipped artifacts.
///
/// The scratch directory is removed whether or not the rewrite succeeds.
///
/// # Errors
///
/// Returns an error if the archive cannot be read, the manifest is missing
/// or malformed, or the rebuilt archive cannot be written.
pub fn rewrite_manifest(
    archive_path: &Path,
    scratch_base: &Path,
    mutate: impl FnOnce(&mut PackageManifest),
) -> Result<(), ArchiveError> {
    let scratch = ScratchDir::acquire(scratch_base)?;

    extract(archive_path, scratch.path())?;

    let manifest_path = scratch.path().join(ARCHIVE_MANIFEST_PATH);
    if !manifest_path.is_file() {
        return Err(ArchiveError::MissingManifest);
    }

    let mut manifest = PackageManifest::from_path(&manifest_path)?;
    mutate(&mut manifest);
    std::fs::write(&manifest_path, manifest.to_json()?)?;

    repack(scratch.path(), archive_path)?;

    scratch.close()?;
    Ok(())
}

/// Extract a gzipped tarball into `dest`.
fn extract(archive_path: &Path, dest: &Path) -> io::Result<()> {
    let file = File::open(archive_path)?;
    let decoder = GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest)
}

/// Rebuild the archive from the extracted tree, replacing the original
/// only after the new file is complete.
///
/// A partially written staging file is removed before the error is
/// propagated, so a failed repack leaves nothing behind in the output
/// directory.
fn repack(extracted_root: &Path, archive_path: &Path) -> io::Result<()> {
    let staging_path = staging_path_for(archive_path);

    let staged = write_staged(&staging_path, extracted_root)
        .and_then(|()| std::fs::rename(&staging_path, archive_path));
    if staged.is_err() {
        let _ = std::fs::remove_file(&staging_path);
    }
    staged
}

/// Write the rebuilt archive to the staging path.
fn write_staged(staging_path: &Path, extracted_root: &Path) -> io::Result<()> {
    let file = File::create(staging_path)?;
    let encoder = GzEncoder::new(file, Compression::best());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(ARCHIVE_ROOT_DIR, extracted_root.join(ARCHIVE_ROOT_DIR))?;
    builder.into_inner()?.finish()?;
    Ok(())
}

fn staging_path_for(archive_path: &Path) -> std::path::PathBuf {
    let mut name = archive_path.as_os_str().to_os_string();
    name.push(".tmp");
    std::path::PathBuf::from(name)
}
