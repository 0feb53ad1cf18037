//! `package.json` manifest parsing and re-serialization.
//!
//! Only the fields the rewrite touches are modeled explicitly; everything
//! else is carried through a flattened map so that a parse/serialize
//! round-trip preserves fields like `scripts`, `bin` or `engines`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// The manifest filename.
pub const MANIFEST_FILE: &str = "package.json";

/// Errors that can occur when working with manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid manifest JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A package manifest (`package.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Package name (required).
    pub name: String,

    /// Package version (required, semver).
    pub version: String,

    /// Whether the package is non-publishable.
    #[serde(default, skip_serializing_if = "is_false")]
    pub private: bool,

    /// Runtime dependencies: name to version range (or `file:` reference).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,

    /// Development-only dependencies. Kept opaque: the rewrite only ever
    /// deletes this section wholesale.
    #[serde(
        default,
        rename = "devDependencies",
        skip_serializing_if = "Option::is_none"
    )]
    pub dev_dependencies: Option<serde_json::Value>,

    /// All remaining manifest fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl PackageManifest {
    /// Parse a manifest from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or missing required fields.
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a manifest from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Serialize the manifest back to JSON, two-space indented with a
    /// trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ManifestError> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }
}
