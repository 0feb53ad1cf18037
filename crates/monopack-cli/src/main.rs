//! monopack - pack a monorepo's workspaces for production, but locally.
//!
//! Produces one tarball per non-private workspace member and rewrites each
//! tarball's manifest so workspace-internal dependencies point at the
//! sibling tarballs, allowing a registry-free install.

use anyhow::Result;
use clap::Parser;
use monopack_core::{NodePackageManager, PackOptions, DEFAULT_OUTPUT_DIR};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "monopack")]
#[command(version)]
#[command(about = "Pack monorepo workspaces into locally linked tarballs", long_about = None)]
struct Cli {
    /// Directory to place the produced tarballs in
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    target: PathBuf,

    /// Strip the version segment from tarball filenames
    #[arg(long = "no-version")]
    no_version: bool,

    /// Use absolute file paths in rewritten dependency references
    #[arg(long)]
    absolute: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = NodePackageManager::detect(std::env::current_dir()?);
    let options = PackOptions {
        output_dir: cli.target,
        strip_version: cli.no_version,
        absolute_paths: cli.absolute,
    };

    monopack_core::run(&manager, &options).await?;
    Ok(())
}
