//! Internal dependency edge resolution.

use crate::workspace::WorkspaceSet;
use std::collections::HashSet;

/// Record, for each package, which of its declared dependencies are
/// satisfied by another member of the set.
///
/// This is a pure membership test over dependency names, so discovery order
/// does not matter — but the set must be fully populated before this runs,
/// since an edge may point at a member enumerated later than its dependent.
/// Dependency names matching no member are left alone; they are external
/// and resolved from the registry at install time.
pub fn resolve_internal_dependencies(set: &mut WorkspaceSet) {
    let names: HashSet<String> = set.packages.iter().map(|p| p.name.clone()).collect();

    for package in &mut set.packages {
        package.internal_dependencies = package
            .manifest
            .dependencies
            .keys()
            .filter(|name| names.contains(*name))
            .cloned()
            .collect();
    }
}
