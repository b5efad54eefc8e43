//! Editable wheels: a `.pth` file pointing the interpreter at the source tree.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use kiln_domain::{Format, ProjectModel};
use tracing::{debug, warn};

use crate::error::{BuildError, Result};
use crate::hash::FileEntry;
use crate::naming::DistributionName;

/// Distinct, canonical import roots of every wheel-format package, sorted.
pub fn editable_roots(model: &ProjectModel) -> Result<Vec<PathBuf>> {
    let mut roots = BTreeSet::new();
    for package in &model.packages {
        if !package.formats.contains(Format::Wheel) {
            continue;
        }
        let target = package.source_path(&model.root);
        if !target.exists() {
            return Err(BuildError::MissingRoot { path: target });
        }
        let dir = package.source_dir(&model.root);
        let dir = fs::canonicalize(&dir).map_err(BuildError::io("resolve", &dir))?;
        roots.insert(dir);
    }
    if roots.is_empty() {
        warn!(
            root = %model.root.display(),
            "no wheel packages declared; linking the project root"
        );
        let root = fs::canonicalize(&model.root).map_err(BuildError::io("resolve", &model.root))?;
        roots.insert(root);
    }
    Ok(roots.into_iter().collect())
}

/// `<name>.pth` listing one absolute source directory per line.
pub fn pth_member(model: &ProjectModel, dist: &DistributionName) -> Result<FileEntry> {
    let mut contents = String::new();
    for root in editable_roots(model)? {
        let line = root.to_str().ok_or_else(|| BuildError::UnsafePath {
            path: root.to_string_lossy().into_owned(),
            reason: "editable source paths must be valid UTF-8",
        })?;
        if line.contains(['\n', '\r']) {
            return Err(BuildError::UnsafePath {
                path: line.to_string(),
                reason: "editable source paths cannot contain line breaks",
            });
        }
        contents.push_str(line);
        contents.push('\n');
    }
    debug!(pth = %contents.trim_end(), "editable redirection");
    Ok(FileEntry::inline(format!("{}.pth", dist.name), contents))
}
