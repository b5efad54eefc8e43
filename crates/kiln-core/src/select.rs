//! File selection: decides which project files land in each artifact.
//!
//! Precedence, strongest first:
//! 1. `exclude` globs remove a file no matter how it was selected;
//! 2. `include` globs and declared packages add files;
//! 3. version-control ignore rules hide package files unless an include
//!    names them explicitly.
//!
//! Symlinks are followed. A cycle aborts selection instead of looping.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use kiln_domain::{Format, IncludeSpec, PackageSpec, ProjectModel, PYPROJECT_FILE};
use tracing::{debug, warn};

use crate::archive::staged::STAGING_PREFIX;
use crate::error::{BuildError, Result};
use crate::naming::archive_path;

/// Root-level files shipped in every sdist alongside the declared packages.
const SDIST_ROOT_FILE_PREFIXES: &[&str] = &["LICENSE", "LICENCE", "COPYING", "NOTICE", "AUTHORS"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileSource {
    Path(PathBuf),
    Inline(Vec<u8>),
}

/// A file chosen for an artifact, before it is hashed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedFile {
    pub archive_path: String,
    pub source: FileSource,
    pub executable: bool,
}

impl SelectedFile {
    pub fn from_path(archive_path: String, path: PathBuf) -> Result<Self> {
        let executable = is_executable(&path)?;
        Ok(Self {
            archive_path,
            source: FileSource::Path(path),
            executable,
        })
    }

    pub fn inline(archive_path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            archive_path: archive_path.into(),
            source: FileSource::Inline(bytes.into()),
            executable: false,
        }
    }

    #[must_use]
    pub fn with_executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }
}

pub struct FileSelector<'a> {
    model: &'a ProjectModel,
    excludes: Override,
    includes: Vec<(&'a IncludeSpec, Override)>,
}

impl<'a> FileSelector<'a> {
    pub fn new(model: &'a ProjectModel) -> Result<Self> {
        let excludes = build_matcher(&model.root, model.excludes.iter().map(String::as_str))?;
        let includes = model
            .includes
            .iter()
            .map(|spec| Ok((spec, build_matcher(&model.root, [spec.pattern.as_str()])?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            model,
            excludes,
            includes,
        })
    }

    /// Returns the sorted, de-duplicated file set for `format`.
    pub fn select(&self, format: Format) -> Result<Vec<SelectedFile>> {
        let mut selected = BTreeMap::new();
        for package in &self.model.packages {
            if format == Format::Wheel && !package.formats.contains(Format::Wheel) {
                continue;
            }
            self.collect_package(package, format, &mut selected)?;
        }
        self.collect_includes(format, &mut selected)?;
        if format == Format::Sdist {
            self.collect_project_files(&mut selected)?;
        }
        debug!(
            format = ?format,
            files = selected.len(),
            root = %self.model.root.display(),
            "selected project files"
        );
        Ok(selected.into_values().collect())
    }

    /// True when `relative` (to the project root) or any parent matches an exclude glob.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        matches_path_or_parents(&self.excludes, relative)
    }

    fn collect_package(
        &self,
        package: &PackageSpec,
        format: Format,
        selected: &mut BTreeMap<String, SelectedFile>,
    ) -> Result<()> {
        let root = &self.model.root;
        let target = package.source_path(root);
        if !target.exists() {
            return Err(BuildError::MissingRoot { path: target });
        }
        let base = match format {
            Format::Wheel => package.source_dir(root),
            Format::Sdist => root.clone(),
        };
        let files = if target.is_file() {
            vec![target]
        } else {
            walk_files(&target, true)?
        };
        for path in files {
            let from_root = relative_to(&path, root)?;
            if self.is_excluded(from_root) {
                debug!(path = %from_root.display(), "excluded by pattern");
                continue;
            }
            let member = archive_path(relative_to(&path, &base)?)?;
            insert(selected, member, path)?;
        }
        Ok(())
    }

    fn collect_includes(
        &self,
        format: Format,
        selected: &mut BTreeMap<String, SelectedFile>,
    ) -> Result<()> {
        let wanted: Vec<_> = self
            .includes
            .iter()
            .filter(|(spec, _)| format == Format::Sdist || spec.formats.contains(format))
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }
        let root = &self.model.root;
        for (spec, matcher) in wanted {
            let start = root.join(include_walk_root(&spec.pattern));
            let candidates = if start.exists() {
                walk_files(&start, false)?
            } else {
                Vec::new()
            };
            let mut matched = 0usize;
            for path in &candidates {
                let from_root = relative_to(path, root)?;
                if !matches_path_or_parents(matcher, from_root) {
                    continue;
                }
                matched += 1;
                if self.is_excluded(from_root) {
                    debug!(path = %from_root.display(), "included file excluded by pattern");
                    continue;
                }
                insert(selected, archive_path(from_root)?, path.clone())?;
            }
            if matched == 0 {
                warn!(pattern = %spec.pattern, "include pattern matched no files");
            }
        }
        Ok(())
    }

    fn collect_project_files(&self, selected: &mut BTreeMap<String, SelectedFile>) -> Result<()> {
        let root = &self.model.root;
        let mut candidates = vec![PathBuf::from(PYPROJECT_FILE)];
        if let Some(path) = self.model.readme.as_ref().and_then(|r| r.path.clone()) {
            candidates.push(path);
        }
        if let Some(path) = self.model.license.as_ref().and_then(|l| l.file.clone()) {
            candidates.push(path);
        }
        let entries = fs::read_dir(root).map_err(BuildError::io("list", root))?;
        for entry in entries {
            let entry = entry.map_err(BuildError::io("list", root))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let upper = name.to_ascii_uppercase();
            if SDIST_ROOT_FILE_PREFIXES
                .iter()
                .any(|prefix| upper.starts_with(prefix))
            {
                candidates.push(PathBuf::from(name));
            }
        }
        for relative in candidates {
            let path = root.join(&relative);
            if !path.is_file() || self.is_excluded(&relative) {
                continue;
            }
            insert(selected, archive_path(&relative)?, path)?;
        }
        Ok(())
    }
}

fn insert(
    selected: &mut BTreeMap<String, SelectedFile>,
    member: String,
    path: PathBuf,
) -> Result<()> {
    if selected.contains_key(&member) {
        return Ok(());
    }
    let file = SelectedFile::from_path(member.clone(), path)?;
    selected.insert(member, file);
    Ok(())
}

fn build_matcher<'p>(root: &Path, patterns: impl IntoIterator<Item = &'p str>) -> Result<Override> {
    let mut builder = OverrideBuilder::new(root);
    for pattern in patterns {
        builder.add(pattern).map_err(|err| {
            BuildError::Configuration(format!("invalid glob `{pattern}`: {err}"))
        })?;
    }
    builder
        .build()
        .map_err(|err| BuildError::Configuration(format!("invalid glob set: {err}")))
}

/// Directory an include glob is confined to, relative to the project root.
///
/// Patterns with a `/` before their last character are anchored, so their
/// leading literal components name the only subtree that can match. Other
/// patterns match at any depth and need the whole root.
fn include_walk_root(pattern: &str) -> PathBuf {
    let pattern = pattern.trim_end_matches('/');
    if pattern.starts_with('!') || !pattern.contains('/') {
        return PathBuf::new();
    }
    pattern
        .trim_start_matches('/')
        .split('/')
        .take_while(|part| {
            !part.is_empty()
                && *part != "."
                && *part != ".."
                && !part.contains(['*', '?', '[', '{', '\\'])
        })
        .collect()
}

fn matches_path_or_parents(matcher: &Override, relative: &Path) -> bool {
    relative
        .ancestors()
        .filter(|path| !path.as_os_str().is_empty())
        .enumerate()
        .any(|(depth, path)| matcher.matched(path, depth > 0).is_whitelist())
}

fn relative_to<'p>(path: &'p Path, base: &Path) -> Result<&'p Path> {
    path.strip_prefix(base).map_err(|_| BuildError::UnsafePath {
        path: path.to_string_lossy().into_owned(),
        reason: "file lies outside its source directory",
    })
}

fn is_always_skipped(name: &OsStr) -> bool {
    let Some(name) = name.to_str() else {
        return false;
    };
    matches!(name, ".git" | "__pycache__" | ".DS_Store")
        || name.ends_with(".pyc")
        || name.ends_with(".pyo")
        || name.starts_with(STAGING_PREFIX)
}

/// Regular files under `start`, sorted by name, following symlinks.
fn walk_files(start: &Path, respect_vcs: bool) -> Result<Vec<PathBuf>> {
    let mut walker = WalkBuilder::new(start);
    walker
        .standard_filters(false)
        .follow_links(true)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry| !is_always_skipped(entry.file_name()));
    if respect_vcs {
        walker
            .git_ignore(true)
            .git_exclude(true)
            .ignore(true)
            .parents(true);
    }
    let mut files = Vec::new();
    for entry in walker.build() {
        let entry = entry.map_err(|err| walk_error(err, None))?;
        if entry.file_type().is_some_and(|kind| kind.is_file()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn walk_error(err: ignore::Error, context: Option<PathBuf>) -> BuildError {
    match err {
        ignore::Error::Loop { ancestor, child } => BuildError::SymlinkCycle { ancestor, child },
        ignore::Error::WithPath { path, err } => walk_error(*err, Some(path)),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            walk_error(*err, context)
        }
        other => BuildError::Unreadable {
            path: context.unwrap_or_default(),
            reason: other.to_string(),
        },
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let meta = fs::metadata(path).map_err(|err| BuildError::Unreadable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Ok(meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> Result<bool> {
    fs::metadata(path).map_err(|err| BuildError::Unreadable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Ok(false)
}
