//! Immutable description of a Python project as seen by the build backend.
//!
//! A [`ProjectModel`] is built once (usually by [`crate::load_project`]) and
//! passed by reference into every build component. Nothing downstream mutates
//! it, and every path it carries is either absolute or relative to
//! [`ProjectModel::root`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONSOLE_SCRIPTS_GROUP: &str = "console_scripts";
pub const GUI_SCRIPTS_GROUP: &str = "gui_scripts";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProjectModel {
    /// Absolute project directory; every relative path below resolves against it.
    pub root: PathBuf,
    pub name: Option<String>,
    pub version: Option<String>,
    /// One-line summary (`[project].description`).
    pub description: Option<String>,
    pub readme: Option<Readme>,
    pub requires_python: Option<String>,
    pub license: Option<License>,
    pub authors: Vec<Person>,
    pub maintainers: Vec<Person>,
    pub keywords: Vec<String>,
    pub classifiers: Vec<String>,
    pub urls: BTreeMap<String, String>,
    /// Dependency specifiers, recorded verbatim.
    pub dependencies: Vec<String>,
    pub optional_dependencies: BTreeMap<String, Vec<String>>,
    /// Entry points keyed by group, then by entry name; values are raw targets.
    pub entry_points: BTreeMap<String, BTreeMap<String, String>>,
    pub packages: Vec<PackageSpec>,
    pub includes: Vec<IncludeSpec>,
    pub excludes: Vec<String>,
    pub build_system: BuildSystem,
    pub tool: ToolConfig,
}

impl ProjectModel {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn has_entry_points(&self) -> bool {
        self.entry_points.values().any(|group| !group.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Readme {
    /// Path relative to the project root when the readme came from a file.
    pub path: Option<PathBuf>,
    pub content_type: String,
    pub text: String,
}

impl Readme {
    pub fn content_type_for(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("md" | "markdown") => "text/markdown",
            Some("rst") => "text/x-rst",
            _ => "text/plain",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct License {
    pub text: String,
    /// Set when the text was read from a file relative to the project root.
    pub file: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Person {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Which artifact kinds a package or include feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Sdist,
    Wheel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatSet {
    pub sdist: bool,
    pub wheel: bool,
}

impl FormatSet {
    pub const BOTH: Self = Self {
        sdist: true,
        wheel: true,
    };
    pub const SDIST: Self = Self {
        sdist: true,
        wheel: false,
    };
    pub const WHEEL: Self = Self {
        sdist: false,
        wheel: true,
    };

    pub fn contains(self, format: Format) -> bool {
        match format {
            Format::Sdist => self.sdist,
            Format::Wheel => self.wheel,
        }
    }
}

impl Default for FormatSet {
    fn default() -> Self {
        Self::BOTH
    }
}

/// An importable directory (or single module file) shipped by the project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageSpec {
    /// Path of the package relative to `from`, e.g. `pkg` or `mod.py`.
    pub include: String,
    /// Directory holding the package, relative to the project root (`src`).
    pub from: Option<String>,
    pub formats: FormatSet,
}

impl PackageSpec {
    pub fn new(include: impl Into<String>) -> Self {
        Self {
            include: include.into(),
            from: None,
            formats: FormatSet::BOTH,
        }
    }

    #[must_use]
    pub fn from_dir(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Directory the package is importable from.
    pub fn source_dir(&self, root: &Path) -> PathBuf {
        match self.from.as_deref() {
            Some(from) if !from.is_empty() => root.join(from),
            _ => root.to_path_buf(),
        }
    }

    pub fn source_path(&self, root: &Path) -> PathBuf {
        self.source_dir(root).join(&self.include)
    }
}

/// An extra file glob, relative to the project root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncludeSpec {
    pub pattern: String,
    pub formats: FormatSet,
}

impl IncludeSpec {
    pub fn new(pattern: impl Into<String>, formats: FormatSet) -> Self {
        Self {
            pattern: pattern.into(),
            formats,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildSystem {
    pub requires: Vec<String>,
    pub backend: Option<String>,
}

/// `[tool.kiln]` settings that do not fit elsewhere in the model.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolConfig {
    /// Fixed compatibility tag such as `cp312-cp312-manylinux_2_17_x86_64`.
    pub tag: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_paths_resolve_against_from_dir() {
        let root = Path::new("/work/demo");
        let plain = PackageSpec::new("demo");
        assert_eq!(plain.source_dir(root), root);
        assert_eq!(plain.source_path(root), root.join("demo"));

        let nested = PackageSpec::new("demo").from_dir("src");
        assert_eq!(nested.source_dir(root), root.join("src"));
        assert_eq!(nested.source_path(root), root.join("src/demo"));
    }

    #[test]
    fn readme_content_type_follows_extension() {
        assert_eq!(
            Readme::content_type_for(Path::new("README.md")),
            "text/markdown"
        );
        assert_eq!(
            Readme::content_type_for(Path::new("README.RST")),
            "text/x-rst"
        );
        assert_eq!(Readme::content_type_for(Path::new("README")), "text/plain");
    }

    #[test]
    fn entry_points_ignore_empty_groups() {
        let mut model = ProjectModel::new("/work/demo");
        assert!(!model.has_entry_points());
        model
            .entry_points
            .insert(CONSOLE_SCRIPTS_GROUP.to_string(), BTreeMap::new());
        assert!(!model.has_entry_points());
        model
            .entry_points
            .get_mut(CONSOLE_SCRIPTS_GROUP)
            .unwrap()
            .insert("demo".into(), "demo.cli:main".into());
        assert!(model.has_entry_points());
    }
}
