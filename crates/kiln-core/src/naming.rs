//! Distribution naming: normalized names, artifact file names and archive paths.

use std::path::{Component, Path};
use std::str::FromStr;

use pep440_rs::Version;

use crate::error::{BuildError, Result};
use crate::tags::CompatibilityTag;

pub const WHEEL_EXTENSION: &str = "whl";
pub const SDIST_EXTENSION: &str = "tar.gz";

/// Lowercases `name` and collapses every run of non-alphanumeric characters to `_`.
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut pending_separator = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !normalized.is_empty() {
                normalized.push('_');
            }
            pending_separator = false;
            normalized.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    normalized
}

/// Parses `raw` as a PEP 440 version and returns its canonical spelling.
pub fn normalize_version(raw: &str) -> Result<String> {
    let version = Version::from_str(raw.trim()).map_err(|err| {
        BuildError::Configuration(format!("`{raw}` is not a valid PEP 440 version: {err}"))
    })?;
    Ok(version.to_string())
}

/// Name and version as they appear in file and directory names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistributionName {
    pub name: String,
    pub version: String,
}

impl DistributionName {
    /// `version` must already be PEP 440 normalized.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: normalize_name(name),
            version: version.replace('-', "_"),
        }
    }

    pub fn stem(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn dist_info_dir(&self) -> String {
        format!("{}.dist-info", self.stem())
    }

    pub fn data_dir(&self) -> String {
        format!("{}.data", self.stem())
    }

    pub fn wheel_filename(&self, tag: &CompatibilityTag) -> String {
        format!("{}-{tag}.{WHEEL_EXTENSION}", self.stem())
    }

    pub fn sdist_filename(&self) -> String {
        format!("{}.{SDIST_EXTENSION}", self.stem())
    }

    /// Top-level directory every sdist member lives under.
    pub fn sdist_root(&self) -> String {
        self.stem()
    }
}

/// Converts a relative filesystem path into a forward-slash archive member path.
pub fn archive_path(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| BuildError::UnsafePath {
                    path: relative.to_string_lossy().into_owned(),
                    reason: "path is not valid UTF-8",
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(BuildError::UnsafePath {
                    path: relative.to_string_lossy().into_owned(),
                    reason: "parent-directory segments are not allowed",
                })
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(BuildError::UnsafePath {
                    path: relative.to_string_lossy().into_owned(),
                    reason: "archive members must be relative",
                })
            }
        }
    }
    let joined = parts.join("/");
    validate_archive_path(&joined)?;
    Ok(joined)
}

/// Rejects member names that are empty, absolute, or escape the archive root.
pub fn validate_archive_path(path: &str) -> Result<()> {
    let unsafe_path = |reason| BuildError::UnsafePath {
        path: path.to_string(),
        reason,
    };
    if path.is_empty() {
        return Err(unsafe_path("archive member path is empty"));
    }
    if path.starts_with('/') || path.contains('\\') || path.as_bytes().get(1) == Some(&b':') {
        return Err(unsafe_path("archive members must be relative forward-slash paths"));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(unsafe_path("parent-directory segments are not allowed"));
    }
    if path.split('/').any(str::is_empty) {
        return Err(unsafe_path("empty path segments are not allowed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn normalizes_names_to_lowercase_with_single_separators() {
        assert_eq!(normalize_name("Example_Pkg"), "example_pkg");
        assert_eq!(normalize_name("My--Odd..Name"), "my_odd_name");
        assert_eq!(normalize_name("zope.interface"), "zope_interface");
        assert_eq!(normalize_name("-leading-"), "leading");
    }

    #[test]
    fn versions_use_canonical_pep440_spelling() -> Result<()> {
        assert_eq!(normalize_version("1.0")?, "1.0");
        assert_eq!(normalize_version("01.2")?, "1.2");
        assert_eq!(normalize_version("1.0RC1")?, "1.0rc1");
        let err = normalize_version("not a version").expect_err("invalid");
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        Ok(())
    }

    #[test]
    fn distribution_names_drive_file_names() {
        let dist = DistributionName::new("Example_Pkg", "1.0");
        assert_eq!(dist.stem(), "example_pkg-1.0");
        assert_eq!(dist.dist_info_dir(), "example_pkg-1.0.dist-info");
        assert_eq!(dist.data_dir(), "example_pkg-1.0.data");
        assert_eq!(dist.sdist_filename(), "example_pkg-1.0.tar.gz");
        assert_eq!(
            dist.wheel_filename(&CompatibilityTag::universal()),
            "example_pkg-1.0-py3-none-any.whl"
        );
    }

    #[test]
    fn archive_paths_are_relative_forward_slash() -> Result<()> {
        assert_eq!(archive_path(Path::new("pkg/sub/mod.py"))?, "pkg/sub/mod.py");
        assert_eq!(archive_path(Path::new("./pkg/mod.py"))?, "pkg/mod.py");
        assert!(archive_path(Path::new("../escape.py")).is_err());
        assert!(archive_path(Path::new("pkg/../../escape.py")).is_err());
        assert!(archive_path(&PathBuf::from("/etc/passwd")).is_err());
        assert!(archive_path(Path::new("")).is_err());
        Ok(())
    }

    #[test]
    fn validate_rejects_escaping_member_names() {
        assert!(validate_archive_path("pkg/__init__.py").is_ok());
        assert!(validate_archive_path("/abs").is_err());
        assert!(validate_archive_path("a/../b").is_err());
        assert!(validate_archive_path("a//b").is_err());
        assert!(validate_archive_path("C:/windows").is_err());
        assert!(validate_archive_path("a\\b").is_err());
    }
}
