//! Core metadata (`METADATA` / `PKG-INFO`), the `WHEEL` file and the dist-info bundle.

use std::fs;
use std::path::{Path, PathBuf};

use kiln_domain::{Person, ProjectModel};
use tracing::debug;

use crate::entry_points::EntryPointRegistry;
use crate::error::{BuildError, Result};
use crate::hash::FileEntry;
use crate::naming::{normalize_version, DistributionName};
use crate::tags::CompatibilityTag;

pub const METADATA_VERSION: &str = "2.3";
pub const WHEEL_VERSION: &str = "1.0";
pub const KILN_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const METADATA_FILE: &str = "METADATA";
pub const WHEEL_FILE: &str = "WHEEL";
pub const ENTRY_POINTS_FILE: &str = "entry_points.txt";
pub const RECORD_FILE: &str = "RECORD";
pub const PKG_INFO_FILE: &str = "PKG-INFO";

/// A validated view of the project ready to be serialized.
#[derive(Clone, Debug)]
pub struct CoreMetadata<'a> {
    model: &'a ProjectModel,
    /// Declared name, verbatim.
    pub name: String,
    /// PEP 440 normalized version.
    pub version: String,
    pub dist: DistributionName,
}

impl<'a> CoreMetadata<'a> {
    pub fn from_model(model: &'a ProjectModel) -> Result<Self> {
        let name = required(model.name.as_deref(), "name")?;
        let raw_version = required(model.version.as_deref(), "version")?;
        let version = normalize_version(raw_version)?;
        let dist = DistributionName::new(name, &version);
        if dist.name.is_empty() {
            return Err(BuildError::Configuration(format!(
                "project name `{name}` has no alphanumeric characters"
            )));
        }
        Ok(Self {
            model,
            name: name.to_string(),
            version,
            dist,
        })
    }

    pub fn model(&self) -> &'a ProjectModel {
        self.model
    }

    /// Renders the RFC 822-style document shared by `METADATA` and `PKG-INFO`.
    pub fn render(&self) -> Result<String> {
        let model = self.model;
        let mut lines = Vec::new();
        push_field(&mut lines, "Metadata-Version", METADATA_VERSION)?;
        push_field(&mut lines, "Name", &self.name)?;
        push_field(&mut lines, "Version", &self.version)?;
        if let Some(summary) = &model.description {
            push_field(&mut lines, "Summary", summary)?;
        }
        let homepage = model
            .urls
            .iter()
            .find(|(label, _)| is_homepage(label));
        if let Some((_, url)) = homepage {
            push_field(&mut lines, "Home-page", url)?;
        }
        if let Some(license) = &model.license {
            if !license.text.trim().is_empty() {
                lines.push(format!("License: {}", fold("License", license.text.trim_end())?));
            }
        }
        if !model.keywords.is_empty() {
            push_field(&mut lines, "Keywords", &model.keywords.join(","))?;
        }
        push_people(&mut lines, "Author", &model.authors)?;
        push_people(&mut lines, "Maintainer", &model.maintainers)?;
        if let Some(requires_python) = &model.requires_python {
            push_field(&mut lines, "Requires-Python", requires_python)?;
        }
        for classifier in &model.classifiers {
            push_field(&mut lines, "Classifier", classifier)?;
        }
        for extra in model.optional_dependencies.keys() {
            push_field(&mut lines, "Provides-Extra", extra)?;
        }
        for requirement in &model.dependencies {
            push_field(&mut lines, "Requires-Dist", requirement.trim())?;
        }
        for (extra, requirements) in &model.optional_dependencies {
            for requirement in requirements {
                push_field(&mut lines, "Requires-Dist", &with_extra_marker(requirement, extra))?;
            }
        }
        for (label, url) in &model.urls {
            if homepage.is_some_and(|(home, _)| home == label) {
                continue;
            }
            push_field(&mut lines, "Project-URL", &format!("{label}, {url}"))?;
        }
        if let Some(readme) = &model.readme {
            push_field(&mut lines, "Description-Content-Type", &readme.content_type)?;
        }

        let mut out = lines.join("\n");
        out.push('\n');
        if let Some(readme) = model.readme.as_ref().filter(|r| !r.text.is_empty()) {
            out.push('\n');
            out.push_str(&readme.text);
            if !readme.text.ends_with('\n') {
                out.push('\n');
            }
        }
        Ok(out)
    }
}

fn required<'m>(value: Option<&'m str>, field: &'static str) -> Result<&'m str> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(BuildError::MissingField(field))
}

fn is_homepage(label: &str) -> bool {
    let label: String = label
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    label.eq_ignore_ascii_case("homepage")
}

fn push_field(lines: &mut Vec<String>, field: &str, value: &str) -> Result<()> {
    if value.contains(['\n', '\r']) {
        return Err(BuildError::format(field, "value must fit on a single line"));
    }
    lines.push(format!("{field}: {value}"));
    Ok(())
}

fn push_people(lines: &mut Vec<String>, field: &str, people: &[Person]) -> Result<()> {
    let names: Vec<&str> = people
        .iter()
        .filter(|person| person.email.is_none())
        .filter_map(|person| person.name.as_deref())
        .collect();
    let emails: Vec<String> = people
        .iter()
        .filter_map(|person| {
            let email = person.email.as_deref()?;
            Some(match person.name.as_deref() {
                Some(name) => format!("{name} <{email}>"),
                None => email.to_string(),
            })
        })
        .collect();
    if !names.is_empty() {
        push_field(lines, field, &names.join(", "))?;
    }
    if !emails.is_empty() {
        push_field(lines, &format!("{field}-email"), &emails.join(", "))?;
    }
    Ok(())
}

/// Continuation lines get 8 spaces; blank lines become `       |`.
fn fold(field: &str, value: &str) -> Result<String> {
    if value.replace("\r\n", "\n").contains('\r') {
        return Err(BuildError::format(field, "value contains a bare carriage return"));
    }
    let mut lines = value.lines();
    let mut out = lines.next().unwrap_or_default().to_string();
    for line in lines {
        out.push('\n');
        if line.trim().is_empty() {
            out.push_str("       |");
        } else {
            out.push_str("        ");
            out.push_str(line);
        }
    }
    Ok(out)
}

fn with_extra_marker(requirement: &str, extra: &str) -> String {
    let requirement = requirement.trim();
    match requirement.split_once(';') {
        Some((spec, marker)) => {
            let marker = marker.trim();
            let marker = if marker.contains(" or ") {
                format!("({marker})")
            } else {
                marker.to_string()
            };
            format!("{}; {marker} and extra == \"{extra}\"", spec.trim_end())
        }
        None => format!("{requirement}; extra == \"{extra}\""),
    }
}

/// Renders the `WHEEL` file, expanding compressed tag sets into one `Tag` line each.
pub fn render_wheel_file(tag: &CompatibilityTag) -> String {
    let mut lines = vec![
        format!("Wheel-Version: {WHEEL_VERSION}"),
        format!("Generator: kiln {KILN_VERSION}"),
        format!("Root-Is-Purelib: {}", tag.is_pure()),
    ];
    for python in tag.python.split('.') {
        for abi in tag.abi.split('.') {
            for platform in tag.platform.split('.') {
                lines.push(format!("Tag: {python}-{abi}-{platform}"));
            }
        }
    }
    lines.push(String::new());
    lines.join("\n")
}

/// The `<dist>-<version>.dist-info/` contents minus `RECORD`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistInfoBundle {
    pub dir_name: String,
    pub metadata: String,
    pub wheel: String,
    pub entry_points: Option<String>,
}

impl DistInfoBundle {
    pub fn new(
        core: &CoreMetadata<'_>,
        registry: &EntryPointRegistry,
        tag: &CompatibilityTag,
    ) -> Result<Self> {
        Ok(Self {
            dir_name: core.dist.dist_info_dir(),
            metadata: core.render()?,
            wheel: render_wheel_file(tag),
            entry_points: registry.render(),
        })
    }

    pub fn record_path(&self) -> String {
        format!("{}/{RECORD_FILE}", self.dir_name)
    }

    /// Archive members in name order: `METADATA`, `WHEEL`, `entry_points.txt`.
    pub fn members(&self) -> Vec<FileEntry> {
        let mut members = vec![
            FileEntry::inline(
                format!("{}/{METADATA_FILE}", self.dir_name),
                self.metadata.as_bytes(),
            ),
            FileEntry::inline(format!("{}/{WHEEL_FILE}", self.dir_name), self.wheel.as_bytes()),
        ];
        if let Some(entry_points) = &self.entry_points {
            members.push(FileEntry::inline(
                format!("{}/{ENTRY_POINTS_FILE}", self.dir_name),
                entry_points.as_bytes(),
            ));
        }
        members
    }

    /// Writes the bundle as a plain directory under `parent`; returns its path.
    pub fn write_to(&self, parent: &Path) -> Result<PathBuf> {
        let dir = parent.join(&self.dir_name);
        fs::create_dir_all(&dir).map_err(BuildError::io("create", &dir))?;
        let mut files = vec![(METADATA_FILE, &self.metadata), (WHEEL_FILE, &self.wheel)];
        if let Some(entry_points) = &self.entry_points {
            files.push((ENTRY_POINTS_FILE, entry_points));
        }
        for (name, contents) in files {
            let path = dir.join(name);
            fs::write(&path, contents).map_err(BuildError::io("write", &path))?;
        }
        debug!(dir = %dir.display(), "wrote dist-info bundle");
        Ok(dir)
    }
}
