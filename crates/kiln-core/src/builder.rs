//! Orchestrates one artifact build: select, hash and serialize, write, publish.

use std::path::{Path, PathBuf};

use kiln_domain::{Format, ProjectModel, PYPROJECT_FILE};
use serde::Serialize;
use toml_edit::{value, Array, DocumentMut, Item, Table};
use tracing::{debug, warn};

use crate::archive::{SdistWriter, WheelWriter};
use crate::editable::pth_member;
use crate::entry_points::{launcher_members, EntryPointRegistry};
use crate::error::Result;
use crate::hash::{hash_entries, FileEntry};
use crate::metadata::{CoreMetadata, DistInfoBundle, PKG_INFO_FILE};
use crate::select::FileSelector;
use crate::settings::{BuildSettings, Deadline};
use crate::tags::{resolve_tag, CompatibilityTag};

/// Backend recorded when an sdist has to synthesize its own `pyproject.toml`.
pub const DEFAULT_BUILD_BACKEND: &str = "kiln.api";
pub const DEFAULT_BUILD_REQUIRES: &str = "kiln";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Wheel,
    Sdist,
    EditableWheel,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wheel => "wheel",
            Self::Sdist => "sdist",
            Self::EditableWheel => "editable_wheel",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtifactHandle {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

impl ArtifactHandle {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildState {
    Selecting,
    HashingSerializing,
    Writing,
    Finalized,
    Failed,
}

/// Builds artifacts for one project. Nothing is written to the destination
/// until metadata, entry points and file selection have all succeeded.
pub struct Builder<'a> {
    model: &'a ProjectModel,
    settings: BuildSettings,
    state: BuildState,
}

impl<'a> Builder<'a> {
    pub fn new(model: &'a ProjectModel, settings: BuildSettings) -> Self {
        Self {
            model,
            settings,
            state: BuildState::Selecting,
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn build(&mut self, kind: ArtifactKind, dest_dir: &Path) -> Result<ArtifactHandle> {
        debug!(
            kind = kind.as_str(),
            root = %self.model.root.display(),
            dest = %dest_dir.display(),
            jobs = self.settings.jobs,
            "starting build"
        );
        match self.run(kind, dest_dir) {
            Ok(path) => {
                self.transition(BuildState::Finalized);
                Ok(ArtifactHandle { path, kind })
            }
            Err(err) => {
                self.transition(BuildState::Failed);
                warn!(kind = kind.as_str(), code = err.code(), %err, "build failed");
                Err(err)
            }
        }
    }

    /// Writes the dist-info bundle a wheel build would produce into `metadata_dir`.
    pub fn prepare_metadata(&mut self, metadata_dir: &Path) -> Result<String> {
        let result = self.write_metadata(metadata_dir);
        self.transition(if result.is_ok() {
            BuildState::Finalized
        } else {
            BuildState::Failed
        });
        result
    }

    fn write_metadata(&mut self, metadata_dir: &Path) -> Result<String> {
        self.transition(BuildState::HashingSerializing);
        let (core, registry, tag) = self.validate()?;
        let bundle = DistInfoBundle::new(&core, &registry, &tag)?;
        self.transition(BuildState::Writing);
        bundle.write_to(metadata_dir)?;
        Ok(bundle.dir_name)
    }

    fn run(&mut self, kind: ArtifactKind, dest_dir: &Path) -> Result<PathBuf> {
        let deadline = self.settings.deadline();
        self.transition(BuildState::Selecting);
        let (core, registry, tag) = self.validate()?;
        match kind {
            ArtifactKind::Wheel | ArtifactKind::EditableWheel => self.wheel(
                kind == ArtifactKind::EditableWheel,
                &core,
                &registry,
                &tag,
                dest_dir,
                deadline,
            ),
            ArtifactKind::Sdist => self.sdist(&core, dest_dir, deadline),
        }
    }

    /// Everything that can reject the project without touching the filesystem.
    fn validate(&self) -> Result<(CoreMetadata<'a>, EntryPointRegistry, CompatibilityTag)> {
        let core = CoreMetadata::from_model(self.model)?;
        let registry = EntryPointRegistry::from_model(self.model)?;
        let tag = resolve_tag(self.model)?;
        core.render()?;
        Ok((core, registry, tag))
    }

    fn wheel(
        &mut self,
        editable: bool,
        core: &CoreMetadata<'a>,
        registry: &EntryPointRegistry,
        tag: &CompatibilityTag,
        dest_dir: &Path,
        deadline: Deadline,
    ) -> Result<PathBuf> {
        let model = self.model;
        let selected = if editable {
            Vec::new()
        } else {
            FileSelector::new(model)?.select(Format::Wheel)?
        };
        deadline.check("selecting files")?;

        self.transition(BuildState::HashingSerializing);
        let mut payload = hash_entries(selected, self.settings.jobs)?;
        if editable {
            payload.push(pth_member(model, &core.dist)?);
        }
        payload.extend(launcher_members(registry, &core.dist)?);
        let bundle = DistInfoBundle::new(core, registry, tag)?;
        deadline.check("hashing files")?;

        self.transition(BuildState::Writing);
        WheelWriter::new(
            dest_dir,
            core.dist.wheel_filename(tag),
            self.settings.source_date_epoch,
        )
        .with_deadline(deadline)
        .write(payload, &bundle)
    }

    fn sdist(
        &mut self,
        core: &CoreMetadata<'a>,
        dest_dir: &Path,
        deadline: Deadline,
    ) -> Result<PathBuf> {
        let model = self.model;
        let selected = FileSelector::new(model)?.select(Format::Sdist)?;
        deadline.check("selecting files")?;

        self.transition(BuildState::HashingSerializing);
        let mut members = hash_entries(selected, self.settings.jobs)?;
        members.retain(|entry| entry.archive_path != PKG_INFO_FILE);
        members.push(FileEntry::inline(PKG_INFO_FILE, core.render()?));
        if !members
            .iter()
            .any(|entry| entry.archive_path == PYPROJECT_FILE)
        {
            debug!("project has no pyproject.toml; synthesizing one for the sdist");
            members.push(FileEntry::inline(PYPROJECT_FILE, fallback_pyproject(core)));
        }
        deadline.check("hashing files")?;

        self.transition(BuildState::Writing);
        SdistWriter::new(
            dest_dir,
            core.dist.sdist_filename(),
            core.dist.sdist_root(),
            self.settings.source_date_epoch,
        )
        .with_deadline(deadline)
        .write(members)
    }

    fn transition(&mut self, next: BuildState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "build state");
            self.state = next;
        }
    }
}

/// Minimal `pyproject.toml` so the sdist can be rebuilt by a PEP 517 frontend.
fn fallback_pyproject(core: &CoreMetadata<'_>) -> String {
    let build_system = &core.model().build_system;
    let requires: Array = if build_system.requires.is_empty() {
        std::iter::once(DEFAULT_BUILD_REQUIRES).collect()
    } else {
        build_system.requires.iter().map(String::as_str).collect()
    };
    let mut table = Table::new();
    table["requires"] = value(requires);
    table["build-backend"] = value(
        build_system
            .backend
            .as_deref()
            .unwrap_or(DEFAULT_BUILD_BACKEND),
    );

    let mut project = Table::new();
    project["name"] = value(core.name.as_str());
    project["version"] = value(core.version.as_str());

    let mut doc = DocumentMut::new();
    doc["build-system"] = Item::Table(table);
    doc["project"] = Item::Table(project);
    doc.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_domain::PackageSpec;
    use std::fs;
    use tempfile::tempdir;

    fn project(root: &Path) -> ProjectModel {
        fs::create_dir_all(root.join("demo")).unwrap();
        fs::write(root.join("demo/__init__.py"), "").unwrap();
        let mut model = ProjectModel::new(root);
        model.name = Some("demo".into());
        model.version = Some("0.1.0".into());
        model.packages = vec![PackageSpec::new("demo")];
        model
    }

    #[test]
    fn successful_builds_finalize() -> Result<()> {
        let temp = tempdir().unwrap();
        let model = project(temp.path());
        let mut builder = Builder::new(&model, BuildSettings::default().with_jobs(2));
        let handle = builder.build(ArtifactKind::Wheel, &temp.path().join("dist"))?;
        assert_eq!(handle.file_name(), "demo-0.1.0-py3-none-any.whl");
        assert_eq!(handle.kind, ArtifactKind::Wheel);
        assert_eq!(builder.state(), BuildState::Finalized);
        Ok(())
    }

    #[test]
    fn failures_leave_the_destination_untouched() {
        let temp = tempdir().unwrap();
        let mut model = project(temp.path());
        model.version = None;
        let dist = temp.path().join("dist");
        let mut builder = Builder::new(&model, BuildSettings::default());
        let err = builder.build(ArtifactKind::Sdist, &dist).expect_err("no version");
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert_eq!(builder.state(), BuildState::Failed);
        assert!(!dist.exists());
    }

    #[test]
    fn sdists_synthesize_a_missing_pyproject() -> Result<()> {
        let temp = tempdir().unwrap();
        let model = project(temp.path());
        let core = CoreMetadata::from_model(&model)?;
        let text = fallback_pyproject(&core);
        let doc: DocumentMut = text.parse().unwrap();
        assert_eq!(doc["build-system"]["build-backend"].as_str(), Some(DEFAULT_BUILD_BACKEND));
        assert_eq!(doc["project"]["version"].as_str(), Some("0.1.0"));

        let handle = Builder::new(&model, BuildSettings::default())
            .build(ArtifactKind::Sdist, &temp.path().join("dist"))?;
        assert_eq!(handle.file_name(), "demo-0.1.0.tar.gz");
        Ok(())
    }

    #[test]
    fn prepare_metadata_writes_the_bundle() -> Result<()> {
        let temp = tempdir().unwrap();
        let model = project(temp.path());
        let out = temp.path().join("meta");
        let dir_name = Builder::new(&model, BuildSettings::default()).prepare_metadata(&out)?;
        assert_eq!(dir_name, "demo-0.1.0.dist-info");
        assert!(out.join(&dir_name).join("METADATA").is_file());
        assert!(out.join(&dir_name).join("WHEEL").is_file());
        assert!(!out.join(&dir_name).join("entry_points.txt").exists());
        Ok(())
    }
}
