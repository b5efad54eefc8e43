//! PEP 517 hooks. Every hook names its project root explicitly instead of
//! relying on the process working directory.

use std::path::Path;

use kiln_domain::{load_project, ProjectModel};
use tracing::debug;

use crate::builder::{ArtifactKind, Builder};
use crate::error::Result;
use crate::settings::{BuildSettings, ConfigSettings};

fn load(project_root: &Path) -> Result<ProjectModel> {
    let model = load_project(project_root)?;
    debug!(root = %model.root.display(), "loaded project");
    Ok(model)
}

fn build(
    project_root: &Path,
    kind: ArtifactKind,
    directory: &Path,
    config: &ConfigSettings,
) -> Result<String> {
    let model = load(project_root)?;
    let settings = BuildSettings::from_config(config)?;
    let handle = Builder::new(&model, settings).build(kind, directory)?;
    Ok(handle.file_name())
}

pub fn get_requires_for_build_wheel(_config: &ConfigSettings) -> Vec<String> {
    Vec::new()
}

pub fn get_requires_for_build_sdist(_config: &ConfigSettings) -> Vec<String> {
    Vec::new()
}

pub fn get_requires_for_build_editable(_config: &ConfigSettings) -> Vec<String> {
    Vec::new()
}

/// Writes `<name>-<version>.dist-info/` into `metadata_directory` and returns its name.
pub fn prepare_metadata_for_build_wheel(
    project_root: &Path,
    metadata_directory: &Path,
    config: &ConfigSettings,
) -> Result<String> {
    let model = load(project_root)?;
    let settings = BuildSettings::from_config(config)?;
    Builder::new(&model, settings).prepare_metadata(metadata_directory)
}

pub fn prepare_metadata_for_build_editable(
    project_root: &Path,
    metadata_directory: &Path,
    config: &ConfigSettings,
) -> Result<String> {
    prepare_metadata_for_build_wheel(project_root, metadata_directory, config)
}

/// Builds a wheel into `wheel_directory` and returns its file name.
///
/// A `metadata_directory` from an earlier `prepare_metadata_for_build_wheel`
/// call is accepted but not reused: the wheel always regenerates its
/// dist-info from the project.
pub fn build_wheel(
    project_root: &Path,
    wheel_directory: &Path,
    config: &ConfigSettings,
    metadata_directory: Option<&Path>,
) -> Result<String> {
    if let Some(dir) = metadata_directory {
        debug!(metadata_directory = %dir.display(), "regenerating metadata for wheel");
    }
    build(project_root, ArtifactKind::Wheel, wheel_directory, config)
}

pub fn build_sdist(
    project_root: &Path,
    sdist_directory: &Path,
    config: &ConfigSettings,
) -> Result<String> {
    build(project_root, ArtifactKind::Sdist, sdist_directory, config)
}

pub fn build_editable(
    project_root: &Path,
    wheel_directory: &Path,
    config: &ConfigSettings,
    metadata_directory: Option<&Path>,
) -> Result<String> {
    if let Some(dir) = metadata_directory {
        debug!(metadata_directory = %dir.display(), "regenerating metadata for editable wheel");
    }
    build(
        project_root,
        ArtifactKind::EditableWheel,
        wheel_directory,
        config,
    )
}
