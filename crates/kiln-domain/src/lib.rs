#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

mod error;
pub mod project;
pub mod pyproject;

pub use error::ProjectError;
pub use project::{
    BuildSystem, Format, FormatSet, IncludeSpec, License, PackageSpec, Person, ProjectModel,
    Readme, ToolConfig, CONSOLE_SCRIPTS_GROUP, GUI_SCRIPTS_GROUP,
};
pub use pyproject::{load_project, parse_project, PYPROJECT_FILE, TOOL_TABLE};
