#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

pub mod archive;
pub mod backend;
pub mod builder;
pub mod editable;
pub mod entry_points;
mod error;
pub mod hash;
pub mod metadata;
pub mod naming;
pub mod select;
pub mod settings;
pub mod tags;

pub use builder::{ArtifactHandle, ArtifactKind, BuildState, Builder};
pub use entry_points::{EntryPoint, EntryPointRegistry};
pub use error::{BuildError, ErrorKind, Result};
pub use hash::{FileDigest, FileEntry};
pub use metadata::{CoreMetadata, DistInfoBundle};
pub use naming::DistributionName;
pub use select::{FileSelector, FileSource, SelectedFile};
pub use settings::{BuildSettings, ConfigSettings, Deadline};
pub use tags::CompatibilityTag;

pub use kiln_domain::{load_project, ProjectModel};
