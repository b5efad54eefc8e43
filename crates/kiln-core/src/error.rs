use std::io;
use std::path::{Path, PathBuf};

use kiln_domain::ProjectError;
use serde::Serialize;

pub type Result<T, E = BuildError> = std::result::Result<T, E>;

/// Coarse classification surfaced to backend callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Selection,
    Io,
    Format,
    Cancelled,
}

/// Errors surfaced by a build. Every variant is fatal to the build that raised it.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("[KB100] invalid project configuration: {0}")]
    Configuration(String),
    #[error("[KB101] missing required project field `{0}`")]
    MissingField(&'static str),
    #[error("[KB102] entry point `{name}` in group [{group}] is malformed: {reason}")]
    EntryPoint {
        group: String,
        name: String,
        reason: String,
    },
    #[error("[KB103] package root {} does not exist", path.display())]
    MissingRoot { path: PathBuf },
    #[error("[KB200] symlink cycle: {} links back to {}", child.display(), ancestor.display())]
    SymlinkCycle { ancestor: PathBuf, child: PathBuf },
    #[error("[KB201] cannot read {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },
    #[error("[KB202] unsafe archive path `{path}`: {reason}")]
    UnsafePath { path: String, reason: &'static str },
    #[error("[KB300] failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("[KB301] {} changed while it was being archived", path.display())]
    ContentChanged { path: PathBuf },
    #[error("[KB302] failed to start hashing workers: {0}")]
    WorkerPool(String),
    #[error("[KB400] cannot serialize `{field}`: {reason}")]
    Format { field: String, reason: String },
    #[error("[KB500] build exceeded its deadline while {phase}")]
    DeadlineExceeded { phase: &'static str },
}

impl BuildError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_)
            | Self::MissingField(_)
            | Self::EntryPoint { .. }
            | Self::MissingRoot { .. } => ErrorKind::Configuration,
            Self::SymlinkCycle { .. } | Self::Unreadable { .. } | Self::UnsafePath { .. } => {
                ErrorKind::Selection
            }
            Self::Io { .. } | Self::ContentChanged { .. } | Self::WorkerPool(_) => ErrorKind::Io,
            Self::Format { .. } => ErrorKind::Format,
            Self::DeadlineExceeded { .. } => ErrorKind::Cancelled,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "KB100",
            Self::MissingField(_) => "KB101",
            Self::EntryPoint { .. } => "KB102",
            Self::MissingRoot { .. } => "KB103",
            Self::SymlinkCycle { .. } => "KB200",
            Self::Unreadable { .. } => "KB201",
            Self::UnsafePath { .. } => "KB202",
            Self::Io { .. } => "KB300",
            Self::ContentChanged { .. } => "KB301",
            Self::WorkerPool(_) => "KB302",
            Self::Format { .. } => "KB400",
            Self::DeadlineExceeded { .. } => "KB500",
        }
    }

    pub(crate) fn io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }

    pub(crate) fn zip(
        action: &'static str,
        path: &Path,
    ) -> impl FnOnce(zip::result::ZipError) -> Self {
        let path = path.to_path_buf();
        move |err| {
            let source = match err {
                zip::result::ZipError::Io(source) => source,
                other => io::Error::new(io::ErrorKind::Other, other.to_string()),
            };
            Self::Io {
                action,
                path,
                source,
            }
        }
    }

    pub(crate) fn format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Format {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<ProjectError> for BuildError {
    fn from(err: ProjectError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_error_families() {
        assert_eq!(
            BuildError::MissingField("version").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            BuildError::SymlinkCycle {
                ancestor: PathBuf::from("a"),
                child: PathBuf::from("a/b"),
            }
            .kind(),
            ErrorKind::Selection
        );
        assert_eq!(
            BuildError::format("Summary", "newline").kind(),
            ErrorKind::Format
        );
        assert_eq!(
            BuildError::DeadlineExceeded { phase: "writing" }.kind(),
            ErrorKind::Cancelled
        );
    }

    #[test]
    fn messages_carry_their_code() {
        let err = BuildError::EntryPoint {
            group: "console_scripts".into(),
            name: "mytool".into(),
            reason: "missing `:`".into(),
        };
        assert!(err.to_string().starts_with(&format!("[{}]", err.code())));
        assert!(err.to_string().contains("mytool"));
    }

    #[test]
    fn project_errors_become_configuration_errors() {
        let err: BuildError = ProjectError::Invalid {
            key: "project.name".into(),
            message: "expected a string".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
