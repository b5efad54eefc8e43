use std::path::PathBuf;

/// Failures raised while turning `pyproject.toml` into a [`crate::ProjectModel`].
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("pyproject.toml not found under {}", root.display())]
    MissingPyproject { root: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("invalid value for `{key}`: {message}")]
    Invalid { key: String, message: String },
}

impl ProjectError {
    pub(crate) fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}
