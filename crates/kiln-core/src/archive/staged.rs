use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{BuildError, Result};

/// Prefix of in-progress artifacts; the file selector never picks these up.
pub const STAGING_PREFIX: &str = ".kiln-";

/// An artifact being written next to its final location.
///
/// The temp file lives in the destination directory so publishing is a
/// same-filesystem rename. Dropping without [`persist`](Self::persist)
/// deletes it.
#[derive(Debug)]
pub struct StagedArtifact {
    file: NamedTempFile,
    destination: PathBuf,
}

impl StagedArtifact {
    pub fn create(dest_dir: &Path, file_name: &str) -> Result<Self> {
        fs::create_dir_all(dest_dir).map_err(BuildError::io("create", dest_dir))?;
        let file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".part")
            .tempfile_in(dest_dir)
            .map_err(BuildError::io("stage an artifact in", dest_dir))?;
        Ok(Self {
            file,
            destination: dest_dir.join(file_name),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn as_file_mut(&mut self) -> &mut File {
        self.file.as_file_mut()
    }

    /// Flushes to disk and renames into place, replacing any previous artifact.
    pub fn persist(self) -> Result<PathBuf> {
        let Self { file, destination } = self;
        file.as_file()
            .sync_all()
            .map_err(BuildError::io("sync", file.path()))?;
        file.persist(&destination).map_err(|err| BuildError::Io {
            action: "publish",
            path: destination.clone(),
            source: err.error,
        })?;
        debug!(path = %destination.display(), "published artifact");
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn persist_moves_the_file_into_place() -> Result<()> {
        let temp = tempdir().unwrap();
        let mut staged = StagedArtifact::create(temp.path(), "demo.whl")?;
        assert!(staged
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(STAGING_PREFIX)));
        staged.as_file_mut().write_all(b"payload").unwrap();
        let path = staged.persist()?;
        assert_eq!(path, temp.path().join("demo.whl"));
        assert_eq!(fs::read(&path).unwrap(), b"payload");
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
        Ok(())
    }

    #[test]
    fn dropping_discards_the_partial_file() -> Result<()> {
        let temp = tempdir().unwrap();
        let mut staged = StagedArtifact::create(&temp.path().join("dist"), "demo.whl")?;
        staged.as_file_mut().write_all(b"partial").unwrap();
        drop(staged);
        assert_eq!(fs::read_dir(temp.path().join("dist")).unwrap().count(), 0);
        Ok(())
    }
}
