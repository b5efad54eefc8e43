use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::{Compression, GzBuilder};
use tar::{EntryType, Header};
use tracing::debug;

use super::{member_mode, StagedArtifact};
use crate::error::{BuildError, Result};
use crate::hash::{stream_verified, FileEntry};
use crate::naming::validate_archive_path;
use crate::settings::Deadline;

/// Writes a gzip-compressed tar with every member under `<name>-<version>/`.
pub struct SdistWriter<'a> {
    dest_dir: &'a Path,
    file_name: String,
    root_dir: String,
    mtime: u64,
    deadline: Deadline,
}

impl<'a> SdistWriter<'a> {
    pub fn new(
        dest_dir: &'a Path,
        file_name: impl Into<String>,
        root_dir: impl Into<String>,
        source_date_epoch: u64,
    ) -> Self {
        Self {
            dest_dir,
            file_name: file_name.into(),
            root_dir: root_dir.into(),
            mtime: source_date_epoch,
            deadline: Deadline::none(),
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// `members` carry paths relative to the sdist root; later duplicates are dropped.
    pub fn write(&self, members: Vec<FileEntry>) -> Result<PathBuf> {
        let mut ordered = BTreeMap::new();
        for entry in members {
            let path = format!("{}/{}", self.root_dir, entry.archive_path);
            validate_archive_path(&path)?;
            ordered.entry(path).or_insert(entry);
        }

        let mut staged = StagedArtifact::create(self.dest_dir, &self.file_name)?;
        let temp_path = staged.path().to_path_buf();
        {
            let encoder = GzBuilder::new()
                .mtime(0)
                .write(staged.as_file_mut(), Compression::default());
            let mut builder = tar::Builder::new(encoder);
            for (path, entry) in &ordered {
                self.deadline.check("writing the sdist")?;
                let mut header = self.header(entry);
                stream_verified(entry, |reader| {
                    builder
                        .append_data(&mut header, path, reader)
                        .map_err(BuildError::io("write", &temp_path))
                })?;
            }
            let encoder = builder
                .into_inner()
                .map_err(BuildError::io("finish", &temp_path))?;
            let file = encoder
                .finish()
                .map_err(BuildError::io("compress", &temp_path))?;
            file.flush().map_err(BuildError::io("write", &temp_path))?;
        }
        debug!(sdist = %self.file_name, members = ordered.len(), "wrote sdist archive");
        staged.persist()
    }

    fn header(&self, entry: &FileEntry) -> Header {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(member_mode(entry.executable));
        header.set_size(entry.size);
        header.set_mtime(self.mtime);
        header.set_uid(0);
        header.set_gid(0);
        let _ = header.set_username("");
        let _ = header.set_groupname("");
        header
    }
}
