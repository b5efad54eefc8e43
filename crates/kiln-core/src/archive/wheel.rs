use std::collections::BTreeSet;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::{member_mode, zip_datetime, StagedArtifact};
use crate::error::{BuildError, Result};
use crate::hash::{render_record, stream_verified, FileEntry};
use crate::metadata::DistInfoBundle;
use crate::settings::Deadline;

/// Writes a wheel: payload, then dist-info members, then `RECORD`.
pub struct WheelWriter<'a> {
    dest_dir: &'a Path,
    file_name: String,
    timestamp: DateTime,
    deadline: Deadline,
}

impl<'a> WheelWriter<'a> {
    pub fn new(dest_dir: &'a Path, file_name: impl Into<String>, source_date_epoch: u64) -> Self {
        Self {
            dest_dir,
            file_name: file_name.into(),
            timestamp: zip_datetime(source_date_epoch),
            deadline: Deadline::none(),
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn write(&self, mut payload: Vec<FileEntry>, bundle: &DistInfoBundle) -> Result<PathBuf> {
        payload.sort_by(|a, b| a.archive_path.cmp(&b.archive_path));
        let mut members = payload;
        members.extend(bundle.members());
        let record_path = bundle.record_path();
        ensure_unique(&members, &record_path)?;
        let record = FileEntry::inline(record_path.as_str(), render_record(&members, &record_path));

        let mut staged = StagedArtifact::create(self.dest_dir, &self.file_name)?;
        let temp_path = staged.path().to_path_buf();
        {
            let mut zip = ZipWriter::new(BufWriter::new(staged.as_file_mut()));
            for entry in members.iter().chain(std::iter::once(&record)) {
                self.deadline.check("writing the wheel")?;
                self.write_member(&mut zip, entry, &temp_path)?;
            }
            let mut out = zip.finish().map_err(BuildError::zip("finish", &temp_path))?;
            out.flush().map_err(BuildError::io("write", &temp_path))?;
        }
        debug!(
            wheel = %self.file_name,
            members = members.len() + 1,
            "wrote wheel archive"
        );
        staged.persist()
    }

    fn write_member<W: Write + io::Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        entry: &FileEntry,
        temp_path: &Path,
    ) -> Result<()> {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(self.timestamp)
            .unix_permissions(member_mode(entry.executable));
        zip.start_file(entry.archive_path.as_str(), options)
            .map_err(BuildError::zip("write", temp_path))?;
        stream_verified(entry, |reader| {
            io::copy(reader, zip).map_err(BuildError::io("write", temp_path))
        })?;
        Ok(())
    }
}

fn ensure_unique(members: &[FileEntry], record_path: &str) -> Result<()> {
    let mut seen = BTreeSet::new();
    for entry in members {
        if entry.archive_path == record_path || !seen.insert(entry.archive_path.as_str()) {
            return Err(BuildError::format(
                entry.archive_path.clone(),
                "archive member is produced twice",
            ));
        }
    }
    Ok(())
}
