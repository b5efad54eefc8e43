//! Content digests and the RECORD manifest.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{BuildError, Result};
use crate::select::{FileSource, SelectedFile};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileDigest([u8; 32]);

impl FileDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `sha256=<urlsafe-b64-nopad>`, the form RECORD lines carry.
    pub fn record_value(&self) -> String {
        format!("sha256={}", URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.record_value())
    }
}

impl fmt::Display for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.record_value())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> FileDigest {
    FileDigest(Sha256::digest(bytes).into())
}

pub fn hash_reader(reader: impl Read) -> io::Result<(FileDigest, u64)> {
    let mut reader = HashingReader::new(reader);
    io::copy(&mut reader, &mut io::sink())?;
    let (digest, size, _) = reader.finish();
    Ok((digest, size))
}

pub fn hash_file(path: &Path) -> Result<(FileDigest, u64)> {
    let file = File::open(path).map_err(|err| BuildError::Unreadable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    hash_reader(file).map_err(BuildError::io("read", path))
}

/// Reader adapter that hashes and counts every byte passing through it.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    bytes: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    pub fn finish(self) -> (FileDigest, u64, R) {
        (FileDigest(self.hasher.finalize().into()), self.bytes, self.inner)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.hasher.update(&buf[..read]);
        self.bytes += read as u64;
        Ok(read)
    }
}

/// A selected file with its size and digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub archive_path: String,
    pub source: FileSource,
    pub executable: bool,
    pub size: u64,
    pub digest: FileDigest,
}

impl FileEntry {
    pub fn inline(archive_path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        Self {
            archive_path: archive_path.into(),
            digest: hash_bytes(&bytes),
            size: bytes.len() as u64,
            source: FileSource::Inline(bytes),
            executable: false,
        }
    }

    #[must_use]
    pub fn with_executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }

    pub fn record_line(&self) -> String {
        format!(
            "{},{},{}",
            record_field(&self.archive_path),
            self.digest.record_value(),
            self.size
        )
    }
}

fn hash_entry(file: SelectedFile) -> Result<FileEntry> {
    let (digest, size) = match &file.source {
        FileSource::Path(path) => hash_file(path)?,
        FileSource::Inline(bytes) => (hash_bytes(bytes), bytes.len() as u64),
    };
    Ok(FileEntry {
        archive_path: file.archive_path,
        source: file.source,
        executable: file.executable,
        size,
        digest,
    })
}

/// Hashes `files` on a pool of `jobs` workers, preserving input order.
pub fn hash_entries(files: Vec<SelectedFile>, jobs: usize) -> Result<Vec<FileEntry>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .thread_name(|index| format!("kiln-hash-{index}"))
        .build()
        .map_err(|err| BuildError::WorkerPool(err.to_string()))?;
    debug!(files = files.len(), jobs, "hashing selected files");
    pool.install(|| files.into_par_iter().map(hash_entry).collect())
}

/// Streams an entry's bytes through `write`, then checks they still match the
/// digest taken during hashing.
pub(crate) fn stream_verified<T>(
    entry: &FileEntry,
    write: impl FnOnce(&mut dyn Read) -> Result<T>,
) -> Result<T> {
    let path = match &entry.source {
        FileSource::Inline(bytes) => {
            let mut reader = bytes.as_slice();
            return write(&mut reader);
        }
        FileSource::Path(path) => path,
    };
    let file = File::open(path).map_err(|err| BuildError::Unreadable {
        path: path.clone(),
        reason: err.to_string(),
    })?;
    let mut reader = HashingReader::new(file.take(entry.size));
    let value = write(&mut reader)?;
    let (digest, size, rest) = reader.finish();
    let mut extra = [0u8; 1];
    let grew = rest
        .into_inner()
        .read(&mut extra)
        .map_err(BuildError::io("read", path))?
        > 0;
    if grew || size != entry.size || digest != entry.digest {
        return Err(BuildError::ContentChanged { path: path.clone() });
    }
    Ok(value)
}

/// Renders RECORD: one `path,digest,size` line per entry, then `record_path,,`.
pub fn render_record(entries: &[FileEntry], record_path: &str) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.record_line());
        out.push('\n');
    }
    out.push_str(&record_field(record_path));
    out.push_str(",,\n");
    out
}

fn record_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
