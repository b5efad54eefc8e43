#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

pub fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .expect("workspace root")
        .to_path_buf()
}

pub fn fixture_source(name: &str) -> PathBuf {
    workspace_root().join("fixtures").join(name)
}

/// Copies `fixtures/<name>` into a fresh temp dir and returns the project root.
pub fn prepare_fixture(name: &str) -> (TempDir, PathBuf) {
    let temp = tempfile::Builder::new()
        .prefix("kiln-test-")
        .tempdir()
        .expect("tempdir");
    let dst = temp.path().join(name);
    copy_dir_all(&fixture_source(name), &dst).expect("copy fixture");
    (temp, dst)
}

pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            copy_dir_all(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

pub fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub mode: u32,
    pub bytes: Vec<u8>,
}

/// Wheel members in archive order.
pub fn read_wheel(path: &Path) -> Vec<Member> {
    let mut archive = zip::ZipArchive::new(File::open(path).expect("open wheel")).expect("zip");
    (0..archive.len())
        .map(|index| {
            let mut file = archive.by_index(index).expect("member");
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes).expect("read member");
            Member {
                name: file.name().to_string(),
                mode: file.unix_mode().unwrap_or_default() & 0o777,
                bytes,
            }
        })
        .collect()
}

/// Sdist members in archive order.
pub fn read_sdist(path: &Path) -> Vec<Member> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).expect("open sdist")));
    archive
        .entries()
        .expect("entries")
        .map(|entry| {
            let mut entry = entry.expect("entry");
            let name = entry.path().expect("path").to_string_lossy().into_owned();
            let mode = entry.header().mode().expect("mode");
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).expect("read entry");
            Member { name, mode, bytes }
        })
        .collect()
}

pub fn names(members: &[Member]) -> Vec<&str> {
    members.iter().map(|member| member.name.as_str()).collect()
}

pub fn text<'a>(members: &'a [Member], name: &str) -> &'a str {
    let member = members
        .iter()
        .find(|member| member.name == name)
        .unwrap_or_else(|| panic!("missing member {name}"));
    std::str::from_utf8(&member.bytes).expect("utf-8 member")
}

pub fn record_digest(bytes: &[u8]) -> String {
    format!("sha256={}", URL_SAFE_NO_PAD.encode(Sha256::digest(bytes)))
}

/// Parses RECORD into `path -> (digest, size)`; the RECORD row maps to empties.
pub fn parse_record(record: &str) -> BTreeMap<String, (String, String)> {
    record
        .lines()
        .map(|line| {
            let mut fields = line.rsplitn(3, ',');
            let size = fields.next().expect("size").to_string();
            let digest = fields.next().expect("digest").to_string();
            let path = fields.next().expect("path").trim_matches('"').to_string();
            (path, (digest, size))
        })
        .collect()
}
