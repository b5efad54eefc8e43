use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

fn fixture(name: &str) -> (TempDir, PathBuf) {
    let source = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .expect("workspace root")
        .join("fixtures")
        .join(name);
    let temp = tempfile::Builder::new()
        .prefix("kiln-cli-")
        .tempdir()
        .expect("tempdir");
    let dst = temp.path().join(name);
    copy_dir_all(&source, &dst);
    (temp, dst)
}

fn copy_dir_all(src: &Path, dst: &Path) {
    fs::create_dir_all(dst).expect("create dir");
    for entry in fs::read_dir(src).expect("read dir") {
        let entry = entry.expect("entry");
        let target = dst.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir_all(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), target).expect("copy file");
        }
    }
}

fn kiln() -> Command {
    let mut cmd = Command::cargo_bin("kiln").expect("kiln binary");
    cmd.env_remove("SOURCE_DATE_EPOCH")
        .env_remove("KILN_JOBS")
        .env_remove("KILN_BUILD_TIMEOUT");
    cmd
}

fn parse_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("valid json")
}

#[test]
fn build_wheel_prints_the_file_name() {
    let (temp, root) = fixture("example_pkg");
    let out = temp.path().join("dist");
    kiln()
        .arg("build-wheel")
        .arg("--project")
        .arg(&root)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout("example_pkg-1.0-py3-none-any.whl\n");
    let wheel = out.join("example_pkg-1.0-py3-none-any.whl");
    let archive = zip::ZipArchive::new(File::open(wheel).expect("open")).expect("zip");
    assert_eq!(archive.len(), 9);
}

#[test]
fn build_sdist_reports_json() {
    let (temp, root) = fixture("example_pkg");
    let out = temp.path().join("dist");
    let assert = kiln()
        .args(["--json", "build-sdist", "-C", "jobs=2"])
        .arg("--project")
        .arg(&root)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();
    let payload = parse_json(&assert.get_output().stdout);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["result"]["hook"], "build_sdist");
    assert_eq!(payload["result"]["file"], "example_pkg-1.0.tar.gz");

    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(
        File::open(out.join("example_pkg-1.0.tar.gz")).expect("open"),
    ));
    let mut pkg_info = String::new();
    for entry in archive.entries().expect("entries") {
        let mut entry = entry.expect("entry");
        if entry.path().expect("path").ends_with("PKG-INFO") {
            entry.read_to_string(&mut pkg_info).expect("read");
        }
    }
    assert!(pkg_info.starts_with("Metadata-Version: 2.3\nName: Example_Pkg\n"));
}

#[test]
fn prepare_metadata_writes_dist_info() {
    let (temp, root) = fixture("example_pkg");
    let out = temp.path().join("meta");
    kiln()
        .arg("prepare-metadata")
        .arg("--project")
        .arg(&root)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout("example_pkg-1.0.dist-info\n");
    let entry_points =
        fs::read_to_string(out.join("example_pkg-1.0.dist-info/entry_points.txt")).expect("read");
    assert!(entry_points.starts_with("[console_scripts]\nmytool = example_pkg.cli:main\n"));
}

#[test]
fn build_editable_writes_a_pth_wheel() {
    let (temp, root) = fixture("example_pkg");
    let out = temp.path().join("dist");
    kiln()
        .arg("build-editable")
        .arg("--project")
        .arg(&root)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();
    let mut archive = zip::ZipArchive::new(
        File::open(out.join("example_pkg-1.0-py3-none-any.whl")).expect("open"),
    )
    .expect("zip");
    assert!(archive.by_name("example_pkg.pth").is_ok());
    assert!(archive.by_name("example_pkg/__init__.py").is_err());
}

#[test]
fn get_requires_is_empty() {
    let (_temp, root) = fixture("example_pkg");
    let assert = kiln()
        .current_dir(&root)
        .args(["--json", "get-requires", "--target", "editable", "-C", "jobs=2"])
        .assert()
        .success();
    let payload = parse_json(&assert.get_output().stdout);
    assert_eq!(payload["result"]["requires"], Value::Array(Vec::new()));
}

#[test]
fn configuration_errors_exit_with_code_one() {
    let (temp, root) = fixture("example_pkg");
    let pyproject = root.join("pyproject.toml");
    let contents = fs::read_to_string(&pyproject).expect("pyproject");
    fs::write(&pyproject, contents.replace("version = \"1.0\"\n", "")).expect("rewrite");

    let out = temp.path().join("dist");
    let assert = kiln()
        .arg("--json")
        .arg("build-wheel")
        .arg("--project")
        .arg(&root)
        .arg("--out")
        .arg(&out)
        .assert()
        .code(1);
    let payload = parse_json(&assert.get_output().stdout);
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["kind"], "configuration");
    assert_eq!(payload["code"], "KB101");
    assert!(!out.exists());
}

#[test]
fn invalid_config_settings_are_rejected() {
    let (temp, root) = fixture("example_pkg");
    let assert = kiln()
        .args(["build-wheel", "-C", "jobs=0"])
        .arg("--project")
        .arg(&root)
        .arg("--out")
        .arg(temp.path().join("dist"))
        .assert()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("[KB100]"), "{stderr}");
}
