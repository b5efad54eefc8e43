//! Reproducibility: identical inputs give byte-identical artifacts.

mod common;

use std::fs;
use std::time::Duration;

use common::prepare_fixture;
use kiln_core::backend::{build_sdist, build_wheel};
use kiln_core::settings::SOURCE_DATE_EPOCH_ENV;
use kiln_core::{load_project, ArtifactKind, BuildSettings, Builder, ConfigSettings};
use serial_test::serial;

#[test]
#[serial]
fn repeated_builds_are_byte_identical() {
    let (temp, root) = prepare_fixture("example_pkg");
    let config = ConfigSettings::new();
    for (first, second) in [
        (
            build_wheel(&root, &temp.path().join("a"), &config, None).expect("wheel a"),
            build_wheel(&root, &temp.path().join("b"), &config, None).expect("wheel b"),
        ),
        (
            build_sdist(&root, &temp.path().join("a"), &config).expect("sdist a"),
            build_sdist(&root, &temp.path().join("b"), &config).expect("sdist b"),
        ),
    ] {
        assert_eq!(first, second);
        assert_eq!(
            fs::read(temp.path().join("a").join(&first)).expect("read a"),
            fs::read(temp.path().join("b").join(&second)).expect("read b"),
        );
    }
}

#[test]
#[serial]
fn worker_count_does_not_change_output() {
    let (temp, root) = prepare_fixture("example_pkg");
    let model = load_project(&root).expect("project");
    let serial_build = Builder::new(&model, BuildSettings::default().with_jobs(1))
        .build(ArtifactKind::Wheel, &temp.path().join("one"))
        .expect("one worker");
    let parallel_build = Builder::new(&model, BuildSettings::default().with_jobs(8))
        .build(ArtifactKind::Wheel, &temp.path().join("eight"))
        .expect("eight workers");
    assert_eq!(
        fs::read(serial_build.path).expect("read"),
        fs::read(parallel_build.path).expect("read"),
    );
}

#[test]
#[serial]
fn source_date_epoch_sets_member_timestamps() {
    let (temp, root) = prepare_fixture("example_pkg");
    let config = ConfigSettings::new();

    std::env::set_var(SOURCE_DATE_EPOCH_ENV, "1700000000");
    let wheel = build_wheel(&root, &temp.path().join("dist"), &config, None);
    let sdist = build_sdist(&root, &temp.path().join("dist"), &config);
    std::env::remove_var(SOURCE_DATE_EPOCH_ENV);

    let wheel_path = temp.path().join("dist").join(wheel.expect("wheel"));
    let mut archive =
        zip::ZipArchive::new(fs::File::open(&wheel_path).expect("open")).expect("zip");
    for index in 0..archive.len() {
        let stamp = archive.by_index(index).expect("member").last_modified();
        assert_eq!((stamp.year(), stamp.month(), stamp.day()), (2023, 11, 14));
    }

    let sdist_path = temp.path().join("dist").join(sdist.expect("sdist"));
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(
        fs::File::open(&sdist_path).expect("open"),
    ));
    for entry in archive.entries().expect("entries") {
        let entry = entry.expect("entry");
        assert_eq!(entry.header().mtime().expect("mtime"), 1_700_000_000);
    }
}

#[test]
#[serial]
fn default_timestamp_is_1980() {
    let (temp, root) = prepare_fixture("example_pkg");
    std::env::remove_var(SOURCE_DATE_EPOCH_ENV);
    let out = temp.path().join("dist");
    let file = build_sdist(&root, &out, &ConfigSettings::new()).expect("sdist");
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(
        fs::File::open(out.join(file)).expect("open"),
    ));
    let mut count = 0;
    for entry in archive.entries().expect("entries") {
        assert_eq!(entry.expect("entry").header().mtime().expect("mtime"), 315_532_800);
        count += 1;
    }
    assert_eq!(count, 8);
}

#[test]
#[serial]
fn expired_deadline_cancels_without_output() {
    let (temp, root) = prepare_fixture("example_pkg");
    let model = load_project(&root).expect("project");
    let out = temp.path().join("dist");
    let err = Builder::new(&model, BuildSettings::default().with_timeout(Duration::ZERO))
        .build(ArtifactKind::Wheel, &out)
        .expect_err("deadline");
    assert_eq!(err.kind(), kiln_core::ErrorKind::Cancelled);
    assert!(!out.exists());
}
