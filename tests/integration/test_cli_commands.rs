//! CLI command tests through the built binary.

use std::path::{Path, PathBuf};
use std::process::Command;

use atlex_lib::h5::DirectorySource;
use atlex_lib::record::{ExtentRecord, IndexRecord};
use tempfile::TempDir;

use crate::helpers::{index_datasets, parse_frame_file, uniform_granule, BeamSpec};
use atlex_lib::beam::Track;

fn atlex_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_atlex"))
}

fn write_extract_granule(store: &Path, resource: &str) {
    let spec = BeamSpec::new(&[0.0, 5.0, 10.0], &[3], &[0.0]);
    DirectorySource::write_granule(
        &store.join(resource),
        &uniform_granule(&spec, &Track::TRACKS),
    )
    .unwrap();
}

#[test]
fn test_extract_command() {
    let tmp = TempDir::new().unwrap();
    let store = tmp.path().join("store");
    write_extract_granule(&store, "ATL03_demo");

    let parms_path = tmp.path().join("parms.json");
    std::fs::write(&parms_path, r#"{"cnt": 1, "ats": 0.0, "len": 20.0, "res": 20.0}"#).unwrap();
    let output = tmp.path().join("extents.bin");

    let status = Command::new(atlex_binary())
        .args(["extract", "-s"])
        .arg(&store)
        .args(["-r", "ATL03_demo", "-p"])
        .arg(&parms_path)
        .arg("-o")
        .arg(&output)
        .status()
        .expect("binary runs");
    assert!(status.success());

    let frames = parse_frame_file(&output);
    assert_eq!(frames.len(), 3);
    let mut tracks: Vec<u8> =
        frames.iter().map(|f| ExtentRecord::from_bytes(f).unwrap().track).collect();
    tracks.sort_unstable();
    assert_eq!(tracks, vec![1, 2, 3]);
    for frame in &frames {
        let record = ExtentRecord::from_bytes(frame).unwrap();
        assert_eq!(record.valid, [true, true]);
        assert_eq!(record.photons[0].len(), 3);
        assert_eq!(record.rgt, 737);
    }
}

#[test]
fn test_extract_command_single_track() {
    let tmp = TempDir::new().unwrap();
    let store = tmp.path().join("store");
    write_extract_granule(&store, "ATL03_demo");

    let parms_path = tmp.path().join("parms.json");
    std::fs::write(&parms_path, r#"{"cnt": 1, "ats": 0.0, "len": 20.0, "res": 20.0}"#).unwrap();
    let output = tmp.path().join("extents.bin");

    let status = Command::new(atlex_binary())
        .args(["extract", "-s"])
        .arg(&store)
        .args(["-r", "ATL03_demo", "-t", "3", "-p"])
        .arg(&parms_path)
        .arg("-o")
        .arg(&output)
        .status()
        .expect("binary runs");
    assert!(status.success());

    let frames = parse_frame_file(&output);
    assert_eq!(frames.len(), 1);
    assert_eq!(ExtentRecord::from_bytes(&frames[0]).unwrap().track, 3);
}

#[test]
fn test_extract_command_rejects_bad_parms() {
    let tmp = TempDir::new().unwrap();
    let store = tmp.path().join("store");
    write_extract_granule(&store, "ATL03_demo");

    let parms_path = tmp.path().join("parms.json");
    std::fs::write(&parms_path, r#"{"srt": 9}"#).unwrap();

    let status = Command::new(atlex_binary())
        .args(["extract", "-s"])
        .arg(&store)
        .args(["-r", "ATL03_demo", "-p"])
        .arg(&parms_path)
        .arg("-o")
        .arg(tmp.path().join("out.bin"))
        .status()
        .expect("binary runs");
    assert!(!status.success());
}

#[test]
fn test_index_command() {
    let tmp = TempDir::new().unwrap();
    let store = tmp.path().join("store");
    DirectorySource::write_granule(
        &store.join("ATL03_a"),
        &index_datasets(1.0e9, 100.0, 400.0, 6, 737),
    )
    .unwrap();
    DirectorySource::write_granule(
        &store.join("ATL03_b"),
        &index_datasets(1.0e9, 500.0, 800.0, 7, 1042),
    )
    .unwrap();
    let output = tmp.path().join("index.bin");

    let status = Command::new(atlex_binary())
        .args(["index", "-s"])
        .arg(&store)
        .arg("-o")
        .arg(&output)
        .args(["ATL03_a", "ATL03_b"])
        .status()
        .expect("binary runs");
    assert!(status.success());

    let frames = parse_frame_file(&output);
    assert_eq!(frames.len(), 2);
    let mut names: Vec<String> =
        frames.iter().map(|f| IndexRecord::from_bytes(f).unwrap().name).collect();
    names.sort();
    assert_eq!(names, vec!["ATL03_a".to_string(), "ATL03_b".to_string()]);
}

#[test]
fn test_index_command_requires_resources() {
    let tmp = TempDir::new().unwrap();
    let store = tmp.path().join("store");
    std::fs::create_dir_all(&store).unwrap();

    let status = Command::new(atlex_binary())
        .args(["index", "-s"])
        .arg(&store)
        .arg("-o")
        .arg(tmp.path().join("index.bin"))
        .status()
        .expect("binary runs");
    assert!(!status.success());
}
