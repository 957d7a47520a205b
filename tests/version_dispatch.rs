mod common;

use common::{two_channel_metadata, write_file, write_v0_3_file};
use cphd_reader::{
    AccessPolicy, CphdDetails, CphdError, CphdReader, CphdVersion, PhaseHistoryRead, RangeSpec, ReaderV0_3,
    ReaderV1_0, is_container,
};
use num_complex::Complex32;
use tempfile::TempDir;

#[test]
fn version_0_3_file_opens_with_synthesized_identifiers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("legacy.cphd");
    write_v0_3_file(&path);

    let reader = CphdReader::open(&path).unwrap();
    assert!(matches!(reader, CphdReader::V0_3(_)));
    assert_eq!(reader.version(), CphdVersion::V0_3);
    assert_eq!(reader.header().classification(), "UNCLASSIFIED");
    assert_eq!(reader.channel_identifiers(), &["0".to_string(), "1".to_string()]);
    assert!(reader.support_identifiers().is_empty());
    assert!(reader.metadata().support_arrays().is_empty());

    let times = reader.read_pvp_field("TxTime", "1", RangeSpec::All).unwrap().unwrap();
    assert_eq!(times.as_f8().unwrap().as_slice().unwrap(), &[10.0, 11.0]);
    let positions = reader.read_pvp_field("TxPos", 0usize, RangeSpec::Index(2)).unwrap().unwrap();
    assert_eq!(positions.shape(), &[1, 3]);
    assert_eq!(positions.as_f8().unwrap().as_slice().unwrap(), &[2.0, 3.0, 4.0]);

    let raw = reader.read_raw_signal(RangeSpec::All, RangeSpec::All, 1usize).unwrap();
    let raw = raw.as_ci4().unwrap();
    assert_eq!(raw.shape(), &[2, 4]);
    assert_eq!((raw[[1, 3]].re, raw[[1, 3]].im), (107, -107));
}

#[test]
fn version_0_3_signal_is_scaled_per_vector() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("legacy_scaled.cphd");
    write_v0_3_file(&path);
    let reader = CphdReader::open_with(&path, AccessPolicy::Buffered).unwrap();

    let signal = reader.read_signal(RangeSpec::All, RangeSpec::All, "0").unwrap();
    assert_eq!(signal.shape(), &[3, 4]);
    for r in 0..3 {
        for c in 0..4 {
            let re = (r * 4 + c) as f32;
            let scale = 2.0 + r as f32;
            assert_eq!(signal[[r, c]], Complex32::new(re * scale, -re * scale));
        }
    }

    let blocks = reader.read_signal_block_all().unwrap();
    assert_eq!(blocks["1"][[0, 1]], Complex32::new(202.0, -202.0));
    assert_eq!(reader.read_pvp_block_all().unwrap()["1"].rows(), 2);
}

#[test]
fn version_0_3_has_no_support_arrays() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("legacy_support.cphd");
    write_v0_3_file(&path);
    let reader = CphdReader::open(&path).unwrap();

    assert!(matches!(
        reader.read_support(0usize, RangeSpec::All, RangeSpec::All),
        Err(CphdError::UnsupportedOperation(_))
    ));
    assert!(matches!(reader.read_support_block_all(), Err(CphdError::UnsupportedOperation(_))));
}

#[test]
fn version_specific_readers_refuse_the_other_version() {
    let dir = TempDir::new().unwrap();
    let legacy = dir.path().join("legacy.cphd");
    let current = dir.path().join("current.cphd");
    write_v0_3_file(&legacy);
    write_file(&current, two_channel_metadata(false, false), AccessPolicy::Mapped);

    let result = ReaderV1_0::new(CphdDetails::open(&legacy).unwrap(), AccessPolicy::Mapped);
    match result {
        Err(CphdError::VersionMismatch { expected, found }) => {
            assert_eq!(expected, "1.0");
            assert_eq!(found, "0.3");
        }
        other => panic!("expected VersionMismatch, got {:?}", other.map(|_| ())),
    }
    let result = ReaderV0_3::open(&current, AccessPolicy::Mapped);
    assert!(matches!(result, Err(CphdError::VersionMismatch { .. })));

    assert!(ReaderV1_0::open(&current, AccessPolicy::Buffered).is_ok());
    assert!(ReaderV0_3::open(&legacy, AccessPolicy::Buffered).is_ok());
}

#[test]
fn unknown_version_is_a_format_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("future.cphd");
    std::fs::write(&path, b"CPHD/1.1\nXML_BLOCK_SIZE := 10\n\x0c\n").unwrap();

    assert!(matches!(CphdReader::open(&path), Err(CphdError::Format(_))));
    assert!(matches!(is_container(&path), Err(CphdError::Format(_))));
}

#[test]
fn container_detection() {
    let dir = TempDir::new().unwrap();

    let text = dir.path().join("notes.txt");
    std::fs::write(&text, b"just some text that is not a CPHD file").unwrap();
    assert!(is_container(&text).unwrap().is_none());

    let tiny = dir.path().join("tiny.bin");
    std::fs::write(&tiny, b"CP").unwrap();
    assert!(is_container(&tiny).unwrap().is_none());

    assert!(is_container(dir.path().join("missing.cphd")).unwrap().is_none());
    assert!(is_container(dir.path()).unwrap().is_none());

    let broken = dir.path().join("broken.cphd");
    std::fs::write(&broken, b"CPHD/1.0\nXML_BLOCK_SIZE := many\n\x0c\n").unwrap();
    assert!(is_container(&broken).is_err());

    let good = dir.path().join("good.cphd");
    write_file(&good, two_channel_metadata(false, false), AccessPolicy::Mapped);
    let reader = is_container(&good).unwrap().unwrap();
    assert_eq!(reader.version(), CphdVersion::V1_0);
}
