mod common;

use common::{CHANNEL_A, two_channel_metadata, write_file};
use cphd_reader::cphd::codec::transform::pair_to_complex;
use cphd_reader::cphd::metadata::v1_0::DEFAULT_NAMESPACE;
use cphd_reader::{AccessPolicy, CphdReader, CphdVersion, PhaseHistoryRead, RangeSpec};
use tempfile::TempDir;

const POLICIES: [AccessPolicy; 2] = [AccessPolicy::Mapped, AccessPolicy::Buffered];

#[test]
fn full_block_reads_return_what_was_written() {
    for policy in POLICIES {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("round_trip.cphd");
        let blocks = write_file(&path, two_channel_metadata(false, true), policy);

        let reader = CphdReader::open_with(&path, policy).unwrap();
        assert!(matches!(reader, CphdReader::V1_0(_)));
        assert_eq!(reader.version(), CphdVersion::V1_0);
        assert_eq!(reader.header().version_string(), "1.0.1");
        assert_eq!(reader.channel_identifiers(), &["A".to_string(), "B".to_string()]);
        assert_eq!(reader.support_identifiers(), &["AGP".to_string(), "IAZ".to_string()]);

        assert_eq!(reader.read_pvp_block_all().unwrap(), blocks.pvp);
        assert_eq!(reader.read_support_block_all().unwrap(), blocks.support);

        let signals = reader.read_signal_block_all().unwrap();
        assert_eq!(signals.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        for (identifier, written) in &blocks.signal {
            let raw = reader.read_raw_signal(RangeSpec::All, RangeSpec::All, identifier).unwrap();
            assert_eq!(&raw, written);
            assert_eq!(signals[identifier], pair_to_complex(written).unwrap());
        }
    }
}

#[test]
fn identifier_and_ordinal_reads_agree() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("refs.cphd");
    write_file(&path, two_channel_metadata(true, true), AccessPolicy::Mapped);
    let reader = CphdReader::open(&path).unwrap();

    for (ordinal, identifier) in reader.channel_identifiers().iter().enumerate() {
        assert_eq!(
            reader.read_signal(RangeSpec::All, RangeSpec::All, ordinal).unwrap(),
            reader.read_signal(RangeSpec::All, RangeSpec::All, identifier).unwrap()
        );
        assert_eq!(
            reader.read_pvp_field("TxPos", ordinal, RangeSpec::All).unwrap(),
            reader.read_pvp_field("TxPos", identifier, RangeSpec::All).unwrap()
        );
        assert_eq!(
            reader.read_pvp_record_block(ordinal, (1i64, 3i64)).unwrap(),
            reader.read_pvp_record_block(identifier, (1i64, 3i64)).unwrap()
        );
    }
    for (ordinal, identifier) in reader.support_identifiers().iter().enumerate() {
        assert_eq!(
            reader.read_support(ordinal, RangeSpec::All, RangeSpec::All).unwrap(),
            reader.read_support(identifier, RangeSpec::All, RangeSpec::All).unwrap()
        );
    }
}

#[test]
fn mapped_and_buffered_reads_are_identical() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("policies.cphd");
    write_file(&path, two_channel_metadata(true, true), AccessPolicy::Buffered);

    let mapped = CphdReader::open_with(&path, AccessPolicy::Mapped).unwrap();
    let buffered = CphdReader::open_with(&path, AccessPolicy::Buffered).unwrap();
    let selections = [
        (RangeSpec::All, RangeSpec::All),
        (RangeSpec::strided(1, 9, 3), RangeSpec::span(1, 3)),
        (RangeSpec::reversed(), RangeSpec::Index(2)),
    ];
    for (rows, cols) in selections {
        assert_eq!(
            mapped.read_signal(rows, cols, "A").unwrap(),
            buffered.read_signal(rows, cols, "A").unwrap()
        );
        assert_eq!(
            mapped.read_pvp_field("AmpSF", "A", rows).unwrap(),
            buffered.read_pvp_field("AmpSF", "A", rows).unwrap()
        );
    }
    assert_eq!(
        mapped.read_support("AGP", RangeSpec::reversed(), RangeSpec::All).unwrap(),
        buffered.read_support("AGP", RangeSpec::reversed(), RangeSpec::All).unwrap()
    );
}

#[test]
fn reverse_from_end_works_on_either_axis() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reverse.cphd");
    let blocks = write_file(&path, two_channel_metadata(false, false), AccessPolicy::Mapped);
    let written = blocks.signal["A"].as_ci2().unwrap().clone();
    let reader = CphdReader::open(&path).unwrap();
    let (_, rows, cols) = CHANNEL_A;

    for (reverse_rows, reverse_cols) in [(false, false), (true, false), (false, true), (true, true)] {
        let pick = |reverse: bool| if reverse { RangeSpec::reversed() } else { RangeSpec::All };
        let read = reader.read_raw_signal(pick(reverse_rows), pick(reverse_cols), "A").unwrap();
        let read = read.as_ci2().unwrap();
        assert_eq!(read.shape(), &[rows, cols]);
        for i in 0..rows {
            for j in 0..cols {
                let source_row = if reverse_rows { rows - 1 - i } else { i };
                let source_col = if reverse_cols { cols - 1 - j } else { j };
                assert_eq!(read[[i, j]], written[[source_row, source_col]]);
            }
        }
    }

    let strided = reader.read_raw_signal((-1i64, 0i64, -3i64), RangeSpec::All, "A").unwrap();
    let strided = strided.as_ci2().unwrap();
    assert_eq!(strided.shape(), &[4, cols]);
    assert_eq!(strided[[0, 0]], written[[9, 0]]);
    assert_eq!(strided[[3, 0]], written[[0, 0]]);
}

#[test]
fn single_index_drops_the_axis() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("collapse.cphd");
    let blocks = write_file(&path, two_channel_metadata(false, true), AccessPolicy::Mapped);
    let reader = CphdReader::open(&path).unwrap();

    let row = reader.read_raw_signal(3i64, RangeSpec::All, "B").unwrap();
    assert_eq!(row.shape(), &[4]);
    let written = blocks.signal["B"].as_ci2().unwrap();
    assert_eq!(row.as_ci2().unwrap()[[2]], written[[3, 2]]);

    let sample = reader.read_signal(2i64, 1i64, "B").unwrap();
    assert_eq!(sample.ndim(), 0);

    let cells = reader.read_support("AGP", (1i64, 3i64), RangeSpec::All).unwrap();
    assert_eq!(cells.shape(), &[2, 2, 2]);
    let expected = blocks.support["AGP"].as_f4().unwrap();
    assert_eq!(cells.as_f4().unwrap()[[0, 1, 1]], expected[[1, 1, 1]]);
}

#[test]
fn written_xml_keeps_the_default_namespace() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("xml.cphd");
    write_file(&path, two_channel_metadata(false, true), AccessPolicy::Mapped);
    let reader = CphdReader::open(&path).unwrap();

    let xml = String::from_utf8(reader.details().raw_xml_bytes().unwrap()).unwrap();
    assert!(xml.contains(DEFAULT_NAMESPACE));
    assert!(xml.contains("<AntGainPhase>"));
    let metadata = reader.metadata().as_v1_0().unwrap();
    assert_eq!(metadata.namespace.as_deref(), Some(DEFAULT_NAMESPACE));
    assert_eq!(metadata.support_arrays.len(), 2);

    let header = reader.header();
    assert_eq!(header.xml_block().offset, 1024);
    for block in [header.support_block().unwrap(), header.pvp_block(), header.signal_block()] {
        assert_eq!(block.offset % 64, 0);
    }
}
