#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use cphd_reader::cphd::format::header::{FileHeader, SECTION_TERMINATOR};
use cphd_reader::{
    AccessPolicy, Channel, CphdWriter, ElementArray, MetadataV1_0, PvpField, PvpLayout, PvpRecords, SignalFormat,
    SupportArrayEntry, SupportArrayKind, SupportArrayType,
};
use ndarray::{Array1, Array2, Array3};
use num_complex::Complex;

pub const CHANNEL_A: (&str, usize, usize) = ("A", 10, 4);
pub const CHANNEL_B: (&str, usize, usize) = ("B", 6, 4);

pub fn pvp_layout(with_scale: bool) -> PvpLayout {
    let mut fields = vec![
        PvpField::new("TxTime", 0, 8, "F8"),
        PvpField::new("TxPos", 8, 24, "X=F8;Y=F8;Z=F8;"),
    ];
    if with_scale {
        fields.push(PvpField::new("AmpSF", 32, 8, "F8"));
    }
    let record_size = fields.iter().map(|f| f.size).sum();
    PvpLayout::new(record_size, fields)
}

/// Two CI2 channels, optionally with AmpSF and two support arrays.
pub fn two_channel_metadata(with_scale: bool, with_support: bool) -> MetadataV1_0 {
    let layout = pvp_layout(with_scale);
    let record_size = layout.record_size as u64;
    let channels = vec![
        Channel {
            identifier: CHANNEL_A.0.to_string(),
            num_vectors: CHANNEL_A.1,
            num_samples: CHANNEL_A.2,
            signal_array_byte_offset: 0,
            pvp_array_byte_offset: 0,
        },
        Channel {
            identifier: CHANNEL_B.0.to_string(),
            num_vectors: CHANNEL_B.1,
            num_samples: CHANNEL_B.2,
            signal_array_byte_offset: (CHANNEL_A.1 * CHANNEL_A.2 * 2) as u64,
            pvp_array_byte_offset: CHANNEL_A.1 as u64 * record_size,
        },
    ];
    let mut metadata = MetadataV1_0::new("UNCLASSIFIED", "UNRESTRICTED", SignalFormat::CI2, layout, channels);

    if with_support {
        metadata.support_arrays = vec![
            SupportArrayEntry {
                identifier: "AGP".to_string(),
                num_rows: 3,
                num_cols: 2,
                bytes_per_element: 8,
                array_byte_offset: 0,
            },
            SupportArrayEntry {
                identifier: "IAZ".to_string(),
                num_rows: 2,
                num_cols: 5,
                bytes_per_element: 4,
                array_byte_offset: 48,
            },
        ];
        metadata.support_array_types = vec![
            SupportArrayType::new(SupportArrayKind::AntGainPhase, "AGP", "Gain=F4;Phase=F4;"),
            SupportArrayType::new(SupportArrayKind::IazArray, "IAZ", "F4"),
        ];
    }
    metadata
}

/// Amplitude scale used for row `i`.
pub fn scale_for_row(i: usize) -> f64 {
    1.0 + 0.5 * i as f64
}

pub fn pvp_records(layout: &PvpLayout, rows: usize, seed: f64) -> PvpRecords {
    let mut records = PvpRecords::zeroed(layout.clone(), rows);
    let times = Array1::from_iter((0..rows).map(|i| seed + i as f64));
    records.set_field("TxTime", &ElementArray::from(times)).unwrap();
    let positions = Array2::from_shape_fn((rows, 3), |(i, k)| (i * (k + 1)) as f64 + seed);
    records.set_field("TxPos", &ElementArray::from(positions)).unwrap();
    if layout.field("AmpSF").is_some() {
        let scales = Array1::from_iter((0..rows).map(scale_for_row));
        records.set_field("AmpSF", &ElementArray::from(scales)).unwrap();
    }
    records
}

pub fn signal(rows: usize, cols: usize, seed: i8) -> ElementArray {
    ElementArray::from(Array2::from_shape_fn((rows, cols), |(r, c)| {
        Complex::new((r * cols + c) as i8 + seed, -((r + c) as i8))
    }))
}

pub fn support_arrays() -> BTreeMap<String, ElementArray> {
    let gain_phase = Array3::from_shape_fn((3, 2, 2), |(r, c, k)| (r * 10 + c) as f32 + 0.25 * k as f32);
    let iaz = Array2::from_shape_fn((2, 5), |(r, c)| -(r as f32) * 100.0 + c as f32);
    BTreeMap::from([
        ("AGP".to_string(), ElementArray::from(gain_phase)),
        ("IAZ".to_string(), ElementArray::from(iaz)),
    ])
}

pub struct Blocks {
    pub pvp: BTreeMap<String, PvpRecords>,
    pub signal: BTreeMap<String, ElementArray>,
    pub support: BTreeMap<String, ElementArray>,
}

pub fn blocks_for(metadata: &MetadataV1_0) -> Blocks {
    let pvp = BTreeMap::from([
        ("A".to_string(), pvp_records(&metadata.pvp, CHANNEL_A.1, 100.0)),
        ("B".to_string(), pvp_records(&metadata.pvp, CHANNEL_B.1, 200.0)),
    ]);
    let signal = BTreeMap::from([
        ("A".to_string(), signal(CHANNEL_A.1, CHANNEL_A.2, 0)),
        ("B".to_string(), signal(CHANNEL_B.1, CHANNEL_B.2, 50)),
    ]);
    let support = if metadata.support_arrays.is_empty() {
        BTreeMap::new()
    } else {
        support_arrays()
    };
    Blocks { pvp, signal, support }
}

/// Writes a complete file through `write_all` and returns the blocks written.
pub fn write_file(path: &Path, metadata: MetadataV1_0, policy: AccessPolicy) -> Blocks {
    let blocks = blocks_for(&metadata);
    let mut writer = CphdWriter::create_with(path, metadata, true, policy).unwrap();
    writer.write_all(&blocks.pvp, &blocks.signal, &blocks.support).unwrap();
    blocks
}

/// A hand-assembled 1.0 file whose signal block is `compressed`, opaque bytes
/// far smaller than the channel table implies. PVP and support blocks are real.
pub fn write_compressed_file(path: &Path, compressed: &[u8]) -> Blocks {
    let mut metadata = two_channel_metadata(false, true);
    metadata.signal_compression_id = Some("JPEG2000".to_string());
    let blocks = blocks_for(&metadata);
    let mut header = metadata.make_file_header().unwrap();
    header.signal_block.size = compressed.len() as u64;

    let mut bytes = FileHeader::V1_0(header.clone()).to_bytes();
    bytes.extend_from_slice(SECTION_TERMINATOR);
    bytes.resize(header.xml_block.offset as usize, 0);
    bytes.extend_from_slice(&metadata.to_xml_bytes().unwrap());
    bytes.extend_from_slice(SECTION_TERMINATOR);
    bytes.resize(header.support_block.unwrap().offset as usize, 0);
    for array in &metadata.support_arrays {
        bytes.extend_from_slice(&blocks.support[&array.identifier].to_be_bytes());
    }
    bytes.resize(header.pvp_block.offset as usize, 0);
    for channel in &metadata.channels {
        bytes.extend_from_slice(blocks.pvp[&channel.identifier].as_bytes());
    }
    bytes.resize(header.signal_block.offset as usize, 0);
    bytes.extend_from_slice(compressed);
    std::fs::write(path, bytes).unwrap();
    blocks
}

/// Replaces the single occurrence of `from` in the file at `path` with `to`.
pub fn patch_file(path: &Path, from: &str, to: &str) {
    let text = std::fs::read(path).unwrap();
    let at = text
        .windows(from.len())
        .position(|w| w == from.as_bytes())
        .unwrap_or_else(|| panic!("{:?} not found in {}", from, path.display()));
    let mut patched = text[..at].to_vec();
    patched.extend_from_slice(to.as_bytes());
    patched.extend_from_slice(&text[at + from.len()..]);
    std::fs::write(path, patched).unwrap();
}

/// A hand-assembled version 0.3 file: two RE16I_IM16I channels with AmpSF.
pub fn write_v0_3_file(path: &Path) {
    let xml = r#"<?xml version="1.0"?>
<CPHD xmlns="urn:CPHD:0.3">
  <CollectionInfo><Classification>UNCLASSIFIED</Classification></CollectionInfo>
  <Data>
    <SampleType>RE16I_IM16I</SampleType>
    <NumCPHDChannels>2</NumCPHDChannels>
    <NumBytesVBP>40</NumBytesVBP>
    <ArraySize><NumVectors>3</NumVectors><NumSamples>4</NumSamples></ArraySize>
    <ArraySize><NumVectors>2</NumVectors><NumSamples>4</NumSamples></ArraySize>
  </Data>
  <VectorParameters>
    <TxTime>8</TxTime>
    <TxPos>24</TxPos>
    <AmpSF>8</AmpSF>
  </VectorParameters>
</CPHD>"#;

    let channel_rows = [3usize, 2];
    let mut vb = Vec::new();
    for (channel, &rows) in channel_rows.iter().enumerate() {
        for i in 0..rows {
            vb.extend_from_slice(&(channel as f64 * 10.0 + i as f64).to_be_bytes());
            for k in 0..3 {
                vb.extend_from_slice(&((i + k) as f64).to_be_bytes());
            }
            vb.extend_from_slice(&(2.0f64 + i as f64).to_be_bytes());
        }
    }
    let mut samples = Vec::new();
    for (channel, &rows) in channel_rows.iter().enumerate() {
        for r in 0..rows {
            for c in 0..4 {
                let re = (channel * 100 + r * 4 + c) as i16;
                samples.extend_from_slice(&re.to_be_bytes());
                samples.extend_from_slice(&(-re).to_be_bytes());
            }
        }
    }

    let xml_offset = 512usize;
    let vb_offset = xml_offset + xml.len() + 2;
    let signal_offset = vb_offset + vb.len();
    let header = format!(
        "CPHD/0.3\nXML_DATA_SIZE := {}\nXML_BYTE_OFFSET := {}\nVB_DATA_SIZE := {}\nVB_BYTE_OFFSET := {}\n\
         CPHD_DATA_SIZE := {}\nCPHD_BYTE_OFFSET := {}\nCLASSIFICATION := UNCLASSIFIED\nRELEASE_INFO := UNRESTRICTED\n\x0c\n",
        xml.len(),
        xml_offset,
        vb.len(),
        vb_offset,
        samples.len(),
        signal_offset
    );

    let mut bytes = header.into_bytes();
    bytes.resize(xml_offset, 0);
    bytes.extend_from_slice(xml.as_bytes());
    bytes.extend_from_slice(b"\x0c\n");
    bytes.extend_from_slice(&vb);
    bytes.extend_from_slice(&samples);
    std::fs::write(path, bytes).unwrap();
}
