//! CPHD file header parsing and serialization.
//!
//! This module handles:
//! - Reading the `CPHD/<version>` line and selecting the schema
//! - Parsing the version-specific `KEY := value` section
//! - Serializing a header back to its text form for writers
//!
//! # Header Structure
//! ```text
//! CPHD/1.0.1\n
//! XML_BLOCK_SIZE := 1893\n
//! XML_BLOCK_BYTE_OFFSET := 1024\n
//! ...
//! RELEASE_INFO := UNRESTRICTED\n
//! \x0c\n                          <- section terminator
//! ```

use std::collections::HashMap;
use std::io::{BufRead, Read};
use log::{debug, info, trace, warn};

use crate::cphd::types::error::{CphdError, Result};
use crate::cphd::types::models::CphdVersion;
use crate::cphd::utils::checked_end;

/// The leading bytes of every CPHD file.
pub const SIGNATURE: &[u8; 4] = b"CPHD";

/// Terminates the header section and the XML block.
pub const SECTION_TERMINATOR: &[u8; 2] = b"\x0c\n";

/// Upper bound on the text header; anything longer is not a CPHD header.
const MAX_HEADER_BYTES: u64 = 64 * 1024;

/// Byte extent of one block, absolute within the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockExtent {
    pub offset: u64,
    pub size: u64,
}

impl BlockExtent {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// One past the last byte, or a `Format` error if that overflows.
    pub fn end(&self) -> Result<u64> {
        checked_end("block extent", self.offset, self.size)
    }
}

/// Header fields of a version 1.0 file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderV1_0 {
    /// Full version string from the first line, e.g. `1.0.1`.
    pub version: String,
    pub xml_block: BlockExtent,
    pub support_block: Option<BlockExtent>,
    pub pvp_block: BlockExtent,
    pub signal_block: BlockExtent,
    pub classification: String,
    pub release_info: String,
}

/// Header fields of a version 0.3 file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderV0_3 {
    pub version: String,
    /// `XML_BYTE_OFFSET` / `XML_DATA_SIZE`.
    pub xml_block: BlockExtent,
    /// `VB_BYTE_OFFSET` / `VB_DATA_SIZE`, the vector-based parameter block.
    pub vb_block: BlockExtent,
    /// `CPHD_BYTE_OFFSET` / `CPHD_DATA_SIZE`, the signal block.
    pub cphd_block: BlockExtent,
    pub classification: String,
    pub release_info: String,
}

/// A parsed header of either version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileHeader {
    V0_3(HeaderV0_3),
    V1_0(HeaderV1_0),
}

impl FileHeader {
    pub fn version(&self) -> CphdVersion {
        match self {
            FileHeader::V0_3(_) => CphdVersion::V0_3,
            FileHeader::V1_0(_) => CphdVersion::V1_0,
        }
    }

    pub fn version_string(&self) -> &str {
        match self {
            FileHeader::V0_3(h) => &h.version,
            FileHeader::V1_0(h) => &h.version,
        }
    }

    pub fn xml_block(&self) -> BlockExtent {
        match self {
            FileHeader::V0_3(h) => h.xml_block,
            FileHeader::V1_0(h) => h.xml_block,
        }
    }

    pub fn pvp_block(&self) -> BlockExtent {
        match self {
            FileHeader::V0_3(h) => h.vb_block,
            FileHeader::V1_0(h) => h.pvp_block,
        }
    }

    pub fn signal_block(&self) -> BlockExtent {
        match self {
            FileHeader::V0_3(h) => h.cphd_block,
            FileHeader::V1_0(h) => h.signal_block,
        }
    }

    /// The support block; always `None` for 0.3.
    pub fn support_block(&self) -> Option<BlockExtent> {
        match self {
            FileHeader::V0_3(_) => None,
            FileHeader::V1_0(h) => h.support_block,
        }
    }

    pub fn classification(&self) -> &str {
        match self {
            FileHeader::V0_3(h) => &h.classification,
            FileHeader::V1_0(h) => &h.classification,
        }
    }

    /// Verifies that every declared block lies within a file of `file_len` bytes.
    pub fn check_extents(&self, file_len: u64) -> Result<()> {
        let blocks = [
            ("XML", Some(self.xml_block())),
            ("support", self.support_block()),
            ("PVP", Some(self.pvp_block())),
            ("signal", Some(self.signal_block())),
        ];
        for (name, block) in blocks {
            let Some(block) = block else {
                continue;
            };
            let end = block.end().map_err(|_| {
                CphdError::Format(format!(
                    "{} block at offset {} with size {} overflows a 64-bit file offset",
                    name, block.offset, block.size
                ))
            })?;
            if end > file_len {
                return Err(CphdError::Format(format!(
                    "{} block [{}, {}) extends past end of file ({} bytes)",
                    name, block.offset, end, file_len
                )));
            }
        }
        Ok(())
    }

    /// Serializes the version line and key/value section, without the terminator.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut lines: Vec<(&str, String)> = Vec::new();
        match self {
            FileHeader::V1_0(h) => {
                lines.push(("XML_BLOCK_SIZE", h.xml_block.size.to_string()));
                lines.push(("XML_BLOCK_BYTE_OFFSET", h.xml_block.offset.to_string()));
                if let Some(support) = h.support_block {
                    lines.push(("SUPPORT_BLOCK_SIZE", support.size.to_string()));
                    lines.push(("SUPPORT_BLOCK_BYTE_OFFSET", support.offset.to_string()));
                }
                lines.push(("PVP_BLOCK_SIZE", h.pvp_block.size.to_string()));
                lines.push(("PVP_BLOCK_BYTE_OFFSET", h.pvp_block.offset.to_string()));
                lines.push(("SIGNAL_BLOCK_SIZE", h.signal_block.size.to_string()));
                lines.push(("SIGNAL_BLOCK_BYTE_OFFSET", h.signal_block.offset.to_string()));
                lines.push(("CLASSIFICATION", h.classification.clone()));
                lines.push(("RELEASE_INFO", h.release_info.clone()));
            }
            FileHeader::V0_3(h) => {
                lines.push(("XML_DATA_SIZE", h.xml_block.size.to_string()));
                lines.push(("XML_BYTE_OFFSET", h.xml_block.offset.to_string()));
                lines.push(("VB_DATA_SIZE", h.vb_block.size.to_string()));
                lines.push(("VB_BYTE_OFFSET", h.vb_block.offset.to_string()));
                lines.push(("CPHD_DATA_SIZE", h.cphd_block.size.to_string()));
                lines.push(("CPHD_BYTE_OFFSET", h.cphd_block.offset.to_string()));
                lines.push(("CLASSIFICATION", h.classification.clone()));
                lines.push(("RELEASE_INFO", h.release_info.clone()));
            }
        }

        let mut text = format!("CPHD/{}\n", self.version_string());
        for (key, value) in lines {
            text.push_str(key);
            text.push_str(" := ");
            text.push_str(&value);
            text.push('\n');
        }
        text.into_bytes()
    }
}

/// Reads the `CPHD/<version>` line and returns the version string.
///
/// The reader is left positioned at the start of the key/value section.
pub fn read_version<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut line = Vec::new();
    reader.take(MAX_HEADER_BYTES).read_until(b'\n', &mut line)?;
    let line = String::from_utf8_lossy(&line);
    let head_line = line.trim();
    trace!("Version line: {:?}", head_line);

    let parts: Vec<&str> = head_line.split('/').collect();
    if parts.len() != 2 {
        return Err(CphdError::Format(format!(
            "Cannot extract CPHD version number from line {:?}",
            head_line
        )));
    }
    if parts[0].trim().as_bytes() != SIGNATURE {
        return Err(CphdError::Format(format!(
            "Version line {:?} does not start with the CPHD signature",
            head_line
        )));
    }
    Ok(parts[1].trim().to_string())
}

/// Parses the CPHD file header from the beginning of the file.
///
/// # Parameters
/// * `reader` - Reader positioned at the start of a CPHD file
///
/// # Returns
/// The header for the detected version; the version string is kept inside it.
pub fn parse<R: BufRead>(reader: &mut R) -> Result<FileHeader> {
    info!("Parsing CPHD header");

    // Step 1: Version line selects the key set
    let version_string = read_version(reader)?;
    let version = CphdVersion::from_version_str(&version_string)?;
    debug!("CPHD version: {} (parsed as {:?})", version_string, version);

    // Step 2: Key/value section up to the terminator
    let mut fields = read_fields(reader)?;
    trace!("Header fields: {:?}", fields);

    // Step 3: Build the version-specific header
    let header = match version {
        CphdVersion::V1_0 => {
            let support_size = take_optional_u64(&mut fields, "SUPPORT_BLOCK_SIZE")?;
            let support_offset = take_optional_u64(&mut fields, "SUPPORT_BLOCK_BYTE_OFFSET")?;
            let support_block = match (support_size, support_offset) {
                (Some(size), Some(offset)) => Some(BlockExtent::new(offset, size)),
                (None, None) => None,
                _ => {
                    return Err(CphdError::Format(
                        "SUPPORT_BLOCK_SIZE and SUPPORT_BLOCK_BYTE_OFFSET must appear together".to_string(),
                    ));
                }
            };
            FileHeader::V1_0(HeaderV1_0 {
                version: version_string,
                xml_block: BlockExtent::new(
                    take_u64(&mut fields, "XML_BLOCK_BYTE_OFFSET")?,
                    take_u64(&mut fields, "XML_BLOCK_SIZE")?,
                ),
                support_block,
                pvp_block: BlockExtent::new(
                    take_u64(&mut fields, "PVP_BLOCK_BYTE_OFFSET")?,
                    take_u64(&mut fields, "PVP_BLOCK_SIZE")?,
                ),
                signal_block: BlockExtent::new(
                    take_u64(&mut fields, "SIGNAL_BLOCK_BYTE_OFFSET")?,
                    take_u64(&mut fields, "SIGNAL_BLOCK_SIZE")?,
                ),
                classification: take_string(&mut fields, "CLASSIFICATION")?,
                release_info: take_string(&mut fields, "RELEASE_INFO")?,
            })
        }
        CphdVersion::V0_3 => FileHeader::V0_3(HeaderV0_3 {
            version: version_string,
            xml_block: BlockExtent::new(
                take_u64(&mut fields, "XML_BYTE_OFFSET")?,
                take_u64(&mut fields, "XML_DATA_SIZE")?,
            ),
            vb_block: BlockExtent::new(
                take_u64(&mut fields, "VB_BYTE_OFFSET")?,
                take_u64(&mut fields, "VB_DATA_SIZE")?,
            ),
            cphd_block: BlockExtent::new(
                take_u64(&mut fields, "CPHD_BYTE_OFFSET")?,
                take_u64(&mut fields, "CPHD_DATA_SIZE")?,
            ),
            classification: take_string(&mut fields, "CLASSIFICATION")?,
            release_info: take_string(&mut fields, "RELEASE_INFO")?,
        }),
    };

    for key in fields.keys() {
        warn!("Ignoring unrecognized CPHD {} header field {}", version, key);
    }

    info!(
        "Header parsed successfully: version={}, xml={:?}, pvp={:?}, signal={:?}, support={:?}",
        header.version_string(),
        header.xml_block(),
        header.pvp_block(),
        header.signal_block(),
        header.support_block()
    );
    Ok(header)
}

/// Reads `KEY := value` lines until the section terminator.
fn read_fields<R: BufRead>(reader: &mut R) -> Result<HashMap<String, String>> {
    let mut fields = HashMap::new();
    let mut limited = reader.take(MAX_HEADER_BYTES);
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = limited.read_until(b'\n', &mut line)?;
        if read == 0 {
            return Err(CphdError::Format(
                "Header section terminator not found".to_string(),
            ));
        }
        if line.as_slice() == SECTION_TERMINATOR {
            break;
        }

        let text = std::str::from_utf8(&line)
            .map_err(|e| CphdError::Format(format!("Header line is not valid UTF-8: {}", e)))?
            .trim();
        if text.is_empty() {
            continue;
        }
        let (key, value) = text.split_once(":=").ok_or_else(|| {
            CphdError::Format(format!("Malformed header line {:?}", text))
        })?;
        fields.insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(fields)
}

fn take_string(fields: &mut HashMap<String, String>, key: &str) -> Result<String> {
    fields
        .remove(key)
        .ok_or_else(|| CphdError::Format(format!("Header is missing required field {}", key)))
}

fn take_optional_u64(fields: &mut HashMap<String, String>, key: &str) -> Result<Option<u64>> {
    fields
        .remove(key)
        .map(|value| {
            value.parse::<u64>().map_err(|e| {
                CphdError::Format(format!("Header field {} has non-integer value {:?}: {}", key, value, e))
            })
        })
        .transpose()
}

fn take_u64(fields: &mut HashMap<String, String>, key: &str) -> Result<u64> {
    take_optional_u64(fields, key)?
        .ok_or_else(|| CphdError::Format(format!("Header is missing required field {}", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_v1() -> FileHeader {
        FileHeader::V1_0(HeaderV1_0 {
            version: "1.0.1".to_string(),
            xml_block: BlockExtent::new(1024, 900),
            support_block: Some(BlockExtent::new(1984, 128)),
            pvp_block: BlockExtent::new(2112, 640),
            signal_block: BlockExtent::new(2752, 128),
            classification: "UNCLASSIFIED".to_string(),
            release_info: "UNRESTRICTED".to_string(),
        })
    }

    fn with_terminator(header: &FileHeader) -> Vec<u8> {
        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(SECTION_TERMINATOR);
        bytes
    }

    #[test]
    fn round_trips_version_1_0() {
        let header = sample_v1();
        let parsed = parse(&mut Cursor::new(with_terminator(&header))).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.version(), CphdVersion::V1_0);
    }

    #[test]
    fn round_trips_version_0_3() {
        let header = FileHeader::V0_3(HeaderV0_3 {
            version: "0.3".to_string(),
            xml_block: BlockExtent::new(512, 300),
            vb_block: BlockExtent::new(812, 96),
            cphd_block: BlockExtent::new(908, 64),
            classification: "UNCLASSIFIED".to_string(),
            release_info: "UNRESTRICTED".to_string(),
        });
        let parsed = parse(&mut Cursor::new(with_terminator(&header))).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.support_block(), None);
        assert_eq!(parsed.pvp_block(), BlockExtent::new(812, 96));
    }

    #[test]
    fn rejects_unhandled_version() {
        let bytes = b"CPHD/2.0\nXML_BLOCK_SIZE := 1\n\x0c\n".to_vec();
        assert!(matches!(parse(&mut Cursor::new(bytes)), Err(CphdError::Format(_))));
    }

    #[test]
    fn rejects_version_line_without_single_separator() {
        let bytes = b"CPHD 1.0\n\x0c\n".to_vec();
        assert!(matches!(parse(&mut Cursor::new(bytes)), Err(CphdError::Format(_))));
        let bytes = b"CPHD/1.0/1\n\x0c\n".to_vec();
        assert!(matches!(parse(&mut Cursor::new(bytes)), Err(CphdError::Format(_))));
    }

    #[test]
    fn rejects_missing_field_and_missing_terminator() {
        let missing = b"CPHD/1.0.1\nXML_BLOCK_SIZE := 10\n\x0c\n".to_vec();
        assert!(matches!(parse(&mut Cursor::new(missing)), Err(CphdError::Format(_))));

        let mut unterminated = sample_v1().to_bytes();
        unterminated.extend_from_slice(b"\n");
        assert!(matches!(parse(&mut Cursor::new(unterminated)), Err(CphdError::Format(_))));
    }

    #[test]
    fn extents_must_fit_in_file() {
        let header = sample_v1();
        assert!(header.check_extents(2880).is_ok());
        assert!(matches!(header.check_extents(2879), Err(CphdError::Format(_))));
    }

    #[test]
    fn overflowing_extent_is_a_format_error() {
        let text = with_terminator(&sample_v1());
        let text = String::from_utf8(text)
            .unwrap()
            .replace("XML_BLOCK_BYTE_OFFSET := 1024", "XML_BLOCK_BYTE_OFFSET := 18446744073709551615");
        let parsed = parse(&mut Cursor::new(text.into_bytes())).unwrap();
        assert_eq!(parsed.xml_block().offset, u64::MAX);
        assert!(matches!(parsed.xml_block().end(), Err(CphdError::Format(_))));
        assert!(matches!(parsed.check_extents(u64::MAX), Err(CphdError::Format(_))));
    }
}
