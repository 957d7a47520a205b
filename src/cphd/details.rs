//! Parsed-file handle: version, header and bound metadata.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::cphd::format::header::{self, BlockExtent, FileHeader, SIGNATURE};
use crate::cphd::metadata::Metadata;
use crate::cphd::types::error::{CphdError, Result};
use crate::cphd::types::models::CphdVersion;

/// The header and metadata of one CPHD file, parsed once at open.
#[derive(Debug, Clone)]
pub struct CphdDetails {
    path: PathBuf,
    file_len: u64,
    header: FileHeader,
    metadata: Metadata,
}

impl CphdDetails {
    /// Opens and parses a CPHD file.
    ///
    /// # Errors
    /// Returns [`CphdError::NotAContainer`] if the path is not a regular file
    /// or does not start with the `CPHD` signature. Header, XML and binding
    /// failures are returned unchanged.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening CPHD file: {}", path.display());

        let file_len = match std::fs::metadata(path) {
            Ok(stat) if stat.is_file() => stat.len(),
            Ok(_) => return Err(CphdError::NotAContainer(format!("{} is not a regular file", path.display()))),
            Err(e) => return Err(CphdError::NotAContainer(format!("{}: {}", path.display(), e))),
        };
        let mut reader = BufReader::new(File::open(path)?);

        // Step 1: Signature
        let mut signature = [0u8; 4];
        match reader.read_exact(&mut signature) {
            Ok(()) if &signature == SIGNATURE => {}
            Ok(()) => {
                return Err(CphdError::NotAContainer(format!(
                    "{} does not start with the CPHD signature",
                    path.display()
                )));
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(CphdError::NotAContainer(format!("{} is too short", path.display())));
            }
            Err(e) => return Err(e.into()),
        }
        reader.seek(SeekFrom::Start(0))?;

        // Step 2: Header and block extents
        let header = header::parse(&mut reader)?;
        header.check_extents(file_len)?;

        // Step 3: XML block
        let xml = read_block(&mut reader, header.xml_block())?;

        // Step 4: Bind the metadata for this version
        let metadata = Metadata::from_xml_bytes(&xml, header.version())?;

        info!(
            "CPHD file opened: version {}, {} channels, {} support arrays",
            header.version_string(),
            metadata.channels().len(),
            metadata.support_arrays().len()
        );
        debug!(
            "Blocks: xml={:?} support={:?} pvp={:?} signal={:?}",
            header.xml_block(),
            header.support_block(),
            header.pvp_block(),
            header.signal_block()
        );

        Ok(Self { path: path.to_path_buf(), file_len, header, metadata })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    pub fn version(&self) -> CphdVersion {
        self.header.version()
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Re-reads the XML block from disk.
    pub fn raw_xml_bytes(&self) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        read_block(&mut file, self.header.xml_block())
    }
}

fn read_block<R: Read + Seek>(reader: &mut R, block: BlockExtent) -> Result<Vec<u8>> {
    let size = usize::try_from(block.size)
        .map_err(|_| CphdError::Format(format!("Block size {} does not fit in memory", block.size)))?;
    reader.seek(SeekFrom::Start(block.offset))?;
    let mut bytes = vec![0u8; size];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}
