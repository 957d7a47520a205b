//! Writer for version 1.0 files.
//!
//! The header is computed from the metadata before any byte is written, so
//! every block offset agrees with the channel and support array tables. The
//! file is then sized in full and filled through per-entity writes, which are
//! counted so [`CphdWriter::finalize`] can report anything left unwritten.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, error, info, trace, warn};

use crate::cphd::codec::pvp::PvpRecords;
use crate::cphd::format::header::{FileHeader, HeaderV1_0, SECTION_TERMINATOR};
use crate::cphd::index::IdentifierIndex;
use crate::cphd::metadata::MetadataV1_0;
use crate::cphd::store::{WritableStore, open_writable_store};
use crate::cphd::types::elements::{ElementArray, ElementLayout};
use crate::cphd::types::error::{CphdError, Result};
use crate::cphd::types::models::{AccessPolicy, EntryRef};
use crate::cphd::utils::{byte_span, checked_end};

/// Writes a version 1.0 CPHD file from a complete metadata tree.
#[derive(Debug)]
pub struct CphdWriter {
    path: PathBuf,
    metadata: MetadataV1_0,
    header: HeaderV1_0,
    store: Option<Box<dyn WritableStore>>,
    channel_index: IdentifierIndex,
    support_index: IdentifierIndex,
    support_layouts: Vec<ElementLayout>,
    pvp_written: Vec<usize>,
    signal_written: Vec<usize>,
    support_written: Vec<usize>,
    finalized: bool,
}

impl CphdWriter {
    /// Creates the file with the default [`AccessPolicy`].
    pub fn create(path: impl AsRef<Path>, metadata: MetadataV1_0, check_existence: bool) -> Result<Self> {
        Self::create_with(path, metadata, check_existence, AccessPolicy::default())
    }

    /// Validates `metadata`, writes the header and XML, and sizes the file.
    ///
    /// # Errors
    /// - [`CphdError::AlreadyExists`] if `check_existence` is set and the path exists
    /// - [`CphdError::Format`] if the metadata violates a layout invariant
    pub fn create_with(
        path: impl AsRef<Path>,
        metadata: MetadataV1_0,
        check_existence: bool,
        policy: AccessPolicy,
    ) -> Result<Self> {
        let path = path.as_ref();
        if check_existence && path.exists() {
            return Err(CphdError::AlreadyExists(path.to_path_buf()));
        }
        if let Some(id) = &metadata.signal_compression_id {
            return Err(CphdError::UnsupportedOperation(format!(
                "Writing compressed signal data ({}) is not supported",
                id
            )));
        }

        // Step 1: Validate and lay out the blocks
        metadata.validate()?;
        let channel_index = IdentifierIndex::new("channel", metadata.channels.iter().map(|c| c.identifier.clone()))?;
        let support_index =
            IdentifierIndex::new("support array", metadata.support_arrays.iter().map(|s| s.identifier.clone()))?;
        let support_layouts = metadata
            .support_arrays
            .iter()
            .map(|entry| metadata.support_layout(entry))
            .collect::<Result<Vec<_>>>()?;
        let header = metadata.make_file_header()?;
        let xml = metadata.to_xml_bytes()?;
        debug!("Computed CPHD layout for {}: {:?}", path.display(), header);

        // Step 2: Header and XML
        info!("Creating CPHD file: {}", path.display());
        let mut file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;
        file.write_all(&FileHeader::V1_0(header.clone()).to_bytes())?;
        file.write_all(SECTION_TERMINATOR)?;
        file.seek(SeekFrom::Start(header.xml_block.offset))?;
        file.write_all(&xml)?;
        file.write_all(SECTION_TERMINATOR)?;

        // Step 3: Size the file and open the block store
        let file_len = header.signal_block.end()?.max(header.xml_block.end()? + SECTION_TERMINATOR.len() as u64);
        file.set_len(file_len)?;
        let store = open_writable_store(file, policy)?;

        Ok(Self {
            path: path.to_path_buf(),
            pvp_written: vec![0; metadata.channels.len()],
            signal_written: vec![0; metadata.channels.len()],
            support_written: vec![0; metadata.support_arrays.len()],
            metadata,
            header,
            store: Some(store),
            channel_index,
            support_index,
            support_layouts,
            finalized: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &HeaderV1_0 {
        &self.header
    }

    pub fn metadata(&self) -> &MetadataV1_0 {
        &self.metadata
    }

    fn write_bytes(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        trace!("Writing {} bytes at {}", data.len(), offset);
        let store = self
            .store
            .as_mut()
            .ok_or_else(|| CphdError::InvalidInput(format!("{} is already finalized", self.path.display())))?;
        store.write_at(offset, data)
    }

    /// Writes PVP records for one channel starting at vector `start_row`.
    pub fn write_pvp<'a>(&mut self, channel: impl Into<EntryRef<'a>>, data: &PvpRecords, start_row: usize) -> Result<()> {
        let position = self.channel_index.position(channel.into())?;
        data.check_layout(&self.metadata.pvp)?;

        let entry = &self.metadata.channels[position];
        let rows = data.rows();
        if start_row + rows > entry.num_vectors {
            return Err(CphdError::Range(format!(
                "Writing {} PVP rows at {} exceeds the {} vectors of channel {}",
                rows, start_row, entry.num_vectors, entry.identifier
            )));
        }
        let offset = self.header.pvp_block.offset
            + entry.pvp_array_byte_offset
            + byte_span(start_row, self.metadata.pvp.record_size)?;
        let (identifier, declared) = (entry.identifier.clone(), entry.num_vectors);

        self.write_bytes(offset, data.as_bytes())?;
        self.pvp_written[position] += rows;
        if self.pvp_written[position] > declared {
            warn!(
                "Channel {}: {} PVP rows written, more than the {} declared",
                identifier, self.pvp_written[position], declared
            );
        }
        Ok(())
    }

    /// Writes a 2-D block of signal samples into one channel.
    pub fn write_signal<'a>(
        &mut self,
        channel: impl Into<EntryRef<'a>>,
        data: &ElementArray,
        start_row: usize,
        start_col: usize,
    ) -> Result<()> {
        let position = self.channel_index.position(channel.into())?;
        let entry = &self.metadata.channels[position];
        let declared_format = self.metadata.signal_array_format.element_format();

        if data.ndim() != 2 {
            return Err(CphdError::InvalidInput(format!(
                "Signal data must be two-dimensional, got shape {:?}",
                data.shape()
            )));
        }
        check_width("signal", &entry.identifier, data, declared_format.size())?;
        if data.format() != declared_format {
            warn!(
                "Channel {}: writing {} samples into a {} signal array",
                entry.identifier,
                data.format(),
                declared_format
            );
        }

        let (rows, cols) = (data.shape()[0], data.shape()[1]);
        check_extent("signal array", &entry.identifier, (start_row, start_col), (rows, cols), (entry.num_vectors, entry.num_samples))?;

        let base = self.header.signal_block.offset + entry.signal_array_byte_offset;
        let num_samples = entry.num_samples;
        let (identifier, declared) = (entry.identifier.clone(), entry.num_pixels());
        self.write_rows(base, num_samples, declared_format.size(), (start_row, start_col), cols, &data.to_be_bytes())?;

        self.signal_written[position] += rows * cols;
        if self.signal_written[position] > declared {
            warn!(
                "Channel {}: {} signal pixels written, more than the {} declared",
                identifier, self.signal_written[position], declared
            );
        }
        Ok(())
    }

    /// Writes a block of one support array: 2-D, or 3-D with the array's depth last.
    pub fn write_support<'a>(
        &mut self,
        array: impl Into<EntryRef<'a>>,
        data: &ElementArray,
        start_row: usize,
        start_col: usize,
    ) -> Result<()> {
        let position = self.support_index.position(array.into())?;
        let entry = &self.metadata.support_arrays[position];
        let layout = self.support_layouts[position];

        let shape_ok = match layout.depth {
            1 => data.ndim() == 2,
            depth => data.ndim() == 3 && data.shape()[2] == depth,
        };
        if !shape_ok {
            return Err(CphdError::InvalidInput(format!(
                "Support array {} with depth {} cannot take data of shape {:?}",
                entry.identifier,
                layout.depth,
                data.shape()
            )));
        }
        check_width("support array", &entry.identifier, data, layout.format.size())?;
        if data.format() != layout.format {
            warn!(
                "Support array {}: writing {} elements into a {} array",
                entry.identifier,
                data.format(),
                layout.format
            );
        }

        let (rows, cols) = (data.shape()[0], data.shape()[1]);
        check_extent("support array", &entry.identifier, (start_row, start_col), (rows, cols), (entry.num_rows, entry.num_cols))?;

        let base = self.header.support_block.map_or(0, |b| b.offset) + entry.array_byte_offset;
        let num_cols = entry.num_cols;
        let (identifier, declared) = (entry.identifier.clone(), entry.num_pixels());
        self.write_rows(base, num_cols, entry.bytes_per_element, (start_row, start_col), cols, &data.to_be_bytes())?;

        self.support_written[position] += rows * cols;
        if self.support_written[position] > declared {
            warn!(
                "Support array {}: {} pixels written, more than the {} declared",
                identifier, self.support_written[position], declared
            );
        }
        Ok(())
    }

    /// Writes `bytes` as consecutive rows of `cols` cells into a row-major grid.
    fn write_rows(
        &mut self,
        base: u64,
        grid_cols: usize,
        cell_size: usize,
        (start_row, start_col): (usize, usize),
        cols: usize,
        bytes: &[u8],
    ) -> Result<()> {
        let row_bytes = cols * cell_size;
        if row_bytes == 0 {
            return Ok(());
        }
        for (i, row) in bytes.chunks_exact(row_bytes).enumerate() {
            let offset = base + byte_span((start_row + i) * grid_cols + start_col, cell_size)?;
            self.write_bytes(offset, row)?;
        }
        Ok(())
    }

    /// Writes every block at once, then finalizes.
    ///
    /// The supplied identifier sets must equal those declared in the metadata,
    /// every array must have its declared shape, and the declared offsets of
    /// each block must be contiguous from zero. All of this is checked before
    /// any block byte is written.
    pub fn write_all(
        &mut self,
        pvp: &BTreeMap<String, PvpRecords>,
        signal: &BTreeMap<String, ElementArray>,
        support: &BTreeMap<String, ElementArray>,
    ) -> Result<()> {
        // Step 1: Identifier sets
        check_identifiers("PVP", pvp.keys(), self.channel_index.identifiers())?;
        check_identifiers("signal", signal.keys(), self.channel_index.identifiers())?;
        check_identifiers("support", support.keys(), self.support_index.identifiers())?;

        // Step 2: Shapes and widths
        let record_size = self.metadata.pvp.record_size;
        let bytes_per_sample = self.metadata.signal_array_format.bytes_per_sample();
        for channel in &self.metadata.channels {
            let records = &pvp[&channel.identifier];
            records.check_layout(&self.metadata.pvp)?;
            if records.rows() != channel.num_vectors {
                return Err(CphdError::InvalidInput(format!(
                    "Channel {} declares {} vectors but {} PVP rows were supplied",
                    channel.identifier,
                    channel.num_vectors,
                    records.rows()
                )));
            }
            let samples = &signal[&channel.identifier];
            check_width("signal", &channel.identifier, samples, bytes_per_sample)?;
            check_shape("signal", &channel.identifier, samples, &[channel.num_vectors, channel.num_samples])?;
        }
        for (entry, layout) in self.metadata.support_arrays.iter().zip(&self.support_layouts) {
            let data = &support[&entry.identifier];
            check_width("support array", &entry.identifier, data, layout.format.size())?;
            let expected: Vec<usize> = if layout.depth == 1 {
                vec![entry.num_rows, entry.num_cols]
            } else {
                vec![entry.num_rows, entry.num_cols, layout.depth]
            };
            check_shape("support array", &entry.identifier, data, &expected)?;
        }

        // Step 3: Contiguous layouts
        let pvp_extents = self
            .metadata
            .channels
            .iter()
            .map(|c| Ok((c.identifier.as_str(), c.pvp_array_byte_offset, byte_span(c.num_vectors, record_size)?)))
            .collect::<Result<Vec<_>>>()?;
        let signal_extents = self
            .metadata
            .channels
            .iter()
            .map(|c| {
                let size = byte_span(c.num_pixels(), bytes_per_sample)?;
                Ok((c.identifier.as_str(), c.signal_array_byte_offset, size))
            })
            .collect::<Result<Vec<_>>>()?;
        let support_extents = self
            .metadata
            .support_arrays
            .iter()
            .map(|s| Ok((s.identifier.as_str(), s.array_byte_offset, s.byte_size()?)))
            .collect::<Result<Vec<_>>>()?;
        let pvp_order = contiguous_order("PVP", pvp_extents.into_iter())?;
        let signal_order = contiguous_order("signal", signal_extents.into_iter())?;
        let support_order = contiguous_order("support", support_extents.into_iter())?;

        // Step 4: Write in offset order
        for identifier in &support_order {
            self.write_support(identifier, &support[identifier], 0, 0)?;
        }
        for identifier in &pvp_order {
            self.write_pvp(identifier, &pvp[identifier], 0)?;
        }
        for identifier in &signal_order {
            self.write_signal(identifier, &signal[identifier], 0, 0)?;
        }

        // Step 5: Completeness
        self.finalize()
    }

    /// Flushes and releases the file, then checks that everything declared was written.
    ///
    /// Only the first call does anything; later calls return `Ok(())`.
    ///
    /// # Errors
    /// [`CphdError::IncompleteWrite`] naming every short channel or support array.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        if let Some(mut store) = self.store.take() {
            store.flush()?;
        }

        let shortfalls = self.shortfalls();
        if shortfalls.is_empty() {
            info!("CPHD file written: {}", self.path.display());
            return Ok(());
        }
        error!(
            "CPHD file {} is not completely written, and the result may be corrupt.",
            self.path.display()
        );
        for line in &shortfalls {
            error!("{}", line);
        }
        Err(CphdError::IncompleteWrite {
            path: self.path.clone(),
            details: shortfalls.join("\n"),
        })
    }

    /// Finalizes and consumes the writer.
    pub fn close(mut self) -> Result<()> {
        self.finalize()
    }

    fn shortfalls(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (i, channel) in self.metadata.channels.iter().enumerate() {
            if self.pvp_written[i] < channel.num_vectors {
                lines.push(format!(
                    "PVP block: identifier {}, {} of {} vectors written",
                    channel.identifier, self.pvp_written[i], channel.num_vectors
                ));
            }
            if self.signal_written[i] < channel.num_pixels() {
                lines.push(format!(
                    "Signal block: identifier {}, {} of {} pixels written",
                    channel.identifier,
                    self.signal_written[i],
                    channel.num_pixels()
                ));
            }
        }
        for (i, entry) in self.metadata.support_arrays.iter().enumerate() {
            if self.support_written[i] < entry.num_pixels() {
                lines.push(format!(
                    "Support block: identifier {}, {} of {} pixels written",
                    entry.identifier,
                    self.support_written[i],
                    entry.num_pixels()
                ));
            }
        }
        lines
    }
}

impl Drop for CphdWriter {
    fn drop(&mut self) {
        if !self.finalized
            && let Err(e) = self.finalize()
        {
            error!("Failed to finalize CPHD file on drop: {}", e);
        }
    }
}

fn check_width(kind: &str, identifier: &str, data: &ElementArray, expected: usize) -> Result<()> {
    let got = data.format().size();
    if got != expected {
        return Err(CphdError::InvalidInput(format!(
            "{} {} expects {} byte elements, got {} ({} bytes)",
            kind,
            identifier,
            expected,
            data.format(),
            got
        )));
    }
    Ok(())
}

fn check_shape(kind: &str, identifier: &str, data: &ElementArray, expected: &[usize]) -> Result<()> {
    if data.shape() != expected {
        return Err(CphdError::InvalidInput(format!(
            "{} {} expects shape {:?}, got {:?}",
            kind,
            identifier,
            expected,
            data.shape()
        )));
    }
    Ok(())
}

fn check_extent(
    kind: &str,
    identifier: &str,
    (start_row, start_col): (usize, usize),
    (rows, cols): (usize, usize),
    (num_rows, num_cols): (usize, usize),
) -> Result<()> {
    if start_row + rows > num_rows || start_col + cols > num_cols {
        return Err(CphdError::Range(format!(
            "Writing {} x {} at ({}, {}) exceeds the {} x {} {} {}",
            rows, cols, start_row, start_col, num_rows, num_cols, kind, identifier
        )));
    }
    Ok(())
}

fn check_identifiers<'a>(
    kind: &str,
    supplied: impl Iterator<Item = &'a String>,
    declared: &[String],
) -> Result<()> {
    let supplied: BTreeSet<&str> = supplied.map(String::as_str).collect();
    let declared: BTreeSet<&str> = declared.iter().map(String::as_str).collect();
    if supplied != declared {
        return Err(CphdError::InvalidInput(format!(
            "{} identifiers {:?} do not match the declared {:?}",
            kind, supplied, declared
        )));
    }
    Ok(())
}

/// Orders entries by declared offset and checks they tile the block from zero.
fn contiguous_order<'a>(
    kind: &str,
    entries: impl Iterator<Item = (&'a str, u64, u64)>,
) -> Result<Vec<String>> {
    let mut entries: Vec<_> = entries.collect();
    entries.sort_by_key(|&(_, offset, _)| offset);

    let mut expected = 0u64;
    for &(identifier, offset, size) in &entries {
        if offset != expected {
            return Err(CphdError::Format(format!(
                "{} array {} is declared at offset {}, expected {} for a contiguous layout",
                kind, identifier, offset, expected
            )));
        }
        expected = checked_end(kind, expected, size)?;
    }
    Ok(entries.into_iter().map(|(identifier, _, _)| identifier.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_layout_accepts_tiling_offsets_in_any_order() {
        let order = contiguous_order("support", [("b", 50, 10), ("a", 0, 50)].into_iter()).unwrap();
        assert_eq!(order, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn contiguous_layout_rejects_overlaps_and_gaps() {
        let overlapping = [("a", 0, 50), ("b", 50, 40), ("c", 40, 10)];
        assert!(matches!(contiguous_order("support", overlapping.into_iter()), Err(CphdError::Format(_))));
        let gap = [("a", 8, 8)];
        assert!(contiguous_order("PVP", gap.into_iter()).is_err());
    }

    #[test]
    fn identifier_sets_must_match_exactly() {
        let declared = vec!["A".to_string(), "B".to_string()];
        let supplied = ["B".to_string(), "A".to_string()];
        assert!(check_identifiers("signal", supplied.iter(), &declared).is_ok());
        let missing = ["A".to_string()];
        assert!(matches!(
            check_identifiers("signal", missing.iter(), &declared),
            Err(CphdError::InvalidInput(_))
        ));
    }
}
