//! Range-addressed access to the signal, PVP and support blocks.
//!
//! Both version readers bind their metadata to a [`ChannelSet`]; the 1.0
//! reader also binds a [`SupportSet`]. All byte access goes through a shared
//! [`ByteStore`], so the mapped and buffered policies behave identically.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, trace, warn};
use ndarray::ArrayD;
use num_complex::Complex32;

use crate::cphd::codec::pvp::PvpRecords;
use crate::cphd::codec::transform::{apply_amplitude_scale, pair_to_complex};
use crate::cphd::format::header::BlockExtent;
use crate::cphd::format::range::{RangeSpec, Resolved};
use crate::cphd::index::IdentifierIndex;
use crate::cphd::metadata::{MetadataV1_0, PvpLayout};
use crate::cphd::store::{ByteStore, Region};
use crate::cphd::types::elements::{ElementArray, ElementLayout};
use crate::cphd::types::error::{CphdError, Result};
use crate::cphd::types::models::{Channel, EntryRef, SignalFormat, SupportArrayEntry};
use crate::cphd::utils::{byte_span, checked_end};

/// Name of the optional amplitude scale PVP field.
pub const AMPLITUDE_SCALE_FIELD: &str = "AmpSF";

fn block_region(
    store: &Arc<dyn ByteStore>,
    block: BlockExtent,
    kind: &str,
    identifier: &str,
    relative_offset: u64,
    size: u64,
) -> Result<Region> {
    let fits = relative_offset
        .checked_add(size)
        .is_some_and(|end| end <= block.size);
    if !fits {
        return Err(CphdError::Format(format!(
            "{} {} at [{}, +{}) runs past its block of {} bytes",
            kind, identifier, relative_offset, size, block.size
        )));
    }
    Region::new(Arc::clone(store), checked_end(kind, block.offset, relative_offset)?, size)
}

/// Shape of a 2-D read with collapsed axes dropped, plus trailing cell dimensions.
fn result_shape(rows: &Resolved, cols: &Resolved, trailing: &[usize]) -> Vec<usize> {
    let mut shape = Vec::with_capacity(2 + trailing.len());
    if !rows.is_collapsed() {
        shape.push(rows.len());
    }
    if !cols.is_collapsed() {
        shape.push(cols.len());
    }
    shape.extend_from_slice(trailing);
    shape
}

/// Reads the selected cells of a row-major grid stored in `region`.
///
/// Each selected row is fetched as one span covering the selected columns,
/// then the columns are picked out in selection order.
fn read_grid(region: &Region, num_cols: usize, cell_size: usize, rows: &Resolved, cols: &Resolved) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(rows.len() * cols.len() * cell_size);
    let Some((first_col, last_col)) = cols.bounds() else {
        return Ok(out);
    };
    let span_cols = last_col - first_col + 1;
    let mut row_buf = vec![0u8; span_cols * cell_size];

    for row in rows.indices() {
        let offset = byte_span(row * num_cols + first_col, cell_size)?;
        region.read(offset, &mut row_buf)?;
        for col in cols.indices() {
            let start = (col - first_col) * cell_size;
            out.extend_from_slice(&row_buf[start..start + cell_size]);
        }
    }
    Ok(out)
}

/// One channel bound to its signal and PVP regions.
///
/// `signal` is `None` when the signal block is compressed.
#[derive(Debug, Clone)]
struct ChannelAccess {
    channel: Channel,
    signal: Option<Region>,
    pvp: Region,
}

/// Every channel of a file, addressable by ordinal or identifier.
#[derive(Debug, Clone)]
pub struct ChannelSet {
    index: IdentifierIndex,
    channels: Vec<ChannelAccess>,
    layout: PvpLayout,
    format: SignalFormat,
    compression_id: Option<String>,
}

impl ChannelSet {
    /// Binds every channel to its regions.
    ///
    /// With a `compression_id` the signal block holds compressed data of
    /// unknown per-channel size, so only the PVP regions are bound.
    ///
    /// # Errors
    /// [`CphdError::Format`] if a PVP field lies outside the record or a
    /// channel's arrays run past their block.
    pub fn new(
        store: &Arc<dyn ByteStore>,
        channels: &[Channel],
        layout: &PvpLayout,
        format: SignalFormat,
        compression_id: Option<String>,
        pvp_block: BlockExtent,
        signal_block: BlockExtent,
    ) -> Result<Self> {
        let index = IdentifierIndex::new("channel", channels.iter().map(|c| c.identifier.clone()))?;
        layout.check_fields()?;
        if layout.fields_size() != layout.record_size {
            warn!(
                "PVP record size {} does not equal the sum of field sizes {}",
                layout.record_size,
                layout.fields_size()
            );
        }

        let bytes_per_sample = format.bytes_per_sample();
        let mut bound = Vec::with_capacity(channels.len());
        for channel in channels {
            let signal = match compression_id {
                Some(_) => None,
                None => Some(block_region(
                    store,
                    signal_block,
                    "Signal array",
                    &channel.identifier,
                    channel.signal_array_byte_offset,
                    byte_span(channel.num_pixels(), bytes_per_sample)?,
                )?),
            };
            let pvp = block_region(
                store,
                pvp_block,
                "PVP array",
                &channel.identifier,
                channel.pvp_array_byte_offset,
                byte_span(channel.num_vectors, layout.record_size)?,
            )?;
            debug!(
                "Channel {}: {} x {} samples at {:?}, PVP at {}",
                channel.identifier,
                channel.num_vectors,
                channel.num_samples,
                signal.as_ref().map(Region::offset),
                pvp.offset()
            );
            bound.push(ChannelAccess { channel: channel.clone(), signal, pvp });
        }
        if let Some(id) = &compression_id {
            debug!("Signal block is compressed with {}; only PVP data is bound", id);
        }

        Ok(Self {
            index,
            channels: bound,
            layout: layout.clone(),
            format,
            compression_id,
        })
    }

    pub fn identifiers(&self) -> &[String] {
        self.index.identifiers()
    }

    fn get(&self, channel: EntryRef<'_>) -> Result<&ChannelAccess> {
        Ok(&self.channels[self.index.position(channel)?])
    }

    /// Raw, unscaled signal samples in their on-disk complex format.
    pub fn read_raw_signal(&self, dim1: RangeSpec, dim2: RangeSpec, channel: EntryRef<'_>) -> Result<ElementArray> {
        let access = self.get(channel)?;
        let signal = match (&self.compression_id, &access.signal) {
            (None, Some(signal)) => signal,
            (id, _) => {
                return Err(CphdError::UnsupportedOperation(format!(
                    "Reading compressed signal data ({}) is not supported",
                    id.as_deref().unwrap_or("unknown")
                )));
            }
        };
        let rows = dim1.resolve(access.channel.num_vectors)?;
        let cols = dim2.resolve(access.channel.num_samples)?;
        trace!(
            "Signal read on channel {}: rows {:?} cols {:?}",
            access.channel.identifier,
            rows.as_tuple(),
            cols.as_tuple()
        );

        let element = self.format.element_format();
        let bytes = read_grid(signal, access.channel.num_samples, element.size(), &rows, &cols)?;
        ElementArray::from_be_bytes(element, &result_shape(&rows, &cols, &[]), &bytes)
    }

    /// Signal samples as `Complex32`, scaled by `AmpSF` when the file has it.
    pub fn read_signal(&self, dim1: RangeSpec, dim2: RangeSpec, channel: EntryRef<'_>) -> Result<ArrayD<Complex32>> {
        let raw = self.read_raw_signal(dim1, dim2, channel)?;
        let mut data = pair_to_complex(&raw)?;
        if let Some(scale) = self.read_pvp_field(AMPLITUDE_SCALE_FIELD, channel, dim1)? {
            apply_amplitude_scale(&mut data, &scale.to_f32()?)?;
        }
        Ok(data)
    }

    /// One PVP field over the selected vectors, or `None` if the layout lacks it.
    pub fn read_pvp_field(&self, name: &str, channel: EntryRef<'_>, range: RangeSpec) -> Result<Option<ElementArray>> {
        let Some(field) = self.layout.field(name) else {
            return Ok(None);
        };
        let access = self.get(channel)?;
        let rows = range.resolve(access.channel.num_vectors)?;

        let mut bytes = vec![0u8; rows.len() * field.size];
        for (row, chunk) in rows.indices().zip(bytes.chunks_exact_mut(field.size)) {
            let offset = byte_span(row, self.layout.record_size)? + field.offset as u64;
            access.pvp.read(offset, chunk)?;
        }
        field.decode(rows.len(), &bytes).map(Some)
    }

    /// Complete PVP records over the selected vectors.
    pub fn read_pvp_records(&self, channel: EntryRef<'_>, range: RangeSpec) -> Result<PvpRecords> {
        let access = self.get(channel)?;
        let rows = range.resolve(access.channel.num_vectors)?;
        let record_size = self.layout.record_size;

        let mut bytes = vec![0u8; rows.len() * record_size];
        for (row, chunk) in rows.indices().zip(bytes.chunks_exact_mut(record_size.max(1))) {
            access.pvp.read(byte_span(row, record_size)?, chunk)?;
        }
        PvpRecords::new(self.layout.clone(), bytes)
    }

    pub fn read_pvp_block_all(&self) -> Result<BTreeMap<String, PvpRecords>> {
        self.identifiers()
            .iter()
            .map(|id| Ok((id.clone(), self.read_pvp_records(EntryRef::from(id), RangeSpec::All)?)))
            .collect()
    }

    pub fn read_signal_block_all(&self) -> Result<BTreeMap<String, ArrayD<Complex32>>> {
        self.identifiers()
            .iter()
            .map(|id| Ok((id.clone(), self.read_signal(RangeSpec::All, RangeSpec::All, EntryRef::from(id))?)))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct SupportAccess {
    entry: SupportArrayEntry,
    layout: ElementLayout,
    region: Region,
}

/// Every support array of a 1.0 file, addressable by ordinal or identifier.
#[derive(Debug, Clone)]
pub struct SupportSet {
    index: IdentifierIndex,
    arrays: Vec<SupportAccess>,
}

impl SupportSet {
    pub fn new(store: &Arc<dyn ByteStore>, metadata: &MetadataV1_0, support_block: Option<BlockExtent>) -> Result<Self> {
        let entries = &metadata.support_arrays;
        let index = IdentifierIndex::new("support array", entries.iter().map(|s| s.identifier.clone()))?;
        if entries.is_empty() {
            return Ok(Self { index, arrays: Vec::new() });
        }
        let block = support_block.ok_or_else(|| {
            CphdError::Format("Support arrays are declared but the header has no support block".to_string())
        })?;

        let mut arrays = Vec::with_capacity(entries.len());
        for entry in entries {
            let layout = metadata.support_layout(entry)?;
            let region = block_region(
                store,
                block,
                "Support array",
                &entry.identifier,
                entry.array_byte_offset,
                entry.byte_size()?,
            )?;
            debug!(
                "Support array {}: {} x {} of {} (depth {}) at {}",
                entry.identifier,
                entry.num_rows,
                entry.num_cols,
                layout.format,
                layout.depth,
                region.offset()
            );
            arrays.push(SupportAccess { entry: entry.clone(), layout, region });
        }
        Ok(Self { index, arrays })
    }

    pub fn identifiers(&self) -> &[String] {
        self.index.identifiers()
    }

    /// The selected cells; vector-valued cells add a trailing depth axis.
    pub fn read(&self, array: EntryRef<'_>, dim1: RangeSpec, dim2: RangeSpec) -> Result<ElementArray> {
        let access = &self.arrays[self.index.position(array)?];
        let rows = dim1.resolve(access.entry.num_rows)?;
        let cols = dim2.resolve(access.entry.num_cols)?;
        trace!(
            "Support read on {}: rows {:?} cols {:?}",
            access.entry.identifier,
            rows.as_tuple(),
            cols.as_tuple()
        );

        let bytes = read_grid(&access.region, access.entry.num_cols, access.layout.byte_size(), &rows, &cols)?;
        let trailing: &[usize] = if access.layout.depth > 1 { &[access.layout.depth] } else { &[] };
        ElementArray::from_be_bytes(access.layout.format, &result_shape(&rows, &cols, trailing), &bytes)
    }

    pub fn read_all(&self) -> Result<BTreeMap<String, ElementArray>> {
        self.identifiers()
            .iter()
            .map(|id| Ok((id.clone(), self.read(EntryRef::from(id), RangeSpec::All, RangeSpec::All)?)))
            .collect()
    }
}
