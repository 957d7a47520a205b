//! Reader for version 1.0 files.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use ndarray::ArrayD;
use num_complex::Complex32;

use super::PhaseHistoryRead;
use super::access::{ChannelSet, SupportSet};
use crate::cphd::codec::pvp::PvpRecords;
use crate::cphd::details::CphdDetails;
use crate::cphd::format::range::RangeSpec;
use crate::cphd::metadata::MetadataV1_0;
use crate::cphd::store::open_store;
use crate::cphd::types::elements::ElementArray;
use crate::cphd::types::error::{CphdError, Result};
use crate::cphd::types::models::{AccessPolicy, CphdVersion, EntryRef};

/// Random access to the PVP, signal and support blocks of a 1.0 file.
#[derive(Debug, Clone)]
pub struct ReaderV1_0 {
    details: CphdDetails,
    channels: ChannelSet,
    supports: SupportSet,
}

impl ReaderV1_0 {
    pub fn open(path: impl AsRef<Path>, policy: AccessPolicy) -> Result<Self> {
        Self::new(CphdDetails::open(path)?, policy)
    }

    /// Binds parsed details to block stores.
    ///
    /// # Errors
    /// [`CphdError::VersionMismatch`] if the file is not version 1.0.
    pub fn new(details: CphdDetails, policy: AccessPolicy) -> Result<Self> {
        let metadata = details.metadata().as_v1_0().ok_or_else(|| CphdError::VersionMismatch {
            expected: CphdVersion::V1_0.to_string(),
            found: details.header().version_string().to_string(),
        })?;
        let header = details.header();
        let store = open_store(details.path(), policy)?;

        let channels = ChannelSet::new(
            &store,
            &metadata.channels,
            &metadata.pvp,
            metadata.signal_array_format,
            metadata.signal_compression_id.clone(),
            header.pvp_block(),
            header.signal_block(),
        )?;
        let supports = SupportSet::new(&store, metadata, header.support_block())?;

        info!(
            "Opened 1.0 reader over {} with {:?} access",
            details.path().display(),
            policy
        );
        Ok(Self { details, channels, supports })
    }

    pub fn metadata_v1_0(&self) -> Option<&MetadataV1_0> {
        self.details.metadata().as_v1_0()
    }
}

impl PhaseHistoryRead for ReaderV1_0 {
    fn details(&self) -> &CphdDetails {
        &self.details
    }

    fn channel_identifiers(&self) -> &[String] {
        self.channels.identifiers()
    }

    fn support_identifiers(&self) -> &[String] {
        self.supports.identifiers()
    }

    fn read_signal<'a>(
        &self,
        dim1: impl Into<RangeSpec>,
        dim2: impl Into<RangeSpec>,
        channel: impl Into<EntryRef<'a>>,
    ) -> Result<ArrayD<Complex32>> {
        self.channels.read_signal(dim1.into(), dim2.into(), channel.into())
    }

    fn read_raw_signal<'a>(
        &self,
        dim1: impl Into<RangeSpec>,
        dim2: impl Into<RangeSpec>,
        channel: impl Into<EntryRef<'a>>,
    ) -> Result<ElementArray> {
        self.channels.read_raw_signal(dim1.into(), dim2.into(), channel.into())
    }

    fn read_pvp_field<'a>(
        &self,
        name: &str,
        channel: impl Into<EntryRef<'a>>,
        range: impl Into<RangeSpec>,
    ) -> Result<Option<ElementArray>> {
        self.channels.read_pvp_field(name, channel.into(), range.into())
    }

    fn read_pvp_record_block<'a>(&self, channel: impl Into<EntryRef<'a>>, range: impl Into<RangeSpec>) -> Result<PvpRecords> {
        self.channels.read_pvp_records(channel.into(), range.into())
    }

    fn read_support<'a>(
        &self,
        array: impl Into<EntryRef<'a>>,
        dim1: impl Into<RangeSpec>,
        dim2: impl Into<RangeSpec>,
    ) -> Result<ElementArray> {
        self.supports.read(array.into(), dim1.into(), dim2.into())
    }

    fn read_pvp_block_all(&self) -> Result<BTreeMap<String, PvpRecords>> {
        self.channels.read_pvp_block_all()
    }

    fn read_support_block_all(&self) -> Result<BTreeMap<String, ElementArray>> {
        self.supports.read_all()
    }

    fn read_signal_block_all(&self) -> Result<BTreeMap<String, ArrayD<Complex32>>> {
        self.channels.read_signal_block_all()
    }
}
