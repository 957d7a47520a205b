//! Reader for version 0.3 files. There are no support arrays in 0.3.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use ndarray::ArrayD;
use num_complex::Complex32;

use super::PhaseHistoryRead;
use super::access::ChannelSet;
use crate::cphd::codec::pvp::PvpRecords;
use crate::cphd::details::CphdDetails;
use crate::cphd::format::range::RangeSpec;
use crate::cphd::store::open_store;
use crate::cphd::types::elements::ElementArray;
use crate::cphd::types::error::{CphdError, Result};
use crate::cphd::types::models::{AccessPolicy, CphdVersion, EntryRef};

fn no_support_arrays() -> CphdError {
    CphdError::UnsupportedOperation("CPHD version 0.3 does not have support arrays".to_string())
}

/// Random access to the vector-based parameter and signal blocks of a 0.3 file.
#[derive(Debug, Clone)]
pub struct ReaderV0_3 {
    details: CphdDetails,
    channels: ChannelSet,
}

impl ReaderV0_3 {
    pub fn open(path: impl AsRef<Path>, policy: AccessPolicy) -> Result<Self> {
        Self::new(CphdDetails::open(path)?, policy)
    }

    /// # Errors
    /// [`CphdError::VersionMismatch`] if the file is not version 0.3.
    pub fn new(details: CphdDetails, policy: AccessPolicy) -> Result<Self> {
        let metadata = details.metadata().as_v0_3().ok_or_else(|| CphdError::VersionMismatch {
            expected: CphdVersion::V0_3.to_string(),
            found: details.header().version_string().to_string(),
        })?;
        let header = details.header();
        let store = open_store(details.path(), policy)?;
        let channels = ChannelSet::new(
            &store,
            &metadata.channels,
            &metadata.vector_parameters,
            metadata.sample_type,
            None,
            header.pvp_block(),
            header.signal_block(),
        )?;

        info!(
            "Opened 0.3 reader over {} with {:?} access",
            details.path().display(),
            policy
        );
        Ok(Self { details, channels })
    }
}

impl PhaseHistoryRead for ReaderV0_3 {
    fn details(&self) -> &CphdDetails {
        &self.details
    }

    fn channel_identifiers(&self) -> &[String] {
        self.channels.identifiers()
    }

    fn support_identifiers(&self) -> &[String] {
        &[]
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
        _array: impl Into<EntryRef<'a>>,
        _dim1: impl Into<RangeSpec>,
        _dim2: impl Into<RangeSpec>,
    ) -> Result<ElementArray> {
        Err(no_support_arrays())
    }

    fn read_pvp_block_all(&self) -> Result<BTreeMap<String, PvpRecords>> {
        self.channels.read_pvp_block_all()
    }

    fn read_support_block_all(&self) -> Result<BTreeMap<String, ElementArray>> {
        Err(no_support_arrays())
    }

    fn read_signal_block_all(&self) -> Result<BTreeMap<String, ArrayD<Complex32>>> {
        self.channels.read_signal_block_all()
    }
}
