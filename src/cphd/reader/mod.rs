//! Version-dispatching CPHD readers.
//!
//! [`CphdReader`] picks [`ReaderV0_3`] or [`ReaderV1_0`] from the version
//! line of the file. All three implement [`PhaseHistoryRead`], where every
//! channel or support array may be addressed by ordinal or by identifier.

mod access;
pub mod v0_3;
pub mod v1_0;

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;
use ndarray::ArrayD;
use num_complex::Complex32;

pub use access::AMPLITUDE_SCALE_FIELD;
pub use v0_3::ReaderV0_3;
pub use v1_0::ReaderV1_0;

use crate::cphd::codec::pvp::PvpRecords;
use crate::cphd::details::CphdDetails;
use crate::cphd::format::header::FileHeader;
use crate::cphd::format::range::RangeSpec;
use crate::cphd::metadata::Metadata;
use crate::cphd::types::elements::ElementArray;
use crate::cphd::types::error::{CphdError, Result};
use crate::cphd::types::models::{AccessPolicy, CphdVersion, EntryRef};

/// Read operations shared by both file versions.
pub trait PhaseHistoryRead {
    fn details(&self) -> &CphdDetails;

    fn version(&self) -> CphdVersion {
        self.details().version()
    }

    fn header(&self) -> &FileHeader {
        self.details().header()
    }

    fn metadata(&self) -> &Metadata {
        self.details().metadata()
    }

    /// Channel identifiers in ordinal order.
    fn channel_identifiers(&self) -> &[String];

    /// Support array identifiers in ordinal order; empty for 0.3.
    fn support_identifiers(&self) -> &[String];

    /// Signal samples of one channel as `Complex32`, scaled by `AmpSF` if present.
    ///
    /// `dim1` selects vectors and `dim2` samples. An axis selected by a single
    /// index is dropped from the result.
    fn read_signal<'a>(
        &self,
        dim1: impl Into<RangeSpec>,
        dim2: impl Into<RangeSpec>,
        channel: impl Into<EntryRef<'a>>,
    ) -> Result<ArrayD<Complex32>>;

    /// Like [`read_signal`](Self::read_signal), but unscaled and in the on-disk complex format.
    fn read_raw_signal<'a>(
        &self,
        dim1: impl Into<RangeSpec>,
        dim2: impl Into<RangeSpec>,
        channel: impl Into<EntryRef<'a>>,
    ) -> Result<ElementArray>;

    /// One PVP field over the selected vectors, or `None` if the file does not have it.
    fn read_pvp_field<'a>(
        &self,
        name: &str,
        channel: impl Into<EntryRef<'a>>,
        range: impl Into<RangeSpec>,
    ) -> Result<Option<ElementArray>>;

    /// Complete PVP records over the selected vectors.
    fn read_pvp_record_block<'a>(&self, channel: impl Into<EntryRef<'a>>, range: impl Into<RangeSpec>) -> Result<PvpRecords>;

    /// The selected cells of one support array.
    ///
    /// # Errors
    /// [`CphdError::UnsupportedOperation`] for 0.3 files.
    fn read_support<'a>(
        &self,
        array: impl Into<EntryRef<'a>>,
        dim1: impl Into<RangeSpec>,
        dim2: impl Into<RangeSpec>,
    ) -> Result<ElementArray>;

    fn read_pvp_block_all(&self) -> Result<BTreeMap<String, PvpRecords>>;

    fn read_support_block_all(&self) -> Result<BTreeMap<String, ElementArray>>;

    fn read_signal_block_all(&self) -> Result<BTreeMap<String, ArrayD<Complex32>>>;
}

/// A reader for whichever version the file turned out to be.
#[derive(Debug, Clone)]
pub enum CphdReader {
    V0_3(ReaderV0_3),
    V1_0(ReaderV1_0),
}

macro_rules! dispatch {
    ($self:expr, $reader:ident => $body:expr) => {
        match $self {
            CphdReader::V0_3($reader) => $body,
            CphdReader::V1_0($reader) => $body,
        }
    };
}

impl CphdReader {
    /// Opens a file with the default [`AccessPolicy`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, AccessPolicy::default())
    }

    pub fn open_with(path: impl AsRef<Path>, policy: AccessPolicy) -> Result<Self> {
        Self::from_details_with(CphdDetails::open(path)?, policy)
    }

    pub fn from_details(details: CphdDetails) -> Result<Self> {
        Self::from_details_with(details, AccessPolicy::default())
    }

    pub fn from_details_with(details: CphdDetails, policy: AccessPolicy) -> Result<Self> {
        debug!("Selecting reader for CPHD version {}", details.header().version_string());
        match details.version() {
            CphdVersion::V0_3 => Ok(CphdReader::V0_3(ReaderV0_3::new(details, policy)?)),
            CphdVersion::V1_0 => Ok(CphdReader::V1_0(ReaderV1_0::new(details, policy)?)),
        }
    }
}

impl PhaseHistoryRead for CphdReader {
    fn details(&self) -> &CphdDetails {
        dispatch!(self, r => r.details())
    }

    fn channel_identifiers(&self) -> &[String] {
        dispatch!(self, r => r.channel_identifiers())
    }

    fn support_identifiers(&self) -> &[String] {
        dispatch!(self, r => r.support_identifiers())
    }

    fn read_signal<'a>(
        &self,
        dim1: impl Into<RangeSpec>,
        dim2: impl Into<RangeSpec>,
        channel: impl Into<EntryRef<'a>>,
    ) -> Result<ArrayD<Complex32>> {
        let (dim1, dim2, channel) = (dim1.into(), dim2.into(), channel.into());
        dispatch!(self, r => r.read_signal(dim1, dim2, channel))
    }

    fn read_raw_signal<'a>(
        &self,
        dim1: impl Into<RangeSpec>,
        dim2: impl Into<RangeSpec>,
        channel: impl Into<EntryRef<'a>>,
    ) -> Result<ElementArray> {
        let (dim1, dim2, channel) = (dim1.into(), dim2.into(), channel.into());
        dispatch!(self, r => r.read_raw_signal(dim1, dim2, channel))
    }

    fn read_pvp_field<'a>(
        &self,
        name: &str,
        channel: impl Into<EntryRef<'a>>,
        range: impl Into<RangeSpec>,
    ) -> Result<Option<ElementArray>> {
        let (channel, range) = (channel.into(), range.into());
        dispatch!(self, r => r.read_pvp_field(name, channel, range))
    }

    fn read_pvp_record_block<'a>(&self, channel: impl Into<EntryRef<'a>>, range: impl Into<RangeSpec>) -> Result<PvpRecords> {
        let (channel, range) = (channel.into(), range.into());
        dispatch!(self, r => r.read_pvp_record_block(channel, range))
    }

    fn read_support<'a>(
        &self,
        array: impl Into<EntryRef<'a>>,
        dim1: impl Into<RangeSpec>,
        dim2: impl Into<RangeSpec>,
    ) -> Result<ElementArray> {
        let (array, dim1, dim2) = (array.into(), dim1.into(), dim2.into());
        dispatch!(self, r => r.read_support(array, dim1, dim2))
    }

    fn read_pvp_block_all(&self) -> Result<BTreeMap<String, PvpRecords>> {
        dispatch!(self, r => r.read_pvp_block_all())
    }

    fn read_support_block_all(&self) -> Result<BTreeMap<String, ElementArray>> {
        dispatch!(self, r => r.read_support_block_all())
    }

    fn read_signal_block_all(&self) -> Result<BTreeMap<String, ArrayD<Complex32>>> {
        dispatch!(self, r => r.read_signal_block_all())
    }
}

/// Opens `path` as a CPHD reader if it is one.
///
/// Returns `Ok(None)` for anything that is not a CPHD container. A file that
/// carries the signature but fails to parse is reported as an error.
pub fn is_container(path: impl AsRef<Path>) -> Result<Option<CphdReader>> {
    match CphdDetails::open(path) {
        Ok(details) => CphdReader::from_details(details).map(Some),
        Err(CphdError::NotAContainer(reason)) => {
            debug!("Not a CPHD container: {}", reason);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
