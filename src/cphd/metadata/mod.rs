//! Metadata binding for both CPHD schemas.
//!
//! The XML block is parsed into an element tree by [`xml`], then bound into
//! the version-specific [`MetadataV0_3`] or [`MetadataV1_0`]. [`Metadata`]
//! exposes what the readers need without caring which schema it came from.

pub mod pvp;
pub mod v0_3;
pub mod v1_0;
pub mod xml;

pub use pvp::{PvpField, PvpLayout};
pub use v0_3::MetadataV0_3;
pub use v1_0::{CollectionId, MetadataV1_0, SupportArrayKind, SupportArrayType};

use crate::cphd::types::error::Result;
use crate::cphd::types::models::{Channel, CphdVersion, SignalFormat, SupportArrayEntry};

/// A bound metadata tree of either version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metadata {
    V0_3(MetadataV0_3),
    V1_0(MetadataV1_0),
}

impl Metadata {
    /// Parses the XML block and binds it according to `version`.
    pub fn from_xml_bytes(bytes: &[u8], version: CphdVersion) -> Result<Self> {
        let (root, namespaces) = xml::parse(bytes)?;
        match version {
            CphdVersion::V0_3 => Ok(Metadata::V0_3(MetadataV0_3::bind(&root, &namespaces)?)),
            CphdVersion::V1_0 => Ok(Metadata::V1_0(MetadataV1_0::bind(&root, &namespaces)?)),
        }
    }

    pub fn version(&self) -> CphdVersion {
        match self {
            Metadata::V0_3(_) => CphdVersion::V0_3,
            Metadata::V1_0(_) => CphdVersion::V1_0,
        }
    }

    pub fn channels(&self) -> &[Channel] {
        match self {
            Metadata::V0_3(m) => &m.channels,
            Metadata::V1_0(m) => &m.channels,
        }
    }

    /// Support array entries; always empty for 0.3.
    pub fn support_arrays(&self) -> &[SupportArrayEntry] {
        match self {
            Metadata::V0_3(_) => &[],
            Metadata::V1_0(m) => &m.support_arrays,
        }
    }

    pub fn signal_format(&self) -> SignalFormat {
        match self {
            Metadata::V0_3(m) => m.sample_type,
            Metadata::V1_0(m) => m.signal_array_format,
        }
    }

    pub fn pvp_layout(&self) -> &PvpLayout {
        match self {
            Metadata::V0_3(m) => &m.vector_parameters,
            Metadata::V1_0(m) => &m.pvp,
        }
    }

    pub fn as_v1_0(&self) -> Option<&MetadataV1_0> {
        match self {
            Metadata::V1_0(m) => Some(m),
            Metadata::V0_3(_) => None,
        }
    }

    pub fn as_v0_3(&self) -> Option<&MetadataV0_3> {
        match self {
            Metadata::V0_3(m) => Some(m),
            Metadata::V1_0(_) => None,
        }
    }
}
