//! Version 1.0 metadata: binding, serialization and block layout.
//!
//! Only the parts of the tree the container codec needs are modelled:
//! `CollectionID` classification, `Data` geometry, the `PVP` layout and the
//! `SupportArray` type descriptors. Every other element is carried through
//! untouched so a bound document serializes back without loss.

use log::{debug, trace};

use super::pvp::{PvpField, PvpLayout};
use super::xml::{self, NamespaceMap, XmlNode};
use crate::cphd::format::header::{BlockExtent, FileHeader, HeaderV1_0, SECTION_TERMINATOR};
use crate::cphd::index::IdentifierIndex;
use crate::cphd::types::elements::ElementLayout;
use crate::cphd::types::error::{CphdError, Result};
use crate::cphd::types::models::{Channel, SignalFormat, SupportArrayEntry};
use crate::cphd::utils::{align_up, byte_span, checked_end};

/// Namespace written when the metadata does not carry one.
pub const DEFAULT_NAMESPACE: &str = "http://api.nsgreg.nga.mil/schema/cphd/1.0.1";

/// Version string written on the first line of new files.
pub const WRITE_VERSION: &str = "1.0.1";

/// The XML block never starts before this offset.
pub const XML_BLOCK_MIN_OFFSET: u64 = 1024;

/// Every block written starts on a multiple of this.
pub const BLOCK_ALIGNMENT: u64 = 64;

/// PVP offsets and sizes are stored in 8-byte words.
const PVP_WORD: usize = 8;

const TOP_LEVEL_ORDER: &[&str] = &[
    "CollectionID", "Global", "SceneCoordinates", "Data", "Channel", "PVP", "SupportArray", "Dwell",
    "ReferenceGeometry", "Antenna", "TxRcv", "ErrorParameters", "ProductInfo", "GeoInfo", "MatchInfo",
];

const COLLECTION_ID_ORDER: &[&str] = &[
    "CollectorName", "IlluminatorName", "CoreName", "CollectType", "RadarMode", "Classification",
    "ReleaseInfo", "CountryCode", "Parameter",
];

const PVP_ORDER: &[&str] = &[
    "TxTime", "TxPos", "TxVel", "RcvTime", "RcvPos", "RcvVel", "SRPPos", "AmpSF", "aFDOP", "aFRR1",
    "aFRR2", "FX1", "FX2", "FXN1", "FXN2", "TOA1", "TOA2", "TOAE1", "TOAE2", "TDTropoSRP",
    "TDIonoSRP", "SC0", "SCSS", "SIGNAL", "AddedPVP",
];

/// Classification strings from `CollectionID`, plus its other children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectionId {
    pub classification: String,
    pub release_info: String,
    pub extra: Vec<XmlNode>,
}

/// The three kinds of support array type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportArrayKind {
    IazArray,
    AntGainPhase,
    AddedSupportArray,
}

impl SupportArrayKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "IAZArray" => Some(Self::IazArray),
            "AntGainPhase" => Some(Self::AntGainPhase),
            "AddedSupportArray" => Some(Self::AddedSupportArray),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::IazArray => "IAZArray",
            Self::AntGainPhase => "AntGainPhase",
            Self::AddedSupportArray => "AddedSupportArray",
        }
    }
}

/// Type descriptor of one support array: its element format and any other parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportArrayType {
    pub kind: SupportArrayKind,
    pub identifier: String,
    pub element_format: String,
    pub extra: Vec<XmlNode>,
}

impl SupportArrayType {
    pub fn new(kind: SupportArrayKind, identifier: impl Into<String>, element_format: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            element_format: element_format.into(),
            extra: Vec::new(),
        }
    }

    pub fn layout(&self) -> Result<ElementLayout> {
        ElementLayout::parse(&self.element_format)
    }
}

/// Bound version 1.0 metadata tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataV1_0 {
    /// Default namespace of the source document, if any.
    pub namespace: Option<String>,
    pub collection_id: CollectionId,
    pub signal_array_format: SignalFormat,
    pub signal_compression_id: Option<String>,
    pub channels: Vec<Channel>,
    pub support_arrays: Vec<SupportArrayEntry>,
    /// `record_size` is `Data/NumBytesPVP`.
    pub pvp: PvpLayout,
    pub support_array_types: Vec<SupportArrayType>,
    /// Top-level elements that are not modelled.
    pub extra: Vec<XmlNode>,
}

impl MetadataV1_0 {
    /// A minimal tree with no support arrays and no unmodelled elements.
    pub fn new(
        classification: impl Into<String>,
        release_info: impl Into<String>,
        signal_array_format: SignalFormat,
        pvp: PvpLayout,
        channels: Vec<Channel>,
    ) -> Self {
        Self {
            namespace: None,
            collection_id: CollectionId {
                classification: classification.into(),
                release_info: release_info.into(),
                extra: Vec::new(),
            },
            signal_array_format,
            signal_compression_id: None,
            channels,
            support_arrays: Vec::new(),
            pvp,
            support_array_types: Vec::new(),
            extra: Vec::new(),
        }
    }

    /// Binds a parsed `<CPHD>` element.
    pub fn bind(root: &XmlNode, namespaces: &NamespaceMap) -> Result<Self> {
        if root.name != "CPHD" {
            return Err(CphdError::Format(format!("Expected root element CPHD, got {}", root.name)));
        }

        let collection_id = bind_collection_id(root.require("CollectionID")?)?;
        let data = root.require("Data")?;
        let signal_array_format = SignalFormat::from_v1_0_str(data.require("SignalArrayFormat")?.text())?;
        let num_bytes_pvp: usize = data.parse_child("NumBytesPVP")?;
        let signal_compression_id = data.child_text("SignalCompressionID").map(str::to_string);

        let channels = data
            .children_named("Channel")
            .map(bind_channel)
            .collect::<Result<Vec<_>>>()?;
        let declared_channels: usize = data.parse_child("NumCPHDChannels")?;
        if declared_channels != channels.len() {
            return Err(CphdError::Format(format!(
                "NumCPHDChannels is {} but {} channels are listed",
                declared_channels,
                channels.len()
            )));
        }

        let support_arrays = data
            .children_named("SupportArray")
            .map(bind_support_entry)
            .collect::<Result<Vec<_>>>()?;
        if let Some(declared) = data.child("NumSupportArrays") {
            let declared: usize = declared.parse_text()?;
            if declared != support_arrays.len() {
                return Err(CphdError::Format(format!(
                    "NumSupportArrays is {} but {} support arrays are listed",
                    declared,
                    support_arrays.len()
                )));
            }
        }

        let pvp = bind_pvp(root.require("PVP")?, num_bytes_pvp)?;
        let support_array_types = match root.child("SupportArray") {
            Some(node) => bind_support_types(node)?,
            None => Vec::new(),
        };

        let extra = root
            .children
            .iter()
            .filter(|c| !matches!(c.name.as_str(), "CollectionID" | "Data" | "PVP" | "SupportArray"))
            .cloned()
            .collect();

        let metadata = Self {
            namespace: namespaces.get("default").cloned(),
            collection_id,
            signal_array_format,
            signal_compression_id,
            channels,
            support_arrays,
            pvp,
            support_array_types,
            extra,
        };
        debug!(
            "Bound 1.0 metadata: {} channels, {} support arrays, {} PVP fields, format {}",
            metadata.channels.len(),
            metadata.support_arrays.len(),
            metadata.pvp.fields.len(),
            metadata.signal_array_format.as_str()
        );
        Ok(metadata)
    }

    pub fn support_type(&self, identifier: &str) -> Option<&SupportArrayType> {
        self.support_array_types.iter().find(|t| t.identifier == identifier)
    }

    /// Element layout of a support array, checked against its declared bytes per element.
    pub fn support_layout(&self, entry: &SupportArrayEntry) -> Result<ElementLayout> {
        let support_type = self.support_type(&entry.identifier).ok_or_else(|| {
            CphdError::Format(format!("No support array type descriptor for {}", entry.identifier))
        })?;
        let layout = support_type.layout()?;
        if layout.byte_size() != entry.bytes_per_element {
            return Err(CphdError::Format(format!(
                "Support array {} declares {} bytes per element but format {} occupies {}",
                entry.identifier,
                entry.bytes_per_element,
                support_type.element_format,
                layout.byte_size()
            )));
        }
        Ok(layout)
    }

    /// Checks the invariants a writer relies on.
    pub fn validate(&self) -> Result<()> {
        IdentifierIndex::new("channel", self.channels.iter().map(|c| c.identifier.clone()))?;
        IdentifierIndex::new("support array", self.support_arrays.iter().map(|s| s.identifier.clone()))?;
        self.pvp.validate()?;
        for field in &self.pvp.fields {
            if field.offset % PVP_WORD != 0 || field.size % PVP_WORD != 0 {
                return Err(CphdError::Format(format!(
                    "PVP field {} is not aligned to {} byte words",
                    field.name, PVP_WORD
                )));
            }
        }
        for entry in &self.support_arrays {
            self.support_layout(entry)?;
        }
        Ok(())
    }

    pub fn to_xml_node(&self) -> XmlNode {
        let collection_id = {
            let mut children = self.collection_id.extra.clone();
            children.push(XmlNode::leaf("Classification", &self.collection_id.classification));
            children.push(XmlNode::leaf("ReleaseInfo", &self.collection_id.release_info));
            XmlNode { name: "CollectionID".to_string(), text: String::new(), children: in_order(children, COLLECTION_ID_ORDER) }
        };

        let mut data = XmlNode::new("Data")
            .with_child(XmlNode::leaf("SignalArrayFormat", self.signal_array_format.as_str()))
            .with_child(XmlNode::leaf("NumBytesPVP", self.pvp.record_size))
            .with_child(XmlNode::leaf("NumCPHDChannels", self.channels.len()));
        if let Some(id) = &self.signal_compression_id {
            data = data.with_child(XmlNode::leaf("SignalCompressionID", id));
        }
        for channel in &self.channels {
            data = data.with_child(
                XmlNode::new("Channel")
                    .with_child(XmlNode::leaf("Identifier", &channel.identifier))
                    .with_child(XmlNode::leaf("NumVectors", channel.num_vectors))
                    .with_child(XmlNode::leaf("NumSamples", channel.num_samples))
                    .with_child(XmlNode::leaf("SignalArrayByteOffset", channel.signal_array_byte_offset))
                    .with_child(XmlNode::leaf("PVPArrayByteOffset", channel.pvp_array_byte_offset)),
            );
        }
        data = data.with_child(XmlNode::leaf("NumSupportArrays", self.support_arrays.len()));
        for entry in &self.support_arrays {
            data = data.with_child(
                XmlNode::new("SupportArray")
                    .with_child(XmlNode::leaf("Identifier", &entry.identifier))
                    .with_child(XmlNode::leaf("NumRows", entry.num_rows))
                    .with_child(XmlNode::leaf("NumCols", entry.num_cols))
                    .with_child(XmlNode::leaf("BytesPerElement", entry.bytes_per_element))
                    .with_child(XmlNode::leaf("ArrayByteOffset", entry.array_byte_offset)),
            );
        }

        let pvp_fields = self
            .pvp
            .fields
            .iter()
            .map(|field| {
                let node = if PVP_ORDER.contains(&field.name.as_str()) && field.name != "AddedPVP" {
                    XmlNode::new(field.name.as_str())
                } else {
                    XmlNode::new("AddedPVP").with_child(XmlNode::leaf("Name", &field.name))
                };
                node.with_child(XmlNode::leaf("Offset", field.offset / PVP_WORD))
                    .with_child(XmlNode::leaf("Size", field.size / PVP_WORD))
                    .with_child(XmlNode::leaf("Format", &field.format))
            })
            .collect();
        let pvp = XmlNode { name: "PVP".to_string(), text: String::new(), children: in_order(pvp_fields, PVP_ORDER) };

        let mut top = vec![collection_id, data, pvp];
        if !self.support_array_types.is_empty() {
            let mut support = XmlNode::new("SupportArray");
            for support_type in &self.support_array_types {
                let mut node = XmlNode::new(support_type.kind.tag())
                    .with_child(XmlNode::leaf("Identifier", &support_type.identifier))
                    .with_child(XmlNode::leaf("ElementFormat", &support_type.element_format));
                node.children.extend(support_type.extra.iter().cloned());
                support = support.with_child(node);
            }
            top.push(support);
        }
        top.extend(self.extra.iter().cloned());

        XmlNode { name: "CPHD".to_string(), text: String::new(), children: in_order(top, TOP_LEVEL_ORDER) }
    }

    /// Serializes the tree under its own namespace, or [`DEFAULT_NAMESPACE`].
    pub fn to_xml_bytes(&self) -> Result<Vec<u8>> {
        let namespace = self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
        xml::serialize(&self.to_xml_node(), Some(namespace))
    }

    /// Bytes of the signal block implied by the channel table.
    pub fn signal_block_size(&self) -> Result<u64> {
        let bytes_per_sample = self.signal_array_format.bytes_per_sample();
        max_end(self.channels.iter().map(|c| {
            checked_end("signal array", c.signal_array_byte_offset, byte_span(c.num_pixels(), bytes_per_sample)?)
        }))
    }

    /// Bytes of the PVP block implied by the channel table.
    pub fn pvp_block_size(&self) -> Result<u64> {
        max_end(self.channels.iter().map(|c| {
            checked_end("PVP array", c.pvp_array_byte_offset, byte_span(c.num_vectors, self.pvp.record_size)?)
        }))
    }

    /// Bytes of the support block, or `None` when there are no support arrays.
    pub fn support_block_size(&self) -> Result<Option<u64>> {
        if self.support_arrays.is_empty() {
            return Ok(None);
        }
        max_end(
            self.support_arrays
                .iter()
                .map(|s| checked_end("support array", s.array_byte_offset, s.byte_size()?)),
        )
        .map(Some)
    }

    /// Computes a header whose block extents agree with this tree.
    ///
    /// Blocks are laid out XML, support, PVP, signal, each on a 64 byte
    /// boundary. The XML block starts at 1024, or at the first aligned
    /// position after the header text if that is longer.
    pub fn make_file_header(&self) -> Result<HeaderV1_0> {
        let xml_size = self.to_xml_bytes()?.len() as u64;
        let support_size = self.support_block_size()?;
        let pvp_size = self.pvp_block_size()?;
        let signal_size = self.signal_block_size()?;

        let mut xml_offset = XML_BLOCK_MIN_OFFSET;
        loop {
            let xml_end = checked_end("XML block", xml_offset, xml_size + SECTION_TERMINATOR.len() as u64)?;
            let support_block = match support_size {
                Some(size) => Some(BlockExtent::new(align_up(xml_end, BLOCK_ALIGNMENT)?, size)),
                None => None,
            };
            let pvp_start = match support_block {
                Some(block) => align_up(block.end()?, BLOCK_ALIGNMENT)?,
                None => align_up(xml_end, BLOCK_ALIGNMENT)?,
            };
            let signal_start = align_up(checked_end("PVP block", pvp_start, pvp_size)?, BLOCK_ALIGNMENT)?;
            let signal_block = BlockExtent::new(signal_start, signal_size);
            signal_block.end()?;

            let header = HeaderV1_0 {
                version: WRITE_VERSION.to_string(),
                xml_block: BlockExtent::new(xml_offset, xml_size),
                support_block,
                pvp_block: BlockExtent::new(pvp_start, pvp_size),
                signal_block,
                classification: self.collection_id.classification.clone(),
                release_info: self.collection_id.release_info.clone(),
            };

            let header_len = FileHeader::V1_0(header.clone()).to_bytes().len() + SECTION_TERMINATOR.len();
            if header_len as u64 <= xml_offset {
                trace!("Computed 1.0 layout: {:?}", header);
                return Ok(header);
            }
            xml_offset = align_up(header_len as u64, BLOCK_ALIGNMENT)?;
        }
    }
}

/// Largest of a set of checked block ends, zero for an empty set.
fn max_end(mut ends: impl Iterator<Item = Result<u64>>) -> Result<u64> {
    ends.try_fold(0, |largest, end| Ok(largest.max(end?)))
}

fn in_order(mut nodes: Vec<XmlNode>, order: &[&str]) -> Vec<XmlNode> {
    let rank = |node: &XmlNode| order.iter().position(|n| *n == node.name).unwrap_or(order.len());
    nodes.sort_by_key(rank);
    nodes
}

fn bind_collection_id(node: &XmlNode) -> Result<CollectionId> {
    Ok(CollectionId {
        classification: node.require("Classification")?.text().to_string(),
        release_info: node.require("ReleaseInfo")?.text().to_string(),
        extra: node
            .children
            .iter()
            .filter(|c| c.name != "Classification" && c.name != "ReleaseInfo")
            .cloned()
            .collect(),
    })
}

fn bind_channel(node: &XmlNode) -> Result<Channel> {
    Ok(Channel {
        identifier: node.require("Identifier")?.text().to_string(),
        num_vectors: node.parse_child("NumVectors")?,
        num_samples: node.parse_child("NumSamples")?,
        signal_array_byte_offset: node.parse_child("SignalArrayByteOffset")?,
        pvp_array_byte_offset: node.parse_child("PVPArrayByteOffset")?,
    })
}

fn bind_support_entry(node: &XmlNode) -> Result<SupportArrayEntry> {
    Ok(SupportArrayEntry {
        identifier: node.require("Identifier")?.text().to_string(),
        num_rows: node.parse_child("NumRows")?,
        num_cols: node.parse_child("NumCols")?,
        bytes_per_element: node.parse_child("BytesPerElement")?,
        array_byte_offset: node.parse_child("ArrayByteOffset")?,
    })
}

fn bind_pvp(node: &XmlNode, record_size: usize) -> Result<PvpLayout> {
    let mut fields = Vec::with_capacity(node.children.len());
    for child in &node.children {
        let name = if child.name == "AddedPVP" {
            child.require("Name")?.text().to_string()
        } else {
            child.name.clone()
        };
        let offset: usize = child.parse_child("Offset")?;
        let size: usize = child.parse_child("Size")?;
        let format = child.require("Format")?.text().to_string();
        let (Some(offset), Some(size)) = (offset.checked_mul(PVP_WORD), size.checked_mul(PVP_WORD)) else {
            return Err(CphdError::Format(format!("PVP field {} has an oversized offset or size", name)));
        };
        fields.push(PvpField::new(name, offset, size, format));
    }
    Ok(PvpLayout::new(record_size, fields))
}

fn bind_support_types(node: &XmlNode) -> Result<Vec<SupportArrayType>> {
    let mut types = Vec::with_capacity(node.children.len());
    for child in &node.children {
        let kind = SupportArrayKind::from_tag(&child.name).ok_or_else(|| {
            CphdError::Format(format!("Got unhandled support array type {}", child.name))
        })?;
        types.push(SupportArrayType {
            kind,
            identifier: child.require("Identifier")?.text().to_string(),
            element_format: child.require("ElementFormat")?.text().to_string(),
            extra: child
                .children
                .iter()
                .filter(|c| c.name != "Identifier" && c.name != "ElementFormat")
                .cloned()
                .collect(),
        });
    }
    Ok(types)
}
