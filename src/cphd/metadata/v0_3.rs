//! Version 0.3 metadata binding.
//!
//! 0.3 has no channel identifiers or explicit per-channel offsets. Channels
//! are named by their decimal ordinal and their offsets are the running totals
//! of the preceding channels' sizes. Every vector parameter is a big-endian
//! double, with sizes given in bytes and offsets assigned in document order.

use log::{debug, warn};

use super::pvp::{PvpField, PvpLayout};
use super::xml::{NamespaceMap, XmlNode};
use crate::cphd::types::error::{CphdError, Result};
use crate::cphd::types::models::{Channel, SignalFormat};
use crate::cphd::utils::{byte_span, checked_end};

const DOUBLE_SIZE: usize = 8;

/// Bound version 0.3 metadata tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataV0_3 {
    pub namespace: Option<String>,
    pub classification: String,
    pub sample_type: SignalFormat,
    pub channels: Vec<Channel>,
    /// `record_size` is `Data/NumBytesVBP`.
    pub vector_parameters: PvpLayout,
}

impl MetadataV0_3 {
    pub fn bind(root: &XmlNode, namespaces: &NamespaceMap) -> Result<Self> {
        if root.name != "CPHD" {
            return Err(CphdError::Format(format!("Expected root element CPHD, got {}", root.name)));
        }

        let classification = root
            .child("CollectionInfo")
            .and_then(|info| info.child_text("Classification"))
            .unwrap_or_default()
            .to_string();

        let data = root.require("Data")?;
        let sample_type = SignalFormat::from_v0_3_str(data.require("SampleType")?.text())?;
        let num_bytes_vbp: usize = data.parse_child("NumBytesVBP")?;
        let declared_channels: usize = data.parse_child("NumCPHDChannels")?;

        let bytes_per_sample = sample_type.bytes_per_sample();
        let mut channels = Vec::new();
        let mut signal_offset = 0u64;
        let mut pvp_offset = 0u64;
        for (ordinal, array_size) in data.children_named("ArraySize").enumerate() {
            let num_vectors: usize = array_size.parse_child("NumVectors")?;
            let num_samples: usize = array_size.parse_child("NumSamples")?;
            let channel = Channel {
                identifier: ordinal.to_string(),
                num_vectors,
                num_samples,
                signal_array_byte_offset: signal_offset,
                pvp_array_byte_offset: pvp_offset,
            };
            signal_offset = checked_end("signal array", signal_offset, byte_span(channel.num_pixels(), bytes_per_sample)?)?;
            pvp_offset = checked_end("VB array", pvp_offset, byte_span(num_vectors, num_bytes_vbp)?)?;
            channels.push(channel);
        }
        if channels.len() != declared_channels {
            return Err(CphdError::Format(format!(
                "NumCPHDChannels is {} but {} array sizes are listed",
                declared_channels,
                channels.len()
            )));
        }

        let vector_parameters = bind_vector_parameters(root.require("VectorParameters")?, num_bytes_vbp)?;
        if vector_parameters.fields_size() != num_bytes_vbp {
            warn!(
                "NumBytesVBP is {} but vector parameters occupy {} bytes",
                num_bytes_vbp,
                vector_parameters.fields_size()
            );
        }

        debug!(
            "Bound 0.3 metadata: {} channels, {} vector parameters, sample type {}",
            channels.len(),
            vector_parameters.fields.len(),
            sample_type.as_str()
        );
        Ok(Self {
            namespace: namespaces.get("default").cloned(),
            classification,
            sample_type,
            channels,
            vector_parameters,
        })
    }
}

/// Flattens `VectorParameters` in document order; nested groups such as
/// `FxParameters` contribute their leaf children.
fn bind_vector_parameters(node: &XmlNode, record_size: usize) -> Result<PvpLayout> {
    let mut fields = Vec::new();
    let mut offset = 0;
    let leaves = node.children.iter().flat_map(|child| {
        if child.children.is_empty() {
            std::slice::from_ref(child).iter()
        } else {
            child.children.iter()
        }
    });
    for leaf in leaves {
        let size: usize = leaf.parse_text()?;
        if size == 0 || size % DOUBLE_SIZE != 0 {
            return Err(CphdError::Format(format!(
                "Vector parameter {} has size {}, not a whole number of doubles",
                leaf.name, size
            )));
        }
        if size > record_size {
            return Err(CphdError::Format(format!(
                "Vector parameter {} has size {}, larger than the {} byte record",
                leaf.name, size, record_size
            )));
        }
        fields.push(PvpField::new(leaf.name.as_str(), offset, size, double_format(size / DOUBLE_SIZE)));
        offset = offset.saturating_add(size);
    }
    Ok(PvpLayout::new(record_size, fields))
}

fn double_format(depth: usize) -> String {
    match depth {
        1 => "F8".to_string(),
        3 => "X=F8;Y=F8;Z=F8;".to_string(),
        _ => (0..depth).map(|i| format!("V{}=F8;", i)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cphd::metadata::xml;

    const DOCUMENT: &str = r#"<CPHD>
  <CollectionInfo><Classification>UNCLASSIFIED</Classification></CollectionInfo>
  <Data>
    <SampleType>RE16I_IM16I</SampleType>
    <NumCPHDChannels>3</NumCPHDChannels>
    <NumBytesVBP>96</NumBytesVBP>
    <ArraySize><NumVectors>4</NumVectors><NumSamples>5</NumSamples></ArraySize>
    <ArraySize><NumVectors>2</NumVectors><NumSamples>5</NumSamples></ArraySize>
    <ArraySize><NumVectors>3</NumVectors><NumSamples>2</NumSamples></ArraySize>
  </Data>
  <VectorParameters>
    <TxTime>8</TxTime>
    <TxPos>24</TxPos>
    <RcvTime>8</RcvTime>
    <RcvPos>24</RcvPos>
    <SRPPos>24</SRPPos>
    <FxParameters><Fx0>8</Fx0></FxParameters>
  </VectorParameters>
</CPHD>"#;

    fn bound() -> MetadataV0_3 {
        let (root, namespaces) = xml::parse(DOCUMENT.as_bytes()).unwrap();
        MetadataV0_3::bind(&root, &namespaces).unwrap()
    }

    #[test]
    fn synthesizes_identifiers_and_cumulative_offsets() {
        let metadata = bound();
        let ids: Vec<_> = metadata.channels.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2"]);
        let signal: Vec<_> = metadata.channels.iter().map(|c| c.signal_array_byte_offset).collect();
        assert_eq!(signal, vec![0, 80, 120]);
        let pvp: Vec<_> = metadata.channels.iter().map(|c| c.pvp_array_byte_offset).collect();
        assert_eq!(pvp, vec![0, 384, 576]);
    }

    #[test]
    fn vector_parameters_follow_document_order() {
        let layout = bound().vector_parameters;
        assert_eq!(layout.fields_size(), 96);
        let fx0 = layout.field("Fx0").unwrap();
        assert_eq!((fx0.offset, fx0.size), (88, 8));
        assert_eq!(layout.field("RcvPos").unwrap().offset, 40);
        assert!(layout.validate().is_ok());
    }
}
