//! Minimal XML element tree used to bind and serialize CPHD metadata.
//!
//! Elements are stored by local name, so documents with or without a default
//! namespace bind identically. Namespace declarations are collected into a
//! [`NamespaceMap`] keyed by prefix; the default namespace is keyed `"default"`.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use log::trace;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::cphd::types::error::{CphdError, Result};

/// Namespace prefix → URI. The default namespace uses the key `"default"`.
pub type NamespaceMap = HashMap<String, String>;

/// One element: local name, concatenated text content, and child elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlNode {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// A leaf element holding `text`.
    pub fn leaf(name: impl Into<String>, text: impl ToString) -> Self {
        Self { name: name.into(), text: text.to_string(), children: Vec::new() }
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&XmlNode> {
        self.child(name).ok_or_else(|| {
            CphdError::Format(format!("Element {} is missing required child {}", self.name, name))
        })
    }

    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Parses this element's text as `T`.
    pub fn parse_text<T>(&self) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.text().parse::<T>().map_err(|e| {
            CphdError::Format(format!("Element {} has invalid value {:?}: {}", self.name, self.text(), e))
        })
    }

    /// Parses the text of the required child `name` as `T`.
    pub fn parse_child<T>(&self, name: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.require(name)?.parse_text()
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(XmlNode::text)
    }
}

/// Parses an XML document into its root element and namespace declarations.
pub fn parse(bytes: &[u8]) -> Result<(XmlNode, NamespaceMap)> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut namespaces = NamespaceMap::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let node = open_element(&e, &mut namespaces)?;
                stack.push(node);
            }
            Ok(Event::Empty(e)) => {
                let node = open_element(&e, &mut namespaces)?;
                attach(node, &mut stack, &mut root)?;
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| CphdError::Format("Unbalanced closing tag in metadata XML".to_string()))?;
                attach(node, &mut stack, &mut root)?;
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| {
                        CphdError::Format(format!("Failed to decode XML text: {}", e))
                    })?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(CphdError::Format(format!(
                    "Failed to read metadata XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(CphdError::Format("Metadata XML ended inside an open element".to_string()));
    }
    let root = root.ok_or_else(|| CphdError::Format("No root element found in metadata XML".to_string()))?;
    trace!("Parsed metadata XML root <{}> with namespaces {:?}", root.name, namespaces);
    Ok((root, namespaces))
}

fn open_element(e: &BytesStart, namespaces: &mut NamespaceMap) -> Result<XmlNode> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    for attr_result in e.attributes() {
        let attr = attr_result
            .map_err(|e| CphdError::Format(format!("Failed to parse XML attribute: {}", e)))?;
        let key = attr.key.as_ref();
        let prefix = if key == b"xmlns" {
            "default".to_string()
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            String::from_utf8_lossy(prefix).into_owned()
        } else {
            continue;
        };
        let value = attr
            .unescape_value()
            .map_err(|e| CphdError::Format(format!("Failed to decode XML value: {}", e)))?
            .into_owned();
        namespaces.insert(prefix, value);
    }
    Ok(XmlNode::new(name))
}

fn attach(node: XmlNode, stack: &mut [XmlNode], root: &mut Option<XmlNode>) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    } else if root.is_none() {
        *root = Some(node);
    } else {
        return Err(CphdError::Format("Metadata XML has more than one root element".to_string()));
    }
    Ok(())
}

fn write_error<E: Display>(e: E) -> CphdError {
    CphdError::Format(format!("Failed to write metadata XML: {}", e))
}

/// Serializes `root` as an indented UTF-8 document, declaring `namespace` as default.
pub fn serialize(root: &XmlNode, namespace: Option<&str>) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_error)?;
    write_element(&mut writer, root, namespace)?;
    Ok(writer.into_inner())
}

fn write_element(writer: &mut Writer<Vec<u8>>, node: &XmlNode, namespace: Option<&str>) -> Result<()> {
    let mut start = BytesStart::new(node.name.as_str());
    if let Some(ns) = namespace {
        start.push_attribute(("xmlns", ns));
    }

    if node.children.is_empty() && node.text.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(write_error);
    }

    writer.write_event(Event::Start(start)).map_err(write_error)?;
    if node.children.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&node.text)))
            .map_err(write_error)?;
    } else {
        for child in &node.children {
            write_element(writer, child, None)?;
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(node.name.as_str())))
        .map_err(write_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_by_local_name_under_default_namespace() {
        let xml = br#"<?xml version="1.0"?>
            <CPHD xmlns="urn:example:cphd">
              <Data><NumBytesPVP>16</NumBytesPVP></Data>
              <Note><![CDATA[a < b]]></Note>
            </CPHD>"#;
        let (root, namespaces) = parse(xml).unwrap();
        assert_eq!(root.name, "CPHD");
        assert_eq!(namespaces.get("default").map(String::as_str), Some("urn:example:cphd"));
        let data = root.require("Data").unwrap();
        assert_eq!(data.parse_child::<usize>("NumBytesPVP").unwrap(), 16);
        assert_eq!(root.child_text("Note"), Some("a < b"));
    }

    #[test]
    fn serialized_tree_parses_back() {
        let root = XmlNode::new("CPHD")
            .with_child(XmlNode::new("CollectionID").with_child(XmlNode::leaf("ReleaseInfo", "A & B")))
            .with_child(XmlNode::new("Empty"));
        let bytes = serialize(&root, Some("urn:example:cphd")).unwrap();
        let (parsed, namespaces) = parse(&bytes).unwrap();
        assert_eq!(parsed, root);
        assert_eq!(namespaces["default"], "urn:example:cphd");
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(matches!(parse(b"<CPHD><Data></CPHD>"), Err(CphdError::Format(_))));
        assert!(matches!(parse(b""), Err(CphdError::Format(_))));
        let missing = parse(b"<CPHD/>").unwrap().0;
        assert!(matches!(missing.require("Data"), Err(CphdError::Format(_))));
    }
}
