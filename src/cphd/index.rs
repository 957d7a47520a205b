//! Ordered bidirectional map between ordinal positions and identifiers.

use std::collections::HashMap;

use crate::cphd::types::error::{CphdError, Result};
use crate::cphd::types::models::EntryRef;

/// Ordinal ⇄ identifier lookup for channels or support arrays.
///
/// Built once from the metadata and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct IdentifierIndex {
    kind: &'static str,
    identifiers: Vec<String>,
    positions: HashMap<String, usize>,
}

impl IdentifierIndex {
    /// Builds the index; a repeated identifier is a format error.
    pub fn new(kind: &'static str, identifiers: impl IntoIterator<Item = String>) -> Result<Self> {
        let identifiers: Vec<String> = identifiers.into_iter().collect();
        let mut positions = HashMap::with_capacity(identifiers.len());
        for (position, identifier) in identifiers.iter().enumerate() {
            if positions.insert(identifier.clone(), position).is_some() {
                return Err(CphdError::Format(format!(
                    "Duplicate {} identifier {}",
                    kind, identifier
                )));
            }
        }
        Ok(Self { kind, identifiers, positions })
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Identifiers in ordinal order.
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Resolves a reference to its ordinal position.
    pub fn position(&self, entry: EntryRef<'_>) -> Result<usize> {
        match entry {
            EntryRef::Index(index) if index < self.identifiers.len() => Ok(index),
            EntryRef::Index(index) => Err(CphdError::IndexOutOfRange {
                kind: self.kind,
                index,
                count: self.identifiers.len(),
            }),
            EntryRef::Identifier(identifier) => {
                self.positions.get(identifier).copied().ok_or_else(|| CphdError::UnknownIdentifier {
                    kind: self.kind,
                    identifier: identifier.to_string(),
                })
            }
        }
    }

    /// Resolves a reference to its identifier.
    pub fn identifier(&self, entry: EntryRef<'_>) -> Result<&str> {
        let position = self.position(entry)?;
        Ok(&self.identifiers[position])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> IdentifierIndex {
        IdentifierIndex::new("channel", ["A".to_string(), "B".to_string()]).unwrap()
    }

    #[test]
    fn resolves_both_directions() {
        let index = index();
        assert_eq!(index.position(EntryRef::from("B")).unwrap(), 1);
        assert_eq!(index.identifier(EntryRef::from(0usize)).unwrap(), "A");
        assert_eq!(index.identifiers(), &["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn reports_bad_references() {
        let index = index();
        assert!(matches!(
            index.position(EntryRef::from(2usize)),
            Err(CphdError::IndexOutOfRange { index: 2, count: 2, .. })
        ));
        assert!(matches!(
            index.position(EntryRef::from("C")),
            Err(CphdError::UnknownIdentifier { .. })
        ));
    }

    #[test]
    fn rejects_duplicates() {
        let duplicated = IdentifierIndex::new("support array", ["X".to_string(), "X".to_string()]);
        assert!(matches!(duplicated, Err(CphdError::Format(_))));
    }
}
