//! Per-vector parameter (PVP) record layout.

use crate::cphd::types::elements::{ElementArray, ElementLayout};
use crate::cphd::types::error::{CphdError, Result};

/// One named field inside a PVP record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvpField {
    pub name: String,
    /// Byte offset within the record.
    pub offset: usize,
    /// Byte size; larger than one element for vector-valued fields.
    pub size: usize,
    /// Element format string, e.g. `F8` or `X=F8;Y=F8;Z=F8;`.
    pub format: String,
}

impl PvpField {
    pub fn new(name: impl Into<String>, offset: usize, size: usize, format: impl Into<String>) -> Self {
        Self { name: name.into(), offset, size, format: format.into() }
    }

    /// The parsed element layout, checked against the declared byte size.
    pub fn layout(&self) -> Result<ElementLayout> {
        let layout = ElementLayout::parse(&self.format)?;
        if layout.byte_size() != self.size {
            return Err(CphdError::Format(format!(
                "PVP field {} declares {} bytes but format {} occupies {}",
                self.name,
                self.size,
                self.format,
                layout.byte_size()
            )));
        }
        Ok(layout)
    }

    /// Decodes `rows` consecutive values of this field.
    ///
    /// The result has shape `(rows,)` for scalar fields and `(rows, depth)` otherwise.
    pub fn decode(&self, rows: usize, bytes: &[u8]) -> Result<ElementArray> {
        let layout = self.layout()?;
        if layout.depth == 1 {
            ElementArray::from_be_bytes(layout.format, &[rows], bytes)
        } else {
            ElementArray::from_be_bytes(layout.format, &[rows, layout.depth], bytes)
        }
    }
}

/// The fixed record size of a PVP block and its named fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PvpLayout {
    pub record_size: usize,
    pub fields: Vec<PvpField>,
}

impl PvpLayout {
    pub fn new(record_size: usize, fields: Vec<PvpField>) -> Self {
        Self { record_size, fields }
    }

    pub fn field(&self, name: &str) -> Option<&PvpField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Sum of all field sizes, saturating.
    pub fn fields_size(&self) -> usize {
        self.fields.iter().fold(0, |total, f| total.saturating_add(f.size))
    }

    /// Checks every field's format and that it lies inside the record.
    pub fn check_fields(&self) -> Result<()> {
        for field in &self.fields {
            field.layout()?;
            let fits = field
                .offset
                .checked_add(field.size)
                .is_some_and(|end| end <= self.record_size);
            if !fits {
                return Err(CphdError::Format(format!(
                    "PVP field {} at offset {} with size {} overruns the {} byte record",
                    field.name, field.offset, field.size, self.record_size
                )));
            }
        }
        Ok(())
    }

    /// [`check_fields`](Self::check_fields), plus the fields must fill the record exactly.
    pub fn validate(&self) -> Result<()> {
        self.check_fields()?;
        let total = self.fields_size();
        if total != self.record_size {
            return Err(CphdError::Format(format!(
                "PVP record size {} does not equal the sum of field sizes {}",
                self.record_size, total
            )));
        }
        Ok(())
    }

    fn by_offset(&self) -> Vec<&PvpField> {
        let mut fields: Vec<&PvpField> = self.fields.iter().collect();
        fields.sort_by_key(|f| (f.offset, f.size));
        fields
    }

    /// True if both layouts cover the same byte ranges, in whatever order they are listed.
    ///
    /// Field names are not compared.
    pub fn same_byte_layout(&self, other: &PvpLayout) -> bool {
        self.record_size == other.record_size
            && self.fields.len() == other.fields.len()
            && self
                .by_offset()
                .iter()
                .zip(other.by_offset())
                .all(|(a, b)| a.offset == b.offset && a.size == b.size)
    }

    /// True if the fields at each byte range carry the same names.
    pub fn same_field_names(&self, other: &PvpLayout) -> bool {
        self.fields.len() == other.fields.len()
            && self.by_offset().iter().zip(other.by_offset()).all(|(a, b)| a.name == b.name)
    }
}
