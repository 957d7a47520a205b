//! Structured PVP records: raw big-endian rows plus their layout.

use std::ops::Range;

use log::warn;

use crate::cphd::metadata::{PvpField, PvpLayout};
use crate::cphd::types::elements::ElementArray;
use crate::cphd::types::error::{CphdError, Result};

/// Byte range of `field` within one record of `record_size` bytes.
fn field_range(field: &PvpField, record_size: usize) -> Result<Range<usize>> {
    field
        .offset
        .checked_add(field.size)
        .filter(|&end| end <= record_size)
        .map(|end| field.offset..end)
        .ok_or_else(|| {
            CphdError::Format(format!(
                "PVP field {} at offset {} with size {} overruns the {} byte record",
                field.name, field.offset, field.size, record_size
            ))
        })
}

/// A run of complete PVP records for consecutive vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvpRecords {
    layout: PvpLayout,
    bytes: Vec<u8>,
}

impl PvpRecords {
    /// Wraps `bytes`, which must hold a whole number of records.
    pub fn new(layout: PvpLayout, bytes: Vec<u8>) -> Result<Self> {
        if layout.record_size == 0 {
            return Err(CphdError::InvalidInput("PVP record size is zero".to_string()));
        }
        if bytes.len() % layout.record_size != 0 {
            return Err(CphdError::InvalidInput(format!(
                "{} bytes is not a whole number of {} byte PVP records",
                bytes.len(),
                layout.record_size
            )));
        }
        Ok(Self { layout, bytes })
    }

    /// `rows` records with every byte zero.
    pub fn zeroed(layout: PvpLayout, rows: usize) -> Self {
        let bytes = vec![0u8; rows * layout.record_size];
        Self { layout, bytes }
    }

    pub fn layout(&self) -> &PvpLayout {
        &self.layout
    }

    pub fn rows(&self) -> usize {
        self.bytes.len().checked_div(self.layout.record_size).unwrap_or(0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The raw bytes of one record.
    pub fn record(&self, row: usize) -> Option<&[u8]> {
        let size = self.layout.record_size;
        self.bytes.get(row * size..(row + 1) * size)
    }

    /// Extracts one field across every record, or `None` if the layout lacks it.
    pub fn field(&self, name: &str) -> Result<Option<ElementArray>> {
        let Some(field) = self.layout.field(name) else {
            return Ok(None);
        };
        let range = field_range(field, self.layout.record_size)?;
        let mut gathered = Vec::with_capacity(self.rows() * field.size);
        // Every chunk is exactly one record, so `range` is in bounds.
        for record in self.bytes.chunks_exact(self.layout.record_size) {
            gathered.extend_from_slice(&record[range.clone()]);
        }
        field.decode(self.rows(), &gathered).map(Some)
    }

    /// Overwrites one field in every record.
    ///
    /// `values` must have the field's element format and shape `(rows,)` for
    /// scalar fields or `(rows, depth)` for vector fields.
    pub fn set_field(&mut self, name: &str, values: &ElementArray) -> Result<()> {
        let field = self
            .layout
            .field(name)
            .ok_or_else(|| CphdError::InvalidInput(format!("PVP layout has no field {}", name)))?
            .clone();
        let range = field_range(&field, self.layout.record_size)?;
        let layout = field.layout()?;
        if values.format() != layout.format {
            return Err(CphdError::InvalidInput(format!(
                "PVP field {} has format {} but {} values were supplied",
                name,
                layout.format,
                values.format()
            )));
        }

        let rows = self.rows();
        let expected: Vec<usize> = if layout.depth == 1 { vec![rows] } else { vec![rows, layout.depth] };
        if values.shape() != expected.as_slice() {
            return Err(CphdError::InvalidInput(format!(
                "PVP field {} expects shape {:?}, got {:?}",
                name,
                expected,
                values.shape()
            )));
        }

        let encoded = values.to_be_bytes();
        for (record, value) in self
            .bytes
            .chunks_exact_mut(self.layout.record_size)
            .zip(encoded.chunks_exact(field.size))
        {
            record[range.clone()].copy_from_slice(value);
        }
        Ok(())
    }

    /// Checks that these records can be written where `declared` is expected.
    ///
    /// The byte layout must match; differing field names only warn.
    pub fn check_layout(&self, declared: &PvpLayout) -> Result<()> {
        if !self.layout.same_byte_layout(declared) {
            return Err(CphdError::InvalidInput(format!(
                "PVP records with {} byte records and {} fields do not match the declared {} byte layout with {} fields",
                self.layout.record_size,
                self.layout.fields.len(),
                declared.record_size,
                declared.fields.len()
            )));
        }
        if !self.layout.same_field_names(declared) {
            warn!("PVP field names differ from the declared layout; writing by byte position");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    fn layout() -> PvpLayout {
        PvpLayout::new(
            32,
            vec![PvpField::new("TxTime", 0, 8, "F8"), PvpField::new("TxPos", 8, 24, "X=F8;Y=F8;Z=F8;")],
        )
    }

    #[test]
    fn fields_are_set_and_extracted_per_record() {
        let mut records = PvpRecords::zeroed(layout(), 2);
        records.set_field("TxTime", &ElementArray::from(array![1.5f64, 2.5])).unwrap();
        records
            .set_field("TxPos", &ElementArray::from(array![[1.0f64, 2.0, 3.0], [4.0, 5.0, 6.0]]))
            .unwrap();

        assert_eq!(records.rows(), 2);
        assert_eq!(&records.record(1).unwrap()[..8], &2.5f64.to_be_bytes());
        let tx_pos = records.field("TxPos").unwrap().unwrap();
        assert_eq!(tx_pos.as_f8().unwrap()[[1, 2]], 6.0);
        assert!(records.field("AmpSF").unwrap().is_none());
    }

    #[test]
    fn rejects_mismatched_values() {
        let mut records = PvpRecords::zeroed(layout(), 2);
        let wrong_type = ElementArray::from(Array1::from(vec![1.0f32, 2.0]));
        assert!(matches!(records.set_field("TxTime", &wrong_type), Err(CphdError::InvalidInput(_))));
        let wrong_rows = ElementArray::from(array![1.0f64]);
        assert!(matches!(records.set_field("TxTime", &wrong_rows), Err(CphdError::InvalidInput(_))));
        assert!(PvpRecords::new(layout(), vec![0u8; 33]).is_err());
    }

    #[test]
    fn field_overrunning_the_record_is_a_format_error() {
        let short = PvpLayout::new(
            16,
            vec![PvpField::new("TxTime", 0, 8, "F8"), PvpField::new("AmpSF", 12, 8, "F8")],
        );
        let mut records = PvpRecords::zeroed(short, 2);
        assert!(matches!(records.field("AmpSF"), Err(CphdError::Format(_))));
        let values = ElementArray::from(array![1.0f64, 2.0]);
        assert!(matches!(records.set_field("AmpSF", &values), Err(CphdError::Format(_))));
        assert!(records.field("TxTime").unwrap().is_some());
    }
}
