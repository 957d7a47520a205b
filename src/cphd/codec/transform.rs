//! Raw-to-output sample transform and amplitude scaling.

use ndarray::{ArrayD, Axis};
use num_complex::Complex32;

use crate::cphd::types::elements::ElementArray;
use crate::cphd::types::error::{CphdError, Result};

/// Converts raw (real, imaginary) pairs to single-precision complex.
pub fn pair_to_complex(raw: &ElementArray) -> Result<ArrayD<Complex32>> {
    let converted = match raw {
        ElementArray::CI2(a) => a.mapv(|v| Complex32::new(v.re as f32, v.im as f32)),
        ElementArray::CI4(a) => a.mapv(|v| Complex32::new(v.re as f32, v.im as f32)),
        ElementArray::CF8(a) => a.clone(),
        other => {
            return Err(CphdError::Format(format!(
                "Got unhandled raw signal format {}",
                other.format()
            )));
        }
    };
    Ok(converted)
}

/// Multiplies `data` by an amplitude scale read over the same rows.
///
/// A single scale value multiplies everything. Otherwise a 1-D `data` is
/// scaled elementwise and a 2-D `data` has row `i` scaled by `scale[i]`.
pub fn apply_amplitude_scale(data: &mut ArrayD<Complex32>, scale: &ArrayD<f32>) -> Result<()> {
    if scale.len() == 1 {
        if let Some(&factor) = scale.iter().next() {
            data.mapv_inplace(|v| v * factor);
        }
        return Ok(());
    }

    let rows = data.shape().first().copied().unwrap_or(1);
    if data.ndim() == 0 || data.ndim() > 2 || scale.len() != rows {
        return Err(CphdError::Format(format!(
            "Cannot apply {} scale values to signal data of shape {:?}",
            scale.len(),
            data.shape()
        )));
    }

    for (mut row, &factor) in data.axis_iter_mut(Axis(0)).zip(scale.iter()) {
        row.mapv_inplace(|v| v * factor);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use num_complex::Complex;

    #[test]
    fn integer_pairs_widen_to_complex32() {
        let raw = ElementArray::from(array![[Complex::new(1i8, -2i8), Complex::new(-128, 127)]]);
        let converted = pair_to_complex(&raw).unwrap();
        assert_eq!(converted[[0, 1]], Complex32::new(-128.0, 127.0));
        assert!(pair_to_complex(&ElementArray::from(array![1.0f64])).is_err());
    }

    #[test]
    fn scalar_scale_multiplies_everything() {
        let mut data = array![[Complex32::new(1.0, 1.0), Complex32::new(2.0, 0.0)]].into_dyn();
        apply_amplitude_scale(&mut data, &array![3.0f32].into_dyn()).unwrap();
        assert_eq!(data[[0, 1]], Complex32::new(6.0, 0.0));
    }

    #[test]
    fn row_scale_broadcasts_across_columns() {
        let mut data = ArrayD::from_elem(vec![3, 2], Complex32::new(1.0, -1.0));
        let scale = Array1::from(vec![1.0f32, 2.0, 4.0]).into_dyn();
        apply_amplitude_scale(&mut data, &scale).unwrap();
        assert_eq!(data[[2, 0]], Complex32::new(4.0, -4.0));
        assert_eq!(data[[1, 1]], Complex32::new(2.0, -2.0));
    }

    #[test]
    fn one_dimensional_scale_is_elementwise() {
        let mut data = ArrayD::from_elem(vec![2], Complex32::new(1.0, 0.0));
        apply_amplitude_scale(&mut data, &array![5.0f32, 7.0].into_dyn()).unwrap();
        assert_eq!(data.as_slice().unwrap(), &[Complex32::new(5.0, 0.0), Complex32::new(7.0, 0.0)]);
        assert!(apply_amplitude_scale(&mut data, &array![1.0f32, 2.0, 3.0].into_dyn()).is_err());
    }
}
