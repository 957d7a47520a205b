//! Binary element formats and runtime-typed arrays.
//!
//! CPHD describes every binary field with a short format string: `F8` for a
//! big-endian double, `CI2` for a pair of signed bytes, or a component list
//! such as `X=F8;Y=F8;Z=F8;` for fixed-length vectors. [`ElementLayout`] parses
//! those strings and [`ElementArray`] carries decoded data together with its
//! format, so that reads and writes can round-trip byte for byte.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use ndarray::{Array, ArrayD, Dimension, IxDyn};
use num_complex::Complex;

use super::error::{CphdError, Result};

/// A scalar (or complex pair) binary element format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementFormat {
    I1,
    I2,
    I4,
    I8,
    U1,
    U2,
    U4,
    U8,
    F4,
    F8,
    CI2,
    CI4,
    CI8,
    CI16,
    CF8,
    CF16,
}

impl ElementFormat {
    pub fn parse(value: &str) -> Result<Self> {
        let format = match value.trim() {
            "I1" => Self::I1,
            "I2" => Self::I2,
            "I4" => Self::I4,
            "I8" => Self::I8,
            "U1" => Self::U1,
            "U2" => Self::U2,
            "U4" => Self::U4,
            "U8" => Self::U8,
            "F4" => Self::F4,
            "F8" => Self::F8,
            "CI2" => Self::CI2,
            "CI4" => Self::CI4,
            "CI8" => Self::CI8,
            "CI16" => Self::CI16,
            "CF8" => Self::CF8,
            "CF16" => Self::CF16,
            other => {
                return Err(CphdError::Format(format!("Got unhandled binary format {}", other)));
            }
        };
        Ok(format)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::I1 => "I1",
            Self::I2 => "I2",
            Self::I4 => "I4",
            Self::I8 => "I8",
            Self::U1 => "U1",
            Self::U2 => "U2",
            Self::U4 => "U4",
            Self::U8 => "U8",
            Self::F4 => "F4",
            Self::F8 => "F8",
            Self::CI2 => "CI2",
            Self::CI4 => "CI4",
            Self::CI8 => "CI8",
            Self::CI16 => "CI16",
            Self::CF8 => "CF8",
            Self::CF16 => "CF16",
        }
    }

    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::I1 | Self::U1 => 1,
            Self::I2 | Self::U2 | Self::CI2 => 2,
            Self::I4 | Self::U4 | Self::F4 | Self::CI4 => 4,
            Self::I8 | Self::U8 | Self::F8 | Self::CI8 | Self::CF8 => 8,
            Self::CI16 | Self::CF16 => 16,
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(
            self,
            Self::CI2 | Self::CI4 | Self::CI8 | Self::CI16 | Self::CF8 | Self::CF16
        )
    }
}

impl fmt::Display for ElementFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An element format together with its per-cell depth.
///
/// `F4` has depth 1; `Gain=F4;Phase=F4;` has depth 2. Component lists must be
/// homogeneous, since the data is exposed as one typed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementLayout {
    pub format: ElementFormat,
    pub depth: usize,
}

impl ElementLayout {
    pub fn scalar(format: ElementFormat) -> Self {
        Self { format, depth: 1 }
    }

    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if !value.contains('=') {
            return Ok(Self::scalar(ElementFormat::parse(value)?));
        }

        let mut format: Option<ElementFormat> = None;
        let mut depth = 0;
        for component in value.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            let (_, component_format) = component.split_once('=').ok_or_else(|| {
                CphdError::Format(format!("Malformed component '{}' in format {}", component, value))
            })?;
            let component_format = ElementFormat::parse(component_format)?;
            match format {
                Some(existing) if existing != component_format => {
                    return Err(CphdError::Format(format!(
                        "Got unhandled mixed-type component format {}",
                        value
                    )));
                }
                _ => format = Some(component_format),
            }
            depth += 1;
        }

        let format = format
            .ok_or_else(|| CphdError::Format(format!("Empty component format {}", value)))?;
        Ok(Self { format, depth })
    }

    /// Total bytes of one cell.
    pub fn byte_size(&self) -> usize {
        self.format.size() * self.depth
    }
}

/// A value that can be read from and written to big-endian bytes.
pub trait BigEndianElement: Copy {
    const SIZE: usize;
    fn read_be(buf: &[u8]) -> Self;
    fn write_be(self, buf: &mut [u8]);
}

impl BigEndianElement for i8 {
    const SIZE: usize = 1;
    fn read_be(buf: &[u8]) -> Self {
        buf[0] as i8
    }
    fn write_be(self, buf: &mut [u8]) {
        buf[0] = self as u8;
    }
}

impl BigEndianElement for u8 {
    const SIZE: usize = 1;
    fn read_be(buf: &[u8]) -> Self {
        buf[0]
    }
    fn write_be(self, buf: &mut [u8]) {
        buf[0] = self;
    }
}

macro_rules! impl_big_endian_element {
    ($ty:ty, $size:expr, $read:ident, $write:ident) => {
        impl BigEndianElement for $ty {
            const SIZE: usize = $size;
            fn read_be(buf: &[u8]) -> Self {
                BigEndian::$read(buf)
            }
            fn write_be(self, buf: &mut [u8]) {
                BigEndian::$write(buf, self)
            }
        }
    };
}

impl_big_endian_element!(i16, 2, read_i16, write_i16);
impl_big_endian_element!(i32, 4, read_i32, write_i32);
impl_big_endian_element!(i64, 8, read_i64, write_i64);
impl_big_endian_element!(u16, 2, read_u16, write_u16);
impl_big_endian_element!(u32, 4, read_u32, write_u32);
impl_big_endian_element!(u64, 8, read_u64, write_u64);
impl_big_endian_element!(f32, 4, read_f32, write_f32);
impl_big_endian_element!(f64, 8, read_f64, write_f64);

impl<T: BigEndianElement> BigEndianElement for Complex<T> {
    const SIZE: usize = 2 * T::SIZE;
    fn read_be(buf: &[u8]) -> Self {
        Complex::new(T::read_be(&buf[..T::SIZE]), T::read_be(&buf[T::SIZE..Self::SIZE]))
    }
    fn write_be(self, buf: &mut [u8]) {
        self.re.write_be(&mut buf[..T::SIZE]);
        self.im.write_be(&mut buf[T::SIZE..Self::SIZE]);
    }
}

/// Decodes a contiguous run of big-endian elements.
pub fn decode_elements<T: BigEndianElement>(bytes: &[u8]) -> Vec<T> {
    bytes.chunks_exact(T::SIZE).map(T::read_be).collect()
}

fn decode_array<T: BigEndianElement>(shape: &[usize], bytes: &[u8]) -> Result<ArrayD<T>> {
    ArrayD::from_shape_vec(IxDyn(shape), decode_elements(bytes))
        .map_err(|e| CphdError::Format(format!("Cannot shape decoded elements as {:?}: {}", shape, e)))
}

fn encode_array<T: BigEndianElement>(array: &ArrayD<T>) -> Vec<u8> {
    let mut out = vec![0u8; array.len() * T::SIZE];
    for (value, chunk) in array.iter().zip(out.chunks_exact_mut(T::SIZE)) {
        value.write_be(chunk);
    }
    out
}

/// An n-dimensional, row-major array tagged with its on-disk element format.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementArray {
    I1(ArrayD<i8>),
    I2(ArrayD<i16>),
    I4(ArrayD<i32>),
    I8(ArrayD<i64>),
    U1(ArrayD<u8>),
    U2(ArrayD<u16>),
    U4(ArrayD<u32>),
    U8(ArrayD<u64>),
    F4(ArrayD<f32>),
    F8(ArrayD<f64>),
    CI2(ArrayD<Complex<i8>>),
    CI4(ArrayD<Complex<i16>>),
    CI8(ArrayD<Complex<i32>>),
    CI16(ArrayD<Complex<i64>>),
    CF8(ArrayD<Complex<f32>>),
    CF16(ArrayD<Complex<f64>>),
}

macro_rules! with_array {
    ($value:expr, $array:ident => $body:expr) => {
        match $value {
            ElementArray::I1($array) => $body,
            ElementArray::I2($array) => $body,
            ElementArray::I4($array) => $body,
            ElementArray::I8($array) => $body,
            ElementArray::U1($array) => $body,
            ElementArray::U2($array) => $body,
            ElementArray::U4($array) => $body,
            ElementArray::U8($array) => $body,
            ElementArray::F4($array) => $body,
            ElementArray::F8($array) => $body,
            ElementArray::CI2($array) => $body,
            ElementArray::CI4($array) => $body,
            ElementArray::CI8($array) => $body,
            ElementArray::CI16($array) => $body,
            ElementArray::CF8($array) => $body,
            ElementArray::CF16($array) => $body,
        }
    };
}

macro_rules! element_array_conversions {
    ($($variant:ident => $ty:ty, $accessor:ident;)*) => {
        $(
            impl<D: Dimension> From<Array<$ty, D>> for ElementArray {
                fn from(array: Array<$ty, D>) -> Self {
                    ElementArray::$variant(array.into_dyn())
                }
            }
        )*

        impl ElementArray {
            $(
                pub fn $accessor(&self) -> Option<&ArrayD<$ty>> {
                    match self {
                        ElementArray::$variant(array) => Some(array),
                        _ => None,
                    }
                }
            )*

            /// Decodes `bytes` as row-major big-endian elements of `format` with the given shape.
            pub fn from_be_bytes(format: ElementFormat, shape: &[usize], bytes: &[u8]) -> Result<Self> {
                let expected = shape.iter().product::<usize>() * format.size();
                if bytes.len() != expected {
                    return Err(CphdError::Format(format!(
                        "Expected {} bytes for {} array of shape {:?}, got {}",
                        expected, format, shape, bytes.len()
                    )));
                }
                let array = match format {
                    $(ElementFormat::$variant => ElementArray::$variant(decode_array(shape, bytes)?),)*
                };
                Ok(array)
            }

            pub fn format(&self) -> ElementFormat {
                match self {
                    $(ElementArray::$variant(_) => ElementFormat::$variant,)*
                }
            }
        }
    };
}

element_array_conversions! {
    I1 => i8, as_i1;
    I2 => i16, as_i2;
    I4 => i32, as_i4;
    I8 => i64, as_i8;
    U1 => u8, as_u1;
    U2 => u16, as_u2;
    U4 => u32, as_u4;
    U8 => u64, as_u8;
    F4 => f32, as_f4;
    F8 => f64, as_f8;
    CI2 => Complex<i8>, as_ci2;
    CI4 => Complex<i16>, as_ci4;
    CI8 => Complex<i32>, as_ci8;
    CI16 => Complex<i64>, as_ci16;
    CF8 => Complex<f32>, as_cf8;
    CF16 => Complex<f64>, as_cf16;
}

impl ElementArray {
    pub fn shape(&self) -> &[usize] {
        with_array!(self, array => array.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        with_array!(self, array => array.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total encoded size in bytes.
    pub fn byte_len(&self) -> usize {
        self.len() * self.format().size()
    }

    /// Encodes the array in row-major order as big-endian bytes.
    pub fn to_be_bytes(&self) -> Vec<u8> {
        with_array!(self, array => encode_array(array))
    }

    /// Narrows a real-valued array to `f32`.
    pub fn to_f32(&self) -> Result<ArrayD<f32>> {
        let narrowed = match self {
            ElementArray::I1(a) => a.mapv(|v| v as f32),
            ElementArray::I2(a) => a.mapv(|v| v as f32),
            ElementArray::I4(a) => a.mapv(|v| v as f32),
            ElementArray::I8(a) => a.mapv(|v| v as f32),
            ElementArray::U1(a) => a.mapv(|v| v as f32),
            ElementArray::U2(a) => a.mapv(|v| v as f32),
            ElementArray::U4(a) => a.mapv(|v| v as f32),
            ElementArray::U8(a) => a.mapv(|v| v as f32),
            ElementArray::F4(a) => a.clone(),
            ElementArray::F8(a) => a.mapv(|v| v as f32),
            other => {
                return Err(CphdError::Format(format!(
                    "Cannot narrow {} values to a real f32 array",
                    other.format()
                )));
            }
        };
        Ok(narrowed)
    }
}
