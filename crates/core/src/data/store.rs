//! Payload storage for data bundle entries

use ndarray::{ArrayD, Dimension, IxDyn};

use crate::{Error, Result};

/// N-dimensional payload array, tagged by element type
#[derive(Debug, Clone, PartialEq)]
pub enum DataArray {
    /// Float samples or features
    F32(ArrayD<f32>),
    /// 16-bit PCM audio
    I16(ArrayD<i16>),
    /// 8-bit image data
    U8(ArrayD<u8>),
}

impl DataArray {
    pub fn shape(&self) -> &[usize] {
        match self {
            DataArray::F32(a) => a.shape(),
            DataArray::I16(a) => a.shape(),
            DataArray::U8(a) => a.shape(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DataArray::F32(a) => a.len(),
            DataArray::I16(a) => a.len(),
            DataArray::U8(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            DataArray::F32(_) => "f32",
            DataArray::I16(_) => "i16",
            DataArray::U8(_) => "u8",
        }
    }

    /// Reshape into `shape`, keeping element order
    pub fn into_shape(self, shape: &[usize]) -> Result<DataArray> {
        let shape = IxDyn(shape);
        Ok(match self {
            DataArray::F32(a) => DataArray::F32(a.as_standard_layout().to_owned().into_shape(shape)?),
            DataArray::I16(a) => DataArray::I16(a.as_standard_layout().to_owned().into_shape(shape)?),
            DataArray::U8(a) => DataArray::U8(a.as_standard_layout().to_owned().into_shape(shape)?),
        })
    }

    /// Flatten to a single `[1, N]` row
    pub fn into_row(self) -> Result<DataArray> {
        let len = self.len();
        self.into_shape(&[1, len])
    }

    /// Prepend a length-1 axis
    pub fn with_leading_axis(self) -> Result<DataArray> {
        let mut shape = Vec::with_capacity(self.shape().len() + 1);
        shape.push(1);
        shape.extend_from_slice(self.shape());
        self.into_shape(&shape)
    }

    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            DataArray::F32(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<&ArrayD<i16>> {
        match self {
            DataArray::I16(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<&ArrayD<u8>> {
        match self {
            DataArray::U8(a) => Some(a),
            _ => None,
        }
    }

    /// All samples as 16-bit PCM in logical order
    ///
    /// Float data is expected in `[-1.0, 1.0]` and is scaled by `i16::MAX`.
    pub fn to_pcm16(&self) -> Result<Vec<i16>> {
        match self {
            DataArray::F32(a) => Ok(a
                .iter()
                .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .collect()),
            DataArray::I16(a) => Ok(a.iter().copied().collect()),
            DataArray::U8(_) => Err(Error::InvalidData(
                "u8 arrays cannot be interpreted as audio".to_string(),
            )),
        }
    }
}

impl<D: Dimension> From<ndarray::Array<f32, D>> for DataArray {
    fn from(a: ndarray::Array<f32, D>) -> Self {
        DataArray::F32(a.into_dyn())
    }
}

impl<D: Dimension> From<ndarray::Array<i16, D>> for DataArray {
    fn from(a: ndarray::Array<i16, D>) -> Self {
        DataArray::I16(a.into_dyn())
    }
}

impl<D: Dimension> From<ndarray::Array<u8, D>> for DataArray {
    fn from(a: ndarray::Array<u8, D>) -> Self {
        DataArray::U8(a.into_dyn())
    }
}

/// Value written to or read from an entry
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Array(DataArray),
    Text(String),
}

impl DataValue {
    pub fn as_array(&self) -> Option<&DataArray> {
        match self {
            DataValue::Array(a) => Some(a),
            DataValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DataValue::Text(t) => Some(t),
            DataValue::Array(_) => None,
        }
    }
}

impl From<DataArray> for DataValue {
    fn from(a: DataArray) -> Self {
        DataValue::Array(a)
    }
}

impl<T, D> From<ndarray::Array<T, D>> for DataValue
where
    D: Dimension,
    DataArray: From<ndarray::Array<T, D>>,
{
    fn from(a: ndarray::Array<T, D>) -> Self {
        DataValue::Array(a.into())
    }
}

impl From<String> for DataValue {
    fn from(t: String) -> Self {
        DataValue::Text(t)
    }
}

impl From<&str> for DataValue {
    fn from(t: &str) -> Self {
        DataValue::Text(t.to_string())
    }
}

/// One entry slot of a bundle, empty until written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataStore {
    value: Option<DataValue>,
}

impl DataStore {
    pub fn is_valid(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&DataValue> {
        self.value.as_ref()
    }

    pub(crate) fn set(&mut self, value: DataValue) {
        self.value = Some(value);
    }

    pub(crate) fn take(&mut self) -> Option<DataValue> {
        self.value.take()
    }
}
