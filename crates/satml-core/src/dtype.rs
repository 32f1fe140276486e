use std::fmt;

use crate::array::Storage;

// DType — element types an array can hold in memory
//
// SAT images are stored as bytes, labels usually as doubles. Keeping the
// narrow type in memory matters: the full SAT-6 training stack is
// 28×28×4×324000 elements, about 1 GB as U8 and 8 GB as F64.
//
//   U8  — image pixels, logical arrays
//   F32 — single-precision arrays and batched model input
//   F64 — doubles and every wider or signed integer class

/// Enum of all supported element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    U8,
    F32,
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::U8 => 1,
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::U8 => "u8",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        write!(f, "{}", s)
    }
}

// WithDType — bridge between Rust element types and DType
//
// Lets generic code build and inspect typed storage:
//
//   NdArray::from_vec(vec![0u8; 16], (2, 2, 4, 1))
//   array.as_slice::<u8>()

/// Trait implemented by Rust types that can be stored in an array.
pub trait WithDType: Copy + Send + Sync + 'static + fmt::Debug {
    /// Create a value of this type from f64.
    fn from_f64(v: f64) -> Self;

    /// Wrap a typed vector into the matching storage variant.
    fn into_storage(data: Vec<Self>) -> Storage;

    /// Borrow the typed contents of a storage, if the variant matches.
    fn slice_of(storage: &Storage) -> Option<&[Self]>;
}

impl WithDType for u8 {
    fn from_f64(v: f64) -> Self {
        v as u8
    }
    fn into_storage(data: Vec<Self>) -> Storage {
        Storage::U8(data)
    }
    fn slice_of(storage: &Storage) -> Option<&[Self]> {
        match storage {
            Storage::U8(v) => Some(v),
            _ => None,
        }
    }
}

impl WithDType for f32 {
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    fn into_storage(data: Vec<Self>) -> Storage {
        Storage::F32(data)
    }
    fn slice_of(storage: &Storage) -> Option<&[Self]> {
        match storage {
            Storage::F32(v) => Some(v),
            _ => None,
        }
    }
}

impl WithDType for f64 {
    fn from_f64(v: f64) -> Self {
        v
    }
    fn into_storage(data: Vec<Self>) -> Storage {
        Storage::F64(data)
    }
    fn slice_of(storage: &Storage) -> Option<&[Self]> {
        match storage {
            Storage::F64(v) => Some(v),
            _ => None,
        }
    }
}
