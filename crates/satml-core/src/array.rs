// NdArray — column-major n-dimensional array with typed storage
//
// Arrays come out of MAT containers in MATLAB order: element (i0, i1, ..., ik)
// lives at offset i0 + d0*(i1 + d1*(i2 + ...)). Because the LAST axis varies
// slowest, a window of samples along it is one contiguous run of elements,
// which is what `narrow_last` exploits.

use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::shape::Shape;

/// Typed element buffer backing an [`NdArray`].
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    U8(Vec<u8>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Storage {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Storage::U8(v) => v.len(),
            Storage::F32(v) => v.len(),
            Storage::F64(v) => v.len(),
        }
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            Storage::U8(_) => DType::U8,
            Storage::F32(_) => DType::F32,
            Storage::F64(_) => DType::F64,
        }
    }

    /// Element at flat offset `i`, widened to f64.
    ///
    /// # Panics
    /// Panics if `i >= self.len()`.
    pub fn get_f64(&self, i: usize) -> f64 {
        match self {
            Storage::U8(v) => v[i] as f64,
            Storage::F32(v) => v[i] as f64,
            Storage::F64(v) => v[i],
        }
    }

    /// Copy the elements in `range` into a new buffer of the same dtype.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Storage {
        match self {
            Storage::U8(v) => Storage::U8(v[range].to_vec()),
            Storage::F32(v) => Storage::F32(v[range].to_vec()),
            Storage::F64(v) => Storage::F64(v[range].to_vec()),
        }
    }

    /// Re-order elements block by block.
    ///
    /// The buffer is viewed as consecutive blocks of `block` elements. For
    /// each block `b` in `blocks`, the output gets `self[b * block + offsets[i]]`
    /// for every `i`, so blocks outside the range are skipped.
    /// This is how a stack of column-major images becomes a stack of
    /// row-major ones without materialising one offset per element.
    ///
    /// # Panics
    /// Panics if any offset reaches past the end of the buffer.
    pub fn gather_blocks(
        &self,
        block: usize,
        blocks: std::ops::Range<usize>,
        offsets: &[usize],
    ) -> Storage {
        fn run<T: Copy>(
            v: &[T],
            block: usize,
            blocks: std::ops::Range<usize>,
            offsets: &[usize],
        ) -> Vec<T> {
            let mut out = Vec::with_capacity(blocks.len() * offsets.len());
            for b in blocks {
                let base = b * block;
                out.extend(offsets.iter().map(|&o| v[base + o]));
            }
            out
        }
        match self {
            Storage::U8(v) => Storage::U8(run(v, block, blocks, offsets)),
            Storage::F32(v) => Storage::F32(run(v, block, blocks, offsets)),
            Storage::F64(v) => Storage::F64(run(v, block, blocks, offsets)),
        }
    }

    /// Widen `range` to f32 values.
    pub fn to_f32_range(&self, range: std::ops::Range<usize>) -> Vec<f32> {
        match self {
            Storage::U8(v) => v[range].iter().map(|&x| x as f32).collect(),
            Storage::F32(v) => v[range].to_vec(),
            Storage::F64(v) => v[range].iter().map(|&x| x as f32).collect(),
        }
    }

    /// Widen `range` to f64 values.
    pub fn to_f64_range(&self, range: std::ops::Range<usize>) -> Vec<f64> {
        match self {
            Storage::U8(v) => v[range].iter().map(|&x| x as f64).collect(),
            Storage::F32(v) => v[range].iter().map(|&x| x as f64).collect(),
            Storage::F64(v) => v[range].to_vec(),
        }
    }
}

/// An n-dimensional array in column-major (MATLAB) element order.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Shape,
    storage: Storage,
}

impl NdArray {
    /// Pair a shape with a storage buffer, checking the element count.
    pub fn new(shape: impl Into<Shape>, storage: Storage) -> Result<Self> {
        let shape = shape.into();
        let Some(expected) = shape.elem_count() else {
            return Err(Error::invalid(format!(
                "shape {shape} has more elements than fit in memory"
            )));
        };
        if storage.len() != expected {
            return Err(Error::ElementCountMismatch {
                shape,
                expected,
                got: storage.len(),
            });
        }
        Ok(Self { shape, storage })
    }

    /// Build from a typed vector already laid out column-major.
    pub fn from_vec<T: WithDType>(data: Vec<T>, shape: impl Into<Shape>) -> Result<Self> {
        Self::new(shape, T::into_storage(data))
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Consume the array, returning its storage.
    pub fn into_storage(self) -> Storage {
        self.storage
    }

    /// Total number of elements.
    pub fn elem_count(&self) -> usize {
        self.storage.len()
    }

    /// Borrow the elements as `&[T]` if the dtype matches.
    pub fn as_slice<T: WithDType>(&self) -> Option<&[T]> {
        T::slice_of(&self.storage)
    }

    /// Column-major flat offset of a multi-index.
    pub fn offset_of(&self, index: &[usize]) -> Result<usize> {
        if index.len() != self.rank() {
            return Err(Error::ShapeMismatch {
                expected: self.shape.clone(),
                got: Shape::from(index),
            });
        }
        let strides = self.shape.stride_column_major();
        let mut offset = 0;
        for ((&i, &d), stride) in index.iter().zip(self.dims()).zip(strides) {
            if i >= d {
                return Err(Error::Index { index: i, len: d });
            }
            offset += i * stride;
        }
        Ok(offset)
    }

    /// Element at a multi-index, widened to f64.
    pub fn get_f64(&self, index: &[usize]) -> Result<f64> {
        let offset = self.offset_of(index)?;
        Ok(self.storage.get_f64(offset))
    }

    /// All elements widened to f64, in storage order.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.storage.to_f64_range(0..self.storage.len())
    }

    /// Keep only `start..end` along the last (slowest-varying) axis.
    ///
    /// `end` is clamped to the axis length, the way a slice expression
    /// `[..., start:end]` behaves. An empty result is allowed.
    pub fn narrow_last(&self, start: usize, end: usize) -> Result<NdArray> {
        if self.rank() == 0 {
            return Err(Error::invalid("cannot narrow a scalar array"));
        }
        let n = self.shape.last_dim();
        let end = end.min(n);
        let start = start.min(end);
        let block = if n == 0 { 0 } else { self.elem_count() / n };

        let mut dims = self.dims().to_vec();
        let last = dims.len() - 1;
        dims[last] = end - start;

        let storage = self.storage.slice(start * block..end * block);
        NdArray::new(dims, storage)
    }
}
