use std::fmt;

// Shape — N-dimensional shape representation
//
// A Shape lists the size of each dimension of an array. Arrays read from a
// MAT container keep MATLAB's dimension order, so an SAT image stack is
// [H, W, C, N] and its one-hot labels are [K, N].
//
// Stored arrays are column-major (MATLAB / Fortran order): the FIRST
// dimension is contiguous. Images handed to models are row-major [C, H, W].

/// N-dimensional shape of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dimensions).
    /// A scalar shape [] has 1 element; any zero dimension gives 0.
    ///
    /// `None` when the product does not fit in `usize`, which only a corrupt
    /// header can produce.
    pub fn elem_count(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Column-major (MATLAB-order) strides: for [2, 3, 4] this is [1, 2, 6].
    pub fn stride_column_major(&self) -> Vec<usize> {
        let mut strides = Vec::with_capacity(self.rank());
        let mut acc = 1usize;
        for &d in &self.0 {
            strides.push(acc);
            acc = acc.saturating_mul(d);
        }
        strides
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> crate::Result<usize> {
        self.0.get(d).copied().ok_or(crate::Error::Index {
            index: d,
            len: self.rank(),
        })
    }

    /// Size of the last dimension, or 1 for a scalar.
    ///
    /// For MATLAB arrays this is the sample axis (`N` in [H, W, C, N]).
    pub fn last_dim(&self) -> usize {
        self.0.last().copied().unwrap_or(1)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

// Convenient From implementations

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}
