//! # satml-core
//!
//! Core array, dtype and error types for satml.
//!
//! This crate provides:
//! - [`NdArray`] / [`Storage`] — column-major n-dimensional array with typed storage
//! - [`Shape`] — shape with row- and column-major strides
//! - [`DType`] — in-memory element types (U8, F32, F64)
//! - [`Error`] / [`Result`] — the error type shared by every satml crate

pub mod array;
pub mod dtype;
pub mod error;
pub mod shape;

pub use array::{NdArray, Storage};
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use shape::Shape;
