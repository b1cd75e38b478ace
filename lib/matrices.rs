//! Elementary matrix realizations of canonical operator types.
//!
//! The [`MatrixBuilder`][crate::builder::MatrixBuilder] never constructs
//! numeric matrices itself; it goes through a [`MatrixPrimitives`] provider
//! so that alternative backends (sparse storage, higher-dimensional operator
//! sets) can be substituted without touching the symbolic layer.

use ndarray::{ self as nd, linalg::kron };
use num_complex::Complex64 as C64;
use crate::builder::BuildError;

/// Supplier of elementary operator matrices, the zero matrix, and the
/// Kronecker product.
pub trait MatrixPrimitives {
    /// Return the matrix realizing a canonical operator type at a given
    /// dimension.
    ///
    /// The `"null"` type must yield the zero matrix at any dimension.
    fn operator(&self, canonical: &str, dim: usize)
        -> Result<nd::Array2<C64>, BuildError>;

    /// Kronecker product of two matrices; the left operand's axes are the
    /// outer (slower-varying) indices.
    fn kron(&self, left: &nd::Array2<C64>, right: &nd::Array2<C64>)
        -> nd::Array2<C64>
    {
        kron(left, right)
    }

    /// Square zero matrix of a given dimension.
    fn zeros(&self, dim: usize) -> nd::Array2<C64> {
        nd::Array2::zeros((dim, dim))
    }
}

/// Built-in provider for the standard two-level operators.
///
/// Recognizes `"null"` (zero matrix) and `"i"` (identity) at any dimension;
/// at dimension 2 additionally `x`, `y`, `z`, `sp`, `sm`, `0`, and `1`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TwoLevel;

impl MatrixPrimitives for TwoLevel {
    fn operator(&self, canonical: &str, dim: usize)
        -> Result<nd::Array2<C64>, BuildError>
    {
        let zero = C64::from(0.0);
        let one = C64::from(1.0);
        match (canonical, dim) {
            ("null", d) => Ok(self.zeros(d)),
            ("i", d) => Ok(nd::Array2::eye(d)),
            ("x", 2) => Ok(nd::array![[zero, one], [one, zero]]),
            ("y", 2) => Ok(nd::array![[zero, -C64::i()], [C64::i(), zero]]),
            ("z", 2) => Ok(nd::array![[one, zero], [zero, -one]]),
            ("sp", 2) => Ok(nd::array![[zero, one], [zero, zero]]),
            ("sm", 2) => Ok(nd::array![[zero, zero], [one, zero]]),
            ("0", 2) => Ok(nd::array![[one, zero], [zero, zero]]),
            ("1", 2) => Ok(nd::array![[zero, zero], [zero, one]]),
            (s, d) => Err(
                BuildError::UnsupportedOperator { s_type: s.to_string(), dim: d }
            ),
        }
    }
}
