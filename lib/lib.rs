//! Symbolic operator algebra for quantum many-body dynamics, compiled to
//! numeric matrices.
//!
//! Expressions over labeled subsystems are composed with ordinary
//! arithmetic ([`operator`]), normalized into a canonical sum-of-products
//! dictionary form, and realized as dense matrices by Kronecker assembly
//! over a caller-supplied subsystem dimension map ([`builder`], with
//! numeric primitives supplied by [`matrices`]). Declarative pairwise
//! combination rules compile into flat, padded tables for repeated batched
//! evaluation ([`binop`]), and flattened dictionaries map onto uniform
//! spin-chain solver parameters ([`chain`]).
//!
//! ```
//! use dynops::{
//!     builder::{ MatrixBuilder, SubsystemMap },
//!     operator::{ sx, sz },
//! };
//!
//! let subsystems: SubsystemMap<usize> = [(0, 2), (1, 2)].into_iter().collect();
//! let builder = MatrixBuilder::new(&subsystems)?;
//! let h = builder.build_expr(&(sx(0) * 0.5 + sz(0) * sz(1)))?;
//! assert_eq!(h.dim(), (4, 4));
//! # Ok::<(), dynops::builder::BuildError>(())
//! ```

pub mod operator;
pub mod builder;
pub mod matrices;
pub mod binop;
pub mod chain;
