//! Compilation of operator expressions into normal-form dictionaries and
//! dense matrices.
//!
//! The pipeline has two halves. [`flatten`] rewrites an [`OpExpr`] tree into
//! an [`OpString`]: an insertion-ordered mapping from ordered products of
//! elementary operators to complex coefficients, with the entries understood
//! to be summed. [`MatrixBuilder`] then realizes an `OpString` as a dense
//! matrix by Kronecker-product assembly over a caller-supplied
//! [`SubsystemMap`], delegating all numeric primitives to a
//! [`MatrixPrimitives`] provider.
//!
//! Axis order is the subsystem map's insertion order, a caller contract; it
//! is never inferred from the operators themselves.

use std::{ hash::Hash, ops::Deref };
use indexmap::IndexMap;
use itertools::Itertools;
use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::Zero;
use rustc_hash::FxHashMap as HashMap;
use thiserror::Error;
use crate::{
    matrices::{ MatrixPrimitives, TwoLevel },
    operator::OpExpr,
};

/// Errors arising during matrix realization.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A canonical operator type has no matrix realization at the requested
    /// dimension.
    #[error("operator type '{s_type}' is unknown or unsupported for matrix \
        generation at dimension {dim}")]
    UnsupportedOperator {
        /// Canonical type name.
        s_type: String,
        /// Requested dimension.
        dim: usize,
    },

    /// A normal-form key references a subsystem id absent from the caller's
    /// subsystem map.
    #[error("an operator was defined with subsystem id {id}, but this id \
        does not appear in the subsystem map")]
    MissingSubsystem {
        /// Debug rendering of the offending id.
        id: String,
    },
}

pub type BuildResult<T> = Result<T, BuildError>;

/// Identity of an elementary operator: a subsystem id paired with an
/// alias-resolved canonical type.
///
/// Two atoms with equal `OpKey`s are operator-identical, no matter how they
/// were declared.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OpKey<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    /// Subsystem identifier.
    pub subsystem: I,
    /// Canonical operator type.
    pub canonical: String,
}

impl<I> OpKey<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    /// Create a new key.
    pub fn new<T>(subsystem: I, canonical: T) -> Self
    where T: Into<String>
    {
        Self { subsystem, canonical: canonical.into() }
    }
}

/// An ordered product of elementary operators; order encodes
/// non-commutativity.
pub type ProdKey<I> = Vec<OpKey<I>>;

/// The sum-of-products normal form of an operator expression.
///
/// Backed by a single [`IndexMap`] (accessible through [`Deref`]) so that
/// term order is deterministic: first-encountered first. Equal product keys
/// are always merged by coefficient addition.
#[derive(Clone, Debug, PartialEq)]
pub struct OpString<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    terms: IndexMap<ProdKey<I>, C64>,
}

impl<I> Default for OpString<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    fn default() -> Self { Self { terms: IndexMap::new() } }
}

impl<I> Deref for OpString<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    type Target = IndexMap<ProdKey<I>, C64>;

    fn deref(&self) -> &Self::Target { &self.terms }
}

impl<I> FromIterator<(ProdKey<I>, C64)> for OpString<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    fn from_iter<T>(iter: T) -> Self
    where T: IntoIterator<Item = (ProdKey<I>, C64)>
    {
        let mut new = Self::default();
        iter.into_iter()
            .for_each(|(key, coeff)| { new.add_term(key, coeff); });
        new
    }
}

impl<I> OpString<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    /// Create a new, empty normal form.
    pub fn new() -> Self { Self::default() }

    /// Add a single product term, merging with an existing equal key by
    /// coefficient addition.
    pub fn add_term(&mut self, key: ProdKey<I>, coeff: C64) -> &mut Self {
        *self.terms.entry(key).or_insert_with(C64::zero) += coeff;
        self
    }

    /// Merge another normal form into `self` term-wise.
    pub fn merge(&mut self, other: Self) -> &mut Self {
        other.terms.into_iter()
            .for_each(|(key, coeff)| { self.add_term(key, coeff); });
        self
    }

    /// Multiply every coefficient by a scalar.
    pub fn scale(&mut self, scalar: C64) -> &mut Self {
        self.terms.values_mut().for_each(|coeff| { *coeff *= scalar; });
        self
    }
}

/// Rewrite an expression tree into its sum-of-products normal form.
///
/// Sums merge term-wise with coefficient addition; products distribute over
/// their operands' terms by key concatenation (order preserved, left to
/// right); scalar products scale every coefficient.
pub fn flatten<I>(op: &OpExpr<I>) -> OpString<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    match op {
        OpExpr::Atom { subsystem, canonical, .. } => {
            let key = vec![OpKey::new(subsystem.clone(), canonical.clone())];
            [(key, C64::from(1.0))].into_iter().collect()
        },
        OpExpr::Sum(ops) => {
            let mut result = OpString::new();
            ops.iter()
                .for_each(|op| { result.merge(flatten(op)); });
            result
        },
        OpExpr::Prod(ops) => {
            // left fold from the multiplicative identity
            let mut acc: OpString<I>
                = [(Vec::new(), C64::from(1.0))].into_iter().collect();
            for op in ops.iter() {
                let factor = flatten(op);
                acc = acc.iter()
                    .cartesian_product(factor.iter())
                    .map(|((k1, v1), (k2, v2))| {
                        let key: ProdKey<I>
                            = k1.iter().chain(k2).cloned().collect();
                        (key, v1 * v2)
                    })
                    .collect();
            }
            acc
        },
        OpExpr::Scaled(op, scalar) => {
            let mut result = flatten(op);
            result.scale(*scalar);
            result
        },
    }
}

/// [`flatten`] each of a batch of expressions.
pub fn flatten_all<I>(ops: &[OpExpr<I>]) -> Vec<OpString<I>>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    ops.iter().map(flatten).collect()
}

/// Order-preserving mapping from subsystem id to Hilbert-space dimension.
///
/// Insertion order fixes the Kronecker axis order of every realized matrix.
/// A dimension of 0 prunes the subsystem: it contributes no tensor axis.
pub type SubsystemMap<I> = IndexMap<I, usize>;

/// Realizes normal-form dictionaries as dense matrices over a fixed
/// subsystem map.
///
/// Identity matrices for all included subsystems are cached at construction.
#[derive(Clone, Debug)]
pub struct MatrixBuilder<'a, I, P = TwoLevel>
where
    I: Clone + Eq + Hash + std::fmt::Debug,
    P: MatrixPrimitives,
{
    subsystems: &'a SubsystemMap<I>,
    provider: P,
    identities: Vec<Option<nd::Array2<C64>>>,
    total_dim: usize,
}

impl<'a, I> MatrixBuilder<'a, I, TwoLevel>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    /// Create a builder over the built-in two-level provider.
    pub fn new(subsystems: &'a SubsystemMap<I>) -> BuildResult<Self> {
        Self::with_provider(subsystems, TwoLevel)
    }
}

impl<'a, I, P> MatrixBuilder<'a, I, P>
where
    I: Clone + Eq + Hash + std::fmt::Debug,
    P: MatrixPrimitives,
{
    /// Create a builder with an explicit primitive provider.
    pub fn with_provider(subsystems: &'a SubsystemMap<I>, provider: P)
        -> BuildResult<Self>
    {
        let identities: Vec<Option<nd::Array2<C64>>>
            = subsystems.values()
            .map(|&dim| {
                (dim > 0)
                    .then(|| provider.operator("i", dim))
                    .transpose()
            })
            .collect::<BuildResult<_>>()?;
        let total_dim: usize
            = subsystems.values().filter(|&&dim| dim > 0).product();
        Ok(Self { subsystems, provider, identities, total_dim })
    }

    /// Total dimension of the realized tensor space (product of all nonzero
    /// subsystem dimensions).
    pub fn total_dim(&self) -> usize { self.total_dim }

    /// Realize a normal-form dictionary as a dense matrix.
    ///
    /// An empty dictionary yields the zero matrix of the full dimension.
    /// Keys addressing a pruned (dimension-0) subsystem lose those factors;
    /// the rest of the term survives. See DESIGN.md for the status of this
    /// pruning behavior.
    pub fn build(&self, ops: &OpString<I>) -> BuildResult<nd::Array2<C64>> {
        let mut matrix = self.provider.zeros(self.total_dim);
        for (key, coeff) in ops.iter() {
            // compose repeated factors on one subsystem in key order
            let mut factors: HashMap<&I, nd::Array2<C64>>
                = HashMap::default();
            for op_key in key.iter() {
                let Some(&dim) = self.subsystems.get(&op_key.subsystem)
                    else {
                        return Err(BuildError::MissingSubsystem {
                            id: format!("{:?}", op_key.subsystem),
                        });
                    };
                if dim == 0 { continue; }
                let mat = self.provider.operator(&op_key.canonical, dim)?;
                match factors.get_mut(&op_key.subsystem) {
                    Some(acc) => { *acc = acc.dot(&mat); },
                    None => { factors.insert(&op_key.subsystem, mat); },
                }
            }
            let mut term: Option<nd::Array2<C64>> = None;
            for (k, (id, &dim)) in self.subsystems.iter().enumerate() {
                if dim == 0 { continue; }
                let sub: &nd::Array2<C64>
                    = factors.get(id)
                    .or(self.identities[k].as_ref())
                    .unwrap();
                term = Some(match term {
                    Some(acc) => self.provider.kron(&acc, sub),
                    None => sub.clone(),
                });
            }
            if let Some(term) = term {
                matrix.scaled_add(*coeff, &term);
            }
        }
        Ok(matrix)
    }

    /// Flatten an expression tree and realize it.
    pub fn build_expr(&self, op: &OpExpr<I>) -> BuildResult<nd::Array2<C64>> {
        self.build(&flatten(op))
    }

    /// Realize a batch of normal-form dictionaries.
    pub fn build_all(&self, ops: &[OpString<I>])
        -> BuildResult<Vec<nd::Array2<C64>>>
    {
        ops.iter().map(|op| self.build(op)).collect()
    }

    /// Flatten and realize a batch of expression trees.
    pub fn build_exprs(&self, ops: &[OpExpr<I>])
        -> BuildResult<Vec<nd::Array2<C64>>>
    {
        ops.iter().map(|op| self.build_expr(op)).collect()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::linalg::kron;
    use crate::operator::{ sx, sy, sz, sp, proj1 };
    use super::*;

    fn approx(a: &nd::Array2<C64>, b: &nd::Array2<C64>) -> bool {
        a.shape() == b.shape()
            && a.iter().zip(b.iter()).all(|(x, y)| (x - y).norm() < 1e-12)
    }

    fn pauli(canonical: &str) -> nd::Array2<C64> {
        TwoLevel.operator(canonical, 2).unwrap()
    }

    fn qubits(n: usize) -> SubsystemMap<usize> {
        (0..n).map(|k| (k, 2)).collect()
    }

    #[test]
    fn flatten_atom() {
        let ops = flatten(&sx(0_usize));
        assert_eq!(ops.len(), 1);
        let (key, coeff) = ops.first().unwrap();
        assert_eq!(key, &vec![OpKey::new(0, "x")]);
        assert_eq!(*coeff, C64::from(1.0));
    }

    #[test]
    fn sum_merges_equal_keys() {
        let ops = flatten(&(sx(0_usize) + sx(0)));
        assert_eq!(ops.len(), 1);
        assert_eq!(
            ops.get(&vec![OpKey::new(0_usize, "x")]),
            Some(&C64::from(2.0)),
        );

        let ops = flatten(&(sx(0_usize) - sx(0)));
        assert_eq!(ops.get(&vec![OpKey::new(0_usize, "x")]),
            Some(&C64::from(0.0)));
    }

    #[test]
    fn aliased_atoms_are_operator_identical() {
        let expr = OpExpr::atom(0_usize, "Sz") + OpExpr::atom(0_usize, "z");
        let ops = flatten(&expr);
        assert_eq!(ops.len(), 1);
        assert_eq!(
            ops.get(&vec![OpKey::new(0_usize, "z")]),
            Some(&C64::from(2.0)),
        );
    }

    #[test]
    fn product_concatenates_keys_in_order() {
        let ops = flatten(&(sx(0_usize) * sz(1)));
        assert_eq!(ops.len(), 1);
        let (key, coeff) = ops.first().unwrap();
        assert_eq!(
            key,
            &vec![OpKey::new(0_usize, "x"), OpKey::new(1_usize, "z")],
        );
        assert_eq!(*coeff, C64::from(1.0));

        let rev = flatten(&(sz(1_usize) * sx(0)));
        let (key_rev, _) = rev.first().unwrap();
        assert_ne!(key, key_rev);
    }

    #[test]
    fn product_distributes_over_sums() {
        let ops = flatten(&((sx(0_usize) + sy(0)) * (sz(1_usize) * 2.0)));
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops.get(&vec![OpKey::new(0_usize, "x"), OpKey::new(1, "z")]),
            Some(&C64::from(2.0)),
        );
        assert_eq!(
            ops.get(&vec![OpKey::new(0_usize, "y"), OpKey::new(1, "z")]),
            Some(&C64::from(2.0)),
        );
    }

    #[test]
    fn scaled_flattening_scales_all_coefficients() {
        let c = C64::new(0.5, -1.5);
        let ops = flatten(&((sx(0_usize) + sz(1)) * c));
        assert_eq!(ops.len(), 2);
        assert!(ops.values().all(|coeff| *coeff == c));
    }

    #[test]
    fn single_site_embedding() {
        let subsystems = qubits(2);
        let builder = MatrixBuilder::new(&subsystems).unwrap();
        assert_eq!(builder.total_dim(), 4);

        let x0 = builder.build_expr(&sx(0)).unwrap();
        assert!(approx(&x0, &kron(&pauli("x"), &pauli("i"))));

        let z1 = builder.build_expr(&sz(1)).unwrap();
        assert!(approx(&z1, &kron(&pauli("i"), &pauli("z"))));
    }

    #[test]
    fn same_site_products_do_not_commute() {
        let subsystems = qubits(1);
        let builder = MatrixBuilder::new(&subsystems).unwrap();
        let xz = builder.build_expr(&(sx(0) * sz(0))).unwrap();
        let zx = builder.build_expr(&(sz(0) * sx(0))).unwrap();
        assert!(!approx(&xz, &zx));
        assert!(approx(&xz, &pauli("x").dot(&pauli("z"))));
        assert!(approx(&zx, &pauli("z").dot(&pauli("x"))));
    }

    #[test]
    fn scalar_product_commutes_with_realization() {
        let c = C64::new(2.0, -0.5);
        let subsystems = qubits(2);
        let builder = MatrixBuilder::new(&subsystems).unwrap();
        let scaled = builder.build_expr(&(c * (sx(0) * sy(1)))).unwrap();
        let plain = builder.build_expr(&(sx(0) * sy(1))).unwrap();
        assert!(approx(&scaled, &plain.mapv(|x| c * x)));
    }

    #[test]
    fn prebuilt_dictionaries_realize_directly() {
        let subsystems = qubits(2);
        let builder = MatrixBuilder::new(&subsystems).unwrap();
        let expr = sx(0) * sz(1) + sp(0) * 3.0;
        let from_dict = builder.build(&flatten(&expr)).unwrap();
        let from_expr = builder.build_expr(&expr).unwrap();
        assert!(approx(&from_dict, &from_expr));
    }

    #[test]
    fn empty_opstring_yields_zeros() {
        let subsystems = qubits(3);
        let builder = MatrixBuilder::new(&subsystems).unwrap();
        let zero = builder.build(&OpString::new()).unwrap();
        assert_eq!(zero, nd::Array2::zeros((8, 8)));
    }

    #[test]
    fn missing_subsystem_names_the_id() {
        let subsystems = qubits(2);
        let builder = MatrixBuilder::new(&subsystems).unwrap();
        let err = builder.build_expr(&sx(7)).unwrap_err();
        match err {
            BuildError::MissingSubsystem { id } => assert_eq!(id, "7"),
            _ => panic!("expected MissingSubsystem"),
        }
    }

    #[test]
    fn unsupported_operator_at_odd_dimension() {
        let subsystems: SubsystemMap<usize>
            = [(0, 2), (1, 3)].into_iter().collect();
        let builder = MatrixBuilder::new(&subsystems).unwrap();
        let err = builder.build_expr(&sx(1)).unwrap_err();
        assert!(matches!(
            err,
            BuildError::UnsupportedOperator { dim: 3, .. },
        ));
    }

    #[test]
    fn pruned_subsystems_drop_their_axis() {
        let subsystems: SubsystemMap<usize>
            = [(0, 2), (1, 0), (2, 2)].into_iter().collect();
        let builder = MatrixBuilder::new(&subsystems).unwrap();
        assert_eq!(builder.total_dim(), 4);

        // the factor on the pruned subsystem is dropped from the term
        let mat = builder.build_expr(&(sx(0) * sz(1))).unwrap();
        assert!(approx(&mat, &kron(&pauli("x"), &pauli("i"))));

        let mat = builder.build_expr(&sz(2)).unwrap();
        assert!(approx(&mat, &kron(&pauli("i"), &pauli("z"))));
    }

    #[test]
    fn batch_entry_points_preserve_order() {
        let subsystems = qubits(2);
        let builder = MatrixBuilder::new(&subsystems).unwrap();
        let exprs = vec![sx(0), sz(1), proj1(0)];
        let mats = builder.build_exprs(&exprs).unwrap();
        assert_eq!(mats.len(), 3);
        assert!(approx(&mats[0], &kron(&pauli("x"), &pauli("i"))));
        assert!(approx(&mats[1], &kron(&pauli("i"), &pauli("z"))));
        assert!(approx(&mats[2], &kron(&pauli("1"), &pauli("i"))));

        let strings = flatten_all(&exprs);
        let mats2 = builder.build_all(&strings).unwrap();
        assert_eq!(mats, mats2);
    }
}
