//! Symbolic operator expressions on labeled subsystems.
//!
//! An [`OpExpr`] is either an atomic operator acting on a single subsystem
//! (e.g. `X` on qubit 3) or a compound node built by ordinary arithmetic on
//! other expressions. Compounds are purely structural: no simplification is
//! performed at construction time. The flattening pass in
//! [`crate::builder`] converts a finished tree into its sum-of-products
//! normal form.
//!
//! Subsystem identifiers can be any `Clone + Eq + Hash + Debug` type; plain
//! `usize` site indices are the common case.

use std::{ hash::Hash, sync::{ Arc, OnceLock } };
use indexmap::IndexMap;
use num_complex::Complex64 as C64;

/// Case-insensitive resolver from user-facing operator type names to
/// canonical (lower-case) names.
///
/// Every [`OpExpr::Atom`] holds a shared reference to one of these; cloning
/// an expression tree shares the table rather than duplicating it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AliasTable {
    aliases: IndexMap<String, String>,
}

impl Default for AliasTable {
    fn default() -> Self {
        [("id", "i"), ("sx", "x"), ("sy", "y"), ("sz", "z")]
            .into_iter()
            .collect()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for AliasTable {
    fn from_iter<T>(iter: T) -> Self
    where T: IntoIterator<Item = (&'a str, &'a str)>
    {
        Self {
            aliases: iter.into_iter()
                .map(|(k, v)| (k.to_lowercase(), v.to_lowercase()))
                .collect(),
        }
    }
}

impl AliasTable {
    /// Return the shared, process-wide default table.
    ///
    /// Covers the usual names for the two-level operators: `id → i`,
    /// `sx → x`, `sy → y`, `sz → z`.
    pub fn shared_default() -> Arc<Self> {
        static DEFAULT: OnceLock<Arc<AliasTable>> = OnceLock::new();
        DEFAULT.get_or_init(|| Arc::new(Self::default())).clone()
    }

    /// Resolve a declared type name to its canonical form.
    ///
    /// The input is lower-cased first; names with no alias entry resolve to
    /// their lower-cased selves.
    pub fn canonical(&self, declared: &str) -> String {
        let lower = declared.to_lowercase();
        self.aliases.get(&lower).cloned().unwrap_or(lower)
    }

    /// Number of alias entries.
    pub fn len(&self) -> usize { self.aliases.len() }

    /// Return `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool { self.aliases.is_empty() }
}

/// A symbolic operator expression over subsystems labeled by `I`.
///
/// Trees are persistent: the arithmetic impls consume their operands into
/// new compound nodes and nothing is ever mutated in place. Scalar products
/// always store the operand first and the scalar second, regardless of
/// which side of the `*` the scalar appeared on.
#[derive(Clone, Debug, PartialEq)]
pub enum OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    /// A concrete physical operator on one subsystem.
    Atom {
        /// Subsystem identifier.
        subsystem: I,
        /// Type name as given by the caller.
        declared: String,
        /// Alias-resolved, lower-cased type name.
        canonical: String,
        /// Alias table used at construction, shared across the tree.
        aliases: Arc<AliasTable>,
    },
    /// Sum of operands.
    Sum(Vec<OpExpr<I>>),
    /// Ordered (non-commutative) product of operands.
    Prod(Vec<OpExpr<I>>),
    /// Product of an operand with a complex scalar.
    Scaled(Box<OpExpr<I>>, C64),
}

impl<I> OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    /// Create an atomic operator with the default alias table.
    pub fn atom<T>(subsystem: I, declared: T) -> Self
    where T: Into<String>
    {
        Self::atom_with(subsystem, declared, AliasTable::shared_default())
    }

    /// Create an atomic operator with an explicit alias table.
    pub fn atom_with<T>(subsystem: I, declared: T, aliases: Arc<AliasTable>)
        -> Self
    where T: Into<String>
    {
        let declared = declared.into();
        let canonical = aliases.canonical(&declared);
        Self::Atom { subsystem, declared, canonical, aliases }
    }

    /// Return `true` if `self` is an atomic operator.
    pub fn is_atom(&self) -> bool { matches!(self, Self::Atom { .. }) }
}

/// Pauli X on a subsystem.
pub fn sx<I>(subsystem: I) -> OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    OpExpr::atom(subsystem, "x")
}

/// Pauli Y on a subsystem.
pub fn sy<I>(subsystem: I) -> OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    OpExpr::atom(subsystem, "y")
}

/// Pauli Z on a subsystem.
pub fn sz<I>(subsystem: I) -> OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    OpExpr::atom(subsystem, "z")
}

/// Raising operator σ⁺ on a subsystem.
pub fn sp<I>(subsystem: I) -> OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    OpExpr::atom(subsystem, "sp")
}

/// Lowering operator σ⁻ on a subsystem.
pub fn sm<I>(subsystem: I) -> OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    OpExpr::atom(subsystem, "sm")
}

/// Identity on a subsystem.
pub fn sid<I>(subsystem: I) -> OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    OpExpr::atom(subsystem, "id")
}

/// Projector onto the ground state of a subsystem.
pub fn proj0<I>(subsystem: I) -> OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    OpExpr::atom(subsystem, "0")
}

/// Projector onto the excited state of a subsystem.
pub fn proj1<I>(subsystem: I) -> OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    OpExpr::atom(subsystem, "1")
}

impl<I> std::ops::Add for OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    type Output = Self;

    fn add(self, rhs: Self) -> Self { Self::Sum(vec![self, rhs]) }
}

impl<I> std::ops::Sub for OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    type Output = Self;

    fn sub(self, rhs: Self) -> Self { self + (-rhs) }
}

impl<I> std::ops::Neg for OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    type Output = Self;

    fn neg(self) -> Self { self * -1.0 }
}

// operator * operator: order is semantic.
impl<I> std::ops::Mul for OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    type Output = Self;

    fn mul(self, rhs: Self) -> Self { Self::Prod(vec![self, rhs]) }
}

impl<I> std::ops::Mul<C64> for OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    type Output = Self;

    fn mul(self, rhs: C64) -> Self { Self::Scaled(Box::new(self), rhs) }
}

impl<I> std::ops::Mul<f64> for OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    type Output = Self;

    fn mul(self, rhs: f64) -> Self { self * C64::from(rhs) }
}

impl<I> std::ops::Mul<i32> for OpExpr<I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    type Output = Self;

    fn mul(self, rhs: i32) -> Self { self * C64::from(f64::from(rhs)) }
}

impl<I> std::ops::Mul<OpExpr<I>> for C64
where I: Clone + Eq + Hash + std::fmt::Debug
{
    type Output = OpExpr<I>;

    fn mul(self, rhs: OpExpr<I>) -> OpExpr<I> { rhs * self }
}

impl<I> std::ops::Mul<OpExpr<I>> for f64
where I: Clone + Eq + Hash + std::fmt::Debug
{
    type Output = OpExpr<I>;

    fn mul(self, rhs: OpExpr<I>) -> OpExpr<I> { rhs * self }
}

impl<I> std::ops::Mul<OpExpr<I>> for i32
where I: Clone + Eq + Hash + std::fmt::Debug
{
    type Output = OpExpr<I>;

    fn mul(self, rhs: OpExpr<I>) -> OpExpr<I> { rhs * self }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_resolution_is_case_insensitive() {
        let table = AliasTable::default();
        assert_eq!(table.canonical("Sx"), "x");
        assert_eq!(table.canonical("SZ"), "z");
        assert_eq!(table.canonical("Id"), "i");
        // unaliased names pass through lower-cased
        assert_eq!(table.canonical("SP"), "sp");
        assert_eq!(table.canonical("null"), "null");
    }

    #[test]
    fn atoms_resolve_canonical_at_construction() {
        let op: OpExpr<usize> = OpExpr::atom(0, "Sy");
        match op {
            OpExpr::Atom { subsystem, declared, canonical, .. } => {
                assert_eq!(subsystem, 0);
                assert_eq!(declared, "Sy");
                assert_eq!(canonical, "y");
            },
            _ => panic!("expected an atom"),
        }
    }

    #[test]
    fn custom_alias_table() {
        let table = Arc::new(
            [("pauli_x", "x"), ("number", "n")]
                .into_iter()
                .collect::<AliasTable>()
        );
        let op: OpExpr<usize>
            = OpExpr::atom_with(1, "Pauli_X", table.clone());
        match op {
            OpExpr::Atom { canonical, .. } => assert_eq!(canonical, "x"),
            _ => panic!("expected an atom"),
        }
        assert_eq!(table.canonical("NUMBER"), "n");
    }

    #[test]
    fn clone_shares_alias_table() {
        let a: OpExpr<usize> = sx(0);
        let b = a.clone();
        let (OpExpr::Atom { aliases: ta, .. }, OpExpr::Atom { aliases: tb, .. })
            = (&a, &b)
            else { panic!("expected atoms") };
        assert!(Arc::ptr_eq(ta, tb));
    }

    #[test]
    fn scalar_product_stores_operand_first() {
        let left = 2.0 * sx(0_usize);
        let right = sx(0_usize) * 2.0;
        assert_eq!(left, right);
        assert!(matches!(left, OpExpr::Scaled(_, c) if c == C64::from(2.0)));
    }

    #[test]
    fn arithmetic_builds_expected_compounds() {
        let sum = sx(0_usize) + sz(1);
        assert!(matches!(&sum, OpExpr::Sum(ops) if ops.len() == 2));
        let prod = sx(0_usize) * sz(1);
        assert!(matches!(&prod, OpExpr::Prod(ops) if ops.len() == 2));
        let neg = -sx(0_usize);
        assert!(
            matches!(&neg, OpExpr::Scaled(_, c) if *c == C64::from(-1.0))
        );
    }

    #[test]
    fn subtraction_negates_right_operand() {
        let diff = sx(0_usize) - sy(0);
        let OpExpr::Sum(ops) = diff else { panic!("expected a sum") };
        assert_eq!(ops[0], sx(0_usize));
        assert_eq!(ops[1], sy(0_usize) * -1.0);
    }
}
