//! Precompiled sparse linear combinations of pairwise matrix products.
//!
//! A declarative [`RuleTerm`] list says, for each output term, which pairs
//! of left/right operands to combine and with what coefficients.
//! [`compile_rule`] lowers the whole list into flat, rectangular tables: a
//! deduplicated list of unique operand pairs plus padded per-term
//! coefficient and index rows. [`CustomBinaryOp`] then evaluates the
//! compiled form against concrete operand batches, computing each unique
//! pairwise product exactly once per call.
//!
//! Evaluation is branch-free with respect to the table contents: padding
//! slots carry coefficient 0 and sentinel index -1, and sentinels are
//! resolved by clamping the lookup index to 0 so that the zero coefficient
//! annihilates the (arbitrary) product it addresses. The same inputs always
//! produce the same outputs; there is no hidden state.

use ndarray as nd;
use num_complex::Complex64 as C64;
use rustc_hash::FxHashMap as HashMap;

/// One output term of an operation rule: parallel arrays of coefficients
/// and `[left, right]` operand-index pairs.
///
/// The term's value is `sum_m coeffs[m] * op(A[pairs[m][0]], B[pairs[m][1]])`.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleTerm {
    /// Multiplicative coefficients.
    pub coeffs: Vec<C64>,
    /// Operand index pairs, parallel to `coeffs`.
    pub pairs: Vec<[usize; 2]>,
}

impl RuleTerm {
    /// Create a new term.
    ///
    /// *Panics* if the arrays have unequal lengths.
    pub fn new(coeffs: Vec<C64>, pairs: Vec<[usize; 2]>) -> Self {
        if coeffs.len() != pairs.len() {
            panic!("RuleTerm::new: unequal array lengths");
        }
        Self { coeffs, pairs }
    }

    /// Create a new term from real coefficients.
    pub fn from_real<T>(coeffs: T, pairs: Vec<[usize; 2]>) -> Self
    where T: IntoIterator<Item = f64>
    {
        Self::new(coeffs.into_iter().map(C64::from).collect(), pairs)
    }
}

/// The flat-table form of an operation rule.
///
/// `coeffs` and `indices` are rectangular, one row per output term;
/// `indices` entries point into `unique_pairs`. Padding is coefficient 0,
/// index -1, unique pair `[-1, -1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledRule {
    /// Deduplicated `[left, right]` operand pairs in first-seen order,
    /// offset-shifted and padded to `unique_len`.
    pub unique_pairs: Vec<[isize; 2]>,
    /// Per-term coefficient rows, padded to `combo_len`.
    pub coeffs: nd::Array2<C64>,
    /// Per-term indices into `unique_pairs`, parallel to `coeffs`.
    pub indices: nd::Array2<isize>,
}

/// Lower an operation rule into its [`CompiledRule`] table form.
///
/// Pairs are deduplicated across all terms in scan order; duplicate pairs
/// *within* one term keep separate coefficient slots referencing the same
/// unique index. `unique_len` and `combo_len` default to the number of
/// unique pairs and the longest term, respectively; larger values pad the
/// tables without changing evaluated results. `index_offset` shifts every
/// stored operand index.
///
/// *Panics* if a requested table length is too small to hold the rule.
pub fn compile_rule(
    rule: &[RuleTerm],
    unique_len: Option<usize>,
    combo_len: Option<usize>,
    index_offset: usize,
) -> CompiledRule
{
    let mut unique_pairs: Vec<[isize; 2]> = Vec::new();
    let mut positions: HashMap<[usize; 2], usize> = HashMap::default();
    let mut rows: Vec<(Vec<C64>, Vec<isize>)>
        = Vec::with_capacity(rule.len());
    for term in rule.iter() {
        let mut coeff_row: Vec<C64> = Vec::with_capacity(term.coeffs.len());
        let mut index_row: Vec<isize> = Vec::with_capacity(term.pairs.len());
        for (&coeff, &pair) in term.coeffs.iter().zip(term.pairs.iter()) {
            let pos: usize
                = *positions.entry(pair)
                .or_insert_with(|| {
                    unique_pairs.push([
                        (pair[0] + index_offset) as isize,
                        (pair[1] + index_offset) as isize,
                    ]);
                    unique_pairs.len() - 1
                });
            coeff_row.push(coeff);
            index_row.push(pos as isize);
        }
        rows.push((coeff_row, index_row));
    }

    let unique_len = unique_len.unwrap_or(unique_pairs.len());
    if unique_len < unique_pairs.len() {
        panic!("compile_rule: unique_len too small for rule");
    }
    unique_pairs.resize(unique_len, [-1, -1]);

    let combo_len = combo_len.unwrap_or_else(|| {
        rows.iter().map(|(c, _)| c.len()).max().unwrap_or(0)
    });
    if rows.iter().any(|(c, _)| c.len() > combo_len) {
        panic!("compile_rule: combo_len too small for rule");
    }
    let mut coeffs: nd::Array2<C64>
        = nd::Array2::zeros((rows.len(), combo_len));
    let mut indices: nd::Array2<isize>
        = nd::Array2::from_elem((rows.len(), combo_len), -1);
    for (k, (coeff_row, index_row)) in rows.into_iter().enumerate() {
        coeff_row.into_iter().zip(index_row)
            .enumerate()
            .for_each(|(m, (coeff, index))| {
                coeffs[[k, m]] = coeff;
                indices[[k, m]] = index;
            });
    }
    CompiledRule { unique_pairs, coeffs, indices }
}

/// Signature of a pairwise matrix operation.
pub type BinOpFn = fn(nd::ArrayView2<C64>, nd::ArrayView2<C64>)
    -> nd::Array2<C64>;

/// A compiled operation rule bound to a pairwise matrix operation, ready
/// for repeated batched evaluation.
#[derive(Clone, Debug)]
pub struct CustomBinaryOp<F = BinOpFn>
where F: Fn(nd::ArrayView2<C64>, nd::ArrayView2<C64>) -> nd::Array2<C64>
{
    rule: CompiledRule,
    binary_op: F,
}

impl CustomBinaryOp<BinOpFn> {
    /// Bind a rule to matrix multiplication.
    pub fn matmul(rule: &[RuleTerm]) -> Self {
        Self::new(rule, |a, b| a.dot(&b))
    }

    /// Bind a rule to elementwise multiplication.
    ///
    /// Operands are broadcast against each other per `ndarray`'s rules.
    pub fn mul(rule: &[RuleTerm]) -> Self {
        Self::new(rule, |a, b| &a * &b)
    }
}

impl<F> CustomBinaryOp<F>
where F: Fn(nd::ArrayView2<C64>, nd::ArrayView2<C64>) -> nd::Array2<C64>
{
    /// Compile a rule (with default table lengths and no offset) and bind
    /// it to a pairwise operation.
    pub fn new(rule: &[RuleTerm], binary_op: F) -> Self {
        Self { rule: compile_rule(rule, None, None, 0), binary_op }
    }

    /// Bind an already-compiled rule to a pairwise operation.
    pub fn from_compiled(rule: CompiledRule, binary_op: F) -> Self {
        Self { rule, binary_op }
    }

    /// The compiled table form.
    pub fn compiled(&self) -> &CompiledRule { &self.rule }

    /// Evaluate every output term against operand batches.
    ///
    /// `a` and `b` are indexed independently by the rule's left and right
    /// operand indices; their lengths need not match, and the matrices need
    /// not be square. Each unique pair's product is computed once. A term
    /// with no combination slots evaluates to the zero matrix of the
    /// products' common shape; if the whole rule has no pairs at all there
    /// is no shape to derive from and such terms come back 0×0.
    ///
    /// *Panics* if a non-sentinel pair index is out of bounds for `a` or
    /// `b`, or if the rule is nonempty and either batch is empty.
    pub fn apply(&self, a: &[nd::Array2<C64>], b: &[nd::Array2<C64>])
        -> Vec<nd::Array2<C64>>
    {
        let products: Vec<nd::Array2<C64>>
            = self.rule.unique_pairs.iter()
            .map(|&[l, r]| {
                // sentinel pads clamp to index 0; they are only ever
                // addressed through a zero coefficient
                (self.binary_op)(
                    a[l.max(0) as usize].view(),
                    b[r.max(0) as usize].view(),
                )
            })
            .collect();
        self.rule.coeffs.outer_iter()
            .zip(self.rule.indices.outer_iter())
            .map(|(coeff_row, index_row)| {
                let mut acc: Option<nd::Array2<C64>> = None;
                coeff_row.iter().zip(index_row.iter())
                    .for_each(|(&coeff, &index)| {
                        let prod = &products[index.max(0) as usize];
                        match acc.as_mut() {
                            Some(acc) => { acc.scaled_add(coeff, prod); },
                            None => {
                                acc = Some(prod.mapv(|x| coeff * x));
                            },
                        }
                    });
                acc.unwrap_or_else(|| {
                    let shape = products.first()
                        .map(|prod| prod.raw_dim())
                        .unwrap_or_else(|| nd::Ix2(0, 0));
                    nd::Array2::zeros(shape)
                })
            })
            .collect()
    }
}
