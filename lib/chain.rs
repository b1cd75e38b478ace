//! Mapping of normal-form operator dictionaries onto uniform spin-chain
//! solver parameters.
//!
//! Downstream chain solvers do not consume matrices; they take per-site
//! field and dissipation vectors plus site-site coupling matrices. This
//! module walks the `(key tuple, coefficient)` entries of flattened
//! [`OpString`]s and accumulates them into that parameter structure,
//! rejecting any term the uniform-chain form cannot represent.

use std::hash::Hash;
use ndarray as nd;
use num_complex::Complex64 as C64;
use thiserror::Error;
use crate::builder::{ OpString, ProdKey, SubsystemMap };

/// Absolute tolerance for comparing coefficients that must be equal.
const EQUALITY_PRECISION: f64 = 1e-9;

/// Absolute tolerance for treating a coefficient as real.
const IMAG_PRECISION: f64 = 1e-12;

/// Errors arising while mapping operator terms onto chain parameters.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A subsystem in the map is not a two-level system.
    #[error("all subsystems of a chain must be two-level; id {id} has \
        dimension {dim}")]
    NotTwoLevel {
        /// Debug rendering of the offending id.
        id: String,
        /// Declared dimension.
        dim: usize,
    },

    /// A term is not among the operators the chain form supports.
    #[error("the operator term {term} is not one of the {context} \
        operators supported by the chain mapping")]
    UnsupportedTerm {
        /// Debug rendering of the offending key tuple.
        term: String,
        /// Which operator family was expected.
        context: &'static str,
    },

    /// A two-site interaction term addresses a single site twice.
    #[error("the operator term {term} does not correspond to a valid \
        two-site interaction (it involves a single site)")]
    IdentityBond {
        /// Debug rendering of the offending key tuple.
        term: String,
    },

    /// A term references a subsystem id absent from the map.
    #[error("an operator was defined with subsystem id {id}, but this id \
        does not appear in the subsystem map")]
    MissingSubsystem {
        /// Debug rendering of the offending id.
        id: String,
    },

    /// The XX and YY couplings between two sites disagree, which the
    /// single-`J` chain form cannot represent.
    #[error("the interaction between sites {left} and {right} has \
        different coefficients for the XX and YY terms")]
    AsymmetricCoupling {
        /// Axis position of the first site.
        left: usize,
        /// Axis position of the second site.
        right: usize,
    },

    /// A term's coefficient has a non-negligible imaginary part.
    #[error("the operator term {term} has a coefficient with \
        non-negligible imaginary part ({coeff})")]
    ComplexCoefficient {
        /// Debug rendering of the offending key tuple.
        term: String,
        /// The coefficient.
        coeff: C64,
    },
}

pub type ChainResult<T> = Result<T, ChainError>;

/// Uniform spin-chain parameters extracted from operator dictionaries.
///
/// Site order follows the subsystem map's insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainParams {
    /// Per-site X field strengths.
    pub h_x: nd::Array1<f64>,
    /// Per-site Y field strengths.
    pub h_y: nd::Array1<f64>,
    /// Per-site Z field strengths.
    pub h_z: nd::Array1<f64>,
    /// Site-site XX (= YY) coupling strengths.
    pub j: nd::Array2<f64>,
    /// Site-site ZZ coupling strengths.
    pub j_z: nd::Array2<f64>,
    /// Per-site σ⁺ dissipation rates.
    pub g_0: nd::Array1<f64>,
    /// Per-site σ⁻ dissipation rates.
    pub g_1: nd::Array1<f64>,
    /// Per-site Z dephasing rates.
    pub g_2: nd::Array1<f64>,
}

/// Accumulates flattened operator terms into [`ChainParams`].
#[derive(Copy, Clone, Debug)]
pub struct ChainBuilder<'a, I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    subsystems: &'a SubsystemMap<I>,
}

impl<'a, I> ChainBuilder<'a, I>
where I: Clone + Eq + Hash + std::fmt::Debug
{
    /// Create a builder over a subsystem map whose entries must all have
    /// dimension 2.
    pub fn new(subsystems: &'a SubsystemMap<I>) -> ChainResult<Self> {
        if let Some((id, &dim))
            = subsystems.iter().find(|(_, &dim)| dim != 2)
        {
            return Err(ChainError::NotTwoLevel {
                id: format!("{:?}", id),
                dim,
            });
        }
        Ok(Self { subsystems })
    }

    /// Number of chain sites.
    pub fn num_sites(&self) -> usize { self.subsystems.len() }

    /// Accumulate Hamiltonian and dissipator dictionaries into chain
    /// parameters.
    ///
    /// Hamiltonian terms must be single-site `x`/`y`/`z` fields or
    /// two-site same-type couplings on distinct sites; dissipator terms
    /// must be single-site `sp`/`sm`/`z`. After accumulation the XX and YY
    /// coupling matrices must agree entry-wise.
    pub fn build(
        &self,
        hamiltonian: &[OpString<I>],
        dissipators: &[OpString<I>],
    ) -> ChainResult<ChainParams>
    {
        let n = self.num_sites();
        let mut h: [nd::Array1<f64>; 3] = [
            nd::Array1::zeros(n),
            nd::Array1::zeros(n),
            nd::Array1::zeros(n),
        ];
        let mut j: [nd::Array2<f64>; 3] = [
            nd::Array2::zeros((n, n)),
            nd::Array2::zeros((n, n)),
            nd::Array2::zeros((n, n)),
        ];
        let mut g: [nd::Array1<f64>; 3] = [
            nd::Array1::zeros(n),
            nd::Array1::zeros(n),
            nd::Array1::zeros(n),
        ];
        const H_TYPES: [&str; 3] = ["x", "y", "z"];
        const G_TYPES: [&str; 3] = ["sp", "sm", "z"];

        for ops in hamiltonian.iter() {
            for (key, &coeff) in ops.iter() {
                let coeff = self.real_coeff(key, coeff)?;
                match key.as_slice() {
                    [single] => {
                        let a = Self::type_index(
                            key, &single.canonical, &H_TYPES, "field")?;
                        let site = self.site_index(&single.subsystem)?;
                        h[a][site] += coeff;
                    },
                    [left, right] => {
                        let a = Self::type_index(
                            key, &left.canonical, &H_TYPES, "coupling")?;
                        if right.canonical != left.canonical {
                            return Err(Self::unsupported(key, "coupling"));
                        }
                        let site1 = self.site_index(&left.subsystem)?;
                        let site2 = self.site_index(&right.subsystem)?;
                        if site1 == site2 {
                            return Err(ChainError::IdentityBond {
                                term: format!("{:?}", key),
                            });
                        }
                        j[a][[site1, site2]] += coeff;
                    },
                    _ => {
                        return Err(
                            Self::unsupported(key, "field or coupling"));
                    },
                }
            }
        }

        for ops in dissipators.iter() {
            for (key, &coeff) in ops.iter() {
                let coeff = self.real_coeff(key, coeff)?;
                match key.as_slice() {
                    [single] => {
                        let a = Self::type_index(
                            key, &single.canonical, &G_TYPES, "dissipator")?;
                        let site = self.site_index(&single.subsystem)?;
                        g[a][site] += coeff;
                    },
                    _ => {
                        return Err(Self::unsupported(key, "dissipator"));
                    },
                }
            }
        }

        let [j_x, j_y, j_z] = j;
        for ((left, right), (jx, jy))
            in nd::indices(j_x.dim()).into_iter()
                .zip(j_x.iter().zip(j_y.iter()))
        {
            if (jx - jy).abs() > EQUALITY_PRECISION {
                return Err(ChainError::AsymmetricCoupling { left, right });
            }
        }
        let [h_x, h_y, h_z] = h;
        let [g_0, g_1, g_2] = g;
        Ok(ChainParams { h_x, h_y, h_z, j: j_x, j_z, g_0, g_1, g_2 })
    }

    fn site_index(&self, id: &I) -> ChainResult<usize> {
        self.subsystems.get_index_of(id)
            .ok_or_else(|| ChainError::MissingSubsystem {
                id: format!("{:?}", id),
            })
    }

    fn real_coeff(&self, key: &ProdKey<I>, coeff: C64) -> ChainResult<f64> {
        if coeff.im.abs() > IMAG_PRECISION {
            return Err(ChainError::ComplexCoefficient {
                term: format!("{:?}", key),
                coeff,
            });
        }
        Ok(coeff.re)
    }

    fn type_index(
        key: &ProdKey<I>,
        canonical: &str,
        types: &[&str; 3],
        context: &'static str,
    ) -> ChainResult<usize>
    {
        types.iter()
            .position(|t| *t == canonical)
            .ok_or_else(|| Self::unsupported(key, context))
    }

    fn unsupported(key: &ProdKey<I>, context: &'static str) -> ChainError {
        ChainError::UnsupportedTerm {
            term: format!("{:?}", key),
            context,
        }
    }
}
