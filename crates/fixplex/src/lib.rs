//! Fixplex — fixed-width modular simplex
//!
//! Decides feasibility of a conjunction of linear equalities over
//! fixed-precision unsigned integers (arithmetic modulo `2^W`), together
//! with strict and non-strict inequalities between variables. Designed to
//! sit under a host decision procedure: the host supplies opaque dependency
//! tokens with every bound, and an infeasible verdict comes with the unsat
//! core as the union of the responsible tokens.
//!
//! ## Core techniques
//! - Modular pivoting under the Olm–Seidl condition: the pivot coefficient
//!   must have minimal 2-adic valuation in its column so that column
//!   elimination preserves the solution set despite non-invertible (even)
//!   coefficients
//! - Value patching with Bland's rule as an anti-cycling fallback
//! - Modular-interval bound propagation over rows
//! - Pair-wise inequality propagation via exhaustive case tables over the
//!   wrap states of two intervals, completed by a strict-cycle check on the
//!   inequality graph
//! - Backtrackable trail undoing bound tightenings, row additions and
//!   inequality additions in LIFO order
//!
//! When a pivot would require dividing by an even coefficient the solver
//! may answer [`Feasibility::Unknown`] rather than commit; the host is
//! expected to finish the search by other means. Infeasible answers are
//! always sound.
//!
//! ## Example
//!
//! ```
//! use fixplex::{Config, Feasibility, Fixplex, Var};
//!
//! // 3x + 5y == 0 (mod 2^8), x in [0, 4)
//! let mut s: Fixplex<u8> = Fixplex::new(Config::default());
//! s.add_row(Var(0), &[(Var(0), 3), (Var(1), 5)]);
//! s.set_bounds(Var(0), 0, 4, 1);
//! assert_eq!(s.make_feasible(), Feasibility::Feasible);
//! let (x, y) = (s.value(Var(0)), s.value(Var(1)));
//! assert_eq!(x.wrapping_mul(3).wrapping_add(y.wrapping_mul(5)), 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod deps;
pub mod interval;
pub mod matrix;
pub mod numeral;
pub mod solver;
pub mod sparse_set;

mod eqs;
mod ineqs;
mod propagate;

pub use deps::{DepManager, DepRef, DepToken};
pub use interval::ModInterval;
pub use matrix::{RowId, SparseMatrix, Var, NULL_VAR};
pub use numeral::{Numeral, NumeralError};
pub use solver::{Config, Feasibility, Fixplex, PivotStrategy, Statistics, VarEq};
