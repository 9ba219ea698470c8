//! Row-driven bound propagation
//!
//! For a row `sum coeff_i * var_i == 0` the interval sum of the entries'
//! bounds over-approximates the reachable row values. Two tightening modes:
//!
//! - exactly one entry is free: that variable must land in the negated
//!   interval sum of the rest, scaled by its coefficient;
//! - no entry is free: each variable with coefficient plus or minus one is
//!   intersected with the residual interval of the others.
//!
//! Tightening to empty is a conflict whose core joins the bound
//! dependencies of every variable in the row. A variable that becomes fixed
//! here feeds the fixed-value equality table.

use crate::deps::DepRef;
use crate::interval::ModInterval;
use crate::matrix::{RowId, Var, NULL_VAR};
use crate::numeral::Numeral;
use crate::solver::{Feasibility, Fixplex};

impl<N: Numeral> Fixplex<N> {
    /// Propagate bounds through every row, then through every inequality.
    ///
    /// `Feasible` here means "no conflict found", not that a satisfying
    /// assignment exists; run [`Fixplex::make_feasible`] for that.
    pub fn propagate_bounds(&mut self) -> Feasibility {
        for i in 0..self.rows.len() {
            if self.rows[i].base == NULL_VAR {
                continue;
            }
            match self.propagate_bounds_row(RowId(i as u32)) {
                Feasibility::Feasible => {}
                other => return other,
            }
        }
        for idx in 0..self.ineqs.len() {
            if !self.propagate_ineq(idx as u32) {
                return Feasibility::Infeasible;
            }
        }
        Feasibility::Feasible
    }

    pub(crate) fn propagate_bounds_row(&mut self, r: RowId) -> Feasibility {
        let entries: Vec<(Var, N)> = self.matrix.row_entries(r).collect();
        let mut range = ModInterval::fixed(N::ZERO);
        let mut free_entry: Option<(Var, N)> = None;
        for &(v, c) in &entries {
            if self.is_free(v) {
                if free_entry.is_some() {
                    // Two free variables: nothing to learn.
                    return Feasibility::Feasible;
                }
                free_entry = Some((v, c));
                continue;
            }
            range = range + self.bounds(v) * c;
            if range.is_free() {
                return Feasibility::Feasible;
            }
        }
        if let Some((v, c)) = free_entry {
            let derived = (-range) * c;
            return if self.new_bound_row(r, v, derived) {
                Feasibility::Feasible
            } else {
                Feasibility::Infeasible
            };
        }
        for &(v, c) in &entries {
            let residual = range - self.bounds(v) * c;
            // Pinned propagation is sound only for unit coefficients.
            let derived = if c == N::ONE {
                -residual
            } else if c == N::MAX {
                residual
            } else {
                continue;
            };
            if !self.new_bound_row(r, v, derived) {
                return Feasibility::Infeasible;
            }
        }
        Feasibility::Feasible
    }

    /// Intersect the bounds of `x` with `range`, justified by the bound
    /// dependencies of the whole row. Returns false on conflict.
    fn new_bound_row(&mut self, r: RowId, x: Var, range: ModInterval<N>) -> bool {
        if range.is_free() {
            return true;
        }
        let dep = self.row2dep(r);
        if range.is_empty() {
            let (lo_dep, hi_dep) = (self.vars[x.index()].lo_dep, self.vars[x.index()].hi_dep);
            self.conflict_refs(&[lo_dep, hi_dep, dep]);
            return false;
        }
        let was_fixed = self.is_fixed(x);
        self.update_bounds(x, range.lo, range.hi, dep);
        if self.vars[x.index()].bounds.is_empty() {
            let (lo_dep, hi_dep) = (self.vars[x.index()].lo_dep, self.vars[x.index()].hi_dep);
            self.conflict_refs(&[lo_dep, hi_dep]);
            return false;
        }
        if !was_fixed && self.is_fixed(x) {
            self.fixed_var_eh(r, x);
        }
        if !self.in_bounds(x) {
            if self.is_base(x) {
                self.add_patch(x);
            } else {
                let delta = self.value2delta(x, self.value(x));
                self.update_value(x, delta);
            }
        }
        true
    }

    /// Join of the bound dependencies of every variable in `r`.
    pub(crate) fn row2dep(&mut self, r: RowId) -> Option<DepRef> {
        let vars: Vec<Var> = self.matrix.row_entries(r).map(|(v, _)| v).collect();
        let mut d: Option<DepRef> = None;
        for v in vars {
            let (lo_dep, hi_dep) = (self.vars[v.index()].lo_dep, self.vars[v.index()].hi_dep);
            d = self.deps.mk_join(lo_dep, d);
            d = self.deps.mk_join(hi_dep, d);
        }
        d
    }
}
