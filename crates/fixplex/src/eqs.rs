//! Equality detection
//!
//! Two advisory mechanisms surface variable equalities to the host; neither
//! is propagated internally.
//!
//! - **Offset rows.** A row in offset form, `cx*x + cy*y + k == 0` with `k`
//!   built from fixed variables, is matched against other offset rows
//!   sharing `x`. Agreement of the coefficients (directly or up to sign)
//!   together with equal current values of the second variables implies the
//!   second variables are equal. Only attempted for integral rows and odd
//!   `cy`.
//! - **Fixed values.** A table from value to the first variable fixed at it;
//!   a second variable fixed at the same value yields an equality with both
//!   witnessing rows.

use crate::matrix::{RowId, Var, NULL_VAR};
use crate::numeral::Numeral;
use crate::solver::{FixEntry, Fixplex, VarEq};

impl<N: Numeral> Fixplex<N> {
    /// Sweep all rows for offset-row equalities; results are queued in
    /// [`Fixplex::var_eqs`].
    pub fn propagate_eqs(&mut self) {
        for i in 0..self.rows.len() {
            if self.rows[i].base == NULL_VAR {
                continue;
            }
            self.get_offset_eqs(RowId(i as u32));
        }
    }

    fn get_offset_eqs(&mut self, r: RowId) {
        let Some((cx, x, cy, y)) = self.is_offset_row(r) else {
            return;
        };
        self.lookahead_eq(r, cx, x, cy, y);
        self.lookahead_eq(r, cy, y, cx, x);
    }

    /// Offset form: integral, exactly two non-fixed variables, any number of
    /// fixed ones. Returns the two non-fixed entries.
    fn is_offset_row(&self, r: RowId) -> Option<(N, Var, N, Var)> {
        if !self.rows[r.index()].integral {
            return None;
        }
        let mut first: Option<(Var, N)> = None;
        let mut second: Option<(Var, N)> = None;
        for (v, c) in self.matrix.row_entries(r) {
            if self.is_fixed(v) {
                continue;
            }
            if first.is_none() {
                first = Some((v, c));
            } else if second.is_none() {
                second = Some((v, c));
            } else {
                return None;
            }
        }
        let (x, cx) = first?;
        let (y, cy) = second?;
        Some((cx, x, cy, y))
    }

    fn lookahead_eq(&mut self, r1: RowId, cx: N, x: Var, cy: N, y: Var) {
        if cy.is_even() {
            return;
        }
        let col: Vec<RowId> = self.matrix.col_entries(x).map(|(r, _)| r).collect();
        for r2 in col {
            if r1 >= r2 {
                continue;
            }
            let Some((mut cz, mut z, mut cu, mut u)) = self.is_offset_row(r2) else {
                continue;
            };
            if u == x {
                std::mem::swap(&mut z, &mut u);
                std::mem::swap(&mut cz, &mut cu);
            }
            if z == x && u != y && cx == cz && cu == cy && self.value(u) == self.value(y) {
                self.eq_eh(u, y, r1, r2);
            }
            if z == x
                && u != y
                && cx.wrapping_add(cz).is_zero()
                && cu.wrapping_add(cy).is_zero()
                && self.value(u) == self.value(y)
            {
                self.eq_eh(u, y, r1, r2);
            }
        }
    }

    /// Called when `x` becomes fixed: look up its value in the fixed-value
    /// table and emit an equality on collision with another live fixed
    /// variable.
    pub(crate) fn fixed_var_eh(&mut self, r: RowId, x: Var) {
        let val = self.value(x);
        let entry = self.value2fixed.get(&val).copied();
        match entry {
            Some(e)
                if e.x.index() < self.vars.len()
                    && e.x != x
                    && self.is_fixed(e.x)
                    && self.value(e.x) == val =>
            {
                self.eq_eh(x, e.x, e.r, r);
            }
            _ => {
                self.value2fixed.insert(val, FixEntry { x, r });
            }
        }
    }

    fn eq_eh(&mut self, x: Var, y: Var, r1: RowId, r2: RowId) {
        self.var_eqs.push(VarEq { x, y, r1, r2 });
    }
}
