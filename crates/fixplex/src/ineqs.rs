//! Inequality propagation between variables
//!
//! Inequalities `v < w` and `v <= w` are propagated pair-wise through a case
//! table over the wrap states of the two variables' intervals. Every rule is
//! an implication: given preconditions on `lo`/`hi`/fixedness/freeness it
//! either tightens one of the four bounds or declares a conflict, joining
//! the dependencies of the triggering bounds with the inequality's own
//! token.
//!
//! The tables come in two parts per polarity: a hand-written head covering
//! the common cases and a machine-generated tail sweeping residual corner
//! cases. The union is what matters; rules are order-insensitive and
//! individually sound, and several overlap.
//!
//! Interval propagation alone cannot refute an inequality cycle such as
//! `x <= y <= z < x` at full width (the bounds chase each other around the
//! ring). A strongly-connected-component pass over the inequality graph
//! closes that gap: any SCC containing a strict edge is conflicting, with
//! the tokens of the SCC's inequalities as the core.

use rustc_hash::FxHashSet;

use crate::deps::DepRef;
use crate::matrix::Var;
use crate::numeral::Numeral;
use crate::solver::Fixplex;

/// An inequality `v < w` (strict) or `v <= w` between two variables.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ineq {
    pub(crate) v: Var,
    pub(crate) w: Var,
    pub(crate) dep: u32,
    pub(crate) strict: bool,
    pub(crate) active: bool,
}

#[inline]
fn inc<N: Numeral>(x: N) -> N {
    x.wrapping_add(N::ONE)
}

#[inline]
fn dec<N: Numeral>(x: N) -> N {
    x.wrapping_sub(N::ONE)
}

impl<N: Numeral> Fixplex<N> {
    /// Re-activate the inequalities watching `v` after its value or bounds
    /// moved; they will be rechecked by the next feasibility round.
    pub(crate) fn touch_var(&mut self, v: Var) {
        if v.index() >= self.var2ineqs.len() || self.var_touched[v.index()] {
            return;
        }
        self.var_touched[v.index()] = true;
        for k in 0..self.var2ineqs[v.index()].len() {
            let idx = self.var2ineqs[v.index()][k] as usize;
            if !self.ineqs[idx].active {
                self.ineqs[idx].active = true;
                self.ineqs_to_check.push(idx as u32);
            }
        }
    }

    fn reset_ineqs_to_check(&mut self) {
        for k in 0..self.ineqs_to_check.len() {
            let idx = self.ineqs_to_check[k] as usize;
            if idx >= self.ineqs.len() {
                continue;
            }
            let (v, w) = (self.ineqs[idx].v, self.ineqs[idx].w);
            if v.index() < self.var_touched.len() {
                self.var_touched[v.index()] = false;
            }
            if w.index() < self.var_touched.len() {
                self.var_touched[w.index()] = false;
            }
            self.ineqs[idx].active = false;
        }
        self.ineqs_to_check.clear();
    }

    /// Check the queued inequalities against current values; on success the
    /// queue is drained.
    pub(crate) fn ineqs_are_satisfied(&mut self) -> bool {
        for &idx in &self.ineqs_to_check {
            let idx = idx as usize;
            if idx >= self.ineqs.len() {
                continue;
            }
            let ineq = &self.ineqs[idx];
            if ineq.strict && self.value(ineq.v) >= self.value(ineq.w) {
                return false;
            }
            if !ineq.strict && self.value(ineq.v) > self.value(ineq.w) {
                return false;
            }
        }
        self.reset_ineqs_to_check();
        true
    }

    /// Propagate the queued inequalities; true iff a conflict was found.
    /// The queue may grow while it is processed.
    pub(crate) fn ineqs_are_violated(&mut self) -> bool {
        let mut i = 0;
        while i < self.ineqs_to_check.len() {
            let idx = self.ineqs_to_check[i];
            i += 1;
            if (idx as usize) >= self.ineqs.len() {
                continue;
            }
            if !self.propagate_ineq(idx) {
                return true;
            }
        }
        false
    }

    /// Propagate one inequality; false on conflict.
    pub(crate) fn propagate_ineq(&mut self, idx: u32) -> bool {
        let ineq = self.ineqs[idx as usize];
        if ineq.strict {
            self.propagate_strict_bounds(ineq)
        } else {
            self.propagate_non_strict_bounds(ineq)
        }
    }

    /// Tighten `x` to `[l, h)`, justified by the inequality's token joined
    /// with the listed bound dependencies. False on conflict.
    fn new_bound_ineq(&mut self, i: Ineq, x: Var, l: N, h: N, ds: &[Option<DepRef>]) -> bool {
        let leaf = self.deps.mk_leaf(i.dep);
        let mut joined: Option<DepRef> = None;
        for d in ds.iter().rev() {
            joined = self.deps.mk_join(*d, joined);
        }
        let dep = self.deps.mk_join(Some(leaf), joined);
        self.update_bounds(x, l, h, dep);
        if self.vars[x.index()].bounds.is_empty() {
            let (lo_dep, hi_dep) = (self.vars[x.index()].lo_dep, self.vars[x.index()].hi_dep);
            self.conflict_refs(&[lo_dep, hi_dep]);
            return false;
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

    /// Record a conflict from the inequality's token plus the listed bound
    /// dependencies.
    fn conflict_ineq(&mut self, i: Ineq, ds: &[Option<DepRef>]) {
        let leaf = self.deps.mk_leaf(i.dep);
        let mut refs: Vec<DepRef> = vec![leaf];
        refs.extend(ds.iter().copied().flatten());
        self.unsat_core.clear();
        self.deps.linearize(refs, &mut self.unsat_core);
    }

    /// Case table for `v < w`. Bounds are re-read before every rule because
    /// earlier rules may have tightened them; the dependency snapshots are
    /// taken once at entry.
    #[allow(clippy::if_same_then_else)]
    fn propagate_strict_bounds(&mut self, i: Ineq) -> bool {
        let (v, w) = (i.v, i.w);
        let vlo = self.vars[v.index()].lo_dep;
        let vhi = self.vars[v.index()].hi_dep;
        let wlo = self.vars[w.index()].lo_dep;
        let whi = self.vars[w.index()].hi_dep;

        if self.lo(w).is_zero()
            && !self.new_bound_ineq(i, w, inc(self.lo(w)), self.lo(w), &[wlo])
        {
            return false;
        }
        if self.hi(w) == N::ONE
            && !self.new_bound_ineq(i, w, self.lo(w), dec(self.hi(w)), &[whi])
        {
            return false;
        }
        if self.hi(w) <= self.hi(v)
            && self.lo(w) <= self.hi(w)
            && !self.is_free(w)
            && !self.new_bound_ineq(i, v, self.lo(v), dec(self.hi(v)), &[vhi, whi, wlo])
        {
            return false;
        }
        if self.hi(v).is_zero()
            && self.lo(w) <= self.lo(v)
            && !self.new_bound_ineq(i, w, inc(self.lo(v)), self.hi(v), &[vhi, vlo, wlo])
        {
            return false;
        }
        if self.hi(v).is_zero()
            && !self.is_free(v)
            && !self.new_bound_ineq(i, v, self.lo(v), dec(self.hi(v)), &[vhi])
        {
            return false;
        }
        if self.lo(w) <= self.lo(v)
            && self.lo(v) <= self.hi(v)
            && !self.new_bound_ineq(i, w, inc(self.lo(v)), self.lo(v), &[vlo, vhi, wlo])
        {
            return false;
        }
        if inc(self.lo(v)) == self.hi(w)
            && self.lo(v) <= self.hi(v)
            && !self.new_bound_ineq(i, w, self.lo(w), dec(self.hi(w)), &[vlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(v))
            && self.is_fixed(w)
            && self.lo(w) <= self.hi(v)
            && !self.new_bound_ineq(i, v, inc(self.lo(v)), dec(self.hi(w)), &[vlo, vhi, whi, wlo])
        {
            return false;
        }
        if inc(self.lo(v)) == self.hi(w)
            && self.lo(w) <= self.hi(w)
            && !self.new_bound_ineq(i, v, inc(self.lo(v)), self.hi(v), &[vlo, whi, wlo])
        {
            return false;
        }
        if self.is_fixed(v)
            && self.lo(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && self.hi(v) != N::ONE
            && !self.new_bound_ineq(i, w, inc(self.lo(v)), dec(self.hi(w)), &[vlo, vhi, whi])
        {
            return false;
        }
        if !self.hi(w).is_zero()
            && self.hi(w) <= self.lo(v)
            && self.lo(v) <= self.hi(v)
            && !self.new_bound_ineq(i, w, inc(self.lo(v)), dec(self.hi(w)), &[vlo, vhi, whi])
        {
            return false;
        }
        if self.hi(w) <= self.lo(v)
            && self.lo(w) <= self.hi(w)
            && !self.is_free(w)
            && !self.new_bound_ineq(i, v, inc(self.lo(v)), dec(self.hi(w)), &[vlo, whi, wlo])
        {
            return false;
        }
        if inc(self.lo(v)) == self.hi(w)
            && self.hi(w).is_zero()
            && !self.new_bound_ineq(i, v, inc(self.lo(v)), self.hi(v), &[vlo, whi])
        {
            return false;
        }
        if inc(self.lo(v)).is_zero()
            && !self.new_bound_ineq(i, v, inc(self.lo(v)), self.hi(v), &[vlo])
        {
            return false;
        }
        if self.lo(w) < self.hi(w)
            && self.hi(w) <= self.lo(v)
            && !self.new_bound_ineq(i, v, N::ZERO, self.hi(v), &[vlo, vhi, whi, wlo])
        {
            return false;
        }

        // manual patch
        if self.is_fixed(w) && self.lo(w).is_zero() {
            self.conflict_ineq(i, &[wlo, whi]);
            return false;
        }
        if self.is_fixed(v) && self.hi(v).is_zero() {
            self.conflict_ineq(i, &[vlo, vhi]);
            return false;
        }
        if !self.is_free(w)
            && (self.lo(w) <= self.hi(w) || self.hi(w).is_zero())
            && (self.lo(v) < self.hi(v) || self.hi(v).is_zero())
            && !self.new_bound_ineq(i, v, self.lo(v), dec(self.hi(w)), &[vlo, wlo, whi])
        {
            return false;
        }
        if !self.is_free(v)
            && (self.lo(w) <= self.hi(w) || self.hi(w).is_zero())
            && (self.lo(v) < self.hi(v) || self.hi(v).is_zero())
            && !self.new_bound_ineq(i, w, inc(self.lo(v)), self.hi(w), &[vlo, vhi, whi])
        {
            return false;
        }
        if self.lo(w).is_zero() && !self.new_bound_ineq(i, w, N::ONE, self.hi(w), &[wlo]) {
            return false;
        }
        if inc(self.lo(v)).is_zero()
            && !self.new_bound_ineq(i, v, N::ZERO, self.hi(v), &[vhi])
        {
            return false;
        }
        if self.lo(w) < self.hi(w)
            && (self.hi(w) <= self.hi(v) || self.hi(v).is_zero())
            && !self.new_bound_ineq(i, v, self.lo(v), dec(self.hi(w)), &[vlo, vhi, wlo, whi])
        {
            return false;
        }
        if !self.is_fixed(w)
            && inc(self.lo(v)) == self.hi(w)
            && (self.lo(v) <= self.hi(v) || self.hi(v).is_zero())
            && !self.new_bound_ineq(i, w, self.lo(w), dec(self.hi(w)), &[vlo, wlo, whi])
        {
            return false;
        }
        if self.lo(w) <= self.lo(v)
            && (self.lo(v) < self.hi(v) || self.lo(v).is_zero())
            && !self.new_bound_ineq(i, w, inc(self.lo(v)), self.hi(w), &[vlo, vhi, wlo, whi])
        {
            return false;
        }
        if self.hi(w) <= self.lo(v)
            && (self.lo(v) < self.hi(v) || self.hi(v).is_zero())
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vlo, vhi, wlo, whi])
        {
            return false;
        }
        if self.lo(w) < self.hi(w)
            && self.hi(w) <= self.lo(v)
            && (self.lo(v) < self.hi(v) || self.hi(v).is_zero())
        {
            self.conflict_ineq(i, &[vlo, vhi, wlo, whi]);
            return false;
        }

        // generated tail
        if self.lo(w).is_zero()
            && !self.new_bound_ineq(i, w, inc(self.lo(w)), self.lo(w), &[wlo])
        {
            return false;
        }
        if self.is_fixed(v)
            && self.hi(w) <= self.hi(v)
            && self.lo(w) <= self.hi(w)
            && !self.is_free(w)
        {
            self.conflict_ineq(i, &[wlo, whi, vhi, vlo]);
            return false;
        }
        if self.lo(w) <= self.lo(v)
            && self.lo(v) <= self.hi(v)
            && !self.new_bound_ineq(i, w, inc(self.lo(v)), self.lo(v), &[wlo, vhi, vlo])
        {
            return false;
        }
        if self.hi(w) <= self.hi(v)
            && self.lo(w) <= self.hi(w)
            && !self.is_free(w)
            && !self.new_bound_ineq(i, v, self.lo(v), dec(self.hi(v)), &[wlo, whi, vhi])
        {
            return false;
        }
        if self.hi(w) == N::ONE
            && !self.new_bound_ineq(i, w, self.lo(w), dec(self.hi(w)), &[whi])
        {
            return false;
        }
        if !self.lo(v).is_zero()
            && self.lo(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && self.lo(v) <= self.hi(v)
            && !self.new_bound_ineq(i, w, inc(self.lo(v)), dec(self.hi(w)), &[whi, vhi, vlo])
        {
            return false;
        }
        if !self.hi(w).is_zero()
            && self.is_fixed(v)
            && self.hi(w) <= self.hi(v)
            && !self.new_bound_ineq(i, w, inc(self.lo(v)), dec(self.hi(v)), &[whi, vhi, vlo])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(w))
            && !self.hi(w).is_zero()
            && self.lo(v) <= self.hi(v)
            && !self.new_bound_ineq(i, w, inc(self.lo(v)), dec(self.hi(w)), &[whi, vhi, vlo])
        {
            return false;
        }
        if !(self.lo(v) <= self.lo(w))
            && self.is_fixed(w)
            && !self.new_bound_ineq(i, v, inc(self.lo(v)), dec(self.hi(w)), &[wlo, whi, vlo])
        {
            return false;
        }
        if self.hi(w) <= self.lo(v)
            && self.lo(w) <= self.hi(w)
            && !self.is_free(w)
            && !self.new_bound_ineq(i, v, inc(self.lo(v)), dec(self.hi(w)), &[wlo, whi, vlo])
        {
            return false;
        }
        if self.is_fixed(w) && self.hi(v).is_zero() && self.lo(w) <= self.lo(v) {
            self.conflict_ineq(i, &[wlo, whi, vhi, vlo]);
            return false;
        }
        if self.hi(v).is_zero()
            && self.lo(w) <= self.lo(v)
            && !self.new_bound_ineq(i, w, inc(self.lo(v)), self.hi(v), &[wlo, vhi, vlo])
        {
            return false;
        }
        if self.hi(v).is_zero()
            && !self.is_free(v)
            && !self.new_bound_ineq(i, v, self.lo(v), dec(self.hi(v)), &[vhi])
        {
            return false;
        }
        if self.is_fixed(w)
            && self.lo(w) <= self.lo(v)
            && !self.new_bound_ineq(i, v, inc(self.lo(v)), dec(self.hi(w)), &[wlo, whi, vlo])
        {
            return false;
        }
        true
    }

    /// Case table for `v <= w`; same shape as the strict table.
    #[allow(clippy::if_same_then_else)]
    fn propagate_non_strict_bounds(&mut self, i: Ineq) -> bool {
        let (v, w) = (i.v, i.w);
        let vlo = self.vars[v.index()].lo_dep;
        let vhi = self.vars[v.index()].hi_dep;
        let wlo = self.vars[w.index()].lo_dep;
        let whi = self.vars[w.index()].hi_dep;

        // manual patch
        if self.lo(w) < self.lo(v)
            && (self.lo(v) < self.hi(v) || self.hi(v).is_zero())
            && !self.new_bound_ineq(i, w, self.lo(v), self.hi(w), &[vlo, vhi, wlo, whi])
        {
            return false;
        }
        if !self.is_free(w)
            && (self.lo(w) <= self.hi(w) || self.hi(w).is_zero())
            && (self.lo(v) < self.hi(v) || self.hi(v).is_zero())
            && !self.new_bound_ineq(i, v, self.lo(v), self.hi(w), &[vlo, vhi, wlo, whi])
        {
            return false;
        }
        if !self.is_free(v)
            && (self.lo(w) <= self.hi(w) || self.hi(w).is_zero())
            && (self.lo(v) < self.hi(v) || self.hi(v).is_zero())
            && !self.new_bound_ineq(i, w, self.lo(v), self.hi(w), &[vlo, vhi, whi])
        {
            return false;
        }
        if self.hi(w) < self.lo(w)
            && self.hi(w) <= self.lo(v)
            && self.lo(v) < self.hi(v)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vlo, vhi, wlo, whi])
        {
            return false;
        }
        if self.lo(w) < self.hi(w)
            && self.hi(w) <= self.lo(v)
            && (self.lo(v) < self.hi(v) || self.hi(v).is_zero())
        {
            self.conflict_ineq(i, &[vlo, vhi, wlo, whi]);
            return false;
        }

        // generated tail
        if !(self.hi(w) <= self.lo(v))
            && !self.is_fixed(v)
            && self.is_fixed(w)
            && self.hi(w) == N::ONE
            && !self.hi(v).is_zero()
            && !self.new_bound_ineq(i, v, N::ZERO, self.hi(w), &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.hi(v) <= self.lo(w))
            && !self.is_fixed(v)
            && self.is_fixed(w)
            && self.lo(w) <= self.lo(v)
            && self.lo(v) <= self.lo(w)
            && !self.new_bound_ineq(i, v, N::ZERO, self.hi(w), &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.hi(v) <= self.hi(w))
            && !(self.hi(w) <= self.lo(v))
            && self.lo(w) <= self.lo(v)
            && !self.new_bound_ineq(i, v, N::ZERO, self.hi(w), &[wlo, vhi, vlo, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.lo(v))
            && !(self.hi(v) <= self.hi(w))
            && self.is_fixed(w)
            && self.lo(w) <= self.hi(w)
            && !self.new_bound_ineq(i, v, N::ZERO, self.hi(w), &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.lo(w))
            && self.hi(w) == N::ONE
            && self.lo(v) <= self.hi(w)
            && !self.new_bound_ineq(i, v, N::ZERO, self.hi(w), &[wlo, vlo, whi])
        {
            return false;
        }
        if self.is_fixed(w)
            && self.hi(w) <= self.lo(v)
            && self.lo(w) <= self.hi(w)
            && !self.new_bound_ineq(i, v, N::ZERO, self.hi(w), &[wlo, vlo, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.lo(w))
            && self.lo(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && !self.new_bound_ineq(i, v, N::ZERO, self.hi(w), &[wlo, vlo, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(w))
            && self.is_fixed(v)
            && self.lo(w) <= self.hi(w)
            && !self.new_bound_ineq(i, w, self.lo(v), N::ZERO, &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if !self.is_fixed(w)
            && !(self.hi(v) <= self.lo(w))
            && self.is_fixed(v)
            && self.hi(v) <= self.hi(w)
            && self.hi(w) <= self.hi(v)
            && !self.new_bound_ineq(i, w, dec(self.hi(w)), self.hi(w), &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.lo(w))
            && !(self.hi(w) <= self.lo(v))
            && self.hi(w) <= self.hi(v)
            && !self.new_bound_ineq(i, w, self.lo(v), self.hi(w), &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.lo(w))
            && self.is_fixed(v)
            && !self.new_bound_ineq(i, w, self.lo(v), N::ZERO, &[vhi, wlo, vlo])
        {
            return false;
        }
        if self.is_fixed(v)
            && self.hi(w) == N::ONE
            && self.hi(w) <= self.lo(v)
            && self.hi(v) <= self.lo(w)
            && !self.hi(v).is_zero()
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if self.hi(v) != N::ONE
            && self.hi(w) == N::ONE
            && self.lo(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && self.hi(v) <= self.lo(w)
            && self.lo(v) <= self.hi(v)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if !self.hi(w).is_zero()
            && self.is_fixed(v)
            && self.hi(w) <= self.lo(v)
            && self.hi(v) <= self.lo(w)
            && self.lo(v) <= self.hi(v)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if !(self.hi(v) <= self.hi(w))
            && !self.hi(w).is_zero()
            && self.lo(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && self.hi(v) <= self.lo(w)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(w))
            && !(self.lo(w) <= self.lo(v))
            && self.hi(w) == N::ONE
            && self.lo(w) <= self.hi(v)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vhi, wlo, vlo, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(w))
            && !(self.lo(w) <= self.lo(v))
            && !self.hi(w).is_zero()
            && self.lo(w) <= self.hi(v)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vhi, wlo, vlo, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.hi(w))
            && self.is_fixed(v)
            && self.hi(w) == N::ONE
            && self.lo(w) <= self.lo(v)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.hi(w))
            && !(self.hi(v) <= self.lo(w))
            && self.hi(w) == N::ONE
            && self.lo(w) <= self.lo(v)
            && self.lo(v) <= self.lo(w)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.hi(w))
            && !self.hi(w).is_zero()
            && self.is_fixed(v)
            && self.lo(w) <= self.lo(v)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.hi(w))
            && !(self.hi(v) <= self.lo(w))
            && !self.hi(w).is_zero()
            && self.lo(w) <= self.lo(v)
            && self.lo(v) <= self.lo(w)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.hi(w))
            && self.hi(v) != N::ONE
            && self.hi(w) == N::ONE
            && self.lo(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.hi(w))
            && !(self.hi(v) <= self.hi(w))
            && !self.hi(w).is_zero()
            && self.lo(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(w))
            && self.hi(v).is_zero()
            && self.lo(w) <= self.hi(v)
            && !self.new_bound_ineq(i, w, self.lo(v), N::ZERO, &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if self.hi(w) != N::ONE
            && self.hi(v) == N::ONE
            && self.hi(w) <= self.lo(v)
            && self.lo(w) <= self.hi(v)
            && self.hi(v) <= self.lo(w)
            && self.lo(w) <= self.hi(w)
            && !self.new_bound_ineq(i, v, N::ZERO, self.lo(w), &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if !(self.hi(w) <= self.hi(v))
            && self.hi(w) <= self.lo(v)
            && self.lo(w) <= self.hi(v)
            && !self.new_bound_ineq(i, v, N::ZERO, dec(self.hi(w)), &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.lo(w))
            && self.hi(v).is_zero()
            && !self.new_bound_ineq(i, w, self.lo(v), N::ZERO, &[vhi, wlo, vlo])
        {
            return false;
        }
        if !(self.lo(v) <= self.lo(w))
            && !self.hi(w).is_zero()
            && self.hi(v).is_zero()
            && self.lo(w) <= self.hi(v)
            && !self.new_bound_ineq(i, v, self.lo(v), self.hi(w), &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(v))
            && self.is_fixed(w)
            && self.hi(v).is_zero()
            && self.lo(w) <= self.hi(w)
            && !self.new_bound_ineq(i, v, self.lo(v), self.hi(w), &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(v))
            && !(self.hi(w) <= self.lo(v))
            && self.hi(v).is_zero()
            && self.lo(w) <= self.lo(v)
            && !self.new_bound_ineq(i, v, self.lo(w), self.hi(w), &[wlo, vhi, vlo, whi])
        {
            return false;
        }
        if !(self.hi(v) <= self.lo(w))
            && self.hi(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && !self.new_bound_ineq(i, v, N::ZERO, self.hi(w), &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.hi(w))
            && self.hi(w) == N::ONE
            && self.hi(v).is_zero()
            && self.lo(w) <= self.lo(v)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(w))
            && !self.hi(w).is_zero()
            && self.hi(v).is_zero()
            && self.lo(v) <= self.lo(w)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[wlo, vhi, vlo, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.lo(v))
            && !self.hi(w).is_zero()
            && self.hi(v).is_zero()
            && self.hi(w) <= self.lo(v)
            && !self.new_bound_ineq(i, w, self.lo(w), N::ZERO, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        true
    }

    /// Refute cycles in the inequality graph that contain a strict edge.
    ///
    /// Every inequality is an edge `v -> w`. Inside a strongly connected
    /// component all endpoints are forced equal by the non-strict closure,
    /// so a strict edge within one is unsatisfiable regardless of bounds.
    /// The core is the union of the component's inequality tokens.
    pub(crate) fn strict_cycle_conflict(&mut self) -> bool {
        if self.ineqs.iter().all(|i| !i.strict) {
            return false;
        }
        let n = self.vars.len();
        let mut succs: Vec<Vec<u32>> = vec![Vec::new(); n];
        for ineq in &self.ineqs {
            succs[ineq.v.index()].push(ineq.w.0);
        }
        let scc = scc_ids(n, &succs);
        for k in 0..self.ineqs.len() {
            let ineq = self.ineqs[k];
            if !ineq.strict || scc[ineq.v.index()] != scc[ineq.w.index()] {
                continue;
            }
            // Conflict: collect every inequality inside the component.
            let comp = scc[ineq.v.index()];
            self.unsat_core.clear();
            let mut seen = FxHashSet::default();
            for other in &self.ineqs {
                if scc[other.v.index()] == comp
                    && scc[other.w.index()] == comp
                    && seen.insert(other.dep)
                {
                    self.unsat_core.push(other.dep);
                }
            }
            return true;
        }
        false
    }
}

/// Iterative Tarjan SCC over an adjacency list; returns a component id per
/// node.
fn scc_ids(n: usize, succs: &[Vec<u32>]) -> Vec<u32> {
    const UNDEF: u32 = u32::MAX;
    let mut index = vec![UNDEF; n];
    let mut low = vec![0u32; n];
    let mut on_stack = vec![false; n];
    let mut scc = vec![UNDEF; n];
    let mut stack: Vec<u32> = Vec::new();
    let mut next_index = 0u32;
    let mut next_scc = 0u32;
    // Explicit DFS frames: (node, position in its successor list).
    let mut frames: Vec<(u32, usize)> = Vec::new();
    for root in 0..n as u32 {
        if index[root as usize] != UNDEF {
            continue;
        }
        frames.push((root, 0));
        index[root as usize] = next_index;
        low[root as usize] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root as usize] = true;
        while let Some(&mut (node, ref mut pos)) = frames.last_mut() {
            if *pos < succs[node as usize].len() {
                let next = succs[node as usize][*pos];
                *pos += 1;
                if index[next as usize] == UNDEF {
                    index[next as usize] = next_index;
                    low[next as usize] = next_index;
                    next_index += 1;
                    stack.push(next);
                    on_stack[next as usize] = true;
                    frames.push((next, 0));
                } else if on_stack[next as usize] {
                    low[node as usize] = low[node as usize].min(index[next as usize]);
                }
            } else {
                frames.pop();
                if let Some(&mut (parent, _)) = frames.last_mut() {
                    low[parent as usize] = low[parent as usize].min(low[node as usize]);
                }
                if low[node as usize] == index[node as usize] {
                    loop {
                        let top = stack.pop().expect("tarjan stack underflow");
                        on_stack[top as usize] = false;
                        scc[top as usize] = next_scc;
                        if top == node {
                            break;
                        }
                    }
                    next_scc += 1;
                }
            }
        }
    }
    scc
}
