//! Fixed-width modular simplex core
//!
//! The tableau maintains rows `sum coeff_i * var_i == 0` over `Z/2^W`, one
//! designated base variable per row, and per-variable modular bounds, each
//! justified by an opaque host token. `make_feasible` patches base variables
//! into their bounds by pivoting; pivot selection enforces the Olm–Seidl
//! condition (the pivot coefficient has minimal 2-adic valuation in its
//! column) so that eliminating the pivot column from other rows is an
//! equivalence rather than a mere implication.
//!
//! Pivoting with non-invertible (even) coefficients can lose information;
//! whenever that happens the solver latches an approximation flag and will
//! answer `Unknown` instead of `Feasible`. Infeasibility verdicts remain
//! sound because every lossy transformation is still an implication.
//!
//! Backtracking is a LIFO trail of bound stashes, row additions and
//! inequality additions, delimited by level markers; `pop(n)` undoes `n`
//! levels. Dependency nodes are scope-allocated alongside the levels.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::deps::{DepManager, DepRef, DepToken};
use crate::interval::ModInterval;
use crate::ineqs::Ineq;
use crate::matrix::{RowId, SparseMatrix, Var, NULL_VAR};
use crate::numeral::Numeral;
use crate::sparse_set::SparseSet;

/// Sentinel row id used while a variable is non-base.
pub(crate) const NULL_ROW: RowId = RowId(u32::MAX);

/// Tri-valued solver verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feasibility {
    /// A satisfying assignment within all bounds was found.
    Feasible,
    /// The constraints are jointly unsatisfiable; see
    /// [`Fixplex::unsat_core`].
    Infeasible,
    /// The solver cannot commit either way (approximation, cancellation or
    /// iteration limit).
    Unknown,
}

/// Strategy for picking the next out-of-bounds base variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotStrategy {
    /// Smallest variable index first (terminating, slow).
    Bland,
    /// Largest distance to the nearest bound first.
    GreatestError,
    /// Smallest distance to the nearest bound first.
    LeastError,
}

/// Tunables for the feasibility search.
#[derive(Debug, Clone)]
pub struct Config {
    /// Give up with `Unknown` after this many successful patch iterations.
    pub max_iterations: u64,
    /// Switch to Bland's rule after a variable re-enters the patch queue
    /// this many times.
    pub blands_rule_threshold: u32,
    /// Variable selection strategy while Bland's rule is off.
    pub pivot_strategy: PivotStrategy,
    /// Seed for the pivot tie-break RNG (runs are deterministic per seed).
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_iterations: u64::MAX,
            blands_rule_threshold: 100,
            pivot_strategy: PivotStrategy::GreatestError,
            seed: 0,
        }
    }
}

/// Per-variable state.
#[derive(Debug, Clone)]
pub(crate) struct VarInfo<N> {
    pub(crate) value: N,
    pub(crate) bounds: ModInterval<N>,
    pub(crate) lo_dep: Option<DepRef>,
    pub(crate) hi_dep: Option<DepRef>,
    pub(crate) is_base: bool,
    pub(crate) base2row: RowId,
}

impl<N: Numeral> Default for VarInfo<N> {
    fn default() -> Self {
        VarInfo {
            value: N::ZERO,
            bounds: ModInterval::free(),
            lo_dep: None,
            hi_dep: None,
            is_base: false,
            base2row: NULL_ROW,
        }
    }
}

/// Per-row state beside the sparse coefficients.
#[derive(Debug, Clone)]
pub(crate) struct RowInfo<N> {
    pub(crate) base: Var,
    pub(crate) base_coeff: N,
    /// Cached `sum coeff_i * value_i` over the non-base entries.
    pub(crate) value: N,
    /// True iff `value(base) * base_coeff + value == 0` exactly.
    pub(crate) integral: bool,
}

impl<N: Numeral> Default for RowInfo<N> {
    fn default() -> Self {
        RowInfo { base: NULL_VAR, base_coeff: N::ZERO, value: N::ZERO, integral: true }
    }
}

/// A tentative variable equality discovered by equality detection, with the
/// two witnessing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarEq {
    /// First variable.
    pub x: Var,
    /// Second variable.
    pub y: Var,
    /// Witness row for `x`.
    pub r1: RowId,
    /// Witness row for `y`.
    pub r2: RowId,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FixEntry {
    pub(crate) x: Var,
    pub(crate) r: RowId,
}

#[derive(Debug, Clone)]
struct StashedBound<N> {
    var: Var,
    bounds: ModInterval<N>,
    lo_dep: Option<DepRef>,
    hi_dep: Option<DepRef>,
}

#[derive(Debug, Clone, Copy)]
enum TrailEntry {
    IncLevel,
    SetBound,
    AddRow,
    AddIneq,
}

#[derive(Debug, Default, Clone)]
struct Counters {
    num_pivots: u64,
    num_infeasible: u64,
    num_checks: u64,
    num_approx: u64,
}

/// String-keyed statistics bag.
#[derive(Debug, Default, Clone)]
pub struct Statistics {
    entries: Vec<(&'static str, u64)>,
}

impl Statistics {
    /// Add `val` under `key`, merging with an existing entry.
    pub fn update(&mut self, key: &'static str, val: u64) {
        for e in self.entries.iter_mut() {
            if e.0 == key {
                e.1 += val;
                return;
            }
        }
        self.entries.push((key, val));
    }

    /// Value under `key`, zero if absent.
    pub fn get(&self, key: &str) -> u64 {
        self.entries.iter().find(|e| e.0 == key).map_or(0, |e| e.1)
    }

    /// Iterate all `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.entries.iter().copied()
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in self.iter() {
            writeln!(f, "{k}: {v}")?;
        }
        Ok(())
    }
}

/// The fixed-width modular simplex solver.
///
/// Generic over the numeral backend: `Fixplex<u32>` works modulo `2^32`,
/// `Fixplex<u8>` modulo `2^8`, and so on.
pub struct Fixplex<N: Numeral> {
    pub(crate) config: Config,
    pub(crate) matrix: SparseMatrix<N>,
    pub(crate) vars: Vec<VarInfo<N>>,
    pub(crate) rows: Vec<RowInfo<N>>,
    pub(crate) deps: DepManager,
    pub(crate) to_patch: SparseSet,

    // Inequalities `v < w` / `v <= w`.
    pub(crate) ineqs: Vec<Ineq>,
    pub(crate) var2ineqs: Vec<Vec<u32>>,
    pub(crate) ineqs_to_check: Vec<u32>,
    pub(crate) var_touched: Vec<bool>,

    // Equality detection.
    pub(crate) var_eqs: Vec<VarEq>,
    pub(crate) value2fixed: FxHashMap<N, FixEntry>,

    // Trail.
    trail: Vec<TrailEntry>,
    stashed_bounds: Vec<StashedBound<N>>,
    row_trail: Vec<Var>,

    // Feasibility search state.
    left_basis: FxHashSet<Var>,
    bland: bool,
    pub(crate) approx: bool,
    num_non_integral: i64,

    pub(crate) unsat_core: Vec<DepToken>,
    counters: Counters,
    cancel: Arc<AtomicBool>,
    rng: ChaCha8Rng,
}

impl<N: Numeral> Default for Fixplex<N> {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl<N: Numeral> Fixplex<N> {
    /// Create a solver with the given configuration.
    pub fn new(config: Config) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Fixplex {
            config,
            matrix: SparseMatrix::new(),
            vars: Vec::new(),
            rows: Vec::new(),
            deps: DepManager::new(),
            to_patch: SparseSet::new(),
            ineqs: Vec::new(),
            var2ineqs: Vec::new(),
            ineqs_to_check: Vec::new(),
            var_touched: Vec::new(),
            var_eqs: Vec::new(),
            value2fixed: FxHashMap::default(),
            trail: Vec::new(),
            stashed_bounds: Vec::new(),
            row_trail: Vec::new(),
            left_basis: FxHashSet::default(),
            bland: false,
            approx: false,
            num_non_integral: 0,
            unsat_core: Vec::new(),
            counters: Counters::default(),
            cancel: Arc::new(AtomicBool::new(false)),
            rng,
        }
    }

    /// Install a cancellation flag checked cooperatively by
    /// [`Fixplex::make_feasible`].
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = flag;
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Variable and bound management
    // ------------------------------------------------------------------

    /// Extend storage to cover variable `v`.
    pub fn ensure_var(&mut self, v: Var) {
        self.matrix.ensure_var(v);
        while self.vars.len() <= v.index() {
            self.vars.push(VarInfo::default());
            self.var2ineqs.push(Vec::new());
            self.var_touched.push(false);
        }
    }

    /// Number of known variables.
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Current value of `v`.
    pub fn value(&self, v: Var) -> N {
        self.vars[v.index()].value
    }

    /// Current bounds of `v`.
    pub fn bounds(&self, v: Var) -> ModInterval<N> {
        self.vars[v.index()].bounds
    }

    #[inline]
    pub(crate) fn lo(&self, v: Var) -> N {
        self.vars[v.index()].bounds.lo
    }

    #[inline]
    pub(crate) fn hi(&self, v: Var) -> N {
        self.vars[v.index()].bounds.hi
    }

    #[inline]
    pub(crate) fn is_base(&self, v: Var) -> bool {
        self.vars[v.index()].is_base
    }

    #[inline]
    pub(crate) fn is_free(&self, v: Var) -> bool {
        self.vars[v.index()].bounds.is_free()
    }

    #[inline]
    pub(crate) fn is_non_free(&self, v: Var) -> bool {
        !self.is_free(v)
    }

    #[inline]
    pub(crate) fn is_fixed(&self, v: Var) -> bool {
        self.vars[v.index()].bounds.is_fixed()
    }

    #[inline]
    pub(crate) fn in_bounds(&self, v: Var) -> bool {
        self.vars[v.index()].bounds.contains(self.vars[v.index()].value)
    }

    /// True iff every variable's value lies within its bounds.
    pub fn is_feasible(&self) -> bool {
        (0..self.vars.len()).all(|i| self.in_bounds(Var(i as u32)))
    }

    /// Intersect the bounds of `v` with `[lo, hi)`, justified by the host
    /// token `dep`. If the current value drops out of the new bounds the
    /// variable is queued for patching (base) or shifted back in (non-base).
    pub fn set_bounds(&mut self, v: Var, lo: N, hi: N, dep: DepToken) {
        self.ensure_var(v);
        let leaf = self.deps.mk_leaf(dep);
        self.update_bounds(v, lo, hi, Some(leaf));
        if self.in_bounds(v) {
            return;
        }
        if self.is_base(v) {
            self.add_patch(v);
        } else if !self.vars[v.index()].bounds.is_empty() {
            let delta = self.value2delta(v, self.value(v));
            self.update_value(v, delta);
        }
    }

    /// Pin `v` to the single value `val`.
    pub fn set_value(&mut self, v: Var, val: N, dep: DepToken) {
        self.set_bounds(v, val, val.wrapping_add(N::ONE), dep);
    }

    /// Trail-recorded bound intersection shared by `set_bounds` and the
    /// propagators.
    pub(crate) fn update_bounds(&mut self, v: Var, lo: N, hi: N, dep: Option<DepRef>) {
        let vi = &self.vars[v.index()];
        let old = vi.bounds;
        self.stashed_bounds.push(StashedBound {
            var: v,
            bounds: old,
            lo_dep: vi.lo_dep,
            hi_dep: vi.hi_dep,
        });
        self.trail.push(TrailEntry::SetBound);
        let new_bounds = old.intersect(&ModInterval::new(lo, hi));
        self.vars[v.index()].bounds = new_bounds;
        if new_bounds.is_empty() {
            // Keep both sides of the conflict reachable from the deps.
            let old_lo = self.vars[v.index()].lo_dep;
            let old_hi = self.vars[v.index()].hi_dep;
            self.vars[v.index()].lo_dep = self.deps.mk_join(old_lo, dep);
            self.vars[v.index()].hi_dep = self.deps.mk_join(old_hi, dep);
            return;
        }
        if old.lo != new_bounds.lo {
            self.vars[v.index()].lo_dep = dep;
        }
        if old.hi != new_bounds.hi {
            self.vars[v.index()].hi_dep = dep;
        }
    }

    /// Queue a base variable for patching if it is outside its bounds.
    pub(crate) fn add_patch(&mut self, v: Var) {
        debug_assert!(self.is_base(v));
        if !self.in_bounds(v) {
            self.to_patch.insert(v.0);
        }
    }

    /// Shift the non-base variable `v` by `delta` and propagate the change
    /// into the cached values of every row mentioning it.
    pub(crate) fn update_value(&mut self, v: Var, delta: N) {
        if delta.is_zero() {
            return;
        }
        debug_assert!(!self.is_base(v));
        self.vars[v.index()].value = self.vars[v.index()].value.wrapping_add(delta);
        self.touch_var(v);
        let cols: Vec<(RowId, N)> = self.matrix.col_entries(v).collect();
        for (r, c) in cols {
            let ri = &mut self.rows[r.index()];
            ri.value = ri.value.wrapping_add(delta.wrapping_mul(c));
            let s = ri.base;
            self.set_base_value(s);
            self.add_patch(s);
        }
    }

    /// Delta moving `value` onto `lo` or onto `hi - 1`, whichever is nearer.
    pub(crate) fn value2delta(&self, v: Var, value: N) -> N {
        let b = &self.vars[v.index()].bounds;
        if b.lo.wrapping_sub(value) < value.wrapping_sub(b.hi) {
            b.lo.wrapping_sub(value)
        } else {
            b.hi.wrapping_sub(value).wrapping_sub(N::ONE)
        }
    }

    /// Distance of `value` from the bounds of `v`; zero when inside.
    pub(crate) fn value2error(&self, v: Var, value: N) -> N {
        let b = &self.vars[v.index()].bounds;
        if b.contains(value) {
            return N::ZERO;
        }
        if b.lo.wrapping_sub(value) < value.wrapping_sub(b.hi) {
            b.lo.wrapping_sub(value)
        } else {
            value.wrapping_sub(b.hi).wrapping_sub(N::ONE)
        }
    }

    // ------------------------------------------------------------------
    // Rows
    // ------------------------------------------------------------------

    /// Add the equation `sum coeff * var == 0` with designated base
    /// variable `base`.
    ///
    /// `base` must occur among `terms` with a nonzero combined coefficient
    /// and must not already be base of another row. Duplicate variables in
    /// `terms` have their coefficients combined; zero terms are dropped.
    pub fn add_row(&mut self, base: Var, terms: &[(Var, N)]) {
        self.ensure_var(base);
        for &(v, _) in terms {
            self.ensure_var(v);
        }
        let r = self.matrix.mk_row();
        for &(v, c) in terms {
            self.matrix.add_var(r, c, v);
        }
        let mut base_coeff = N::ZERO;
        let mut value = N::ZERO;
        let mut other_bases: Vec<Var> = Vec::new();
        for (v, c) in self.matrix.row_entries(r) {
            if v == base {
                base_coeff = c;
            } else {
                if self.vars[v.index()].is_base {
                    other_bases.push(v);
                }
                value = value.wrapping_add(c.wrapping_mul(self.vars[v.index()].value));
            }
        }
        assert!(!base_coeff.is_zero(), "add_row: base must have a nonzero coefficient");
        assert!(!self.is_base(base), "add_row: base is already basic");
        while self.rows.len() <= r.index() {
            self.rows.push(RowInfo::default());
        }
        self.rows[r.index()] =
            RowInfo { base, base_coeff, value, integral: false };
        self.vars[base.index()].base2row = r;
        self.vars[base.index()].is_base = true;
        self.set_base_value(base);
        self.add_patch(base);
        let mut ok = true;
        for v in other_bases {
            if self.is_base(v) && !self.elim_base(v) {
                ok = false;
            }
        }
        if !ok {
            self.counters.num_approx += 1;
            self.approx = true;
            debug!(row = r.0, "lossy elimination while adding row");
        }
        debug_assert!(self.rows[r.index()].base == NULL_VAR || self.well_formed_row(r));
        debug_assert!(self.well_formed());
        self.trail.push(TrailEntry::AddRow);
        self.row_trail.push(base);
    }

    /// Eliminate base variable `v` from every row except its own.
    /// Returns false if some elimination was lossy.
    fn elim_base(&mut self, v: Var) -> bool {
        debug_assert!(self.is_base(v));
        let r = self.vars[v.index()].base2row;
        let b = self.rows[r.index()].base_coeff;
        let tz_b = b.trailing_zeros();
        let value_v = self.value(v);
        let cols: Vec<(RowId, N)> = self.matrix.col_entries(v).filter(|&(rz, _)| rz != r).collect();
        let mut ok = true;
        for (rz, c) in cols {
            if !self.eliminate_var(r, rz, c, tz_b, value_v) {
                ok = false;
            }
        }
        ok
    }

    /// Remove `y` (base of `r_y`, base coefficient `b`) from `r_z` by the
    /// combination `r_z <- b1 * r_z + c1 * r_y` with both multipliers shifted
    /// down by `min(tz(b), tz(c))`, which cancels the `y` entry exactly.
    ///
    /// Returns true iff `tz(b) <= tz(c)`: then `b1` is odd and the
    /// transformation preserves the solution set. Otherwise `b1` is even and
    /// the new row is only implied by the old one.
    pub(crate) fn eliminate_var(
        &mut self,
        r_y: RowId,
        r_z: RowId,
        c: N,
        tz_b: u32,
        old_value_y: N,
    ) -> bool {
        let b = self.rows[r_y.index()].base_coeff;
        let z = self.rows[r_z.index()].base;
        let tz_c = c.trailing_zeros();
        let shift = tz_b.min(tz_c);
        let b1 = b.shr(shift);
        let c1 = c.shr(shift).wrapping_neg();
        self.matrix.mul(r_z, b1);
        self.matrix.add(r_z, c1, r_y);
        let rz_value = self.rows[r_z.index()].value;
        let ry_value = self.rows[r_y.index()].value;
        self.rows[r_z.index()].value = b1
            .wrapping_mul(rz_value.wrapping_sub(c.wrapping_mul(old_value_y)))
            .wrapping_add(c1.wrapping_mul(ry_value));
        let d = self.matrix.coeff(r_z, z);
        self.rows[r_z.index()].base_coeff = d;
        if d.is_zero() {
            // The base coefficient vanished under an even scale: the row no
            // longer defines z. Drop it; the verdict degrades to Unknown via
            // the approximation latch.
            trace!(row = r_z.0, "row degenerated during elimination");
            let was_integral = self.rows[r_z.index()].integral;
            if !was_integral {
                self.num_non_integral -= 1;
            }
            self.vars[z.index()].is_base = false;
            self.rows[r_z.index()] = RowInfo::default();
            self.matrix.del(r_z);
            self.var_eqs.clear();
            self.approx = true;
            return false;
        }
        self.set_base_value(z);
        debug_assert!(self.well_formed_row(r_z));
        tz_b <= tz_c
    }

    /// Delete the row of which `var` is (or can be made) the base.
    /// Silently does nothing if `var` occurs in no row.
    fn del_row_var(&mut self, var: Var) {
        let r;
        if self.is_base(var) {
            r = self.vars[var.index()].base2row;
        } else {
            let mut best: Option<(RowId, N)> = None;
            let mut best_tz = u32::MAX;
            for (cr, cc) in self.matrix.col_entries(var) {
                let tz = cc.trailing_zeros();
                if tz < best_tz {
                    best = Some((cr, cc));
                    best_tz = tz;
                    if tz == 0 {
                        break;
                    }
                }
            }
            let Some((cr, coeff)) = best else {
                return;
            };
            r = cr;
            let old_base = self.rows[r.index()].base;
            let vi = &self.vars[old_base.index()];
            let new_value = if !vi.bounds.contains(vi.value) { vi.bounds.lo } else { vi.value };
            self.pivot(old_base, var, coeff, new_value);
            debug_assert!(self.is_base(var));
            debug_assert!(self.vars[var.index()].base2row == r);
        }
        self.del_row_raw(r);
    }

    /// Unlink a row, demote its base variable and keep the variable's value
    /// inside its (retained) bounds.
    fn del_row_raw(&mut self, r: RowId) {
        self.var_eqs.clear();
        let var = self.rows[r.index()].base;
        if !self.rows[r.index()].integral {
            self.num_non_integral -= 1;
        }
        self.vars[var.index()].is_base = false;
        self.rows[r.index()] = RowInfo::default();
        self.matrix.del(r);
        if !self.in_bounds(var) && !self.vars[var.index()].bounds.is_empty() {
            let delta = self.value2delta(var, self.value(var));
            self.update_value(var, delta);
        }
        debug_assert!(self.well_formed());
    }

    // ------------------------------------------------------------------
    // Values of base variables
    // ------------------------------------------------------------------

    /// Solve `c * x + row_value == 0` for `x`.
    ///
    /// An exact solution exists iff `tz(c) <= tz(row_value)` and is computed
    /// through the odd inverse of `c >> tz(c)`. Otherwise the result is the
    /// truncating-division approximation, biased by which half of the ring
    /// `c` lies in.
    pub(crate) fn solve_for(row_value: N, c: N) -> N {
        debug_assert!(!c.is_zero());
        if c == N::ONE {
            return row_value.wrapping_neg();
        }
        if c == N::MAX {
            return row_value;
        }
        let tz_c = c.trailing_zeros();
        if tz_c <= row_value.trailing_zeros() {
            let inv = c.shr(tz_c).odd_inverse();
            return inv.wrapping_mul(row_value.shr(tz_c)).wrapping_neg();
        }
        if c.wrapping_neg() < c {
            row_value.wrapping_div(c.wrapping_neg())
        } else {
            row_value.wrapping_div(c).wrapping_neg()
        }
    }

    /// True iff the row balances exactly on current values.
    fn is_solved(&self, r: RowId) -> bool {
        let ri = &self.rows[r.index()];
        self.value(ri.base)
            .wrapping_mul(ri.base_coeff)
            .wrapping_add(ri.value)
            .is_zero()
    }

    /// Recompute the value of base variable `x` from its row and maintain
    /// the non-integral row count.
    pub(crate) fn set_base_value(&mut self, x: Var) {
        debug_assert!(self.is_base(x));
        let r = self.vars[x.index()].base2row;
        let ri = &self.rows[r.index()];
        self.vars[x.index()].value = Self::solve_for(ri.value, ri.base_coeff);
        self.touch_var(x);
        let was_integral = self.rows[r.index()].integral;
        let now_integral = self.is_solved(r);
        self.rows[r.index()].integral = now_integral;
        if was_integral && !now_integral {
            self.num_non_integral += 1;
        } else if !was_integral && now_integral {
            self.num_non_integral -= 1;
        }
    }

    // ------------------------------------------------------------------
    // Inequality bookkeeping shared with ineqs.rs
    // ------------------------------------------------------------------

    /// Add the inequality `v < w` (strict) or `v <= w`, justified by `dep`.
    pub fn add_ineq(&mut self, v: Var, w: Var, dep: DepToken, strict: bool) {
        self.ensure_var(v);
        self.ensure_var(w);
        let idx = self.ineqs.len() as u32;
        self.var2ineqs[v.index()].push(idx);
        self.var2ineqs[w.index()].push(idx);
        self.ineqs_to_check.push(idx);
        self.trail.push(TrailEntry::AddIneq);
        self.ineqs.push(Ineq { v, w, dep, strict, active: true });
    }

    fn restore_ineq(&mut self) {
        let ineq = self.ineqs.pop().expect("ineq trail out of sync");
        self.var2ineqs[ineq.v.index()].pop();
        self.var2ineqs[ineq.w.index()].pop();
    }

    // ------------------------------------------------------------------
    // Trail
    // ------------------------------------------------------------------

    /// Open a backtracking level.
    pub fn push(&mut self) {
        self.trail.push(TrailEntry::IncLevel);
        self.deps.push_scope();
    }

    /// Undo everything recorded in the top `n` levels.
    pub fn pop(&mut self, n: usize) {
        self.deps.pop_scope(n);
        let mut n = n;
        while n > 0 {
            match self.trail.pop().expect("pop without matching push") {
                TrailEntry::IncLevel => n -= 1,
                TrailEntry::SetBound => self.restore_bound(),
                TrailEntry::AddRow => {
                    let v = self.row_trail.pop().expect("row trail out of sync");
                    self.del_row_var(v);
                }
                TrailEntry::AddIneq => self.restore_ineq(),
            }
        }
    }

    fn restore_bound(&mut self) {
        let b = self.stashed_bounds.pop().expect("bound trail out of sync");
        let vi = &mut self.vars[b.var.index()];
        vi.bounds = b.bounds;
        vi.lo_dep = b.lo_dep;
        vi.hi_dep = b.hi_dep;
    }

    /// Forget everything; equivalent to a freshly constructed solver with
    /// the same configuration.
    pub fn reset(&mut self) {
        let config = self.config.clone();
        let cancel = self.cancel.clone();
        *self = Fixplex::new(config);
        self.cancel = cancel;
    }

    // ------------------------------------------------------------------
    // Feasibility
    // ------------------------------------------------------------------

    /// Patch every out-of-bounds base variable by pivoting, then check
    /// inequalities and row parity.
    ///
    /// `Feasible` guarantees: every value within bounds, every row exactly
    /// balanced, every inequality satisfied by the values. `Infeasible`
    /// comes with an unsat core. `Unknown` covers approximation,
    /// cancellation and the iteration cap.
    pub fn make_feasible(&mut self) -> Feasibility {
        self.counters.num_checks += 1;
        self.left_basis.clear();
        self.bland = false;
        let mut num_iterations: u64 = 0;
        let mut num_repeated: u32 = 0;
        debug_assert!(self.well_formed());
        for i in 0..self.vars.len() {
            if self.vars[i].bounds.is_empty() {
                let (lo_dep, hi_dep) = (self.vars[i].lo_dep, self.vars[i].hi_dep);
                self.conflict_refs(&[lo_dep, hi_dep]);
                self.counters.num_infeasible += 1;
                return Feasibility::Infeasible;
            }
        }
        loop {
            while let Some(v) = self.select_var_to_fix() {
                trace!(var = v.0, "patching");
                if self.cancelled() || num_iterations > self.config.max_iterations {
                    debug!(num_iterations, "feasibility search interrupted");
                    return Feasibility::Unknown;
                }
                self.check_blands_rule(v, &mut num_repeated);
                match self.make_var_feasible(v) {
                    Feasibility::Feasible => num_iterations += 1,
                    Feasibility::Infeasible => {
                        self.to_patch.insert(v.0);
                        self.set_infeasible_base(v);
                        self.counters.num_infeasible += 1;
                        return Feasibility::Infeasible;
                    }
                    Feasibility::Unknown => {
                        self.to_patch.insert(v.0);
                        if self.ineqs_are_violated() {
                            return Feasibility::Infeasible;
                        }
                        return Feasibility::Unknown;
                    }
                }
            }
            debug_assert!(self.well_formed());
            // Rows whose base variable sits in bounds can still be
            // unsatisfiable modulo parity.
            for i in 0..self.rows.len() {
                let base = self.rows[i].base;
                if base == NULL_VAR || self.rows[i].integral {
                    continue;
                }
                if self.is_parity_infeasible_row(base) {
                    self.set_infeasible_base(base);
                    self.counters.num_infeasible += 1;
                    return Feasibility::Infeasible;
                }
            }
            if self.ineqs_are_violated() {
                self.counters.num_infeasible += 1;
                return Feasibility::Infeasible;
            }
            if self.strict_cycle_conflict() {
                self.counters.num_infeasible += 1;
                return Feasibility::Infeasible;
            }
            if !self.to_patch.is_empty() {
                // Propagation re-queued base variables; go around again.
                num_iterations += 1;
                continue;
            }
            if (0..self.rows.len())
                .any(|i| self.rows[i].base != NULL_VAR && !self.rows[i].integral)
            {
                debug!("non-integral rows remain");
                return Feasibility::Unknown;
            }
            if self.approx || !self.is_feasible() {
                return Feasibility::Unknown;
            }
            if self.ineqs_are_satisfied() {
                return Feasibility::Feasible;
            }
            return Feasibility::Unknown;
        }
    }

    /// Try to move base variable `x` into its bounds, pivoting if needed.
    fn make_var_feasible(&mut self, x: Var) -> Feasibility {
        if !self.is_base(x) {
            // Stale patch-queue entry from an earlier pivot or pop.
            if !self.in_bounds(x) && !self.vars[x.index()].bounds.is_empty() {
                let delta = self.value2delta(x, self.value(x));
                self.update_value(x, delta);
            }
            return Feasibility::Feasible;
        }
        if self.in_bounds(x) {
            return Feasibility::Feasible;
        }
        if self.vars[x.index()].bounds.is_empty() {
            return Feasibility::Infeasible;
        }
        let new_value = self.vars[x.index()].bounds.closest_value(self.value(x));
        match self.select_pivot(x, new_value) {
            Some((y, b)) => {
                self.pivot(x, y, b, new_value);
                Feasibility::Feasible
            }
            None => {
                if self.is_infeasible_row(x) || self.is_parity_infeasible_row(x) {
                    Feasibility::Infeasible
                } else {
                    Feasibility::Unknown
                }
            }
        }
    }

    /// Exchange base variable `x` of its row against non-base `y` (with
    /// coefficient `b` in the row), assigning `new_value` to `x`, and
    /// eliminate `y` from every other row of its column.
    pub(crate) fn pivot(&mut self, x: Var, y: Var, b: N, new_value: N) {
        self.counters.num_pivots += 1;
        debug_assert!(self.is_base(x));
        debug_assert!(!self.is_base(y));
        trace!(x = x.0, y = y.0, "pivot");
        let rx = self.vars[x.index()].base2row;
        let a = self.rows[rx.index()].base_coeff;
        let old_value_y = self.vars[y.index()].value;
        let rx_info = &mut self.rows[rx.index()];
        rx_info.base = y;
        rx_info.value = rx_info
            .value
            .wrapping_sub(b.wrapping_mul(old_value_y))
            .wrapping_add(a.wrapping_mul(new_value));
        rx_info.base_coeff = b;
        self.vars[y.index()].base2row = rx;
        self.vars[y.index()].is_base = true;
        self.set_base_value(y);
        self.vars[x.index()].is_base = false;
        self.vars[x.index()].value = new_value;
        self.touch_var(x);
        self.add_patch(y);
        debug_assert!(self.well_formed_row(rx));

        let tz_b = b.trailing_zeros();
        let cols: Vec<(RowId, N)> =
            self.matrix.col_entries(y).filter(|&(r, _)| r != rx).collect();
        for (rz, c) in cols {
            let _lossless = self.eliminate_var(rx, rz, c, tz_b, old_value_y);
            debug_assert!(_lossless, "pivot elimination must be lossless");
            let zb = self.rows[rz.index()].base;
            if zb != NULL_VAR {
                self.add_patch(zb);
            }
        }
        debug_assert!(self.well_formed());
    }

    // ------------------------------------------------------------------
    // Pivot selection
    // ------------------------------------------------------------------

    fn select_pivot(&mut self, x: Var, new_value: N) -> Option<(Var, N)> {
        if self.bland {
            self.select_pivot_blands(x, new_value)
        } else {
            self.select_pivot_core(x, new_value)
        }
    }

    /// Pick a non-base entry `(y, b)` of the row of `x` such that pivoting
    /// on it is lossless (Olm–Seidl condition) and patches the error best.
    ///
    /// Scoring: prefer a `y` whose implied new value lands in bounds, then
    /// minimize its distance to bounds, then the number of non-free basic
    /// dependents of its column, then the column size. Plateau candidates
    /// are sampled uniformly (reservoir of size one).
    fn select_pivot_core(&mut self, x: Var, new_value: N) -> Option<(Var, N)> {
        debug_assert!(self.is_base(x));
        let r = self.vars[x.index()].base2row;
        let a = self.rows[r.index()].base_coeff;
        let row_value = self.rows[r.index()].value.wrapping_add(a.wrapping_mul(new_value));
        let mut result: Option<(Var, N)> = None;
        let mut n: u32 = 0;
        let mut best_col_sz = usize::MAX;
        let mut best_so_far = i64::MAX;
        let mut delta_best = N::ZERO;
        let mut best_in_bounds = false;
        let entries: Vec<(Var, N)> = self.matrix.row_entries(r).collect();
        for (y, b) in entries {
            if y == x {
                continue;
            }
            if !self.has_minimal_trailing_zeros(y, b) {
                continue;
            }
            let new_y_value =
                Self::solve_for(row_value.wrapping_sub(b.wrapping_mul(self.value(y))), b);
            let in_bounds = self.vars[y.index()].bounds.contains(new_y_value);
            let mut delta_y = N::ZERO;
            if !in_bounds {
                let yb = &self.vars[y.index()].bounds;
                if yb.lo.wrapping_sub(new_y_value) < new_y_value.wrapping_sub(yb.hi) {
                    delta_y = new_y_value.wrapping_sub(yb.lo);
                } else {
                    delta_y = new_y_value.wrapping_sub(yb.hi).wrapping_sub(N::ONE);
                }
            }
            let num = self.get_num_non_free_dep_vars(y, best_so_far);
            let col_sz = self.matrix.column_size(y);
            let mut is_improvement = false;
            let mut is_plateau = false;
            if best_so_far == i64::MAX {
                is_improvement = true;
            } else if !best_in_bounds && in_bounds {
                is_improvement = true;
            } else if !best_in_bounds && !in_bounds && delta_y < delta_best {
                is_improvement = true;
            } else if best_in_bounds && in_bounds && num < best_so_far {
                is_improvement = true;
            } else if best_in_bounds && in_bounds && num == best_so_far && col_sz < best_col_sz {
                is_improvement = true;
            } else if !best_in_bounds
                && !in_bounds
                && delta_y == delta_best
                && best_so_far == num
                && col_sz == best_col_sz
            {
                is_plateau = true;
            } else if best_in_bounds && in_bounds && best_so_far == num && col_sz == best_col_sz {
                is_plateau = true;
            }
            if is_improvement {
                result = Some((y, b));
                best_so_far = num;
                best_col_sz = col_sz;
                best_in_bounds = in_bounds;
                delta_best = delta_y;
                n = 1;
            } else if is_plateau {
                n += 1;
                if self.rng.gen_range(0..n) == 0 {
                    result = Some((y, b));
                }
            }
        }
        let (y, b) = result?;
        if !best_in_bounds && delta_best >= self.value2delta(x, new_value) {
            return None;
        }
        Some((y, b))
    }

    /// Bland fallback: smallest-indexed qualifying variable whose movement
    /// can improve the overall error. Guarantees termination.
    fn select_pivot_blands(&mut self, x: Var, new_value: N) -> Option<(Var, N)> {
        debug_assert!(self.is_base(x));
        let r = self.vars[x.index()].base2row;
        let entries: Vec<(Var, N)> = self.matrix.row_entries(r).collect();
        let mut result: Option<(Var, N)> = None;
        for (y, b) in entries {
            if y == x {
                continue;
            }
            if let Some((best, _)) = result {
                if y >= best {
                    continue;
                }
            }
            if !self.has_minimal_trailing_zeros(y, b) {
                continue;
            }
            if self.can_improve(x, new_value, y, b) {
                result = Some((y, b));
            }
        }
        result
    }

    /// Whether assigning `new_x_value` to `x` lets `y` move without
    /// increasing the overall error.
    fn can_improve(&self, x: Var, new_x_value: N, y: Var, b: N) -> bool {
        let r = self.vars[x.index()].base2row;
        let row_value = self.rows[r.index()]
            .value
            .wrapping_add(self.rows[r.index()].base_coeff.wrapping_mul(new_x_value));
        let new_y_value =
            Self::solve_for(row_value.wrapping_sub(b.wrapping_mul(self.value(y))), b);
        if self.vars[y.index()].bounds.contains(new_y_value) {
            return true;
        }
        self.value2error(y, new_y_value) <= self.value2error(x, self.value(x))
    }

    /// The Olm–Seidl condition: `b` has the minimal number of trailing
    /// zeros among the coefficients of `y` across all rows.
    pub(crate) fn has_minimal_trailing_zeros(&self, y: Var, b: N) -> bool {
        let tz1 = b.trailing_zeros();
        if tz1 == 0 {
            return true;
        }
        self.matrix.col_entries(y).all(|(_, c)| tz1 <= c.trailing_zeros())
    }

    /// Count the non-free base variables depending on the column of `x_j`
    /// (plus one if `x_j` itself is non-free), giving up early once the
    /// count exceeds `best_so_far`.
    fn get_num_non_free_dep_vars(&self, x_j: Var, best_so_far: i64) -> i64 {
        let mut result = self.is_non_free(x_j) as i64;
        for (r, _) in self.matrix.col_entries(x_j) {
            result += self.is_non_free(self.rows[r.index()].base) as i64;
            if result > best_so_far {
                return result;
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Patch-queue selection
    // ------------------------------------------------------------------

    fn select_var_to_fix(&mut self) -> Option<Var> {
        let strategy =
            if self.bland { PivotStrategy::Bland } else { self.config.pivot_strategy };
        match strategy {
            PivotStrategy::Bland => self.select_smallest_var(),
            PivotStrategy::GreatestError => self.select_error_var(false),
            PivotStrategy::LeastError => self.select_error_var(true),
        }
    }

    fn select_smallest_var(&mut self) -> Option<Var> {
        let best = self.to_patch.iter().min()?;
        self.to_patch.erase(best);
        Some(Var(best))
    }

    fn select_error_var(&mut self, least: bool) -> Option<Var> {
        let mut best: Option<Var> = None;
        let mut best_error = N::ZERO;
        for v in self.to_patch.iter() {
            let v = Var(v);
            let err = self.value2error(v, self.value(v));
            if err.is_zero() {
                continue;
            }
            if best.is_none() || (least && err < best_error) || (!least && err > best_error) {
                best = Some(v);
                best_error = err;
            }
        }
        match best {
            None => {
                self.to_patch.clear();
                None
            }
            Some(v) => {
                self.to_patch.erase(v.0);
                Some(v)
            }
        }
    }

    fn check_blands_rule(&mut self, v: Var, num_repeated: &mut u32) {
        if self.bland {
            return;
        }
        if self.left_basis.insert(v) {
            return;
        }
        *num_repeated += 1;
        if *num_repeated > self.config.blands_rule_threshold {
            self.bland = true;
            debug!(num_repeated, "switching to Bland's rule");
        }
    }

    // ------------------------------------------------------------------
    // Row infeasibility
    // ------------------------------------------------------------------

    /// The row of `x` is infeasible if the interval sum of its entries
    /// cannot contain zero.
    pub(crate) fn is_infeasible_row(&self, x: Var) -> bool {
        debug_assert!(self.is_base(x));
        let r = self.vars[x.index()].base2row;
        let mut range = ModInterval::fixed(N::ZERO);
        for (v, c) in self.matrix.row_entries(r) {
            range = range + self.vars[v.index()].bounds * c;
            if range.is_free() {
                return false;
            }
        }
        !range.contains(N::ZERO)
    }

    /// Parity test: the fixed part of the row must be divisible by the
    /// minimal power of two among the non-fixed coefficients.
    pub(crate) fn is_parity_infeasible_row(&self, x: Var) -> bool {
        debug_assert!(self.is_base(x));
        let r = self.vars[x.index()].base2row;
        if self.rows[r.index()].integral {
            return false;
        }
        let mut fixed = N::ZERO;
        let mut parity = u32::MAX;
        for (v, c) in self.matrix.row_entries(r) {
            if self.is_fixed(v) {
                fixed = fixed.wrapping_add(self.value(v).wrapping_mul(c));
            } else {
                parity = parity.min(c.trailing_zeros());
            }
        }
        fixed.trailing_zeros() < parity
    }

    // ------------------------------------------------------------------
    // Conflicts and cores
    // ------------------------------------------------------------------

    /// Record an infeasible row: the core is the union of the bound
    /// dependencies of every variable in the row of `v`.
    fn set_infeasible_base(&mut self, v: Var) {
        debug_assert!(self.is_base(v));
        let r = self.vars[v.index()].base2row;
        let mut refs: Vec<DepRef> = Vec::new();
        for (u, _) in self.matrix.row_entries(r) {
            refs.extend(self.vars[u.index()].lo_dep);
            refs.extend(self.vars[u.index()].hi_dep);
        }
        self.unsat_core.clear();
        self.deps.linearize(refs, &mut self.unsat_core);
    }

    /// Record a conflict from a set of dependency references.
    pub(crate) fn conflict_refs(&mut self, refs: &[Option<DepRef>]) {
        self.unsat_core.clear();
        self.deps
            .linearize(refs.iter().copied().flatten(), &mut self.unsat_core);
        debug!(core = ?self.unsat_core, "conflict");
    }

    /// The tokens justifying the last `Infeasible` verdict.
    pub fn unsat_core(&self) -> &[DepToken] {
        &self.unsat_core
    }

    /// Tentative equalities discovered since the last row change.
    pub fn var_eqs(&self) -> &[VarEq] {
        &self.var_eqs
    }

    // ------------------------------------------------------------------
    // Statistics, well-formedness, display
    // ------------------------------------------------------------------

    /// Merge this solver's counters into `st`.
    pub fn collect_statistics(&self, st: &mut Statistics) {
        st.update("num pivots", self.counters.num_pivots);
        st.update("num infeasible", self.counters.num_infeasible);
        st.update("num checks", self.counters.num_checks);
        st.update("num non-integral", self.num_non_integral.max(0) as u64);
        st.update("num approximated row additions", self.counters.num_approx);
    }

    /// Cache-consistency check for one row: the sum of `coeff * value` over
    /// all entries must equal `base_coeff * value(base) + cached value`.
    pub(crate) fn well_formed_row(&self, r: RowId) -> bool {
        let ri = &self.rows[r.index()];
        let s = ri.base;
        if s == NULL_VAR || self.vars[s.index()].base2row != r || !self.vars[s.index()].is_base {
            return false;
        }
        let mut sum = N::ZERO;
        let mut base_seen = false;
        for (v, c) in self.matrix.row_entries(r) {
            sum = sum.wrapping_add(self.value(v).wrapping_mul(c));
            if v == s {
                base_seen = true;
                if c != ri.base_coeff {
                    return false;
                }
            }
        }
        base_seen && sum == ri.value.wrapping_add(ri.base_coeff.wrapping_mul(self.value(s)))
    }

    /// Whole-tableau consistency check (debug builds).
    pub(crate) fn well_formed(&self) -> bool {
        if !self.matrix.well_formed() {
            return false;
        }
        for i in 0..self.rows.len() {
            let r = RowId(i as u32);
            if self.rows[i].base == NULL_VAR {
                continue;
            }
            if !self.well_formed_row(r) {
                return false;
            }
        }
        true
    }
}

impl<N: Numeral> fmt::Display for Fixplex<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ri) in self.rows.iter().enumerate() {
            if ri.base == NULL_VAR {
                continue;
            }
            let r = RowId(i as u32);
            write!(f, "r{i} := {} : ", ri.value)?;
            for (v, c) in self.matrix.row_entries(r) {
                if c != N::ONE {
                    write!(f, "{c} * ")?;
                }
                write!(f, "{v}{} ", if self.is_base(v) { "b" } else { "" })?;
            }
            writeln!(f)?;
        }
        for (i, vi) in self.vars.iter().enumerate() {
            write!(f, "v{i} := {} {}", vi.value, vi.bounds)?;
            if vi.is_base {
                write!(f, " b:r{}", vi.base2row.0)?;
            }
            writeln!(f)?;
        }
        for ineq in &self.ineqs {
            writeln!(f, "{} {} {}", ineq.v, if ineq.strict { "<" } else { "<=" }, ineq.w)?;
        }
        Ok(())
    }
}
