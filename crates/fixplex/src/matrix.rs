//! Sparse tableau with dual row/column indexing
//!
//! Rows hold the nonzero coefficients of one equation; a per-variable column
//! index records which rows mention the variable, so pivoting can visit a
//! column without scanning the whole tableau. Entries with coefficient zero
//! are never stored: combining coefficients that cancel removes the entry and
//! unlinks it from its column.
//!
//! Row ids of deleted rows are recycled. Iteration order within a row or a
//! column is unspecified.

use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

use crate::numeral::Numeral;

/// A variable index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub u32);

/// Sentinel distinct from every valid variable.
pub const NULL_VAR: Var = Var(u32::MAX);

impl Var {
    /// The index for array addressing.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A row index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub u32);

impl RowId {
    /// The index for array addressing.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Default, Clone)]
struct RowSlot<N> {
    entries: FxHashMap<Var, N>,
    live: bool,
}

/// Sparse coefficient matrix: rows are equations, columns are variables.
#[derive(Debug, Default)]
pub struct SparseMatrix<N> {
    rows: Vec<RowSlot<N>>,
    free_rows: Vec<RowId>,
    cols: Vec<FxHashSet<RowId>>,
}

impl<N: Numeral> SparseMatrix<N> {
    /// Create an empty matrix.
    pub fn new() -> Self {
        SparseMatrix { rows: Vec::new(), free_rows: Vec::new(), cols: Vec::new() }
    }

    /// Extend the column index to cover variable `v`.
    pub fn ensure_var(&mut self, v: Var) {
        if self.cols.len() <= v.index() {
            self.cols.resize_with(v.index() + 1, FxHashSet::default);
        }
    }

    /// Allocate a fresh (or recycled) empty row.
    pub fn mk_row(&mut self) -> RowId {
        if let Some(r) = self.free_rows.pop() {
            self.rows[r.index()].live = true;
            r
        } else {
            let r = RowId(self.rows.len() as u32);
            self.rows.push(RowSlot { entries: FxHashMap::default(), live: true });
            r
        }
    }

    /// Add `c * v` to row `r`, combining with an existing entry for `v` and
    /// dropping the entry if the coefficients cancel.
    pub fn add_var(&mut self, r: RowId, c: N, v: Var) {
        if c.is_zero() {
            return;
        }
        self.ensure_var(v);
        let slot = &mut self.rows[r.index()];
        debug_assert!(slot.live);
        match slot.entries.get_mut(&v) {
            Some(old) => {
                let combined = old.wrapping_add(c);
                if combined.is_zero() {
                    slot.entries.remove(&v);
                    self.cols[v.index()].remove(&r);
                } else {
                    *old = combined;
                }
            }
            None => {
                slot.entries.insert(v, c);
                self.cols[v.index()].insert(r);
            }
        }
    }

    /// Multiply every coefficient of `r` by `k`. Coefficients that vanish
    /// modulo `2^W` (possible for even `k`) are removed.
    pub fn mul(&mut self, r: RowId, k: N) {
        debug_assert!(!k.is_zero());
        if k == N::ONE {
            return;
        }
        let slot = &mut self.rows[r.index()];
        let mut dead: Vec<Var> = Vec::new();
        for (&v, c) in slot.entries.iter_mut() {
            *c = c.wrapping_mul(k);
            if c.is_zero() {
                dead.push(v);
            }
        }
        for v in dead {
            slot.entries.remove(&v);
            self.cols[v.index()].remove(&r);
        }
    }

    /// `dst += k * src`. Entries that cancel are removed, new entries are
    /// linked into their columns.
    pub fn add(&mut self, dst: RowId, k: N, src: RowId) {
        debug_assert_ne!(dst, src);
        if k.is_zero() {
            return;
        }
        let terms: Vec<(Var, N)> = self.rows[src.index()]
            .entries
            .iter()
            .map(|(&v, &c)| (v, c.wrapping_mul(k)))
            .collect();
        for (v, c) in terms {
            self.add_var(dst, c, v);
        }
    }

    /// Unlink `r` from every column and free it for reuse.
    pub fn del(&mut self, r: RowId) {
        let slot = &mut self.rows[r.index()];
        debug_assert!(slot.live);
        for (&v, _) in slot.entries.iter() {
            self.cols[v.index()].remove(&r);
        }
        slot.entries.clear();
        slot.live = false;
        self.free_rows.push(r);
    }

    /// Coefficient of `v` in `r`, zero if absent.
    pub fn coeff(&self, r: RowId, v: Var) -> N {
        self.rows[r.index()].entries.get(&v).copied().unwrap_or(N::ZERO)
    }

    /// Iterate the `(variable, coefficient)` entries of a row.
    pub fn row_entries(&self, r: RowId) -> impl Iterator<Item = (Var, N)> + '_ {
        self.rows[r.index()].entries.iter().map(|(&v, &c)| (v, c))
    }

    /// Number of entries in a row.
    pub fn row_size(&self, r: RowId) -> usize {
        self.rows[r.index()].entries.len()
    }

    /// Iterate the `(row, coefficient)` entries of a column.
    pub fn col_entries(&self, v: Var) -> impl Iterator<Item = (RowId, N)> + '_ {
        self.cols
            .get(v.index())
            .into_iter()
            .flatten()
            .map(move |&r| (r, self.coeff(r, v)))
    }

    /// Number of rows mentioning `v`.
    pub fn column_size(&self, v: Var) -> usize {
        self.cols.get(v.index()).map_or(0, FxHashSet::len)
    }

    /// Drop all rows and columns.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.free_rows.clear();
        self.cols.clear();
    }

    /// Cross-check the dual indices: every stored entry is nonzero and
    /// mirrored by a column link, and every column link has an entry.
    pub fn well_formed(&self) -> bool {
        for (i, slot) in self.rows.iter().enumerate() {
            let r = RowId(i as u32);
            if !slot.live {
                if !slot.entries.is_empty() {
                    return false;
                }
                continue;
            }
            for (&v, &c) in slot.entries.iter() {
                if c.is_zero() || !self.cols[v.index()].contains(&r) {
                    return false;
                }
            }
        }
        for (vi, col) in self.cols.iter().enumerate() {
            for &r in col {
                let slot = &self.rows[r.index()];
                if !slot.live || !slot.entries.contains_key(&Var(vi as u32)) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_var_combines_and_cancels() {
        let mut m: SparseMatrix<u8> = SparseMatrix::new();
        let r = m.mk_row();
        m.add_var(r, 3, Var(0));
        m.add_var(r, 5, Var(1));
        m.add_var(r, 2, Var(0));
        assert_eq!(m.coeff(r, Var(0)), 5);
        m.add_var(r, 251, Var(0)); // 5 + (-5) = 0 drops the entry
        assert_eq!(m.coeff(r, Var(0)), 0);
        assert_eq!(m.column_size(Var(0)), 0);
        assert_eq!(m.column_size(Var(1)), 1);
        assert!(m.well_formed());
    }

    #[test]
    fn row_combination() {
        let mut m: SparseMatrix<u8> = SparseMatrix::new();
        let r1 = m.mk_row();
        m.add_var(r1, 2, Var(0));
        m.add_var(r1, 1, Var(1));
        let r2 = m.mk_row();
        m.add_var(r2, 254, Var(0)); // -2
        m.add_var(r2, 7, Var(2));
        // r2 += 1 * r1 cancels v0
        m.add(r2, 1, r1);
        assert_eq!(m.coeff(r2, Var(0)), 0);
        assert_eq!(m.coeff(r2, Var(1)), 1);
        assert_eq!(m.coeff(r2, Var(2)), 7);
        assert_eq!(m.column_size(Var(0)), 1);
        assert!(m.well_formed());
    }

    #[test]
    fn mul_drops_vanishing_coefficients() {
        let mut m: SparseMatrix<u8> = SparseMatrix::new();
        let r = m.mk_row();
        m.add_var(r, 128, Var(0));
        m.add_var(r, 3, Var(1));
        m.mul(r, 2);
        assert_eq!(m.coeff(r, Var(0)), 0); // 256 mod 2^8
        assert_eq!(m.coeff(r, Var(1)), 6);
        assert_eq!(m.column_size(Var(0)), 0);
        assert!(m.well_formed());
    }

    #[test]
    fn del_recycles_rows() {
        let mut m: SparseMatrix<u8> = SparseMatrix::new();
        let r1 = m.mk_row();
        m.add_var(r1, 1, Var(0));
        m.del(r1);
        assert_eq!(m.column_size(Var(0)), 0);
        let r2 = m.mk_row();
        assert_eq!(r1, r2);
        assert_eq!(m.row_size(r2), 0);
        assert!(m.well_formed());
    }
}
