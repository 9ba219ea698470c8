//! Property-based tests for the modular simplex solver.
//!
//! Small random systems over three width-8 variables clamped to a tiny
//! domain, so that `Infeasible` verdicts can be cross-checked against a
//! brute-force enumeration oracle and `Feasible` verdicts against the
//! witness assignment.

use fixplex::{Config, Feasibility, Fixplex, ModInterval, Var};
use proptest::collection::vec;
use proptest::prelude::*;

const NUM_VARS: u32 = 3;
const DOMAIN: u8 = 8;

#[derive(Clone, Debug)]
enum Op {
    Row { base: u32, coeffs: Vec<u8> },
    Bounds { v: u32, lo: u8, len: u8 },
    Ineq { v: u32, w: u32, strict: bool },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..NUM_VARS, vec(1..=255u8, 2..=3)).prop_map(|(base, coeffs)| Op::Row { base, coeffs }),
        (0..NUM_VARS, 0..12u8, 1..=6u8).prop_map(|(v, lo, len)| Op::Bounds { v, lo, len }),
        (0..NUM_VARS, 0..NUM_VARS, any::<bool>())
            .prop_map(|(v, w, strict)| Op::Ineq { v, w, strict }),
    ]
}

/// What was actually asserted, for replay against the oracle.
#[derive(Default)]
struct Asserted {
    rows: Vec<Vec<(u32, u8)>>,
    bounds: Vec<(u32, u8, u8)>,
    ineqs: Vec<(u32, u32, bool)>,
}

fn apply(s: &mut Fixplex<u8>, ops: &[Op], bases: &mut [bool], log: &mut Asserted, dep: &mut u32) {
    for op in ops {
        match op {
            Op::Row { base, coeffs } => {
                // A base variable may define only one row; skip duplicates.
                if bases[*base as usize] {
                    continue;
                }
                bases[*base as usize] = true;
                let terms: Vec<(u32, u8)> = coeffs
                    .iter()
                    .enumerate()
                    .map(|(k, &c)| ((base + k as u32) % NUM_VARS, c))
                    .collect();
                let row: Vec<(Var, u8)> = terms.iter().map(|&(v, c)| (Var(v), c)).collect();
                s.add_row(Var(*base), &row);
                log.rows.push(terms);
            }
            Op::Bounds { v, lo, len } => {
                let hi = lo + len;
                s.set_bounds(Var(*v), *lo, hi, *dep);
                log.bounds.push((*v, *lo, hi));
                *dep += 1;
            }
            Op::Ineq { v, w, strict } => {
                s.add_ineq(Var(*v), Var(*w), *dep, *strict);
                log.ineqs.push((*v, *w, *strict));
                *dep += 1;
            }
        }
    }
}

fn satisfies(log: &Asserted, vals: [u8; 3]) -> bool {
    log.rows.iter().all(|terms| {
        terms
            .iter()
            .fold(0u8, |acc, &(v, c)| acc.wrapping_add(c.wrapping_mul(vals[v as usize])))
            == 0
    }) && log
        .bounds
        .iter()
        .all(|&(v, lo, hi)| lo <= vals[v as usize] && vals[v as usize] < hi)
        && log.ineqs.iter().all(|&(v, w, strict)| {
            if strict {
                vals[v as usize] < vals[w as usize]
            } else {
                vals[v as usize] <= vals[w as usize]
            }
        })
}

proptest! {
    /// A `Feasible` verdict carries a witness: every asserted row sums to
    /// zero, every asserted bound and inequality holds on the values.
    /// An `Infeasible` verdict must agree with brute-force enumeration of
    /// the clamped domain and name a non-empty core.
    #[test]
    fn verdicts_agree_with_oracle(ops in vec(arb_op(), 0..10)) {
        let mut s: Fixplex<u8> = Fixplex::new(Config::default());
        let mut log = Asserted::default();
        let mut bases = vec![false; NUM_VARS as usize];
        let mut dep = 0u32;
        for v in 0..NUM_VARS {
            s.set_bounds(Var(v), 0, DOMAIN, 1000 + v);
            log.bounds.push((v, 0, DOMAIN));
        }
        apply(&mut s, &ops, &mut bases, &mut log, &mut dep);
        match s.make_feasible() {
            Feasibility::Feasible => {
                let vals = [s.value(Var(0)), s.value(Var(1)), s.value(Var(2))];
                prop_assert!(satisfies(&log, vals), "witness {vals:?} violates assertions");
            }
            Feasibility::Infeasible => {
                prop_assert!(!s.unsat_core().is_empty());
                for a in 0..DOMAIN {
                    for b in 0..DOMAIN {
                        for c in 0..DOMAIN {
                            prop_assert!(
                                !satisfies(&log, [a, b, c]),
                                "claimed infeasible but [{a}, {b}, {c}] satisfies"
                            );
                        }
                    }
                }
            }
            Feasibility::Unknown => {}
        }
    }

    /// `pop` restores the bounds of every variable to their pre-push state,
    /// including after a feasibility run inside the level.
    #[test]
    fn pop_restores_bounds(
        pre in vec(arb_op(), 0..6),
        inner in vec(arb_op(), 0..6),
    ) {
        let mut s: Fixplex<u8> = Fixplex::new(Config::default());
        let mut log = Asserted::default();
        let mut bases = vec![false; NUM_VARS as usize];
        let mut dep = 100u32;
        apply(&mut s, &pre, &mut bases, &mut log, &mut dep);
        let snapshot: Vec<ModInterval<u8>> =
            (0..NUM_VARS).map(|v| s.bounds(Var(v))).collect();
        s.push();
        apply(&mut s, &inner, &mut bases, &mut log, &mut dep);
        let _ = s.make_feasible();
        s.pop(1);
        for v in 0..NUM_VARS {
            prop_assert_eq!(s.bounds(Var(v)), snapshot[v as usize], "bounds of v{} changed", v);
        }
    }

    /// Two pushes undone by a single `pop(2)` behave like nested pops.
    #[test]
    fn pop_many_levels(a in vec(arb_op(), 0..4), b in vec(arb_op(), 0..4)) {
        let mut s: Fixplex<u8> = Fixplex::new(Config::default());
        let mut log = Asserted::default();
        let mut bases = vec![false; NUM_VARS as usize];
        let mut dep = 0u32;
        let snapshot: Vec<ModInterval<u8>> =
            (0..NUM_VARS).map(|v| s.bounds(Var(v))).collect();
        s.push();
        apply(&mut s, &a, &mut bases, &mut log, &mut dep);
        s.push();
        apply(&mut s, &b, &mut bases, &mut log, &mut dep);
        s.pop(2);
        for v in 0..NUM_VARS {
            prop_assert_eq!(s.bounds(Var(v)), snapshot[v as usize]);
        }
    }
}
